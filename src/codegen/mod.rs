//! C source emission: lowers a type-checked [`Module`] into a single C
//! translation unit linked against the external `rt_*` runtime ABI.
//!
//! One pass walks the tree once, accumulating into a handful of owned `String`
//! buffers that get concatenated at the very end rather than written incrementally.
//! Closures use a uniform `{fn_ptr, env_ptr}` representation: captures are collected
//! into a heap-allocated environment struct and every lambda is lifted to a
//! top-level function.

mod builtins;

use std::collections::{BTreeMap, HashSet};

use crate::ast::*;

/// Opaque runtime types this crate never defines, only names. A real `rt.h` would
/// supply these; since the generated file is meant to stand alone against the external
/// runtime ABI (SPEC_FULL.md §6), it declares them as incomplete-struct pointers itself.
const RUNTIME_OPAQUE_TYPES: &str = "\
typedef struct Arena Arena;
typedef struct rt_string rt_string_t;
typedef struct rt_array rt_array_t;
typedef struct rt_textfile rt_textfile_t;
typedef struct rt_binaryfile rt_binaryfile_t;
typedef struct rt_process rt_process_t;
typedef struct rt_tcplistener rt_tcplistener_t;
typedef struct rt_tcpstream rt_tcpstream_t;
typedef struct rt_udpsocket rt_udpsocket_t;
typedef struct rt_random rt_random_t;
typedef uint32_t rt_char_t;
typedef struct { int32_t tag; union { int64_t l; double d; void *p; } value; } rt_any_t;
typedef struct { int64_t secs; int32_t nanos; } rt_time_t;
typedef struct { int32_t year; int32_t month; int32_t day; } rt_date_t;
typedef struct { uint64_t hi; uint64_t lo; } rt_uuid_t;

extern void rt_arena_init(Arena *arena);
extern void rt_arena_destroy(Arena *arena);
extern void *rt_arena_alloc(Arena *arena, size_t size);

";

/// Lowers `module` to a complete `.c` file. `source_file` is embedded in a header
/// comment only; diagnostics have already run by the time code generation starts, so
/// nothing here can fail — a module that reached this stage is assumed well-typed.
pub fn emit(module: &Module, source_file: &str) -> String {
    let mut gen = CodeGen::new(source_file);
    gen.run(module);
    gen.finish()
}

struct LiftedLambda {
    name: String,
    env_struct: Option<String>,
    forward_decl: String,
    definition: String,
}

struct CodeGen {
    source_file: String,
    globals: String,
    module_init: String,
    has_module_init: bool,
    has_main: bool,
    main_is_shared: bool,
    function_decls: String,
    function_defs: String,
    lambdas: Vec<LiftedLambda>,
    lambda_count: u32,
    temp_count: u32,
    label_count: u32,
    /// Name of the in-scope C variable holding the current function's `Arena*`.
    arena_var: String,
    /// Names that, in the function or lambda body currently being emitted, are
    /// heap-allocated pointers rather than plain values — captured primitives, so a
    /// closure referencing them later still observes mutations.
    boxed: HashSet<String>,
    /// Every top-level `fn` name declared in the module, collected up front. A call
    /// whose callee is a bare `Variable` only lowers to `fn_<name>` when its name is in
    /// here and not shadowed by a local — otherwise it's a closure value and goes
    /// through the generic `rt_closure_t` call path.
    known_functions: HashSet<String>,
    /// Parameter and local-variable names declared anywhere in the function or lambda
    /// body currently being emitted (not counting names that belong to a nested
    /// lambda's own scope). Shadows `known_functions` for call-site dispatch.
    locals: HashSet<String>,
    /// Loop-counter variables statically known to be non-negative at the point they're
    /// used as an array index, because their `for`-loop init was a non-negative
    /// literal. Scoped to the enclosing loop only.
    tracked_nonneg: HashSet<String>,
    /// Every `rt_*` runtime ABI symbol referenced so far, with the C return type the
    /// first call site used it at. Declared `extern` in `finish()` — only the symbols a
    /// given module actually calls are declared, per SPEC_FULL.md's external-interface
    /// contract. Parameter types are deliberately left unspecified (K&R-style empty
    /// parens): the runtime ABI is an external boundary this crate does not implement,
    /// and eliding the parameter list means a runtime signature change never requires
    /// regenerating already-compiled callers.
    runtime_decls: BTreeMap<String, String>,
}

impl CodeGen {
    fn new(source_file: &str) -> Self {
        CodeGen {
            source_file: source_file.to_string(),
            globals: String::new(),
            module_init: String::new(),
            has_module_init: false,
            has_main: false,
            main_is_shared: false,
            function_decls: String::new(),
            function_defs: String::new(),
            lambdas: Vec::new(),
            lambda_count: 0,
            temp_count: 0,
            label_count: 0,
            arena_var: "arena".to_string(),
            boxed: HashSet::new(),
            known_functions: HashSet::new(),
            locals: HashSet::new(),
            tracked_nonneg: HashSet::new(),
            runtime_decls: BTreeMap::new(),
        }
    }

    /// Records that `name` was called with C return type `ret`, so `finish()` emits an
    /// `extern` declaration for it. First call site wins; every runtime function has one
    /// return type regardless of the element/type suffix baked into its name, so this
    /// never actually conflicts in practice.
    fn note_rt(&mut self, name: &str, ret: &str) -> String {
        self.runtime_decls.entry(name.to_string()).or_insert_with(|| ret.to_string());
        name.to_string()
    }

    fn fresh_temp(&mut self) -> String {
        self.temp_count += 1;
        format!("__t{}", self.temp_count)
    }

    fn fresh_label(&mut self, tag: &str) -> String {
        self.label_count += 1;
        format!("__{}_{}", tag, self.label_count)
    }

    fn run(&mut self, module: &Module) {
        self.has_main = module.has_main;
        for stmt in &module.statements {
            if let StmtKind::Function { name, .. } = &stmt.kind {
                self.known_functions.insert(name.clone());
            }
        }
        for stmt in &module.statements {
            if let StmtKind::Function { name, params, ret, modifier, .. } = &stmt.kind {
                self.emit_function_forward_decl(name, params, ret, *modifier);
                if name == "main" {
                    self.main_is_shared = effective_modifier(*modifier, ret) == FunctionModifier::Shared;
                }
            }
        }
        for stmt in &module.statements {
            match &stmt.kind {
                StmtKind::Function { name, params, ret, modifier, body } => {
                    self.emit_function(name, params, ret, *modifier, body);
                }
                StmtKind::VarDecl { name, ty, init, .. } => {
                    self.emit_global_var(name, ty.as_ref().expect("type checker fills every VarDecl's type"), init.as_ref());
                }
                StmtKind::Import { .. } => {}
                _ => {
                    self.has_module_init = true;
                    let saved_arena = std::mem::replace(&mut self.arena_var, "arena".to_string());
                    let mut buf = String::new();
                    self.emit_stmt(&mut buf, stmt, 1);
                    self.module_init.push_str(&buf);
                    self.arena_var = saved_arena;
                }
            }
        }
    }

    fn finish(self) -> String {
        let mut out = String::new();
        out.push_str(&format!("/* generated from {} */\n", self.source_file));
        out.push_str("#include <stdlib.h>\n#include <string.h>\n#include <stdio.h>\n#include <stdbool.h>\n#include <stdint.h>\n\n");
        out.push_str(RUNTIME_OPAQUE_TYPES);
        out.push_str("typedef struct { void *fn; void *env; } rt_closure_t;\n\n");
        for (name, ret) in &self.runtime_decls {
            out.push_str(&format!("extern {} {}();\n", ret, name));
        }
        if !self.runtime_decls.is_empty() {
            out.push('\n');
        }
        if !self.globals.is_empty() {
            out.push_str(&self.globals);
            out.push('\n');
        }
        out.push_str(&self.function_decls);
        out.push('\n');
        for lambda in &self.lambdas {
            if let Some(env) = &lambda.env_struct {
                out.push_str(env);
            }
            out.push_str(&lambda.forward_decl);
        }
        out.push('\n');
        for lambda in &self.lambdas {
            out.push_str(&lambda.definition);
            out.push('\n');
        }
        out.push_str(&self.function_defs);
        out.push('\n');
        if self.has_module_init {
            out.push_str("static void __module_init(Arena *arena) {\n");
            out.push_str(&self.module_init);
            out.push_str("}\n\n");
        }
        out.push_str("int main(void) {\n");
        out.push_str("    Arena __arena_storage;\n");
        out.push_str("    Arena *arena = &__arena_storage;\n");
        out.push_str("    rt_arena_init(arena);\n");
        if self.has_module_init {
            out.push_str("    __module_init(arena);\n");
        }
        if self.has_main {
            if self.main_is_shared {
                out.push_str("    fn_main(arena);\n");
            } else {
                out.push_str("    fn_main();\n");
            }
        }
        out.push_str("    rt_arena_destroy(arena);\n");
        out.push_str("    return 0;\n");
        out.push_str("}\n");
        out
    }

    // ---- declarations -------------------------------------------------------

    fn emit_function_forward_decl(&mut self, name: &str, params: &[Parameter], ret: &Type, modifier: FunctionModifier) {
        let sig = self.function_signature(name, params, ret, modifier);
        self.function_decls.push_str(&sig);
        self.function_decls.push_str(";\n");
    }

    fn function_signature(&self, name: &str, params: &[Parameter], ret: &Type, modifier: FunctionModifier) -> String {
        let mut args = Vec::new();
        if effective_modifier(modifier, ret) == FunctionModifier::Shared {
            args.push("Arena *arena".to_string());
        }
        for p in params {
            args.push(format!("{} v_{}", c_type(&p.ty), p.name.lexeme));
        }
        if args.is_empty() {
            args.push("void".to_string());
        }
        format!("{} fn_{}({})", c_type(ret), name, args.join(", "))
    }

    fn emit_function(&mut self, name: &str, params: &[Parameter], ret: &Type, modifier: FunctionModifier, body: &[Stmt]) {
        let effective = effective_modifier(modifier, ret);
        let boxed = collect_captured_primitive_names(body);
        let locals = collect_local_names(params, body);

        let mut arg_decls = Vec::new();
        if effective == FunctionModifier::Shared {
            arg_decls.push("Arena *arena".to_string());
        }
        for p in params {
            if boxed.contains(&p.name.lexeme) {
                arg_decls.push(format!("{} __arg_{}", c_type(&p.ty), p.name.lexeme));
            } else {
                arg_decls.push(format!("{} v_{}", c_type(&p.ty), p.name.lexeme));
            }
        }
        if arg_decls.is_empty() {
            arg_decls.push("void".to_string());
        }
        let mut def = format!("{} fn_{}({}) {{\n", c_type(ret), name, arg_decls.join(", "));

        let saved_arena = self.arena_var.clone();
        if effective == FunctionModifier::Shared {
            self.arena_var = "arena".to_string();
        } else {
            self.arena_var = "__local_arena".to_string();
            def.push_str("    Arena __local_arena_storage;\n");
            def.push_str("    Arena *__local_arena = &__local_arena_storage;\n");
            def.push_str("    rt_arena_init(__local_arena);\n");
        }

        for p in params {
            if boxed.contains(&p.name.lexeme) {
                def.push_str(&format!(
                    "    {ty} *v_{name} = ({ty} *)rt_arena_alloc({arena}, sizeof({ty}));\n    *v_{name} = __arg_{name};\n",
                    ty = c_type(&p.ty), name = p.name.lexeme, arena = self.arena_var
                ));
            }
        }

        let has_return = *ret != Type::Void;
        if has_return {
            def.push_str(&format!("    {} __retval;\n", c_type(ret)));
        }

        let saved_boxed = std::mem::replace(&mut self.boxed, boxed);
        let saved_locals = std::mem::replace(&mut self.locals, locals);
        let mut body_buf = String::new();
        for s in body {
            self.emit_stmt(&mut body_buf, s, 1);
        }
        self.boxed = saved_boxed;
        self.locals = saved_locals;
        def.push_str(&body_buf);

        def.push_str("__exit:\n");
        if effective != FunctionModifier::Shared {
            def.push_str("    rt_arena_destroy(__local_arena);\n");
        }
        if has_return {
            def.push_str("    return __retval;\n");
        } else {
            def.push_str("    return;\n");
        }
        def.push_str("}\n");

        self.arena_var = saved_arena;
        self.function_defs.push_str(&def);
        self.function_defs.push('\n');
    }

    fn emit_global_var(&mut self, name: &str, ty: &Type, init: Option<&Expr>) {
        match init {
            Some(e) if is_constant_literal(e) => {
                let value = self.literal_c_value(e);
                self.globals.push_str(&format!("static {} v_{} = {};\n", c_type(ty), name, value));
            }
            _ => {
                self.globals.push_str(&format!("static {} v_{};\n", c_type(ty), name));
                if let Some(e) = init {
                    self.has_module_init = true;
                    let saved_arena = std::mem::replace(&mut self.arena_var, "arena".to_string());
                    let mut buf = String::new();
                    let val = self.emit_expr(&mut buf, e, 1);
                    buf.push_str(&format!("    v_{} = {};\n", name, val));
                    self.module_init.push_str(&buf);
                    self.arena_var = saved_arena;
                }
            }
        }
    }

    fn literal_c_value(&self, e: &Expr) -> String {
        match &e.kind {
            ExprKind::Literal(Literal::Long(v)) => v.to_string(),
            ExprKind::Literal(Literal::Double(v)) => format!("{:?}", v),
            ExprKind::Literal(Literal::Bool(v)) => v.to_string(),
            ExprKind::Literal(Literal::Char(v)) => format!("{}", *v as u32),
            ExprKind::Literal(Literal::Nil) => "0".to_string(),
            _ => "0".to_string(),
        }
    }

    // ---- statements -----------------------------------------------------------

    fn indent(n: usize) -> String {
        "    ".repeat(n)
    }

    fn emit_stmt(&mut self, buf: &mut String, stmt: &Stmt, depth: usize) {
        let ind = Self::indent(depth);
        match &stmt.kind {
            StmtKind::ExprStmt(e) => {
                let v = self.emit_expr(buf, e, depth);
                let _ = v;
            }
            StmtKind::VarDecl { name, ty, init, .. } => {
                let ty = ty.as_ref().expect("type checker fills every VarDecl's type");
                if self.boxed.contains(name) {
                    buf.push_str(&format!(
                        "{}{} *v_{} = ({} *)rt_arena_alloc({}, sizeof({}));\n",
                        ind, c_type(ty), name, c_type(ty), self.arena_var, c_type(ty)
                    ));
                    if let Some(e) = init {
                        let v = self.emit_expr(buf, e, depth);
                        buf.push_str(&format!("{}*v_{} = {};\n", ind, name, v));
                    }
                } else {
                    match init {
                        Some(e) => {
                            let v = self.emit_expr(buf, e, depth);
                            buf.push_str(&format!("{}{} v_{} = {};\n", ind, c_type(ty), name, v));
                        }
                        None => {
                            buf.push_str(&format!("{}{} v_{};\n", ind, c_type(ty), name));
                        }
                    }
                }
            }
            StmtKind::Function { .. } => {
                // Nested named functions are lifted exactly like lambdas would be;
                // not reachable from valid parses today (the parser only produces
                // these at module scope), kept here so the match stays exhaustive.
            }
            StmtKind::Return(expr) => {
                if let Some(e) = expr {
                    let v = self.emit_expr(buf, e, depth);
                    buf.push_str(&format!("{}__retval = {};\n", ind, v));
                }
                buf.push_str(&format!("{}goto __exit;\n", ind));
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let c = self.emit_expr(buf, cond, depth);
                buf.push_str(&format!("{}if ({}) {{\n", ind, c));
                for s in then_branch {
                    self.emit_stmt(buf, s, depth + 1);
                }
                if let Some(else_body) = else_branch {
                    buf.push_str(&format!("{}}} else {{\n", ind));
                    for s in else_body {
                        self.emit_stmt(buf, s, depth + 1);
                    }
                }
                buf.push_str(&format!("{}}}\n", ind));
            }
            StmtKind::While { cond, body } => {
                buf.push_str(&format!("{}for (;;) {{\n", ind));
                let c = self.emit_expr(buf, cond, depth + 1);
                buf.push_str(&format!("{}    if (!({})) break;\n", ind, c));
                for s in body {
                    self.emit_stmt(buf, s, depth + 1);
                }
                buf.push_str(&format!("{}}}\n", ind));
            }
            StmtKind::For { init, cond, incr, body } => {
                buf.push_str(&format!("{}{{\n", ind));
                // A loop counter whose init is a non-negative literal is tracked for
                // the rest of the loop, so an index expression that's just that
                // variable skips the runtime negative-index check.
                let mut tracked_name = None;
                if let Some(init) = init {
                    match &**init {
                        ForInit::VarDecl { name, ty, init } => {
                            let ty = ty.clone().unwrap_or(Type::Long);
                            match init {
                                Some(e) => {
                                    let v = self.emit_expr(buf, e, depth + 1);
                                    buf.push_str(&format!("{}    {} v_{} = {};\n", ind, c_type(&ty), name, v));
                                    if matches!(&e.kind, ExprKind::Literal(Literal::Long(n)) if *n >= 0) {
                                        self.tracked_nonneg.insert(name.clone());
                                        tracked_name = Some(name.clone());
                                    }
                                }
                                None => buf.push_str(&format!("{}    {} v_{};\n", ind, c_type(&ty), name)),
                            }
                        }
                        ForInit::Expr(e) => {
                            self.emit_expr(buf, e, depth + 1);
                        }
                    }
                }
                buf.push_str(&format!("{}    for (;;) {{\n", ind));
                if let Some(cond) = cond {
                    let c = self.emit_expr(buf, cond, depth + 2);
                    buf.push_str(&format!("{}        if (!({})) break;\n", ind, c));
                }
                for s in body {
                    self.emit_stmt(buf, s, depth + 2);
                }
                if let Some(incr) = incr {
                    self.emit_expr(buf, incr, depth + 2);
                }
                buf.push_str(&format!("{}    }}\n", ind));
                buf.push_str(&format!("{}}}\n", ind));
                if let Some(name) = tracked_name {
                    self.tracked_nonneg.remove(&name);
                }
            }
            StmtKind::ForEach { var_name, iterable, body } => {
                let elem_ty = iterable.expr_type.borrow().as_ref().and_then(|t| t.element().cloned()).unwrap_or(Type::Any);
                let arr = self.emit_expr(buf, iterable, depth);
                let idx = self.fresh_temp();
                let length_fn = self.note_rt(&format!("rt_array_{}_length", elem_ty.runtime_suffix()), "int64_t");
                buf.push_str(&format!(
                    "{}for (int64_t {idx} = 0; {idx} < {len_fn}({arr}); {idx}++) {{\n",
                    ind,
                    idx = idx,
                    len_fn = length_fn,
                    arr = arr,
                ));
                let get_fn = self.note_rt(&format!("rt_array_{}_get", elem_ty.runtime_suffix()), &c_type(&elem_ty));
                buf.push_str(&format!(
                    "{}    {} v_{} = {}({}, {});\n",
                    ind, c_type(&elem_ty), var_name, get_fn, arr, idx
                ));
                for s in body {
                    self.emit_stmt(buf, s, depth + 1);
                }
                buf.push_str(&format!("{}}}\n", ind));
            }
            StmtKind::Block(body) => {
                buf.push_str(&format!("{}{{\n", ind));
                for s in body {
                    self.emit_stmt(buf, s, depth + 1);
                }
                buf.push_str(&format!("{}}}\n", ind));
            }
            StmtKind::Import { .. } => {}
            StmtKind::Break => buf.push_str(&format!("{}break;\n", ind)),
            StmtKind::Continue => buf.push_str(&format!("{}continue;\n", ind)),
        }
    }

    // ---- expressions ------------------------------------------------------------

    /// Lowers `expr`, emitting any supporting statements into `buf` and returning a C
    /// expression text denoting its value.
    fn emit_expr(&mut self, buf: &mut String, expr: &Expr, depth: usize) -> String {
        let ty = expr.expr_type.borrow().clone().unwrap_or(Type::Nil);
        match &expr.kind {
            ExprKind::Literal(lit) => self.emit_literal(lit, &expr.token.kind),
            ExprKind::Variable(name) => {
                if self.boxed.contains(name) {
                    format!("(*v_{})", name)
                } else {
                    format!("v_{}", name)
                }
            }
            ExprKind::Assign { name, value } => {
                let v = self.emit_expr(buf, value, depth);
                let ind = Self::indent(depth);
                if self.boxed.contains(name) {
                    buf.push_str(&format!("{}*v_{} = {};\n", ind, name, v));
                    format!("(*v_{})", name)
                } else {
                    buf.push_str(&format!("{}v_{} = {};\n", ind, name, v));
                    format!("v_{}", name)
                }
            }
            ExprKind::IndexAssign { target, index, value } => {
                let elem_ty = target.expr_type.borrow().as_ref().and_then(|t| t.element().cloned()).unwrap_or(Type::Any);
                let t = self.emit_expr(buf, target, depth);
                let i = self.emit_index(buf, &t, &elem_ty, index, depth);
                let v = self.emit_expr(buf, value, depth);
                let ind = Self::indent(depth);
                let fname = self.note_rt(&format!("rt_array_{}_set", elem_ty.runtime_suffix()), "void");
                buf.push_str(&format!(
                    "{}{}({}, {}, {}, {});\n",
                    ind, fname, self.arena_var, t, i, v
                ));
                v
            }
            ExprKind::Unary { op, operand } => {
                let o = self.emit_expr(buf, operand, depth);
                match op {
                    UnaryOp::Neg => format!("(-({}))", o),
                    UnaryOp::Not => format!("(!({}))", o),
                }
            }
            ExprKind::Binary { op, left, right } => self.emit_binary(buf, *op, left, right, depth),
            ExprKind::Call { callee, args } => self.emit_call(buf, callee, args, &ty, depth),
            ExprKind::StaticCall { type_name, method, args } => {
                let ret = c_type(&ty);
                let fname = self.note_rt(&builtins::static_call_name(type_name, method), &ret);
                let mut arg_vals: Vec<String> = vec![self.arena_var.clone()];
                for a in args {
                    arg_vals.push(self.emit_expr(buf, a, depth));
                }
                format!("{}({})", fname, arg_vals.join(", "))
            }
            ExprKind::Member { object, name } => {
                let receiver_ty = object.expr_type.borrow().clone().unwrap_or(Type::Any);
                let o = self.emit_expr(buf, object, depth);
                let ret = c_type(&ty);
                let fname = self.note_rt(&builtins::property_call_name(&receiver_ty, name), &ret);
                format!("{}({})", fname, o)
            }
            ExprKind::Array(elements) => self.emit_array_literal(buf, &ty, elements, depth),
            ExprKind::ArrayAccess { array, index } => {
                let elem_ty = array.expr_type.borrow().as_ref().and_then(|t| t.element().cloned()).unwrap_or(Type::Any);
                let a = self.emit_expr(buf, array, depth);
                let i = self.emit_index(buf, &a, &elem_ty, index, depth);
                let fname = self.note_rt(&format!("rt_array_{}_get", elem_ty.runtime_suffix()), &c_type(&elem_ty));
                format!("{}({}, {})", fname, a, i)
            }
            ExprKind::ArraySlice { array, start, end, step } => {
                let elem_ty = array.expr_type.borrow().as_ref().and_then(|t| t.element().cloned()).unwrap_or(Type::Any);
                let a = self.emit_expr(buf, array, depth);
                let s = start.as_ref().map(|e| self.emit_index(buf, &a, &elem_ty, e, depth)).unwrap_or_else(|| "0".to_string());
                let e = end.as_ref().map(|e| self.emit_index(buf, &a, &elem_ty, e, depth)).unwrap_or_else(|| {
                    let length_fn = self.note_rt(&format!("rt_array_{}_length", elem_ty.runtime_suffix()), "int64_t");
                    format!("{}({})", length_fn, a)
                });
                let st = step.as_ref().map(|e| self.emit_expr(buf, e, depth)).unwrap_or_else(|| "1".to_string());
                let slice_fn = self.note_rt(&format!("rt_array_{}_slice", elem_ty.runtime_suffix()), "rt_array_t *");
                format!("{}({}, {}, {}, {}, {})", slice_fn, self.arena_var, a, s, e, st)
            }
            ExprKind::Range { start, end } => {
                let s = self.emit_expr(buf, start, depth);
                let e = self.emit_expr(buf, end, depth);
                let fname = self.note_rt("rt_array_long_range", "rt_array_t *");
                format!("{}({}, {}, {})", fname, self.arena_var, s, e)
            }
            ExprKind::Spread(inner) => self.emit_expr(buf, inner, depth),
            ExprKind::Increment(operand) | ExprKind::Decrement(operand) => {
                let o = self.emit_expr(buf, operand, depth);
                let op = if matches!(expr.kind, ExprKind::Increment(_)) { "++" } else { "--" };
                let ind = Self::indent(depth);
                buf.push_str(&format!("{}{}{};\n", ind, o, op));
                o
            }
            ExprKind::Interpolated(parts) => self.emit_interpolated(buf, parts, depth),
            ExprKind::Lambda(lambda) => self.emit_lambda(buf, lambda, depth),
            ExprKind::SizedArrayAlloc { element, size, default } => {
                let n = self.emit_expr(buf, size, depth);
                match default {
                    Some(d) => {
                        let dv = self.emit_expr(buf, d, depth);
                        let fname = self.note_rt(&format!("rt_array_{}_alloc_default", element.runtime_suffix()), "rt_array_t *");
                        format!("{}({}, {}, {})", fname, self.arena_var, n, dv)
                    }
                    None => {
                        let fname = self.note_rt(&format!("rt_array_{}_alloc", element.runtime_suffix()), "rt_array_t *");
                        format!("{}({}, {})", fname, self.arena_var, n)
                    }
                }
            }
            ExprKind::ThreadSpawn(inner) => {
                let v = self.emit_expr(buf, inner, depth);
                let fname = self.note_rt("rt_thread_spawn", "void *");
                format!("{}({}, {})", fname, self.arena_var, v)
            }
            ExprKind::ThreadSync(inner) => {
                let v = self.emit_expr(buf, inner, depth);
                let fname = self.note_rt("rt_thread_join", &c_type(&ty));
                format!("{}({})", fname, v)
            }
            ExprKind::SyncList(elements) => {
                let temp = self.fresh_temp();
                let ind = Self::indent(depth);
                let alloc_fn = self.note_rt("rt_array_ptr_alloc", "rt_array_t *");
                buf.push_str(&format!(
                    "{}rt_array_t *{} = {}({}, {});\n",
                    ind, temp, alloc_fn, self.arena_var, elements.len()
                ));
                let set_fn = self.note_rt("rt_array_ptr_set", "void");
                let join_fn = self.note_rt("rt_thread_join", "void *");
                for (i, e) in elements.iter().enumerate() {
                    let v = self.emit_expr(buf, e, depth);
                    buf.push_str(&format!("{}{}({}, {}, {}({}));\n", ind, set_fn, temp, i, join_fn, v));
                }
                temp
            }
            ExprKind::AsVal(inner) => {
                let inner_ty = inner.expr_type.borrow().clone().unwrap_or(Type::Any);
                let v = self.emit_expr(buf, inner, depth);
                let fname = self.note_rt(&format!("rt_clone_{}", inner_ty.runtime_suffix()), &c_type(&inner_ty));
                format!("{}({}, {})", fname, self.arena_var, v)
            }
            ExprKind::TypeOf(inner) => {
                let inner_ty = inner.expr_type.borrow().clone().unwrap_or(Type::Any);
                if inner_ty == Type::Any {
                    let v = self.emit_expr(buf, inner, depth);
                    let fname = self.note_rt("rt_any_tag", "int32_t");
                    format!("{}({})", fname, v)
                } else {
                    self.emit_expr(buf, inner, depth);
                    inner_ty.tag_name().to_string()
                }
            }
            ExprKind::Is { value, ty } => {
                let v = self.emit_expr(buf, value, depth);
                let fname = self.note_rt("rt_any_tag", "int32_t");
                format!("({}({}) == {})", fname, v, ty.tag_name())
            }
            ExprKind::AsType { value, ty } => {
                let v = self.emit_expr(buf, value, depth);
                let fname = self.note_rt(&format!("rt_checked_cast_{}", ty.runtime_suffix()), &c_type(ty));
                format!("{}({})", fname, v)
            }
        }
    }

    fn emit_literal(&mut self, lit: &Literal, kind: &TokenKind) -> String {
        match lit {
            Literal::Long(v) => match kind {
                TokenKind::LongLiteral => format!("{}L", v),
                _ => v.to_string(),
            },
            Literal::Double(v) => format!("{:?}", v),
            Literal::Str(s) => {
                let fname = self.note_rt("rt_string_from_literal", "rt_string_t *");
                format!("{}({}, {:?}, {})", fname, self.arena_var, s, s.len())
            }
            Literal::Char(c) => format!("((rt_char_t){})", *c as u32),
            Literal::Bool(b) => b.to_string(),
            Literal::Nil => "0".to_string(),
        }
    }

    fn emit_binary(&mut self, buf: &mut String, op: BinaryOp, left: &Expr, right: &Expr, depth: usize) -> String {
        let lt = left.expr_type.borrow().clone().unwrap_or(Type::Nil);
        let rt = right.expr_type.borrow().clone().unwrap_or(Type::Nil);
        let l = self.emit_expr(buf, left, depth);
        let r = self.emit_expr(buf, right, depth);

        // Native-op selection: both operands primitive and comparable with a plain C
        // operator go straight to one; anything heap-borne routes through the runtime
        // (the only peephole-level optimization this backend performs, see Non-goals).
        if op.is_logical() {
            return format!("({} {} {})", l, if op == BinaryOp::And { "&&" } else { "||" }, r);
        }
        if lt.is_primitive() && rt.is_primitive() {
            return format!("({} {} {})", l, op.native_op(), r);
        }
        if op == BinaryOp::Add && lt == Type::String && rt == Type::String {
            let fname = self.note_rt("rt_string_concat", "rt_string_t *");
            return format!("{}({}, {}, {})", fname, self.arena_var, l, r);
        }
        let suffix = lt.runtime_suffix();
        let ret = if op.is_comparison() { "bool".to_string() } else { c_type(&lt) };
        let fname = self.note_rt(&builtins::binary_op_call_name(op.rt_name(), suffix), &ret);
        format!("{}({}, {})", fname, l, r)
    }

    fn emit_call(&mut self, buf: &mut String, callee: &Expr, args: &[Expr], ret_ty: &Type, depth: usize) -> String {
        if let ExprKind::Member { object, name } = &callee.kind {
            let receiver_ty = object.expr_type.borrow().clone().unwrap_or(Type::Any);
            let o = self.emit_expr(buf, object, depth);
            let fname = self.note_rt(&builtins::method_call_name(&receiver_ty, name), &c_type(ret_ty));
            let mut arg_vals = vec![self.arena_var.clone(), o];
            for a in args {
                arg_vals.push(self.emit_expr(buf, a, depth));
            }
            return format!("{}({})", fname, arg_vals.join(", "));
        }

        if let ExprKind::Variable(name) = &callee.kind {
            match name.as_str() {
                "print" | "println" => {
                    let mut arg_vals = Vec::new();
                    for a in args {
                        arg_vals.push(self.emit_expr(buf, a, depth));
                    }
                    let fname = self.note_rt(if name == "println" { "rt_println" } else { "rt_print" }, "void");
                    return format!("{}({})", fname, arg_vals.join(", "));
                }
                "len" => {
                    let v = self.emit_expr(buf, &args[0], depth);
                    let suffix = args[0].expr_type.borrow().as_ref().and_then(|t| t.element()).map(|e| e.runtime_suffix()).unwrap_or("string");
                    return if *args[0].expr_type.borrow() == Some(Type::String) {
                        let fname = self.note_rt("rt_string_length", "int64_t");
                        format!("{}({})", fname, v)
                    } else {
                        let fname = self.note_rt(&format!("rt_array_{}_length", suffix), "int64_t");
                        format!("{}({})", fname, v)
                    };
                }
                _ => {}
            }
        }

        let callee_ty = callee.expr_type.borrow().clone();
        // A bare `Variable` callee only reaches `fn_<name>` if it names a module-level
        // function declaration and isn't shadowed by a local of the same name — a
        // function-typed local or parameter is an ordinary value (a `rt_closure_t`)
        // and must go through the generic closure-call path below instead.
        if let ExprKind::Variable(name) = &callee.kind {
            if self.known_functions.contains(name) && !self.locals.contains(name) {
                let shared = matches!(&callee_ty, Some(Type::Function { ret, .. }) if ret.is_heap_borne());
                let mut arg_vals = Vec::new();
                if shared {
                    arg_vals.push(self.arena_var.clone());
                }
                for a in args {
                    arg_vals.push(self.emit_expr(buf, a, depth));
                }
                return format!("fn_{}({})", name, arg_vals.join(", "));
            }
        }

        // Generic call through a first-class closure value. The callee is evaluated
        // once into a temp so a side-effecting callee expression (`getFn()()`) isn't
        // run twice, and the env binding uses a fresh name so two closure calls in the
        // same block don't collide on redeclaration.
        let c = self.emit_expr(buf, callee, depth);
        let ret_ty = match &callee_ty {
            Some(Type::Function { ret, .. }) => (**ret).clone(),
            _ => Type::Nil,
        };
        let param_c_types: Vec<String> = match &callee_ty {
            Some(Type::Function { params, .. }) => params.iter().map(c_type).collect(),
            _ => args.iter().map(|a| c_type(&a.expr_type.borrow().clone().unwrap_or(Type::Any))).collect(),
        };
        let ind = Self::indent(depth);
        let closure_temp = self.fresh_temp();
        buf.push_str(&format!("{}rt_closure_t *{} = (rt_closure_t *){};\n", ind, closure_temp, c));
        let env_temp = self.fresh_temp();
        buf.push_str(&format!("{}void *{} = {}->env;\n", ind, env_temp, closure_temp));
        let mut arg_vals = vec![env_temp, self.arena_var.clone()];
        for a in args {
            arg_vals.push(self.emit_expr(buf, a, depth));
        }
        let temp = self.fresh_temp();
        let mut sig_params = vec!["void*".to_string(), "Arena*".to_string()];
        sig_params.extend(param_c_types);
        buf.push_str(&format!(
            "{}{} {} = (({} (*)({})){}->fn)({});\n",
            ind,
            c_type(&ret_ty),
            temp,
            c_type(&ret_ty),
            sig_params.join(", "),
            closure_temp,
            arg_vals.join(", ")
        ));
        temp
    }

    /// Lowers an index-shaped position (array-access index, slice bound) per the
    /// negative-index convention: a non-negative literal or a variable tracked as a
    /// non-negative loop counter is emitted directly; a negative literal becomes
    /// `length + <literal>`; anything else is adjusted at runtime into a temp.
    fn emit_index(&mut self, buf: &mut String, array_c: &str, elem_ty: &Type, index: &Expr, depth: usize) -> String {
        if let ExprKind::Literal(Literal::Long(v)) = &index.kind {
            if *v >= 0 {
                return self.emit_expr(buf, index, depth);
            }
        }
        if let ExprKind::Unary { op: UnaryOp::Neg, operand } = &index.kind {
            if let ExprKind::Literal(Literal::Long(v)) = &operand.kind {
                let length_fn = self.note_rt(&format!("rt_array_{}_length", elem_ty.runtime_suffix()), "int64_t");
                return format!("{}({}) + -{}", length_fn, array_c, v);
            }
        }
        if let ExprKind::Variable(name) = &index.kind {
            if self.tracked_nonneg.contains(name) {
                return self.emit_expr(buf, index, depth);
            }
        }
        let i = self.emit_expr(buf, index, depth);
        let length_fn = self.note_rt(&format!("rt_array_{}_length", elem_ty.runtime_suffix()), "int64_t");
        let temp = self.fresh_temp();
        let ind = Self::indent(depth);
        buf.push_str(&format!(
            "{}int64_t {} = (({}) < 0 ? {}({}) + ({}) : ({}));\n",
            ind, temp, i, length_fn, array_c, i, i
        ));
        temp
    }

    fn emit_array_literal(&mut self, buf: &mut String, array_ty: &Type, elements: &[Expr], depth: usize) -> String {
        let elem_ty = array_ty.element().cloned().unwrap_or(Type::Any);
        let temp = self.fresh_temp();
        let ind = Self::indent(depth);
        let alloc_fn = self.note_rt(&format!("rt_array_{}_alloc", elem_ty.runtime_suffix()), "rt_array_t *");
        buf.push_str(&format!(
            "{}rt_array_t *{} = {}({}, 0);\n",
            ind, temp, alloc_fn, self.arena_var
        ));
        for element in elements {
            match &element.kind {
                ExprKind::Spread(inner) => {
                    let v = self.emit_expr(buf, inner, depth);
                    let fname = self.note_rt(&format!("rt_array_{}_extend", elem_ty.runtime_suffix()), "void");
                    buf.push_str(&format!(
                        "{}{}({}, {});\n",
                        ind, fname, temp, v
                    ));
                }
                _ => {
                    let v = self.emit_expr(buf, element, depth);
                    let fname = self.note_rt(&format!("rt_array_{}_push", elem_ty.runtime_suffix()), "void");
                    buf.push_str(&format!("{}{}({}, {});\n", ind, fname, temp, v));
                }
            }
        }
        temp
    }

    fn emit_interpolated(&mut self, buf: &mut String, parts: &[InterpPart], depth: usize) -> String {
        let temp = self.fresh_temp();
        let ind = Self::indent(depth);
        let new_fn = self.note_rt("rt_string_builder_new", "rt_string_t *");
        buf.push_str(&format!("{}rt_string_t *{} = {}({});\n", ind, temp, new_fn, self.arena_var));
        let append_literal_fn = self.note_rt("rt_string_builder_append_literal", "void");
        for part in parts {
            match part {
                InterpPart::Literal(s) => {
                    buf.push_str(&format!(
                        "{}{}({}, {:?}, {});\n",
                        ind, append_literal_fn, temp, s, s.len()
                    ));
                }
                InterpPart::Expr { expr, spec } => {
                    let v = self.emit_expr(buf, expr, depth);
                    let ty = expr.expr_type.borrow().clone().unwrap_or(Type::Any);
                    let spec_arg = match spec {
                        Some(s) => format!("{:?}", s),
                        None => "NULL".to_string(),
                    };
                    let fname = self.note_rt(&format!("rt_string_builder_append_{}", ty.runtime_suffix()), "void");
                    buf.push_str(&format!(
                        "{}{}({}, {}, {});\n",
                        ind, fname, temp, v, spec_arg
                    ));
                }
            }
        }
        let finish_fn = self.note_rt("rt_string_builder_finish", "rt_string_t *");
        format!("{}({})", finish_fn, temp)
    }

    fn emit_lambda(&mut self, buf: &mut String, lambda: &LambdaExpr, depth: usize) -> String {
        self.lambda_count += 1;
        let id = self.lambda_count;
        let name = format!("lambda_{}", id);
        lambda.lifted_id.set(Some(id));

        let captures = collect_free_variables(lambda);
        let env_name = format!("{}_env_t", name);
        let ret_ty = lambda.ret.clone().unwrap_or(Type::Void);

        // Names local to this lambda (its own parameters or locals) that a lambda
        // nested further inside captures as a primitive — those need boxing here too,
        // same as for an enclosing function body.
        let own_boxed = match &lambda.body {
            LambdaBody::Expr(e) => collect_captured_primitive_names_expr(e),
            LambdaBody::Block(stmts) => collect_captured_primitive_names(stmts),
        };
        // Primitive captures from the enclosing scope already arrive boxed there, so
        // they stay pointers here too: the env struct field and the local alias both
        // keep the pointer, and reads/writes dereference it like any other boxed name.
        let mut body_boxed = own_boxed;
        for (cname, cty) in &captures {
            if cty.is_primitive() {
                body_boxed.insert(cname.clone());
            }
        }

        let mut params = vec!["void *__env".to_string(), "Arena *arena".to_string()];
        for p in &lambda.params {
            if body_boxed.contains(&p.name.lexeme) {
                params.push(format!("{} __arg_{}", c_type(&p.ty), p.name.lexeme));
            } else {
                params.push(format!("{} v_{}", c_type(&p.ty), p.name.lexeme));
            }
        }

        let mut def = String::new();
        def.push_str(&format!("static {} {}({}) {{\n", c_type(&ret_ty), name, params.join(", ")));
        if !captures.is_empty() {
            def.push_str(&format!("    {} *__cap = ({} *)__env;\n", env_name, env_name));
            for (cname, cty) in &captures {
                if cty.is_primitive() {
                    def.push_str(&format!("    {} *v_{} = __cap->v_{};\n", c_type(cty), cname, cname));
                } else {
                    def.push_str(&format!("    {} v_{} = __cap->v_{};\n", c_type(cty), cname, cname));
                }
            }
        }
        for p in &lambda.params {
            if body_boxed.contains(&p.name.lexeme) {
                def.push_str(&format!(
                    "    {ty} *v_{name} = ({ty} *)rt_arena_alloc(arena, sizeof({ty}));\n    *v_{name} = __arg_{name};\n",
                    ty = c_type(&p.ty), name = p.name.lexeme
                ));
            }
        }

        let has_return = ret_ty != Type::Void;
        if has_return {
            def.push_str(&format!("    {} __retval;\n", c_type(&ret_ty)));
        }

        // Every lifted lambda keeps the same `(void *__env, Arena *arena, ...)`
        // signature regardless of modifier, since call sites invoke it through one
        // generic function-pointer cast. A `private` lambda still receives that
        // `arena` parameter for ABI uniformity but ignores it: it owns and destroys a
        // local arena of its own, same as a private top-level function.
        let is_private = lambda.modifier == FunctionModifier::Private;
        let saved_arena = std::mem::replace(
            &mut self.arena_var,
            if is_private { "__local_arena".to_string() } else { "arena".to_string() },
        );
        if is_private {
            def.push_str("    (void)arena;\n");
            def.push_str("    Arena __local_arena_storage;\n");
            def.push_str("    Arena *__local_arena = &__local_arena_storage;\n");
            def.push_str("    rt_arena_init(__local_arena);\n");
        }
        let locals = match &lambda.body {
            LambdaBody::Expr(_) => lambda.params.iter().map(|p| p.name.lexeme.clone()).collect(),
            LambdaBody::Block(stmts) => collect_local_names(&lambda.params, stmts),
        };
        let saved_boxed = std::mem::replace(&mut self.boxed, body_boxed);
        let saved_locals = std::mem::replace(&mut self.locals, locals);
        let mut body_buf = String::new();
        match &lambda.body {
            LambdaBody::Expr(e) => {
                let v = self.emit_expr(&mut body_buf, e, 1);
                if has_return {
                    body_buf.push_str(&format!("    __retval = {};\n", v));
                }
            }
            LambdaBody::Block(stmts) => {
                for s in stmts {
                    self.emit_stmt(&mut body_buf, s, 1);
                }
            }
        }
        self.boxed = saved_boxed;
        self.locals = saved_locals;
        self.arena_var = saved_arena;
        def.push_str(&body_buf);
        def.push_str("__exit:\n");
        if is_private {
            def.push_str("    rt_arena_destroy(__local_arena);\n");
        }
        if has_return {
            def.push_str("    return __retval;\n");
        } else {
            def.push_str("    return;\n");
        }
        def.push_str("}\n");

        let forward_decl = format!("static {} {}({});\n", c_type(&ret_ty), name, params.join(", "));

        let env_struct = if captures.is_empty() {
            None
        } else {
            let mut s = String::new();
            s.push_str(&format!("typedef struct {{\n"));
            for (cname, cty) in &captures {
                if cty.is_primitive() {
                    s.push_str(&format!("    {} *v_{};\n", c_type(cty), cname));
                } else {
                    s.push_str(&format!("    {} v_{};\n", c_type(cty), cname));
                }
            }
            s.push_str(&format!("}} {};\n\n", env_name));
            Some(s)
        };

        self.lambdas.push(LiftedLambda { name: name.clone(), env_struct, forward_decl, definition: def });

        let closure_temp = self.fresh_temp();
        let ind = Self::indent(depth);
        if captures.is_empty() {
            buf.push_str(&format!(
                "{}rt_closure_t {} = {{ (void *){}, 0 }};\n",
                ind, closure_temp, name
            ));
        } else {
            let env_temp = self.fresh_temp();
            buf.push_str(&format!(
                "{}{} *{} = ({} *)rt_arena_alloc({}, sizeof({}));\n",
                ind, env_name, env_temp, env_name, self.arena_var, env_name
            ));
            for (cname, _) in &captures {
                buf.push_str(&format!("{}{}->v_{} = v_{};\n", ind, env_temp, cname, cname));
            }
            buf.push_str(&format!(
                "{}rt_closure_t {} = {{ (void *){}, (void *){} }};\n",
                ind, closure_temp, name, env_temp
            ));
        }
        closure_temp
    }
}

fn effective_modifier(modifier: FunctionModifier, ret: &Type) -> FunctionModifier {
    if modifier == FunctionModifier::Default && ret.is_heap_borne() {
        FunctionModifier::Shared
    } else {
        modifier
    }
}

fn is_constant_literal(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Literal(_))
}

fn c_type(ty: &Type) -> String {
    match ty {
        Type::Int | Type::Int32 => "int32_t".to_string(),
        Type::Long => "int64_t".to_string(),
        Type::UInt | Type::UInt32 => "uint32_t".to_string(),
        Type::Float => "float".to_string(),
        Type::Double => "double".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Byte => "uint8_t".to_string(),
        Type::Char => "rt_char_t".to_string(),
        Type::String => "rt_string_t *".to_string(),
        Type::Void => "void".to_string(),
        Type::Nil | Type::Any => "rt_any_t".to_string(),
        Type::Array(_) => "rt_array_t *".to_string(),
        Type::Function { .. } => "rt_closure_t".to_string(),
        Type::TextFile => "rt_textfile_t *".to_string(),
        Type::BinaryFile => "rt_binaryfile_t *".to_string(),
        Type::Time => "rt_time_t".to_string(),
        Type::Date => "rt_date_t".to_string(),
        Type::Process => "rt_process_t *".to_string(),
        Type::TcpListener => "rt_tcplistener_t *".to_string(),
        Type::TcpStream => "rt_tcpstream_t *".to_string(),
        Type::UdpSocket => "rt_udpsocket_t *".to_string(),
        Type::Random => "rt_random_t *".to_string(),
        Type::Uuid => "rt_uuid_t".to_string(),
    }
}

/// Names declared in `body` (parameters of an enclosing function are passed in
/// separately by the caller via the symbol they declare) that a lambda somewhere
/// inside `body` captures as a primitive. These must be emitted as heap pointers so a
/// later mutation through the closure is visible here.
/// Names bound anywhere in `body` (parameters plus every `var`, `for`-init and
/// `for-each` loop variable), without crossing into a nested lambda's own body or
/// parameter list — that's a separate function scope with its own names. Used to tell
/// a call to a same-named local apart from a call to a module-level function.
fn collect_local_names(params: &[Parameter], body: &[Stmt]) -> HashSet<String> {
    let mut names: HashSet<String> = params.iter().map(|p| p.name.lexeme.clone()).collect();
    collect_local_names_in_stmts(body, &mut names);
    names
}

fn collect_local_names_in_stmts(stmts: &[Stmt], names: &mut HashSet<String>) {
    for s in stmts {
        collect_local_names_in_stmt(s, names);
    }
}

fn collect_local_names_in_stmt(stmt: &Stmt, names: &mut HashSet<String>) {
    match &stmt.kind {
        StmtKind::VarDecl { name, .. } => {
            names.insert(name.clone());
        }
        StmtKind::If { then_branch, else_branch, .. } => {
            collect_local_names_in_stmts(then_branch, names);
            if let Some(body) = else_branch {
                collect_local_names_in_stmts(body, names);
            }
        }
        StmtKind::While { body, .. } => collect_local_names_in_stmts(body, names),
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init {
                if let ForInit::VarDecl { name, .. } = &**init {
                    names.insert(name.clone());
                }
            }
            collect_local_names_in_stmts(body, names);
        }
        StmtKind::ForEach { var_name, body, .. } => {
            names.insert(var_name.clone());
            collect_local_names_in_stmts(body, names);
        }
        StmtKind::Block(body) => collect_local_names_in_stmts(body, names),
        StmtKind::ExprStmt(_)
        | StmtKind::Function { .. }
        | StmtKind::Return(_)
        | StmtKind::Import { .. }
        | StmtKind::Break
        | StmtKind::Continue => {}
    }
}

fn collect_captured_primitive_names(body: &[Stmt]) -> HashSet<String> {
    let mut lambdas = Vec::new();
    collect_lambdas_in_stmts(body, &mut lambdas);
    captured_primitives_of(&lambdas)
}

fn collect_captured_primitive_names_expr(expr: &Expr) -> HashSet<String> {
    let mut lambdas = Vec::new();
    collect_lambdas_in_expr(expr, &mut lambdas);
    captured_primitives_of(&lambdas)
}

fn captured_primitives_of(lambdas: &[&LambdaExpr]) -> HashSet<String> {
    let mut out = HashSet::new();
    for lambda in lambdas {
        for (name, ty) in collect_free_variables(lambda) {
            if ty.is_primitive() {
                out.insert(name);
            }
        }
    }
    out
}

/// Collects every `Lambda` expression reachable from `stmts` without descending into
/// a lambda's own body — each such lambda's `collect_free_variables` already bubbles up
/// anything it in turn captures from a lambda nested inside it.
fn collect_lambdas_in_stmts<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a LambdaExpr>) {
    for s in stmts {
        collect_lambdas_in_stmt(s, out);
    }
}

fn collect_lambdas_in_stmt<'a>(stmt: &'a Stmt, out: &mut Vec<&'a LambdaExpr>) {
    match &stmt.kind {
        StmtKind::ExprStmt(e) => collect_lambdas_in_expr(e, out),
        StmtKind::VarDecl { init, .. } => {
            if let Some(e) = init {
                collect_lambdas_in_expr(e, out);
            }
        }
        StmtKind::Function { .. } => {}
        StmtKind::Return(e) => {
            if let Some(e) = e {
                collect_lambdas_in_expr(e, out);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            collect_lambdas_in_expr(cond, out);
            collect_lambdas_in_stmts(then_branch, out);
            if let Some(body) = else_branch {
                collect_lambdas_in_stmts(body, out);
            }
        }
        StmtKind::While { cond, body } => {
            collect_lambdas_in_expr(cond, out);
            collect_lambdas_in_stmts(body, out);
        }
        StmtKind::For { init, cond, incr, body } => {
            if let Some(init) = init {
                match &**init {
                    ForInit::VarDecl { init, .. } => {
                        if let Some(e) = init {
                            collect_lambdas_in_expr(e, out);
                        }
                    }
                    ForInit::Expr(e) => collect_lambdas_in_expr(e, out),
                }
            }
            if let Some(cond) = cond {
                collect_lambdas_in_expr(cond, out);
            }
            collect_lambdas_in_stmts(body, out);
            if let Some(incr) = incr {
                collect_lambdas_in_expr(incr, out);
            }
        }
        StmtKind::ForEach { iterable, body, .. } => {
            collect_lambdas_in_expr(iterable, out);
            collect_lambdas_in_stmts(body, out);
        }
        StmtKind::Block(body) => collect_lambdas_in_stmts(body, out),
        StmtKind::Import { .. } | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn collect_lambdas_in_expr<'a>(expr: &'a Expr, out: &mut Vec<&'a LambdaExpr>) {
    match &expr.kind {
        ExprKind::Lambda(lambda) => out.push(lambda),
        ExprKind::Assign { value, .. } => collect_lambdas_in_expr(value, out),
        ExprKind::IndexAssign { target, index, value } => {
            collect_lambdas_in_expr(target, out);
            collect_lambdas_in_expr(index, out);
            collect_lambdas_in_expr(value, out);
        }
        ExprKind::Unary { operand, .. } => collect_lambdas_in_expr(operand, out),
        ExprKind::Binary { left, right, .. } => {
            collect_lambdas_in_expr(left, out);
            collect_lambdas_in_expr(right, out);
        }
        ExprKind::Call { callee, args } => {
            collect_lambdas_in_expr(callee, out);
            for a in args {
                collect_lambdas_in_expr(a, out);
            }
        }
        ExprKind::StaticCall { args, .. } => {
            for a in args {
                collect_lambdas_in_expr(a, out);
            }
        }
        ExprKind::Member { object, .. } => collect_lambdas_in_expr(object, out),
        ExprKind::Array(elements) | ExprKind::SyncList(elements) => {
            for e in elements {
                collect_lambdas_in_expr(e, out);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            collect_lambdas_in_expr(array, out);
            collect_lambdas_in_expr(index, out);
        }
        ExprKind::ArraySlice { array, start, end, step } => {
            collect_lambdas_in_expr(array, out);
            for e in [start, end, step].into_iter().flatten() {
                collect_lambdas_in_expr(e, out);
            }
        }
        ExprKind::Range { start, end } => {
            collect_lambdas_in_expr(start, out);
            collect_lambdas_in_expr(end, out);
        }
        ExprKind::Spread(inner)
        | ExprKind::Increment(inner)
        | ExprKind::Decrement(inner)
        | ExprKind::ThreadSpawn(inner)
        | ExprKind::ThreadSync(inner)
        | ExprKind::AsVal(inner)
        | ExprKind::TypeOf(inner) => collect_lambdas_in_expr(inner, out),
        ExprKind::Interpolated(parts) => {
            for part in parts {
                if let InterpPart::Expr { expr, .. } = part {
                    collect_lambdas_in_expr(expr, out);
                }
            }
        }
        ExprKind::SizedArrayAlloc { size, default, .. } => {
            collect_lambdas_in_expr(size, out);
            if let Some(d) = default {
                collect_lambdas_in_expr(d, out);
            }
        }
        ExprKind::Is { value, .. } | ExprKind::AsType { value, .. } => collect_lambdas_in_expr(value, out),
        ExprKind::Literal(_) | ExprKind::Variable(_) => {}
    }
}

/// Collects the free variables of a lambda body: identifiers referenced that are not
/// among the lambda's own parameters and not bound by a nested declaration inside the
/// body (a block's own `var`, a `for`/`for-each` loop variable). Each capture's type
/// comes from the first reference's `expr_type`, which the type checker has already
/// filled in.
fn collect_free_variables(lambda: &LambdaExpr) -> Vec<(String, Type)> {
    let mut bound: Vec<String> = lambda.params.iter().map(|p| p.name.lexeme.clone()).collect();
    let mut found: BTreeMap<String, Type> = BTreeMap::new();

    match &lambda.body {
        LambdaBody::Expr(e) => scan_expr(e, &mut bound, &mut found),
        LambdaBody::Block(stmts) => {
            for s in stmts {
                scan_stmt(s, &mut bound, &mut found);
            }
        }
    }

    found.into_iter().collect()
}

fn scan_stmt(stmt: &Stmt, bound: &mut Vec<String>, found: &mut BTreeMap<String, Type>) {
    match &stmt.kind {
        StmtKind::ExprStmt(e) => scan_expr(e, bound, found),
        StmtKind::VarDecl { name, init, .. } => {
            if let Some(e) = init {
                scan_expr(e, bound, found);
            }
            bound.push(name.clone());
        }
        StmtKind::Function { .. } => {}
        StmtKind::Return(e) => {
            if let Some(e) = e {
                scan_expr(e, bound, found);
            }
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            scan_expr(cond, bound, found);
            let depth = bound.len();
            for s in then_branch {
                scan_stmt(s, bound, found);
            }
            bound.truncate(depth);
            if let Some(body) = else_branch {
                for s in body {
                    scan_stmt(s, bound, found);
                }
                bound.truncate(depth);
            }
        }
        StmtKind::While { cond, body } => {
            scan_expr(cond, bound, found);
            let depth = bound.len();
            for s in body {
                scan_stmt(s, bound, found);
            }
            bound.truncate(depth);
        }
        StmtKind::For { init, cond, incr, body } => {
            let depth = bound.len();
            if let Some(init) = init {
                match &**init {
                    ForInit::VarDecl { name, init, .. } => {
                        if let Some(e) = init {
                            scan_expr(e, bound, found);
                        }
                        bound.push(name.clone());
                    }
                    ForInit::Expr(e) => scan_expr(e, bound, found),
                }
            }
            if let Some(cond) = cond {
                scan_expr(cond, bound, found);
            }
            for s in body {
                scan_stmt(s, bound, found);
            }
            if let Some(incr) = incr {
                scan_expr(incr, bound, found);
            }
            bound.truncate(depth);
        }
        StmtKind::ForEach { var_name, iterable, body } => {
            scan_expr(iterable, bound, found);
            let depth = bound.len();
            bound.push(var_name.clone());
            for s in body {
                scan_stmt(s, bound, found);
            }
            bound.truncate(depth);
        }
        StmtKind::Block(body) => {
            let depth = bound.len();
            for s in body {
                scan_stmt(s, bound, found);
            }
            bound.truncate(depth);
        }
        StmtKind::Import { .. } | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn scan_expr(expr: &Expr, bound: &mut Vec<String>, found: &mut BTreeMap<String, Type>) {
    match &expr.kind {
        ExprKind::Variable(name) => record_if_free(name, expr.expr_type.borrow().as_ref(), bound, found),
        ExprKind::Assign { name, value } => {
            record_if_free(name, expr.expr_type.borrow().as_ref(), bound, found);
            scan_expr(value, bound, found);
        }
        ExprKind::IndexAssign { target, index, value } => {
            scan_expr(target, bound, found);
            scan_expr(index, bound, found);
            scan_expr(value, bound, found);
        }
        ExprKind::Unary { operand, .. } => scan_expr(operand, bound, found),
        ExprKind::Binary { left, right, .. } => {
            scan_expr(left, bound, found);
            scan_expr(right, bound, found);
        }
        ExprKind::Call { callee, args } => {
            scan_expr(callee, bound, found);
            for a in args {
                scan_expr(a, bound, found);
            }
        }
        ExprKind::StaticCall { args, .. } => {
            for a in args {
                scan_expr(a, bound, found);
            }
        }
        ExprKind::Member { object, .. } => scan_expr(object, bound, found),
        ExprKind::Array(elements) | ExprKind::SyncList(elements) => {
            for e in elements {
                scan_expr(e, bound, found);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            scan_expr(array, bound, found);
            scan_expr(index, bound, found);
        }
        ExprKind::ArraySlice { array, start, end, step } => {
            scan_expr(array, bound, found);
            for e in [start, end, step].into_iter().flatten() {
                scan_expr(e, bound, found);
            }
        }
        ExprKind::Range { start, end } => {
            scan_expr(start, bound, found);
            scan_expr(end, bound, found);
        }
        ExprKind::Spread(inner)
        | ExprKind::Increment(inner)
        | ExprKind::Decrement(inner)
        | ExprKind::ThreadSpawn(inner)
        | ExprKind::ThreadSync(inner)
        | ExprKind::AsVal(inner)
        | ExprKind::TypeOf(inner) => scan_expr(inner, bound, found),
        ExprKind::Interpolated(parts) => {
            for part in parts {
                if let InterpPart::Expr { expr, .. } = part {
                    scan_expr(expr, bound, found);
                }
            }
        }
        ExprKind::Lambda(nested) => {
            // A nested lambda's own free variables that are not its parameters are
            // themselves free in the enclosing lambda, unless bound here.
            let mut inner_bound: Vec<String> = nested.params.iter().map(|p| p.name.lexeme.clone()).collect();
            match &nested.body {
                LambdaBody::Expr(e) => scan_expr(e, &mut inner_bound, found),
                LambdaBody::Block(stmts) => {
                    for s in stmts {
                        scan_stmt(s, &mut inner_bound, found);
                    }
                }
            }
        }
        ExprKind::SizedArrayAlloc { size, default, .. } => {
            scan_expr(size, bound, found);
            if let Some(d) = default {
                scan_expr(d, bound, found);
            }
        }
        ExprKind::Is { value, .. } | ExprKind::AsType { value, .. } => scan_expr(value, bound, found),
        ExprKind::Literal(_) => {}
    }
}

fn record_if_free(name: &str, ty: Option<&Type>, bound: &[String], found: &mut BTreeMap<String, Type>) {
    if bound.iter().any(|b| b == name) {
        return;
    }
    found.entry(name.to_string()).or_insert_with(|| ty.cloned().unwrap_or(Type::Any));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::UniqueStringArena;
    use crate::diagnostics::Diagnostics;
    use crate::lexer;
    use crate::parser;
    use crate::typeck;

    fn compile(src: &str) -> String {
        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let file = files.alloc("test.rh");
        let mut names: UniqueStringArena<Ident> = UniqueStringArena::new();
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(src, "test.rh", file, &mut diags);
        let mut module = parser::parse_module(tokens, "test.rh", &mut diags);
        typeck::check_module(&mut module, &files, &mut names, &mut diags);
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        emit(&module, "test.rh")
    }

    #[test]
    fn emits_main_entry_point() {
        let c = compile("fn main =>\n  print(\"hi\")\n");
        assert!(c.contains("int main(void)"));
        assert!(c.contains("fn_main"));
    }

    #[test]
    fn declares_only_the_runtime_symbols_actually_called() {
        let c = compile("fn main =>\n  print(\"hi\")\n");
        assert!(c.contains("extern void rt_print();"), "{}", c);
        assert!(!c.contains("rt_println"), "{}", c);
        assert!(!c.contains("#include \"rt.h\""), "{}", c);
        assert!(c.contains("#include <stdint.h>"), "{}", c);
    }

    #[test]
    fn private_function_string_literal_uses_its_own_local_arena() {
        let c = compile("fn f(): void =>\n  var s: string = \"x\"\n  print(s)\nfn main => f()\n");
        assert!(c.contains("rt_string_from_literal(__local_arena,"), "{}", c);
    }

    #[test]
    fn native_arithmetic_uses_c_operators() {
        let c = compile("fn main =>\n  var a: int = 1 + 2\n");
        assert!(c.contains("(1 + 2)"));
    }

    #[test]
    fn string_concatenation_calls_runtime() {
        let c = compile("fn main =>\n  var a: string = \"x\" + \"y\"\n");
        assert!(c.contains("rt_string_concat"));
    }

    #[test]
    fn array_push_dispatches_through_element_suffix() {
        let c = compile("fn main =>\n  var a: int[] = [1,2]\n  a.push(3)\n");
        assert!(c.contains("rt_array_long_push"));
    }

    #[test]
    fn capturing_lambda_gets_an_env_struct() {
        let c = compile(
            "fn main =>\n  var n: int = 1\n  var f: fn(): int = (): int => n\n",
        );
        assert!(c.contains("_env_t"));
    }

    #[test]
    fn captured_primitive_is_boxed_so_mutation_is_visible_to_the_enclosing_scope() {
        let c = compile(
            "fn main =>\n  var n: int = 0\n  var inc: fn(): void = (): void => n++\n  inc()\n  inc()\n  print(n)\n",
        );
        assert!(c.contains("int32_t *v_n = (int32_t *)rt_arena_alloc"), "{}", c);
        assert!(c.contains("(*v_n)++"), "{}", c);
        assert!(c.contains("int32_t *v_n = __cap->v_n"), "{}", c);
        // `inc` is a local closure value, not a top-level function — the call must go
        // through the generic `rt_closure_t` path, never `fn_inc(`.
        assert!(!c.contains("fn_inc("), "{}", c);
        assert!(c.contains("->fn)"), "{}", c);
    }

    #[test]
    fn higher_order_function_parameter_is_called_through_the_closure_abi() {
        let c = compile(
            "fn apply(f: fn(): int): int =>\n  return f()\nfn main =>\n  print(apply((): int => 1))\n",
        );
        // `f` is a function-typed parameter holding a closure value, not a named
        // top-level function — must not be lowered as a direct call to `fn_f`.
        assert!(!c.contains("fn_f("), "{}", c);
        assert!(c.contains("->fn)"), "{}", c);
    }

    #[test]
    fn negative_literal_index_is_adjusted_against_array_length() {
        let c = compile("fn main =>\n  var a: int[] = [1,2,3]\n  print(a[-1])\n");
        assert!(c.contains("rt_array_long_length(") && c.contains(") + -1"), "{}", c);
    }

    #[test]
    fn non_negative_literal_index_is_emitted_directly() {
        let c = compile("fn main =>\n  var a: int[] = [1,2,3]\n  print(a[0])\n");
        assert!(c.contains("rt_array_long_get(") , "{}", c);
        assert!(!c.contains("< 0 ?"), "{}", c);
    }

    #[test]
    fn variable_index_gets_a_runtime_negative_check() {
        let c = compile("fn main =>\n  var a: int[] = [1,2,3]\n  var i: int = 1\n  print(a[i])\n");
        assert!(c.contains("< 0 ?") && c.contains("rt_array_long_length("), "{}", c);
    }

    #[test]
    fn for_loop_counter_index_skips_the_runtime_check() {
        let c = compile(
            "fn main =>\n  var a: int[] = [1,2,3]\n  for (var i: int = 0; i < 3; i++)\n    print(a[i])\n",
        );
        assert!(!c.contains("< 0 ?"), "{}", c);
    }

    #[test]
    fn private_function_owns_and_destroys_its_own_arena() {
        let c = compile("fn f(): void => print(\"x\")\nfn main => f()\n");
        assert!(c.contains("rt_arena_init(__local_arena)"));
        assert!(c.contains("rt_arena_destroy(__local_arena)"));
    }

    #[test]
    fn private_lambda_owns_and_destroys_its_own_arena_too() {
        let c = compile(
            "fn main =>\n  var f: fn(): int = private (): int => 1\n  print(f())\n",
        );
        assert!(c.contains("(void)arena;"), "{}", c);
        assert!(c.contains("rt_arena_init(__local_arena)"), "{}", c);
        assert!(c.contains("rt_arena_destroy(__local_arena)"), "{}", c);
    }
}
