//! Type checker: walks the AST, assigns `expr_type` on every [`Expr`],
//! verifies statements, and resolves builtin method/property/static-call dispatch
//! through [`builtins`].
//!
//! One pass keeps accumulating into a shared [`Diagnostics`] sink instead of raising
//! on the first problem, so a single run reports as many errors as possible — the
//! same error-accumulating style the parser uses, generalized to a full
//! expression/statement walk.

pub mod builtins;

use crate::arena::UniqueStringArena;
use crate::ast::*;
use crate::diagnostics::{Diagnostics, SourceLoc};
use crate::sym::{Symbol, SymbolKind, SymbolTable};
use builtins::{ParamSpec, RetSpec, Sig};

/// Runs the type checker over `module` in place, using `files` to resolve token
/// locations (each token's `Loc` only stores an interned file handle) into the
/// plain-string `SourceLoc`s diagnostics render, and `names` to intern every symbol
/// bound into the [`SymbolTable`] as it's declared.
pub fn check_module(
    module: &mut Module,
    files: &UniqueStringArena<FileName>,
    names: &mut UniqueStringArena<Ident>,
    diags: &mut Diagnostics,
) {
    let mut tc = TypeChecker {
        symbols: SymbolTable::new(),
        diags,
        files,
        names,
        return_stack: Vec::new(),
        loop_depth: 0,
    };
    tc.hoist_top_level_functions(&module.statements);
    for stmt in module.statements.iter_mut() {
        tc.check_stmt(stmt);
    }
}

struct TypeChecker<'d, 'f, 'n> {
    symbols: SymbolTable,
    diags: &'d mut Diagnostics,
    files: &'f UniqueStringArena<FileName>,
    names: &'n mut UniqueStringArena<Ident>,
    /// Declared return type of each lambda/function body currently being checked,
    /// innermost last.
    return_stack: Vec<Type>,
    /// Reset to 0 on entering a lambda body: a `break`/`continue` never sees through
    /// a lambda into an enclosing loop because the lambda is lowered to its own
    /// top-level C function.
    loop_depth: u32,
}

impl<'d, 'f, 'n> TypeChecker<'d, 'f, 'n> {
    fn loc(&self, tok: &Token) -> SourceLoc {
        SourceLoc {
            file: self.files.get(tok.loc.file).to_string(),
            line: tok.loc.line,
        }
    }

    fn error(&mut self, tok: &Token, message: impl Into<String>) {
        let loc = self.loc(tok);
        self.diags.error(Some(loc), message.into());
    }

    fn hoist_top_level_functions(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            if let StmtKind::Function { name, params, ret, modifier, .. } = &stmt.kind {
                let fn_ty = Type::Function {
                    ret: Box::new(ret.clone()),
                    params: params.iter().map(|p| p.ty.clone()).collect(),
                };
                let added = self.symbols.add(Symbol {
                    name: name.clone(),
                    handle: self.names.alloc(name),
                    ty: fn_ty,
                    kind: SymbolKind::Function,
                    qualifier: MemoryQualifier::Default,
                    modifier: *modifier,
                });
                if !added {
                    self.error(&stmt.token, format!("duplicate top-level declaration '{}'", name));
                }
            }
        }
    }

    // ---- statements -------------------------------------------------------

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        let tok = stmt.token.clone();
        match &mut stmt.kind {
            StmtKind::ExprStmt(e) => {
                self.check_expr(e);
            }
            StmtKind::VarDecl { name, ty, qualifier, init } => {
                let init_ty = init.as_mut().map(|e| self.check_expr(e));
                let final_ty = match (ty.clone(), init_ty) {
                    (Some(declared), Some(actual)) => {
                        if !compatible(&declared, &actual) {
                            self.error(
                                &tok,
                                format!(
                                    "cannot initialize '{}' of type {} with value of type {}",
                                    name, declared, actual
                                ),
                            );
                        }
                        declared
                    }
                    (Some(declared), None) => declared,
                    (None, Some(actual)) => actual,
                    (None, None) => {
                        self.error(&tok, format!("variable '{}' needs a type or an initializer", name));
                        Type::Nil
                    }
                };
                *ty = Some(final_ty.clone());
                self.check_qualifier(*qualifier, &final_ty, &tok);
                if !self.symbols.add(Symbol {
                    name: name.clone(),
                    handle: self.names.alloc(name),
                    ty: final_ty,
                    kind: SymbolKind::Variable,
                    qualifier: *qualifier,
                    modifier: FunctionModifier::Default,
                }) {
                    self.error(&tok, format!("'{}' is already declared in this scope", name));
                }
            }
            StmtKind::Function { name, params, ret, modifier, body } => {
                self.check_function(name, params, ret, *modifier, body, &tok);
            }
            StmtKind::Return(expr) => {
                let actual = expr
                    .as_mut()
                    .map(|e| self.check_expr(e))
                    .unwrap_or(Type::Void);
                match self.return_stack.last().cloned() {
                    Some(expected) => {
                        if !compatible(&expected, &actual) {
                            self.error(
                                &tok,
                                format!("returned {} but function returns {}", actual, expected),
                            );
                        }
                    }
                    None => self.error(&tok, "'return' outside of a function body"),
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let ct = self.check_expr(cond);
                self.require_scalar(&ct, &tok, "'if' condition");
                self.symbols.push();
                for s in then_branch.iter_mut() {
                    self.check_stmt(s);
                }
                self.symbols.pop();
                if let Some(else_body) = else_branch {
                    self.symbols.push();
                    for s in else_body.iter_mut() {
                        self.check_stmt(s);
                    }
                    self.symbols.pop();
                }
            }
            StmtKind::While { cond, body } => {
                let ct = self.check_expr(cond);
                self.require_scalar(&ct, &tok, "'while' condition");
                self.symbols.push();
                self.loop_depth += 1;
                for s in body.iter_mut() {
                    self.check_stmt(s);
                }
                self.loop_depth -= 1;
                self.symbols.pop();
            }
            StmtKind::For { init, cond, incr, body } => {
                self.symbols.push();
                if let Some(init) = init {
                    match &mut **init {
                        ForInit::VarDecl { name, ty, init } => {
                            let init_ty = init.as_mut().map(|e| self.check_expr(e));
                            let final_ty = ty.clone().or(init_ty).unwrap_or(Type::Nil);
                            self.symbols.add(Symbol {
                                name: name.clone(),
                                handle: self.names.alloc(name),
                                ty: final_ty,
                                kind: SymbolKind::Variable,
                                qualifier: MemoryQualifier::Default,
                                modifier: FunctionModifier::Default,
                            });
                        }
                        ForInit::Expr(e) => {
                            self.check_expr(e);
                        }
                    }
                }
                if let Some(cond) = cond {
                    let ct = self.check_expr(cond);
                    self.require_scalar(&ct, &tok, "'for' condition");
                }
                if let Some(incr) = incr {
                    self.check_expr(incr);
                }
                self.loop_depth += 1;
                for s in body.iter_mut() {
                    self.check_stmt(s);
                }
                self.loop_depth -= 1;
                self.symbols.pop();
            }
            StmtKind::ForEach { var_name, iterable, body } => {
                let it = self.check_expr(iterable);
                let elem = match it.element() {
                    Some(e) => e.clone(),
                    None => {
                        self.error(&tok, format!("'for-each' requires an array, found {}", it));
                        Type::Nil
                    }
                };
                self.symbols.push();
                self.symbols.add(Symbol {
                    name: var_name.clone(),
                    handle: self.names.alloc(var_name),
                    ty: elem,
                    kind: SymbolKind::Variable,
                    qualifier: MemoryQualifier::Default,
                    modifier: FunctionModifier::Default,
                });
                self.loop_depth += 1;
                for s in body.iter_mut() {
                    self.check_stmt(s);
                }
                self.loop_depth -= 1;
                self.symbols.pop();
            }
            StmtKind::Block(body) => {
                self.symbols.push();
                for s in body.iter_mut() {
                    self.check_stmt(s);
                }
                self.symbols.pop();
            }
            StmtKind::Import { .. } => {
                // Resolved away by `crate::import` before this module reaches the
                // type checker; a surviving node here is a no-op.
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error(&tok, "'break'/'continue' outside of a loop");
                }
            }
        }
    }

    fn check_function(
        &mut self,
        name: &str,
        params: &mut [Parameter],
        ret: &Type,
        modifier: FunctionModifier,
        body: &mut [Stmt],
        tok: &Token,
    ) {
        if self.symbols.lookup_local(name).is_none() {
            let fn_ty = Type::Function {
                ret: Box::new(ret.clone()),
                params: params.iter().map(|p| p.ty.clone()).collect(),
            };
            self.symbols.add(Symbol {
                name: name.to_string(),
                handle: self.names.alloc(name),
                ty: fn_ty,
                kind: SymbolKind::Function,
                qualifier: MemoryQualifier::Default,
                modifier,
            });
        }

        if modifier == FunctionModifier::Private && ret.is_heap_borne() {
            self.error(
                tok,
                format!("private function '{}' cannot return {} (its arena is torn down on every return path)", name, ret),
            );
        }

        self.symbols.push();
        for param in params.iter() {
            self.check_qualifier(param.qualifier, &param.ty, &param.name);
            self.symbols.add(Symbol {
                name: param.name.lexeme.clone(),
                handle: self.names.alloc(&param.name.lexeme),
                ty: param.ty.clone(),
                kind: SymbolKind::Parameter,
                qualifier: param.qualifier,
                modifier: FunctionModifier::Default,
            });
        }
        self.return_stack.push(ret.clone());
        let saved_loop_depth = self.loop_depth;
        self.loop_depth = 0;
        for s in body.iter_mut() {
            self.check_stmt(s);
        }
        self.loop_depth = saved_loop_depth;
        self.return_stack.pop();
        self.symbols.pop();
    }

    fn check_qualifier(&mut self, qualifier: MemoryQualifier, ty: &Type, tok: &Token) {
        match qualifier {
            MemoryQualifier::AsRef if !ty.is_primitive() => {
                self.error(tok, format!("'as ref' is only legal on primitive types, found {}", ty));
            }
            MemoryQualifier::AsVal if !ty.is_reference() => {
                self.error(tok, format!("'as val' is only legal on reference types, found {}", ty));
            }
            _ => {}
        }
    }

    fn require_scalar(&mut self, ty: &Type, tok: &Token, what: &str) {
        if matches!(ty, Type::Array(_) | Type::Function { .. } | Type::Nil) {
            self.error(tok, format!("{} must be a scalar value, found {}", what, ty));
        }
    }

    // ---- expressions --------------------------------------------------------

    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let ty = self.infer_expr(expr);
        *expr.expr_type.borrow_mut() = Some(ty.clone());
        ty
    }

    fn infer_expr(&mut self, expr: &mut Expr) -> Type {
        let tok = expr.token.clone();
        match &mut expr.kind {
            ExprKind::Literal(_) => match tok.kind {
                TokenKind::IntLiteral => Type::Int,
                TokenKind::LongLiteral => Type::Long,
                TokenKind::FloatLiteral => Type::Float,
                TokenKind::DoubleLiteral => Type::Double,
                TokenKind::StringLiteral => Type::String,
                TokenKind::CharLiteral => Type::Char,
                TokenKind::BoolLiteral => Type::Bool,
                _ => Type::Nil,
            },
            ExprKind::Variable(name) => match self.symbols.lookup(name) {
                Some(sym) => sym.ty.clone(),
                None => {
                    self.error(&tok, format!("unknown identifier '{}'", name));
                    Type::Nil
                }
            },
            ExprKind::Assign { name, value } => {
                let vt = self.check_expr(value);
                let sym_ty = self.symbols.lookup(name).map(|s| s.ty.clone());
                match sym_ty {
                    Some(ty) => {
                        if !compatible(&ty, &vt) {
                            self.error(
                                &tok,
                                format!("cannot assign {} to '{}' of type {}", vt, name, ty),
                            );
                        }
                        ty
                    }
                    None => {
                        self.error(&tok, format!("unknown identifier '{}'", name));
                        Type::Nil
                    }
                }
            }
            ExprKind::IndexAssign { target, index, value } => {
                let at = self.check_expr(target);
                let it = self.check_expr(index);
                if !it.is_integer() {
                    self.error(&tok, "array index must be an integer");
                }
                let elem = at.element().cloned().unwrap_or_else(|| {
                    self.error(&tok, format!("cannot index into {}", at));
                    Type::Nil
                });
                let vt = self.check_expr(value);
                if !compatible(&elem, &vt) {
                    self.error(&tok, format!("cannot assign {} into array of {}", vt, elem));
                }
                elem
            }
            ExprKind::Unary { op, operand } => {
                let ot = self.check_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if !ot.is_numeric() {
                            self.error(&tok, format!("unary '-' requires a numeric operand, found {}", ot));
                        }
                        ot
                    }
                    UnaryOp::Not => {
                        if ot != Type::Bool {
                            self.error(&tok, format!("unary '!' requires a bool operand, found {}", ot));
                        }
                        Type::Bool
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lt = self.check_expr(left);
                let rt = self.check_expr(right);
                self.check_binary(*op, &lt, &rt, &tok)
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, &tok),
            ExprKind::StaticCall { type_name, method, args } => {
                self.check_static_call(type_name, method, args, &tok)
            }
            ExprKind::Member { object, name } => {
                let ot = self.check_expr(object);
                match builtins::member_type(&ot, name) {
                    Some(t) => t,
                    None => {
                        self.error(&tok, format!("{} has no member '{}'", ot, name));
                        Type::Nil
                    }
                }
            }
            ExprKind::Array(elements) => self.check_array_literal(elements, &tok),
            ExprKind::ArrayAccess { array, index } => {
                let at = self.check_expr(array);
                let it = self.check_expr(index);
                if !it.is_integer() {
                    self.error(&tok, "array index must be an integer");
                }
                at.element().cloned().unwrap_or_else(|| {
                    self.error(&tok, format!("cannot index into {}", at));
                    Type::Nil
                })
            }
            ExprKind::ArraySlice { array, start, end, step } => {
                let at = self.check_expr(array);
                if at.element().is_none() {
                    self.error(&tok, format!("cannot slice {}", at));
                }
                for bound in [start, end, step].into_iter().flatten() {
                    let bt = self.check_expr(bound);
                    if !bt.is_numeric() {
                        self.error(&tok, "slice bounds must be numeric");
                    }
                }
                at
            }
            ExprKind::Range { start, end } => {
                let st = self.check_expr(start);
                let et = self.check_expr(end);
                if !st.is_integer() || !et.is_integer() {
                    self.error(&tok, "range bounds must be integers");
                }
                Type::Array(Box::new(Type::Long))
            }
            ExprKind::Spread(inner) => {
                let it = self.check_expr(inner);
                it.element().cloned().unwrap_or_else(|| {
                    self.error(&tok, format!("'...' requires an array operand, found {}", it));
                    Type::Nil
                })
            }
            ExprKind::Increment(operand) | ExprKind::Decrement(operand) => {
                let ot = self.check_expr(operand);
                if !ot.is_numeric() {
                    self.error(&tok, format!("'++'/'--' require a numeric operand, found {}", ot));
                }
                ot
            }
            ExprKind::Interpolated(parts) => {
                for part in parts.iter_mut() {
                    if let InterpPart::Expr { expr, .. } = part {
                        self.check_expr(expr);
                    }
                }
                Type::String
            }
            ExprKind::Lambda(lambda) => self.check_lambda(lambda, &tok),
            ExprKind::SizedArrayAlloc { element, size, default } => {
                let st = self.check_expr(size);
                if !st.is_integer() {
                    self.error(&tok, "array size must be an integer");
                }
                if let Some(d) = default {
                    let dt = self.check_expr(d);
                    if !compatible(element, &dt) {
                        self.error(&tok, format!("default value {} does not match element type {}", dt, element));
                    }
                }
                Type::Array(Box::new(element.clone()))
            }
            ExprKind::ThreadSpawn(inner) => self.check_expr(inner),
            ExprKind::ThreadSync(inner) => self.check_expr(inner),
            ExprKind::SyncList(elements) => {
                for e in elements.iter_mut() {
                    self.check_expr(e);
                }
                Type::Array(Box::new(Type::Any))
            }
            ExprKind::AsVal(inner) => {
                let it = self.check_expr(inner);
                if !it.is_reference() {
                    self.error(&tok, format!("'as val' only applies to reference types, found {}", it));
                }
                it
            }
            ExprKind::TypeOf(inner) => {
                self.check_expr(inner);
                Type::Int
            }
            ExprKind::Is { value, ty } => {
                self.check_expr(value);
                let _ = ty;
                Type::Bool
            }
            ExprKind::AsType { value, ty } => {
                self.check_expr(value);
                ty.clone()
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lt: &Type, rt: &Type, tok: &Token) -> Type {
        if op.is_logical() {
            self.require_scalar(lt, tok, "left operand of 'and'/'or'");
            self.require_scalar(rt, tok, "right operand of 'and'/'or'");
            return Type::Long;
        }
        if op.is_comparison() {
            if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
                match (lt.element(), rt.element()) {
                    (Some(le), Some(re)) => {
                        if le != re {
                            self.error(tok, format!("cannot compare {} with {}", lt, rt));
                        }
                    }
                    (None, None) => {
                        if !compatible(lt, rt) && !compatible(rt, lt) {
                            self.error(tok, format!("cannot compare {} with {}", lt, rt));
                        }
                    }
                    _ => self.error(tok, format!("cannot compare {} with {}", lt, rt)),
                }
            } else if !lt.is_numeric() || !rt.is_numeric() {
                self.error(tok, format!("'{}' requires numeric operands, found {} and {}", op.native_op(), lt, rt));
            }
            return Type::Bool;
        }
        if op == BinaryOp::Add && *lt == Type::String && *rt == Type::String {
            return Type::String;
        }
        if lt.is_numeric() && rt.is_numeric() {
            return promote(lt, rt);
        }
        self.error(
            tok,
            format!("'{}' is not defined for {} and {}", op.native_op(), lt, rt),
        );
        Type::Nil
    }

    fn check_array_literal(&mut self, elements: &mut [Expr], tok: &Token) -> Type {
        let mut unified: Option<Type> = None;
        for element in elements.iter_mut() {
            let contributed = match &mut element.kind {
                ExprKind::Spread(inner) => {
                    let it = self.check_expr(inner);
                    *element.expr_type.borrow_mut() = Some(it.clone());
                    it.element().cloned().unwrap_or_else(|| {
                        self.error(tok, format!("'...' requires an array operand, found {}", it));
                        Type::Nil
                    })
                }
                ExprKind::Range { .. } => {
                    self.check_expr(element);
                    Type::Long
                }
                _ => self.check_expr(element),
            };
            unified = Some(match unified {
                None => contributed,
                Some(prev) => {
                    if prev == contributed {
                        prev
                    } else if prev.is_numeric() && contributed.is_numeric() {
                        promote(&prev, &contributed)
                    } else {
                        self.error(tok, format!("array elements of {} and {} do not unify", prev, contributed));
                        prev
                    }
                }
            });
        }
        Type::Array(Box::new(unified.unwrap_or(Type::Any)))
    }

    fn check_call(&mut self, callee: &mut Expr, args: &mut [Expr], tok: &Token) -> Type {
        if let ExprKind::Variable(name) = &callee.kind {
            if self.symbols.lookup(name).is_none() {
                match name.as_str() {
                    "print" | "println" => {
                        for a in args.iter_mut() {
                            self.check_expr(a);
                        }
                        return Type::Void;
                    }
                    "len" => {
                        if args.len() != 1 {
                            self.error(tok, "'len' takes exactly one argument");
                        }
                        for a in args.iter_mut() {
                            let at = self.check_expr(a);
                            if at.element().is_none() && at != Type::String {
                                self.error(tok, format!("'len' requires an array or string, found {}", at));
                            }
                        }
                        return Type::Long;
                    }
                    _ => {}
                }
            }
        }

        if let ExprKind::Member { object, name } = &mut callee.kind {
            let name = name.clone();
            return self.check_method_call(object, &name, args, tok);
        }

        let callee_ty = self.check_expr(callee);
        let (ret, params) = match &callee_ty {
            Type::Function { ret, params } => (ret.as_ref().clone(), params.clone()),
            _ => {
                self.error(tok, format!("cannot call a value of type {}", callee_ty));
                for a in args.iter_mut() {
                    self.check_expr(a);
                }
                return Type::Nil;
            }
        };
        if args.len() != params.len() {
            self.error(
                tok,
                format!("expected {} argument(s), found {}", params.len(), args.len()),
            );
        }
        for (i, arg) in args.iter_mut().enumerate() {
            let at = self.check_expr(arg);
            if let Some(expected) = params.get(i) {
                if !compatible(expected, &at) {
                    self.error(tok, format!("argument {} expected {}, found {}", i + 1, expected, at));
                }
            }
        }
        ret
    }

    fn check_static_call(&mut self, type_name: &str, method: &str, args: &mut [Expr], tok: &Token) -> Type {
        match builtins::static_method_sig(type_name, method) {
            Some(sig) => self.check_sig(&sig, None, args, tok),
            None => {
                self.error(tok, format!("unknown static method '{}.{}'", type_name, method));
                for a in args.iter_mut() {
                    self.check_expr(a);
                }
                Type::Nil
            }
        }
    }

    /// Checks `obj.method(args)` by looking up `method` in the builtin method table
    /// first, falling back to treating `obj` as a struct-less closure call target is
    /// not supported — member calls always dispatch through the builtin table.
    fn check_method_call(&mut self, object: &mut Expr, method: &str, args: &mut [Expr], tok: &Token) -> Type {
        let ot = self.check_expr(object);
        match builtins::method_sig(&ot, method) {
            Some(sig) => {
                let elem = ot.element().cloned();
                self.check_sig(&sig, elem.as_ref(), args, tok)
            }
            None => {
                self.error(tok, format!("{} has no method '{}'", ot, method));
                for a in args.iter_mut() {
                    self.check_expr(a);
                }
                Type::Nil
            }
        }
    }

    fn check_sig(&mut self, sig: &Sig, elem: Option<&Type>, args: &mut [Expr], tok: &Token) -> Type {
        let mut checked: Vec<Type> = Vec::with_capacity(args.len());
        for a in args.iter_mut() {
            checked.push(self.check_expr(a));
        }

        let mut ai = 0usize;
        for (pi, param) in sig.params.iter().enumerate() {
            match param {
                ParamSpec::Variadic(inner) => {
                    while ai < checked.len() {
                        self.check_param_spec(inner, &checked[ai], elem, tok, ai);
                        ai += 1;
                    }
                }
                spec => {
                    match checked.get(ai) {
                        Some(at) => self.check_param_spec(spec, at, elem, tok, ai),
                        None => self.error(tok, format!("missing argument {}", pi + 1)),
                    }
                    ai += 1;
                }
            }
        }
        if ai < checked.len() {
            self.error(tok, format!("expected {} argument(s), found {}", ai, checked.len()));
        }

        match &sig.ret {
            RetSpec::Exact(t) => t.clone(),
            RetSpec::SameArray => elem
                .cloned()
                .map(|e| Type::Array(Box::new(e)))
                .unwrap_or(Type::Nil),
            RetSpec::Elem => elem.cloned().unwrap_or(Type::Nil),
        }
    }

    fn check_param_spec(&mut self, spec: &ParamSpec, actual: &Type, elem: Option<&Type>, tok: &Token, index: usize) {
        let expected = match spec {
            ParamSpec::Exact(t) => t.clone(),
            ParamSpec::Elem => elem.cloned().unwrap_or(Type::Nil),
            ParamSpec::Variadic(inner) => {
                return self.check_param_spec(inner, actual, elem, tok, index);
            }
        };
        if !compatible(&expected, actual) {
            self.error(tok, format!("argument {} expected {}, found {}", index + 1, expected, actual));
        }
    }

    fn check_lambda(&mut self, lambda: &mut LambdaExpr, tok: &Token) -> Type {
        self.symbols.push();
        for param in lambda.params.iter() {
            self.check_qualifier(param.qualifier, &param.ty, &param.name);
            self.symbols.add(Symbol {
                name: param.name.lexeme.clone(),
                handle: self.names.alloc(&param.name.lexeme),
                ty: param.ty.clone(),
                kind: SymbolKind::Parameter,
                qualifier: param.qualifier,
                modifier: FunctionModifier::Default,
            });
        }

        let saved_loop_depth = self.loop_depth;
        self.loop_depth = 0;

        let final_ret = match &mut lambda.body {
            LambdaBody::Expr(body_expr) => {
                let bt = self.check_expr(body_expr);
                match &lambda.ret {
                    Some(declared) => {
                        if !compatible(declared, &bt) {
                            self.error(
                                tok,
                                format!("lambda body has type {} but declares {}", bt, declared),
                            );
                        }
                        declared.clone()
                    }
                    None => bt,
                }
            }
            LambdaBody::Block(stmts) => {
                let declared = lambda.ret.clone().unwrap_or(Type::Void);
                self.return_stack.push(declared.clone());
                for s in stmts.iter_mut() {
                    self.check_stmt(s);
                }
                self.return_stack.pop();
                declared
            }
        };

        self.loop_depth = saved_loop_depth;
        self.symbols.pop();

        if lambda.modifier == FunctionModifier::Private && final_ret.is_heap_borne() {
            self.error(
                tok,
                format!("a private lambda may only return primitives, found {}", final_ret),
            );
        }

        Type::Function {
            ret: Box::new(final_ret),
            params: lambda.params.iter().map(|p| p.ty.clone()).collect(),
        }
    }
}

/// Assignability: `expected` accepts `actual` if they match structurally, if
/// `actual` is `nil` (adopts the expected type), if both are numeric (the
/// checker leaves narrowing/widening to the code generator's native-vs-checked
/// arithmetic selection), or if `expected` is `any`.
fn compatible(expected: &Type, actual: &Type) -> bool {
    if expected == actual {
        return true;
    }
    if *actual == Type::Nil {
        return true;
    }
    if *expected == Type::Any {
        return true;
    }
    if expected.is_numeric() && actual.is_numeric() {
        return true;
    }
    false
}

fn promote(lt: &Type, rt: &Type) -> Type {
    if *lt == Type::Double || *rt == Type::Double {
        Type::Double
    } else if *lt == Type::Float || *rt == Type::Float {
        Type::Double
    } else {
        Type::Long
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;

    fn check(src: &str) -> (Module, Diagnostics) {
        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let file = files.alloc("test.rh");
        let mut names: UniqueStringArena<Ident> = UniqueStringArena::new();
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(src, "test.rh", file, &mut diags);
        let mut module = parser::parse_module(tokens, "test.rh", &mut diags);
        check_module(&mut module, &files, &mut names, &mut diags);
        (module, diags)
    }

    #[test]
    fn literal_types_are_distinct_for_int_and_long() {
        let (module, diags) = check("fn main =>\n  var a: long = 1\n  var b: int = 2\n");
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::VarDecl { init: Some(a), .. } = &body[0].kind else { panic!() };
        assert_eq!(*a.expr_type.borrow(), Some(Type::Int));
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let (_, diags) = check("fn main =>\n  print(missing)\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn string_concat_requires_both_strings() {
        let (_, diags) = check("fn main =>\n  var s: string = \"a\" + 1\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn private_lambda_cannot_return_a_string() {
        let (_, diags) = check(
            "fn main =>\n  var f: fn(): string = private (): string => \"x\"\n",
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn array_push_reassigns_element_type() {
        let (module, diags) = check(
            "fn main =>\n  var a: int[] = [1,2,3]\n  a.push(4)\n",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::ExprStmt(e) = &body[1].kind else { panic!() };
        assert_eq!(*e.expr_type.borrow(), Some(Type::Array(Box::new(Type::Int))));
    }

    #[test]
    fn as_ref_rejects_reference_type_parameter() {
        let (_, diags) = check("fn f(s: string as ref): void => print(s)\nfn main => f(\"x\")\n");
        assert!(diags.has_errors());
    }
}
