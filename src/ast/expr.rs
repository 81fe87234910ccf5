//! Expression nodes.
//!
//! Every `Expr` carries the token it was parsed from (for diagnostics) and an
//! `expr_type` slot the type checker fills in. Recursive children are plain `Box`es —
//! the arena only owns interned names and file paths (see
//! `crate::driver::CompilerArenas`), not the AST itself, since nothing here needs
//! handle-stable identity across passes.

use std::cell::{Cell, RefCell};

use crate::ast::stmt::Stmt;
use crate::ast::token::{Literal, Token};
use crate::ast::types::{FunctionModifier, Parameter, Type};

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub token: Token,
    /// Filled in exactly once by the type checker. A side-cell rather than a plain
    /// field so the checker's single mutation pass doesn't need `&mut` access all the
    /// way down through shared AST storage.
    pub expr_type: RefCell<Option<Type>>,
}

impl Expr {
    pub fn new(kind: ExprKind, token: Token) -> Self {
        Expr {
            kind,
            token,
            expr_type: RefCell::new(None),
        }
    }

    pub fn boxed(kind: ExprKind, token: Token) -> Box<Self> {
        Box::new(Self::new(kind, token))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Runtime function name suffix: `add`, `sub`, ... matches `rt_<op>_<type-suffix>`.
    pub fn rt_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Eq => "eq",
            BinaryOp::NotEq => "neq",
            BinaryOp::Lt => "lt",
            BinaryOp::LtEq => "lte",
            BinaryOp::Gt => "gt",
            BinaryOp::GtEq => "gte",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn native_op(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// One piece of an interpolated string literal, after the lexer's raw
/// [`crate::ast::token::InterpSource`] holes have been re-parsed into expressions.
#[derive(Clone, Debug)]
pub enum InterpPart {
    Literal(String),
    Expr { expr: Box<Expr>, spec: Option<String> },
}

/// Body of a lambda: either a single expression (`=> expr`) or an indented/braced
/// statement block.
#[derive(Clone, Debug)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Clone, Debug)]
pub struct LambdaExpr {
    pub params: Vec<Parameter>,
    /// Declared return type, if given; otherwise inferred (expression body: the
    /// body's type; statement body: `void` unless every return disagrees).
    pub ret: Option<Type>,
    pub modifier: FunctionModifier,
    pub body: LambdaBody,
    /// Assigned by the code generator the first time it lifts this lambda, and read
    /// back on every subsequent reference to the same node (the lambda is visited
    /// once at its definition site and potentially again if captured by an outer
    /// closure's capture scan).
    pub lifted_id: Cell<Option<u32>>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Assign {
        name: String,
        value: Box<Expr>,
    },
    IndexAssign {
        target: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    StaticCall {
        type_name: String,
        method: String,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    /// Array literal. Each element is itself an `Expr`; `Spread`/`Range` elements
    /// widen into multiple elements at lowering time, everything else contributes
    /// exactly one.
    Array(Vec<Expr>),
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArraySlice {
        array: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Spread(Box<Expr>),
    Increment(Box<Expr>),
    Decrement(Box<Expr>),
    Interpolated(Vec<InterpPart>),
    Lambda(LambdaExpr),
    SizedArrayAlloc {
        element: Type,
        size: Box<Expr>,
        default: Option<Box<Expr>>,
    },
    ThreadSpawn(Box<Expr>),
    ThreadSync(Box<Expr>),
    SyncList(Vec<Expr>),
    AsVal(Box<Expr>),
    TypeOf(Box<Expr>),
    Is {
        value: Box<Expr>,
        ty: Type,
    },
    AsType {
        value: Box<Expr>,
        ty: Type,
    },
}
