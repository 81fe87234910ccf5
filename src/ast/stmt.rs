//! Statement nodes.

use crate::ast::expr::Expr;
use crate::ast::token::Token;
use crate::ast::types::{FunctionModifier, MemoryQualifier, Parameter, Type};

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub token: Token,
}

impl Stmt {
    pub fn new(kind: StmtKind, token: Token) -> Self {
        Stmt { kind, token }
    }
}

#[derive(Clone, Debug)]
pub enum ForInit {
    VarDecl {
        name: String,
        ty: Option<Type>,
        init: Option<Expr>,
    },
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    ExprStmt(Expr),
    VarDecl {
        name: String,
        ty: Option<Type>,
        qualifier: MemoryQualifier,
        init: Option<Expr>,
    },
    Function {
        name: String,
        params: Vec<Parameter>,
        ret: Type,
        modifier: FunctionModifier,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Option<Box<ForInit>>,
        cond: Option<Expr>,
        incr: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForEach {
        var_name: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Block(Vec<Stmt>),
    Import {
        path: String,
    },
    Break,
    Continue,
}
