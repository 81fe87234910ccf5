//! A compiled translation unit: the ordered top-level statements of the entry file
//! with its imports already spliced in by `crate::import`.

use crate::ast::stmt::Stmt;

pub struct Module {
    pub statements: Vec<Stmt>,
    pub has_main: bool,
}

impl Module {
    pub fn new(statements: Vec<Stmt>) -> Self {
        let has_main = statements.iter().any(|s| {
            matches!(&s.kind, crate::ast::StmtKind::Function { name, .. } if name == "main")
        });
        Module {
            statements,
            has_main,
        }
    }
}
