//! Tagged-variant AST model: tokens, types, expressions, statements, modules.
//!
//! Nodes own their children directly (plain `Box`) rather than living behind arena
//! handles — nothing here needs handle-stable identity across passes, and the type
//! checker mutates nodes in place (`expr_type`). The arena (`crate::arena`) is
//! reserved for what actually benefits from interning: identifiers and source file
//! paths, bundled in [`CompilerArenas`](crate::driver::CompilerArenas).

pub mod builtin_types;
pub mod expr;
pub mod module;
pub mod stmt;
pub mod token;
pub mod types;

pub use expr::{BinaryOp, Expr, ExprKind, InterpPart, LambdaBody, LambdaExpr, UnaryOp};
pub use module::Module;
pub use stmt::{ForInit, Stmt, StmtKind};
pub use token::{Literal, Loc, Token, TokenKind};
pub use types::{FunctionModifier, MemoryQualifier, Parameter, Type};

/// Marker type distinguishing identifier handles in the name interner.
pub struct Ident(());

/// Marker type distinguishing source file path handles.
pub struct FileName(());
