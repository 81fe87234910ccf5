//! Recursive-descent parser with indentation-sensitive blocks.
//!
//! A flat position counter walks a pre-scanned token sequence; diagnostics are
//! accumulated rather than raised, and a `synchronize`-style recovery step after a
//! syntax error lets one run report more than the first mistake. Precedence climbing
//! follows the standard recursive-descent expression-grammar shape: one function per
//! precedence level, lowest binding first.

use crate::ast::builtin_types;
use crate::ast::token::InterpSource;
use crate::ast::*;
use crate::diagnostics::{Diagnostics, SourceLoc};
use crate::lexer;

/// Parses a token stream already produced by [`crate::lexer::lex`] into a [`Module`].
/// `filename` is only used to build [`SourceLoc`]s for diagnostics.
pub fn parse_module(tokens: Vec<Token>, filename: &str, diags: &mut Diagnostics) -> Module {
    let mut parser = Parser {
        tokens,
        pos: 0,
        filename: filename.to_string(),
        diags,
    };
    let mut statements = Vec::new();
    parser.skip_newlines();
    while !parser.check(TokenKind::Eof) {
        statements.push(parser.parse_top_level_stmt());
        parser.skip_newlines();
    }
    Module::new(statements)
}

struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    diags: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_at(&self, offset: usize, kind: TokenKind) -> bool {
        self.peek_at(offset).kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn match_tok(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc {
            file: self.filename.clone(),
            line: self.peek().loc.line,
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let loc = self.loc();
        self.diags.error(Some(loc), message.into());
    }

    /// Consumes a token of `kind`, or emits a located diagnostic and leaves the
    /// cursor in place so the caller's recovery (or the statement loop's own
    /// `synchronize`) can make progress.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            self.error(format!(
                "expected {}, found '{}'",
                what,
                self.peek().lexeme
            ));
            self.peek().clone()
        }
    }

    fn expect_ident(&mut self, what: &str) -> String {
        if self.check(TokenKind::Ident) {
            self.advance().lexeme
        } else {
            self.error(format!("expected {}, found '{}'", what, self.peek().lexeme));
            String::new()
        }
    }

    /// Skips a run of `NEWLINE` tokens; blank lines between statements collapse to
    /// nothing in the AST.
    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    /// Recovers from a syntax error by discarding tokens until the next statement
    /// boundary (a `NEWLINE`, a `DEDENT`, or `EOF`), so one parse can surface more
    /// than the first error.
    fn synchronize(&mut self) {
        while !self.is_at_end()
            && !matches!(
                self.peek().kind,
                TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
            )
        {
            self.advance();
        }
    }

    // ---- statements -----------------------------------------------------------

    fn parse_top_level_stmt(&mut self) -> Stmt {
        let before = self.pos;
        let stmt = self.parse_stmt();
        if self.pos == before {
            // Safety net: a production that matched nothing must still advance, or
            // the top-level loop spins forever on a malformed token.
            self.advance();
        }
        stmt
    }

    fn parse_stmt(&mut self) -> Stmt {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Var => self.parse_var_decl(),
            TokenKind::Private | TokenKind::Shared => self.parse_function(),
            TokenKind::Fn => self.parse_function(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Import => self.parse_import(),
            TokenKind::Break => {
                self.advance();
                Stmt::new(StmtKind::Break, tok)
            }
            TokenKind::Continue => {
                self.advance();
                Stmt::new(StmtKind::Continue, tok)
            }
            TokenKind::LBrace => {
                let body = self.parse_body();
                Stmt::new(StmtKind::Block(body), tok)
            }
            _ => {
                let expr = self.parse_expr();
                Stmt::new(StmtKind::ExprStmt(expr), tok)
            }
        }
    }

    /// A statement body after `=>`: either an indented block, a brace block, or a
    /// single statement on the same line.
    fn parse_body(&mut self) -> Vec<Stmt> {
        if self.match_tok(TokenKind::Newline) {
            if !self.check(TokenKind::Indent) {
                // Empty body: `=>` immediately followed by a dedent (e.g. `fn f() =>`
                // with nothing indented under it).
                return Vec::new();
            }
            self.advance();
            let mut stmts = Vec::new();
            loop {
                self.skip_newlines();
                if self.check(TokenKind::Dedent) || self.is_at_end() {
                    break;
                }
                let before = self.pos;
                stmts.push(self.parse_stmt());
                if self.pos == before {
                    self.advance();
                }
                if !self.check(TokenKind::Newline) && !self.check(TokenKind::Dedent) {
                    // Statement produced mid-line (e.g. recovered after an error);
                    // swallow stray tokens up to the next boundary.
                    self.synchronize();
                }
                self.skip_newlines();
            }
            self.expect(TokenKind::Dedent, "dedent to close block");
            stmts
        } else if self.check(TokenKind::LBrace) {
            self.advance();
            self.skip_newlines();
            let mut stmts = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.is_at_end() {
                stmts.push(self.parse_stmt());
                self.skip_newlines();
            }
            self.expect(TokenKind::RBrace, "'}' to close block");
            stmts
        } else {
            vec![self.parse_stmt()]
        }
    }

    /// Looks past any blank lines for `else` immediately following a dedented `if`
    /// body, without committing to consuming them if it isn't there.
    fn peek_else_after_newlines(&self) -> bool {
        let mut i = self.pos;
        while self.tokens[i].kind == TokenKind::Newline {
            i += 1;
        }
        self.tokens[i].kind == TokenKind::Else
    }

    fn parse_var_decl(&mut self) -> Stmt {
        let tok = self.advance(); // `var`
        let name = self.expect_ident("variable name");
        let mut ty = None;
        if self.match_tok(TokenKind::Colon) {
            ty = Some(self.parse_type());
        }
        let qualifier = self.parse_opt_qualifier();
        let init = if self.match_tok(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        Stmt::new(
            StmtKind::VarDecl {
                name,
                ty,
                qualifier,
                init,
            },
            tok,
        )
    }

    fn parse_opt_qualifier(&mut self) -> MemoryQualifier {
        if self.match_tok(TokenKind::As) {
            if self.match_tok(TokenKind::Ref) {
                MemoryQualifier::AsRef
            } else if self.match_tok(TokenKind::Val) {
                MemoryQualifier::AsVal
            } else {
                self.error("expected 'ref' or 'val' after 'as'");
                MemoryQualifier::Default
            }
        } else {
            MemoryQualifier::Default
        }
    }

    fn parse_function(&mut self) -> Stmt {
        let modifier = if self.match_tok(TokenKind::Private) {
            FunctionModifier::Private
        } else if self.match_tok(TokenKind::Shared) {
            FunctionModifier::Shared
        } else {
            FunctionModifier::Default
        };
        let tok = self.expect(TokenKind::Fn, "'fn'");
        let name = self.expect_ident("function name");
        let params = self.parse_param_list();
        let ret = if self.match_tok(TokenKind::Colon) {
            self.parse_type()
        } else {
            Type::Void
        };
        self.expect(TokenKind::Arrow, "'=>' before function body");
        let body = self.parse_body();
        Stmt::new(
            StmtKind::Function {
                name,
                params,
                ret,
                modifier,
                body,
            },
            tok,
        )
    }

    fn parse_param_list(&mut self) -> Vec<Parameter> {
        self.expect(TokenKind::LParen, "'(' to start parameter list");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let name_tok = self.expect(TokenKind::Ident, "parameter name");
                self.expect(TokenKind::Colon, "':' before parameter type");
                let ty = self.parse_type();
                let qualifier = self.parse_opt_qualifier();
                params.push(Parameter::new(name_tok, ty, qualifier));
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close parameter list");
        params
    }

    /// Parses a type annotation: a builtin/opaque type name, a `fn(params): ret`
    /// function type, or either with trailing `[]` array suffixes.
    fn parse_type(&mut self) -> Type {
        let mut ty = if self.match_tok(TokenKind::Fn) {
            self.expect(TokenKind::LParen, "'(' in function type");
            let mut params = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    params.push(self.parse_type());
                    if !self.match_tok(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')' in function type");
            self.expect(TokenKind::Colon, "':' before function return type");
            let ret = Box::new(self.parse_type());
            Type::Function { ret, params }
        } else {
            let name = self.expect_ident("type name");
            match builtin_types::lookup(&name) {
                Some(t) => t,
                None => {
                    self.error(format!("unknown type '{}'", name));
                    Type::Nil
                }
            }
        };
        while self.check(TokenKind::LBracket) && self.check_at(1, TokenKind::RBracket) {
            self.advance();
            self.advance();
            ty = Type::Array(Box::new(ty));
        }
        ty
    }

    fn parse_if(&mut self) -> Stmt {
        let tok = self.advance();
        let cond = self.parse_expr();
        self.expect(TokenKind::Arrow, "'=>' before 'if' body");
        let then_branch = self.parse_body();
        let else_branch = if self.peek_else_after_newlines() {
            self.skip_newlines();
            self.advance(); // `else`
            if self.check(TokenKind::If) {
                Some(vec![self.parse_if()])
            } else {
                self.expect(TokenKind::Arrow, "'=>' before 'else' body");
                Some(self.parse_body())
            }
        } else {
            None
        };
        Stmt::new(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            tok,
        )
    }

    fn parse_while(&mut self) -> Stmt {
        let tok = self.advance();
        let cond = self.parse_expr();
        self.expect(TokenKind::Arrow, "'=>' before 'while' body");
        let body = self.parse_body();
        Stmt::new(StmtKind::While { cond, body }, tok)
    }

    /// Dispatches between the C-style three-clause `for` and `for-each`, by looking
    /// one identifier and `in` ahead.
    fn parse_for(&mut self) -> Stmt {
        let tok = self.advance();
        if self.check(TokenKind::Ident) && self.check_at(1, TokenKind::In) {
            let var_name = self.advance().lexeme;
            self.advance(); // `in`
            let iterable = self.parse_expr();
            self.expect(TokenKind::Arrow, "'=>' before 'for' body");
            let body = self.parse_body();
            return Stmt::new(
                StmtKind::ForEach {
                    var_name,
                    iterable,
                    body,
                },
                tok,
            );
        }

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            self.advance();
            let name = self.expect_ident("variable name");
            let ty = if self.match_tok(TokenKind::Colon) {
                Some(self.parse_type())
            } else {
                None
            };
            let init = if self.match_tok(TokenKind::Eq) {
                Some(self.parse_expr())
            } else {
                None
            };
            Some(Box::new(ForInit::VarDecl { name, ty, init }))
        } else {
            Some(Box::new(ForInit::Expr(self.parse_expr())))
        };
        self.expect(TokenKind::Semicolon, "';' after 'for' initializer");

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Semicolon, "';' after 'for' condition");

        let incr = if self.check(TokenKind::Arrow) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Arrow, "'=>' before 'for' body");
        let body = self.parse_body();
        Stmt::new(
            StmtKind::For {
                init,
                cond,
                incr,
                body,
            },
            tok,
        )
    }

    fn parse_return(&mut self) -> Stmt {
        let tok = self.advance();
        let value = if matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof | TokenKind::RBrace
        ) {
            None
        } else {
            Some(self.parse_expr())
        };
        Stmt::new(StmtKind::Return(value), tok)
    }

    fn parse_import(&mut self) -> Stmt {
        let tok = self.advance();
        let path_tok = self.expect(TokenKind::StringLiteral, "a string literal path");
        Stmt::new(
            StmtKind::Import {
                path: path_tok.lexeme,
            },
            tok,
        )
    }

    // ---- expressions ------------------------------------------------------------

    fn parse_expr(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let target = self.parse_or();
        let compound = match self.peek().kind {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            TokenKind::StarEq => Some(BinaryOp::Mul),
            TokenKind::SlashEq => Some(BinaryOp::Div),
            _ => return target,
        };
        let op_tok = self.advance();
        let rhs = self.parse_assignment();
        let value = match compound {
            None => rhs,
            Some(op) => Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(target.clone()),
                    right: Box::new(rhs),
                },
                op_tok.clone(),
            ),
        };
        match target.kind {
            ExprKind::Variable(name) => Expr::new(
                ExprKind::Assign {
                    name,
                    value: Box::new(value),
                },
                op_tok,
            ),
            ExprKind::ArrayAccess { array, index } => Expr::new(
                ExprKind::IndexAssign {
                    target: array,
                    index,
                    value: Box::new(value),
                },
                op_tok,
            ),
            _ => {
                self.error("invalid assignment target");
                target
            }
        }
    }

    fn parse_or(&mut self) -> Expr {
        let mut left = self.parse_and();
        while self.check(TokenKind::Or) {
            let tok = self.advance();
            let right = self.parse_and();
            left = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    fn parse_and(&mut self) -> Expr {
        let mut left = self.parse_equality();
        while self.check(TokenKind::And) {
            let tok = self.advance();
            let right = self.parse_equality();
            left = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    fn parse_equality(&mut self) -> Expr {
        let mut left = self.parse_comparison();
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::NotEq,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_comparison();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    fn parse_comparison(&mut self) -> Expr {
        let mut left = self.parse_type_test();
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_type_test();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    /// `expr is Type` / `expr as Type` / `expr as val` sit between comparison and
    /// range in precedence: `a is int and b is long` should parse each side
    /// independently of the `and`, but `a + 1 is int` should bind `is` looser than
    /// `+` so the addition happens first.
    fn parse_type_test(&mut self) -> Expr {
        let mut left = self.parse_range();
        loop {
            if self.check(TokenKind::Ident) && self.peek().lexeme == "is" {
                let tok = self.advance();
                let ty = self.parse_type();
                left = Expr::new(ExprKind::Is { value: Box::new(left), ty }, tok);
            } else if self.check(TokenKind::As) {
                let tok = self.advance();
                if self.match_tok(TokenKind::Val) {
                    left = Expr::new(ExprKind::AsVal(Box::new(left)), tok);
                } else {
                    let ty = self.parse_type();
                    left = Expr::new(ExprKind::AsType { value: Box::new(left), ty }, tok);
                }
            } else {
                break;
            }
        }
        left
    }

    fn parse_range(&mut self) -> Expr {
        let left = self.parse_additive();
        if self.check(TokenKind::DotDot) {
            let tok = self.advance();
            let right = self.parse_additive();
            Expr::new(
                ExprKind::Range {
                    start: Box::new(left),
                    end: Box::new(right),
                },
                tok,
            )
        } else {
            left
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_multiplicative();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut left = self.parse_unary();
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_unary();
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok,
            );
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        match self.peek().kind {
            TokenKind::Minus => {
                let tok = self.advance();
                let operand = self.parse_unary();
                Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }, tok)
            }
            TokenKind::Bang => {
                let tok = self.advance();
                let operand = self.parse_unary();
                Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) }, tok)
            }
            TokenKind::DotDotDot => {
                let tok = self.advance();
                let operand = self.parse_unary();
                Expr::new(ExprKind::Spread(Box::new(operand)), tok)
            }
            TokenKind::Spawn => {
                let tok = self.advance();
                let operand = self.parse_unary();
                Expr::new(ExprKind::ThreadSpawn(Box::new(operand)), tok)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    let tok = self.advance();
                    let args = self.parse_args();
                    self.expect(TokenKind::RParen, "')' to close call arguments");
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        tok,
                    );
                }
                TokenKind::Dot => {
                    let tok = self.advance();
                    let name = self.expect_ident("member name");
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        tok,
                    );
                }
                TokenKind::LBracket => {
                    let tok = self.advance();
                    expr = self.parse_index_or_slice(expr, tok);
                }
                TokenKind::PlusPlus => {
                    let tok = self.advance();
                    expr = Expr::new(ExprKind::Increment(Box::new(expr)), tok);
                }
                TokenKind::MinusMinus => {
                    let tok = self.advance();
                    expr = Expr::new(ExprKind::Decrement(Box::new(expr)), tok);
                }
                TokenKind::Bang => {
                    let tok = self.advance();
                    expr = match expr.kind {
                        ExprKind::Array(elems) => Expr::new(ExprKind::SyncList(elems), tok),
                        _ => Expr::new(ExprKind::ThreadSync(Box::new(expr)), tok),
                    };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_index_or_slice(&mut self, array: Expr, tok: Token) -> Expr {
        let mut start = None;
        if !self.check(TokenKind::DotDot) && !self.check(TokenKind::RBracket) {
            start = Some(Box::new(self.parse_expr()));
        }
        if self.match_tok(TokenKind::DotDot) {
            let end = if self.check(TokenKind::Colon) || self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()))
            };
            let step = if self.match_tok(TokenKind::Colon) {
                Some(Box::new(self.parse_expr()))
            } else {
                None
            };
            self.expect(TokenKind::RBracket, "']' to close slice");
            Expr::new(
                ExprKind::ArraySlice {
                    array: Box::new(array),
                    start,
                    end,
                    step,
                },
                tok,
            )
        } else {
            self.expect(TokenKind::RBracket, "']' to close index");
            let index = match start {
                Some(i) => i,
                None => {
                    self.error("expected an index expression");
                    Expr::boxed(ExprKind::Literal(Literal::Long(0)), tok.clone())
                }
            };
            Expr::new(
                ExprKind::ArrayAccess {
                    array: Box::new(array),
                    index,
                },
                tok,
            )
        }
    }

    fn parse_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr());
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        args
    }

    fn parse_primary(&mut self) -> Expr {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLiteral
            | TokenKind::LongLiteral
            | TokenKind::FloatLiteral
            | TokenKind::DoubleLiteral
            | TokenKind::StringLiteral
            | TokenKind::CharLiteral
            | TokenKind::BoolLiteral
            | TokenKind::NilLiteral => {
                self.advance();
                let literal = tok.literal.clone().unwrap_or(Literal::Nil);
                Expr::new(ExprKind::Literal(literal), tok)
            }
            TokenKind::InterpolatedString => {
                self.advance();
                self.parse_interpolated(tok)
            }
            TokenKind::LParen => {
                if self.looks_like_lambda() {
                    self.parse_lambda(FunctionModifier::Default)
                } else {
                    self.advance();
                    let inner = self.parse_expr();
                    self.expect(TokenKind::RParen, "')' to close parenthesized expression");
                    inner
                }
            }
            TokenKind::Private | TokenKind::Shared if self.check_at(1, TokenKind::LParen) => {
                let modifier = if self.advance().kind == TokenKind::Private {
                    FunctionModifier::Private
                } else {
                    FunctionModifier::Shared
                };
                self.parse_lambda(modifier)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::Ident => self.parse_ident_primary(),
            _ => {
                self.error(format!("unexpected token '{}'", tok.lexeme));
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Nil), tok)
            }
        }
    }

    fn parse_ident_primary(&mut self) -> Expr {
        let tok = self.advance();
        let name = tok.lexeme.clone();

        if name == "typeof" && self.check(TokenKind::LParen) {
            self.advance();
            let inner = self.parse_expr();
            self.expect(TokenKind::RParen, "')' to close 'typeof'");
            return Expr::new(ExprKind::TypeOf(Box::new(inner)), tok);
        }

        if builtin_types::is_known_type_name(&name) && self.check(TokenKind::LBracket) {
            self.advance();
            let size = self.parse_expr();
            let default = if self.match_tok(TokenKind::Comma) {
                Some(Box::new(self.parse_expr()))
            } else {
                None
            };
            self.expect(TokenKind::RBracket, "']' to close sized array allocation");
            let element = builtin_types::lookup(&name).unwrap_or(Type::Nil);
            return Expr::new(
                ExprKind::SizedArrayAlloc {
                    element,
                    size: Box::new(size),
                    default,
                },
                tok,
            );
        }

        if builtin_types::is_known_static_receiver(&name) && self.check(TokenKind::Dot) {
            self.advance();
            let method = self.expect_ident("static method name");
            self.expect(TokenKind::LParen, "'(' to start static call arguments");
            let args = self.parse_args();
            self.expect(TokenKind::RParen, "')' to close static call arguments");
            return Expr::new(
                ExprKind::StaticCall {
                    type_name: name,
                    method,
                    args,
                },
                tok,
            );
        }

        Expr::new(ExprKind::Variable(name), tok)
    }

    /// Scans forward from the current `(` to its matching `)` (without consuming
    /// anything) to decide whether this parenthesized group is a lambda parameter
    /// list — i.e. followed by an optional `: ret` and then `=>` — or a plain
    /// parenthesized expression.
    fn looks_like_lambda(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        loop {
            match self.tokens.get(i) {
                None => return false,
                Some(t) => match t.kind {
                    TokenKind::LParen => {
                        depth += 1;
                        i += 1;
                    }
                    TokenKind::RParen => {
                        depth -= 1;
                        i += 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => return false,
                    _ => i += 1,
                },
            }
        }
        let mut j = i;
        if self.tokens.get(j).map(|t| t.kind) == Some(TokenKind::Colon) {
            j += 1;
            loop {
                match self.tokens.get(j) {
                    None => return false,
                    Some(t) if t.kind == TokenKind::Arrow => return true,
                    Some(t) if matches!(t.kind, TokenKind::Newline | TokenKind::Eof) => {
                        return false
                    }
                    _ => j += 1,
                }
            }
        }
        self.tokens.get(j).map(|t| t.kind) == Some(TokenKind::Arrow)
    }

    fn parse_lambda(&mut self, modifier: FunctionModifier) -> Expr {
        let tok = self.peek().clone();
        let params = self.parse_param_list();
        let ret = if self.match_tok(TokenKind::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        self.expect(TokenKind::Arrow, "'=>' before lambda body");
        let body = if self.check(TokenKind::Newline) || self.check(TokenKind::LBrace) {
            LambdaBody::Block(self.parse_body())
        } else {
            LambdaBody::Expr(Box::new(self.parse_expr()))
        };
        Expr::new(
            ExprKind::Lambda(LambdaExpr {
                params,
                ret,
                modifier,
                body,
                lifted_id: std::cell::Cell::new(None),
            }),
            tok,
        )
    }

    fn parse_array_literal(&mut self) -> Expr {
        let tok = self.advance(); // `[`
        let mut elements = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expr());
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']' to close array literal");
        Expr::new(ExprKind::Array(elements), tok)
    }

    /// Re-tokenizes and re-parses each `{expr}` hole of an interpolated string. The
    /// sub-parse shares this parser's diagnostics sink so hole errors are reported
    /// against the same file, at the outer string literal's line.
    fn parse_interpolated(&mut self, tok: Token) -> Expr {
        let mut parts = Vec::new();
        for part in tok.interp_parts.iter() {
            match part {
                InterpSource::Literal(s) => {
                    if !s.is_empty() {
                        parts.push(InterpPart::Literal(s.clone()));
                    }
                }
                InterpSource::Expr { source, spec } => {
                    let sub_tokens = lexer::lex(source, &self.filename, dummy_file_handle(), self.diags);
                    let mut sub = Parser {
                        tokens: sub_tokens,
                        pos: 0,
                        filename: self.filename.clone(),
                        diags: &mut *self.diags,
                    };
                    let expr = sub.parse_expr();
                    parts.push(InterpPart::Expr {
                        expr: Box::new(expr),
                        spec: spec.clone(),
                    });
                }
            }
        }
        if parts.is_empty() {
            parts.push(InterpPart::Literal(String::new()));
        }
        Expr::new(ExprKind::Interpolated(parts), tok)
    }
}

/// The sub-lexer used for interpolation holes only needs a `Loc` that round-trips
/// through diagnostics; it never compares against the outer file's handle, so a
/// fresh one-off arena is cheaper than threading the real one through `Parser`.
fn dummy_file_handle() -> crate::arena::S<FileName> {
    thread_local! {
        static ARENA: std::cell::RefCell<crate::arena::UniqueStringArena<FileName>> =
            std::cell::RefCell::new(crate::arena::UniqueStringArena::new());
    }
    ARENA.with(|a| a.borrow_mut().alloc("<interp>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::UniqueStringArena;

    fn parse(src: &str) -> (Module, Diagnostics) {
        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let file = files.alloc("test.rh");
        let mut diags = Diagnostics::new();
        let tokens = lexer::lex(src, "test.rh", file, &mut diags);
        let module = parse_module(tokens, "test.rh", &mut diags);
        (module, diags)
    }

    #[test]
    fn parses_hello_world() {
        let (module, diags) = parse("fn main =>\n  print(\"hello\")\n");
        assert!(!diags.has_errors());
        assert!(module.has_main);
        assert_eq!(module.statements.len(), 1);
    }

    #[test]
    fn parses_array_literal_with_spread_and_range() {
        let (module, diags) = parse("fn main =>\n  var arr: int[] = [1..3, 5, ...[6,7]]\n");
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::VarDecl { init: Some(init), .. } = &body[0].kind else { panic!() };
        match &init.kind {
            ExprKind::Array(elems) => assert_eq!(elems.len(), 3),
            other => panic!("expected array literal, got {:?}", other),
        }
    }

    #[test]
    fn parses_lambda_with_capture_and_increment() {
        let (module, diags) = parse(
            "fn main =>\n  var n: int = 0\n  var inc: fn(): void = () => n++\n  inc()\n",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::VarDecl { init: Some(init), .. } = &body[1].kind else { panic!() };
        assert!(matches!(init.kind, ExprKind::Lambda(_)));
    }

    #[test]
    fn parses_c_style_for_and_for_each() {
        let (module, diags) = parse(
            "fn main =>\n  for var i: int = 0; i < 3; i++ =>\n    print(i)\n  for x in [1,2,3] =>\n    print(x)\n",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        assert!(matches!(body[0].kind, StmtKind::For { .. }));
        assert!(matches!(body[1].kind, StmtKind::ForEach { .. }));
    }

    #[test]
    fn parses_if_else_chain() {
        let (module, diags) = parse(
            "fn main =>\n  if 1 == 1 =>\n    print(1)\n  else if 2 == 2 =>\n    print(2)\n  else =>\n    print(3)\n",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::If { else_branch: Some(eb), .. } = &body[0].kind else { panic!() };
        assert!(matches!(eb[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn negative_index_and_slice_with_step() {
        let (module, diags) = parse(
            "fn main =>\n  var a: int[] = [1,2,3]\n  print(a[-1])\n  print(a[0..2:1])\n",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let StmtKind::Function { body, .. } = &module.statements[0].kind else { panic!() };
        let StmtKind::ExprStmt(call) = &body[1].kind else { panic!() };
        let ExprKind::Call { args, .. } = &call.kind else { panic!() };
        assert!(matches!(args[0].kind, ExprKind::ArrayAccess { .. }));
        let StmtKind::ExprStmt(call2) = &body[2].kind else { panic!() };
        let ExprKind::Call { args: args2, .. } = &call2.kind else { panic!() };
        assert!(matches!(args2[0].kind, ExprKind::ArraySlice { .. }));
    }
}
