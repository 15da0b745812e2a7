use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, DeclKind, Declarator, Expr, ExprKind, ForInit, FunctionBody, FunctionDef,
        ImportClause, ImportDecl, ImportSpecifier, Literal, LogicalOp, Program, PropertyKey, Stmt,
        StmtKind, TemplatePart, UnaryOp, UpdateOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

/// Deepest expression or statement nesting accepted by the parser.
const MAX_NESTING: usize = 256;
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Parses a whole buffer, failing on the first syntax error.
pub fn parse_program(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(source, tokens).parse_program()
}

/// One top-level statement of a buffer parsed with error recovery.
#[derive(Debug, Clone)]
pub enum TopLevel {
    Parsed(Stmt),
    Invalid {
        diagnostic: Diagnostic,
        span: SourceSpan,
    },
}

impl TopLevel {
    pub fn span(&self) -> SourceSpan {
        match self {
            TopLevel::Parsed(stmt) => stmt.span,
            TopLevel::Invalid { span, .. } => *span,
        }
    }
}

/// Parses every top-level statement of `source`, recovering after syntax
/// errors so one broken statement does not hide the rest of the buffer.
pub fn parse_top_level(source: &str) -> Vec<TopLevel> {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => Parser::new(source, tokens).parse_recovering(),
        Err(diagnostic) => {
            let mut cut = diagnostic.span.map(|span| span.start).unwrap_or(0);
            let mut items = match Lexer::new(&source[..cut]).tokenize() {
                Ok(tokens) => Parser::new(source, tokens).parse_recovering(),
                Err(_) => Vec::new(),
            };
            // A statement cut short by the lexer error belongs to the invalid tail.
            if let Some(TopLevel::Invalid { span, .. }) = items.last() {
                if span.end >= cut {
                    cut = span.start;
                    items.pop();
                }
            }
            items.push(TopLevel::Invalid {
                diagnostic,
                span: SourceSpan::new(cut, source.len()),
            });
            items
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    current: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper, growing the stack when it runs low.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        if self.depth >= MAX_NESTING {
            let token = self.peek_token().clone();
            return Err(self.error(&token, "maximum nesting depth exceeded"));
        }
        self.depth += 1;
        let outcome = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || parse(self));
        self.depth -= 1;
        outcome
    }

    fn parse_program(&mut self) -> Result<Program, Diagnostic> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_statement()?);
        }
        Ok(Program { items })
    }

    fn parse_recovering(mut self) -> Vec<TopLevel> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            let first = self.current;
            match self.parse_statement() {
                Ok(stmt) => items.push(TopLevel::Parsed(stmt)),
                Err(diagnostic) => {
                    self.current = first;
                    let start = self.tokens[first].span.start;
                    self.synchronize();
                    let end = self.previous().span.end.max(start);
                    items.push(TopLevel::Invalid {
                        diagnostic,
                        span: SourceSpan::new(start, end),
                    });
                }
            }
        }
        items
    }

    /// Skips the tokens of a broken statement: up to a `;` or a line break at
    /// bracket depth zero.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        let mut consumed = false;
        while !self.is_at_end() {
            let token = self.peek_token();
            if consumed && depth == 0 && token.line_break_before {
                break;
            }
            let kind = token.kind;
            self.advance();
            consumed = true;
            match kind {
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Semicolon if depth == 0 => break,
                _ => {}
            }
        }
    }

    fn parse_block_items(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` to close block")?;
        Ok(items)
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let items = self.parse_block_items()?;
        Ok((items, self.finish(lbrace.span.start)))
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        self.nested(Self::parse_statement_kind)
    }

    fn parse_statement_kind(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.peek_token().clone();
        match token.kind {
            TokenKind::Keyword(Keyword::Var) => self.parse_var_statement(DeclKind::Var),
            TokenKind::Keyword(Keyword::Let) => self.parse_var_statement(DeclKind::Let),
            TokenKind::Keyword(Keyword::Const) => self.parse_var_statement(DeclKind::Const),
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let def = self.parse_function_rest(token.span.start, false, true)?;
                Ok(Stmt {
                    span: self.finish(token.span.start),
                    kind: StmtKind::Function(def),
                })
            }
            TokenKind::Keyword(Keyword::Async) if self.async_function_ahead() => {
                self.advance();
                self.advance();
                let def = self.parse_function_rest(token.span.start, true, true)?;
                Ok(Stmt {
                    span: self.finish(token.span.start),
                    kind: StmtKind::Function(def),
                })
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt {
                    span: self.finish(token.span.start),
                    kind: StmtKind::Break,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt {
                    span: self.finish(token.span.start),
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                if self.peek_token().line_break_before {
                    return Err(self.error(self.peek_token(), "illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.end_statement()?;
                Ok(Stmt {
                    span: self.finish(token.span.start),
                    kind: StmtKind::Throw(value),
                })
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::Export) => self.parse_export(),
            TokenKind::LBrace => {
                let (items, span) = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(items),
                    span,
                })
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt {
                    kind: StmtKind::Empty,
                    span: token.span,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_statement(&mut self, kind: DeclKind) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let declarations = self.parse_declarators(kind)?;
        self.end_statement()?;
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::VarDecl { kind, declarations },
        })
    }

    fn parse_declarators(&mut self, kind: DeclKind) -> Result<Vec<Declarator>, Diagnostic> {
        let mut declarations = Vec::new();
        loop {
            let name = self.consume_identifier("expected variable name")?;
            let init = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(self.error(&name, "missing initializer in const declaration"));
            }
            let end = init.as_ref().map(|e| e.span.end).unwrap_or(name.span.end);
            declarations.push(Declarator {
                name: name.lexeme.clone(),
                init,
                span: SourceSpan::new(name.span.start, end),
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(declarations)
    }

    /// Parses everything after the `function` keyword.
    fn parse_function_rest(
        &mut self,
        start: usize,
        is_async: bool,
        require_name: bool,
    ) -> Result<FunctionDef, Diagnostic> {
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else if require_name {
            return Err(self.error(self.peek_token(), "expected function name"));
        } else {
            None
        };
        let params = self.parse_params()?;
        let (body, _) = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params,
            body: Rc::new(FunctionBody::Block(body)),
            is_async,
            is_arrow: false,
            text: self.text_since(start),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before parameters")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let param = self.consume_identifier("expected parameter name")?;
            params.push(param.lexeme.clone());
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        Ok(params)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let condition = self.parse_paren_condition("if")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_paren_condition(&mut self, construct: &str) -> Result<Expr, Diagnostic> {
        self.consume(
            TokenKind::LParen,
            &format!("expected `(` after `{construct}`"),
        )?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "expected `)` after condition")?;
        Ok(condition)
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let condition = self.parse_paren_condition("while")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let body = Box::new(self.parse_statement()?);
        if !self.matches_keyword(Keyword::While) {
            return Err(self.error(self.peek_token(), "expected `while` after do body"));
        }
        let condition = self.parse_paren_condition("while")?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::DoWhile { body, condition },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let is_await = self.matches_keyword(Keyword::Await);
        self.consume(TokenKind::LParen, "expected `(` after `for`")?;

        let kind = match self.peek_token().kind {
            TokenKind::Keyword(Keyword::Var) => Some(DeclKind::Var),
            TokenKind::Keyword(Keyword::Let) => Some(DeclKind::Let),
            TokenKind::Keyword(Keyword::Const) => Some(DeclKind::Const),
            _ => None,
        };
        let binding_at = self.current + usize::from(kind.is_some());
        let iteration = self
            .tokens
            .get(binding_at + 1)
            .filter(|_| self.tokens[binding_at].kind == TokenKind::Identifier)
            .and_then(|next| {
                if next.is_identifier("of") {
                    Some(true)
                } else if next.kind == TokenKind::Keyword(Keyword::In) {
                    Some(false)
                } else {
                    None
                }
            });

        if let Some(is_of) = iteration {
            if kind.is_some() {
                self.advance();
            }
            let binding = self.advance().lexeme;
            self.advance();
            let target = if is_of {
                self.parse_expression()?
            } else {
                self.parse_expression()?
            };
            self.consume(TokenKind::RParen, "expected `)` after loop header")?;
            let body = Box::new(self.parse_statement()?);
            let kind = if is_of {
                StmtKind::ForOf {
                    kind,
                    binding,
                    iterable: target,
                    body,
                    is_await,
                }
            } else {
                StmtKind::ForIn {
                    kind,
                    binding,
                    object: target,
                    body,
                }
            };
            return Ok(Stmt {
                span: self.finish(start),
                kind,
            });
        }

        if is_await {
            return Err(self.error(self.peek_token(), "`for await` requires an `of` loop"));
        }

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if let Some(kind) = kind {
            self.advance();
            Some(ForInit::Decl {
                kind,
                declarations: self.parse_declarators(kind)?,
            })
        } else {
            Some(ForInit::Expr(self.parse_expression()?))
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop initializer")?;
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop condition")?;
        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RParen, "expected `)` after loop header")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::For {
                init,
                condition,
                update,
                body,
            },
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.advance();
        let next = self.peek_token();
        let expr = if matches!(
            next.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) || next.line_break_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.end_statement()?;
        Ok(Stmt {
            span: self.finish(token.span.start),
            kind: StmtKind::Return(expr),
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let (block, _) = self.parse_block()?;
        let mut param = None;
        let mut handler = None;
        if self.matches_keyword(Keyword::Catch) {
            if self.matches(TokenKind::LParen) {
                param = Some(self.consume_identifier("expected catch binding")?.lexeme);
                self.consume(TokenKind::RParen, "expected `)` after catch binding")?;
            }
            handler = Some(self.parse_block()?.0);
        }
        let finalizer = if self.matches_keyword(Keyword::Finally) {
            Some(self.parse_block()?.0)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error(self.peek_token(), "missing catch or finally after try"));
        }
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            },
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        let clause = if self.check(TokenKind::String) {
            ImportClause::SideEffect
        } else if self.matches(TokenKind::Star) {
            self.consume_contextual("as", "expected `as` after `*`")?;
            ImportClause::Namespace(self.consume_identifier("expected namespace name")?.lexeme)
        } else if self.check(TokenKind::LBrace) {
            ImportClause::Named {
                default: None,
                specifiers: self.parse_import_specifiers()?,
            }
        } else {
            let default = self.consume_identifier("expected import binding")?.lexeme;
            if self.matches(TokenKind::Comma) {
                if self.matches(TokenKind::Star) {
                    self.consume_contextual("as", "expected `as` after `*`")?;
                    ImportClause::Namespace(
                        self.consume_identifier("expected namespace name")?.lexeme,
                    )
                } else {
                    ImportClause::Named {
                        default: Some(default),
                        specifiers: self.parse_import_specifiers()?,
                    }
                }
            } else {
                ImportClause::Default(default)
            }
        };
        if !matches!(clause, ImportClause::SideEffect) {
            self.consume_contextual("from", "expected `from` after import clause")?;
        }
        let specifier = self.consume(TokenKind::String, "expected module specifier")?;
        let source_text = self.source[specifier.span.start..specifier.span.end].to_string();
        self.end_statement()?;
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::Import(ImportDecl {
                clause,
                source: specifier.lexeme,
                source_text,
            }),
        })
    }

    fn parse_import_specifiers(&mut self) -> Result<Vec<ImportSpecifier>, Diagnostic> {
        self.consume(TokenKind::LBrace, "expected `{` in import")?;
        let mut specifiers = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let imported = self.consume_property_name("expected imported name")?;
            let local = if self.peek_token().is_identifier("as") {
                self.advance();
                self.consume_identifier("expected local name after `as`")?.lexeme
            } else {
                imported.clone()
            };
            specifiers.push(ImportSpecifier { imported, local });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after import list")?;
        Ok(specifiers)
    }

    fn parse_export(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.advance().span.start;
        if self.matches_keyword(Keyword::Default) {
            let value = self.parse_expression()?;
            self.end_statement()?;
            return Ok(Stmt {
                span: self.finish(start),
                kind: StmtKind::ExportDefault(value),
            });
        }
        let declaration = match self.peek_token().kind {
            TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const | Keyword::Function) => {
                self.parse_statement()?
            }
            TokenKind::Keyword(Keyword::Async) if self.async_function_ahead() => {
                self.parse_statement()?
            }
            _ => {
                return Err(self.error(self.peek_token(), "unsupported export form"));
            }
        };
        Ok(Stmt {
            span: self.finish(start),
            kind: StmtKind::Export(Box::new(declaration)),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.end_statement()?;
        Ok(Stmt {
            span: self.finish(expr.span.start),
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.nested(Self::parse_assignment)
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let expr = self.parse_conditional()?;
        let op = match self.peek_token().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(expr),
        };
        let operator = self.advance();
        let value = self.parse_expression()?;
        match expr.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. } => Ok(Expr {
                span: expr.span.to(value.span),
                kind: ExprKind::Assign {
                    op,
                    target: Box::new(expr),
                    value: Box::new(value),
                },
            }),
            _ => Err(
                Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                    .with_span(operator.span),
            ),
        }
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, Diagnostic> {
        let start_index = self.current;
        let is_async = self.check(TokenKind::Keyword(Keyword::Async))
            && self
                .tokens
                .get(start_index + 1)
                .is_some_and(|t| !t.line_break_before)
            && self.arrow_ahead(start_index + 1);
        if !is_async && !self.arrow_ahead(start_index) {
            return Ok(None);
        }
        let start = self.peek_token().span.start;
        if is_async {
            self.advance();
        }
        let params = if self.check(TokenKind::Identifier) {
            vec![self.advance().lexeme]
        } else {
            self.parse_params()?
        };
        self.consume(TokenKind::FatArrow, "expected `=>`")?;
        let body = if self.check(TokenKind::LBrace) {
            FunctionBody::Block(self.parse_block()?.0)
        } else {
            FunctionBody::Expr(Box::new(self.parse_expression()?))
        };
        let span = self.finish(start);
        Ok(Some(Expr {
            span,
            kind: ExprKind::Function(FunctionDef {
                name: None,
                params,
                body: Rc::new(body),
                is_async,
                is_arrow: true,
                text: self.text_since(start),
            }),
        }))
    }

    /// Whether the tokens at `index` start arrow parameters: `x =>` or `(...) =>`.
    fn arrow_ahead(&self, index: usize) -> bool {
        let Some(token) = self.tokens.get(index) else {
            return false;
        };
        match token.kind {
            TokenKind::Identifier => self
                .tokens
                .get(index + 1)
                .is_some_and(|t| t.kind == TokenKind::FatArrow),
            TokenKind::LParen => {
                let mut depth = 0usize;
                for (offset, token) in self.tokens[index..].iter().enumerate() {
                    match token.kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return self
                                    .tokens
                                    .get(index + offset + 1)
                                    .is_some_and(|t| t.kind == TokenKind::FatArrow);
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                }
                false
            }
            _ => false,
        }
    }

    fn async_function_ahead(&self) -> bool {
        self.tokens.get(self.current + 1).is_some_and(|t| {
            t.kind == TokenKind::Keyword(Keyword::Function) && !t.line_break_before
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, Diagnostic> {
        let test = self.parse_logical_or()?;
        if !self.matches(TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_expression()?;
        self.consume(TokenKind::Colon, "expected `:` in conditional expression")?;
        let alternate = self.parse_expression()?;
        Ok(Expr {
            span: test.span.to(alternate.span),
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_logical_and()?;
        loop {
            let op = if self.matches(TokenKind::DoublePipe) {
                LogicalOp::Or
            } else if self.matches(TokenKind::QuestionQuestion) {
                LogicalOp::Nullish
            } else {
                break;
            };
            let right = self.parse_logical_and()?;
            expr = logical(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek_token().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                TokenKind::EqualEqualEqual => BinaryOp::StrictEqual,
                TokenKind::BangEqualEqual => BinaryOp::StrictNotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek_token().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Keyword(Keyword::In) => BinaryOp::In,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek_token().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_exponent()?;
        loop {
            let op = match self.peek_token().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_exponent(&mut self) -> Result<Expr, Diagnostic> {
        let base = self.parse_unary()?;
        if self.matches(TokenKind::StarStar) {
            let exponent = self.nested(Self::parse_exponent)?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek_token().clone();
        let op = match token.kind {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                span: token.span.to(right.span),
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(right),
                },
            });
        }
        if self.matches_keyword(Keyword::Await) {
            let expr = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                span: token.span.to(expr.span),
                kind: ExprKind::Await(Box::new(expr)),
            });
        }
        if matches!(token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            self.advance();
            let target = self.nested(Self::parse_unary)?;
            return self.update(token, target, true);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_call()?;
        let next = self.peek_token().clone();
        if matches!(next.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) && !next.line_break_before
        {
            self.advance();
            return self.update(next, expr, false);
        }
        Ok(expr)
    }

    fn update(&self, operator: Token, target: Expr, prefix: bool) -> Result<Expr, Diagnostic> {
        if !matches!(
            target.kind,
            ExprKind::Variable(_) | ExprKind::Field { .. } | ExprKind::Index { .. }
        ) {
            return Err(self.error(&operator, "invalid update target"));
        }
        let op = if operator.kind == TokenKind::PlusPlus {
            UpdateOp::Increment
        } else {
            UpdateOp::Decrement
        };
        let span = if prefix {
            operator.span.to(target.span)
        } else {
            target.span.to(operator.span)
        };
        Ok(Expr {
            span,
            kind: ExprKind::Update {
                op,
                prefix,
                target: Box::new(target),
            },
        })
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = if self.check(TokenKind::Keyword(Keyword::New)) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.check(TokenKind::LParen) {
                let (args, end) = self.parse_arguments()?;
                expr = Expr {
                    span: SourceSpan::new(expr.span.start, end),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if let Some(member) = self.parse_member_suffix(&expr)? {
                expr = member;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.advance().span.start;
        let mut callee = if self.check(TokenKind::Keyword(Keyword::New)) {
            self.nested(Self::parse_new)?
        } else {
            self.parse_primary()?
        };
        while let Some(member) = self.parse_member_suffix(&callee)? {
            callee = member;
        }
        let (args, end) = if self.check(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            (Vec::new(), callee.span.end)
        };
        Ok(Expr {
            span: SourceSpan::new(start, end),
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        })
    }

    fn parse_member_suffix(&mut self, target: &Expr) -> Result<Option<Expr>, Diagnostic> {
        if self.matches(TokenKind::LBracket) {
            let index = self.parse_expression()?;
            let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
            Ok(Some(Expr {
                span: SourceSpan::new(target.span.start, bracket.span.end),
                kind: ExprKind::Index {
                    target: Box::new(target.clone()),
                    index: Box::new(index),
                },
            }))
        } else if self.matches(TokenKind::Dot) {
            let field = self.consume_property_name("expected property name after `.`")?;
            Ok(Some(Expr {
                span: SourceSpan::new(target.span.start, self.previous().span.end),
                kind: ExprKind::Field {
                    target: Box::new(target.clone()),
                    field,
                },
            }))
        } else {
            Ok(None)
        }
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Expr>, usize), Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` before arguments")?;
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok((args, paren.span.end))
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek_token().clone();
        let literal = |kind| {
            Ok(Expr {
                span: token.span,
                kind: ExprKind::Literal(kind),
            })
        };
        match token.kind {
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                literal(Literal::Null)
            }
            TokenKind::Number => {
                self.advance();
                match parse_number(&token.lexeme) {
                    Some(n) => literal(Literal::Number(n)),
                    None => Err(self.error(&token, "invalid number literal")),
                }
            }
            TokenKind::String => {
                self.advance();
                literal(Literal::String(token.lexeme.clone()))
            }
            TokenKind::Template => {
                self.advance();
                let parts = self.parse_template(&token)?;
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Template(parts),
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme.clone()),
                })
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let def = self.parse_function_rest(token.span.start, false, false)?;
                Ok(Expr {
                    span: self.finish(token.span.start),
                    kind: ExprKind::Function(def),
                })
            }
            TokenKind::Keyword(Keyword::Async) if self.async_function_ahead() => {
                self.advance();
                self.advance();
                let def = self.parse_function_rest(token.span.start, true, false)?;
                Ok(Expr {
                    span: self.finish(token.span.start),
                    kind: ExprKind::Function(def),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(Expr {
                    span: token.span.to(rparen.span),
                    kind: ExprKind::Group(Box::new(inner)),
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                let rbracket =
                    self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
                Ok(Expr {
                    span: token.span.to(rbracket.span),
                    kind: ExprKind::ArrayLiteral(elements),
                })
            }
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Eof => Err(self.error_eof("unexpected end of input")),
            _ => Err(self.error(&token, &format!("unexpected token `{}`", token.lexeme))),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let key_token = self.peek_token().clone();
            let key = match key_token.kind {
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.consume(TokenKind::RBracket, "expected `]` after computed key")?;
                    PropertyKey::Computed(key)
                }
                TokenKind::String | TokenKind::Identifier | TokenKind::Keyword(_) => {
                    self.advance();
                    PropertyKey::Named(key_token.lexeme.clone())
                }
                TokenKind::Number => {
                    self.advance();
                    let n = parse_number(&key_token.lexeme)
                        .ok_or_else(|| self.error(&key_token, "invalid number literal"))?;
                    PropertyKey::Named(crate::value::number_to_string(n))
                }
                _ => return Err(self.error(&key_token, "expected property name")),
            };

            let value = if self.matches(TokenKind::Colon) {
                self.parse_expression()?
            } else if self.check(TokenKind::LParen) {
                let params = self.parse_params()?;
                let (body, _) = self.parse_block()?;
                Expr {
                    span: self.finish(key_token.span.start),
                    kind: ExprKind::Function(FunctionDef {
                        name: Some(key_token.lexeme.clone()),
                        params,
                        body: Rc::new(FunctionBody::Block(body)),
                        is_async: false,
                        is_arrow: false,
                        text: self.text_since(key_token.span.start),
                    }),
                }
            } else if key_token.kind == TokenKind::Identifier {
                Expr {
                    span: key_token.span,
                    kind: ExprKind::Variable(key_token.lexeme.clone()),
                }
            } else {
                return Err(self.error(self.peek_token(), "expected `:` after property name"));
            };
            entries.push((key, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` after object literal")?;
        Ok(Expr {
            span: lbrace.span.to(rbrace.span),
            kind: ExprKind::ObjectLiteral(entries),
        })
    }

    fn parse_template(&self, token: &Token) -> Result<Vec<TemplatePart>, Diagnostic> {
        let raw = token.lexeme.as_str();
        let body_offset = token.span.start + 1;
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = raw.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            match ch {
                '\\' => {
                    if let Some((_, esc)) = chars.next() {
                        text.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => other,
                        });
                    }
                }
                '$' if chars.peek().is_some_and(|(_, c)| *c == '{') => {
                    chars.next();
                    let inner_start = idx + 2;
                    let mut depth = 1usize;
                    let mut inner_end = raw.len();
                    for (j, c) in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    inner_end = j;
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let inner = &raw[inner_start..inner_end];
                    let tokens = Lexer::with_offset(inner, body_offset + inner_start).tokenize()?;
                    let mut parser = Parser::new(self.source, tokens);
                    parser.depth = self.depth + 1;
                    let expr = parser.parse_expression()?;
                    if !parser.is_at_end() {
                        return Err(parser.error(parser.peek_token(), "unexpected token in template"));
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
                _ => text.push(ch),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(parts)
    }

    fn finish(&self, start: usize) -> SourceSpan {
        SourceSpan::new(start, self.previous().span.end.max(start))
    }

    fn text_since(&self, start: usize) -> Rc<str> {
        let end = self.previous().span.end;
        Rc::from(self.source.get(start..end).unwrap_or_default())
    }

    /// Ends a simple statement: an explicit `;`, or a position where one may
    /// be omitted (closing brace, end of input, or a line break).
    fn end_statement(&mut self) -> Result<(), Diagnostic> {
        if self.matches(TokenKind::Semicolon) {
            return Ok(());
        }
        let next = self.peek_token();
        if matches!(next.kind, TokenKind::RBrace | TokenKind::Eof) || next.line_break_before {
            Ok(())
        } else {
            Err(self.error(next, &format!("unexpected token `{}`", next.lexeme)))
        }
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek_token(), message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    fn consume_contextual(&mut self, word: &str, message: &str) -> Result<Token, Diagnostic> {
        if self.peek_token().is_identifier(word) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek_token(), message))
        }
    }

    fn consume_property_name(&mut self, message: &str) -> Result<String, Diagnostic> {
        match self.peek_token().kind {
            TokenKind::Identifier | TokenKind::Keyword(_) => Ok(self.advance().lexeme),
            _ => Err(self.error(self.peek_token(), message)),
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    /// The token stream always ends with `Eof`, so this never runs dry.
    fn peek_token(&self) -> &Token {
        self.peek()
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        if token.kind == TokenKind::Eof {
            return self.error_eof(message);
        }
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(token.span)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        let end = self.source.len();
        Diagnostic::new(DiagnosticKind::Parser, message.to_string())
            .with_span(SourceSpan::new(end, end))
            .with_note("reached end of input")
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn parse_number(lexeme: &str) -> Option<f64> {
    let cleaned = lexeme.replace('_', "");
    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    cleaned.parse().ok()
}
