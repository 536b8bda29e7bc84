//! Recursive-descent parser.
//!
//! One token of state plus lexer snapshots for the bounded lookahead
//! arrow functions need. Semicolon insertion follows the practical
//! rule: a statement may end at `}`, end of input, or a line break.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse a source string as a script.
pub fn parse_script(source: &str) -> Result<Program, ParseError> {
    let mut p = Parser::new(source, false)?;
    p.parse_program()
}

/// Parse a source string as a module.
pub fn parse_module(source: &str) -> Result<Program, ParseError> {
    let mut p = Parser::new(source, true)?;
    p.allow_await = true;
    p.parse_program()
}

struct Parser {
    lexer: Lexer,
    cur: Token,
    is_module: bool,
    allow_yield: bool,
    allow_await: bool,
}

impl Parser {
    fn new(source: &str, is_module: bool) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let cur = lexer.next_token()?;
        Ok(Self {
            lexer,
            cur,
            is_module,
            allow_yield: false,
            allow_await: false,
        })
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.cur, next))
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, ParseError> {
        if &self.cur.kind == kind {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if &self.cur.kind == kind {
            self.bump()
        } else {
            Err(self.unexpected(&format!("expected {:?}", kind)))
        }
    }

    fn unexpected(&self, context: &str) -> ParseError {
        ParseError::new(
            format!("{}, found {:?}", context, self.cur.kind),
            self.cur.line,
            self.cur.column,
        )
    }

    fn snapshot(&self) -> (Lexer, Token) {
        (self.lexer.clone(), self.cur.clone())
    }

    fn restore(&mut self, state: (Lexer, Token)) {
        self.lexer = state.0;
        self.cur = state.1;
    }

    /// Identifier-like token usable as a name: identifiers plus the
    /// contextual keywords.
    fn ident_name(&self) -> Option<String> {
        match &self.cur.kind {
            TokenKind::Ident(n) => Some(n.clone()),
            TokenKind::Of => Some("of".into()),
            TokenKind::As => Some("as".into()),
            TokenKind::From => Some("from".into()),
            TokenKind::Get => Some("get".into()),
            TokenKind::Set => Some("set".into()),
            TokenKind::Static => Some("static".into()),
            TokenKind::Async => Some("async".into()),
            TokenKind::Let => Some("let".into()),
            TokenKind::Yield if !self.allow_yield => Some("yield".into()),
            TokenKind::Await if !self.allow_await => Some("await".into()),
            _ => None,
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.ident_name() {
            Some(n) => {
                self.bump()?;
                Ok(n)
            }
            None => Err(self.unexpected("expected identifier")),
        }
    }

    fn consume_semi(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semi)? {
            return Ok(());
        }
        if matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) || self.cur.newline_before {
            return Ok(());
        }
        Err(self.unexpected("expected ';'"))
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while self.cur.kind != TokenKind::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(Program {
            body,
            is_module: self.is_module,
        })
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.cur.line;
        match &self.cur.kind {
            TokenKind::LBrace => {
                self.bump()?;
                let body = self.parse_block_body()?;
                Ok(Stmt::Block(body))
            }
            TokenKind::Semi => {
                self.bump()?;
                Ok(Stmt::Empty)
            }
            TokenKind::Var | TokenKind::Const => self.parse_var_statement(),
            TokenKind::Let => {
                // `let` is only a declaration when a binding follows
                let state = self.snapshot();
                self.bump()?;
                if self.ident_name().is_some()
                    || matches!(self.cur.kind, TokenKind::LBracket | TokenKind::LBrace)
                {
                    self.restore(state);
                    self.parse_var_statement()
                } else {
                    self.restore(state);
                    self.parse_expression_statement(line)
                }
            }
            TokenKind::Function => {
                self.bump()?;
                let is_generator = self.eat(&TokenKind::Star)?;
                let name = self.expect_ident()?;
                let func = self.parse_function_rest(Some(name.clone()), false, is_generator, line)?;
                Ok(Stmt::FunctionDecl { name, func })
            }
            TokenKind::Async if self.async_function_follows() => {
                self.bump()?; // async
                self.bump()?; // function
                let is_generator = self.eat(&TokenKind::Star)?;
                let name = self.expect_ident()?;
                let func = self.parse_function_rest(Some(name.clone()), true, is_generator, line)?;
                Ok(Stmt::FunctionDecl { name, func })
            }
            TokenKind::Class => {
                self.bump()?;
                let name = self.expect_ident()?;
                let class = self.parse_class_rest(Some(name.clone()))?;
                Ok(Stmt::ClassDecl { name, class })
            }
            TokenKind::Return => {
                self.bump()?;
                let arg = if matches!(self.cur.kind, TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof)
                    || self.cur.newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semi()?;
                Ok(Stmt::Return { arg, line })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.bump()?;
                self.expect(&TokenKind::LParen)?;
                let test = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            TokenKind::Do => {
                self.bump()?;
                let body = Box::new(self.parse_statement()?);
                self.expect(&TokenKind::While)?;
                self.expect(&TokenKind::LParen)?;
                let test = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                self.eat(&TokenKind::Semi)?;
                Ok(Stmt::DoWhile { body, test })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.bump()?;
                let label = if !self.cur.newline_before {
                    self.ident_name().map(|n| {
                        let _ = self.bump();
                        n
                    })
                } else {
                    None
                };
                self.consume_semi()?;
                Ok(Stmt::Break { label })
            }
            TokenKind::Continue => {
                self.bump()?;
                let label = if !self.cur.newline_before {
                    self.ident_name().map(|n| {
                        let _ = self.bump();
                        n
                    })
                } else {
                    None
                };
                self.consume_semi()?;
                Ok(Stmt::Continue { label })
            }
            TokenKind::Throw => {
                self.bump()?;
                if self.cur.newline_before {
                    return Err(self.unexpected("newline not allowed after 'throw'"));
                }
                let arg = self.parse_expression()?;
                self.consume_semi()?;
                Ok(Stmt::Throw { arg, line })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Debugger => {
                self.bump()?;
                self.consume_semi()?;
                Ok(Stmt::Debugger)
            }
            TokenKind::Import if self.is_module => self.parse_import(),
            TokenKind::Export if self.is_module => self.parse_export(),
            _ => {
                // labelled statement?
                if let Some(name) = self.ident_name() {
                    let state = self.snapshot();
                    self.bump()?;
                    if self.eat(&TokenKind::Colon)? {
                        let body = Box::new(self.parse_statement()?);
                        return Ok(Stmt::Labeled { label: name, body });
                    }
                    self.restore(state);
                }
                self.parse_expression_statement(line)
            }
        }
    }

    fn async_function_follows(&self) -> bool {
        // `async` directly followed by `function` on the same line
        let mut lexer = self.lexer.clone();
        match lexer.next_token() {
            Ok(tok) => tok.kind == TokenKind::Function && !tok.newline_before,
            Err(_) => false,
        }
    }

    fn parse_expression_statement(&mut self, line: u32) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        self.consume_semi()?;
        Ok(Stmt::Expr { expr, line })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        while !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn decl_kind(&mut self) -> Result<DeclKind, ParseError> {
        let kind = match self.cur.kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            _ => return Err(self.unexpected("expected declaration keyword")),
        };
        self.bump()?;
        Ok(kind)
    }

    fn parse_var_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.cur.line;
        let kind = self.decl_kind()?;
        let decls = self.parse_declarator_list()?;
        self.consume_semi()?;
        Ok(Stmt::VarDecl { kind, decls, line })
    }

    fn parse_declarator_list(&mut self) -> Result<Vec<Declarator>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let pattern = self.parse_pattern()?;
            let init = if self.eat(&TokenKind::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(Declarator { pattern, init });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        let is_await = self.allow_await && self.eat(&TokenKind::Await)?;
        self.expect(&TokenKind::LParen)?;

        // empty initializer
        if self.eat(&TokenKind::Semi)? {
            return self.parse_for_rest(None);
        }

        if matches!(
            self.cur.kind,
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let kind = self.decl_kind()?;
            let pattern = self.parse_pattern()?;
            match &self.cur.kind {
                TokenKind::In => {
                    self.bump()?;
                    let right = self.parse_expression()?;
                    self.expect(&TokenKind::RParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::ForIn {
                        left: ForTarget::Decl { kind, pattern },
                        right,
                        body,
                    });
                }
                TokenKind::Of => {
                    self.bump()?;
                    let right = self.parse_assignment()?;
                    self.expect(&TokenKind::RParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::ForOf {
                        left: ForTarget::Decl { kind, pattern },
                        right,
                        body,
                        is_await,
                    });
                }
                _ => {
                    // plain declaration initializer
                    let init = if self.eat(&TokenKind::Assign)? {
                        Some(self.parse_assignment()?)
                    } else {
                        None
                    };
                    let mut decls = vec![Declarator { pattern, init }];
                    while self.eat(&TokenKind::Comma)? {
                        let pattern = self.parse_pattern()?;
                        let init = if self.eat(&TokenKind::Assign)? {
                            Some(self.parse_assignment()?)
                        } else {
                            None
                        };
                        decls.push(Declarator { pattern, init });
                    }
                    self.expect(&TokenKind::Semi)?;
                    return self.parse_for_rest(Some(ForInit::VarDecl { kind, decls }));
                }
            }
        }

        // expression initializer or for-in/of over an existing target
        let expr = self.parse_expression_no_in()?;
        match &self.cur.kind {
            TokenKind::In => {
                self.bump()?;
                let target = self.expr_to_target(expr)?;
                let right = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::ForIn {
                    left: ForTarget::Assign(target),
                    right,
                    body,
                })
            }
            TokenKind::Of => {
                self.bump()?;
                let target = self.expr_to_target(expr)?;
                let right = self.parse_assignment()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::ForOf {
                    left: ForTarget::Assign(target),
                    right,
                    body,
                    is_await,
                })
            }
            _ => {
                self.expect(&TokenKind::Semi)?;
                self.parse_for_rest(Some(ForInit::Expr(expr)))
            }
        }
    }

    fn parse_for_rest(&mut self, init: Option<ForInit>) -> Result<Stmt, ParseError> {
        let test = if self.cur.kind != TokenKind::Semi {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semi)?;
        let update = if self.cur.kind != TokenKind::RParen {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        self.expect(&TokenKind::LBrace)?;
        let block = self.parse_block_body()?;
        let handler = if self.eat(&TokenKind::Catch)? {
            let param = if self.eat(&TokenKind::LParen)? {
                let p = self.parse_pattern()?;
                self.expect(&TokenKind::RParen)?;
                Some(p)
            } else {
                None
            };
            self.expect(&TokenKind::LBrace)?;
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Finally)? {
            self.expect(&TokenKind::LBrace)?;
            Some(self.parse_block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("expected 'catch' or 'finally'"));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        self.expect(&TokenKind::LParen)?;
        let disc = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;
        let mut cases = Vec::new();
        while !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
            let test = if self.eat(&TokenKind::Case)? {
                let t = self.parse_expression()?;
                Some(t)
            } else {
                self.expect(&TokenKind::Default)?;
                None
            };
            self.expect(&TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.cur.kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Stmt::Switch { disc, cases })
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        let mut entries = Vec::new();
        if let TokenKind::Str(spec) = &self.cur.kind {
            // side-effect import
            let specifier = spec.clone();
            self.bump()?;
            self.consume_semi()?;
            return Ok(Stmt::Import {
                entries,
                specifier,
            });
        }
        if self.cur.kind == TokenKind::Star {
            self.bump()?;
            self.expect(&TokenKind::As)?;
            let local = self.expect_ident()?;
            entries.push(("*".to_string(), local));
        } else {
            if let Some(default_local) = self.ident_name() {
                self.bump()?;
                entries.push(("default".to_string(), default_local));
                if self.eat(&TokenKind::Comma)? && self.cur.kind != TokenKind::LBrace {
                    return Err(self.unexpected("expected '{' after ','"));
                }
            }
            if self.cur.kind == TokenKind::LBrace {
                self.bump()?;
                while self.cur.kind != TokenKind::RBrace {
                    let imported = self.expect_ident()?;
                    let local = if self.eat(&TokenKind::As)? {
                        self.expect_ident()?
                    } else {
                        imported.clone()
                    };
                    entries.push((imported, local));
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
            }
        }
        self.expect(&TokenKind::From)?;
        let specifier = match &self.cur.kind {
            TokenKind::Str(s) => s.clone(),
            _ => return Err(self.unexpected("expected module specifier string")),
        };
        self.bump()?;
        self.consume_semi()?;
        Ok(Stmt::Import { entries, specifier })
    }

    fn parse_export(&mut self) -> Result<Stmt, ParseError> {
        self.bump()?;
        match &self.cur.kind {
            TokenKind::Default => {
                self.bump()?;
                let expr = self.parse_assignment()?;
                self.consume_semi()?;
                Ok(Stmt::ExportDefault(expr))
            }
            TokenKind::LBrace => {
                self.bump()?;
                let mut specifiers = Vec::new();
                while self.cur.kind != TokenKind::RBrace {
                    let local = self.expect_ident()?;
                    let exported = if self.eat(&TokenKind::As)? {
                        self.expect_ident()?
                    } else {
                        local.clone()
                    };
                    specifiers.push((local, exported));
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                self.consume_semi()?;
                Ok(Stmt::ExportNamed(specifiers))
            }
            _ => {
                let decl = self.parse_statement()?;
                match &decl {
                    Stmt::VarDecl { .. } | Stmt::FunctionDecl { .. } | Stmt::ClassDecl { .. } => {
                        Ok(Stmt::ExportDecl(Box::new(decl)))
                    }
                    _ => Err(self.unexpected("expected declaration after 'export'")),
                }
            }
        }
    }

    // ---- patterns ----

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match &self.cur.kind {
            TokenKind::LBracket => self.parse_array_pattern(),
            TokenKind::LBrace => self.parse_object_pattern(),
            _ => Ok(Pattern::Ident(self.expect_ident()?)),
        }
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, ParseError> {
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        let mut rest = None;
        while self.cur.kind != TokenKind::RBracket {
            if self.eat(&TokenKind::Comma)? {
                elements.push(None);
                continue;
            }
            if self.eat(&TokenKind::DotDotDot)? {
                rest = Some(Box::new(self.parse_pattern()?));
                break;
            }
            let pattern = self.parse_pattern()?;
            let default = if self.eat(&TokenKind::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            elements.push(Some(ArrayPatternElem { pattern, default }));
            if self.cur.kind != TokenKind::RBracket {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Pattern::Array { elements, rest })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        let mut rest = None;
        while self.cur.kind != TokenKind::RBrace {
            if self.eat(&TokenKind::DotDotDot)? {
                rest = Some(Box::new(self.parse_pattern()?));
                break;
            }
            let key = self.parse_prop_key()?;
            let (value, default) = if self.eat(&TokenKind::Colon)? {
                let v = self.parse_pattern()?;
                let d = if self.eat(&TokenKind::Assign)? {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                (v, d)
            } else {
                // shorthand
                let name = match &key {
                    PropKey::Ident(n) => n.clone(),
                    _ => return Err(self.unexpected("expected ':' in object pattern")),
                };
                let d = if self.eat(&TokenKind::Assign)? {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                (Pattern::Ident(name), d)
            };
            props.push(ObjectPatternProp {
                key,
                value,
                default,
            });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Pattern::Object { props, rest })
    }

    fn parse_prop_key(&mut self) -> Result<PropKey, ParseError> {
        match &self.cur.kind {
            TokenKind::Str(s) => {
                let key = PropKey::Str(s.clone());
                self.bump()?;
                Ok(key)
            }
            TokenKind::Number(n) => {
                let key = PropKey::Num(*n);
                self.bump()?;
                Ok(key)
            }
            TokenKind::LBracket => {
                self.bump()?;
                let e = self.parse_assignment()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(PropKey::Computed(Box::new(e)))
            }
            TokenKind::PrivateIdent(n) => {
                let key = PropKey::Private(n.clone());
                self.bump()?;
                Ok(key)
            }
            _ => {
                // any keyword works as a literal property name
                let name = match &self.cur.kind {
                    TokenKind::Ident(n) => n.clone(),
                    k => keyword_text(k)
                        .ok_or_else(|| self.unexpected("expected property name"))?
                        .to_string(),
                };
                self.bump()?;
                Ok(PropKey::Ident(name))
            }
        }
    }

    // ---- functions and classes ----

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.cur.kind != TokenKind::RParen {
            let rest = self.eat(&TokenKind::DotDotDot)?;
            let pattern = self.parse_pattern()?;
            let default = if !rest && self.eat(&TokenKind::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest,
            });
            if rest {
                break;
            }
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        is_async: bool,
        is_generator: bool,
        line: u32,
    ) -> Result<FunctionExpr, ParseError> {
        let params = self.parse_params()?;
        let saved = (self.allow_yield, self.allow_await);
        self.allow_yield = is_generator;
        self.allow_await = is_async;
        self.expect(&TokenKind::LBrace)?;
        let body = self.parse_block_body()?;
        self.allow_yield = saved.0;
        self.allow_await = saved.1;
        Ok(FunctionExpr {
            name,
            params,
            body,
            is_arrow: false,
            is_async,
            is_generator,
            line,
        })
    }

    fn parse_class_rest(&mut self, name: Option<String>) -> Result<ClassExpr, ParseError> {
        let superclass = if self.eat(&TokenKind::Extends)? {
            Some(Box::new(self.parse_unary()?))
        } else {
            None
        };
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !matches!(self.cur.kind, TokenKind::RBrace | TokenKind::Eof) {
            if self.eat(&TokenKind::Semi)? {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(ClassExpr {
            name,
            superclass,
            members,
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, ParseError> {
        let line = self.cur.line;
        let mut is_static = false;
        if self.cur.kind == TokenKind::Static {
            let state = self.snapshot();
            self.bump()?;
            if matches!(self.cur.kind, TokenKind::Assign | TokenKind::LParen | TokenKind::Semi) {
                self.restore(state); // a member actually named "static"
            } else {
                is_static = true;
            }
        }

        let mut is_async = false;
        let mut is_generator = false;
        let mut accessor: Option<MethodKind> = None;

        if self.cur.kind == TokenKind::Async {
            let state = self.snapshot();
            self.bump()?;
            if matches!(self.cur.kind, TokenKind::Assign | TokenKind::LParen | TokenKind::Semi) {
                self.restore(state);
            } else {
                is_async = true;
            }
        }
        if self.eat(&TokenKind::Star)? {
            is_generator = true;
        }
        if matches!(self.cur.kind, TokenKind::Get | TokenKind::Set) && accessor.is_none() {
            let state = self.snapshot();
            let is_get = self.cur.kind == TokenKind::Get;
            self.bump()?;
            if matches!(self.cur.kind, TokenKind::Assign | TokenKind::LParen | TokenKind::Semi) {
                self.restore(state);
            } else {
                accessor = Some(if is_get { MethodKind::Get } else { MethodKind::Set });
            }
        }

        let key = self.parse_prop_key()?;

        if self.cur.kind == TokenKind::LParen {
            let func = self.parse_function_rest(prop_key_name(&key), is_async, is_generator, line)?;
            let is_constructor = !is_static
                && accessor.is_none()
                && matches!(&key, PropKey::Ident(n) if n == "constructor");
            let kind = if is_constructor {
                ClassMemberKind::Constructor(func)
            } else {
                ClassMemberKind::Method {
                    kind: accessor.unwrap_or(MethodKind::Method),
                    func,
                }
            };
            return Ok(ClassMember {
                kind,
                is_static,
                key,
            });
        }

        // field
        let value = if self.eat(&TokenKind::Assign)? {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.consume_semi()?;
        Ok(ClassMember {
            kind: ClassMemberKind::Field(value),
            is_static,
            key,
        })
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_expression_impl(true)
    }

    fn parse_expression_no_in(&mut self) -> Result<Expr, ParseError> {
        self.parse_expression_impl(false)
    }

    fn parse_expression_impl(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let first = self.parse_assignment_impl(allow_in)?;
        if self.cur.kind != TokenKind::Comma {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma)? {
            exprs.push(self.parse_assignment_impl(allow_in)?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment_impl(true)
    }

    fn parse_assignment_impl(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        // yield expression
        if self.allow_yield && self.cur.kind == TokenKind::Yield {
            self.bump()?;
            let delegate = self.eat(&TokenKind::Star)?;
            let arg = if self.cur.newline_before
                || matches!(
                    self.cur.kind,
                    TokenKind::Semi
                        | TokenKind::RParen
                        | TokenKind::RBrace
                        | TokenKind::RBracket
                        | TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::Eof
                ) {
                None
            } else {
                Some(Box::new(self.parse_assignment_impl(allow_in)?))
            };
            return Ok(Expr::Yield { arg, delegate });
        }

        // arrow functions need lookahead
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let lhs = self.parse_conditional(allow_in)?;

        let op = match &self.cur.kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Binary(BinaryOp::Add)),
            TokenKind::MinusAssign => Some(AssignOp::Binary(BinaryOp::Sub)),
            TokenKind::StarAssign => Some(AssignOp::Binary(BinaryOp::Mul)),
            TokenKind::SlashAssign => Some(AssignOp::Binary(BinaryOp::Div)),
            TokenKind::PercentAssign => Some(AssignOp::Binary(BinaryOp::Mod)),
            TokenKind::StarStarAssign => Some(AssignOp::Binary(BinaryOp::Exp)),
            TokenKind::AmpAssign => Some(AssignOp::Binary(BinaryOp::BitAnd)),
            TokenKind::PipeAssign => Some(AssignOp::Binary(BinaryOp::BitOr)),
            TokenKind::CaretAssign => Some(AssignOp::Binary(BinaryOp::BitXor)),
            TokenKind::ShlAssign => Some(AssignOp::Binary(BinaryOp::Shl)),
            TokenKind::ShrAssign => Some(AssignOp::Binary(BinaryOp::Shr)),
            TokenKind::UShrAssign => Some(AssignOp::Binary(BinaryOp::UShr)),
            TokenKind::AndAssign => Some(AssignOp::And),
            TokenKind::OrAssign => Some(AssignOp::Or),
            TokenKind::NullishAssign => Some(AssignOp::Nullish),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.bump()?;
        let target = self.expr_to_target(lhs)?;
        let value = self.parse_assignment_impl(allow_in)?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let line = self.cur.line;
        let mut is_async = false;
        let state = self.snapshot();

        if self.cur.kind == TokenKind::Async {
            let peek = self.snapshot();
            self.bump()?;
            if self.cur.newline_before {
                self.restore(peek);
            } else if self.ident_name().is_some() || self.cur.kind == TokenKind::LParen {
                is_async = true;
            } else {
                self.restore(peek);
            }
        }

        // single-identifier arrow
        if let Some(name) = self.ident_name() {
            let peek = self.snapshot();
            self.bump()?;
            if self.cur.kind == TokenKind::Arrow && !self.cur.newline_before {
                self.bump()?;
                let params = vec![Param {
                    pattern: Pattern::Ident(name),
                    default: None,
                    rest: false,
                }];
                return Ok(Some(self.finish_arrow(params, is_async, line)?));
            }
            self.restore(peek);
            if is_async {
                self.restore(state);
            }
            return Ok(None);
        }

        // parenthesized parameter list
        if self.cur.kind == TokenKind::LParen {
            let attempt = self.snapshot();
            match self.parse_params() {
                Ok(params) if self.cur.kind == TokenKind::Arrow && !self.cur.newline_before => {
                    self.bump()?;
                    return Ok(Some(self.finish_arrow(params, is_async, line)?));
                }
                _ => {
                    self.restore(attempt);
                    if is_async {
                        self.restore(state);
                    }
                    return Ok(None);
                }
            }
        }

        if is_async {
            self.restore(state);
        }
        Ok(None)
    }

    fn finish_arrow(
        &mut self,
        params: Vec<Param>,
        is_async: bool,
        line: u32,
    ) -> Result<Expr, ParseError> {
        let saved = (self.allow_yield, self.allow_await);
        self.allow_yield = false;
        self.allow_await = is_async;
        let body = if self.cur.kind == TokenKind::LBrace {
            self.bump()?;
            self.parse_block_body()?
        } else {
            let expr = self.parse_assignment()?;
            vec![Stmt::Return {
                arg: Some(expr),
                line,
            }]
        };
        self.allow_yield = saved.0;
        self.allow_await = saved.1;
        Ok(Expr::Function(Box::new(FunctionExpr {
            name: None,
            params,
            body,
            is_arrow: true,
            is_async,
            is_generator: false,
            line,
        })))
    }

    fn parse_conditional(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let test = self.parse_nullish(allow_in)?;
        if !self.eat(&TokenKind::Question)? {
            return Ok(test);
        }
        let cons = self.parse_assignment()?;
        self.expect(&TokenKind::Colon)?;
        let alt = self.parse_assignment_impl(allow_in)?;
        Ok(Expr::Cond {
            test: Box::new(test),
            cons: Box::new(cons),
            alt: Box::new(alt),
        })
    }

    fn parse_nullish(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_or(allow_in)?;
        while self.eat(&TokenKind::QuestionQuestion)? {
            let right = self.parse_logical_or(allow_in)?;
            left = Expr::Logical {
                op: LogicalOp::Nullish,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and(allow_in)?;
        while self.eat(&TokenKind::OrOr)? {
            let right = self.parse_logical_and(allow_in)?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_or(allow_in)?;
        while self.eat(&TokenKind::AndAnd)? {
            let right = self.parse_bit_or(allow_in)?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_xor(allow_in)?;
        while self.cur.kind == TokenKind::Pipe {
            self.bump()?;
            let right = self.parse_bit_xor(allow_in)?;
            left = binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn parse_bit_xor(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_and(allow_in)?;
        while self.cur.kind == TokenKind::Caret {
            self.bump()?;
            let right = self.parse_bit_and(allow_in)?;
            left = binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality(allow_in)?;
        while self.cur.kind == TokenKind::Amp {
            self.bump()?;
            let right = self.parse_equality(allow_in)?;
            left = binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational(allow_in)?;
        loop {
            let op = match self.cur.kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::EqEqEq => BinaryOp::StrictEq,
                TokenKind::NotEqEq => BinaryOp::StrictNe,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_relational(allow_in)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self, allow_in: bool) -> Result<Expr, ParseError> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Instanceof => BinaryOp::InstanceOf,
                TokenKind::In if allow_in => BinaryOp::In,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_shift()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                TokenKind::UShr => BinaryOp::UShr,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_exponent()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_exponent(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_unary()?;
        if self.cur.kind == TokenKind::StarStar {
            self.bump()?;
            // right-associative
            let right = self.parse_exponent()?;
            return Ok(binary(BinaryOp::Exp, left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.cur.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::TypeOf),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let arg = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }
        if self.allow_await && self.cur.kind == TokenKind::Await {
            self.bump()?;
            let arg = self.parse_unary()?;
            return Ok(Expr::Await(Box::new(arg)));
        }
        if matches!(self.cur.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let delta = if self.cur.kind == TokenKind::PlusPlus { 1 } else { -1 };
            self.bump()?;
            let arg = self.parse_unary()?;
            let target = self.expr_to_target(arg)?;
            return Ok(Expr::Update {
                delta,
                prefix: true,
                target: Box::new(target),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_chain()?;
        if matches!(self.cur.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
            && !self.cur.newline_before
        {
            let delta = if self.cur.kind == TokenKind::PlusPlus { 1 } else { -1 };
            self.bump()?;
            let target = self.expr_to_target(expr)?;
            return Ok(Expr::Update {
                delta,
                prefix: false,
                target: Box::new(target),
            });
        }
        Ok(expr)
    }

    fn parse_call_chain(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.cur.kind == TokenKind::New {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match &self.cur.kind {
                TokenKind::Dot => {
                    self.bump()?;
                    let prop = self.parse_member_prop()?;
                    expr = Expr::Member {
                        obj: Box::new(expr),
                        prop,
                    };
                }
                TokenKind::LBracket => {
                    self.bump()?;
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Member {
                        obj: Box::new(expr),
                        prop: MemberProp::Computed(Box::new(key)),
                    };
                }
                TokenKind::LParen => {
                    let line = self.cur.line;
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_member_prop(&mut self) -> Result<MemberProp, ParseError> {
        match &self.cur.kind {
            TokenKind::PrivateIdent(n) => {
                let p = MemberProp::Private(n.clone());
                self.bump()?;
                Ok(p)
            }
            TokenKind::Ident(n) => {
                let p = MemberProp::Ident(n.clone());
                self.bump()?;
                Ok(p)
            }
            k => {
                let name = keyword_text(k)
                    .ok_or_else(|| self.unexpected("expected property name"))?
                    .to_string();
                self.bump()?;
                Ok(MemberProp::Ident(name))
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        self.bump()?; // new
        if self.cur.kind == TokenKind::Dot {
            // new.target
            self.bump()?;
            let prop = self.expect_ident()?;
            if prop != "target" {
                return Err(self.unexpected("expected 'new.target'"));
            }
            return Ok(Expr::Ident("new.target".to_string()));
        }
        let mut callee = if self.cur.kind == TokenKind::New {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        // member accesses bind tighter than the argument list
        loop {
            match &self.cur.kind {
                TokenKind::Dot => {
                    self.bump()?;
                    let prop = self.parse_member_prop()?;
                    callee = Expr::Member {
                        obj: Box::new(callee),
                        prop,
                    };
                }
                TokenKind::LBracket => {
                    self.bump()?;
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    callee = Expr::Member {
                        obj: Box::new(callee),
                        prop: MemberProp::Computed(Box::new(key)),
                    };
                }
                _ => break,
            }
        }
        let args = if self.cur.kind == TokenKind::LParen {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_args(&mut self) -> Result<Vec<CallArg>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.cur.kind != TokenKind::RParen {
            if self.eat(&TokenKind::DotDotDot)? {
                args.push(CallArg::Spread(self.parse_assignment()?));
            } else {
                args.push(CallArg::Normal(self.parse_assignment()?));
            }
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.cur.line;
        match self.cur.kind.clone() {
            TokenKind::Number(n) => {
                self.bump()?;
                Ok(Expr::Number(n))
            }
            TokenKind::BigIntLit(b) => {
                self.bump()?;
                Ok(Expr::BigIntLit(b))
            }
            TokenKind::Str(s) => {
                self.bump()?;
                Ok(Expr::Str(s))
            }
            TokenKind::Template { quasis, exprs } => {
                self.bump()?;
                let mut parsed = Vec::with_capacity(exprs.len());
                for src in &exprs {
                    parsed.push(self.parse_embedded_expression(src)?);
                }
                Ok(Expr::Template {
                    quasis,
                    exprs: parsed,
                })
            }
            TokenKind::True => {
                self.bump()?;
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.bump()?;
                Ok(Expr::Bool(false))
            }
            TokenKind::Null => {
                self.bump()?;
                Ok(Expr::Null)
            }
            TokenKind::This => {
                self.bump()?;
                Ok(Expr::This)
            }
            TokenKind::Super => {
                self.bump()?;
                match &self.cur.kind {
                    TokenKind::LParen => {
                        let args = self.parse_args()?;
                        Ok(Expr::SuperCall(args))
                    }
                    TokenKind::Dot => {
                        self.bump()?;
                        let prop = self.parse_member_prop()?;
                        Ok(Expr::SuperMember(prop))
                    }
                    TokenKind::LBracket => {
                        self.bump()?;
                        let key = self.parse_expression()?;
                        self.expect(&TokenKind::RBracket)?;
                        Ok(Expr::SuperMember(MemberProp::Computed(Box::new(key))))
                    }
                    _ => Err(self.unexpected("expected 'super()' or 'super.prop'")),
                }
            }
            TokenKind::LParen => {
                self.bump()?;
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                self.bump()?;
                let is_generator = self.eat(&TokenKind::Star)?;
                let name = self.ident_name().map(|n| {
                    let _ = self.bump();
                    n
                });
                let func = self.parse_function_rest(name, false, is_generator, line)?;
                Ok(Expr::Function(Box::new(func)))
            }
            TokenKind::Async if self.async_function_follows() => {
                self.bump()?;
                self.bump()?;
                let is_generator = self.eat(&TokenKind::Star)?;
                let name = self.ident_name().map(|n| {
                    let _ = self.bump();
                    n
                });
                let func = self.parse_function_rest(name, true, is_generator, line)?;
                Ok(Expr::Function(Box::new(func)))
            }
            TokenKind::Class => {
                self.bump()?;
                let name = self.ident_name().map(|n| {
                    let _ = self.bump();
                    n
                });
                let class = self.parse_class_rest(name)?;
                Ok(Expr::Class(Box::new(class)))
            }
            _ => {
                if let Some(name) = self.ident_name() {
                    self.bump()?;
                    return Ok(Expr::Ident(name));
                }
                Err(self.unexpected("expected expression"))
            }
        }
    }

    fn parse_embedded_expression(&mut self, source: &str) -> Result<Expr, ParseError> {
        let mut sub = Parser::new(source, false)?;
        sub.allow_yield = self.allow_yield;
        sub.allow_await = self.allow_await;
        let expr = sub.parse_expression()?;
        if sub.cur.kind != TokenKind::Eof {
            return Err(ParseError::new(
                "unexpected trailing tokens in template substitution",
                sub.cur.line,
                sub.cur.column,
            ));
        }
        Ok(expr)
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while self.cur.kind != TokenKind::RBracket {
            if self.eat(&TokenKind::Comma)? {
                elements.push(ArrayLitElem::Hole);
                continue;
            }
            if self.eat(&TokenKind::DotDotDot)? {
                elements.push(ArrayLitElem::Spread(self.parse_assignment()?));
            } else {
                elements.push(ArrayLitElem::Item(self.parse_assignment()?));
            }
            if self.cur.kind != TokenKind::RBracket {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::Array(elements))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        while self.cur.kind != TokenKind::RBrace {
            let line = self.cur.line;
            if self.eat(&TokenKind::DotDotDot)? {
                props.push(ObjectLitProp::Spread(self.parse_assignment()?));
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
                continue;
            }

            // getter/setter/async/generator method forms
            let mut accessor = None;
            let mut is_async = false;
            let mut is_generator = false;
            if matches!(self.cur.kind, TokenKind::Get | TokenKind::Set) {
                let state = self.snapshot();
                let is_get = self.cur.kind == TokenKind::Get;
                self.bump()?;
                if matches!(self.cur.kind, TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen) {
                    self.restore(state);
                } else {
                    accessor = Some(if is_get { MethodKind::Get } else { MethodKind::Set });
                }
            } else if self.cur.kind == TokenKind::Async {
                let state = self.snapshot();
                self.bump()?;
                if matches!(self.cur.kind, TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen) {
                    self.restore(state);
                } else {
                    is_async = true;
                }
            }
            if self.eat(&TokenKind::Star)? {
                is_generator = true;
            }

            let key = self.parse_prop_key()?;
            match &self.cur.kind {
                TokenKind::LParen => {
                    let func =
                        self.parse_function_rest(prop_key_name(&key), is_async, is_generator, line)?;
                    props.push(ObjectLitProp::Method {
                        key,
                        kind: accessor.unwrap_or(MethodKind::Method),
                        func,
                    });
                }
                TokenKind::Colon => {
                    self.bump()?;
                    let value = self.parse_assignment()?;
                    props.push(ObjectLitProp::KeyValue { key, value });
                }
                _ => {
                    let name = match &key {
                        PropKey::Ident(n) => n.clone(),
                        _ => return Err(self.unexpected("expected ':' after property key")),
                    };
                    props.push(ObjectLitProp::Shorthand(name));
                }
            }
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::Object(props))
    }

    // ---- target / pattern reinterpretation ----

    fn expr_to_target(&self, expr: Expr) -> Result<AssignTarget, ParseError> {
        match expr {
            Expr::Ident(name) => Ok(AssignTarget::Ident(name)),
            Expr::Member { obj, prop } => Ok(AssignTarget::Member { obj, prop }),
            Expr::Array(_) | Expr::Object(_) => {
                Ok(AssignTarget::Pattern(self.expr_to_pattern(expr)?))
            }
            _ => Err(ParseError::new(
                "invalid assignment target",
                self.cur.line,
                self.cur.column,
            )),
        }
    }

    fn expr_to_pattern(&self, expr: Expr) -> Result<Pattern, ParseError> {
        let err = || ParseError::new("invalid destructuring pattern", self.cur.line, self.cur.column);
        match expr {
            Expr::Ident(name) => Ok(Pattern::Ident(name)),
            Expr::Array(elements) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = elements.len();
                for (i, el) in elements.into_iter().enumerate() {
                    match el {
                        ArrayLitElem::Hole => out.push(None),
                        ArrayLitElem::Item(Expr::Assign {
                            op: AssignOp::Assign,
                            target,
                            value,
                        }) => {
                            let pattern = match *target {
                                AssignTarget::Ident(n) => Pattern::Ident(n),
                                AssignTarget::Pattern(p) => p,
                                AssignTarget::Member { .. } => return Err(err()),
                            };
                            out.push(Some(ArrayPatternElem {
                                pattern,
                                default: Some(*value),
                            }));
                        }
                        ArrayLitElem::Item(e) => out.push(Some(ArrayPatternElem {
                            pattern: self.expr_to_pattern(e)?,
                            default: None,
                        })),
                        ArrayLitElem::Spread(e) => {
                            if i + 1 != count {
                                return Err(err());
                            }
                            rest = Some(Box::new(self.expr_to_pattern(e)?));
                        }
                    }
                }
                Ok(Pattern::Array { elements: out, rest })
            }
            Expr::Object(props) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = props.len();
                for (i, p) in props.into_iter().enumerate() {
                    match p {
                        ObjectLitProp::Shorthand(name) => out.push(ObjectPatternProp {
                            key: PropKey::Ident(name.clone()),
                            value: Pattern::Ident(name),
                            default: None,
                        }),
                        ObjectLitProp::KeyValue { key, value } => {
                            let (value, default) = match value {
                                Expr::Assign {
                                    op: AssignOp::Assign,
                                    target,
                                    value,
                                } => {
                                    let pattern = match *target {
                                        AssignTarget::Ident(n) => Pattern::Ident(n),
                                        AssignTarget::Pattern(p) => p,
                                        AssignTarget::Member { .. } => return Err(err()),
                                    };
                                    (pattern, Some(*value))
                                }
                                other => (self.expr_to_pattern(other)?, None),
                            };
                            out.push(ObjectPatternProp {
                                key,
                                value,
                                default,
                            });
                        }
                        ObjectLitProp::Spread(e) => {
                            if i + 1 != count {
                                return Err(err());
                            }
                            rest = Some(Box::new(self.expr_to_pattern(e)?));
                        }
                        ObjectLitProp::Method { .. } => return Err(err()),
                    }
                }
                Ok(Pattern::Object { props: out, rest })
            }
            _ => Err(err()),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn prop_key_name(key: &PropKey) -> Option<String> {
    match key {
        PropKey::Ident(n) | PropKey::Str(n) => Some(n.clone()),
        _ => None,
    }
}

fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    use TokenKind::*;
    Some(match kind {
        Var => "var",
        Let => "let",
        Const => "const",
        Function => "function",
        Class => "class",
        Return => "return",
        If => "if",
        Else => "else",
        While => "while",
        Do => "do",
        For => "for",
        Break => "break",
        Continue => "continue",
        New => "new",
        Delete => "delete",
        Typeof => "typeof",
        Instanceof => "instanceof",
        In => "in",
        Of => "of",
        Void => "void",
        This => "this",
        Null => "null",
        True => "true",
        False => "false",
        Throw => "throw",
        Try => "try",
        Catch => "catch",
        Finally => "finally",
        Switch => "switch",
        Case => "case",
        Default => "default",
        Yield => "yield",
        Await => "await",
        Async => "async",
        Static => "static",
        Get => "get",
        Set => "set",
        Extends => "extends",
        Super => "super",
        Import => "import",
        Export => "export",
        From => "from",
        As => "as",
        Debugger => "debugger",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_script(src).unwrap_or_else(|e| panic!("parse failed for {:?}: {}", src, e))
    }

    #[test]
    fn test_variable_declarations() {
        let p = parse("let x = 1, y; const z = 2; var w = x + y;");
        assert_eq!(p.body.len(), 3);
        match &p.body[0] {
            Stmt::VarDecl { kind, decls, .. } => {
                assert_eq!(*kind, DeclKind::Let);
                assert_eq!(decls.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_loop_sum() {
        let p = parse("let s=0;for(let i=1;i<=100;i++)s+=i;s");
        assert_eq!(p.body.len(), 3);
        assert!(matches!(&p.body[1], Stmt::For { .. }));
    }

    #[test]
    fn test_generator_and_spread() {
        let p = parse("function*g(){yield 1;yield 2}let a=[...g()];a");
        match &p.body[0] {
            Stmt::FunctionDecl { func, .. } => assert!(func.is_generator),
            other => panic!("unexpected {:?}", other),
        }
        match &p.body[1] {
            Stmt::VarDecl { decls, .. } => match decls[0].init.as_ref().unwrap() {
                Expr::Array(elements) => {
                    assert!(matches!(elements[0], ArrayLitElem::Spread(_)))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_async_await() {
        let p = parse("async function f(){return await 41+1}");
        match &p.body[0] {
            Stmt::FunctionDecl { func, .. } => {
                assert!(func.is_async);
                match &func.body[0] {
                    Stmt::Return { arg: Some(e), .. } => {
                        // await binds tighter than +
                        assert!(matches!(e, Expr::Binary { op: BinaryOp::Add, .. }));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrow_functions() {
        parse("let f = x => x * 2;");
        parse("let g = (a, b = 1, ...rest) => { return a + b; };");
        parse("let h = async x => await x;");
        // not arrows
        parse("let k = (a + b) * 2;");
    }

    #[test]
    fn test_destructuring() {
        parse("let {a, b: [c, d = 2], ...rest} = obj;");
        parse("let [x, , y = 1, ...zs] = arr;");
        parse("[a, b] = [b, a];");
    }

    #[test]
    fn test_classes() {
        let p = parse(
            "class Counter extends Base { #n = 0; static kind = 'c'; constructor(start){ super(); this.#n = start; } get value(){ return this.#n; } inc(){ this.#n++; } }",
        );
        match &p.body[0] {
            Stmt::ClassDecl { class, .. } => {
                assert!(class.superclass.is_some());
                assert_eq!(class.members.len(), 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_try_catch_finally() {
        let p = parse("try{throw {x:7}}catch(e){e.x}finally{done()}");
        match &p.body[0] {
            Stmt::Try {
                handler, finalizer, ..
            } => {
                assert!(handler.is_some());
                assert!(finalizer.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_of_and_for_in() {
        parse("for (const x of xs) use(x);");
        parse("for (let k in obj) use(k);");
        parse("for (x of xs) {}");
    }

    #[test]
    fn test_template_literals() {
        let p = parse("let s = `a${x + 1}b`;");
        match &p.body[0] {
            Stmt::VarDecl { decls, .. } => {
                assert!(matches!(decls[0].init, Some(Expr::Template { .. })))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_asi() {
        let p = parse("let a = 1\nlet b = 2\na + b");
        assert_eq!(p.body.len(), 3);
    }

    #[test]
    fn test_switch() {
        parse("switch (x) { case 1: a(); break; default: b(); }");
    }

    #[test]
    fn test_labelled_break() {
        parse("outer: for(;;) { for(;;) { break outer; } }");
    }

    #[test]
    fn test_module_imports_exports() {
        let p = parse_module("import d, {a as b} from 'm'; export const x = 1; export default x;")
            .unwrap();
        assert!(matches!(&p.body[0], Stmt::Import { .. }));
        assert!(matches!(&p.body[1], Stmt::ExportDecl(_)));
        assert!(matches!(&p.body[2], Stmt::ExportDefault(_)));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse_script("let = 5;").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_new_expressions() {
        parse("new Map([[1,'a'],[2,'b']]);");
        parse("new a.b.C(1, 2);");
        parse("new C;");
    }

    #[test]
    fn test_object_literal_forms() {
        parse("let o = {a: 1, b, 'c': 2, 3: x, [k]: y, m(){}, get g(){return 1}, set s(v){}, ...spread};");
    }
}
