//! Recursive-descent parser producing the arena AST.
//!
//! Alongside the tree itself the parser performs the static checks Lua
//! does at compile time: assignment to `<const>` locals is rejected,
//! `break` outside a loop is rejected, and every `goto` must name a
//! label visible from its position. Function statements desugar to
//! assignments, method definitions get an implicit `self` parameter,
//! and `return f(x)` is flagged as a tail call when the call is the
//! whole return list.

use smol_str::SmolStr;
use std::rc::Rc;

use crate::env::VarAttrib;
use crate::limits;
use crate::syntax::ast::*;
use crate::syntax::lexer::{Lexer, Token};

pub struct SyntaxError {
    pub message: String,
    pub line: u32,
}

struct BlockScope {
    locals: Vec<(SmolStr, VarAttrib)>,
    labels: Vec<SmolStr>,
    /// Unresolved gotos seen in this block (name, line).
    gotos: Vec<(SmolStr, u32)>,
    is_loop: bool,
    is_function: bool,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    tok_line: u32,
    tok_start: usize,
    ahead: Option<(Token, u32, usize)>,
    chunk: Chunk,
    scopes: Vec<BlockScope>,
    depth: usize,
}

pub fn parse(source: &str, chunk_name: &str) -> Result<Chunk, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let (tok, tok_line) = lexer.next_token().map_err(|e| SyntaxError {
        message: e.message,
        line: e.line,
    })?;
    let tok_start = lexer.last_start;
    let mut parser = Parser {
        lexer,
        tok,
        tok_line,
        tok_start,
        ahead: None,
        chunk: Chunk {
            name: chunk_name.to_string(),
            source: Rc::from(source),
            exprs: Vec::new(),
            stats: Vec::new(),
            blocks: Vec::new(),
            protos: Vec::new(),
            main: 0,
        },
        scopes: Vec::new(),
        depth: 0,
    };
    parser.parse_main(source.len())?;
    Ok(parser.chunk)
}

impl<'a> Parser<'a> {
    fn parse_main(&mut self, source_len: usize) -> Result<(), SyntaxError> {
        self.open_scope(false, true);
        let body = self.block()?;
        self.close_scope()?;
        self.expect_token(Token::Eof)?;
        let main = self.chunk.protos.len() as ProtoId;
        self.chunk.protos.push(Proto {
            params: Vec::new(),
            is_vararg: true,
            body,
            name: SmolStr::new("main chunk"),
            line: 1,
            body_span: (0, source_len as u32),
        });
        self.chunk.main = main;
        Ok(())
    }

    // ===== token plumbing =====

    fn advance(&mut self) -> Result<(), SyntaxError> {
        if let Some((tok, line, start)) = self.ahead.take() {
            self.tok = tok;
            self.tok_line = line;
            self.tok_start = start;
            return Ok(());
        }
        let (tok, line) = self.lexer.next_token().map_err(|e| SyntaxError {
            message: e.message,
            line: e.line,
        })?;
        self.tok = tok;
        self.tok_line = line;
        self.tok_start = self.lexer.last_start;
        Ok(())
    }

    /// One token of lookahead past the current one.
    fn peek_ahead(&mut self) -> Result<&Token, SyntaxError> {
        if self.ahead.is_none() {
            let (tok, line) = self.lexer.next_token().map_err(|e| SyntaxError {
                message: e.message,
                line: e.line,
            })?;
            self.ahead = Some((tok, line, self.lexer.last_start));
        }
        Ok(&self.ahead.as_ref().unwrap().0)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: format!("{} near {}", message.into(), self.tok.describe()),
            line: self.tok_line,
        }
    }

    fn check(&self, tok: &Token) -> bool {
        self.tok == *tok
    }

    fn accept(&mut self, tok: &Token) -> Result<bool, SyntaxError> {
        if self.check(tok) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_token(&mut self, tok: Token) -> Result<(), SyntaxError> {
        if self.tok == tok {
            if self.tok != Token::Eof {
                self.advance()?;
            }
            Ok(())
        } else {
            Err(self.error(format!("{} expected", tok.describe())))
        }
    }

    fn expect_name(&mut self) -> Result<SmolStr, SyntaxError> {
        if let Token::Name(n) = &self.tok {
            let n = n.clone();
            self.advance()?;
            Ok(n)
        } else {
            Err(self.error("<name> expected"))
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > limits::MAX_PARSE_DEPTH {
            return Err(SyntaxError {
                message: "chunk has too many syntax levels".to_string(),
                line: self.tok_line,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ===== arena helpers =====

    fn add_expr(&mut self, kind: ExprKind, line: u32) -> ExprId {
        let id = self.chunk.exprs.len() as ExprId;
        self.chunk.exprs.push(Expr { kind, line });
        id
    }

    fn add_stat(&mut self, kind: StatKind, line: u32) -> StatId {
        let id = self.chunk.stats.len() as StatId;
        self.chunk.stats.push(Stat { kind, line });
        id
    }

    // ===== static scope tracking =====

    fn open_scope(&mut self, is_loop: bool, is_function: bool) {
        self.scopes.push(BlockScope {
            locals: Vec::new(),
            labels: Vec::new(),
            gotos: Vec::new(),
            is_loop,
            is_function,
        });
    }

    fn close_scope(&mut self) -> Result<(), SyntaxError> {
        let scope = self.scopes.pop().expect("scope underflow");
        let mut unresolved = Vec::new();
        for (name, line) in scope.gotos {
            if !scope.labels.iter().any(|l| *l == name) {
                unresolved.push((name, line));
            }
        }
        if let Some(parent) = self.scopes.last_mut() {
            if !scope.is_function {
                parent.gotos.extend(unresolved);
                return Ok(());
            }
        }
        if let Some((name, line)) = unresolved.into_iter().next() {
            return Err(SyntaxError {
                message: format!("no visible label '{}' for goto", name),
                line,
            });
        }
        Ok(())
    }

    fn declare_local(&mut self, name: SmolStr, attrib: VarAttrib) {
        self.scopes
            .last_mut()
            .expect("no open scope")
            .locals
            .push((name, attrib));
    }

    fn local_attrib(&self, name: &str) -> Option<VarAttrib> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, attrib)) = scope.locals.iter().rev().find(|(n, _)| n == name) {
                return Some(*attrib);
            }
        }
        None
    }

    fn inside_loop(&self) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.is_loop {
                return true;
            }
            if scope.is_function {
                return false;
            }
        }
        false
    }

    // ===== blocks and statements =====

    fn block_follows(&self) -> bool {
        matches!(
            self.tok,
            Token::End | Token::Else | Token::Elseif | Token::Until | Token::Eof
        )
    }

    fn block(&mut self) -> Result<BlockId, SyntaxError> {
        self.enter()?;
        let mut stats = Vec::new();
        let mut labels = Vec::new();
        loop {
            if self.block_follows() {
                break;
            }
            if self.check(&Token::Return) {
                stats.push(self.return_stat()?);
                break;
            }
            match &self.tok {
                Token::Semi => {
                    self.advance()?;
                }
                Token::DColon => {
                    let line = self.tok_line;
                    self.advance()?;
                    let name = self.expect_name()?;
                    self.expect_token(Token::DColon)?;
                    if labels.iter().any(|(n, _)| *n == name) {
                        return Err(SyntaxError {
                            message: format!("label '{}' already defined", name),
                            line,
                        });
                    }
                    labels.push((name.clone(), stats.len()));
                    self.scopes
                        .last_mut()
                        .expect("no open scope")
                        .labels
                        .push(name.clone());
                    stats.push(self.add_stat(StatKind::Label(name), line));
                }
                _ => stats.push(self.statement()?),
            }
        }
        self.leave();
        let id = self.chunk.blocks.len() as BlockId;
        self.chunk.blocks.push(Block { stats, labels });
        Ok(id)
    }

    /// A block in its own scope (plain `do` bodies, control bodies).
    fn scoped_block(&mut self, is_loop: bool) -> Result<BlockId, SyntaxError> {
        self.open_scope(is_loop, false);
        let body = self.block()?;
        self.close_scope()?;
        Ok(body)
    }

    fn statement(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        match &self.tok {
            Token::If => self.if_stat(),
            Token::While => {
                self.advance()?;
                let cond = self.expr()?;
                self.expect_token(Token::Do)?;
                let body = self.scoped_block(true)?;
                self.expect_token(Token::End)?;
                Ok(self.add_stat(StatKind::While { cond, body }, line))
            }
            Token::Do => {
                self.advance()?;
                let body = self.scoped_block(false)?;
                self.expect_token(Token::End)?;
                Ok(self.add_stat(StatKind::Do(body), line))
            }
            Token::For => self.for_stat(),
            Token::Repeat => {
                self.advance()?;
                // The condition sees the body's locals, so the scope
                // closes only after parsing it.
                self.open_scope(true, false);
                let body = self.block()?;
                self.expect_token(Token::Until)?;
                let cond = self.expr()?;
                self.close_scope()?;
                Ok(self.add_stat(StatKind::Repeat { body, cond }, line))
            }
            Token::Function => self.function_stat(),
            Token::Local => self.local_stat(),
            Token::Break => {
                self.advance()?;
                if !self.inside_loop() {
                    return Err(SyntaxError {
                        message: "break outside a loop".to_string(),
                        line,
                    });
                }
                Ok(self.add_stat(StatKind::Break, line))
            }
            Token::Goto => {
                self.advance()?;
                let name = self.expect_name()?;
                self.scopes
                    .last_mut()
                    .expect("no open scope")
                    .gotos
                    .push((name.clone(), line));
                Ok(self.add_stat(StatKind::Goto(name), line))
            }
            _ => self.expr_stat(),
        }
    }

    fn if_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        self.advance()?;
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.expect_token(Token::Then)?;
        arms.push((cond, self.scoped_block(false)?));
        let mut else_body = None;
        loop {
            match &self.tok {
                Token::Elseif => {
                    self.advance()?;
                    let cond = self.expr()?;
                    self.expect_token(Token::Then)?;
                    arms.push((cond, self.scoped_block(false)?));
                }
                Token::Else => {
                    self.advance()?;
                    else_body = Some(self.scoped_block(false)?);
                    self.expect_token(Token::End)?;
                    break;
                }
                Token::End => {
                    self.advance()?;
                    break;
                }
                _ => return Err(self.error("'end' expected")),
            }
        }
        Ok(self.add_stat(StatKind::If { arms, else_body }, line))
    }

    fn for_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        self.advance()?;
        let first = self.expect_name()?;
        if self.accept(&Token::Assign)? {
            let start = self.expr()?;
            self.expect_token(Token::Comma)?;
            let limit = self.expr()?;
            let step = if self.accept(&Token::Comma)? {
                Some(self.expr()?)
            } else {
                None
            };
            self.expect_token(Token::Do)?;
            self.open_scope(true, false);
            self.declare_local(first.clone(), VarAttrib::Regular);
            let body = self.block()?;
            self.close_scope()?;
            self.expect_token(Token::End)?;
            return Ok(self.add_stat(
                StatKind::NumericFor {
                    var: first,
                    start,
                    limit,
                    step,
                    body,
                },
                line,
            ));
        }
        let mut names = vec![first];
        while self.accept(&Token::Comma)? {
            names.push(self.expect_name()?);
        }
        self.expect_token(Token::In)?;
        let exprs = self.expr_list()?;
        self.expect_token(Token::Do)?;
        self.open_scope(true, false);
        for name in &names {
            self.declare_local(name.clone(), VarAttrib::Regular);
        }
        let body = self.block()?;
        self.close_scope()?;
        self.expect_token(Token::End)?;
        Ok(self.add_stat(StatKind::GenericFor { names, exprs, body }, line))
    }

    /// `function a.b.c:m() … end` desugars to an assignment of a
    /// function literal; `:` adds the implicit `self` parameter.
    fn function_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        self.advance()?;
        let base = self.expect_name()?;
        let mut full_name = base.to_string();
        let mut target = self.add_expr(ExprKind::Name(base.clone()), line);
        let mut is_plain_name = true;
        let mut is_method = false;
        loop {
            if self.accept(&Token::Dot)? {
                let field = self.expect_name()?;
                full_name.push('.');
                full_name.push_str(&field);
                let key = self.add_expr(
                    ExprKind::Str(field.as_bytes().to_vec().into_boxed_slice()),
                    self.tok_line,
                );
                target = self.add_expr(ExprKind::Index { obj: target, key }, line);
                is_plain_name = false;
            } else if self.accept(&Token::Colon)? {
                let method = self.expect_name()?;
                full_name.push(':');
                full_name.push_str(&method);
                let key = self.add_expr(
                    ExprKind::Str(method.as_bytes().to_vec().into_boxed_slice()),
                    self.tok_line,
                );
                target = self.add_expr(ExprKind::Index { obj: target, key }, line);
                is_plain_name = false;
                is_method = true;
                break;
            } else {
                break;
            }
        }
        if is_plain_name {
            self.check_assignable(&base, line)?;
        }
        let proto = self.function_body(SmolStr::new(&full_name), is_method, line)?;
        let func = self.add_expr(ExprKind::Function(proto), line);
        Ok(self.add_stat(
            StatKind::Assign {
                targets: vec![target],
                exprs: vec![func],
            },
            line,
        ))
    }

    fn local_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        self.advance()?;
        if self.accept(&Token::Function)? {
            let name = self.expect_name()?;
            // The local is visible inside its own body (recursion).
            self.declare_local(name.clone(), VarAttrib::Regular);
            let proto = self.function_body(name.clone(), false, line)?;
            return Ok(self.add_stat(StatKind::LocalFunction { name, proto }, line));
        }
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let attrib = self.attrib()?;
            names.push((name, attrib));
            if !self.accept(&Token::Comma)? {
                break;
            }
        }
        let exprs = if self.accept(&Token::Assign)? {
            self.expr_list()?
        } else {
            Vec::new()
        };
        // Locals become visible only after their initializers.
        for (name, attrib) in &names {
            self.declare_local(name.clone(), *attrib);
        }
        Ok(self.add_stat(StatKind::Local { names, exprs }, line))
    }

    fn attrib(&mut self) -> Result<VarAttrib, SyntaxError> {
        if !self.accept(&Token::Lt)? {
            return Ok(VarAttrib::Regular);
        }
        let name = self.expect_name()?;
        let attrib = match name.as_str() {
            "const" => VarAttrib::Const,
            "close" => VarAttrib::Close,
            other => {
                return Err(SyntaxError {
                    message: format!("unknown attribute '{}'", other),
                    line: self.tok_line,
                });
            }
        };
        self.expect_token(Token::Gt)?;
        Ok(attrib)
    }

    fn return_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        self.advance()?;
        let exprs = if self.block_follows() || self.check(&Token::Semi) {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.accept(&Token::Semi)?;
        let tail_call = exprs.len() == 1
            && matches!(
                self.chunk.expr(exprs[0]).kind,
                ExprKind::Call { .. } | ExprKind::MethodCall { .. }
            );
        Ok(self.add_stat(StatKind::Return { exprs, tail_call }, line))
    }

    fn check_assignable(&self, name: &str, line: u32) -> Result<(), SyntaxError> {
        match self.local_attrib(name) {
            Some(VarAttrib::Const) | Some(VarAttrib::Close) => Err(SyntaxError {
                message: format!("attempt to assign to const variable '{}'", name),
                line,
            }),
            _ => Ok(()),
        }
    }

    /// Either an assignment or a call statement.
    fn expr_stat(&mut self) -> Result<StatId, SyntaxError> {
        let line = self.tok_line;
        let first = self.suffixed_expr()?;
        if self.check(&Token::Assign) || self.check(&Token::Comma) {
            let mut targets = vec![first];
            while self.accept(&Token::Comma)? {
                targets.push(self.suffixed_expr()?);
            }
            for &t in &targets {
                match &self.chunk.expr(t).kind {
                    ExprKind::Name(n) => {
                        let n = n.clone();
                        self.check_assignable(&n, line)?;
                    }
                    ExprKind::Index { .. } => {}
                    _ => {
                        return Err(SyntaxError {
                            message: "syntax error: cannot assign to this expression"
                                .to_string(),
                            line,
                        });
                    }
                }
            }
            self.expect_token(Token::Assign)?;
            let exprs = self.expr_list()?;
            return Ok(self.add_stat(StatKind::Assign { targets, exprs }, line));
        }
        match self.chunk.expr(first).kind {
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => {
                Ok(self.add_stat(StatKind::Call(first), line))
            }
            _ => Err(SyntaxError {
                message: "syntax error: unexpected expression statement".to_string(),
                line,
            }),
        }
    }

    // ===== functions =====

    fn function_body(
        &mut self,
        name: SmolStr,
        is_method: bool,
        line: u32,
    ) -> Result<ProtoId, SyntaxError> {
        self.enter()?;
        self.expect_token(Token::LParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if is_method {
            params.push(SmolStr::new("self"));
        }
        if !self.check(&Token::RParen) {
            loop {
                match &self.tok {
                    Token::Ellipsis => {
                        is_vararg = true;
                        self.advance()?;
                        break;
                    }
                    Token::Name(n) => {
                        params.push(n.clone());
                        self.advance()?;
                    }
                    _ => return Err(self.error("<name> expected")),
                }
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
        }
        self.expect_token(Token::RParen)?;
        let body_start = self.tok_start as u32;
        self.open_scope(false, true);
        for p in &params {
            self.declare_local(p.clone(), VarAttrib::Regular);
        }
        let body = self.block()?;
        self.close_scope()?;
        let body_end = self.tok_start as u32;
        self.expect_token(Token::End)?;
        self.leave();
        let id = self.chunk.protos.len() as ProtoId;
        self.chunk.protos.push(Proto {
            params,
            is_vararg,
            body,
            name,
            line,
            body_span: (body_start, body_end),
        });
        Ok(id)
    }

    // ===== expressions =====

    fn expr_list(&mut self) -> Result<Vec<ExprId>, SyntaxError> {
        let mut list = vec![self.expr()?];
        while self.accept(&Token::Comma)? {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    fn expr(&mut self) -> Result<ExprId, SyntaxError> {
        self.sub_expr(0)
    }

    fn sub_expr(&mut self, limit: u8) -> Result<ExprId, SyntaxError> {
        self.enter()?;
        let line = self.tok_line;
        let mut left = if let Some(op) = unary_op(&self.tok) {
            self.advance()?;
            let operand = self.sub_expr(UNARY_PRIORITY)?;
            self.add_expr(ExprKind::Unary { op, operand }, line)
        } else {
            self.simple_expr()?
        };
        while let Some((op, lprio, rprio)) = binary_op(&self.tok) {
            if lprio <= limit {
                break;
            }
            let op_line = self.tok_line;
            self.advance()?;
            let rhs = self.sub_expr(rprio)?;
            left = self.add_expr(ExprKind::Binary { op, lhs: left, rhs }, op_line);
        }
        self.leave();
        Ok(left)
    }

    fn simple_expr(&mut self) -> Result<ExprId, SyntaxError> {
        let line = self.tok_line;
        let kind = match &self.tok {
            Token::Nil => ExprKind::Nil,
            Token::True => ExprKind::True,
            Token::False => ExprKind::False,
            Token::Int(i) => ExprKind::Integer(*i),
            Token::Float(f) => ExprKind::Float(*f),
            Token::Str(s) => ExprKind::Str(s.clone()),
            Token::Ellipsis => ExprKind::Vararg,
            Token::Function => {
                self.advance()?;
                let proto = self.function_body(SmolStr::new("?"), false, line)?;
                return Ok(self.add_expr(ExprKind::Function(proto), line));
            }
            Token::LBrace => return self.table_constructor(),
            _ => return self.suffixed_expr(),
        };
        self.advance()?;
        Ok(self.add_expr(kind, line))
    }

    fn primary_expr(&mut self) -> Result<ExprId, SyntaxError> {
        let line = self.tok_line;
        match &self.tok {
            Token::Name(n) => {
                let n = n.clone();
                self.advance()?;
                Ok(self.add_expr(ExprKind::Name(n), line))
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.expr()?;
                self.expect_token(Token::RParen)?;
                Ok(self.add_expr(ExprKind::Paren(inner), line))
            }
            _ => Err(self.error("unexpected symbol")),
        }
    }

    fn suffixed_expr(&mut self) -> Result<ExprId, SyntaxError> {
        self.enter()?;
        let line = self.tok_line;
        let mut e = self.primary_expr()?;
        loop {
            match &self.tok {
                Token::Dot => {
                    self.advance()?;
                    let field = self.expect_name()?;
                    let key = self.add_expr(
                        ExprKind::Str(field.as_bytes().to_vec().into_boxed_slice()),
                        line,
                    );
                    e = self.add_expr(ExprKind::Index { obj: e, key }, line);
                }
                Token::LBracket => {
                    self.advance()?;
                    let key = self.expr()?;
                    self.expect_token(Token::RBracket)?;
                    e = self.add_expr(ExprKind::Index { obj: e, key }, line);
                }
                Token::Colon => {
                    self.advance()?;
                    let name = self.expect_name()?;
                    let args = self.call_args()?;
                    e = self.add_expr(ExprKind::MethodCall { obj: e, name, args }, line);
                }
                Token::LParen | Token::Str(_) | Token::LBrace => {
                    let args = self.call_args()?;
                    e = self.add_expr(ExprKind::Call { func: e, args }, line);
                }
                _ => break,
            }
        }
        self.leave();
        Ok(e)
    }

    fn call_args(&mut self) -> Result<Vec<ExprId>, SyntaxError> {
        let line = self.tok_line;
        match &self.tok {
            Token::LParen => {
                self.advance()?;
                let args = if self.check(&Token::RParen) {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                self.expect_token(Token::RParen)?;
                Ok(args)
            }
            Token::Str(s) => {
                let s = s.clone();
                self.advance()?;
                Ok(vec![self.add_expr(ExprKind::Str(s), line)])
            }
            Token::LBrace => Ok(vec![self.table_constructor()?]),
            _ => Err(self.error("function arguments expected")),
        }
    }

    fn table_constructor(&mut self) -> Result<ExprId, SyntaxError> {
        let line = self.tok_line;
        self.expect_token(Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            match &self.tok {
                Token::LBracket => {
                    self.advance()?;
                    let key = self.expr()?;
                    self.expect_token(Token::RBracket)?;
                    self.expect_token(Token::Assign)?;
                    let value = self.expr()?;
                    fields.push(TableField::Keyed { key, value });
                }
                Token::Name(n) => {
                    let n = n.clone();
                    if *self.peek_ahead()? != Token::Assign {
                        fields.push(TableField::Item(self.expr()?));
                        if !self.accept(&Token::Comma)? && !self.accept(&Token::Semi)? {
                            break;
                        }
                        continue;
                    }
                    let field_line = self.tok_line;
                    self.advance()?;
                    self.advance()?; // '='
                    let key = self.add_expr(
                        ExprKind::Str(n.as_bytes().to_vec().into_boxed_slice()),
                        field_line,
                    );
                    let value = self.expr()?;
                    fields.push(TableField::Keyed { key, value });
                }
                _ => fields.push(TableField::Item(self.expr()?)),
            }
            if !self.accept(&Token::Comma)? && !self.accept(&Token::Semi)? {
                break;
            }
        }
        self.expect_token(Token::RBrace)?;
        Ok(self.add_expr(ExprKind::Table { fields }, line))
    }

}

const UNARY_PRIORITY: u8 = 12;

fn unary_op(tok: &Token) -> Option<UnOp> {
    match tok {
        Token::Minus => Some(UnOp::Neg),
        Token::Not => Some(UnOp::Not),
        Token::Hash => Some(UnOp::Len),
        Token::Tilde => Some(UnOp::BNot),
        _ => None,
    }
}

/// Lua's operator priorities: `(left, right)`; right-associative
/// operators have `right < left`.
fn binary_op(tok: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match tok {
        Token::Or => (BinOp::Or, 1, 1),
        Token::And => (BinOp::And, 2, 2),
        Token::Lt => (BinOp::Lt, 3, 3),
        Token::Gt => (BinOp::Gt, 3, 3),
        Token::Le => (BinOp::Le, 3, 3),
        Token::Ge => (BinOp::Ge, 3, 3),
        Token::Ne => (BinOp::Ne, 3, 3),
        Token::Eq => (BinOp::Eq, 3, 3),
        Token::Pipe => (BinOp::BOr, 4, 4),
        Token::Tilde => (BinOp::BXor, 5, 5),
        Token::Amp => (BinOp::BAnd, 6, 6),
        Token::Shl => (BinOp::Shl, 7, 7),
        Token::Shr => (BinOp::Shr, 7, 7),
        Token::Concat => (BinOp::Concat, 9, 8),
        Token::Plus => (BinOp::Add, 10, 10),
        Token::Minus => (BinOp::Sub, 10, 10),
        Token::Star => (BinOp::Mul, 11, 11),
        Token::Slash => (BinOp::Div, 11, 11),
        Token::DSlash => (BinOp::IDiv, 11, 11),
        Token::Percent => (BinOp::Mod, 11, 11),
        Token::Caret => (BinOp::Pow, 14, 13),
        _ => return None,
    })
}
