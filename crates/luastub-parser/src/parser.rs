//! Recursive descent parser implementation

use luastub_ast::*;
use luastub_lexer::{Token, TokenKind};

use crate::ParseError;

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    next_node: u32,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            next_node: 0,
        }
    }

    // === Utilities ===

    fn current(&self) -> &Token {
        // `tokenize` always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_ahead(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected(
                kind.describe(),
                self.peek(),
                self.current().span,
            ))
        }
    }

    fn consume_ident(&mut self) -> Result<String, ParseError> {
        let token = self.consume(TokenKind::Ident)?;
        Ok(self.text(&token).to_string())
    }

    fn text(&self, token: &Token) -> &'a str {
        token.text(self.source)
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return Span::dummy();
        }
        self.tokens[self.pos - 1].span
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.node_id(),
            kind,
            span,
        }
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Eof
                | TokenKind::End
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::Until
        )
    }

    // === Chunk ===

    pub fn parse_chunk(&mut self) -> Result<Chunk, ParseError> {
        let start = self.span();
        let block = self.parse_block()?;
        if !self.at(TokenKind::Eof) {
            return Err(ParseError::unexpected(
                "statement",
                self.peek(),
                self.span(),
            ));
        }
        Ok(Chunk {
            block,
            span: start.merge(self.span()),
            node_count: self.next_node,
        })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.span();
        let mut statements = Vec::new();

        while !self.block_follows() {
            if self.at(TokenKind::Return) {
                statements.push(self.parse_return()?);
                break;
            }
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }

        Ok(Block {
            statements,
            span: start.merge(self.prev_span()),
        })
    }

    // === Statements ===

    fn parse_statement(&mut self) -> Result<Option<Statement>, ParseError> {
        let start = self.span();

        let kind = match self.peek() {
            TokenKind::Semicolon => {
                self.advance();
                return Ok(None);
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expr()?;
                self.consume(TokenKind::Do)?;
                let body = self.parse_block()?;
                self.consume(TokenKind::End)?;
                StatementKind::While { condition, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.consume(TokenKind::End)?;
                StatementKind::Do(body)
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Repeat => {
                self.advance();
                let body = self.parse_block()?;
                self.consume(TokenKind::Until)?;
                let condition = self.parse_expr()?;
                StatementKind::Repeat { body, condition }
            }
            TokenKind::Function => {
                self.advance();
                let name = self.parse_function_name()?;
                let func = self.parse_function_body(start)?;
                StatementKind::Function { name, func }
            }
            TokenKind::Local => {
                self.advance();
                if self.eat(TokenKind::Function) {
                    let name = self.consume_ident()?;
                    let func = self.parse_function_body(start)?;
                    StatementKind::LocalFunction { name, func }
                } else {
                    self.parse_local()?
                }
            }
            TokenKind::DoubleColon => {
                self.advance();
                let name = self.consume_ident()?;
                self.consume(TokenKind::DoubleColon)?;
                StatementKind::Label(name)
            }
            TokenKind::Break => {
                self.advance();
                StatementKind::Break
            }
            TokenKind::Goto if self.peek_ahead(1) == TokenKind::Ident => {
                self.advance();
                StatementKind::Goto(self.consume_ident()?)
            }
            _ => self.parse_expr_statement()?,
        };

        Ok(Some(Statement {
            kind,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let start = self.span();
        self.consume(TokenKind::Return)?;
        let values = if self.block_follows() || self.at(TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.eat(TokenKind::Semicolon);
        Ok(Statement {
            kind: StatementKind::Return(values),
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_if(&mut self) -> Result<StatementKind, ParseError> {
        self.consume(TokenKind::If)?;
        let mut clauses = Vec::new();
        let condition = self.parse_expr()?;
        self.consume(TokenKind::Then)?;
        clauses.push((condition, self.parse_block()?));

        let mut else_block = None;
        loop {
            match self.peek() {
                TokenKind::Elseif => {
                    self.advance();
                    let condition = self.parse_expr()?;
                    self.consume(TokenKind::Then)?;
                    clauses.push((condition, self.parse_block()?));
                }
                TokenKind::Else => {
                    self.advance();
                    else_block = Some(self.parse_block()?);
                    self.consume(TokenKind::End)?;
                    break;
                }
                _ => {
                    self.consume(TokenKind::End)?;
                    break;
                }
            }
        }

        Ok(StatementKind::If {
            clauses,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<StatementKind, ParseError> {
        self.consume(TokenKind::For)?;
        let first = self.consume_ident()?;

        if self.eat(TokenKind::Assign) {
            let start = self.parse_expr()?;
            self.consume(TokenKind::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.eat(TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.consume(TokenKind::Do)?;
            let body = self.parse_block()?;
            self.consume(TokenKind::End)?;
            return Ok(StatementKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.eat(TokenKind::Comma) {
            names.push(self.consume_ident()?);
        }
        self.consume(TokenKind::In)?;
        let iterators = self.parse_expr_list()?;
        self.consume(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.consume(TokenKind::End)?;

        Ok(StatementKind::GenericFor {
            names,
            iterators,
            body,
        })
    }

    fn parse_local(&mut self) -> Result<StatementKind, ParseError> {
        let mut names = vec![self.parse_local_name()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.parse_local_name()?);
        }

        let values = if self.eat(TokenKind::Assign) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };

        Ok(StatementKind::Local { names, values })
    }

    /// A local name with an optional `<const>`/`<close>` attribute
    fn parse_local_name(&mut self) -> Result<String, ParseError> {
        let name = self.consume_ident()?;
        if self.at(TokenKind::Lt)
            && self.peek_ahead(1) == TokenKind::Ident
            && self.peek_ahead(2) == TokenKind::Gt
        {
            self.advance();
            self.advance();
            self.advance();
        }
        Ok(name)
    }

    fn parse_function_name(&mut self) -> Result<FunctionName, ParseError> {
        let start = self.span();
        let mut path = vec![self.consume_ident()?];
        while self.eat(TokenKind::Dot) {
            path.push(self.consume_ident()?);
        }
        let method = if self.eat(TokenKind::Colon) {
            Some(self.consume_ident()?)
        } else {
            None
        };
        Ok(FunctionName {
            path,
            method,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_function_body(&mut self, start: Span) -> Result<FunctionBody, ParseError> {
        let id = self.node_id();
        self.consume(TokenKind::LParen)?;

        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.at(TokenKind::RParen) {
            loop {
                if self.eat(TokenKind::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.consume_ident()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen)?;

        let body = self.parse_block()?;
        self.consume(TokenKind::End)?;

        Ok(FunctionBody {
            id,
            params,
            is_vararg,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_expr_statement(&mut self) -> Result<StatementKind, ParseError> {
        let first = self.parse_suffixed_expr()?;

        if self.at(TokenKind::Assign) || self.at(TokenKind::Comma) {
            let mut targets = vec![first];
            while self.eat(TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(
                    target.kind,
                    ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
                ) {
                    return Err(ParseError::InvalidAssignmentTarget { span: target.span });
                }
            }
            self.consume(TokenKind::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(StatementKind::Assign { targets, values });
        }

        match first.kind {
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } => Ok(StatementKind::Call(first)),
            _ => Err(ParseError::unexpected("'='", self.peek(), self.span())),
        }
    }

    // === Expressions ===

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    /// Precedence climbing over Lua's binary operator table
    fn parse_subexpr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        let start = self.span();

        let mut left = if let Some(op) = unary_op(self.peek()) {
            self.advance();
            let operand = self.parse_subexpr(UnaryOp::PRECEDENCE)?;
            let span = start.merge(operand.span);
            self.expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            )
        } else {
            self.parse_simple_expr()?
        };

        while let Some(op) = binary_op(self.peek()) {
            let (left_power, right_power) = op.precedence();
            if left_power <= limit {
                break;
            }
            self.advance();
            let right = self.parse_subexpr(right_power)?;
            let span = left.span.merge(right.span);
            left = self.expr(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        let kind = match self.peek() {
            TokenKind::Nil => {
                self.advance();
                ExprKind::Nil
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Boolean(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Boolean(false)
            }
            TokenKind::Ellipsis => {
                self.advance();
                ExprKind::Vararg
            }
            TokenKind::Number => {
                let token = self.advance();
                ExprKind::Number(self.text(&token).to_string())
            }
            TokenKind::String | TokenKind::LongString => {
                ExprKind::String(self.parse_string_value()?)
            }
            TokenKind::LBrace => ExprKind::Table(self.parse_table_fields()?),
            TokenKind::Function => {
                self.advance();
                ExprKind::Function(self.parse_function_body(start)?)
            }
            _ => return self.parse_suffixed_expr(),
        };
        Ok(self.expr(kind, start.merge(self.prev_span())))
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        match self.peek() {
            TokenKind::Ident => {
                let name = self.consume_ident()?;
                Ok(self.expr(ExprKind::Name(name), start))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.consume(TokenKind::RParen)?;
                Ok(self.expr(ExprKind::Paren(Box::new(inner)), start.merge(self.prev_span())))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { span: start }),
            _ => Err(ParseError::InvalidExpression { span: start }),
        }
    }

    fn parse_suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.span();
        let mut expr = self.parse_primary_expr()?;

        loop {
            let kind = match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.consume_ident()?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        name,
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.consume(TokenKind::RBracket)?;
                    ExprKind::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                    }
                }
                TokenKind::Colon => {
                    self.advance();
                    let method = self.consume_ident()?;
                    let args = self.parse_call_args()?;
                    ExprKind::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                    }
                }
                TokenKind::LParen | TokenKind::String | TokenKind::LongString | TokenKind::LBrace => {
                    let args = self.parse_call_args()?;
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                _ => return Ok(expr),
            };
            expr = self.expr(kind, start.merge(self.prev_span()));
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let start = self.span();
        match self.peek() {
            TokenKind::LParen => {
                self.advance();
                let args = if self.at(TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.consume(TokenKind::RParen)?;
                Ok(args)
            }
            TokenKind::String | TokenKind::LongString => {
                let value = self.parse_string_value()?;
                Ok(vec![self.expr(ExprKind::String(value), start)])
            }
            TokenKind::LBrace => {
                let fields = self.parse_table_fields()?;
                Ok(vec![self.expr(ExprKind::Table(fields), start.merge(self.prev_span()))])
            }
            other => Err(ParseError::unexpected("function arguments", other, start)),
        }
    }

    fn parse_table_fields(&mut self) -> Result<Vec<TableField>, ParseError> {
        self.consume(TokenKind::LBrace)?;
        let mut fields = Vec::new();

        while !self.at(TokenKind::RBrace) {
            let field = if self.at(TokenKind::LBracket) {
                self.advance();
                let key = self.parse_expr()?;
                self.consume(TokenKind::RBracket)?;
                self.consume(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                TableField::Keyed { key, value }
            } else if self.at(TokenKind::Ident) && self.peek_ahead(1) == TokenKind::Assign {
                let name = self.consume_ident()?;
                self.advance();
                let value = self.parse_expr()?;
                TableField::Named { name, value }
            } else {
                TableField::Positional(self.parse_expr()?)
            };
            fields.push(field);

            if !self.eat(TokenKind::Comma) && !self.eat(TokenKind::Semicolon) {
                break;
            }
        }

        self.consume(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn parse_string_value(&mut self) -> Result<String, ParseError> {
        let token = self.advance();
        let raw = self.text(&token);
        let value = match token.kind {
            TokenKind::String => unescape(&raw[1..raw.len() - 1]),
            TokenKind::LongString => Some(long_string_value(raw)),
            other => return Err(ParseError::unexpected("string", other, token.span)),
        };
        value.ok_or(ParseError::InvalidString { span: token.span })
    }
}

fn unary_op(kind: TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Not => Some(UnaryOp::Not),
        TokenKind::Minus => Some(UnaryOp::Neg),
        TokenKind::Hash => Some(UnaryOp::Len),
        TokenKind::Tilde => Some(UnaryOp::BitNot),
        _ => None,
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::DoubleSlash => BinaryOp::FloorDiv,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::Ampersand => BinaryOp::BitAnd,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Tilde => BinaryOp::BitXor,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::DotDot => BinaryOp::Concat,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

/// Content of a `[==[ ... ]==]` literal; a newline right after the opener is dropped
fn long_string_value(raw: &str) -> String {
    let level = raw[1..].bytes().take_while(|&b| b == b'=').count();
    let open = level + 2;
    let close = raw.len().saturating_sub(level + 2).max(open);
    let body = &raw[open..close];
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    body.to_string()
}

/// Process the escape sequences of a quoted string body
pub fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' | '\n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'z' => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            }
            'x' => {
                let hi = chars.next()?.to_digit(16)?;
                let lo = chars.next()?.to_digit(16)?;
                out.push(char::from_u32(hi * 16 + lo)?);
            }
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut code = 0u32;
                loop {
                    let c = chars.next()?;
                    if c == '}' {
                        break;
                    }
                    code = code.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
                }
                out.push(char::from_u32(code)?);
            }
            d if d.is_ascii_digit() => {
                let mut code = d.to_digit(10)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(10)) {
                        Some(digit) => {
                            code = code * 10 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if code > 255 {
                    return None;
                }
                out.push(char::from_u32(code)?);
            }
            other => out.push(other),
        }
    }

    Some(out)
}
