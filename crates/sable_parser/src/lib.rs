use sable_syntax::{
    AssignKind, Expr, Function, FunctionKind, Ident, Literal, LogicalOp, NodeId, Param, Span, Stmt,
    TypeNode, UnaryOp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    And,
    As,
    Break,
    Class,
    Else,
    Extends,
    False,
    For,
    Fun,
    If,
    Import,
    Interface,
    Nil,
    Or,
    Return,
    Super,
    This,
    True,
    Type,
    Var,
    While,
    Yield,
    // Data-carrying literals
    Ident(String),
    Number(f64),
    Str(String),
    Atom(String),
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Arrow,
    Pipe,
    BitOr,
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    // Special
    Error(String),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    fn eof() -> Self {
        Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: Span::new(0, 0, 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub lexeme: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lexeme.is_empty() {
            write!(f, "[line {}] Error at end: {}", self.line, self.message)
        } else {
            write!(
                f,
                "[line {}] Error at '{}': {}",
                self.line, self.lexeme, self.message
            )
        }
    }
}

impl std::error::Error for ParseError {}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::Chars<'a>,
    index: usize,
    line: u32,
    current: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            source,
            chars,
            index: 0,
            line: 1,
            current,
        }
    }

    fn bump(&mut self) {
        if let Some(ch) = self.current {
            self.index += ch.len_utf8();
        }
        self.current = self.chars.next();
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.current {
                Some('\n') => {
                    self.line += 1;
                    self.bump();
                }
                Some(ch) if ch.is_whitespace() => self.bump(),
                Some('/') if self.source[self.index..].starts_with("//") => {
                    while self.current.is_some() && self.current != Some('\n') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: u32) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.index].to_string(),
            span: Span::new(start, self.index, line),
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.index;
        let line = self.line;
        let Some(ch) = self.current else {
            return Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span: Span::new(start, start, line),
            };
        };
        match ch {
            '(' => {
                self.bump();
                self.token(TokenKind::LParen, start, line)
            }
            ')' => {
                self.bump();
                self.token(TokenKind::RParen, start, line)
            }
            '{' => {
                self.bump();
                self.token(TokenKind::LBrace, start, line)
            }
            '}' => {
                self.bump();
                self.token(TokenKind::RBrace, start, line)
            }
            '[' => {
                self.bump();
                self.token(TokenKind::LBracket, start, line)
            }
            ']' => {
                self.bump();
                self.token(TokenKind::RBracket, start, line)
            }
            ',' => {
                self.bump();
                self.token(TokenKind::Comma, start, line)
            }
            '.' => {
                self.bump();
                self.token(TokenKind::Dot, start, line)
            }
            ';' => {
                self.bump();
                self.token(TokenKind::Semicolon, start, line)
            }
            '+' => {
                self.bump();
                self.token(TokenKind::Plus, start, line)
            }
            '-' => {
                self.bump();
                self.token(TokenKind::Minus, start, line)
            }
            '*' => {
                self.bump();
                self.token(TokenKind::Star, start, line)
            }
            '/' => {
                self.bump();
                self.token(TokenKind::Slash, start, line)
            }
            '%' => {
                self.bump();
                self.token(TokenKind::Percent, start, line)
            }
            '|' => {
                self.bump();
                if self.current == Some('>') {
                    self.bump();
                    self.token(TokenKind::Pipe, start, line)
                } else {
                    self.token(TokenKind::BitOr, start, line)
                }
            }
            '!' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.token(TokenKind::BangEqual, start, line)
                } else {
                    self.token(TokenKind::Bang, start, line)
                }
            }
            '=' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.token(TokenKind::EqualEqual, start, line)
                } else if self.current == Some('>') {
                    self.bump();
                    self.token(TokenKind::Arrow, start, line)
                } else {
                    self.token(TokenKind::Equal, start, line)
                }
            }
            '<' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.token(TokenKind::LessEqual, start, line)
                } else {
                    self.token(TokenKind::Less, start, line)
                }
            }
            '>' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.token(TokenKind::GreaterEqual, start, line)
                } else {
                    self.token(TokenKind::Greater, start, line)
                }
            }
            ':' => {
                self.bump();
                if matches!(self.current, Some(c) if c.is_alphabetic() || c == '_') {
                    while matches!(self.current, Some(c) if c.is_alphanumeric() || c == '_') {
                        self.bump();
                    }
                    self.token(TokenKind::Atom(self.source[start + 1..self.index].to_string()), start, line)
                } else {
                    self.token(TokenKind::Colon, start, line)
                }
            }
            '"' => {
                self.bump();
                let content_start = self.index;
                while self.current.is_some() && self.current != Some('"') {
                    if self.current == Some('\n') {
                        self.line += 1;
                    }
                    self.bump();
                }
                if self.current.is_none() {
                    return self.token(
                        TokenKind::Error("Unterminated string.".to_string()),
                        start,
                        line,
                    );
                }
                let content = self.source[content_start..self.index].to_string();
                self.bump();
                self.token(TokenKind::Str(content), start, line)
            }
            c if c.is_ascii_digit() => {
                while matches!(self.current, Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
                if self.current == Some('.')
                    && matches!(self.peek_next(), Some(c) if c.is_ascii_digit())
                {
                    self.bump();
                    while matches!(self.current, Some(c) if c.is_ascii_digit()) {
                        self.bump();
                    }
                }
                match self.source[start..self.index].parse::<f64>() {
                    Ok(value) => self.token(TokenKind::Number(value), start, line),
                    Err(_) => self.token(TokenKind::Error("Invalid number.".to_string()), start, line),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                while matches!(self.current, Some(c) if c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                let text = &self.source[start..self.index];
                let kind = match text {
                    "and" => TokenKind::And,
                    "as" => TokenKind::As,
                    "break" => TokenKind::Break,
                    "class" => TokenKind::Class,
                    "else" => TokenKind::Else,
                    "extends" => TokenKind::Extends,
                    "false" => TokenKind::False,
                    "for" => TokenKind::For,
                    "fun" => TokenKind::Fun,
                    "if" => TokenKind::If,
                    "import" => TokenKind::Import,
                    "interface" => TokenKind::Interface,
                    "nil" => TokenKind::Nil,
                    "or" => TokenKind::Or,
                    "return" => TokenKind::Return,
                    "super" => TokenKind::Super,
                    "this" => TokenKind::This,
                    "true" => TokenKind::True,
                    "type" => TokenKind::Type,
                    "var" => TokenKind::Var,
                    "while" => TokenKind::While,
                    "yield" => TokenKind::Yield,
                    _ => TokenKind::Ident(text.to_string()),
                };
                self.token(kind, start, line)
            }
            other => {
                self.bump();
                self.token(
                    TokenKind::Error(format!("Unexpected character '{other}'.")),
                    start,
                    line,
                )
            }
        }
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    None,
    Assignment,
    Yield,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Prec {
    fn next(self) -> Prec {
        match self {
            Prec::None => Prec::Assignment,
            Prec::Assignment => Prec::Yield,
            Prec::Yield => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Equality,
            Prec::Equality => Prec::Comparison,
            Prec::Comparison => Prec::Term,
            Prec::Term => Prec::Factor,
            Prec::Factor => Prec::Unary,
            Prec::Unary => Prec::Call,
            Prec::Call => Prec::Primary,
            Prec::Primary => Prec::Primary,
        }
    }
}

type PrefixFn = fn(&mut Parser<'_>, bool) -> Option<Expr>;
type InfixFn = fn(&mut Parser<'_>, Expr, bool) -> Option<Expr>;

struct ParseRule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    precedence: Prec,
}

fn rule_for(kind: &TokenKind) -> ParseRule {
    let (prefix, infix, precedence): (Option<PrefixFn>, Option<InfixFn>, Prec) = match kind {
        TokenKind::LParen => (Some(grouping), Some(call), Prec::Call),
        TokenKind::LBrace => (Some(map_literal), None, Prec::None),
        TokenKind::LBracket => (Some(list_literal), Some(get_item), Prec::Call),
        TokenKind::Pipe => (None, Some(pipe_call), Prec::Yield),
        TokenKind::Dot => (None, Some(dot), Prec::Call),
        TokenKind::Minus => (Some(unary), Some(binary), Prec::Term),
        TokenKind::Plus => (None, Some(binary), Prec::Term),
        TokenKind::Percent => (None, Some(binary), Prec::Term),
        TokenKind::Slash => (None, Some(binary), Prec::Factor),
        TokenKind::Star => (None, Some(binary), Prec::Factor),
        TokenKind::Bang => (Some(unary), None, Prec::None),
        TokenKind::BangEqual => (None, Some(binary), Prec::Equality),
        TokenKind::EqualEqual => (None, Some(binary), Prec::Equality),
        TokenKind::Greater => (None, Some(binary), Prec::Comparison),
        TokenKind::GreaterEqual => (None, Some(binary), Prec::Comparison),
        TokenKind::Less => (None, Some(binary), Prec::Comparison),
        TokenKind::LessEqual => (None, Some(binary), Prec::Comparison),
        TokenKind::Ident(_) => (Some(variable), None, Prec::None),
        TokenKind::Atom(_) => (Some(literal), None, Prec::None),
        TokenKind::Str(_) => (Some(literal), None, Prec::None),
        TokenKind::Number(_) => (Some(literal), None, Prec::None),
        TokenKind::And => (None, Some(logical), Prec::And),
        TokenKind::Or => (None, Some(logical), Prec::Or),
        TokenKind::False => (Some(literal), None, Prec::None),
        TokenKind::Nil => (Some(literal), None, Prec::None),
        TokenKind::True => (Some(literal), None, Prec::None),
        TokenKind::If => (Some(if_expr), None, Prec::None),
        TokenKind::Super => (Some(super_), None, Prec::None),
        TokenKind::This => (Some(this_), None, Prec::None),
        TokenKind::Yield => (Some(yield_), None, Prec::None),
        _ => (None, None, Prec::None),
    };
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<ParseError>,
    next_id: u32,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            current: Token::eof(),
            previous: Token::eof(),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            next_id: 1,
        };
        parser.advance();
        parser
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        NodeId(id)
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let lexeme = match token.kind {
            TokenKind::Eof => String::new(),
            _ => token.lexeme.clone(),
        };
        let error = ParseError {
            message: message.to_string(),
            line: token.span.line,
            lexeme,
        };
        eprintln!("{error}");
        self.errors.push(error);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::eof());
        loop {
            self.current = self.lexer.next_token();
            match &self.current.kind {
                TokenKind::Error(message) => {
                    let message = message.clone();
                    self.error_at_current(&message);
                }
                _ => break,
            }
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn check_ident(&self) -> bool {
        matches!(self.current.kind, TokenKind::Ident(_))
    }

    fn previous_ident(&mut self) -> Ident {
        let name = match &self.previous.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => self.previous.lexeme.clone(),
        };
        Ident {
            name,
            span: self.previous.span,
            id: self.alloc_id(),
        }
    }

    fn parse_variable(&mut self, message: &str) -> Option<Ident> {
        if self.check_ident() {
            self.advance();
            Some(self.previous_ident())
        } else {
            self.error_at_current(message);
            None
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_precedence(&mut self, precedence: Prec) -> Option<Expr> {
        self.advance();
        let Some(prefix) = rule_for(&self.previous.kind).prefix else {
            self.error("Expect expression.");
            return None;
        };

        let can_assign = precedence <= Prec::Assignment;
        let mut expr = prefix(self, can_assign)?;

        while precedence <= rule_for(&self.current.kind).precedence {
            self.advance();
            let infix = rule_for(&self.previous.kind)
                .infix
                .expect("token with a binding power has an infix rule");
            expr = infix(self, expr, can_assign)?;
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }

        Some(expr)
    }

    fn expression(&mut self) -> Option<Expr> {
        if self.matches(TokenKind::Fun) {
            lambda(self)
        } else {
            self.parse_precedence(Prec::Assignment)
        }
    }

    fn argument_list(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if self.check(TokenKind::RParen) {
                    break;
                }
                if let Some(expr) = self.expression() {
                    args.push(expr);
                }
                if args.len() > 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after arguments.");
        args
    }

    fn generic_params(&mut self) -> Vec<TypeNode> {
        let mut generics = Vec::new();
        if self.matches(TokenKind::Greater) {
            return generics;
        }
        loop {
            let Some(name) = self.parse_variable("Expect identifier in generic argument list.")
            else {
                break;
            };
            let extends = if self.matches(TokenKind::Extends) {
                self.type_annotation().map(Box::new)
            } else {
                None
            };
            generics.push(TypeNode::GenericParam {
                name,
                id: self.alloc_id(),
                extends,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::Greater, "Expect '>' after generic argument list.");
        generics
    }

    fn functor_annotation(&mut self, generics: Vec<TypeNode>) -> Option<TypeNode> {
        let span = self.previous.span;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let ty = self.type_annotation()?;
                args.push(Some(ty));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after functor type arguments.");
        self.consume(TokenKind::Arrow, "Expect '=>' after functor type arguments.");
        let return_ty = self.type_annotation().map(Box::new);
        Some(TypeNode::Functor {
            span,
            id: self.alloc_id(),
            generics,
            args,
            return_ty,
        })
    }

    fn simple_annotation(&mut self) -> Option<TypeNode> {
        let name = self.previous_ident();
        let mut generics = Vec::new();
        if self.matches(TokenKind::Less) {
            loop {
                let ty = self.type_annotation()?;
                generics.push(ty);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::Greater, "Expect '>' after generic type argument.");
        }
        Some(TypeNode::Simple { name, generics })
    }

    fn type_annotation(&mut self) -> Option<TypeNode> {
        let left = if self.matches(TokenKind::Less) {
            let generics = self.generic_params();
            self.consume(TokenKind::LParen, "Expect '(' after generic argument list.");
            self.functor_annotation(generics)?
        } else if self.matches(TokenKind::LParen) {
            self.functor_annotation(Vec::new())?
        } else if self.check_ident() {
            self.advance();
            self.simple_annotation()?
        } else {
            self.error_at_current("Expect identifier or functor type.");
            return None;
        };

        if !self.matches(TokenKind::BitOr) {
            return Some(left);
        }
        let right = self.type_annotation()?;
        Some(TypeNode::Union {
            id: self.alloc_id(),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parameter_list(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                if params.len() >= 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let Some(name) = self.parse_variable("Expect parameter name.") else {
                    break;
                };
                let ty = if self.matches(TokenKind::Colon) {
                    self.type_annotation()
                } else {
                    None
                };
                params.push(Param {
                    id: self.alloc_id(),
                    name,
                    ty,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "Expect ')' after parameters.");
        params
    }

    fn block_stmts(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after block.");
        stmts
    }

    fn block(&mut self) -> Stmt {
        Stmt::Block {
            id: self.alloc_id(),
            stmts: self.block_stmts(),
        }
    }

    fn function(&mut self, name: Ident, kind: FunctionKind) -> Option<Stmt> {
        let generics = if self.matches(TokenKind::Less) {
            self.generic_params()
        } else {
            Vec::new()
        };
        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        let params = self.parameter_list();
        let return_ty = if self.matches(TokenKind::Colon) {
            self.type_annotation()
        } else {
            None
        };
        self.consume(TokenKind::LBrace, "Expect '{' before function body.");
        let body = self.block_stmts();
        Some(Stmt::Function(Function {
            id: self.alloc_id(),
            name,
            kind,
            generics,
            params,
            return_ty,
            body,
        }))
    }

    fn expression_statement(&mut self) -> Option<Stmt> {
        let expr = self.expression()?;
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Expression {
            id: self.alloc_id(),
            expr,
        })
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let keyword = self.previous.span;
        if self.matches(TokenKind::Semicolon) {
            return Some(Stmt::Return {
                id: self.alloc_id(),
                keyword,
                value: None,
            });
        }
        let value = self.expression()?;
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Return {
            id: self.alloc_id(),
            keyword,
            value: Some(value),
        })
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let while_span = self.previous.span;
        self.consume(TokenKind::LParen, "Expect '(' after 'while'.");
        let condition = self.expression()?;
        self.consume(TokenKind::RParen, "Expect ')' after condition.");
        let body = self.statement()?;
        Some(Stmt::While {
            id: self.alloc_id(),
            while_span,
            condition,
            body: Box::new(body),
        })
    }

    fn for_statement(&mut self) -> Option<Stmt> {
        let for_span = self.previous.span;
        self.consume(TokenKind::LParen, "Expect '(' after 'for'.");
        let init = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(AssignKind::Variable).map(Box::new)
        } else {
            self.expression_statement().map(Box::new)
        };

        let condition = if self.matches(TokenKind::Semicolon) {
            None
        } else {
            let cond = self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            cond
        };

        let increment = if self.matches(TokenKind::RParen) {
            None
        } else {
            let incr = self.expression();
            self.consume(TokenKind::RParen, "Expect ')' after for clauses.");
            incr
        };

        let body = self.statement()?;
        Some(Stmt::For {
            id: self.alloc_id(),
            for_span,
            init,
            condition,
            increment,
            body: Box::new(body),
        })
    }

    fn import_statement(&mut self) -> Option<Stmt> {
        let span = self.current.span;
        let path = match &self.current.kind {
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Expr::Literal {
                    value: Literal::Str(value),
                    span,
                    id: self.alloc_id(),
                }
            }
            _ => {
                self.error_at_current("Expect string after import.");
                return None;
            }
        };
        self.consume(TokenKind::As, "Expect 'as' after import path.");
        let alias = self.parse_variable("Expect name after 'as' in import.")?;
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Import {
            id: self.alloc_id(),
            path,
            alias,
        })
    }

    fn break_statement(&mut self) -> Option<Stmt> {
        let span = self.previous.span;
        self.matches(TokenKind::Semicolon);
        Some(Stmt::Break {
            id: self.alloc_id(),
            span,
        })
    }

    fn statement(&mut self) -> Option<Stmt> {
        let result = if self.matches(TokenKind::Return) {
            self.return_statement()
        } else if self.matches(TokenKind::While) {
            self.while_statement()
        } else if self.matches(TokenKind::For) {
            self.for_statement()
        } else if self.matches(TokenKind::LBrace) {
            Some(self.block())
        } else if self.matches(TokenKind::Import) {
            self.import_statement()
        } else if self.matches(TokenKind::Break) {
            self.break_statement()
        } else {
            self.expression_statement()
        };

        while self.matches(TokenKind::Semicolon) {}

        result
    }

    fn var_declaration(&mut self, kind: AssignKind) -> Option<Stmt> {
        let name = self.parse_variable("Expect variable name.")?;
        let ty = if self.matches(TokenKind::Colon) {
            self.type_annotation()
        } else {
            None
        };
        let init = if self.matches(TokenKind::Equal) {
            self.expression()
        } else {
            None
        };

        if ty.is_none() && init.is_none() {
            self.error_at_current("Var without initializer must provide a type!");
            return None;
        }

        self.matches(TokenKind::Semicolon);
        Some(Stmt::Var {
            id: self.alloc_id(),
            name,
            kind,
            ty,
            init,
        })
    }

    fn type_declaration(&mut self) -> Option<Stmt> {
        let name = self.parse_variable("Expect type name.")?;
        let generics = if self.matches(TokenKind::Less) {
            self.generic_params()
        } else {
            Vec::new()
        };
        self.consume(TokenKind::Equal, "Expect '=' after type name.");
        let target = self.type_annotation()?;
        self.matches(TokenKind::Semicolon);
        Some(Stmt::TypeAlias {
            id: self.alloc_id(),
            name,
            generics,
            target,
        })
    }

    fn fun_declaration(&mut self) -> Option<Stmt> {
        let name = self.parse_variable("Expect function name.")?;
        self.function(name, FunctionKind::Function)
    }

    fn method(&mut self) -> Option<Stmt> {
        self.consume(TokenKind::Fun, "Expect 'var' or 'fun' keyword.");
        let name = self.parse_variable("Expect method name.")?;
        let kind = if name.name == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(name, kind)
    }

    fn method_signature(&mut self) -> Option<Stmt> {
        self.consume(TokenKind::Fun, "Expect 'fun' in interface body.");
        let name = self.parse_variable("Expect method name.")?;
        let kind = if name.name == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        let generics = if self.matches(TokenKind::Less) {
            self.generic_params()
        } else {
            Vec::new()
        };
        self.consume(TokenKind::LParen, "Expect '(' after function name.");
        let params = self.parameter_list();
        let return_ty = if self.matches(TokenKind::Colon) {
            self.type_annotation()
        } else {
            None
        };
        self.matches(TokenKind::Semicolon);
        Some(Stmt::MethodSig {
            id: self.alloc_id(),
            name,
            kind,
            generics,
            params,
            return_ty,
        })
    }

    fn class_declaration(&mut self) -> Option<Stmt> {
        let name = self.parse_variable("Expect class name.")?;
        let generics = if self.matches(TokenKind::Less) {
            self.generic_params()
        } else {
            Vec::new()
        };

        let superclass = if self.matches(TokenKind::Extends) {
            let parent = self.parse_variable("Expect superclass name.")?;
            if parent.name == name.name {
                self.error("A class can't inherit from itself.");
            }
            Some(parent)
        } else {
            None
        };

        self.consume(TokenKind::LBrace, "Expect '{' before class body.");
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let member = if self.matches(TokenKind::Var) {
                self.var_declaration(AssignKind::Field)
            } else {
                self.method()
            };
            match member {
                Some(member) => body.push(member),
                None => break,
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after class body.");

        Some(Stmt::Class {
            id: self.alloc_id(),
            name,
            generics,
            superclass,
            body,
        })
    }

    fn interface_declaration(&mut self) -> Option<Stmt> {
        let name = self.parse_variable("Expect an interface name.")?;
        let generics = if self.matches(TokenKind::Less) {
            self.generic_params()
        } else {
            Vec::new()
        };

        let super_name = if self.matches(TokenKind::Extends) {
            let parent = self.parse_variable("Expect supertype name.")?;
            if parent.name == name.name {
                self.error("An interface can't extend from itself.");
            }
            Some(parent)
        } else {
            None
        };

        self.consume(TokenKind::LBrace, "Expect '{' before interface body.");
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let member = if self.matches(TokenKind::Var) {
                self.var_declaration(AssignKind::Field)
            } else {
                self.method_signature()
            };
            match member {
                Some(member) => body.push(member),
                None => break,
            }
        }
        self.consume(TokenKind::RBrace, "Expect '}' after interface body.");

        Some(Stmt::Interface {
            id: self.alloc_id(),
            name,
            generics,
            super_name,
            body,
        })
    }

    fn declaration(&mut self) -> Option<Stmt> {
        if self.matches(TokenKind::Class) {
            self.class_declaration()
        } else if self.matches(TokenKind::Fun) {
            self.fun_declaration()
        } else if self.matches(TokenKind::Var) {
            self.var_declaration(AssignKind::Variable)
        } else if self.matches(TokenKind::Interface) {
            self.interface_declaration()
        } else if self.matches(TokenKind::Type) {
            self.type_declaration()
        } else {
            self.statement()
        }
    }
}

fn literal(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let span = parser.previous.span;
    let value = match &parser.previous.kind {
        TokenKind::Number(value) => Literal::Number(*value),
        TokenKind::Str(value) => Literal::Str(value.clone()),
        TokenKind::Atom(name) => Literal::Atom(name.clone()),
        TokenKind::True => Literal::Bool(true),
        TokenKind::False => Literal::Bool(false),
        TokenKind::Nil => Literal::Nil,
        _ => return None,
    };
    Some(Expr::Literal {
        value,
        span,
        id: parser.alloc_id(),
    })
}

fn grouping(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let expr = parser.expression()?;
    parser.consume(TokenKind::RParen, "Expect ')' after expression.");
    Some(Expr::Grouping {
        id: parser.alloc_id(),
        expr: Box::new(expr),
    })
}

fn unary(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let op_span = parser.previous.span;
    let op = match parser.previous.kind {
        TokenKind::Minus => UnaryOp::Neg,
        TokenKind::Bang => UnaryOp::Not,
        _ => return None,
    };
    let right = parser.parse_precedence(Prec::Unary)?;
    Some(Expr::Unary {
        op,
        op_span,
        id: parser.alloc_id(),
        right: Box::new(right),
    })
}

fn binary(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let op_span = parser.previous.span;
    let (op, precedence) = match parser.previous.kind {
        TokenKind::Plus => (sable_syntax::BinaryOp::Add, Prec::Term),
        TokenKind::Minus => (sable_syntax::BinaryOp::Sub, Prec::Term),
        TokenKind::Percent => (sable_syntax::BinaryOp::Mod, Prec::Term),
        TokenKind::Star => (sable_syntax::BinaryOp::Mul, Prec::Factor),
        TokenKind::Slash => (sable_syntax::BinaryOp::Div, Prec::Factor),
        TokenKind::EqualEqual => (sable_syntax::BinaryOp::Eq, Prec::Equality),
        TokenKind::BangEqual => (sable_syntax::BinaryOp::Neq, Prec::Equality),
        TokenKind::Less => (sable_syntax::BinaryOp::Lt, Prec::Comparison),
        TokenKind::LessEqual => (sable_syntax::BinaryOp::Lte, Prec::Comparison),
        TokenKind::Greater => (sable_syntax::BinaryOp::Gt, Prec::Comparison),
        TokenKind::GreaterEqual => (sable_syntax::BinaryOp::Gte, Prec::Comparison),
        _ => return None,
    };
    let right = parser.parse_precedence(precedence.next())?;
    Some(Expr::Binary {
        left: Box::new(left),
        op,
        op_span,
        id: parser.alloc_id(),
        right: Box::new(right),
    })
}

fn logical(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let op_span = parser.previous.span;
    let (op, precedence) = match parser.previous.kind {
        TokenKind::And => (LogicalOp::And, Prec::And),
        TokenKind::Or => (LogicalOp::Or, Prec::Or),
        _ => return None,
    };
    let right = parser.parse_precedence(precedence)?;
    Some(Expr::Logical {
        left: Box::new(left),
        op,
        op_span,
        id: parser.alloc_id(),
        right: Box::new(right),
    })
}

fn variable(parser: &mut Parser<'_>, can_assign: bool) -> Option<Expr> {
    let name = parser.previous_ident();
    if can_assign && parser.matches(TokenKind::Equal) {
        let value = parser.expression()?;
        Some(Expr::Assign {
            name,
            id: parser.alloc_id(),
            value: Box::new(value),
        })
    } else {
        Some(Expr::Variable { name })
    }
}

fn call(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let paren = parser.previous.span;
    let args = parser.argument_list();
    Some(Expr::Call {
        callee: Box::new(left),
        paren,
        id: parser.alloc_id(),
        args,
    })
}

fn get_item(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let bracket = parser.previous.span;
    let index = parser.expression()?;
    parser.consume(TokenKind::RBracket, "Expect ']' after index.");
    Some(Expr::GetItem {
        object: Box::new(left),
        bracket,
        id: parser.alloc_id(),
        index: Box::new(index),
    })
}

fn pipe_call(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let result = parser.parse_precedence(Prec::Call)?;
    match result {
        Expr::Call {
            callee,
            paren,
            id,
            mut args,
        } => {
            args.insert(0, left);
            Some(Expr::Call {
                callee,
                paren,
                id,
                args,
            })
        }
        _ => {
            parser.error_at_current("Expected function call after pipe operator.");
            None
        }
    }
}

fn dot(parser: &mut Parser<'_>, left: Expr, _can_assign: bool) -> Option<Expr> {
    let Some(name) = parser.parse_variable("Expect property name after '.'.") else {
        return None;
    };
    if parser.matches(TokenKind::Equal) {
        let value = parser.expression()?;
        Some(Expr::Set {
            object: Box::new(left),
            name,
            id: parser.alloc_id(),
            value: Box::new(value),
        })
    } else {
        Some(Expr::Get {
            object: Box::new(left),
            name,
            id: parser.alloc_id(),
        })
    }
}

fn this_(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    Some(Expr::This {
        keyword: parser.previous.span,
        id: parser.alloc_id(),
    })
}

fn super_(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let keyword = parser.previous.span;
    parser.consume(TokenKind::Dot, "Expect '.' after 'super'.");
    let method = parser.parse_variable("Expect superclass method name.")?;
    Some(Expr::Super {
        keyword,
        method,
        id: parser.alloc_id(),
    })
}

fn yield_(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let keyword = parser.previous.span;
    let expr = if !parser.check(TokenKind::Semicolon) {
        Some(Box::new(parser.parse_precedence(Prec::Yield)?))
    } else {
        None
    };
    Some(Expr::Yield {
        keyword,
        id: parser.alloc_id(),
        expr,
    })
}

fn if_expr(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let if_span = parser.previous.span;
    parser.consume(TokenKind::LParen, "Expect '(' after 'if'.");
    let condition = parser.expression()?;
    parser.consume(TokenKind::RParen, "Expect ')' after condition.");

    let then_branch = parser.statement()?;
    let else_branch = if parser.matches(TokenKind::Else) {
        Some(Box::new(parser.statement()?))
    } else {
        None
    };

    Some(Expr::If {
        if_span,
        id: parser.alloc_id(),
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch,
    })
}

fn list_literal(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let bracket = parser.previous.span;
    let mut items = Vec::new();
    if !parser.check(TokenKind::RBracket) {
        loop {
            if parser.check(TokenKind::RBracket) {
                break;
            }
            if let Some(item) = parser.expression() {
                items.push(item);
            }
            if !parser.matches(TokenKind::Comma) {
                break;
            }
        }
    }
    parser.consume(TokenKind::RBracket, "Expect ']' after list items.");
    Some(Expr::List {
        bracket,
        id: parser.alloc_id(),
        items,
    })
}

fn map_literal(parser: &mut Parser<'_>, _can_assign: bool) -> Option<Expr> {
    let brace = parser.previous.span;
    let mut keys = Vec::new();
    let mut values = Vec::new();
    if !parser.check(TokenKind::RBrace) {
        loop {
            if parser.check(TokenKind::RBrace) {
                break;
            }
            let key = parser.expression()?;
            keys.push(key);
            parser.consume(TokenKind::Colon, "Expect ':' after map key.");
            let value = parser.expression()?;
            values.push(value);
            if !parser.matches(TokenKind::Comma) {
                break;
            }
        }
    }
    parser.consume(TokenKind::RBrace, "Expect '}' after map items.");
    Some(Expr::Map {
        brace,
        id: parser.alloc_id(),
        keys,
        values,
    })
}

fn lambda(parser: &mut Parser<'_>) -> Option<Expr> {
    let span = parser.previous.span;
    let generics = if parser.matches(TokenKind::Less) {
        parser.generic_params()
    } else {
        Vec::new()
    };
    parser.consume(TokenKind::LParen, "Expect '(' after fun keyword.");
    let params = parser.parameter_list();
    let return_ty = if parser.matches(TokenKind::Colon) {
        parser.type_annotation()
    } else {
        None
    };
    parser.consume(TokenKind::Arrow, "Expect '=>' after parameters.");

    let body = if parser.matches(TokenKind::LBrace) {
        parser.block_stmts()
    } else {
        // A single-expression body sugars into a block holding a return.
        let expr = parser.expression()?;
        let keyword = parser.previous.span;
        vec![Stmt::Return {
            id: parser.alloc_id(),
            keyword,
            value: Some(expr),
        }]
    };

    Some(Expr::Lambda {
        span,
        id: parser.alloc_id(),
        generics,
        params,
        return_ty,
        body,
    })
}

pub fn parse_program(source: &str) -> Result<Vec<Stmt>, Vec<ParseError>> {
    let mut parser = Parser::new(source);
    let mut stmts = Vec::new();

    while !parser.matches(TokenKind::Eof) {
        if let Some(stmt) = parser.declaration() {
            stmts.push(stmt);
        }
        if parser.panic_mode {
            parser.synchronize();
        }
    }

    if parser.had_error {
        Err(parser.errors)
    } else {
        Ok(stmts)
    }
}

#[cfg(test)]
mod tests {
    use super::parse_program;
    use sable_syntax::{Expr, Literal, Stmt, TypeNode};

    #[test]
    fn parses_var_declarations() {
        let source = r#"
var x: Number = 1;
var name = "sable";
var flag: Bool;
"#;
        let stmts = parse_program(source).expect("parse program");
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn reports_var_without_type_or_initializer() {
        let errors = parse_program("var x;").expect_err("expected parse errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("must provide a type")));
    }

    #[test]
    fn parses_term_and_factor_precedence() {
        let stmts = parse_program("1 + 2 * 3;").expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, sable_syntax::BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { .. }));
    }

    #[test]
    fn pipe_rewrites_into_call_with_prepended_argument() {
        let stmts = parse_program("a |> f(b);").expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        let Expr::Call { callee, args, .. } = expr else {
            panic!("expected call expression");
        };
        assert!(matches!(&**callee, Expr::Variable { name } if name.name == "f"));
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[0], Expr::Variable { name } if name.name == "a"));
        assert!(matches!(&args[1], Expr::Variable { name } if name.name == "b"));
    }

    #[test]
    fn pipe_requires_a_call_on_the_right() {
        let errors = parse_program("a |> b;").expect_err("expected parse errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("Expected function call after pipe")));
    }

    #[test]
    fn reports_invalid_assignment_target() {
        let errors = parse_program("1 + 2 = 3;").expect_err("expected parse errors");
        assert!(errors
            .iter()
            .any(|err| err.message == "Invalid assignment target."));
    }

    #[test]
    fn parses_member_assignment() {
        let stmts = parse_program("p.name = \"x\";").expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr, Expr::Set { .. }));
    }

    #[test]
    fn parses_chained_member_assignment() {
        let stmts = parse_program("a.b.c = 1;").expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        let Expr::Set { object, .. } = expr else {
            panic!("expected set expression");
        };
        assert!(matches!(&**object, Expr::Get { .. }));
    }

    #[test]
    fn parses_class_with_fields_and_methods() {
        let source = r#"
class Point extends Base {
    var x: Number;
    var y: Number;
    fun init(x: Number, y: Number) {
        this.x = x;
        this.y = y;
    }
    fun length(): Number {
        return this.x + this.y;
    }
}
"#;
        let stmts = parse_program(source).expect("parse program");
        let Stmt::Class {
            superclass, body, ..
        } = &stmts[0]
        else {
            panic!("expected class declaration");
        };
        assert_eq!(superclass.as_ref().map(|s| s.name.as_str()), Some("Base"));
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn rejects_self_inheritance() {
        let errors = parse_program("class A extends A {}").expect_err("expected parse errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("can't inherit from itself")));
    }

    #[test]
    fn parses_interface_signatures() {
        let source = r#"
interface HasName {
    var name: String;
    fun greet(loud: Bool): String
}
"#;
        let stmts = parse_program(source).expect("parse program");
        let Stmt::Interface { body, .. } = &stmts[0] else {
            panic!("expected interface declaration");
        };
        assert_eq!(body.len(), 2);
        assert!(matches!(body[1], Stmt::MethodSig { .. }));
    }

    #[test]
    fn parses_generic_function_declaration() {
        let source = r#"
fun id<T>(x: T): T {
    return x;
}
"#;
        let stmts = parse_program(source).expect("parse program");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(func.generics.len(), 1);
        assert!(matches!(
            &func.generics[0],
            TypeNode::GenericParam { name, extends: None, .. } if name.name == "T"
        ));
    }

    #[test]
    fn parses_generic_bound_with_extends() {
        let source = "fun f<T extends Printable>(x: T) {}";
        let stmts = parse_program(source).expect("parse program");
        let Stmt::Function(func) = &stmts[0] else {
            panic!("expected function declaration");
        };
        assert!(matches!(
            &func.generics[0],
            TypeNode::GenericParam { extends: Some(_), .. }
        ));
    }

    #[test]
    fn parses_union_annotation() {
        let stmts = parse_program("var x: Number | Nil = nil;").expect("parse program");
        let Stmt::Var { ty, .. } = &stmts[0] else {
            panic!("expected var declaration");
        };
        assert!(matches!(ty, Some(TypeNode::Union { .. })));
    }

    #[test]
    fn parses_functor_annotations() {
        let stmts =
            parse_program("var f: (Number)=>String = fun(x: Number): String => \"s\";")
                .expect("parse program");
        let Stmt::Var { ty, .. } = &stmts[0] else {
            panic!("expected var declaration");
        };
        let Some(TypeNode::Functor { args, return_ty, .. }) = ty else {
            panic!("expected functor annotation");
        };
        assert_eq!(args.len(), 1);
        assert!(return_ty.is_some());
    }

    #[test]
    fn parses_generic_functor_annotation() {
        let stmts = parse_program("var f: <T>(T)=>T = fun<T>(x: T): T => x;")
            .expect("parse program");
        let Stmt::Var { ty, .. } = &stmts[0] else {
            panic!("expected var declaration");
        };
        assert!(matches!(
            ty,
            Some(TypeNode::Functor { generics, .. }) if generics.len() == 1
        ));
    }

    #[test]
    fn lambda_expression_body_sugars_to_return() {
        let stmts = parse_program("var f = fun(x: Number): Number => x + 1;")
            .expect("parse program");
        let Stmt::Var { init, .. } = &stmts[0] else {
            panic!("expected var declaration");
        };
        let Some(Expr::Lambda { body, .. }) = init else {
            panic!("expected lambda initializer");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0], Stmt::Return { .. }));
    }

    #[test]
    fn parses_if_as_prefix_expression() {
        let source = r#"
if (x > 0) {
    x = x - 1;
} else {
    x = 0;
}
"#;
        let stmts = parse_program(source).expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr, Expr::If { .. }));
    }

    #[test]
    fn parses_for_loop_with_all_clauses() {
        let source = "for (var i = 0; i < 10; i = i + 1) { yield; }";
        let stmts = parse_program(source).expect("parse program");
        let Stmt::For {
            init,
            condition,
            increment,
            ..
        } = &stmts[0]
        else {
            panic!("expected for statement");
        };
        assert!(init.is_some());
        assert!(condition.is_some());
        assert!(increment.is_some());
    }

    #[test]
    fn parses_import_with_alias() {
        let stmts = parse_program("import \"lib/util.sb\" as Util;").expect("parse program");
        let Stmt::Import { path, alias, .. } = &stmts[0] else {
            panic!("expected import statement");
        };
        assert!(matches!(
            path,
            Expr::Literal { value: Literal::Str(s), .. } if s == "lib/util.sb"
        ));
        assert_eq!(alias.name, "Util");
    }

    #[test]
    fn parses_list_and_map_literals() {
        let stmts = parse_program("var xs = [1, 2, 3]; var m = {\"a\": 1, \"b\": 2};")
            .expect("parse program");
        let Stmt::Var { init: Some(Expr::List { items, .. }), .. } = &stmts[0] else {
            panic!("expected list literal");
        };
        assert_eq!(items.len(), 3);
        let Stmt::Var { init: Some(Expr::Map { keys, values, .. }), .. } = &stmts[1] else {
            panic!("expected map literal");
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn parses_yield_with_operand() {
        let stmts = parse_program("yield [1, 0.05];").expect("parse program");
        let Stmt::Expression { expr, .. } = &stmts[0] else {
            panic!("expected expression statement");
        };
        let Expr::Yield { expr: Some(inner), .. } = expr else {
            panic!("expected yield with operand");
        };
        assert!(matches!(**inner, Expr::List { .. }));
    }

    #[test]
    fn parses_atoms() {
        let stmts = parse_program("var status = :ok;").expect("parse program");
        let Stmt::Var { init, .. } = &stmts[0] else {
            panic!("expected var declaration");
        };
        assert!(matches!(
            init,
            Some(Expr::Literal { value: Literal::Atom(name), .. }) if name == "ok"
        ));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let source = r#"
var = 1;
var y: Number = 2;
fun () {}
"#;
        let errors = parse_program(source).expect_err("expected parse errors");
        assert!(errors.len() >= 2);
    }

    #[test]
    fn error_at_end_of_input() {
        let errors = parse_program("var x = ").expect_err("expected parse errors");
        assert!(errors.iter().any(|err| err.lexeme.is_empty()));
    }

    #[test]
    fn skips_comments_and_extra_semicolons() {
        let source = r#"
// leading comment
var x = 1;;;
x = x + 1; // trailing comment
"#;
        assert!(parse_program(source).is_ok());
    }
}
