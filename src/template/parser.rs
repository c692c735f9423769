//! Recursive-descent parser for template expressions

use crate::template::lexer::{tokenize, Token};
use crate::template::TemplateError;
use serde_json::Value;

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// A call to a named function; filters desugar to calls
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

/// Parse a complete expression
pub fn parse(source: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };

    if parser.tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }

    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(&format!("unexpected token {:?}", token)));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(0, keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_keyword(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Ident(name)) if name == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<(), TemplateError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", expected)))
        }
    }

    fn error(&self, message: &str) -> TemplateError {
        TemplateError::Syntax {
            expression: self.source.to_string(),
            message: message.to_string(),
        }
    }

    fn expression(&mut self) -> Result<Expr, TemplateError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_keyword("not") {
            let operand = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.concat()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Ident(name)) if name == "in" => BinaryOp::In,
                Some(Token::Ident(name)) if name == "not" && self.is_keyword(1, "in") => {
                    self.pos += 1;
                    BinaryOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            let right = self.concat()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn concat(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.additive()?;
        while self.eat(&Token::Tilde) {
            let right = self.additive()?;
            left = Expr::Binary(BinaryOp::Concat, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::SlashSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        if self.eat(&Token::Plus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    expr = match self.advance() {
                        Some(Token::Ident(name)) => Expr::Attr(Box::new(expr), name),
                        Some(Token::Int(index)) => {
                            Expr::Index(Box::new(expr), Box::new(Expr::Literal(index.into())))
                        }
                        _ => return Err(self.error("expected attribute name after '.'")),
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::LParen) => {
                    let name = match expr {
                        Expr::Name(name) => name,
                        _ => return Err(self.error("only named functions can be called")),
                    };
                    self.pos += 1;
                    let (args, kwargs) = self.arguments()?;
                    expr = Expr::Call { name, args, kwargs };
                }
                Some(Token::Pipe) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(self.error("expected filter name after '|'")),
                    };
                    let (mut args, kwargs) = if self.eat(&Token::LParen) {
                        self.arguments()?
                    } else {
                        (Vec::new(), Vec::new())
                    };
                    args.insert(0, expr);
                    expr = Expr::Call { name, args, kwargs };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parse call arguments after the opening parenthesis
    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), TemplateError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        if self.eat(&Token::RParen) {
            return Ok((args, kwargs));
        }

        loop {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(name)), Some(Token::Assign)) => Some(name.clone()),
                _ => None,
            };

            if let Some(name) = keyword {
                self.pos += 2;
                kwargs.push((name, self.expression()?));
            } else if kwargs.is_empty() {
                args.push(self.expression()?);
            } else {
                return Err(self.error("positional argument after keyword argument"));
            }

            if self.eat(&Token::RParen) {
                break;
            }
            self.expect(Token::Comma)?;
        }

        Ok((args, kwargs))
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(self.error("unexpected end of expression")),
        };

        match token {
            Token::Int(value) => Ok(Expr::Literal(value.into())),
            Token::Float(value) => serde_json::Number::from_f64(value)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.error("invalid float literal")),
            Token::Str(value) => Ok(Expr::Literal(Value::String(value))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "null" | "none" | "None" => Expr::Literal(Value::Null),
                "and" | "or" | "not" | "in" => {
                    return Err(self.error(&format!("unexpected keyword '{}'", name)))
                }
                _ => Expr::Name(name),
            }),
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                    }
                }
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(Token::Colon)?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                    }
                }
                Ok(Expr::Map(entries))
            }
            other => Err(self.error(&format!("unexpected token {:?}", other))),
        }
    }
}
