//! Tokenizer for template expressions

use crate::template::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Pipe,
    Tilde,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Split an expression into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            // After a dot the digits are a path segment, so `a.0.1` stays two indexes
            let is_float = tokens.last() != Some(&Token::Dot)
                && pos + 1 < chars.len()
                && chars[pos] == '.'
                && chars[pos + 1].is_ascii_digit();
            if is_float {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let token = if is_float {
                text.parse::<f64>().map(Token::Float).ok()
            } else {
                text.parse::<i64>().map(Token::Int).ok()
            };
            match token {
                Some(token) => tokens.push(token),
                None => return Err(syntax(source, format!("invalid number '{}'", text))),
            }
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = read_string(&chars, pos, source)?;
            tokens.push(Token::Str(text));
            pos = next;
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            ('/', Some('/')) => (Token::SlashSlash, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('.', _) => (Token::Dot, 1),
            ('|', _) => (Token::Pipe, 1),
            ('~', _) => (Token::Tilde, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            _ => return Err(syntax(source, format!("unexpected character '{}'", c))),
        };
        tokens.push(token);
        pos += width;
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize, source: &str) -> Result<(String, usize), TemplateError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            c if c == quote => return Ok((text, pos + 1)),
            '\\' => {
                let escaped = match chars.get(pos + 1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some(other) => *other,
                    None => break,
                };
                text.push(escaped);
                pos += 2;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }

    Err(syntax(source, "unterminated string literal".to_string()))
}

fn syntax(source: &str, message: String) -> TemplateError {
    TemplateError::Syntax {
        expression: source.to_string(),
        message,
    }
}
