//! Tokenizer for subscription expressions.

use super::parser::ParseError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Int32(i32),
    Int64(i64),
    Real64(f64),
    LParen,
    RParen,
    Comma,
    OrOr,
    XorXor,
    AndAnd,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    Caret,
    Amp,
    Shl,
    Shr,
    Ushr,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Tilde,
    Eof,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier \"{name}\""),
            TokenKind::Str(text) => format!("string '{text}'"),
            TokenKind::Int32(value) => format!("number {value}"),
            TokenKind::Int64(value) => format!("number {value}L"),
            TokenKind::Real64(value) => format!("number {value:?}"),
            TokenKind::Eof => "end of expression".to_string(),
            other => format!("\"{}\"", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::OrOr => "||",
            TokenKind::XorXor => "^^",
            TokenKind::AndAnd => "&&",
            TokenKind::Bang => "!",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Amp => "&",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::Ushr => ">>>",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Tilde => "~",
            _ => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    /// 1-based character column of the token start.
    pub(crate) column: usize,
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        chars: text.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }

            let column = self.pos + 1;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    column,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '\'' | '"' => self.string(c)?,
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' || c == '\\' => self.identifier()?,
                _ => self.operator()?,
            };

            tokens.push(Token { kind, column });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            column: self.pos + 1,
            message: message.into(),
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();

        loop {
            match self.peek() {
                None => {
                    self.pos = start;
                    return Err(self.error("Unterminated string"));
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(TokenKind::Str(text));
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped) => text.push(escaped),
                        None => {
                            self.pos = start;
                            return Err(self.error("Unterminated string"));
                        }
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn identifier(&mut self) -> Result<TokenKind, ParseError> {
        let mut name = String::new();

        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                let escaped = self
                    .peek()
                    .ok_or_else(|| self.error("Backslash at end of identifier"))?;
                name.push(escaped);
            } else if is_identifier_char(c) {
                name.push(c);
            } else {
                break;
            }
            self.pos += 1;
        }

        Ok(TokenKind::Ident(name))
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits = self.take_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(self.error("Missing hex digits"));
            }
            let kind = if self.take_long_suffix() {
                u64::from_str_radix(&digits, 16)
                    .map(|value| TokenKind::Int64(value as i64))
                    .map_err(|_| self.number_error(start, "Hex number too large"))?
            } else {
                u32::from_str_radix(&digits, 16)
                    .map(|value| TokenKind::Int32(value as i32))
                    .map_err(|_| self.number_error(start, "Hex number too large"))?
            };
            return self.end_number(kind);
        }

        let mut text = self.take_while(|c| c.is_ascii_digit());
        let mut real = false;

        if self.peek() == Some('.') {
            if !self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
                return Err(self.error("Missing digits after decimal point"));
            }
            self.pos += 1;
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            real = true;
        }

        if real && matches!(self.peek(), Some('e' | 'E')) {
            self.pos += 1;
            text.push('e');
            if let Some(sign @ ('+' | '-')) = self.peek() {
                self.pos += 1;
                text.push(sign);
            }
            let exponent = self.take_while(|c| c.is_ascii_digit());
            if exponent.is_empty() {
                return Err(self.error("Missing exponent digits"));
            }
            text.push_str(&exponent);
        }

        let kind = if real {
            text.parse::<f64>()
                .map(TokenKind::Real64)
                .map_err(|_| self.number_error(start, "Invalid real number"))?
        } else if self.take_long_suffix() {
            text.parse::<i64>()
                .map(TokenKind::Int64)
                .map_err(|_| self.number_error(start, "Number too large for int64"))?
        } else {
            text.parse::<i32>()
                .map(TokenKind::Int32)
                .map_err(|_| self.number_error(start, "Number too large for int32"))?
        };

        self.end_number(kind)
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut taken = String::new();
        while let Some(c) = self.peek().filter(|c| accept(*c)) {
            taken.push(c);
            self.pos += 1;
        }
        taken
    }

    fn take_long_suffix(&mut self) -> bool {
        if matches!(self.peek(), Some('L' | 'l')) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn end_number(&self, kind: TokenKind) -> Result<TokenKind, ParseError> {
        match self.peek() {
            Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => {
                Err(self.error(format!("Invalid character \"{c}\" after number")))
            }
            _ => Ok(kind),
        }
    }

    fn number_error(&self, start: usize, message: &str) -> ParseError {
        ParseError::Syntax {
            column: start + 1,
            message: message.to_string(),
        }
    }

    fn operator(&mut self) -> Result<TokenKind, ParseError> {
        let first = self.peek().unwrap_or_default();
        let second = self.peek_at(1);
        let third = self.peek_at(2);

        let (kind, len) = match (first, second, third) {
            ('(', _, _) => (TokenKind::LParen, 1),
            (')', _, _) => (TokenKind::RParen, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            ('|', Some('|'), _) => (TokenKind::OrOr, 2),
            ('|', _, _) => (TokenKind::Pipe, 1),
            ('^', Some('^'), _) => (TokenKind::XorXor, 2),
            ('^', _, _) => (TokenKind::Caret, 1),
            ('&', Some('&'), _) => (TokenKind::AndAnd, 2),
            ('&', _, _) => (TokenKind::Amp, 1),
            ('!', Some('='), _) => (TokenKind::NotEq, 2),
            ('!', _, _) => (TokenKind::Bang, 1),
            ('=', Some('='), _) => (TokenKind::EqEq, 2),
            ('<', Some('<'), _) => (TokenKind::Shl, 2),
            ('<', Some('='), _) => (TokenKind::Le, 2),
            ('<', _, _) => (TokenKind::Lt, 1),
            ('>', Some('>'), Some('>')) => (TokenKind::Ushr, 3),
            ('>', Some('>'), _) => (TokenKind::Shr, 2),
            ('>', Some('='), _) => (TokenKind::Ge, 2),
            ('>', _, _) => (TokenKind::Gt, 1),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('~', _, _) => (TokenKind::Tilde, 1),
            (c, _, _) => return Err(self.error(format!("Unexpected character \"{c}\""))),
        };

        self.pos += len;
        Ok(kind)
    }
}

/// Characters allowed after the first character of an identifier.
fn is_identifier_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && !matches!(c, '"' | '\'' | '(' | ')' | ',' | '[' | ']' | '\\')
}
