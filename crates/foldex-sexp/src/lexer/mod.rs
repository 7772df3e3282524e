//! Expression lexer.
//!
//! Breaks expression text into tokens for the parser. Whitespace and
//! `;` comments (to end of line) are skipped between tokens.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Expression lexer state.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips whitespace and comments.
    pub fn skip_blanks(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.advance();
            } else if b == b';' {
                while let Some(c) = self.advance() {
                    if c == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Peeks at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token<'a>> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        self.skip_blanks();

        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'"' => self.read_string(),
            b'#' => self.read_hash_literal(),
            b'0'..=b'9' => self.read_int(),
            b'-' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.read_int(),
            _ if is_symbol_char(byte) => Ok(Token::Symbol(self.read_symbol())),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    /// Reads a double-quoted string.
    fn read_string(&mut self) -> Result<Token<'a>> {
        self.advance(); // Skip opening quote

        let mut result = String::new();
        let mut start = self.pos;

        loop {
            match self.advance() {
                Some(b'"') => {
                    result.push_str(&self.input[start..self.pos - 1]);
                    break;
                }
                Some(b'\\') => {
                    result.push_str(&self.input[start..self.pos - 1]);
                    match self.advance() {
                        Some(b'"') => result.push('"'),
                        Some(b'\\') => result.push('\\'),
                        Some(b'n') => result.push('\n'),
                        Some(b't') => result.push('\t'),
                        Some(c) => {
                            return Err(self.error(&format!("Invalid escape: \\{}", c as char)));
                        }
                        None => return Err(self.error("Unexpected end of input in string")),
                    }
                    start = self.pos;
                }
                Some(_) => {}
                None => return Err(self.error("Unexpected end of input in string")),
            }
        }

        Ok(Token::Str(result))
    }

    /// Reads `#t`, `#f` or a `#@seconds` time literal.
    fn read_hash_literal(&mut self) -> Result<Token<'a>> {
        self.advance(); // Skip #

        match self.advance() {
            Some(b't') if self.at_delimiter() => Ok(Token::Bool(true)),
            Some(b'f') if self.at_delimiter() => Ok(Token::Bool(false)),
            Some(b'@') => match self.read_int()? {
                Token::Int(secs) => Ok(Token::Time(secs)),
                _ => Err(self.error("Invalid time literal")),
            },
            _ => Err(self.error("Invalid # literal")),
        }
    }

    /// Reads an integer, optionally negative.
    fn read_int(&mut self) -> Result<Token<'a>> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.advance();
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }

        if !self.at_delimiter() {
            return Err(self.error("Invalid number"));
        }

        self.input[start..self.pos]
            .parse()
            .map(Token::Int)
            .map_err(|_| self.error("Number out of range"))
    }

    fn read_symbol(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_symbol_char) {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    fn at_delimiter(&self) -> bool {
        self.peek()
            .is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b';' | b'"'))
    }

    /// Creates a parse error at the current position.
    #[must_use]
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }
}

/// Returns true if the byte may appear inside a symbol.
#[must_use]
pub const fn is_symbol_char(b: u8) -> bool {
    !b.is_ascii_whitespace() && !b.is_ascii_control() && !matches!(b, b'(' | b')' | b'"' | b';' | b'#')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_call_form() {
        assert_eq!(
            tokens(r#"(system-flag "Seen")"#),
            vec![
                Token::LParen,
                Token::Symbol("system-flag"),
                Token::Str("Seen".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            tokens("42 -7 #t #f #@86400 - <"),
            vec![
                Token::Int(42),
                Token::Int(-7),
                Token::Bool(true),
                Token::Bool(false),
                Token::Time(86400),
                Token::Symbol("-"),
                Token::Symbol("<"),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a \"quoted\" \\ word""#),
            vec![Token::Str(r#"a "quoted" \ word"#.to_string())]
        );
    }

    #[test]
    fn test_non_ascii_string() {
        assert_eq!(tokens("\"héllo\""), vec![Token::Str("héllo".to_string())]);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("; leading\n(and ; trailing\n #t)"),
            vec![
                Token::LParen,
                Token::Symbol("and"),
                Token::Bool(true),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"open");
        let err = lexer.next_token().unwrap_err();
        assert!(matches!(err, Error::Parse { position: 5, .. }));
    }

    #[test]
    fn test_bad_number() {
        let mut lexer = Lexer::new("12abc");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_bad_hash() {
        let mut lexer = Lexer::new("#x");
        assert!(lexer.next_token().is_err());
        let mut lexer = Lexer::new("#true");
        assert!(lexer.next_token().is_err());
    }
}
