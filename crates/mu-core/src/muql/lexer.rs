//! Hand-rolled MUQL tokenizer.
//!
//! The grammar is eight fixed keyword-led forms with no nesting or operator
//! precedence to speak of, so a small character-at-a-time scanner is enough;
//! there is no need for a parser-combinator dependency.

use crate::error::{MuError, MuResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Num(f64),
    Star,
    Comma,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> MuResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                break;
            };
            let kind = match c {
                b'*' => {
                    self.advance();
                    TokenKind::Star
                }
                b',' => {
                    self.advance();
                    TokenKind::Comma
                }
                b'(' => {
                    self.advance();
                    TokenKind::LParen
                }
                b')' => {
                    self.advance();
                    TokenKind::RParen
                }
                b'=' => {
                    self.advance();
                    TokenKind::Eq
                }
                b'!' => {
                    self.advance();
                    self.expect_byte(b'=', line, column)?;
                    TokenKind::Ne
                }
                b'<' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::Le
                    } else if self.peek() == Some(b'>') {
                        self.advance();
                        TokenKind::Ne
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.advance();
                    if self.peek() == Some(b'=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'\'' | b'"' => self.scan_string(c, line, column)?,
                b'0'..=b'9' => self.scan_number(),
                b'-' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.scan_number(),
                c if is_ident_start(c) => self.scan_ident(),
                other => {
                    return Err(MuError::Syntax {
                        message: format!("unexpected character '{}'", other as char),
                        line,
                        column,
                    })
                }
            };
            tokens.push(Token { kind, line, column });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn expect_byte(&mut self, expected: u8, line: u32, column: u32) -> MuResult<()> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(MuError::Syntax {
                message: format!("expected '{}' after '!'", expected as char),
                line,
                column,
            })
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_string(&mut self, quote: u8, line: u32, column: u32) -> MuResult<TokenKind> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some(c) => value.push(c as char),
                None => {
                    return Err(MuError::Syntax {
                        message: "unterminated string literal".to_string(),
                        line,
                        column,
                    })
                }
            }
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'.') {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        TokenKind::Num(text.parse().unwrap_or(0.0))
    }

    fn scan_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        TokenKind::Ident(text.to_string())
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b':' || c == b'/' || c == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_select_star() {
        let k = kinds("SELECT * FROM functions");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("SELECT".into()),
                TokenKind::Star,
                TokenKind::Ident("FROM".into()),
                TokenKind::Ident("functions".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let k = kinds("complexity > 20");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("complexity".into()),
                TokenKind::Gt,
                TokenKind::Num(20.0),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("a >= 1")[1],
            TokenKind::Ge
        );
        assert_eq!(kinds("a <= 1")[1], TokenKind::Le);
        assert_eq!(kinds("a != 1")[1], TokenKind::Ne);
        assert_eq!(kinds("a <> 1")[1], TokenKind::Ne);
    }

    #[test]
    fn test_string_literal() {
        let k = kinds("name = 'AuthService'");
        assert_eq!(k[2], TokenKind::Str("AuthService".to_string()));
    }

    #[test]
    fn test_dotted_identifier() {
        let k = kinds("OF auth.service.AuthService DEPTH 2");
        assert_eq!(k[1], TokenKind::Ident("auth.service.AuthService".to_string()));
    }

    #[test]
    fn test_unterminated_string_is_syntax_error() {
        let err = Lexer::new("name = 'oops").tokenize().unwrap_err();
        assert!(matches!(err, MuError::Syntax { .. }));
    }

    #[test]
    fn test_unexpected_character_is_syntax_error() {
        let err = Lexer::new("SELECT @ FROM functions").tokenize().unwrap_err();
        assert!(matches!(err, MuError::Syntax { .. }));
    }
}
