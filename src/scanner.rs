//! Byte-oriented lexer.
//!
//! [`Scanner`] is an iterator of `Result<Token, LoxError>`: a bad character
//! yields one `Err` and scanning carries on, so callers see every lexical
//! error in a file.  Exactly one `EOF` token ends the stream.
//!
//! Lexemes borrow from the source; only string and number literals are
//! decoded into owned values.  Keywords come from a `phf` table and line
//! comments are skipped with `memchr`.

use std::iter::FusedIterator;

use log::{debug, info};
use memchr::memchr;
use phf::phf_map;

use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};

static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"      => TokenType::AND,
    b"break"    => TokenType::BREAK,
    b"class"    => TokenType::CLASS,
    b"continue" => TokenType::CONTINUE,
    b"else"     => TokenType::ELSE,
    b"false"    => TokenType::FALSE,
    b"fun"      => TokenType::FUN,
    b"for"      => TokenType::FOR,
    b"if"       => TokenType::IF,
    b"nil"      => TokenType::NIL,
    b"or"       => TokenType::OR,
    b"print"    => TokenType::PRINT,
    b"return"   => TokenType::RETURN,
    b"super"    => TokenType::SUPER,
    b"this"     => TokenType::THIS,
    b"true"     => TokenType::TRUE,
    b"var"      => TokenType::VAR,
    b"while"    => TokenType::WHILE,
};

pub struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    /// First byte of the lexeme being scanned.
    start: usize,
    /// Next byte to look at.
    pos: usize,
    line: usize,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        info!("Scanner created over {} bytes", text.len());

        Self {
            text,
            bytes: text.as_bytes(),
            start: 0,
            pos: 0,
            line: 1,
            done: false,
        }
    }

    /// Scan the whole input, collecting every lexical error instead of
    /// stopping at the first one.
    pub fn scan_all(self) -> std::result::Result<Vec<Token<'a>>, Vec<LoxError>> {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        for result in self {
            match result {
                Ok(token) => tokens.push(token),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(tokens)
        } else {
            Err(errors)
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn bump(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        b
    }

    /// Byte `offset` positions ahead, or `0` past the end.
    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn eat(&mut self, expected: u8) -> bool {
        let hit = self.peek_at(0) == expected;
        if hit {
            self.pos += 1;
        }
        hit
    }

    /// `long` when the next byte is `=`, `short` otherwise.
    fn with_equal(&mut self, long: TokenType, short: TokenType) -> TokenType {
        if self.eat(b'=') {
            long
        } else {
            short
        }
    }

    /// Scans one lexeme.  `Ok(None)` means whitespace or a comment.
    fn scan_token(&mut self) -> Result<Option<TokenType>> {
        let kind = match self.bump() {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,

            b'!' => self.with_equal(TokenType::BANG_EQUAL, TokenType::BANG),
            b'=' => self.with_equal(TokenType::EQUAL_EQUAL, TokenType::EQUAL),
            b'<' => self.with_equal(TokenType::LESS_EQUAL, TokenType::LESS),
            b'>' => self.with_equal(TokenType::GREATER_EQUAL, TokenType::GREATER),

            b'/' if self.eat(b'/') => {
                self.pos = match memchr(b'\n', &self.bytes[self.pos..]) {
                    Some(offset) => self.pos + offset,
                    None => self.bytes.len(),
                };
                return Ok(None);
            }
            b'/' => TokenType::SLASH,

            b' ' | b'\r' | b'\t' => return Ok(None),

            b'\n' => {
                self.line += 1;
                return Ok(None);
            }

            b'"' => self.string()?,

            b'0'..=b'9' => self.number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),

            _ => {
                // Step over the whole character so the next lexeme starts
                // on a char boundary.
                let ch = self.text[self.start..]
                    .chars()
                    .next()
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.pos = self.start + ch.len_utf8();

                return Err(LoxError::lex(
                    self.line,
                    format!("Unexpected character: {}", ch),
                ));
            }
        };

        Ok(Some(kind))
    }

    /// Body of a `"..."` literal.  Strings may span lines.
    fn string(&mut self) -> Result<TokenType> {
        while !self.at_end() && self.peek_at(0) != b'"' {
            if self.bump() == b'\n' {
                self.line += 1;
            }
        }

        if self.at_end() {
            return Err(LoxError::lex(self.line, "Unterminated string."));
        }

        self.pos += 1;

        let contents = &self.text[self.start + 1..self.pos - 1];
        Ok(TokenType::STRING(contents.to_owned()))
    }

    /// `123` or `123.45`; a trailing `.` is left for the next token.
    fn number(&mut self) -> TokenType {
        self.skip_digits();

        if self.peek_at(0) == b'.' && self.peek_at(1).is_ascii_digit() {
            self.pos += 1;
            self.skip_digits();
        }

        let digits = &self.text[self.start..self.pos];
        TokenType::NUMBER(digits.parse().unwrap_or(0.0))
    }

    fn skip_digits(&mut self) {
        while self.peek_at(0).is_ascii_digit() {
            self.pos += 1;
        }
    }

    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek_at(0), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.pos += 1;
        }

        KEYWORDS
            .get(&self.bytes[self.start..self.pos])
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while !self.at_end() {
            self.start = self.pos;

            match self.scan_token() {
                Ok(Some(kind)) => {
                    let lexeme = &self.text[self.start..self.pos];
                    debug!("Scanned {:?} on line {}", kind, self.line);
                    return Some(Ok(Token::new(kind, lexeme, self.line)));
                }
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }

        self.done = true;
        Some(Ok(Token::new(TokenType::EOF, "", self.line)))
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_does_not_swallow_trailing_dot() {
        let kinds: Vec<TokenType> = Scanner::new("12.")
            .filter_map(|r| r.ok())
            .map(|t| t.token_type)
            .collect();

        assert_eq!(kinds, vec![TokenType::NUMBER(12.0), TokenType::DOT, TokenType::EOF]);
    }

    #[test]
    fn eof_is_emitted_once() {
        let mut scanner = Scanner::new("");
        assert!(matches!(scanner.next(), Some(Ok(Token { token_type: TokenType::EOF, .. }))));
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn multiline_string_advances_line() {
        let tokens = Scanner::new("\"a\nb\" x").scan_all().expect("valid input");
        assert_eq!(tokens[1].lexeme, "x");
        assert_eq!(tokens[1].line, 2);
    }
}
