//! PDF tokenizer
//!
//! Splits a byte window into syntax tokens. Tokens keep their raw bytes so
//! that a token sequence can be written back without reinterpretation.

use crate::{PdfError, Result};

/// A lexical unit of PDF syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Name, raw bytes after the `/` (still `#xx` encoded)
    Name(Vec<u8>),
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `{`
    BraceOpen,
    /// `}`
    BraceClose,
    /// Literal string, raw bytes between the outer parentheses
    Literal(Vec<u8>),
    /// Hex string, raw bytes between `<` and `>`
    Hex(Vec<u8>),
    /// Integer or real, raw text
    Number(Vec<u8>),
    /// Bare keyword (`obj`, `R`, `true`, `null`, `trailer`, ...)
    Keyword(Vec<u8>),
}

impl Token {
    pub fn keyword(word: &str) -> Self {
        Token::Keyword(word.as_bytes().to_vec())
    }

    pub fn integer(value: i64) -> Self {
        Token::Number(value.to_string().into_bytes())
    }

    pub fn is_keyword(&self, word: &[u8]) -> bool {
        matches!(self, Token::Keyword(w) if w.as_slice() == word)
    }

    /// Integer value of a numeric token without a fractional part
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Token::Number(raw) if !raw.contains(&b'.') => {
                std::str::from_utf8(raw).ok()?.parse().ok()
            }
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Token::Number(raw) => {
                let text = std::str::from_utf8(raw).ok()?;
                // A bare "." or "-" is never produced by the lexer, but "-.5" is valid
                text.parse::<f64>()
                    .ok()
                    .or_else(|| format!("0{text}").parse().ok())
            }
            _ => None,
        }
    }

    /// Opens a nested container (`<<`, `[` or `{`)
    pub fn is_opening(&self) -> bool {
        matches!(
            self,
            Token::DictStart | Token::ArrayStart | Token::BraceOpen
        )
    }

    /// Closes a nested container (`>>`, `]` or `}`)
    pub fn is_closing(&self) -> bool {
        matches!(self, Token::DictEnd | Token::ArrayEnd | Token::BraceClose)
    }

    /// Append the token's byte form to `out`
    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            Token::Name(raw) => {
                out.push(b'/');
                out.extend_from_slice(raw);
            }
            Token::DictStart => out.extend_from_slice(b"<<"),
            Token::DictEnd => out.extend_from_slice(b">>"),
            Token::ArrayStart => out.push(b'['),
            Token::ArrayEnd => out.push(b']'),
            Token::BraceOpen => out.push(b'{'),
            Token::BraceClose => out.push(b'}'),
            Token::Literal(raw) => {
                out.push(b'(');
                out.extend_from_slice(raw);
                out.push(b')');
            }
            Token::Hex(raw) => {
                out.push(b'<');
                out.extend_from_slice(raw);
                out.push(b'>');
            }
            Token::Number(raw) | Token::Keyword(raw) => out.extend_from_slice(raw),
        }
    }
}

/// Keyword that ended a [`Lexer::scan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `endobj`
    EndObj,
    /// `stream`; `data_start` is the first payload byte after the EOL
    Stream { data_start: usize },
    /// `startxref`
    StartXRef,
    /// End of the input window
    Eof,
}

/// Tokens collected up to a terminating keyword
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub tokens: Vec<Token>,
    pub terminator: Terminator,
    /// Byte offset of the terminating keyword
    pub offset: usize,
    /// Byte offset just past the terminator (payload start for streams)
    pub end: usize,
}

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn is_numeric(raw: &[u8]) -> bool {
    let digits = raw.strip_prefix(b"+").or_else(|| raw.strip_prefix(b"-")).unwrap_or(raw);
    let dots = digits.iter().filter(|&&b| b == b'.').count();
    let has_digit = digits.iter().any(|b| b.is_ascii_digit());
    has_digit && dots <= 1 && digits.iter().all(|&b| b == b'.' || b.is_ascii_digit())
}

/// Tokenizer over an in-memory buffer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer positioned at `pos`
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(&c) = self.data.get(self.pos) {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Read the next token, or `None` at the end of the input
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();

        let start = self.pos;
        let b = match self.data.get(start) {
            Some(&b) => b,
            None => return Ok(None),
        };

        let token = match b {
            b'/' => {
                let end = self.regular_run(start + 1);
                self.pos = end;
                Token::Name(self.data[start + 1..end].to_vec())
            }
            b'(' => self.read_literal(start)?,
            b'<' => {
                if self.data.get(start + 1) == Some(&b'<') {
                    self.pos = start + 2;
                    Token::DictStart
                } else {
                    self.read_hex(start)?
                }
            }
            b'>' => {
                if self.data.get(start + 1) == Some(&b'>') {
                    self.pos = start + 2;
                    Token::DictEnd
                } else {
                    return Err(PdfError::syntax(start, "'>>'"));
                }
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'{' => {
                self.pos += 1;
                Token::BraceOpen
            }
            b'}' => {
                self.pos += 1;
                Token::BraceClose
            }
            b')' => return Err(PdfError::syntax(start, "matching '(' before ')'")),
            b'0'..=b'9' | b'+' | b'-' | b'.' => {
                let end = self.regular_run(start);
                let raw = &self.data[start..end];
                if !is_numeric(raw) {
                    return Err(PdfError::syntax(start, "numeric token"));
                }
                self.pos = end;
                Token::Number(raw.to_vec())
            }
            _ => {
                let end = self.regular_run(start);
                self.pos = end;
                Token::Keyword(self.data[start..end].to_vec())
            }
        };

        Ok(Some(token))
    }

    /// Read the next token and the offset it started at
    pub fn next_token_with_offset(&mut self) -> Result<Option<(usize, Token)>> {
        self.skip_whitespace();
        let offset = self.pos;
        Ok(self.next_token()?.map(|token| (offset, token)))
    }

    /// Read a token that must be present
    pub fn expect_token(&mut self, expected: &str) -> Result<Token> {
        self.skip_whitespace();
        let offset = self.pos;
        self.next_token()?
            .ok_or_else(|| PdfError::syntax(offset, expected))
    }

    pub fn expect_keyword(&mut self, word: &str) -> Result<()> {
        self.skip_whitespace();
        let offset = self.pos;
        match self.next_token()? {
            Some(token) if token.is_keyword(word.as_bytes()) => Ok(()),
            _ => Err(PdfError::syntax(offset, format!("keyword '{word}'"))),
        }
    }

    pub fn expect_integer(&mut self) -> Result<i64> {
        self.skip_whitespace();
        let offset = self.pos;
        self.next_token()?
            .and_then(|token| token.as_integer())
            .ok_or_else(|| PdfError::syntax(offset, "integer"))
    }

    /// Collect tokens until `endobj`, `stream`, `startxref` or the end of input
    pub fn scan(&mut self) -> Result<Scan> {
        let mut tokens = Vec::new();

        loop {
            let (offset, token) = match self.next_token_with_offset()? {
                Some(next) => next,
                None => {
                    return Ok(Scan {
                        tokens,
                        terminator: Terminator::Eof,
                        offset: self.pos,
                        end: self.pos,
                    })
                }
            };

            if let Token::Keyword(word) = &token {
                let terminator = match word.as_slice() {
                    b"endobj" => Some(Terminator::EndObj),
                    b"startxref" => Some(Terminator::StartXRef),
                    b"stream" => {
                        let data_start = self.stream_data_start();
                        self.pos = data_start;
                        Some(Terminator::Stream { data_start })
                    }
                    _ => None,
                };

                if let Some(terminator) = terminator {
                    return Ok(Scan {
                        tokens,
                        terminator,
                        offset,
                        end: self.pos,
                    });
                }
            }

            tokens.push(token);
        }
    }

    /// Payload start after a `stream` keyword: LF or CRLF is consumed
    fn stream_data_start(&self) -> usize {
        match (self.data.get(self.pos), self.data.get(self.pos + 1)) {
            (Some(b'\r'), Some(b'\n')) => self.pos + 2,
            (Some(b'\n'), _) => self.pos + 1,
            _ => self.pos,
        }
    }

    fn regular_run(&self, from: usize) -> usize {
        let mut end = from;
        while end < self.data.len() && is_regular(self.data[end]) {
            end += 1;
        }
        end
    }

    fn read_literal(&mut self, start: usize) -> Result<Token> {
        let mut depth = 1usize;
        let mut i = start + 1;

        loop {
            match self.data.get(i) {
                None => return Err(PdfError::syntax(start, "closing ')' of literal string")),
                Some(b'\\') => i += 2,
                Some(b'(') => {
                    depth += 1;
                    i += 1;
                }
                Some(b')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    i += 1;
                }
                Some(_) => i += 1,
            }
        }

        self.pos = i + 1;
        Ok(Token::Literal(self.data[start + 1..i].to_vec()))
    }

    fn read_hex(&mut self, start: usize) -> Result<Token> {
        let mut i = start + 1;

        loop {
            match self.data.get(i) {
                None => return Err(PdfError::syntax(start, "closing '>' of hex string")),
                Some(b'>') => break,
                Some(&b) if b.is_ascii_hexdigit() || is_whitespace(b) => i += 1,
                Some(_) => return Err(PdfError::syntax(i, "hex digit")),
            }
        }

        self.pos = i + 1;
        Ok(Token::Hex(self.data[start + 1..i].to_vec()))
    }
}
