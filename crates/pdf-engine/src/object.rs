//! PDF value model
//!
//! [`Object`] is the structured view used when authoring objects or reading
//! specific keys. Parsed objects keep their token sequence as well; the
//! `dict_*` helpers edit that sequence in place so that untouched keys are
//! written back byte for byte.

use crate::lexer::Token;
use crate::{PdfError, Result};
use std::ops::Range;

/// Encoding of a string object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hex,
}

/// A PDF value
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Decoded name bytes (without `/`)
    Name(Vec<u8>),
    /// Decoded string bytes
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    /// Indirect reference; generation is always 0
    Reference(u32),
}

/// Insertion-ordered PDF dictionary
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary(Vec<(Vec<u8>, Object)>);

impl Dictionary {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Set a key, replacing an existing value in place
    pub fn set<K: Into<Vec<u8>>, V: Into<Object>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Object)> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn get_name(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Object::as_name)
    }

    pub fn get_integer(&self, key: &[u8]) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    pub fn get_reference(&self, key: &[u8]) -> Option<u32> {
        self.get(key).and_then(Object::as_reference)
    }

    pub fn get_dict(&self, key: &[u8]) -> Option<&Dictionary> {
        self.get(key).and_then(Object::as_dict)
    }

    pub fn get_array(&self, key: &[u8]) -> Option<&[Object]> {
        self.get(key).and_then(Object::as_array)
    }

    /// Whether `/Type` equals `name`
    pub fn type_is(&self, name: &[u8]) -> bool {
        self.get_name(b"Type") == Some(name)
    }
}

impl<'a> FromIterator<(&'a str, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (&'a str, Object)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.set(key, value);
        }
        dict
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<f32> for Object {
    fn from(value: f32) -> Self {
        Object::Real(value as f64)
    }
}

/// String slices convert to names, as in `("Type", "Page".into())`
impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::Name(value.as_bytes().to_vec())
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl Object {
    pub fn reference(number: u32) -> Self {
        Object::Reference(number)
    }

    pub fn name(name: &str) -> Self {
        Object::Name(name.as_bytes().to_vec())
    }

    pub fn string_literal(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Literal)
    }

    pub fn hex_string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Hex)
    }

    /// Text string: literal when ASCII, otherwise UTF-16BE with a byte order mark
    pub fn text_string(text: &str) -> Self {
        if text.is_ascii() {
            return Object::string_literal(text.as_bytes());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::hex_string(bytes)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            Object::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(bytes, _) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<u32> {
        match self {
            Object::Reference(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Parse a complete token sequence into one value
    ///
    /// Errors report the token index as offset; callers holding a byte
    /// position re-anchor the error.
    pub fn from_tokens(tokens: &[Token]) -> Result<Object> {
        let mut pos = 0;
        let value = parse_value(tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(PdfError::syntax(pos, "end of object"));
        }
        Ok(value)
    }

    pub fn to_tokens(&self) -> Vec<Token> {
        let mut out = Vec::new();
        self.push_tokens(&mut out);
        out
    }

    /// Append the serialized form of the value to `out`
    pub fn write(&self, out: &mut Vec<u8>) {
        write_tokens(&self.to_tokens(), out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    fn push_tokens(&self, out: &mut Vec<Token>) {
        match self {
            Object::Null => out.push(Token::keyword("null")),
            Object::Boolean(true) => out.push(Token::keyword("true")),
            Object::Boolean(false) => out.push(Token::keyword("false")),
            Object::Integer(i) => out.push(Token::integer(*i)),
            Object::Real(r) => out.push(Token::Number(format_real(*r).into_bytes())),
            Object::Name(name) => out.push(Token::Name(encode_name(name))),
            Object::String(bytes, StringFormat::Literal) => {
                out.push(Token::Literal(encode_literal(bytes)))
            }
            Object::String(bytes, StringFormat::Hex) => out.push(Token::Hex(encode_hex(bytes))),
            Object::Array(items) => {
                out.push(Token::ArrayStart);
                for item in items {
                    item.push_tokens(out);
                }
                out.push(Token::ArrayEnd);
            }
            Object::Dictionary(dict) => {
                out.push(Token::DictStart);
                for (key, value) in dict.iter() {
                    out.push(Token::Name(encode_name(key)));
                    value.push_tokens(out);
                }
                out.push(Token::DictEnd);
            }
            Object::Reference(number) => {
                out.push(Token::integer(*number as i64));
                out.push(Token::integer(0));
                out.push(Token::keyword("R"));
            }
        }
    }
}

fn parse_value(tokens: &[Token], pos: &mut usize) -> Result<Object> {
    let token = tokens
        .get(*pos)
        .ok_or_else(|| PdfError::syntax(*pos, "value"))?;

    let value = match token {
        Token::Number(_) => {
            if let Some(number) = reference_at(tokens, *pos) {
                *pos += 3;
                return Ok(Object::Reference(number));
            }
            match token.as_integer() {
                Some(i) => Object::Integer(i),
                None => Object::Real(
                    token
                        .as_number()
                        .ok_or_else(|| PdfError::syntax(*pos, "number"))?,
                ),
            }
        }
        Token::Name(raw) => Object::Name(decode_name(raw)),
        Token::Literal(raw) => Object::String(decode_literal(raw), StringFormat::Literal),
        Token::Hex(raw) => Object::String(decode_hex(raw), StringFormat::Hex),
        Token::ArrayStart => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::ArrayEnd) => break,
                    Some(_) => items.push(parse_value(tokens, pos)?),
                    None => return Err(PdfError::syntax(*pos, "']'")),
                }
            }
            Object::Array(items)
        }
        Token::DictStart => {
            *pos += 1;
            let mut dict = Dictionary::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::DictEnd) => break,
                    Some(Token::Name(raw)) => {
                        let key = decode_name(raw);
                        *pos += 1;
                        let value = parse_value(tokens, pos)?;
                        dict.set(key, value);
                    }
                    Some(_) => return Err(PdfError::syntax(*pos, "name key")),
                    None => return Err(PdfError::syntax(*pos, "'>>'")),
                }
            }
            Object::Dictionary(dict)
        }
        Token::Keyword(word) => match word.as_slice() {
            b"true" => Object::Boolean(true),
            b"false" => Object::Boolean(false),
            b"null" => Object::Null,
            _ => return Err(PdfError::syntax(*pos, "value")),
        },
        _ => return Err(PdfError::syntax(*pos, "value")),
    };

    *pos += 1;
    Ok(value)
}

/// `N G R` starting at `pos`
pub(crate) fn reference_at(tokens: &[Token], pos: usize) -> Option<u32> {
    let number = tokens.get(pos)?.as_integer()?;
    tokens.get(pos + 1)?.as_integer()?;
    if !tokens.get(pos + 2)?.is_keyword(b"R") {
        return None;
    }
    u32::try_from(number).ok()
}

/// Exclusive end of the value starting at `start`
pub(crate) fn value_end(tokens: &[Token], start: usize) -> Option<usize> {
    let first = tokens.get(start)?;

    if first.is_opening() {
        let mut depth = 0usize;
        for (i, token) in tokens.iter().enumerate().skip(start) {
            if token.is_opening() {
                depth += 1;
            } else if token.is_closing() {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
        }
        return None;
    }

    if reference_at(tokens, start).is_some() {
        return Some(start + 3);
    }

    Some(start + 1)
}

fn is_dict(tokens: &[Token]) -> bool {
    tokens.first() == Some(&Token::DictStart)
        && tokens.last() == Some(&Token::DictEnd)
        && value_end(tokens, 0) == Some(tokens.len())
}

/// Token range of the value stored under `key` at the top level of a dictionary
pub fn dict_get(tokens: &[Token], key: &[u8]) -> Option<Range<usize>> {
    if !is_dict(tokens) {
        return None;
    }

    let mut i = 1;
    while i < tokens.len() - 1 {
        let Token::Name(raw) = &tokens[i] else {
            return None;
        };
        let value_start = i + 1;
        let end = value_end(tokens, value_start)?;
        if decode_name(raw) == key {
            return Some(value_start..end);
        }
        i = end;
    }

    None
}

/// Replace or append `key` at the top level of a dictionary token sequence
pub fn dict_set(tokens: &mut Vec<Token>, key: &[u8], value: Vec<Token>) -> Result<()> {
    if !is_dict(tokens) {
        return Err(PdfError::syntax(0, "dictionary"));
    }

    match dict_get(tokens, key) {
        Some(range) => {
            tokens.splice(range, value);
        }
        None => {
            let at = tokens.len() - 1;
            let mut entry = Vec::with_capacity(value.len() + 1);
            entry.push(Token::Name(encode_name(key)));
            entry.extend(value);
            tokens.splice(at..at, entry);
        }
    }

    Ok(())
}

/// Remove `key` (and its value) from the top level; returns whether it existed
pub fn dict_remove(tokens: &mut Vec<Token>, key: &[u8]) -> bool {
    match dict_get(tokens, key) {
        Some(range) => {
            tokens.drain(range.start - 1..range.end);
            true
        }
        None => false,
    }
}

/// Serialize tokens with single spaces, omitting them just inside brackets
pub fn write_tokens(tokens: &[Token], out: &mut Vec<u8>) {
    let mut prev: Option<&Token> = None;
    for token in tokens {
        if let Some(prev) = prev {
            if !prev.is_opening() && !token.is_closing() {
                out.push(b' ');
            }
        }
        token.write(out);
        prev = Some(token);
    }
}

pub(crate) fn decode_name(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let Some(byte) = hex_pair(raw[i + 1], raw[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

pub(crate) fn encode_name(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    for &b in name {
        if b <= b' ' || b >= 0x7F || b == b'#' || crate::lexer::is_delimiter(b) {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        } else {
            out.push(b);
        }
    }
    out
}

pub(crate) fn decode_literal(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let b = raw[i];
        i += 1;

        if b == b'\r' {
            if raw.get(i) == Some(&b'\n') {
                i += 1;
            }
            out.push(b'\n');
            continue;
        }

        if b != b'\\' {
            out.push(b);
            continue;
        }

        let Some(&c) = raw.get(i) else {
            break;
        };
        i += 1;

        match c {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut value = (c - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            other => out.push(other),
        }
    }

    out
}

pub(crate) fn encode_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

pub(crate) fn decode_hex(raw: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| b.is_ascii_hexdigit())
        .collect();

    digits
        .chunks(2)
        .map(|pair| hex_pair(pair[0], *pair.get(1).unwrap_or(&b'0')).unwrap_or(0))
        .collect()
}

pub(crate) fn encode_hex(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|b| format!("{b:02X}").into_bytes())
        .collect()
}

fn hex_pair(high: u8, low: u8) -> Option<u8> {
    let h = (high as char).to_digit(16)?;
    let l = (low as char).to_digit(16)?;
    Some((h * 16 + l) as u8)
}

/// Shortest fixed-point form with at most four decimals
pub(crate) fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut text = format!("{value:.4}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn lex(input: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(input, 0);
        let mut out = Vec::new();
        while let Some(token) = lexer.next_token().unwrap() {
            out.push(token);
        }
        out
    }

    fn serialize(tokens: &[Token]) -> String {
        let mut out = Vec::new();
        write_tokens(tokens, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_dictionary_with_reference() {
        let value = Object::from_tokens(&lex(b"<</Type /Page /Parent 3 0 R /Rotate 90>>")).unwrap();
        let dict = value.as_dict().unwrap();
        assert!(dict.type_is(b"Page"));
        assert_eq!(dict.get_reference(b"Parent"), Some(3));
        assert_eq!(dict.get_integer(b"Rotate"), Some(90));
    }

    #[test]
    fn test_parse_array_of_integers_is_not_reference() {
        let value = Object::from_tokens(&lex(b"[0 0 612 792]")).unwrap();
        assert_eq!(
            value,
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ])
        );
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(Object::from_tokens(&lex(b"1 2")).is_err());
    }

    #[test]
    fn test_unbalanced_dictionary() {
        assert!(Object::from_tokens(&lex(b"<</A 1")).is_err());
    }

    #[test]
    fn test_literal_escapes() {
        let value = Object::from_tokens(&lex(br"(a\(b\)\\c\101\n)")).unwrap();
        assert_eq!(value.as_string().unwrap(), b"a(b)\\cA\n");
    }

    #[test]
    fn test_literal_roundtrip_escaping() {
        let value = Object::string_literal(b"x(y)\\z".to_vec());
        assert_eq!(String::from_utf8(value.to_bytes()).unwrap(), r"(x\(y\)\\z)");
    }

    #[test]
    fn test_name_encoding() {
        let value = Object::Name(b"A B#".to_vec());
        assert_eq!(value.to_bytes(), b"/A#20B#23".to_vec());
        let parsed = Object::from_tokens(&lex(b"/A#20B#23")).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_text_string_utf16() {
        let value = Object::text_string("กข");
        assert_eq!(
            value,
            Object::hex_string(vec![0xFE, 0xFF, 0x0E, 0x01, 0x0E, 0x02])
        );
        assert_eq!(value.to_bytes(), b"<FEFF0E010E02>".to_vec());
    }

    #[test]
    fn test_write_spacing() {
        let dict: Dictionary = vec![
            ("Type", "Page".into()),
            (
                "MediaBox",
                vec![0.into(), 0.into(), 595.28.into(), 841.89.into()].into(),
            ),
            ("Parent", Object::reference(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            String::from_utf8(Object::Dictionary(dict).to_bytes()).unwrap(),
            "<</Type /Page /MediaBox [0 0 595.28 841.89] /Parent 1 0 R>>"
        );
    }

    #[test]
    fn test_serialized_tokens_relex_identically() {
        let tokens = lex(b"<< /A [ (x) <00FF> /B ] /C << /D 4 0 R >> >>");
        let text = serialize(&tokens);
        assert_eq!(lex(text.as_bytes()), tokens);
    }

    #[test]
    fn test_dict_get_skips_nested_values() {
        let tokens = lex(b"<</Resources <</Font <</F1 5 0 R>>>> /Contents 7 0 R>>");
        let range = dict_get(&tokens, b"Contents").unwrap();
        assert_eq!(serialize(&tokens[range]), "7 0 R");
        assert!(dict_get(&tokens, b"Font").is_none());
    }

    #[test]
    fn test_dict_set_replaces_in_place() {
        let mut tokens = lex(b"<</Type /Page /Contents 7 0 R /Rotate 0>>");
        dict_set(&mut tokens, b"Contents", lex(b"[7 0 R 9 0 R]")).unwrap();
        assert_eq!(
            serialize(&tokens),
            "<</Type /Page /Contents [7 0 R 9 0 R] /Rotate 0>>"
        );
    }

    #[test]
    fn test_dict_set_appends_missing_key() {
        let mut tokens = lex(b"<</Type /Page>>");
        dict_set(&mut tokens, b"Annots", lex(b"[12 0 R]")).unwrap();
        assert_eq!(serialize(&tokens), "<</Type /Page /Annots [12 0 R]>>");
    }

    #[test]
    fn test_dict_set_rejects_non_dictionary() {
        let mut tokens = lex(b"[1 2]");
        assert!(dict_set(&mut tokens, b"A", lex(b"1")).is_err());
    }

    #[test]
    fn test_dict_remove() {
        let mut tokens = lex(b"<</A 1 /B [2] /C 3>>");
        assert!(dict_remove(&mut tokens, b"B"));
        assert!(!dict_remove(&mut tokens, b"Z"));
        assert_eq!(serialize(&tokens), "<</A 1 /C 3>>");
    }

    #[test]
    fn test_format_real() {
        assert_eq!(format_real(595.28), "595.28");
        assert_eq!(format_real(3.0), "3");
        assert_eq!(format_real(-0.00001), "0");
        assert_eq!(format_real(0.5), "0.5");
        assert_eq!(format_real(f64::NAN), "0");
    }

    #[test]
    fn test_decode_hex_odd_length() {
        assert_eq!(decode_hex(b"41 4"), vec![0x41, 0x40]);
    }
}
