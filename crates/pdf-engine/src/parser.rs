//! Object parser
//!
//! Reads one `N G obj ... endobj` object at a byte offset and expands
//! compressed `/ObjStm` containers into standalone objects.

use crate::filter::decode_stream;
use crate::lexer::{Lexer, Terminator, Token};
use crate::object::{dict_get, dict_remove, dict_set, reference_at, Dictionary, Object};
use crate::{PdfError, Result};

/// One logical object: dictionary (or other value) tokens plus optional stream payload
#[derive(Debug, Clone, PartialEq)]
pub struct PdfObject {
    pub number: u32,
    /// Value tokens, written back verbatim
    pub tokens: Vec<Token>,
    /// Raw (still encoded) stream bytes
    pub stream: Option<Vec<u8>>,
    /// Byte offset of the `N 0 obj` header in the source; `None` for authored
    /// objects and object stream members
    pub source_offset: Option<usize>,
    placeholder: bool,
}

impl PdfObject {
    pub fn new(number: u32, value: &Object) -> Self {
        Self {
            number,
            tokens: value.to_tokens(),
            stream: None,
            source_offset: None,
            placeholder: false,
        }
    }

    pub fn with_stream(number: u32, dict: &Dictionary, data: Vec<u8>) -> Self {
        Self {
            number,
            tokens: Object::Dictionary(dict.clone()).to_tokens(),
            stream: Some(data),
            source_offset: None,
            placeholder: false,
        }
    }

    /// Placeholder filling a numbering gap; serialized as `null`
    pub fn stub(number: u32) -> Self {
        Self {
            number,
            tokens: vec![Token::keyword("null")],
            stream: None,
            source_offset: None,
            placeholder: true,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.placeholder
    }

    /// Structured view of the value
    pub fn value(&self) -> Result<Object> {
        Object::from_tokens(&self.tokens).map_err(|err| match err {
            PdfError::MalformedSyntax { expected, .. } => PdfError::MalformedSyntax {
                offset: self.source_offset.unwrap_or(0),
                expected: format!("{expected} in object {}", self.number),
            },
            other => other,
        })
    }

    /// The value as a dictionary, if it is one
    pub fn dictionary(&self) -> Option<Dictionary> {
        match self.value().ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Value stored under a top-level dictionary key
    pub fn get(&self, key: &[u8]) -> Option<Object> {
        let range = dict_get(&self.tokens, key)?;
        Object::from_tokens(&self.tokens[range]).ok()
    }

    pub fn get_reference(&self, key: &[u8]) -> Option<u32> {
        self.get(key).and_then(|v| v.as_reference())
    }

    pub fn get_name(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.get(key)? {
            Object::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_type(&self, name: &[u8]) -> bool {
        self.get_name(b"Type").as_deref() == Some(name)
    }

    /// Set a top-level key, leaving every other token untouched
    pub fn set(&mut self, key: &[u8], value: &Object) -> Result<()> {
        dict_set(&mut self.tokens, key, value.to_tokens())
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        dict_remove(&mut self.tokens, key)
    }

    /// Stream payload with filters undone
    pub fn decoded_stream(&self) -> Result<Option<Vec<u8>>> {
        let Some(data) = &self.stream else {
            return Ok(None);
        };
        let dict = self.dictionary().unwrap_or_default();
        decode_stream(&dict, data).map(Some)
    }

    /// Every object number referenced by `N G R` in the value tokens
    pub fn references(&self) -> Vec<u32> {
        (0..self.tokens.len())
            .filter_map(|i| reference_at(&self.tokens, i))
            .collect()
    }
}

/// Parse the object whose `N G obj` header starts at `offset`
///
/// `length_of` resolves an indirect `/Length` reference to its integer value.
pub fn parse_object_at(
    data: &[u8],
    offset: usize,
    length_of: &dyn Fn(u32) -> Option<usize>,
) -> Result<PdfObject> {
    if offset >= data.len() {
        return Err(PdfError::syntax(offset, "object header inside the file"));
    }

    let mut lexer = Lexer::new(data, offset);
    let number = lexer.expect_integer()?;
    let number = u32::try_from(number).map_err(|_| PdfError::syntax(offset, "object number"))?;
    lexer.expect_integer()?;
    lexer.expect_keyword("obj")?;

    let scan = lexer.scan()?;

    match scan.terminator {
        Terminator::EndObj => Ok(PdfObject {
            number,
            tokens: scan.tokens,
            stream: None,
            source_offset: Some(offset),
            placeholder: false,
        }),
        Terminator::Stream { data_start } => {
            let data_end = stream_end(data, data_start, &scan.tokens, length_of)?;

            lexer.seek(data_end);
            lexer.expect_keyword("endstream")?;
            let after = lexer.position();
            if lexer.expect_keyword("endobj").is_err() {
                log::warn!("object {number}: missing endobj after endstream at byte {after}");
            }

            Ok(PdfObject {
                number,
                tokens: scan.tokens,
                stream: Some(data[data_start..data_end].to_vec()),
                source_offset: Some(offset),
                placeholder: false,
            })
        }
        Terminator::StartXRef | Terminator::Eof => Err(PdfError::syntax(scan.offset, "endobj")),
    }
}

fn stream_end(
    data: &[u8],
    data_start: usize,
    tokens: &[Token],
    length_of: &dyn Fn(u32) -> Option<usize>,
) -> Result<usize> {
    let length_range = dict_get(tokens, b"Length");

    let direct = length_range
        .as_ref()
        .filter(|r| r.len() == 1)
        .and_then(|r| tokens[r.start].as_integer());

    if let Some(length) = direct {
        let end = usize::try_from(length)
            .ok()
            .and_then(|len| data_start.checked_add(len))
            .filter(|&end| endstream_follows(data, end))
            .ok_or_else(|| PdfError::syntax(data_start, format!("endstream after {length} bytes")))?;
        return Ok(end);
    }

    let indirect = length_range
        .and_then(|r| reference_at(tokens, r.start))
        .and_then(length_of)
        .and_then(|len| data_start.checked_add(len))
        .filter(|&end| endstream_follows(data, end));

    if let Some(end) = indirect {
        return Ok(end);
    }

    log::warn!("stream at byte {data_start}: unusable /Length, scanning for endstream");
    scan_for_endstream(data, data_start)
        .ok_or_else(|| PdfError::syntax(data_start, "endstream"))
}

fn endstream_follows(data: &[u8], end: usize) -> bool {
    if end > data.len() {
        return false;
    }
    let mut pos = end;
    while pos < data.len() && crate::lexer::is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

/// Position of `endstream`, with the EOL preceding it excluded from the payload
fn scan_for_endstream(data: &[u8], from: usize) -> Option<usize> {
    let keyword = b"endstream";
    let found = data[from..]
        .windows(keyword.len())
        .position(|w| w == keyword)?
        + from;

    let mut end = found;
    if end > from && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > from && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end)
}

/// Decoded `/Type /ObjStm` container
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Container object number
    pub number: u32,
    /// `(object number, body offset)` header pairs
    pub entries: Vec<(u32, usize)>,
    body: Vec<u8>,
}

impl ObjectStream {
    /// Decode a container object and read its header
    pub fn new(container: &PdfObject) -> Result<Self> {
        let offset = container.source_offset.unwrap_or(0);
        let dict = container
            .dictionary()
            .ok_or_else(|| PdfError::syntax(offset, "object stream dictionary"))?;

        let count = dict
            .get_integer(b"N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PdfError::syntax(offset, "/N in object stream"))?;
        let first = dict
            .get_integer(b"First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PdfError::syntax(offset, "/First in object stream"))?;

        let data = container
            .decoded_stream()?
            .ok_or_else(|| PdfError::syntax(offset, "stream in object stream"))?;

        if first > data.len() {
            return Err(PdfError::syntax(offset, "/First inside the decoded body"));
        }

        let header = &data[..first];
        let mut lexer = Lexer::new(header, 0);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let number = lexer.expect_integer()?;
            let relative = lexer.expect_integer()?;
            let number =
                u32::try_from(number).map_err(|_| PdfError::syntax(offset, "object number"))?;
            let relative = usize::try_from(relative)
                .map_err(|_| PdfError::syntax(offset, "member offset"))?;
            entries.push((number, relative));
        }

        Ok(Self {
            number: container.number,
            entries,
            body: data[first..].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Member at header `index` as a standalone object
    pub fn get(&self, index: usize) -> Result<PdfObject> {
        let &(number, start) = self
            .entries
            .get(index)
            .ok_or_else(|| PdfError::syntax(0, format!("member {index} of object stream {}", self.number)))?;

        let end = self
            .entries
            .get(index + 1)
            .map(|&(_, next)| next)
            .unwrap_or(self.body.len());

        if start > end || end > self.body.len() {
            return Err(PdfError::syntax(
                start,
                format!("ordered member offsets in object stream {}", self.number),
            ));
        }

        let scan = Lexer::new(&self.body[start..end], 0).scan()?;
        if scan.tokens.is_empty() {
            return Err(PdfError::syntax(start, "object stream member value"));
        }

        Ok(PdfObject {
            number,
            tokens: scan.tokens,
            stream: None,
            source_offset: None,
            placeholder: false,
        })
    }

    /// All members, in header order
    pub fn expand(&self) -> Result<Vec<PdfObject>> {
        (0..self.entries.len()).map(|i| self.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::flate_encode;
    use pretty_assertions::assert_eq;

    fn no_lookup(_: u32) -> Option<usize> {
        None
    }

    #[test]
    fn test_parse_plain_object() {
        let data = b"%PDF-1.7\n4 0 obj\n<</Type /Page /Parent 2 0 R>>\nendobj\n";
        let obj = parse_object_at(data, 9, &no_lookup).unwrap();
        assert_eq!(obj.number, 4);
        assert_eq!(obj.source_offset, Some(9));
        assert!(obj.is_type(b"Page"));
        assert_eq!(obj.get_reference(b"Parent"), Some(2));
        assert_eq!(obj.references(), vec![2]);
        assert!(obj.stream.is_none());
    }

    #[test]
    fn test_parse_stream_direct_length() {
        let data = b"5 0 obj\n<</Length 5>>\nstream\nhello\nendstream\nendobj\n";
        let obj = parse_object_at(data, 0, &no_lookup).unwrap();
        assert_eq!(obj.stream.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_wrong_direct_length_is_fatal() {
        let data = b"5 0 obj\n<</Length 3>>\nstream\nhello\nendstream\nendobj\n";
        assert!(matches!(
            parse_object_at(data, 0, &no_lookup),
            Err(PdfError::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_indirect_length_uses_lookup() {
        let data = b"5 0 obj\n<</Length 6 0 R>>\nstream\r\nhello\r\nendstream\nendobj\n";
        let obj = parse_object_at(data, 0, &|n| (n == 6).then_some(5)).unwrap();
        assert_eq!(obj.stream.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_unresolved_length_scans_for_endstream() {
        let data = b"5 0 obj\n<</Length 6 0 R>>\nstream\nhello\r\nendstream\nendobj\n";
        let obj = parse_object_at(data, 0, &no_lookup).unwrap();
        assert_eq!(obj.stream.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_missing_endobj() {
        let data = b"1 0 obj\n<</A 1>>\n";
        assert!(matches!(
            parse_object_at(data, 0, &no_lookup),
            Err(PdfError::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_set_keeps_other_tokens() {
        let data = b"3 0 obj\n<</Type /Page /Contents 4 0 R /Rotate 0>>\nendobj";
        let mut obj = parse_object_at(data, 0, &no_lookup).unwrap();
        obj.set(b"Contents", &Object::Array(vec![Object::Reference(4), Object::Reference(9)]))
            .unwrap();
        let mut out = Vec::new();
        crate::object::write_tokens(&obj.tokens, &mut out);
        assert_eq!(out, b"<</Type /Page /Contents [4 0 R 9 0 R] /Rotate 0>>".to_vec());
    }

    #[test]
    fn test_stub() {
        let stub = PdfObject::stub(7);
        assert!(stub.is_stub());
        assert_eq!(stub.value().unwrap(), Object::Null);
    }

    fn object_stream(header: &str, body: &str) -> PdfObject {
        let raw = format!("{header}{body}");
        let mut dict = Dictionary::new();
        dict.set("Type", "ObjStm");
        dict.set("N", 2);
        dict.set("First", header.len());
        dict.set("Filter", "FlateDecode");
        PdfObject::with_stream(9, &dict, flate_encode(raw.as_bytes()).unwrap())
    }

    #[test]
    fn test_expand_object_stream() {
        let container = object_stream("10 0 11 12 ", "<</A 1>>    [1 2 3]");
        let stream = ObjectStream::new(&container).unwrap();
        assert_eq!(stream.entries, vec![(10, 0), (11, 12)]);

        let members = stream.expand().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].number, 10);
        assert_eq!(members[0].get(b"A"), Some(Object::Integer(1)));
        assert_eq!(members[1].number, 11);
        assert_eq!(members[1].value().unwrap().as_array().map(|a| a.len()), Some(3));
        assert!(members[1].source_offset.is_none());
    }

    #[test]
    fn test_object_stream_bad_offsets() {
        let container = object_stream("10 12 11 0 ", "<</A 1>>    [1 2 3]");
        let stream = ObjectStream::new(&container).unwrap();
        assert!(stream.get(0).is_err());
        assert!(stream.get(5).is_err());
    }
}
