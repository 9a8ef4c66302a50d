//! Cross-reference resolver
//!
//! Locates `startxref`, parses classic tables and xref streams, and walks
//! the `/Prev` chain iteratively. Sections are applied oldest to newest so
//! later revisions shadow earlier ones.

use crate::filter::{apply_predictor, flate_decode, PredictorParams};
use crate::lexer::{Lexer, Token};
use crate::object::{value_end, Dictionary, Object};
use crate::parser::parse_object_at;
use crate::{PdfError, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};

/// Location of a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Byte offset of the `N 0 obj` header
    Offset(usize),
    /// Member `index` of object stream `container`
    Compressed { container: u32, index: usize },
}

/// Encoding of a cross-reference section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    Classic,
    Stream,
}

/// One parsed cross-reference section; `None` entries are free
#[derive(Debug, Clone)]
pub enum XRefSection {
    ClassicXRef {
        offset: usize,
        entries: Vec<(u32, Option<XRefEntry>)>,
        trailer: Dictionary,
    },
    StreamXRef {
        offset: usize,
        /// Object number of the `/Type /XRef` stream itself
        number: u32,
        entries: Vec<(u32, Option<XRefEntry>)>,
        trailer: Dictionary,
    },
}

impl XRefSection {
    /// Parse the section starting at `offset`, dispatching on its first token
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if offset >= data.len() {
            return Err(PdfError::syntax(offset, "xref section inside the file"));
        }

        let mut lexer = Lexer::new(data, offset);
        lexer.skip_whitespace();
        let start = lexer.position();

        match lexer.clone().next_token()? {
            Some(token) if token.is_keyword(b"xref") => parse_classic(data, start),
            Some(Token::Number(_)) => parse_stream(data, start),
            _ => Err(PdfError::syntax(start, "'xref' or an xref stream object")),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            XRefSection::ClassicXRef { offset, .. } | XRefSection::StreamXRef { offset, .. } => {
                *offset
            }
        }
    }

    pub fn kind(&self) -> XRefKind {
        match self {
            XRefSection::ClassicXRef { .. } => XRefKind::Classic,
            XRefSection::StreamXRef { .. } => XRefKind::Stream,
        }
    }

    pub fn entries(&self) -> &[(u32, Option<XRefEntry>)] {
        match self {
            XRefSection::ClassicXRef { entries, .. } | XRefSection::StreamXRef { entries, .. } => {
                entries
            }
        }
    }

    pub fn trailer(&self) -> &Dictionary {
        match self {
            XRefSection::ClassicXRef { trailer, .. } | XRefSection::StreamXRef { trailer, .. } => {
                trailer
            }
        }
    }

    /// Offset of the previous section
    pub fn prev(&self) -> Option<usize> {
        self.trailer()
            .get_integer(b"Prev")
            .and_then(|p| usize::try_from(p).ok())
    }

    /// Hybrid-reference offset (`/XRefStm`) of a classic section
    fn hybrid_stream(&self) -> Option<usize> {
        match self {
            XRefSection::ClassicXRef { trailer, .. } => trailer
                .get_integer(b"XRefStm")
                .and_then(|p| usize::try_from(p).ok()),
            XRefSection::StreamXRef { .. } => None,
        }
    }
}

fn parse_classic(data: &[u8], offset: usize) -> Result<XRefSection> {
    let mut lexer = Lexer::new(data, offset);
    lexer.expect_keyword("xref")?;

    let mut entries = Vec::new();

    loop {
        match lexer.clone().next_token()? {
            Some(token) if token.is_keyword(b"trailer") => break,
            Some(Token::Number(_)) => {}
            _ => return Err(PdfError::syntax(lexer.position(), "xref subsection or 'trailer'")),
        }

        let first = lexer.expect_integer()?;
        let count = lexer.expect_integer()?;
        let (first, count) = match (u32::try_from(first), u32::try_from(count)) {
            (Ok(first), Ok(count)) => (first, count),
            _ => return Err(PdfError::syntax(lexer.position(), "subsection header")),
        };

        for i in 0..count {
            let entry_offset = lexer.expect_integer()?;
            lexer.expect_integer()?;
            lexer.skip_whitespace();
            let at = lexer.position();
            let live = match lexer.next_token()? {
                Some(token) if token.is_keyword(b"n") => true,
                Some(token) if token.is_keyword(b"f") => false,
                _ => return Err(PdfError::syntax(at, "'n' or 'f'")),
            };

            let number = first.saturating_add(i);
            let entry = match usize::try_from(entry_offset) {
                Ok(pos) if live && pos > 0 => Some(XRefEntry::Offset(pos)),
                _ if live => {
                    warn!("object {number}: in-use entry with offset {entry_offset}, treating as free");
                    None
                }
                _ => None,
            };
            entries.push((number, entry));
        }
    }

    lexer.expect_keyword("trailer")?;
    let at = lexer.position();
    let scan = lexer.scan()?;
    let end = value_end(&scan.tokens, 0).ok_or_else(|| PdfError::syntax(at, "trailer dictionary"))?;
    let trailer = match Object::from_tokens(&scan.tokens[..end]) {
        Ok(Object::Dictionary(dict)) => dict,
        _ => return Err(PdfError::syntax(at, "trailer dictionary")),
    };

    Ok(XRefSection::ClassicXRef {
        offset,
        entries,
        trailer,
    })
}

fn parse_stream(data: &[u8], offset: usize) -> Result<XRefSection> {
    let object = parse_object_at(data, offset, &|_| None)?;
    if !object.is_type(b"XRef") {
        return Err(PdfError::syntax(offset, "/Type /XRef"));
    }
    let dict = object
        .dictionary()
        .ok_or_else(|| PdfError::syntax(offset, "xref stream dictionary"))?;

    let widths = read_widths(&dict, offset)?;
    let record = widths.iter().sum::<usize>();
    if record == 0 {
        return Err(PdfError::xref(offset, "/W describes empty records"));
    }

    let size = dict
        .get_integer(b"Size")
        .and_then(|s| u32::try_from(s).ok())
        .ok_or_else(|| PdfError::xref(offset, "missing /Size"))?;

    let subsections = read_index(&dict, size, offset)?;
    let body = decode_xref_body(&dict, object.stream.as_deref().unwrap_or_default(), offset)?;

    if body.len() % record != 0 {
        return Err(PdfError::xref(
            offset,
            format!("body of {} bytes is not a multiple of record size {record}", body.len()),
        ));
    }

    let needed: usize = subsections.iter().map(|&(_, count)| count as usize).sum();
    if needed * record > body.len() {
        return Err(PdfError::xref(
            offset,
            format!("/Index lists {needed} entries but body holds {}", body.len() / record),
        ));
    }

    let mut records = body.chunks(record);
    let mut entries = Vec::with_capacity(needed);

    for (start, count) in subsections {
        for i in 0..count {
            let Some(rec) = records.next() else {
                break;
            };
            let number = start.saturating_add(i);

            let (f1, rest) = rec.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_field(f1) };

            let entry = match kind {
                0 => None,
                1 => Some(XRefEntry::Offset(read_field(f2) as usize)),
                2 => Some(XRefEntry::Compressed {
                    container: u32::try_from(read_field(f2))
                        .map_err(|_| PdfError::xref(offset, "object stream number out of range"))?,
                    index: read_field(f3) as usize,
                }),
                other => {
                    return Err(PdfError::xref(
                        offset,
                        format!(
                            "object {number}: unknown entry type {other} at byte {} of the record body",
                            entries.len() * record
                        ),
                    ));
                }
            };
            entries.push((number, entry));
        }
    }

    Ok(XRefSection::StreamXRef {
        offset,
        number: object.number,
        entries,
        trailer: dict,
    })
}

fn read_widths(dict: &Dictionary, offset: usize) -> Result<[usize; 3]> {
    let items = dict
        .get_array(b"W")
        .ok_or_else(|| PdfError::xref(offset, "missing /W"))?;

    if items.len() != 3 {
        return Err(PdfError::xref(offset, "/W must have three entries"));
    }

    let mut widths = [0usize; 3];
    for (slot, item) in widths.iter_mut().zip(items) {
        *slot = match item.as_integer() {
            Some(w @ 0..=8) => w as usize,
            _ => return Err(PdfError::xref(offset, format!("unsupported /W field {item:?}"))),
        };
    }

    Ok(widths)
}

fn read_index(dict: &Dictionary, size: u32, offset: usize) -> Result<Vec<(u32, u32)>> {
    let Some(items) = dict.get_array(b"Index") else {
        return Ok(vec![(0, size)]);
    };

    if items.len() % 2 != 0 {
        return Err(PdfError::xref(offset, "/Index must hold pairs"));
    }

    items
        .chunks(2)
        .map(|pair| {
            let start = pair[0].as_integer().and_then(|v| u32::try_from(v).ok());
            let count = pair[1].as_integer().and_then(|v| u32::try_from(v).ok());
            match (start, count) {
                (Some(start), Some(count)) => Ok((start, count)),
                _ => Err(PdfError::xref(offset, "/Index entries must be non-negative integers")),
            }
        })
        .collect()
}

fn decode_xref_body(dict: &Dictionary, raw: &[u8], offset: usize) -> Result<Vec<u8>> {
    let compressed = dict.has(b"Filter");
    let data = match dict.get(b"Filter") {
        None => raw.to_vec(),
        Some(Object::Name(name)) if name == b"FlateDecode" => flate_decode(raw)?,
        Some(Object::Array(items))
            if items.len() == 1 && items[0].as_name() == Some(b"FlateDecode".as_slice()) =>
        {
            flate_decode(raw)?
        }
        Some(other) => {
            return Err(PdfError::xref(offset, format!("unsupported filter {other:?}")));
        }
    };

    let parms = match dict.get(b"DecodeParms") {
        Some(Object::Dictionary(parms)) => Some(parms),
        Some(Object::Array(items)) => match items.first() {
            Some(Object::Dictionary(parms)) => Some(parms),
            _ => None,
        },
        _ => None,
    }
    .filter(|parms| parms.has(b"Predictor"));

    // Compressed records are always predicted; raw records may skip it
    let parms = match parms {
        Some(parms) => parms,
        None if compressed => return Err(PdfError::xref(offset, "missing predictor")),
        None => return Ok(data),
    };

    let params = PredictorParams::from_dict(parms);
    match params.predictor {
        1 | 10..=15 => apply_predictor(data, &params)
            .map_err(|err| PdfError::xref(offset, err.to_string())),
        other => Err(PdfError::xref(offset, format!("predictor {other}"))),
    }
}

/// Big-endian unsigned field of up to eight bytes
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Offset named by the last `startxref` keyword in the file
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let pos = data
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| PdfError::syntax(data.len(), "startxref"))?;

    let mut lexer = Lexer::new(data, pos + needle.len());
    let value = lexer.expect_integer()?;
    usize::try_from(value).map_err(|_| PdfError::syntax(pos, "non-negative startxref offset"))
}

/// Resolved cross-reference information for a whole file
#[derive(Debug, Clone)]
pub struct XRefTable {
    /// Live objects; free numbers are absent
    pub entries: BTreeMap<u32, XRefEntry>,
    /// Newest trailer, with `/Root`, `/Info` and `/ID` filled from older ones
    pub trailer: Dictionary,
    /// Offset of the newest section
    pub startxref: usize,
    /// Encoding of the newest section
    pub kind: XRefKind,
    /// Object numbers of xref stream objects encountered in the chain
    pub xref_streams: Vec<u32>,
}

impl XRefTable {
    pub fn get(&self, number: u32) -> Option<XRefEntry> {
        self.entries.get(&number).copied()
    }

    pub fn max_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Walk every section reachable from `startxref` and merge them
pub fn resolve_xref(data: &[u8]) -> Result<XRefTable> {
    let startxref = find_startxref(data)?;

    // Newest first; the flag marks hybrid `/XRefStm` sections whose free
    // entries must not hide the classic table's objects
    let mut chain: Vec<(XRefSection, bool)> = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(startxref);

    while let Some(offset) = next {
        if !visited.insert(offset) {
            return Err(PdfError::syntax(offset, "/Prev chain without cycles"));
        }

        let section = XRefSection::parse(data, offset)?;
        debug!(
            "xref section at {offset}: {:?}, {} entries",
            section.kind(),
            section.entries().len()
        );
        next = section.prev();

        if let Some(hybrid) = section.hybrid_stream() {
            if visited.insert(hybrid) {
                let stream = XRefSection::parse(data, hybrid)?;
                debug!("hybrid xref stream at {hybrid}: {} entries", stream.entries().len());
                chain.push((stream, true));
            }
        }
        chain.push((section, false));
    }

    let newest = chain
        .iter()
        .find(|(_, hybrid)| !hybrid)
        .map(|(section, _)| section)
        .ok_or_else(|| PdfError::syntax(startxref, "xref section"))?;

    let kind = newest.kind();
    let mut trailer = newest.trailer().clone();
    for (section, _) in chain.iter().skip(1) {
        for key in [b"Root".as_slice(), b"Info".as_slice(), b"ID".as_slice()] {
            if !trailer.has(key) {
                if let Some(value) = section.trailer().get(key) {
                    trailer.set(key, value.clone());
                }
            }
        }
    }

    if trailer.has(b"Encrypt") {
        return Err(PdfError::Encrypted);
    }

    let mut entries = BTreeMap::new();
    let mut xref_streams = Vec::new();

    for (section, hybrid) in chain.iter().rev() {
        if let XRefSection::StreamXRef { number, .. } = section {
            xref_streams.push(*number);
        }
        for &(number, entry) in section.entries() {
            match entry {
                Some(entry) => {
                    entries.insert(number, entry);
                }
                None if *hybrid => {}
                None => {
                    entries.remove(&number);
                }
            }
        }
    }

    debug!("resolved {} live objects from {} sections", entries.len(), chain.len());

    Ok(XRefTable {
        entries,
        trailer,
        startxref,
        kind,
        xref_streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{flate_encode, png_up_encode};
    use pretty_assertions::assert_eq;

    fn classic_file(objects: &[(u32, &str)]) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        let mut offsets = BTreeMap::new();
        for (n, body) in objects {
            offsets.insert(*n, out.len());
            out.extend_from_slice(format!("{n} 0 obj\n{body}\nendobj\n").as_bytes());
        }
        let size = offsets.keys().max().copied().unwrap_or(0) + 1;
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
        for n in 1..size {
            match offsets.get(&n) {
                Some(off) => out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        out.extend_from_slice(
            format!("trailer\n<</Size {size} /Root 1 0 R>>\nstartxref\n{xref}\n%%EOF\n")
                .as_bytes(),
        );
        out
    }

    fn append_update(mut base: Vec<u8>, objects: &[(u32, &str)], free: &[u32]) -> Vec<u8> {
        let prev = find_startxref(&base).unwrap();
        let mut offsets = Vec::new();
        for (n, body) in objects {
            offsets.push((*n, base.len()));
            base.extend_from_slice(format!("{n} 0 obj\n{body}\nendobj\n").as_bytes());
        }
        let xref = base.len();
        base.extend_from_slice(b"xref\n");
        for (n, off) in offsets {
            base.extend_from_slice(format!("{n} 1\n{off:010} 00000 n \n").as_bytes());
        }
        for n in free {
            base.extend_from_slice(format!("{n} 1\n0000000000 00001 f \n").as_bytes());
        }
        base.extend_from_slice(
            format!("trailer\n<</Size 10 /Prev {prev}>>\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
        );
        base
    }

    #[test]
    fn test_find_startxref_tolerates_whitespace() {
        let data = b"...startxref\r\n  1234 \r\n%%EOF\r\n";
        assert_eq!(find_startxref(data).unwrap(), 1234);
    }

    #[test]
    fn test_find_startxref_missing() {
        assert!(matches!(
            find_startxref(b"%PDF-1.7\n"),
            Err(PdfError::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_classic_table() {
        let data = classic_file(&[(1, "<</Type /Catalog /Pages 2 0 R>>"), (2, "<</Type /Pages /Kids [] /Count 0>>")]);
        let table = resolve_xref(&data).unwrap();
        assert_eq!(table.kind, XRefKind::Classic);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(XRefEntry::Offset(9)));
        assert_eq!(table.trailer.get_reference(b"Root"), Some(1));
    }

    #[test]
    fn test_incremental_update_shadows_object() {
        let base = classic_file(&[
            (1, "<</Type /Catalog>>"),
            (2, "<</A 1>>"),
            (5, "(old)"),
        ]);
        let old_entry = resolve_xref(&base).unwrap().get(5);
        let data = append_update(base, &[(5, "(new)")], &[]);

        let table = resolve_xref(&data).unwrap();
        let new_entry = table.get(5).unwrap();
        assert_ne!(Some(new_entry), old_entry);
        let XRefEntry::Offset(pos) = new_entry else {
            panic!("expected offset entry");
        };
        assert!(data[pos..].starts_with(b"5 0 obj\n(new)"));
        // /Root survives from the older trailer
        assert_eq!(table.trailer.get_reference(b"Root"), Some(1));
        assert_eq!(table.trailer.get_integer(b"Size"), Some(10));
    }

    #[test]
    fn test_free_entry_in_update_removes_object() {
        let base = classic_file(&[(1, "<</Type /Catalog>>"), (2, "<</A 1>>")]);
        let data = append_update(base, &[], &[2]);
        let table = resolve_xref(&data).unwrap();
        assert!(table.get(2).is_none());
        assert!(table.get(1).is_some());
    }

    #[test]
    fn test_prev_cycle_detected() {
        let mut data = b"%PDF-1.7\n".to_vec();
        let xref = data.len();
        data.extend_from_slice(
            format!("xref\n0 1\n0000000000 65535 f \ntrailer\n<</Size 1 /Prev {xref}>>\nstartxref\n{xref}\n%%EOF\n")
                .as_bytes(),
        );
        assert!(matches!(
            resolve_xref(&data),
            Err(PdfError::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_encrypted_rejected() {
        let mut data = classic_file(&[(1, "<</Type /Catalog>>")]);
        let text = String::from_utf8(data.clone()).unwrap();
        data = text.replace("/Root 1 0 R", "/Root 1 0 R /Encrypt 1 0 R").into_bytes();
        assert!(matches!(resolve_xref(&data), Err(PdfError::Encrypted)));
    }

    fn stream_file(records: &[[u8; 4]], dict_extra: &str, encode: bool) -> Vec<u8> {
        let raw: Vec<u8> = records.iter().flatten().copied().collect();
        if encode {
            let body = flate_encode(&png_up_encode(&raw, 4)).unwrap();
            let filter = " /Filter /FlateDecode /DecodeParms <</Predictor 12 /Columns 4>>";
            stream_file_with_body(records.len(), body, &format!("{filter}{dict_extra}"))
        } else {
            stream_file_with_body(records.len(), raw, dict_extra)
        }
    }

    fn stream_file_with_body(size: usize, body: Vec<u8>, dict_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        out.extend_from_slice(b"1 0 obj\n<</Type /Catalog>>\nendobj\n");
        let xref = out.len();
        out.extend_from_slice(
            format!(
                "3 0 obj\n<</Type /XRef /Size {size} /W [1 2 1] /Root 1 0 R /Length {}{dict_extra}>>\nstream\n",
                body.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&body);
        out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{xref}\n%%EOF\n").as_bytes());
        out
    }

    #[test]
    fn test_xref_stream_raw_records() {
        let data = stream_file(
            &[[0, 0, 0, 0], [1, 0, 9, 0], [2, 0, 4, 1], [1, 0, 43, 0]],
            "",
            false,
        );
        let table = resolve_xref(&data).unwrap();
        assert_eq!(table.kind, XRefKind::Stream);
        assert_eq!(table.get(1), Some(XRefEntry::Offset(9)));
        assert_eq!(
            table.get(2),
            Some(XRefEntry::Compressed {
                container: 4,
                index: 1
            })
        );
        assert_eq!(table.get(3), Some(XRefEntry::Offset(43)));
        assert!(table.get(0).is_none());
        assert_eq!(table.xref_streams, vec![3]);
    }

    #[test]
    fn test_xref_stream_with_up_predictor() {
        let data = stream_file(
            &[[0, 0, 0, 0], [1, 0, 9, 0], [1, 1, 2, 0], [1, 0, 43, 0]],
            "",
            true,
        );
        let table = resolve_xref(&data).unwrap();
        assert_eq!(table.get(2), Some(XRefEntry::Offset(258)));
        assert_eq!(table.get(3), Some(XRefEntry::Offset(43)));
    }

    #[test]
    fn test_xref_stream_index_subsections() {
        let data = stream_file(&[[1, 0, 9, 0], [1, 0, 43, 0]], " /Index [1 1 3 1]", false);
        let table = resolve_xref(&data).unwrap();
        assert_eq!(table.get(1), Some(XRefEntry::Offset(9)));
        assert_eq!(table.get(3), Some(XRefEntry::Offset(43)));
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_xref_stream_bad_widths() {
        let data = stream_file(&[[1, 0, 9, 0]], "", false);
        let text = String::from_utf8_lossy(&data).replace("/W [1 2 1]", "/W [1 2 1 0]");
        assert!(matches!(
            resolve_xref(text.as_bytes()),
            Err(PdfError::UnsupportedXRefEncoding { .. })
        ));
    }

    #[test]
    fn test_xref_stream_tiff_predictor_rejected() {
        let data = stream_file(
            &[[1, 0, 9, 0]],
            " /DecodeParms <</Predictor 2 /Columns 4>>",
            false,
        );
        assert!(matches!(
            resolve_xref(&data),
            Err(PdfError::UnsupportedXRefEncoding { .. })
        ));
    }

    #[test]
    fn test_compressed_xref_stream_needs_predictor() {
        let raw = [1u8, 0, 9, 0, 1, 0, 43, 0];
        let body = flate_encode(&raw).unwrap();
        let data = stream_file_with_body(2, body.clone(), " /Filter /FlateDecode");
        let err = resolve_xref(&data).unwrap_err();
        assert!(err.to_string().contains("missing predictor"));

        let data = stream_file_with_body(
            2,
            body,
            " /Filter /FlateDecode /DecodeParms <</Columns 4>>",
        );
        assert!(matches!(
            resolve_xref(&data),
            Err(PdfError::UnsupportedXRefEncoding { .. })
        ));
    }

    #[test]
    fn test_xref_stream_unknown_entry_type() {
        let data = stream_file(&[[0, 0, 0, 0], [7, 0, 9, 0]], "", false);
        let err = resolve_xref(&data).unwrap_err();
        assert!(matches!(err, PdfError::UnsupportedXRefEncoding { .. }));
        assert!(err.to_string().contains("unknown entry type 7"));
    }

    #[test]
    fn test_section_dispatch_error() {
        let data = b"%PDF-1.7\ngarbage\nstartxref\n9\n%%EOF";
        assert!(matches!(
            resolve_xref(data),
            Err(PdfError::MalformedSyntax { offset: 9, .. })
        ));
    }
}
