//! Object allocator and serializer
//!
//! Offsets are captured at the moment an object header is written, so the
//! cross-reference section produced by [`ObjectWriter::finalize`] always
//! points at the exact `N 0 obj` position in the output.

use crate::config::{PdfVersion, XRefFormat};
use crate::filter::{flate_encode, png_up_encode};
use crate::lexer::Token;
use crate::object::{dict_get, dict_set, reference_at, write_tokens, Dictionary, Object};
use crate::parser::PdfObject;
use crate::xref::XRefEntry;
use crate::{PdfError, Result};
use log::{debug, trace};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

/// Binary marker comment following the header line
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Trailer fields supplied at finalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer {
    /// Catalog object number
    pub root: u32,
    /// Info dictionary object number
    pub info: Option<u32>,
    /// First `/ID` element to keep; a digest of the written body is used when absent
    pub id_first: Option<Vec<u8>>,
    /// Offset of the previous xref section (incremental updates)
    pub prev: Option<usize>,
}

/// Write-side object table
#[derive(Debug)]
pub struct ObjectWriter {
    buf: Vec<u8>,
    /// Length of the original file for incremental sessions
    body_start: usize,
    entries: BTreeMap<u32, XRefEntry>,
    done: HashSet<u32>,
    next_number: u32,
    /// Numbers below this were assigned by a foreign document
    first_new: u32,
    /// Numbers from here on must all be written before finalizing
    check_from: u32,
    open: Option<u32>,
    reserved: BTreeSet<u32>,
    /// Targets of `N 0 R` in structured writes; checked at finalization
    referenced: BTreeSet<u32>,
    packed: Vec<(u32, Vec<u8>)>,
    object_streams: bool,
    incremental: bool,
    completed: bool,
}

impl ObjectWriter {
    /// Start a new file with the header line and binary marker
    pub fn new(version: PdfVersion) -> Self {
        let mut buf = format!("%PDF-{}\n", version.as_str()).into_bytes();
        buf.extend_from_slice(BINARY_MARKER);
        Self {
            buf,
            body_start: 0,
            entries: BTreeMap::new(),
            done: HashSet::new(),
            next_number: 1,
            first_new: 1,
            check_from: 1,
            open: None,
            reserved: BTreeSet::new(),
            referenced: BTreeSet::new(),
            packed: Vec::new(),
            object_streams: false,
            incremental: false,
            completed: false,
        }
    }

    /// Append an update section after `original`, numbering new objects after `max_number`
    pub fn append_to(original: &[u8], max_number: u32) -> Self {
        let mut buf = original.to_vec();
        if !matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.push(b'\n');
        }
        let body_start = buf.len();
        Self {
            buf,
            body_start,
            entries: BTreeMap::new(),
            done: HashSet::new(),
            next_number: max_number + 1,
            first_new: max_number + 1,
            check_from: max_number + 1,
            open: None,
            reserved: BTreeSet::new(),
            referenced: BTreeSet::new(),
            packed: Vec::new(),
            object_streams: false,
            incremental: true,
            completed: false,
        }
    }

    /// Treat `1..=max_number` as foreign numbers to be written with [`adopt`](Self::adopt)
    pub fn continue_after(mut self, max_number: u32) -> Self {
        self.next_number = self.next_number.max(max_number + 1);
        self.first_new = self.first_new.max(max_number + 1);
        self
    }

    /// Pack stream-less objects passed to [`put`](Self::put) into an object stream
    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        self
    }

    /// Current byte position in the output
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// The number the next [`new_object`](Self::new_object) call will return
    pub fn peek_next_number(&self) -> u32 {
        self.next_number
    }

    /// Whether `number` has been written (or packed)
    pub fn is_written(&self, number: u32) -> bool {
        self.done.contains(&number)
    }

    /// Allocate the next number and write its header at the current position
    pub fn new_object(&mut self) -> Result<u32> {
        self.check_writable()?;
        let number = self.next_number;
        self.begin(number)?;
        self.next_number += 1;
        Ok(number)
    }

    /// Allocate a number to be written later with [`begin_reserved`](Self::begin_reserved)
    ///
    /// Numbering stays forward-only: the number is taken from the counter now,
    /// so objects written before it can refer to it, but no offset exists
    /// until its header is written. Finalizing with a reservation still open
    /// is a `DanglingReference`.
    pub fn reserve(&mut self) -> Result<u32> {
        self.check_writable()?;
        let number = self.next_number;
        self.next_number += 1;
        self.reserved.insert(number);
        Ok(number)
    }

    /// Reserve `count` consecutive numbers; returns the first
    ///
    /// Lets a parent and its children refer to each other before any of them
    /// is written; see [`reserve`](Self::reserve).
    pub fn reserve_run(&mut self, count: u32) -> Result<u32> {
        self.check_writable()?;
        let first = self.next_number;
        for _ in 0..count {
            self.reserve()?;
        }
        Ok(first)
    }

    /// Write the header of a previously reserved number
    pub fn begin_reserved(&mut self, number: u32) -> Result<()> {
        self.check_writable()?;
        if !self.reserved.contains(&number) {
            return Err(PdfError::protocol(format!("object {number} was not reserved")));
        }
        self.begin(number)?;
        self.reserved.remove(&number);
        Ok(())
    }

    /// Write the header of a number assigned by a foreign document
    pub fn adopt(&mut self, number: u32) -> Result<()> {
        self.check_writable()?;
        if self.reserved.contains(&number) {
            return self.begin_reserved(number);
        }
        if number == 0 || number >= self.first_new {
            return Err(PdfError::protocol(format!(
                "object {number} was never allocated"
            )));
        }
        self.begin(number)
    }

    /// Append raw bytes to the open object
    ///
    /// Raw bytes are not scanned for references.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        if self.open.is_none() {
            return Err(PdfError::protocol("write with no open object"));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Serialize a value into the open object
    pub fn write_value(&mut self, value: &Object) -> Result<()> {
        self.note_references(&value.to_tokens());
        self.write(&value.to_bytes())
    }

    /// Write a stream (dictionary with `/Length` set, then payload) into the open object
    pub fn write_stream(&mut self, dict: &Dictionary, data: &[u8]) -> Result<()> {
        let mut dict = dict.clone();
        dict.set("Length", data.len());
        let value = Object::Dictionary(dict);
        self.note_references(&value.to_tokens());
        let mut out = value.to_bytes();
        push_stream_payload(&mut out, data);
        self.write(&out)
    }

    /// Terminate the open object
    pub fn end_object(&mut self) -> Result<()> {
        self.check_writable()?;
        let number = self
            .open
            .take()
            .ok_or_else(|| PdfError::protocol("end_object with no open object"))?;
        self.buf.extend_from_slice(b"\nendobj\n");
        trace!("object {number} written");
        Ok(())
    }

    /// Write a complete parsed or authored object under its own number
    ///
    /// The value tokens are copied as they are; only a stale `/Length` is
    /// replaced.
    pub fn write_object(&mut self, obj: &PdfObject) -> Result<()> {
        self.adopt_or_begin(obj.number)?;
        self.note_references(&obj.tokens);
        let out = serialize_body(obj)?;
        self.write(&out)?;
        self.end_object()
    }

    /// Buffer a stream-less object for the object stream emitted at finalization
    pub fn pack(&mut self, obj: &PdfObject) -> Result<()> {
        self.check_writable()?;
        if !self.object_streams {
            return Err(PdfError::protocol("object streams are disabled"));
        }
        if obj.stream.is_some() {
            return Err(PdfError::protocol(format!(
                "stream object {} cannot be packed",
                obj.number
            )));
        }
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!("object {open} is still open")));
        }
        self.claim(obj.number)?;
        self.note_references(&obj.tokens);

        let mut body = Vec::new();
        write_tokens(&obj.tokens, &mut body);
        self.packed.push((obj.number, body));
        self.done.insert(obj.number);
        Ok(())
    }

    /// Write `obj`, packing it when object streams are enabled and it has no stream
    pub fn put(&mut self, obj: &PdfObject) -> Result<()> {
        if self.object_streams && obj.stream.is_none() {
            self.pack(obj)
        } else {
            self.write_object(obj)
        }
    }

    /// Allocate a number for `value` and write it
    pub fn add(&mut self, value: &Object) -> Result<u32> {
        let number = self.reserve()?;
        self.put(&PdfObject::new(number, value))?;
        Ok(number)
    }

    /// Allocate a number for a stream object and write it
    pub fn add_stream(&mut self, dict: &Dictionary, data: Vec<u8>) -> Result<u32> {
        let number = self.reserve()?;
        self.write_object(&PdfObject::with_stream(number, dict, data))?;
        Ok(number)
    }

    /// Emit pending packed objects and the cross-reference section
    pub fn finalize(&mut self, trailer: Trailer, format: XRefFormat) -> Result<Vec<u8>> {
        self.check_writable()?;
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!(
                "object {open} is still open at finalization"
            )));
        }
        if !self.packed.is_empty() && format == XRefFormat::Table {
            return Err(PdfError::protocol(
                "object streams need a cross-reference stream",
            ));
        }

        self.flush_object_stream()?;

        if let Some(&missing) = self.reserved.iter().next() {
            return Err(PdfError::DanglingReference(missing));
        }
        for number in self.check_from..self.next_number {
            if !self.done.contains(&number) {
                return Err(PdfError::DanglingReference(number));
            }
        }
        let trailer_refs = std::iter::once(trailer.root).chain(trailer.info);
        if let Some(missing) = self
            .referenced
            .iter()
            .copied()
            .chain(trailer_refs)
            .find(|&number| !self.resolves(number))
        {
            return Err(PdfError::DanglingReference(missing));
        }

        let digest = body_digest(&self.buf[self.body_start..]);
        let id_first = trailer.id_first.clone().unwrap_or_else(|| digest.clone());

        match format {
            XRefFormat::Table => self.write_xref_table(&trailer, &id_first, &digest),
            XRefFormat::Stream => self.write_xref_stream(&trailer, &id_first, &digest)?,
        }

        self.completed = true;
        debug!(
            "finalized {} objects, {} bytes ({:?} xref)",
            self.entries.len(),
            self.buf.len(),
            format
        );
        Ok(std::mem::take(&mut self.buf))
    }

    fn note_references(&mut self, tokens: &[Token]) {
        self.referenced
            .extend((0..tokens.len()).filter_map(|i| reference_at(tokens, i)));
    }

    /// Written here, or part of the original file of an incremental update
    fn resolves(&self, number: u32) -> bool {
        number != 0 && (self.done.contains(&number) || (self.incremental && number < self.first_new))
    }

    fn check_writable(&self) -> Result<()> {
        if self.completed {
            return Err(PdfError::protocol("writer already finalized"));
        }
        Ok(())
    }

    fn claim(&mut self, number: u32) -> Result<()> {
        if self.done.contains(&number) {
            return Err(PdfError::protocol(format!("object {number} already written")));
        }
        if self.reserved.remove(&number) {
            return Ok(());
        }
        if number == 0 || number >= self.first_new {
            return Err(PdfError::protocol(format!(
                "object {number} was never allocated"
            )));
        }
        Ok(())
    }

    fn adopt_or_begin(&mut self, number: u32) -> Result<()> {
        self.check_writable()?;
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!("object {open} is still open")));
        }
        self.claim(number)?;
        self.start_header(number);
        Ok(())
    }

    fn begin(&mut self, number: u32) -> Result<()> {
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!(
                "object {open} is still open; call end_object first"
            )));
        }
        if self.done.contains(&number) {
            return Err(PdfError::protocol(format!("object {number} already written")));
        }
        self.start_header(number);
        Ok(())
    }

    fn start_header(&mut self, number: u32) {
        self.entries
            .insert(number, XRefEntry::Offset(self.buf.len()));
        self.done.insert(number);
        self.open = Some(number);
        self.buf
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
    }

    fn flush_object_stream(&mut self) -> Result<()> {
        if self.packed.is_empty() {
            return Ok(());
        }

        let members = std::mem::take(&mut self.packed);
        let container = self.next_number;
        self.next_number += 1;

        let mut header = Vec::new();
        let mut body = Vec::new();
        for (index, (number, bytes)) in members.iter().enumerate() {
            header.extend_from_slice(format!("{number} {} ", body.len()).as_bytes());
            body.extend_from_slice(bytes);
            body.push(b'\n');
            self.entries
                .insert(*number, XRefEntry::Compressed { container, index });
        }

        let first = header.len();
        header.extend_from_slice(&body);
        let data = flate_encode(&header)?;

        let mut dict = Dictionary::new();
        dict.set("Type", "ObjStm");
        dict.set("N", members.len());
        dict.set("First", first);
        dict.set("Filter", "FlateDecode");

        self.begin(container)?;
        self.write_stream(&dict, &data)?;
        self.end_object()?;
        debug!("object stream {container} holds {} objects", members.len());
        Ok(())
    }

    fn trailer_dict(&self, trailer: &Trailer, size: u32, id_first: &[u8], digest: &[u8]) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Size", size);
        dict.set("Root", Object::Reference(trailer.root));
        if let Some(info) = trailer.info {
            dict.set("Info", Object::Reference(info));
        }
        dict.set(
            "ID",
            vec![
                Object::hex_string(id_first.to_vec()),
                Object::hex_string(digest.to_vec()),
            ],
        );
        if let Some(prev) = trailer.prev {
            dict.set("Prev", prev);
        }
        dict
    }

    /// Runs of consecutive written numbers; full files start at 0
    fn subsections(&self) -> Vec<(u32, u32)> {
        if !self.incremental {
            return vec![(0, self.next_number)];
        }
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &number in self.entries.keys() {
            match runs.last_mut() {
                Some((start, count)) if *start + *count == number => *count += 1,
                _ => runs.push((number, 1)),
            }
        }
        runs
    }

    fn write_xref_table(&mut self, trailer: &Trailer, id_first: &[u8], digest: &[u8]) {
        let startxref = self.buf.len();
        let size = self.next_number;
        let mut out = b"xref\n".to_vec();

        for (start, count) in self.subsections() {
            out.extend_from_slice(format!("{start} {count}\n").as_bytes());
            for number in start..start + count {
                match self.entries.get(&number) {
                    Some(XRefEntry::Offset(offset)) => {
                        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes())
                    }
                    _ => out.extend_from_slice(b"0000000000 65535 f \n"),
                }
            }
        }

        let dict = self.trailer_dict(trailer, size, id_first, digest);
        out.extend_from_slice(b"trailer\n");
        Object::Dictionary(dict).write(&mut out);
        out.extend_from_slice(format!("\nstartxref\n{startxref}\n%%EOF\n").as_bytes());
        self.buf.extend_from_slice(&out);
    }

    fn write_xref_stream(&mut self, trailer: &Trailer, id_first: &[u8], digest: &[u8]) -> Result<()> {
        let number = self.next_number;
        self.next_number += 1;
        let startxref = self.buf.len();
        self.entries.insert(number, XRefEntry::Offset(startxref));
        self.done.insert(number);
        let size = self.next_number;

        let max_field = self
            .entries
            .values()
            .map(|entry| match entry {
                XRefEntry::Offset(offset) => *offset as u64,
                XRefEntry::Compressed { container, .. } => *container as u64,
            })
            .max()
            .unwrap_or(0);
        let max_index = self
            .entries
            .values()
            .map(|entry| match entry {
                XRefEntry::Compressed { index, .. } => *index as u64,
                XRefEntry::Offset(_) => 0,
            })
            .max()
            .unwrap_or(0);
        let widths = [1, byte_width(max_field), byte_width(max_index)];
        let record = widths.iter().sum::<usize>();

        let subsections = self.subsections();
        let mut raw = Vec::new();
        for &(start, count) in &subsections {
            for n in start..start + count {
                let (kind, f2, f3) = match self.entries.get(&n) {
                    Some(XRefEntry::Offset(offset)) => (1, *offset as u64, 0),
                    Some(XRefEntry::Compressed { container, index }) => {
                        (2, *container as u64, *index as u64)
                    }
                    None => (0, 0, 0),
                };
                raw.push(kind);
                push_field(&mut raw, f2, widths[1]);
                push_field(&mut raw, f3, widths[2]);
            }
        }

        let data = flate_encode(&png_up_encode(&raw, record))?;

        let mut dict = Dictionary::new();
        dict.set("Type", "XRef");
        for (key, value) in self.trailer_dict(trailer, size, id_first, digest).iter() {
            dict.set(key, value.clone());
        }
        dict.set(
            "W",
            widths.iter().map(|&w| Object::from(w)).collect::<Vec<_>>(),
        );
        if self.incremental {
            let index: Vec<Object> = subsections
                .iter()
                .flat_map(|&(start, count)| [Object::from(start), Object::from(count)])
                .collect();
            dict.set("Index", index);
        }
        dict.set("Filter", "FlateDecode");
        let parms: Dictionary = vec![("Predictor", Object::from(12)), ("Columns", Object::from(record))]
            .into_iter()
            .collect();
        dict.set("DecodeParms", parms);
        dict.set("Length", data.len());

        let mut out = format!("{number} 0 obj\n").into_bytes();
        Object::Dictionary(dict).write(&mut out);
        push_stream_payload(&mut out, &data);
        out.extend_from_slice(format!("\nendobj\nstartxref\n{startxref}\n%%EOF\n").as_bytes());
        self.buf.extend_from_slice(&out);
        Ok(())
    }
}

fn push_stream_payload(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
}

/// Value tokens (and stream, with a correct direct `/Length`) of an object
fn serialize_body(obj: &PdfObject) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match &obj.stream {
        None => write_tokens(&obj.tokens, &mut out),
        Some(data) => {
            let length = Token::integer(data.len() as i64);
            let current = dict_get(&obj.tokens, b"Length").map(|r| &obj.tokens[r]);
            if current == Some(std::slice::from_ref(&length)) {
                write_tokens(&obj.tokens, &mut out);
            } else {
                let mut tokens = obj.tokens.clone();
                dict_set(&mut tokens, b"Length", vec![length])?;
                write_tokens(&tokens, &mut out);
            }
            push_stream_payload(&mut out, data);
        }
    }
    Ok(out)
}

fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn push_field(out: &mut Vec<u8>, value: u64, width: usize) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[8 - width..]);
}

/// 16-byte identifier derived from the written bytes
fn body_digest(body: &[u8]) -> Vec<u8> {
    let mut first = DefaultHasher::new();
    body.hash(&mut first);
    let a = first.finish();

    let mut second = DefaultHasher::new();
    (body.len(), a).hash(&mut second);
    let b = second.finish();

    let mut out = a.to_be_bytes().to_vec();
    out.extend_from_slice(&b.to_be_bytes());
    out
}
