//! Resolved object table of an existing PDF

use crate::object::{Dictionary, Object};
use crate::parser::{parse_object_at, ObjectStream, PdfObject};
use crate::xref::{resolve_xref, XRefEntry, XRefKind, XRefTable};
use crate::{PdfError, Result};
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// Maximum `/Parent` hops when looking up inherited page attributes
const MAX_INHERITANCE_DEPTH: usize = 64;

/// A parsed foreign document
///
/// Objects are kept in a dense table indexed by object number; numbering
/// gaps and structural objects (object streams, xref streams) hold stubs.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    data: Vec<u8>,
    version: String,
    table: Vec<PdfObject>,
    xref: XRefTable,
}

impl ParsedDocument {
    /// Parse a complete PDF held in memory
    pub fn load(data: Vec<u8>) -> Result<Self> {
        let version = read_version(&data)?;
        let xref = resolve_xref(&data)?;
        let max = xref.max_number();

        let mut table: Vec<PdfObject> = (1..=max).map(PdfObject::stub).collect();
        let length_of = |n: u32| -> Option<usize> {
            match xref.get(n)? {
                XRefEntry::Offset(pos) => {
                    let obj = parse_object_at(&data, pos, &|_| None).ok()?;
                    usize::try_from(obj.value().ok()?.as_integer()?).ok()
                }
                XRefEntry::Compressed { .. } => None,
            }
        };

        let mut containers: BTreeMap<u32, Vec<(u32, usize)>> = BTreeMap::new();

        for (&number, &entry) in &xref.entries {
            if number == 0 {
                continue;
            }
            match entry {
                XRefEntry::Offset(pos) => {
                    let obj = parse_object_at(&data, pos, &length_of)?;
                    if obj.number != number {
                        return Err(PdfError::syntax(pos, format!("header of object {number}")));
                    }
                    let slot = (number as usize)
                        .checked_sub(1)
                        .and_then(|i| table.get_mut(i))
                        .ok_or(PdfError::DanglingReference(number))?;
                    *slot = obj;
                }
                XRefEntry::Compressed { container, index } => {
                    containers.entry(container).or_default().push((number, index));
                }
            }
        }

        for (container, members) in &containers {
            let holder = (*container as usize)
                .checked_sub(1)
                .and_then(|i| table.get(i))
                .filter(|obj| !obj.is_stub() && obj.stream.is_some())
                .ok_or(PdfError::DanglingReference(*container))?;
            let stream = ObjectStream::new(holder)?;
            debug!("object stream {container}: {} members", stream.len());

            for &(number, index) in members {
                let member = stream.get(index)?;
                if member.number != number {
                    return Err(PdfError::syntax(
                        0,
                        format!("object {number} at index {index} of object stream {container}"),
                    ));
                }
                let slot = (number as usize)
                    .checked_sub(1)
                    .and_then(|i| table.get_mut(i))
                    .ok_or(PdfError::DanglingReference(number))?;
                *slot = member;
            }
        }

        for slot in table.iter_mut() {
            if slot.is_type(b"ObjStm") || slot.is_type(b"XRef") {
                *slot = PdfObject::stub(slot.number);
            }
        }

        debug!(
            "loaded PDF {version}: {} objects, {} live",
            table.len(),
            table.iter().filter(|o| !o.is_stub()).count()
        );

        Ok(Self {
            data,
            version,
            table,
            xref,
        })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::load(data.to_vec())
    }

    /// Original file bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Header version, e.g. "1.7"
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Highest object number in the table
    pub fn max_number(&self) -> u32 {
        self.table.len() as u32
    }

    /// Dense table including stubs, ordered by object number
    pub fn table(&self) -> &[PdfObject] {
        &self.table
    }

    /// Live objects in number order
    pub fn objects(&self) -> impl Iterator<Item = &PdfObject> {
        self.table.iter().filter(|obj| !obj.is_stub())
    }

    pub fn get(&self, number: u32) -> Result<&PdfObject> {
        number
            .checked_sub(1)
            .and_then(|i| self.table.get(i as usize))
            .filter(|obj| !obj.is_stub())
            .ok_or(PdfError::DanglingReference(number))
    }

    pub fn contains(&self, number: u32) -> bool {
        self.get(number).is_ok()
    }

    /// Follow a reference; other values are returned as they are
    pub fn resolve(&self, value: &Object) -> Result<Object> {
        match value {
            Object::Reference(n) => self.get(*n)?.value(),
            other => Ok(other.clone()),
        }
    }

    /// Resolve a value that should be a dictionary
    pub fn resolve_dict(&self, value: &Object) -> Option<Dictionary> {
        match self.resolve(value).ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn xref_kind(&self) -> XRefKind {
        self.xref.kind
    }

    pub fn startxref(&self) -> usize {
        self.xref.startxref
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.xref.trailer
    }

    /// Catalog object number
    pub fn root(&self) -> Result<u32> {
        let root = self
            .trailer()
            .get_reference(b"Root")
            .ok_or_else(|| PdfError::syntax(self.startxref(), "/Root in trailer"))?;
        self.get(root)?;
        Ok(root)
    }

    pub fn info(&self) -> Option<u32> {
        self.trailer()
            .get_reference(b"Info")
            .filter(|&n| self.contains(n))
    }

    /// First element of the trailer `/ID`
    pub fn id(&self) -> Option<Vec<u8>> {
        self.trailer()
            .get_array(b"ID")?
            .first()?
            .as_string()
            .map(<[u8]>::to_vec)
    }

    /// Every `N G R` must name a live object
    pub fn validate_references(&self) -> Result<()> {
        for obj in self.objects() {
            for target in obj.references() {
                if !self.contains(target) {
                    return Err(PdfError::DanglingReference(target));
                }
            }
        }
        Ok(())
    }

    /// The unique `/Type /Pages` node without `/Parent`, else the catalog's `/Pages`
    pub fn pages_root(&self) -> Result<u32> {
        let candidates: Vec<u32> = self
            .objects()
            .filter(|obj| obj.is_type(b"Pages") && obj.get(b"Parent").is_none())
            .map(|obj| obj.number)
            .collect();

        if let [only] = candidates.as_slice() {
            return Ok(*only);
        }

        let root = self.root()?;
        let pages = self
            .get(root)?
            .get_reference(b"Pages")
            .ok_or_else(|| PdfError::syntax(0, "/Pages in catalog"))?;
        self.get(pages)?;
        Ok(pages)
    }

    /// Leaf page objects in document order
    pub fn page_numbers(&self) -> Result<Vec<u32>> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![self.pages_root()?];

        while let Some(number) = stack.pop() {
            if !seen.insert(number) {
                return Err(PdfError::syntax(0, format!("page tree without cycles at object {number}")));
            }
            let node = self.get(number)?;

            match node.get(b"Kids") {
                Some(kids) if !node.is_type(b"Page") => {
                    let kids = match self.resolve(&kids)? {
                        Object::Array(items) => items,
                        _ => return Err(PdfError::syntax(0, format!("/Kids array in object {number}"))),
                    };
                    for kid in kids.iter().rev() {
                        let kid = kid
                            .as_reference()
                            .ok_or_else(|| PdfError::syntax(0, "page tree reference"))?;
                        stack.push(kid);
                    }
                }
                _ => pages.push(number),
            }
        }

        Ok(pages)
    }

    /// Page attribute looked up through the `/Parent` chain
    pub fn inherited(&self, page: u32, key: &[u8]) -> Option<Object> {
        let mut current = page;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let node = self.get(current).ok()?;
            if let Some(value) = node.get(key) {
                return Some(value);
            }
            current = node.get_reference(b"Parent")?;
        }
        None
    }
}

fn read_version(data: &[u8]) -> Result<String> {
    let window = &data[..data.len().min(1024)];
    let marker = b"%PDF-";
    let start = window
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or_else(|| PdfError::syntax(0, "%PDF- header"))?
        + marker.len();

    let version: String = window[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();

    if version.is_empty() {
        return Err(PdfError::syntax(start, "header version"));
    }
    Ok(version)
}
