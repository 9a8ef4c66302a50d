//! Structure tree for tagged (PDF/UA) output
//!
//! Content-keyed elements carry a per-page MCID; link elements carry an
//! object reference to their annotation. Both kinds share one flat tree
//! under the `/StructTreeRoot`, and the parent tree indexes pages first and
//! annotations after them.

use crate::object::{Dictionary, Object};
use crate::parser::PdfObject;
use crate::writer::ObjectWriter;
use crate::{PdfError, Result};
use log::debug;

/// Attributes of a marked-content span
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkedContent {
    /// Structure type, e.g. "P", "H1", "Figure"
    pub tag: String,
    pub lang: Option<String>,
    pub actual_text: Option<String>,
    /// Alternate description (`/Alt`)
    pub alt: Option<String>,
}

impl MarkedContent {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn with_actual_text(mut self, text: &str) -> Self {
        self.actual_text = Some(text.to_string());
        self
    }

    pub fn with_alt(mut self, alt: &str) -> Self {
        self.alt = Some(alt.to_string());
        self
    }
}

/// What a structure element points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKey {
    /// Marked-content id on the element's page
    Mcid(u32),
    /// Index of a link annotation; its object number is known only at emission
    Annotation(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructElem {
    pub content: MarkedContent,
    pub key: StructKey,
    /// Zero-based page index
    pub page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenSpan {
    Tagged,
    Artifact,
}

/// Collects structure elements while pages are authored
#[derive(Debug, Clone, Default)]
pub struct StructureTreeBuilder {
    elements: Vec<StructElem>,
    mcids: Vec<u32>,
    annotations: usize,
    open: Option<OpenSpan>,
}

impl StructureTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_page(&mut self, page: usize) {
        if self.mcids.len() <= page {
            self.mcids.resize(page + 1, 0);
        }
    }

    /// Open a tagged span on `page`; returns the MCID and the `BDC` operator bytes
    pub fn begin_marked_content(&mut self, page: usize, content: MarkedContent) -> Result<(u32, Vec<u8>)> {
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!(
                "marked content cannot nest ({open:?} span still open)"
            )));
        }
        self.ensure_page(page);
        let mcid = self.mcids[page];
        self.mcids[page] += 1;

        let mut tag = Vec::new();
        Object::name(&content.tag).write(&mut tag);
        let mut ops = tag;
        ops.extend_from_slice(format!(" <</MCID {mcid}>> BDC\n").as_bytes());

        self.elements.push(StructElem {
            content,
            key: StructKey::Mcid(mcid),
            page,
        });
        self.open = Some(OpenSpan::Tagged);
        Ok((mcid, ops))
    }

    /// Open an artifact span; no MCID is consumed
    pub fn begin_artifact(&mut self) -> Result<Vec<u8>> {
        if let Some(open) = self.open {
            return Err(PdfError::protocol(format!(
                "marked content cannot nest ({open:?} span still open)"
            )));
        }
        self.open = Some(OpenSpan::Artifact);
        Ok(b"/Artifact BMC\n".to_vec())
    }

    pub fn end_marked_content(&mut self) -> Result<Vec<u8>> {
        if self.open.take().is_none() {
            return Err(PdfError::protocol("end_marked_content with no open span"));
        }
        Ok(b"EMC\n".to_vec())
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Register a link element; returns its annotation index `k`
    ///
    /// The annotation's `/StructParent` is `page_count + k`.
    pub fn add_annotation(&mut self, page: usize, alt: Option<&str>) -> usize {
        self.ensure_page(page);
        let index = self.annotations;
        self.annotations += 1;
        self.elements.push(StructElem {
            content: MarkedContent {
                tag: "Link".to_string(),
                alt: alt.map(str::to_string),
                ..Default::default()
            },
            key: StructKey::Annotation(index),
            page,
        });
        index
    }

    /// Number of MCIDs handed out on `page`
    pub fn mcid_count(&self, page: usize) -> u32 {
        self.mcids.get(page).copied().unwrap_or(0)
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations
    }

    pub fn elements(&self) -> &[StructElem] {
        &self.elements
    }

    /// Write the elements, the parent tree and the root; returns the root number
    ///
    /// Numbers are planned before anything is written: elements take the next
    /// `E` numbers, the root follows them and the parent tree comes last.
    pub(crate) fn emit(&self, writer: &mut ObjectWriter, pages: &[u32], annotations: &[u32]) -> Result<u32> {
        if self.open.is_some() {
            return Err(PdfError::protocol("marked content still open at completion"));
        }
        if annotations.len() != self.annotations {
            return Err(PdfError::protocol(format!(
                "{} link elements but {} annotation objects",
                self.annotations,
                annotations.len()
            )));
        }

        let count = self.elements.len() as u32;
        let first = writer.reserve_run(count + 2)?;
        let root = first + count;
        let parent_tree = root + 1;

        let mut page_kids: Vec<Vec<Object>> = vec![Vec::new(); pages.len()];
        let mut annotation_parents: Vec<(i64, u32)> = Vec::new();

        for (i, elem) in self.elements.iter().enumerate() {
            let number = first + i as u32;
            let page = *pages
                .get(elem.page)
                .ok_or(PdfError::InvalidPage(elem.page, pages.len()))?;

            let mut dict = Dictionary::new();
            dict.set("Type", "StructElem");
            dict.set("S", Object::name(&elem.content.tag));
            dict.set("P", Object::Reference(root));
            dict.set("Pg", Object::Reference(page));
            match elem.key {
                StructKey::Mcid(mcid) => {
                    dict.set("K", mcid);
                    let slots = &mut page_kids[elem.page];
                    if slots.len() <= mcid as usize {
                        slots.resize(mcid as usize + 1, Object::Null);
                    }
                    slots[mcid as usize] = Object::Reference(number);
                }
                StructKey::Annotation(k) => {
                    let objr: Dictionary = vec![
                        ("Type", "OBJR".into()),
                        ("Obj", Object::Reference(annotations[k])),
                        ("Pg", Object::Reference(page)),
                    ]
                    .into_iter()
                    .collect();
                    dict.set("K", objr);
                    annotation_parents.push(((pages.len() + k) as i64, number));
                }
            }
            if let Some(lang) = &elem.content.lang {
                dict.set("Lang", Object::text_string(lang));
            }
            if let Some(alt) = &elem.content.alt {
                dict.set("Alt", Object::text_string(alt));
            }
            if let Some(text) = &elem.content.actual_text {
                dict.set("ActualText", Object::text_string(text));
            }
            writer.put(&PdfObject::new(number, &Object::Dictionary(dict)))?;
        }

        let kids: Vec<Object> = (first..root).map(Object::Reference).collect();
        let root_dict: Dictionary = vec![
            ("Type", "StructTreeRoot".into()),
            ("K", kids.into()),
            ("ParentTree", Object::Reference(parent_tree)),
            (
                "ParentTreeNextKey",
                ((pages.len() + self.annotations) as i64).into(),
            ),
        ]
        .into_iter()
        .collect();
        writer.put(&PdfObject::new(root, &Object::Dictionary(root_dict)))?;

        let mut nums = Vec::new();
        for (index, kids) in page_kids.into_iter().enumerate() {
            nums.push(Object::from(index));
            nums.push(Object::Array(kids));
        }
        annotation_parents.sort_by_key(|&(key, _)| key);
        for (key, number) in annotation_parents {
            nums.push(Object::Integer(key));
            nums.push(Object::Reference(number));
        }
        let mut tree = Dictionary::new();
        tree.set("Nums", nums);
        writer.put(&PdfObject::new(parent_tree, &Object::Dictionary(tree)))?;

        debug!(
            "structure tree: {} elements, root {root}, parent tree {parent_tree}",
            count
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfVersion, XRefFormat};
    use crate::reader::ParsedDocument;
    use crate::writer::Trailer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mcids_are_per_page() {
        let mut tree = StructureTreeBuilder::new();
        let mut seen = Vec::new();
        for page in [0, 0, 1, 0, 1] {
            let (mcid, _) = tree
                .begin_marked_content(page, MarkedContent::new("P"))
                .unwrap();
            tree.end_marked_content().unwrap();
            seen.push((page, mcid));
        }
        assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (0, 2), (1, 1)]);
        assert_eq!(tree.mcid_count(0), 3);
        assert_eq!(tree.mcid_count(1), 2);
        assert_eq!(tree.mcid_count(7), 0);
    }

    #[test]
    fn test_marker_bytes() {
        let mut tree = StructureTreeBuilder::new();
        let (_, ops) = tree
            .begin_marked_content(0, MarkedContent::new("H1"))
            .unwrap();
        assert_eq!(ops, b"/H1 <</MCID 0>> BDC\n".to_vec());
        assert_eq!(tree.end_marked_content().unwrap(), b"EMC\n".to_vec());
        assert_eq!(tree.begin_artifact().unwrap(), b"/Artifact BMC\n".to_vec());
        tree.end_marked_content().unwrap();
        assert_eq!(tree.mcid_count(0), 1);
    }

    #[test]
    fn test_nesting_is_rejected() {
        let mut tree = StructureTreeBuilder::new();
        tree.begin_marked_content(0, MarkedContent::new("P")).unwrap();
        assert!(matches!(
            tree.begin_marked_content(0, MarkedContent::new("Span")),
            Err(PdfError::ProtocolViolation(_))
        ));
        assert!(tree.begin_artifact().is_err());
        tree.end_marked_content().unwrap();
        assert!(matches!(
            tree.end_marked_content(),
            Err(PdfError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_emit_numbers_and_parent_tree() {
        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let page_a = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();
        let page_b = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();
        let annot = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();

        let mut tree = StructureTreeBuilder::new();
        tree.begin_marked_content(0, MarkedContent::new("P").with_lang("th-TH"))
            .unwrap();
        tree.end_marked_content().unwrap();
        tree.begin_marked_content(1, MarkedContent::new("Figure").with_alt("Logo"))
            .unwrap();
        tree.end_marked_content().unwrap();
        assert_eq!(tree.add_annotation(1, Some("Home page")), 0);

        let first = writer.peek_next_number();
        let root = tree.emit(&mut writer, &[page_a, page_b], &[annot]).unwrap();
        assert_eq!(root, first + 3);

        let catalog: Dictionary = vec![("Type", "Catalog".into()), ("StructTreeRoot", Object::Reference(root))]
            .into_iter()
            .collect();
        let catalog = writer.add(&Object::Dictionary(catalog)).unwrap();
        let bytes = writer
            .finalize(Trailer { root: catalog, ..Default::default() }, XRefFormat::Table)
            .unwrap();
        let doc = ParsedDocument::load(bytes).unwrap();
        doc.validate_references().unwrap();

        let root_obj = doc.get(root).unwrap();
        assert!(root_obj.is_type(b"StructTreeRoot"));
        assert_eq!(root_obj.get(b"ParentTreeNextKey"), Some(Object::Integer(3)));

        let tree_dict = doc.get(root + 1).unwrap().dictionary().unwrap();
        let nums = tree_dict.get_array(b"Nums").unwrap();
        assert_eq!(nums.len(), 6);
        assert_eq!(nums[0], Object::Integer(0));
        assert_eq!(nums[1], Object::Array(vec![Object::Reference(first)]));
        assert_eq!(nums[4], Object::Integer(2));
        assert_eq!(nums[5], Object::Reference(first + 2));

        let link = doc.get(first + 2).unwrap().dictionary().unwrap();
        let objr = link.get_dict(b"K").unwrap();
        assert!(objr.type_is(b"OBJR"));
        assert_eq!(objr.get_reference(b"Obj"), Some(annot));
        assert_eq!(link.get_reference(b"P"), Some(root));
    }

    #[test]
    fn test_emit_rejects_open_span() {
        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let mut tree = StructureTreeBuilder::new();
        tree.begin_artifact().unwrap();
        assert!(tree.emit(&mut writer, &[], &[]).is_err());
    }
}
