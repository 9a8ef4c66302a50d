//! Links, named destinations and bookmarks
//!
//! Targets are recorded by page index while pages are authored and turned
//! into page object references only once every page has a number.

use crate::object::{Dictionary, Object};
use crate::parser::PdfObject;
use crate::writer::ObjectWriter;
use crate::{PdfError, Result};
use std::collections::BTreeMap;

/// Rectangle in default user space, origin at the lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// `[llx lly urx ury]`
    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            self.x.into(),
            self.y.into(),
            (self.x + self.width).into(),
            (self.y + self.height).into(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Zero-based page index; `top` scrolls to a y position, otherwise the page is fitted
    Page { page: usize, top: Option<f64> },
    /// Entry of the document's named destination tree
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Uri(String),
    Destination(Destination),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Link {
    pub page: usize,
    pub rect: Rect,
    pub target: LinkTarget,
    /// `/Contents` alternate text
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Bookmark {
    title: String,
    level: usize,
    destination: Destination,
}

/// Explicit destination array for a page
fn page_destination(page: usize, top: Option<f64>, pages: &[u32]) -> Result<Object> {
    let number = *pages
        .get(page)
        .ok_or(PdfError::InvalidPage(page, pages.len()))?;
    let mut dest = vec![Object::Reference(number)];
    match top {
        Some(top) => dest.extend([Object::name("XYZ"), Object::Null, top.into(), Object::Null]),
        None => dest.push(Object::name("Fit")),
    }
    Ok(Object::Array(dest))
}

impl Link {
    /// The `/Annot` dictionary; `struct_parent` is set for tagged output
    pub fn annotation_dictionary(
        &self,
        pages: &[u32],
        navigation: &Navigation,
        struct_parent: Option<usize>,
    ) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        dict.set("Type", "Annot");
        dict.set("Subtype", "Link");
        dict.set("Rect", self.rect.to_object());
        dict.set(
            "Border",
            vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
        );
        match &self.target {
            LinkTarget::Uri(uri) => {
                let action: Dictionary = vec![
                    ("S", "URI".into()),
                    ("URI", Object::string_literal(uri.as_bytes())),
                ]
                .into_iter()
                .collect();
                dict.set("A", action);
            }
            LinkTarget::Destination(dest) => {
                dict.set("Dest", navigation.resolve(dest, pages)?);
            }
        }
        if let Some(alt) = &self.alt {
            dict.set("Contents", Object::text_string(alt));
        }
        if let Some(key) = struct_parent {
            dict.set("StructParent", key);
        }
        Ok(dict)
    }
}

/// Collected navigation entries of one document
#[derive(Debug, Clone, Default)]
pub(crate) struct Navigation {
    links: Vec<Link>,
    named: BTreeMap<String, Destination>,
    bookmarks: Vec<Bookmark>,
}

impl Navigation {
    pub fn add_link(&mut self, link: Link) -> usize {
        self.links.push(link);
        self.links.len() - 1
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links placed on `page`, with their index in insertion order
    pub fn links_on(&self, page: usize) -> impl Iterator<Item = (usize, &Link)> {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, link)| link.page == page)
    }

    pub fn add_named_destination(&mut self, name: &str, page: usize, top: Option<f64>) {
        self.named
            .insert(name.to_string(), Destination::Page { page, top });
    }

    pub fn add_bookmark(&mut self, title: &str, level: usize, destination: Destination) {
        self.bookmarks.push(Bookmark {
            title: title.to_string(),
            level,
            destination,
        });
    }

    /// Value for a `/Dest` entry
    pub fn resolve(&self, dest: &Destination, pages: &[u32]) -> Result<Object> {
        match dest {
            Destination::Page { page, top } => page_destination(*page, *top, pages),
            Destination::Named(name) => {
                if !self.named.contains_key(name) {
                    return Err(PdfError::protocol(format!(
                        "unknown named destination '{name}'"
                    )));
                }
                Ok(Object::string_literal(name.as_bytes()))
            }
        }
    }

    /// Write the `/Dests` name tree; returns its number when any name exists
    pub fn emit_named_destinations(&self, writer: &mut ObjectWriter, pages: &[u32]) -> Result<Option<u32>> {
        if self.named.is_empty() {
            return Ok(None);
        }
        let mut names = Vec::with_capacity(self.named.len() * 2);
        for (name, dest) in &self.named {
            names.push(Object::string_literal(name.as_bytes()));
            names.push(self.resolve(dest, pages)?);
        }
        let mut tree = Dictionary::new();
        tree.set("Names", names);
        Ok(Some(writer.add(&Object::Dictionary(tree))?))
    }

    /// Write the outline tree; returns the `/Outlines` number when bookmarks exist
    ///
    /// The root takes the next number and items follow it in insertion order,
    /// so sibling and parent links are known before anything is written.
    pub fn emit_outlines(&self, writer: &mut ObjectWriter, pages: &[u32]) -> Result<Option<u32>> {
        if self.bookmarks.is_empty() {
            return Ok(None);
        }

        let n = self.bookmarks.len();
        let root = writer.reserve_run(n as u32 + 1)?;
        let number = |i: usize| root + 1 + i as u32;

        // Parent of each item (None = root), levels clamped to one below the previous item
        let mut parents: Vec<Option<usize>> = Vec::with_capacity(n);
        let mut stack: Vec<usize> = Vec::new();
        for (i, bookmark) in self.bookmarks.iter().enumerate() {
            let level = bookmark.level.min(stack.len());
            stack.truncate(level);
            parents.push(stack.last().copied());
            stack.push(i);
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut top_level: Vec<usize> = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(i),
                None => top_level.push(i),
            }
        }

        // Children always follow their parent, so a reverse pass sees them first
        let mut descendants = vec![0i64; n];
        for i in (0..n).rev() {
            let total: i64 = children[i].iter().map(|&c| 1 + descendants[c]).sum();
            descendants[i] = total;
        }

        for (i, bookmark) in self.bookmarks.iter().enumerate() {
            let mut item = Dictionary::new();
            item.set("Title", Object::text_string(&bookmark.title));
            item.set(
                "Parent",
                Object::Reference(parents[i].map(number).unwrap_or(root)),
            );
            let row: &[usize] = match parents[i] {
                Some(p) => &children[p],
                None => &top_level,
            };
            if let Some(pos) = row.iter().position(|&s| s == i) {
                if pos > 0 {
                    item.set("Prev", Object::Reference(number(row[pos - 1])));
                }
                if let Some(&next) = row.get(pos + 1) {
                    item.set("Next", Object::Reference(number(next)));
                }
            }
            if let (Some(&first), Some(&last)) = (children[i].first(), children[i].last()) {
                item.set("First", Object::Reference(number(first)));
                item.set("Last", Object::Reference(number(last)));
                item.set("Count", descendants[i]);
            }
            item.set("Dest", self.resolve(&bookmark.destination, pages)?);
            writer.put(&PdfObject::new(number(i), &Object::Dictionary(item)))?;
        }

        let mut outlines = Dictionary::new();
        outlines.set("Type", "Outlines");
        if let (Some(&first), Some(&last)) = (top_level.first(), top_level.last()) {
            outlines.set("First", Object::Reference(number(first)));
            outlines.set("Last", Object::Reference(number(last)));
        }
        outlines.set("Count", n as i64);
        writer.put(&PdfObject::new(root, &Object::Dictionary(outlines)))?;

        Ok(Some(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfVersion, XRefFormat};
    use crate::reader::ParsedDocument;
    use crate::writer::Trailer;
    use pretty_assertions::assert_eq;

    fn finish(mut writer: ObjectWriter, extra: &[(&str, u32)]) -> ParsedDocument {
        let mut catalog = Dictionary::new();
        catalog.set("Type", "Catalog");
        for (key, number) in extra {
            catalog.set(*key, Object::Reference(*number));
        }
        let root = writer.add(&Object::Dictionary(catalog)).unwrap();
        let bytes = writer
            .finalize(Trailer { root, ..Default::default() }, XRefFormat::Table)
            .unwrap();
        ParsedDocument::load(bytes).unwrap()
    }

    #[test]
    fn test_rect_to_object() {
        assert_eq!(
            Rect::new(10.0, 20.0, 100.0, 15.5).to_object(),
            Object::Array(vec![
                Object::Real(10.0),
                Object::Real(20.0),
                Object::Real(110.0),
                Object::Real(35.5)
            ])
        );
    }

    #[test]
    fn test_link_annotation() {
        let mut nav = Navigation::default();
        nav.add_named_destination("intro", 1, Some(700.0));
        let uri = Link {
            page: 0,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            target: LinkTarget::Uri("https://example.com".into()),
            alt: Some("Example".into()),
        };
        let dict = uri.annotation_dictionary(&[4, 9], &nav, Some(2)).unwrap();
        assert!(dict.type_is(b"Annot"));
        assert_eq!(dict.get_integer(b"StructParent"), Some(2));
        assert_eq!(
            dict.get_dict(b"A").and_then(|a| a.get_name(b"S")),
            Some(&b"URI"[..])
        );

        let internal = Link {
            target: LinkTarget::Destination(Destination::Page { page: 1, top: None }),
            ..uri.clone()
        };
        let dict = internal.annotation_dictionary(&[4, 9], &nav, None).unwrap();
        assert_eq!(
            dict.get(b"Dest"),
            Some(&Object::Array(vec![Object::Reference(9), Object::name("Fit")]))
        );
        assert!(!dict.has(b"StructParent"));
    }

    #[test]
    fn test_unknown_targets() {
        let nav = Navigation::default();
        assert!(matches!(
            nav.resolve(&Destination::Page { page: 3, top: None }, &[1, 2]),
            Err(PdfError::InvalidPage(3, 2))
        ));
        assert!(matches!(
            nav.resolve(&Destination::Named("missing".into()), &[1]),
            Err(PdfError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_named_destinations_sorted() {
        let mut nav = Navigation::default();
        nav.add_named_destination("zeta", 0, None);
        nav.add_named_destination("alpha", 0, Some(500.0));

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let page = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();
        let dests = nav
            .emit_named_destinations(&mut writer, &[page])
            .unwrap()
            .unwrap();
        let doc = finish(writer, &[("Dests", dests)]);

        let tree = doc.get(dests).unwrap().dictionary().unwrap();
        let names = tree.get_array(b"Names").unwrap();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0].as_string(), Some(&b"alpha"[..]));
        assert_eq!(names[2].as_string(), Some(&b"zeta"[..]));
    }

    #[test]
    fn test_outline_tree() {
        let mut nav = Navigation::default();
        let dest = |page| Destination::Page { page, top: None };
        nav.add_bookmark("Chapter 1", 0, dest(0));
        nav.add_bookmark("Section 1.1", 1, dest(0));
        nav.add_bookmark("Section 1.2", 1, dest(1));
        nav.add_bookmark("Chapter 2", 0, dest(1));
        // Jumps two levels; attached under Chapter 2
        nav.add_bookmark("Deep", 3, dest(1));

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let p1 = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();
        let p2 = writer.add(&Object::Dictionary(Dictionary::new())).unwrap();
        let root = nav.emit_outlines(&mut writer, &[p1, p2]).unwrap().unwrap();
        let doc = finish(writer, &[("Outlines", root)]);
        doc.validate_references().unwrap();

        let outlines = doc.get(root).unwrap().dictionary().unwrap();
        assert_eq!(outlines.get_reference(b"First"), Some(root + 1));
        assert_eq!(outlines.get_reference(b"Last"), Some(root + 4));
        assert_eq!(outlines.get_integer(b"Count"), Some(5));

        let chapter1 = doc.get(root + 1).unwrap().dictionary().unwrap();
        assert_eq!(chapter1.get_reference(b"First"), Some(root + 2));
        assert_eq!(chapter1.get_reference(b"Last"), Some(root + 3));
        assert_eq!(chapter1.get_integer(b"Count"), Some(2));
        assert_eq!(chapter1.get_reference(b"Next"), Some(root + 4));

        let section2 = doc.get(root + 3).unwrap().dictionary().unwrap();
        assert_eq!(section2.get_reference(b"Prev"), Some(root + 2));
        assert_eq!(section2.get_reference(b"Parent"), Some(root + 1));

        let deep = doc.get(root + 5).unwrap().dictionary().unwrap();
        assert_eq!(deep.get_reference(b"Parent"), Some(root + 4));
    }
}
