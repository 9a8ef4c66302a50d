//! Merge adapter for existing PDFs
//!
//! Foreign objects keep their numbers and pass through token for token;
//! only the keys an edit touches are rewritten. New objects are numbered
//! after the foreign maximum.

use crate::config::{MergeMode, WriteOptions, XRefFormat};
use crate::filter::flate_encode;
use crate::font::FontResource;
use crate::image::{image_operators, ImageResource};
use crate::navigation::{Link, LinkTarget, Navigation, Rect};
use crate::object::{Dictionary, Object};
use crate::parser::PdfObject;
use crate::reader::ParsedDocument;
use crate::resources::{FontId, ImageId, ResourceRegistry};
use crate::writer::{ObjectWriter, Trailer};
use crate::xref::XRefKind;
use crate::{PdfError, Result};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Resource categories a merge can add to a page
const CATEGORIES: [&[u8]; 4] = [b"Font", b"XObject", b"ExtGState", b"Properties"];

/// An existing PDF opened for editing
#[derive(Debug)]
pub struct MergeDocument {
    options: WriteOptions,
    source: ParsedDocument,
    /// Leaf page object numbers in document order
    pages: Vec<u32>,
    /// Edited copies of foreign objects
    modified: BTreeMap<u32, PdfObject>,
    /// Content appended per page index
    content: BTreeMap<usize, Vec<u8>>,
    resources: ResourceRegistry,
    page_fonts: BTreeMap<usize, BTreeSet<String>>,
    page_images: BTreeMap<usize, BTreeSet<String>>,
    navigation: Navigation,
    completed: bool,
}

impl MergeDocument {
    /// Open a PDF document from bytes
    ///
    /// # Arguments
    /// * `data` - PDF file bytes
    /// * `options` - `merge_mode` selects a full rewrite or an incremental update
    ///
    /// # Example
    /// ```ignore
    /// let mut doc = MergeDocument::open_from_bytes(&bytes, WriteOptions::default())?;
    /// ```
    pub fn open_from_bytes(data: &[u8], options: WriteOptions) -> Result<Self> {
        let source = ParsedDocument::from_bytes(data)?;
        let pages = source.page_numbers()?;

        let mut resources = ResourceRegistry::new();
        let mut reserved = BTreeSet::new();
        for &page in &pages {
            let Some(dict) = source
                .inherited(page, b"Resources")
                .and_then(|r| source.resolve_dict(&r))
            else {
                continue;
            };
            for category in CATEGORIES {
                if let Some(names) = dict.get(category).and_then(|c| source.resolve_dict(c)) {
                    reserved.extend(
                        names
                            .iter()
                            .map(|(name, _)| String::from_utf8_lossy(name).into_owned()),
                    );
                }
            }
        }
        resources.reserve_names(reserved);

        debug!(
            "opened PDF {} for merging: {} pages, {} objects",
            source.version(),
            pages.len(),
            source.max_number()
        );

        Ok(Self {
            options,
            source,
            pages,
            modified: BTreeMap::new(),
            content: BTreeMap::new(),
            resources,
            page_fonts: BTreeMap::new(),
            page_images: BTreeMap::new(),
            navigation: Navigation::default(),
            completed: false,
        })
    }

    /// The parsed foreign document
    pub fn source(&self) -> &ParsedDocument {
        &self.source
    }

    /// Get the number of pages in the document
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn check_open(&self) -> Result<()> {
        if self.completed {
            return Err(PdfError::protocol("document already completed"));
        }
        Ok(())
    }

    fn check_page(&self, page: usize) -> Result<()> {
        self.check_open()?;
        if page >= self.pages.len() {
            return Err(PdfError::InvalidPage(page, self.pages.len()));
        }
        Ok(())
    }

    pub fn register_font(&mut self, font: FontResource) -> Result<FontId> {
        self.check_open()?;
        Ok(self.resources.register_font(font))
    }

    /// Make a font available on a page and return its resource name
    pub fn use_font(&mut self, page: usize, font: FontId) -> Result<String> {
        self.check_page(page)?;
        let name = self.resources.use_font(font)?;
        self.page_fonts.entry(page).or_default().insert(name.clone());
        Ok(name)
    }

    pub fn register_image(&mut self, image: ImageResource) -> Result<ImageId> {
        self.check_open()?;
        Ok(self.resources.register_image(image))
    }

    /// Make an image available on a page and return its resource name
    pub fn use_image(&mut self, page: usize, image: ImageId) -> Result<String> {
        self.check_page(page)?;
        let name = self.resources.use_image(image)?;
        self.page_images.entry(page).or_default().insert(name.clone());
        Ok(name)
    }

    pub fn draw_image(&mut self, page: usize, image: ImageId, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        let name = self.use_image(page, image)?;
        self.append_content(page, &image_operators(&name, x, y, width, height))
    }

    /// Append operators to a page; they land in one new content stream per page
    pub fn append_content(&mut self, page: usize, content: &[u8]) -> Result<()> {
        self.check_page(page)?;
        self.content
            .entry(page)
            .or_default()
            .extend_from_slice(content);
        Ok(())
    }

    /// Add a URI link annotation to a page
    pub fn add_link(&mut self, page: usize, rect: Rect, uri: &str) -> Result<()> {
        self.check_page(page)?;
        self.navigation.add_link(Link {
            page,
            rect,
            target: LinkTarget::Uri(uri.to_string()),
            alt: None,
        });
        Ok(())
    }

    /// Current version of a foreign object (edited copy first)
    fn current(&self, number: u32) -> Result<PdfObject> {
        match self.modified.get(&number) {
            Some(obj) => Ok(obj.clone()),
            None => self.source.get(number).cloned(),
        }
    }

    fn edit(&mut self, number: u32) -> Result<&mut PdfObject> {
        if !self.modified.contains_key(&number) {
            let obj = self.source.get(number)?.clone();
            self.modified.insert(number, obj);
        }
        self.modified
            .get_mut(&number)
            .ok_or(PdfError::DanglingReference(number))
    }

    fn current_dict(&self, number: u32) -> Result<Dictionary> {
        self.current(number)?
            .dictionary()
            .ok_or_else(|| PdfError::syntax(0, format!("dictionary in object {number}")))
    }

    fn acro_form(&self) -> Result<(Option<u32>, Dictionary)> {
        let root = self.source.root()?;
        let catalog = self.current(root)?;
        match catalog.get(b"AcroForm") {
            Some(Object::Reference(n)) => Ok((Some(n), self.current_dict(n)?)),
            Some(Object::Dictionary(dict)) => Ok((None, dict)),
            _ => Err(PdfError::FieldNotFound("document has no /AcroForm".to_string())),
        }
    }

    /// Terminal form fields as `(fully qualified name, object number, field type)`
    fn fields(&self) -> Result<Vec<(String, u32, Option<Vec<u8>>)>> {
        let (_, form) = self.acro_form()?;
        let roots = match form.get(b"Fields") {
            Some(value) => match self.source.resolve(value)? {
                Object::Array(items) => items,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        let mut found = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<(u32, String, Option<Vec<u8>>)> = roots
            .iter()
            .rev()
            .filter_map(Object::as_reference)
            .map(|n| (n, String::new(), None))
            .collect();

        while let Some((number, parent, inherited_type)) = stack.pop() {
            if !seen.insert(number) {
                continue;
            }
            let field = self.current_dict(number)?;
            let partial = field.get(b"T").and_then(Object::as_string).map(decode_text);
            let name = match (parent.is_empty(), partial) {
                (_, None) => parent.clone(),
                (true, Some(partial)) => partial,
                (false, Some(partial)) => format!("{parent}.{partial}"),
            };
            let field_type = field
                .get_name(b"FT")
                .map(<[u8]>::to_vec)
                .or(inherited_type);

            let kids: Vec<u32> = match field.get(b"Kids") {
                Some(value) => match self.source.resolve(value)? {
                    Object::Array(items) => items.iter().filter_map(Object::as_reference).collect(),
                    _ => Vec::new(),
                },
                None => Vec::new(),
            };

            // Kids without /T are widgets of this field
            let named_kids: Vec<u32> = kids
                .iter()
                .copied()
                .filter(|&k| {
                    self.current_dict(k)
                        .map(|d| d.has(b"T"))
                        .unwrap_or(false)
                })
                .collect();

            if named_kids.is_empty() {
                found.push((name, number, field_type));
            } else {
                for kid in named_kids.into_iter().rev() {
                    stack.push((kid, name.clone(), field_type.clone()));
                }
            }
        }
        Ok(found)
    }

    /// Fully qualified names of all terminal form fields
    pub fn field_names(&self) -> Result<Vec<String>> {
        Ok(self.fields()?.into_iter().map(|(name, _, _)| name).collect())
    }

    /// Set a form field value and ask viewers to regenerate appearances
    ///
    /// # Arguments
    /// * `name` - Fully qualified field name, parts joined by `.`
    /// * `value` - Text value; for button fields the name of the state to select
    pub fn fill_form_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.check_open()?;
        let (number, field_type) = self
            .fields()?
            .into_iter()
            .find(|(qualified, _, _)| qualified == name)
            .map(|(_, number, field_type)| (number, field_type))
            .ok_or_else(|| PdfError::FieldNotFound(name.to_string()))?;

        let value = match field_type.as_deref() {
            Some(b"Btn") => Object::name(value),
            _ => Object::text_string(value),
        };
        self.edit(number)?.set(b"V", &value)?;

        match self.acro_form()? {
            (Some(form), _) => {
                self.edit(form)?.set(b"NeedAppearances", &Object::Boolean(true))?;
            }
            (None, mut form) => {
                form.set("NeedAppearances", true);
                let root = self.source.root()?;
                self.edit(root)?.set(b"AcroForm", &Object::Dictionary(form))?;
            }
        }
        Ok(())
    }

    /// Add `entries` to the `category` sub-dictionary of a Resources dictionary
    ///
    /// A referenced sub-dictionary is edited in its own object and `dict`
    /// is left alone; otherwise the inline sub-dictionary in `dict` is updated.
    fn merge_category(&mut self, dict: &mut Dictionary, category: &[u8], entries: &[(String, u32)]) -> Result<bool> {
        match dict.get(category) {
            Some(Object::Reference(number)) => {
                let number = *number;
                let holder = self.edit(number)?;
                for (name, target) in entries {
                    holder.set(name.as_bytes(), &Object::Reference(*target))?;
                }
                Ok(false)
            }
            Some(Object::Dictionary(existing)) => {
                let mut merged = existing.clone();
                for (name, target) in entries {
                    merged.set(name.as_str(), Object::Reference(*target));
                }
                dict.set(category.to_vec(), merged);
                Ok(true)
            }
            _ => {
                let mut fresh = Dictionary::new();
                for (name, target) in entries {
                    fresh.set(name.as_str(), Object::Reference(*target));
                }
                dict.set(category.to_vec(), fresh);
                Ok(true)
            }
        }
    }

    /// Add resources to one page, wherever its Resources dictionary lives
    fn add_page_resources(&mut self, page: u32, additions: &[(&[u8], Vec<(String, u32)>)]) -> Result<()> {
        let page_obj = self.current(page)?;
        match page_obj.get(b"Resources") {
            Some(Object::Reference(holder)) => {
                let mut dict = self.current_dict(holder)?;
                for (category, entries) in additions {
                    if self.merge_category(&mut dict, category, entries)? {
                        let value = dict.get(category).cloned().unwrap_or(Object::Null);
                        self.edit(holder)?.set(category, &value)?;
                    }
                }
            }
            existing => {
                let mut dict = match existing {
                    Some(Object::Dictionary(dict)) => dict,
                    _ => self
                        .source
                        .inherited(page, b"Resources")
                        .and_then(|r| self.source.resolve_dict(&r))
                        .unwrap_or_default(),
                };
                for (category, entries) in additions {
                    self.merge_category(&mut dict, category, entries)?;
                }
                self.edit(page)?.set(b"Resources", &Object::Dictionary(dict))?;
            }
        }
        Ok(())
    }

    /// Append one content stream reference, normalizing `/Contents` to an array
    fn push_contents(&mut self, page: u32, stream: u32) -> Result<()> {
        let mut items = match self.current(page)?.get(b"Contents") {
            Some(Object::Array(items)) => items,
            Some(Object::Reference(target)) => match self.source.get(target)?.value()? {
                Object::Array(items) => items,
                _ => vec![Object::Reference(target)],
            },
            _ => Vec::new(),
        };
        items.push(Object::Reference(stream));
        self.edit(page)?.set(b"Contents", &Object::Array(items))
    }

    fn push_annotation(&mut self, page: u32, annotation: u32) -> Result<()> {
        match self.current(page)?.get(b"Annots") {
            Some(Object::Reference(holder)) => {
                let mut items = match self.current(holder)?.value()? {
                    Object::Array(items) => items,
                    _ => Vec::new(),
                };
                items.push(Object::Reference(annotation));
                let holder = self.edit(holder)?;
                holder.tokens = Object::Array(items).to_tokens();
                Ok(())
            }
            Some(Object::Array(mut items)) => {
                items.push(Object::Reference(annotation));
                self.edit(page)?.set(b"Annots", &Object::Array(items))
            }
            _ => self
                .edit(page)?
                .set(b"Annots", &Object::Array(vec![Object::Reference(annotation)])),
        }
    }

    /// Serialize the merged document
    ///
    /// `rewrite` writes every foreign object (stubs as `null`) plus the new
    /// ones; `incremental` appends only edited and new objects after the
    /// original bytes with a `/Prev` link to the previous xref section.
    ///
    /// In `rewrite` mode foreign dictionaries are re-emitted from their tokens
    /// with normalized spacing, so values survive but the original
    /// whitespace and line layout do not. Stream payloads are copied as is.
    pub fn complete(&mut self) -> Result<Vec<u8>> {
        self.check_open()?;
        self.completed = true;

        let max = self.source.max_number();
        let compress = self.options.compress;
        let incremental = self.options.merge_mode == MergeMode::Incremental;
        let format = if incremental {
            match self.source.xref_kind() {
                XRefKind::Classic => XRefFormat::Table,
                XRefKind::Stream => XRefFormat::Stream,
            }
        } else {
            self.options.xref_format
        };
        let packs = self.options.object_streams && format == XRefFormat::Stream;

        let mut writer = if incremental {
            ObjectWriter::append_to(self.source.data(), max)
        } else {
            ObjectWriter::new(self.options.version).continue_after(max)
        }
        .with_object_streams(packs);

        let emitted = self.resources.emit(&mut writer, compress)?;
        let lookup = |names: Option<&BTreeSet<String>>, emitted: &[(String, u32)]| -> Vec<(String, u32)> {
            emitted
                .iter()
                .filter(|(name, _)| names.is_some_and(|set| set.contains(name)))
                .cloned()
                .collect()
        };

        for index in 0..self.pages.len() {
            let page = self.pages[index];
            let fonts = lookup(self.page_fonts.get(&index), &emitted.fonts[..]);
            let images = lookup(self.page_images.get(&index), &emitted.images[..]);
            let mut additions: Vec<(&[u8], Vec<(String, u32)>)> = Vec::new();
            if !fonts.is_empty() {
                additions.push((CATEGORIES[0], fonts));
            }
            if !images.is_empty() {
                additions.push((CATEGORIES[1], images));
            }
            if !additions.is_empty() {
                self.add_page_resources(page, &additions)?;
            }

            if let Some(content) = self.content.get(&index).cloned() {
                let mut dict = Dictionary::new();
                let data = if compress {
                    dict.set("Filter", "FlateDecode");
                    flate_encode(&content)?
                } else {
                    content
                };
                let stream = writer.add_stream(&dict, data)?;
                self.push_contents(page, stream)?;
            }

            let annotations: Vec<Dictionary> = self
                .navigation
                .links_on(index)
                .map(|(_, link)| link.annotation_dictionary(&self.pages, &self.navigation, None))
                .collect::<Result<_>>()?;
            for mut dict in annotations {
                dict.set("P", Object::Reference(page));
                let number = writer.add(&Object::Dictionary(dict))?;
                self.push_annotation(page, number)?;
            }
        }

        if incremental {
            for obj in self.modified.values() {
                writer.put(obj)?;
            }
        } else {
            for slot in self.source.table() {
                match self.modified.get(&slot.number) {
                    Some(obj) => writer.put(obj)?,
                    None if slot.is_stub() => writer.write_object(slot)?,
                    None => writer.put(slot)?,
                }
            }
        }

        debug!(
            "merge complete: {} edited objects, {} new fonts, {} new images ({:?})",
            self.modified.len(),
            emitted.fonts.len(),
            emitted.images.len(),
            self.options.merge_mode
        );

        writer.finalize(
            Trailer {
                root: self.source.root()?,
                info: self.source.info(),
                id_first: self.source.id(),
                prev: incremental.then(|| self.source.startxref()),
            },
            format,
        )
    }
}

/// Text string bytes as UTF-8: UTF-16BE with a byte order mark, else single-byte
fn decode_text(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
