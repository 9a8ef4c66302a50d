//! Authoring entry point
//!
//! Pages, resources, marked content and navigation are collected in memory
//! and written in one pass by [`PdfDocument::complete`].

use crate::config::{PageSize, WriteOptions};
use crate::filter::flate_encode;
use crate::font::FontResource;
use crate::image::{image_operators, ImageResource};
use crate::info::{xmp_metadata, DocumentInfo};
use crate::navigation::{Destination, Link, LinkTarget, Navigation, Rect};
use crate::object::{Dictionary, Object};
use crate::parser::PdfObject;
use crate::resources::{ExtGStateId, FontId, ImageId, LayerId, ResourceRegistry};
use crate::structure::{MarkedContent, StructureTreeBuilder};
use crate::writer::{ObjectWriter, Trailer};
use crate::{PdfError, Result};
use log::debug;

/// One authored page
#[derive(Debug, Clone)]
struct Page {
    size: PageSize,
    /// Content stream segments, written as the `/Contents` array
    segments: Vec<Vec<u8>>,
    /// Set once a later page was added; the next append opens a new segment
    sealed: bool,
}

/// PDF document builder
///
/// Pages, resources and navigation entries are collected in memory; object
/// numbers are only assigned when [`complete`](Self::complete) serializes
/// the document.
#[derive(Debug)]
pub struct PdfDocument {
    options: WriteOptions,
    pages: Vec<Page>,
    resources: ResourceRegistry,
    structure: StructureTreeBuilder,
    navigation: Navigation,
    info: DocumentInfo,
    completed: bool,
}

impl PdfDocument {
    /// Create an empty document
    ///
    /// # Example
    /// ```ignore
    /// let options = WriteOptions::from_json(r#"{"compliance": "pdf_ua", "language": "en-US"}"#)?;
    /// let mut doc = PdfDocument::new(options);
    /// ```
    pub fn new(options: WriteOptions) -> Self {
        Self {
            options,
            pages: Vec::new(),
            resources: ResourceRegistry::new(),
            structure: StructureTreeBuilder::new(),
            navigation: Navigation::default(),
            info: DocumentInfo::default(),
            completed: false,
        }
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
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

    /// Add a page and return its zero-based index
    ///
    /// Pages added earlier are sealed: content appended to them later goes
    /// into a new content stream.
    pub fn add_page(&mut self, size: PageSize) -> Result<usize> {
        self.check_open()?;
        for page in &mut self.pages {
            page.sealed = true;
        }
        self.pages.push(Page {
            size,
            segments: vec![Vec::new()],
            sealed: false,
        });
        Ok(self.pages.len() - 1)
    }

    /// Append content stream operators to a page
    ///
    /// # Arguments
    /// * `page` - Page index (0-indexed)
    /// * `content` - Ready-made operator bytes
    pub fn append_content(&mut self, page: usize, content: &[u8]) -> Result<()> {
        self.check_page(page)?;
        let page = &mut self.pages[page];
        if page.sealed {
            page.segments.push(Vec::new());
            page.sealed = false;
        }
        if let Some(segment) = page.segments.last_mut() {
            segment.extend_from_slice(content);
        }
        Ok(())
    }

    /// Register a font; the same logical key returns the same handle
    pub fn register_font(&mut self, font: FontResource) -> Result<FontId> {
        self.check_open()?;
        Ok(self.resources.register_font(font))
    }

    /// Mark a font as used and return its resource name (e.g. "F1")
    pub fn use_font(&mut self, font: FontId) -> Result<String> {
        self.check_open()?;
        self.resources.use_font(font)
    }

    pub fn register_image(&mut self, image: ImageResource) -> Result<ImageId> {
        self.check_open()?;
        Ok(self.resources.register_image(image))
    }

    pub fn use_image(&mut self, image: ImageId) -> Result<String> {
        self.check_open()?;
        self.resources.use_image(image)
    }

    /// Draw a registered image into a box on a page
    ///
    /// # Example
    /// ```ignore
    /// let logo = doc.register_image(ImageResource::from_jpeg(&jpeg_bytes)?)?;
    /// doc.draw_image(page, logo, 72.0, 700.0, 120.0, 40.0)?;
    /// ```
    pub fn draw_image(&mut self, page: usize, image: ImageId, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        self.check_page(page)?;
        let name = self.resources.use_image(image)?;
        self.append_content(page, &image_operators(&name, x, y, width, height))
    }

    /// Register an optional content group by title
    pub fn register_layer(&mut self, title: &str, visible: bool) -> Result<LayerId> {
        self.check_open()?;
        Ok(self.resources.register_layer(title, visible))
    }

    /// Mark a layer as used; returns its `/Properties` name for `/OC /name BDC`
    pub fn use_layer(&mut self, layer: LayerId) -> Result<String> {
        self.check_open()?;
        self.resources.use_layer(layer)
    }

    pub fn register_ext_gstate(&mut self, state: Dictionary) -> Result<ExtGStateId> {
        self.check_open()?;
        Ok(self.resources.register_ext_gstate(state))
    }

    pub fn use_ext_gstate(&mut self, state: ExtGStateId) -> Result<String> {
        self.check_open()?;
        self.resources.use_ext_gstate(state)
    }

    /// Open a tagged span on a page
    ///
    /// Writes the `BDC` operator into the page content and returns the MCID.
    /// Untagged documents ignore the call and return `None`.
    pub fn begin_marked_content(&mut self, page: usize, content: MarkedContent) -> Result<Option<u32>> {
        self.check_page(page)?;
        if !self.options.is_tagged() {
            return Ok(None);
        }
        let (mcid, ops) = self.structure.begin_marked_content(page, content)?;
        self.append_content(page, &ops)?;
        Ok(Some(mcid))
    }

    /// Open an `/Artifact` span for decorative content
    pub fn begin_artifact(&mut self, page: usize) -> Result<()> {
        self.check_page(page)?;
        if !self.options.is_tagged() {
            return Ok(());
        }
        let ops = self.structure.begin_artifact()?;
        self.append_content(page, &ops)
    }

    /// Close the open tagged or artifact span
    pub fn end_marked_content(&mut self, page: usize) -> Result<()> {
        self.check_page(page)?;
        if !self.options.is_tagged() {
            return Ok(());
        }
        let ops = self.structure.end_marked_content()?;
        self.append_content(page, &ops)
    }

    /// Place a link annotation on a page
    ///
    /// # Arguments
    /// * `page` - Page index (0-indexed)
    /// * `rect` - Active area in user space
    /// * `target` - URI or destination
    /// * `alt` - Alternate description, required for tagged output
    pub fn add_link(&mut self, page: usize, rect: Rect, target: LinkTarget, alt: Option<&str>) -> Result<()> {
        self.check_page(page)?;
        if let LinkTarget::Destination(Destination::Page { page: target, .. }) = &target {
            if *target >= self.pages.len() {
                return Err(PdfError::InvalidPage(*target, self.pages.len()));
            }
        }
        if self.options.is_tagged() {
            if alt.is_none() {
                return Err(PdfError::protocol("tagged links need alternate text"));
            }
            self.structure.add_annotation(page, alt);
        }
        self.navigation.add_link(Link {
            page,
            rect,
            target,
            alt: alt.map(str::to_string),
        });
        Ok(())
    }

    /// Register a named destination pointing at a page
    pub fn add_named_destination(&mut self, name: &str, page: usize, top: Option<f64>) -> Result<()> {
        self.check_page(page)?;
        self.navigation.add_named_destination(name, page, top);
        Ok(())
    }

    /// Add an outline entry; `level` 0 is top level
    pub fn add_bookmark(&mut self, title: &str, level: usize, destination: Destination) -> Result<()> {
        self.check_open()?;
        self.navigation.add_bookmark(title, level, destination);
        Ok(())
    }

    pub fn set_info(&mut self, info: DocumentInfo) -> Result<()> {
        self.check_open()?;
        self.info = info;
        Ok(())
    }

    /// Serialize the document
    ///
    /// Object numbers are handed out in this order: the Pages root and the
    /// shared Resources dictionary, then per page its content streams, link
    /// annotations and page dictionary, then resources, the structure tree,
    /// outlines, info, metadata and finally the catalog.
    ///
    /// # Example
    /// ```ignore
    /// let bytes = doc.complete()?;
    /// std::fs::write("out.pdf", bytes)?;
    /// ```
    pub fn complete(&mut self) -> Result<Vec<u8>> {
        self.check_open()?;
        self.completed = true;

        let tagged = self.options.is_tagged();
        let compress = self.options.compress;
        let mut writer =
            ObjectWriter::new(self.options.version).with_object_streams(self.options.packs_objects());

        let pages_root = writer.reserve()?;
        let resources = writer.reserve()?;
        let page_numbers = (0..self.pages.len())
            .map(|_| writer.reserve())
            .collect::<Result<Vec<u32>>>()?;

        let mut annotation_numbers = vec![0u32; self.navigation.links().len()];

        for (index, page) in self.pages.iter().enumerate() {
            let mut contents = Vec::with_capacity(page.segments.len());
            for segment in &page.segments {
                let mut dict = Dictionary::new();
                let data = if compress {
                    dict.set("Filter", "FlateDecode");
                    flate_encode(segment)?
                } else {
                    segment.clone()
                };
                contents.push(Object::Reference(writer.add_stream(&dict, data)?));
            }

            let mut annots = Vec::new();
            for (link_index, link) in self.navigation.links_on(index) {
                let struct_parent = tagged.then_some(self.pages.len() + link_index);
                let mut dict = link.annotation_dictionary(&page_numbers, &self.navigation, struct_parent)?;
                dict.set("P", Object::Reference(page_numbers[index]));
                let number = writer.add(&Object::Dictionary(dict))?;
                annotation_numbers[link_index] = number;
                annots.push(Object::Reference(number));
            }

            let mut dict = Dictionary::new();
            dict.set("Type", "Page");
            dict.set("Parent", Object::Reference(pages_root));
            dict.set(
                "MediaBox",
                vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    page.size.width.into(),
                    page.size.height.into(),
                ],
            );
            dict.set("Resources", Object::Reference(resources));
            dict.set("Contents", contents);
            if !annots.is_empty() {
                dict.set("Annots", annots);
            }
            if tagged {
                dict.set("StructParents", index);
                dict.set("Tabs", "S");
            }
            writer.put(&PdfObject::new(page_numbers[index], &Object::Dictionary(dict)))?;
        }

        let emitted = self.resources.emit(&mut writer, compress)?;
        writer.put(&PdfObject::new(
            resources,
            &Object::Dictionary(emitted.resources_dictionary()),
        ))?;

        let mut pages = Dictionary::new();
        pages.set("Type", "Pages");
        pages.set(
            "Kids",
            page_numbers
                .iter()
                .map(|&n| Object::Reference(n))
                .collect::<Vec<_>>(),
        );
        pages.set("Count", self.pages.len());
        writer.put(&PdfObject::new(pages_root, &Object::Dictionary(pages)))?;

        let struct_tree = if tagged {
            Some(
                self.structure
                    .emit(&mut writer, &page_numbers, &annotation_numbers)?,
            )
        } else {
            None
        };

        let outlines = self.navigation.emit_outlines(&mut writer, &page_numbers)?;
        let dests = self
            .navigation
            .emit_named_destinations(&mut writer, &page_numbers)?;

        let mut info = self.info.clone();
        if info.title.is_none() {
            info.title = self.options.title.clone();
        }
        if info.producer.is_none() {
            info.producer = self.options.producer.clone();
        }
        let info_number = if info.is_empty() {
            None
        } else {
            Some(writer.add(&Object::Dictionary(info.to_dictionary()))?)
        };

        let metadata = if tagged {
            let dict: Dictionary = vec![("Type", "Metadata".into()), ("Subtype", "XML".into())]
                .into_iter()
                .collect();
            let xmp = xmp_metadata(&info, self.options.language.as_deref());
            Some(writer.add_stream(&dict, xmp)?)
        } else {
            None
        };

        let mut catalog = Dictionary::new();
        catalog.set("Type", "Catalog");
        catalog.set("Pages", Object::Reference(pages_root));
        if let Some(outlines) = outlines {
            catalog.set("Outlines", Object::Reference(outlines));
            catalog.set("PageMode", "UseOutlines");
        }
        if let Some(dests) = dests {
            let mut names = Dictionary::new();
            names.set("Dests", Object::Reference(dests));
            catalog.set("Names", names);
        }
        if let Some(oc) = emitted.oc_properties() {
            catalog.set("OCProperties", oc);
        }
        if let Some(lang) = &self.options.language {
            catalog.set("Lang", Object::text_string(lang));
        }
        if let Some(root) = struct_tree {
            let mut mark_info = Dictionary::new();
            mark_info.set("Marked", true);
            catalog.set("MarkInfo", mark_info);
            catalog.set("StructTreeRoot", Object::Reference(root));
            let mut prefs = Dictionary::new();
            prefs.set("DisplayDocTitle", true);
            catalog.set("ViewerPreferences", prefs);
        }
        if let Some(metadata) = metadata {
            catalog.set("Metadata", Object::Reference(metadata));
        }
        let root = writer.add(&Object::Dictionary(catalog))?;

        debug!(
            "completed document: {} pages, {} links, tagged: {}",
            self.pages.len(),
            annotation_numbers.len(),
            tagged
        );

        writer.finalize(
            Trailer {
                root,
                info: info_number,
                ..Default::default()
            },
            self.options.xref_format,
        )
    }
}
