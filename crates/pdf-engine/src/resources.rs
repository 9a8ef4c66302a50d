//! Resource registry
//!
//! Fonts, images, optional content groups and graphics states are registered
//! by logical identity and only written if a page actually used them.

use crate::filter::flate_encode;
use crate::font::{build_to_unicode_cmap, EmbeddedFont, FontProgram, FontRefs, FontResource};
use crate::image::ImageResource;
use crate::object::{Dictionary, Object};
use crate::writer::ObjectWriter;
use crate::{PdfError, Result};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Handle of a registered font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(usize);

/// Handle of a registered image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(usize);

/// Handle of a registered optional content group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(usize);

/// Handle of a registered graphics state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtGStateId(usize);

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    name: String,
    used: bool,
}

#[derive(Debug, Clone)]
struct Layer {
    title: String,
    visible: bool,
}

/// Objects shared by every logical font built on one program
#[derive(Debug, Clone, Copy, Default)]
struct ProgramObjects {
    descriptor: u32,
    to_unicode: Option<u32>,
    descendant: Option<u32>,
}

/// Object numbers of emitted resources, keyed by resource name
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EmittedResources {
    pub fonts: Vec<(String, u32)>,
    pub images: Vec<(String, u32)>,
    pub ext_gstates: Vec<(String, u32)>,
    pub layers: Vec<(String, u32, bool)>,
}

fn name_map(entries: &[(String, u32)]) -> Dictionary {
    let mut dict = Dictionary::new();
    for (name, number) in entries {
        dict.set(name.as_str(), Object::Reference(*number));
    }
    dict
}

impl EmittedResources {
    pub fn font_dictionary(&self) -> Dictionary {
        name_map(&self.fonts)
    }

    pub fn xobject_dictionary(&self) -> Dictionary {
        name_map(&self.images)
    }

    pub fn ext_gstate_dictionary(&self) -> Dictionary {
        name_map(&self.ext_gstates)
    }

    pub fn properties_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        for (name, number, _) in &self.layers {
            dict.set(name.as_str(), Object::Reference(*number));
        }
        dict
    }

    /// The shared page Resources dictionary
    pub fn resources_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set(
            "ProcSet",
            vec![
                Object::name("PDF"),
                Object::name("Text"),
                Object::name("ImageB"),
                Object::name("ImageC"),
                Object::name("ImageI"),
            ],
        );
        if !self.fonts.is_empty() {
            dict.set("Font", self.font_dictionary());
        }
        if !self.images.is_empty() {
            dict.set("XObject", self.xobject_dictionary());
        }
        if !self.ext_gstates.is_empty() {
            dict.set("ExtGState", self.ext_gstate_dictionary());
        }
        if !self.layers.is_empty() {
            dict.set("Properties", self.properties_dictionary());
        }
        dict
    }

    /// Catalog `/OCProperties`, when any layer was used
    pub fn oc_properties(&self) -> Option<Dictionary> {
        if self.layers.is_empty() {
            return None;
        }
        let refs = |filter: &dyn Fn(bool) -> bool| -> Vec<Object> {
            self.layers
                .iter()
                .filter(|(_, _, visible)| filter(*visible))
                .map(|(_, n, _)| Object::Reference(*n))
                .collect()
        };

        let mut config = Dictionary::new();
        config.set("Order", refs(&|_| true));
        config.set("ON", refs(&|v| v));
        config.set("OFF", refs(&|v| !v));

        let mut dict = Dictionary::new();
        dict.set("OCGs", refs(&|_| true));
        dict.set("D", config);
        Some(dict)
    }
}

/// Registry of document resources with logical-key deduplication
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    fonts: Vec<Entry<FontResource>>,
    font_keys: HashMap<String, FontId>,
    images: Vec<Entry<ImageResource>>,
    image_hashes: HashMap<u64, ImageId>,
    layers: Vec<Entry<Layer>>,
    layer_titles: HashMap<String, LayerId>,
    ext_gstates: Vec<Entry<Dictionary>>,
    ext_gstate_keys: HashMap<Vec<u8>, ExtGStateId>,
    reserved: HashSet<String>,
    counters: HashMap<&'static str, u32>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names already present in a foreign document; never handed out
    pub fn reserve_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(names.into_iter().map(Into::into));
    }

    fn next_name(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        loop {
            *counter += 1;
            let name = format!("{prefix}{counter}");
            if !self.reserved.contains(&name) {
                return name;
            }
        }
    }

    /// Register a font; the same logical key always yields the same handle
    pub fn register_font(&mut self, font: FontResource) -> FontId {
        if let Some(&id) = self.font_keys.get(&font.key) {
            return id;
        }
        let id = FontId(self.fonts.len());
        let name = self.next_name("F");
        self.font_keys.insert(font.key.clone(), id);
        self.fonts.push(Entry {
            value: font,
            name,
            used: false,
        });
        id
    }

    pub fn font_by_key(&self, key: &str) -> Result<FontId> {
        self.font_keys
            .get(key)
            .copied()
            .ok_or_else(|| PdfError::FontNotFound(key.to_string()))
    }

    /// Mark a font as used and return its resource name
    pub fn use_font(&mut self, id: FontId) -> Result<String> {
        let entry = self
            .fonts
            .get_mut(id.0)
            .ok_or_else(|| PdfError::FontNotFound(format!("font handle {}", id.0)))?;
        entry.used = true;
        Ok(entry.name.clone())
    }

    pub fn font(&self, id: FontId) -> Option<&FontResource> {
        self.fonts.get(id.0).map(|e| &e.value)
    }

    /// Register an image; identical content shares one handle
    pub fn register_image(&mut self, image: ImageResource) -> ImageId {
        let hash = image.content_hash();
        if let Some(&id) = self.image_hashes.get(&hash) {
            return id;
        }
        let id = ImageId(self.images.len());
        let name = self.next_name("Im");
        self.image_hashes.insert(hash, id);
        self.images.push(Entry {
            value: image,
            name,
            used: false,
        });
        id
    }

    pub fn use_image(&mut self, id: ImageId) -> Result<String> {
        let entry = self
            .images
            .get_mut(id.0)
            .ok_or_else(|| PdfError::ImageError(format!("unknown image handle {}", id.0)))?;
        entry.used = true;
        Ok(entry.name.clone())
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageResource> {
        self.images.get(id.0).map(|e| &e.value)
    }

    /// Register an optional content group by title
    pub fn register_layer(&mut self, title: &str, visible: bool) -> LayerId {
        if let Some(&id) = self.layer_titles.get(title) {
            return id;
        }
        let id = LayerId(self.layers.len());
        let name = self.next_name("OC");
        self.layer_titles.insert(title.to_string(), id);
        self.layers.push(Entry {
            value: Layer {
                title: title.to_string(),
                visible,
            },
            name,
            used: false,
        });
        id
    }

    pub fn use_layer(&mut self, id: LayerId) -> Result<String> {
        let entry = self
            .layers
            .get_mut(id.0)
            .ok_or_else(|| PdfError::protocol(format!("unknown layer handle {}", id.0)))?;
        entry.used = true;
        Ok(entry.name.clone())
    }

    /// Register a graphics state dictionary; equal dictionaries share a handle
    pub fn register_ext_gstate(&mut self, mut dict: Dictionary) -> ExtGStateId {
        dict.set("Type", "ExtGState");
        let key = Object::Dictionary(dict.clone()).to_bytes();
        if let Some(&id) = self.ext_gstate_keys.get(&key) {
            return id;
        }
        let id = ExtGStateId(self.ext_gstates.len());
        let name = self.next_name("GS");
        self.ext_gstate_keys.insert(key, id);
        self.ext_gstates.push(Entry {
            value: dict,
            name,
            used: false,
        });
        id
    }

    pub fn use_ext_gstate(&mut self, id: ExtGStateId) -> Result<String> {
        let entry = self
            .ext_gstates
            .get_mut(id.0)
            .ok_or_else(|| PdfError::protocol(format!("unknown graphics state handle {}", id.0)))?;
        entry.used = true;
        Ok(entry.name.clone())
    }

    /// Whether any resource has been used
    pub fn has_used(&self) -> bool {
        self.fonts.iter().any(|e| e.used)
            || self.images.iter().any(|e| e.used)
            || self.layers.iter().any(|e| e.used)
            || self.ext_gstates.iter().any(|e| e.used)
    }

    /// Write every used resource and return their object numbers
    pub(crate) fn emit(&self, writer: &mut ObjectWriter, compress: bool) -> Result<EmittedResources> {
        let mut emitted = EmittedResources::default();
        let mut programs: HashMap<String, ProgramObjects> = HashMap::new();

        for entry in self.fonts.iter().filter(|e| e.used) {
            let font = &entry.value;
            let refs = match &font.program {
                FontProgram::Standard { .. } => FontRefs::default(),
                FontProgram::TrueType(program) | FontProgram::Cid(program) => {
                    let shared = match programs.get(&program.program_key) {
                        Some(shared) => *shared,
                        None => {
                            let shared = emit_program(writer, program, compress)?;
                            programs.insert(program.program_key.clone(), shared);
                            shared
                        }
                    };

                    let descendant = match (&font.program, shared.descendant) {
                        (FontProgram::Cid(_), Some(existing)) => Some(existing),
                        (FontProgram::Cid(_), None) => {
                            let number = writer.add(&Object::Dictionary(
                                program.cid_font_dictionary(shared.descriptor),
                            ))?;
                            if let Some(slot) = programs.get_mut(&program.program_key) {
                                slot.descendant = Some(number);
                            }
                            Some(number)
                        }
                        _ => None,
                    };

                    FontRefs {
                        descriptor: Some(shared.descriptor),
                        descendant,
                        to_unicode: shared.to_unicode,
                    }
                }
            };

            let number = writer.add(&Object::Dictionary(font.font_dictionary(refs)))?;
            emitted.fonts.push((entry.name.clone(), number));
        }

        for entry in self.images.iter().filter(|e| e.used) {
            let image = &entry.value;
            let mask = match &image.soft_mask {
                Some(mask) => {
                    let mut dict = mask.dictionary();
                    let data = encode_samples(&mut dict, mask.filter.is_none(), &mask.data, compress)?;
                    Some(writer.add_stream(&dict, data)?)
                }
                None => None,
            };

            let mut dict = image.dictionary(mask);
            let data = encode_samples(&mut dict, image.filter.is_none(), &image.data, compress)?;
            let number = writer.add_stream(&dict, data)?;
            emitted.images.push((entry.name.clone(), number));
        }

        for entry in self.layers.iter().filter(|e| e.used) {
            let ocg: Dictionary = vec![
                ("Type", "OCG".into()),
                ("Name", Object::text_string(&entry.value.title)),
            ]
            .into_iter()
            .collect();
            let number = writer.add(&Object::Dictionary(ocg))?;
            emitted
                .layers
                .push((entry.name.clone(), number, entry.value.visible));
        }

        for entry in self.ext_gstates.iter().filter(|e| e.used) {
            let number = writer.add(&Object::Dictionary(entry.value.clone()))?;
            emitted.ext_gstates.push((entry.name.clone(), number));
        }

        debug!(
            "emitted {} fonts ({} programs), {} images, {} layers, {} graphics states",
            emitted.fonts.len(),
            programs.len(),
            emitted.images.len(),
            emitted.layers.len(),
            emitted.ext_gstates.len()
        );

        Ok(emitted)
    }
}

fn emit_program(writer: &mut ObjectWriter, program: &EmbeddedFont, compress: bool) -> Result<ProgramObjects> {
    let (file_dict, file_data) = program.font_file_stream(compress)?;
    let font_file = writer.add_stream(&file_dict, file_data)?;
    let descriptor = writer.add(&Object::Dictionary(program.descriptor_dictionary(font_file)))?;

    let to_unicode = if program.to_unicode.is_empty() {
        None
    } else {
        let cmap = build_to_unicode_cmap(&program.to_unicode);
        let mut dict = Dictionary::new();
        let data = encode_samples(&mut dict, true, &cmap, compress)?;
        Some(writer.add_stream(&dict, data)?)
    };

    Ok(ProgramObjects {
        descriptor,
        to_unicode,
        descendant: None,
    })
}

/// Flate-compress unfiltered data when compression is on
fn encode_samples(dict: &mut Dictionary, unfiltered: bool, data: &[u8], compress: bool) -> Result<Vec<u8>> {
    if unfiltered && compress {
        dict.set("Filter", "FlateDecode");
        return flate_encode(data);
    }
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PdfVersion, XRefFormat};
    use crate::font::EmbeddedFont;
    use crate::image::SoftMask;
    use crate::reader::ParsedDocument;
    use crate::writer::Trailer;
    use pretty_assertions::assert_eq;

    fn finish(mut writer: ObjectWriter, emitted: &EmittedResources) -> ParsedDocument {
        let resources = writer
            .add(&Object::Dictionary(emitted.resources_dictionary()))
            .unwrap();
        let catalog: Dictionary = vec![("Type", "Catalog".into()), ("Resources", Object::Reference(resources))]
            .into_iter()
            .collect();
        let root = writer.add(&Object::Dictionary(catalog)).unwrap();
        let bytes = writer
            .finalize(Trailer { root, ..Default::default() }, XRefFormat::Table)
            .unwrap();
        ParsedDocument::load(bytes).unwrap()
    }

    #[test]
    fn test_same_key_same_handle() {
        let mut registry = ResourceRegistry::new();
        let a = registry.register_font(FontResource::standard("helv", "Helvetica"));
        let b = registry.register_font(FontResource::standard("helv", "Helvetica-Bold"));
        let c = registry.register_font(FontResource::standard("times", "Times-Roman"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.use_font(a).unwrap(), "F1");
        assert_eq!(registry.use_font(c).unwrap(), "F2");
        assert_eq!(registry.font_by_key("times").unwrap(), c);
        assert!(matches!(
            registry.font_by_key("missing"),
            Err(PdfError::FontNotFound(_))
        ));
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let mut registry = ResourceRegistry::new();
        registry.reserve_names(["F1", "F2", "Im1"]);
        let font = registry.register_font(FontResource::standard("helv", "Helvetica"));
        let image = registry.register_image(ImageResource::raw(1, 1, "DeviceGray", vec![0]));
        assert_eq!(registry.use_font(font).unwrap(), "F3");
        assert_eq!(registry.use_image(image).unwrap(), "Im2");
    }

    #[test]
    fn test_unused_resources_are_not_written() {
        let mut registry = ResourceRegistry::new();
        let used = registry.register_font(FontResource::standard("helv", "Helvetica"));
        registry.register_font(FontResource::standard("times", "Times-Roman"));
        registry.register_image(ImageResource::raw(1, 1, "DeviceGray", vec![0]));
        registry.use_font(used).unwrap();

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let emitted = registry.emit(&mut writer, true).unwrap();
        assert_eq!(emitted.fonts.len(), 1);
        assert!(emitted.images.is_empty());

        let doc = finish(writer, &emitted);
        assert_eq!(doc.objects().filter(|o| o.is_type(b"Font")).count(), 1);
    }

    #[test]
    fn test_shared_program_embedded_once() {
        let program = EmbeddedFont::new("Sarabun", vec![9u8; 64])
            .with_to_unicode(vec![(1, "ก".into())]);
        let mut registry = ResourceRegistry::new();
        let regular = registry.register_font(FontResource::cid("sarabun", program.clone()));
        let alias = registry.register_font(FontResource::cid("sarabun-alias", program));
        assert_ne!(regular, alias);
        registry.use_font(regular).unwrap();
        registry.use_font(alias).unwrap();

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let emitted = registry.emit(&mut writer, false).unwrap();
        let doc = finish(writer, &emitted);

        let subtype_count = |subtype: &[u8]| {
            doc.objects()
                .filter(|o| o.get_name(b"Subtype").as_deref() == Some(subtype))
                .count()
        };
        assert_eq!(doc.objects().filter(|o| o.get(b"Length1").is_some()).count(), 1);
        assert_eq!(doc.objects().filter(|o| o.is_type(b"FontDescriptor")).count(), 1);
        assert_eq!(subtype_count(b"CIDFontType2"), 1);
        assert_eq!(subtype_count(b"Type0"), 2);
    }

    #[test]
    fn test_image_dedup_and_soft_mask() {
        let mut registry = ResourceRegistry::new();
        let pixels = ImageResource::raw(2, 1, "DeviceRGB", vec![1, 2, 3, 4, 5, 6])
            .with_soft_mask(SoftMask::new(2, 1, vec![0, 255]));
        let a = registry.register_image(pixels.clone());
        let b = registry.register_image(pixels);
        assert_eq!(a, b);
        registry.use_image(a).unwrap();

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let emitted = registry.emit(&mut writer, true).unwrap();
        let doc = finish(writer, &emitted);
        let (_, number) = &emitted.images[0];
        let image = doc.get(*number).unwrap();
        let mask = image.get_reference(b"SMask").unwrap();
        assert_eq!(
            doc.get(mask).unwrap().decoded_stream().unwrap(),
            Some(vec![0, 255])
        );
        assert_eq!(image.decoded_stream().unwrap().map(|d| d.len()), Some(6));
    }

    #[test]
    fn test_layers_and_graphics_states() {
        let mut registry = ResourceRegistry::new();
        let notes = registry.register_layer("Notes", false);
        let again = registry.register_layer("Notes", true);
        assert_eq!(notes, again);
        assert_eq!(registry.use_layer(notes).unwrap(), "OC1");

        let mut alpha = Dictionary::new();
        alpha.set("ca", 0.5);
        let gs = registry.register_ext_gstate(alpha.clone());
        assert_eq!(registry.register_ext_gstate(alpha), gs);
        assert_eq!(registry.use_ext_gstate(gs).unwrap(), "GS1");

        let mut writer = ObjectWriter::new(PdfVersion::V1_7);
        let emitted = registry.emit(&mut writer, true).unwrap();
        let resources = emitted.resources_dictionary();
        assert!(resources.get_dict(b"Properties").unwrap().has(b"OC1"));
        assert!(resources.get_dict(b"ExtGState").unwrap().has(b"GS1"));

        let oc = emitted.oc_properties().unwrap();
        let config = oc.get_dict(b"D").unwrap();
        assert_eq!(config.get_array(b"OFF").map(|a| a.len()), Some(1));
        assert_eq!(config.get_array(b"ON").map(|a| a.len()), Some(0));
    }
}
