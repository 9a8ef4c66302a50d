//! Font resource descriptors
//!
//! Font programs arrive pre-encoded; this module only wraps them in the
//! dictionaries a PDF needs (font file stream, descriptor, CID font, ToUnicode).

use crate::filter::flate_encode;
use crate::object::{Dictionary, Object};
use crate::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Descriptor metrics in glyph space units (1/1000 em)
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
    pub cap_height: f64,
    pub italic_angle: f64,
    pub stem_v: f64,
    pub flags: i64,
    pub bbox: [f64; 4],
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            ascent: 800.0,
            descent: -200.0,
            cap_height: 700.0,
            italic_angle: 0.0,
            stem_v: 80.0,
            // Symbolic
            flags: 4,
            bbox: [0.0, -200.0, 1000.0, 800.0],
        }
    }
}

/// A pre-encoded TrueType program plus the tables needed to describe it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFont {
    /// PostScript name used for `/BaseFont` and `/FontName`
    pub font_name: String,
    /// Program bytes written as `/FontFile2`
    pub data: Vec<u8>,
    /// Physical identity; logical fonts sharing it share one embedded program
    pub program_key: String,
    pub metrics: FontMetrics,
    /// `(code or glyph id, advance width)` pairs
    pub widths: Vec<(u16, f64)>,
    pub default_width: f64,
    /// `(code or glyph id, text)` pairs for the ToUnicode CMap
    pub to_unicode: Vec<(u16, String)>,
}

impl EmbeddedFont {
    /// Wrap program bytes; the program key defaults to a hash of the bytes
    pub fn new(font_name: &str, data: Vec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);
        let program_key = format!("{:016x}", hasher.finish());

        Self {
            font_name: font_name.to_string(),
            data,
            program_key,
            metrics: FontMetrics::default(),
            widths: Vec::new(),
            default_width: 1000.0,
            to_unicode: Vec::new(),
        }
    }

    pub fn with_program_key(mut self, key: &str) -> Self {
        self.program_key = key.to_string();
        self
    }

    pub fn with_metrics(mut self, metrics: FontMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_widths(mut self, widths: Vec<(u16, f64)>, default_width: f64) -> Self {
        self.widths = widths;
        self.default_width = default_width;
        self
    }

    pub fn with_to_unicode(mut self, mappings: Vec<(u16, String)>) -> Self {
        self.to_unicode = mappings;
        self
    }

    /// `/FontFile2` stream dictionary and payload
    pub(crate) fn font_file_stream(&self, compress: bool) -> Result<(Dictionary, Vec<u8>)> {
        let mut dict = Dictionary::new();
        dict.set("Length1", self.data.len());
        if compress {
            dict.set("Filter", "FlateDecode");
            return Ok((dict, flate_encode(&self.data)?));
        }
        Ok((dict, self.data.clone()))
    }

    pub(crate) fn descriptor_dictionary(&self, font_file: u32) -> Dictionary {
        let m = &self.metrics;
        let bbox: Vec<Object> = m.bbox.iter().map(|&v| Object::from(v)).collect();
        vec![
            ("Type", "FontDescriptor".into()),
            ("FontName", Object::name(&self.font_name)),
            ("Flags", m.flags.into()),
            ("FontBBox", bbox.into()),
            ("ItalicAngle", m.italic_angle.into()),
            ("Ascent", m.ascent.into()),
            ("Descent", m.descent.into()),
            ("CapHeight", m.cap_height.into()),
            ("StemV", m.stem_v.into()),
            ("FontFile2", Object::Reference(font_file)),
        ]
        .into_iter()
        .collect()
    }

    /// `/CIDFontType2` descendant with an individual-width `/W` array
    pub(crate) fn cid_font_dictionary(&self, descriptor: u32) -> Dictionary {
        let cid_system_info: Dictionary = vec![
            ("Registry", Object::string_literal("Adobe")),
            ("Ordering", Object::string_literal("Identity")),
            ("Supplement", 0.into()),
        ]
        .into_iter()
        .collect();

        let mut sorted = self.widths.clone();
        sorted.sort_by_key(|&(gid, _)| gid);
        sorted.dedup_by_key(|&mut (gid, _)| gid);

        let mut w = Vec::with_capacity(sorted.len() * 2);
        for (gid, advance) in sorted {
            w.push(Object::from(gid as u32));
            w.push(Object::Array(vec![advance.into()]));
        }

        vec![
            ("Type", "Font".into()),
            ("Subtype", "CIDFontType2".into()),
            ("BaseFont", Object::name(&self.font_name)),
            ("CIDSystemInfo", cid_system_info.into()),
            ("FontDescriptor", Object::Reference(descriptor)),
            ("W", w.into()),
            ("DW", self.default_width.into()),
            ("CIDToGIDMap", "Identity".into()),
        ]
        .into_iter()
        .collect()
    }

    /// `/FirstChar`, `/LastChar` and `/Widths` of a simple font
    fn simple_widths(&self) -> Option<(u16, u16, Vec<Object>)> {
        let first = self.widths.iter().map(|&(c, _)| c).min()?;
        let last = self.widths.iter().map(|&(c, _)| c).max()?;
        let widths = (first..=last)
            .map(|code| {
                let advance = self
                    .widths
                    .iter()
                    .find(|&&(c, _)| c == code)
                    .map(|&(_, w)| w)
                    .unwrap_or(self.default_width);
                Object::from(advance)
            })
            .collect();
        Some((first, last, widths))
    }
}

/// How a logical font is backed
#[derive(Debug, Clone, PartialEq)]
pub enum FontProgram {
    /// One of the standard 14 fonts; nothing is embedded
    Standard { encoding: Option<String> },
    /// Simple TrueType font
    TrueType(EmbeddedFont),
    /// Composite Type0 font with Identity-H encoding
    Cid(EmbeddedFont),
}

/// A logical font registered with a document
#[derive(Debug, Clone, PartialEq)]
pub struct FontResource {
    /// Logical identity, e.g. "sarabun-bold"
    pub key: String,
    pub base_font: String,
    pub program: FontProgram,
}

/// Object numbers a font dictionary points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FontRefs {
    pub descriptor: Option<u32>,
    pub descendant: Option<u32>,
    pub to_unicode: Option<u32>,
}

impl FontResource {
    /// Standard font; Symbol and ZapfDingbats keep their built-in encoding
    pub fn standard(key: &str, base_font: &str) -> Self {
        let encoding = match base_font {
            "Symbol" | "ZapfDingbats" => None,
            _ => Some("WinAnsiEncoding".to_string()),
        };
        Self {
            key: key.to_string(),
            base_font: base_font.to_string(),
            program: FontProgram::Standard { encoding },
        }
    }

    pub fn truetype(key: &str, font: EmbeddedFont) -> Self {
        Self {
            key: key.to_string(),
            base_font: font.font_name.clone(),
            program: FontProgram::TrueType(font),
        }
    }

    pub fn cid(key: &str, font: EmbeddedFont) -> Self {
        Self {
            key: key.to_string(),
            base_font: font.font_name.clone(),
            program: FontProgram::Cid(font),
        }
    }

    /// The embedded program, if any
    pub fn embedded(&self) -> Option<&EmbeddedFont> {
        match &self.program {
            FontProgram::Standard { .. } => None,
            FontProgram::TrueType(font) | FontProgram::Cid(font) => Some(font),
        }
    }

    pub(crate) fn font_dictionary(&self, refs: FontRefs) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.set("Type", "Font");

        match &self.program {
            FontProgram::Standard { encoding } => {
                dict.set("Subtype", "Type1");
                dict.set("BaseFont", Object::name(&self.base_font));
                if let Some(encoding) = encoding {
                    dict.set("Encoding", Object::name(encoding));
                }
            }
            FontProgram::TrueType(font) => {
                dict.set("Subtype", "TrueType");
                dict.set("BaseFont", Object::name(&self.base_font));
                if let Some((first, last, widths)) = font.simple_widths() {
                    dict.set("FirstChar", first as u32);
                    dict.set("LastChar", last as u32);
                    dict.set("Widths", widths);
                }
                dict.set("Encoding", "WinAnsiEncoding");
            }
            FontProgram::Cid(_) => {
                dict.set("Subtype", "Type0");
                dict.set("BaseFont", Object::name(&self.base_font));
                dict.set("Encoding", "Identity-H");
                if let Some(descendant) = refs.descendant {
                    dict.set("DescendantFonts", vec![Object::Reference(descendant)]);
                }
            }
        }

        if let (FontProgram::TrueType(_), Some(descriptor)) = (&self.program, refs.descriptor) {
            dict.set("FontDescriptor", Object::Reference(descriptor));
        }
        if let Some(to_unicode) = refs.to_unicode {
            dict.set("ToUnicode", Object::Reference(to_unicode));
        }

        dict
    }
}

/// ToUnicode CMap mapping 2-byte codes to UTF-16BE text
pub fn build_to_unicode_cmap(mappings: &[(u16, String)]) -> Vec<u8> {
    let mut cmap = String::new();

    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    cmap.push_str("/CMapName /Adobe-Identity-UCS def\n");
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    cmap.push_str("<0000> <FFFF>\n");
    cmap.push_str("endcodespacerange\n");

    let mut sorted: Vec<&(u16, String)> = mappings.iter().collect();
    sorted.sort_by_key(|(code, _)| *code);
    sorted.dedup_by_key(|(code, _)| *code);

    // At most 100 entries per bfchar block
    for chunk in sorted.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (code, text) in chunk {
            let utf16: String = text
                .encode_utf16()
                .map(|unit| format!("{unit:04X}"))
                .collect();
            cmap.push_str(&format!("<{code:04X}> <{utf16}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");

    cmap.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_font() -> EmbeddedFont {
        EmbeddedFont::new("Sarabun-Regular", vec![0u8; 100])
            .with_widths(vec![(65, 600.0), (67, 650.0)], 500.0)
            .with_to_unicode(vec![(3, "A".into()), (4, "ส".into())])
    }

    #[test]
    fn test_program_key_follows_bytes() {
        let a = EmbeddedFont::new("A", vec![1, 2, 3]);
        let b = EmbeddedFont::new("B", vec![1, 2, 3]);
        let c = EmbeddedFont::new("A", vec![4]);
        assert_eq!(a.program_key, b.program_key);
        assert_ne!(a.program_key, c.program_key);
        assert_eq!(c.with_program_key("shared").program_key, "shared");
    }

    #[test]
    fn test_standard_font_dictionary() {
        let font = FontResource::standard("helv", "Helvetica");
        let dict = font.font_dictionary(FontRefs::default());
        assert_eq!(dict.get_name(b"Subtype"), Some(&b"Type1"[..]));
        assert_eq!(dict.get_name(b"BaseFont"), Some(&b"Helvetica"[..]));
        assert_eq!(dict.get_name(b"Encoding"), Some(&b"WinAnsiEncoding"[..]));
        assert!(font.embedded().is_none());

        let symbol = FontResource::standard("sym", "Symbol").font_dictionary(FontRefs::default());
        assert!(!symbol.has(b"Encoding"));
    }

    #[test]
    fn test_truetype_widths_fill_gaps() {
        let font = FontResource::truetype("body", sample_font());
        let dict = font.font_dictionary(FontRefs {
            descriptor: Some(7),
            to_unicode: Some(8),
            ..Default::default()
        });
        assert_eq!(dict.get_integer(b"FirstChar"), Some(65));
        assert_eq!(dict.get_integer(b"LastChar"), Some(67));
        let widths = dict.get_array(b"Widths").unwrap();
        assert_eq!(widths[1], Object::Real(500.0));
        assert_eq!(dict.get_reference(b"FontDescriptor"), Some(7));
        assert_eq!(dict.get_reference(b"ToUnicode"), Some(8));
    }

    #[test]
    fn test_cid_font_dictionaries() {
        let font = FontResource::cid("thai", sample_font());
        let dict = font.font_dictionary(FontRefs {
            descendant: Some(11),
            ..Default::default()
        });
        assert_eq!(dict.get_name(b"Subtype"), Some(&b"Type0"[..]));
        assert_eq!(dict.get_name(b"Encoding"), Some(&b"Identity-H"[..]));
        assert!(!dict.has(b"FontDescriptor"));

        let embedded = font.embedded().unwrap();
        let cid = embedded.cid_font_dictionary(12);
        assert_eq!(cid.get_reference(b"FontDescriptor"), Some(12));
        assert_eq!(cid.get_array(b"W").map(|w| w.len()), Some(4));

        let descriptor = embedded.descriptor_dictionary(13);
        assert_eq!(descriptor.get_reference(b"FontFile2"), Some(13));
        assert_eq!(descriptor.get_name(b"FontName"), Some(&b"Sarabun-Regular"[..]));
    }

    #[test]
    fn test_font_file_stream() {
        let font = sample_font();
        let (dict, data) = font.font_file_stream(false).unwrap();
        assert_eq!(dict.get_integer(b"Length1"), Some(100));
        assert_eq!(data.len(), 100);

        let (dict, data) = font.font_file_stream(true).unwrap();
        assert_eq!(dict.get_name(b"Filter"), Some(&b"FlateDecode"[..]));
        assert!(data.len() < 100);
    }

    #[test]
    fn test_to_unicode_cmap() {
        let cmap = build_to_unicode_cmap(&[(4, "ส".into()), (3, "A".into())]);
        let cmap = String::from_utf8(cmap).unwrap();
        assert!(cmap.contains("/CIDInit"));
        assert!(cmap.contains("2 beginbfchar\n<0003> <0041>\n<0004> <0E2A>\n"));
        assert!(cmap.ends_with("end\nend\n"));
    }

    #[test]
    fn test_to_unicode_cmap_chunks() {
        let mappings: Vec<(u16, String)> = (0..150u16).map(|c| (c, "x".to_string())).collect();
        let cmap = String::from_utf8(build_to_unicode_cmap(&mappings)).unwrap();
        assert!(cmap.contains("100 beginbfchar"));
        assert!(cmap.contains("50 beginbfchar"));
    }
}
