//! Write options

use crate::Result;
use serde::{Deserialize, Serialize};

/// PDF version written in the header line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfVersion {
    #[serde(rename = "1.4")]
    V1_4,
    #[serde(rename = "1.5")]
    V1_5,
    #[serde(rename = "1.6")]
    V1_6,
    #[default]
    #[serde(rename = "1.7")]
    V1_7,
    #[serde(rename = "2.0")]
    V2_0,
}

impl PdfVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfVersion::V1_4 => "1.4",
            PdfVersion::V1_5 => "1.5",
            PdfVersion::V1_6 => "1.6",
            PdfVersion::V1_7 => "1.7",
            PdfVersion::V2_0 => "2.0",
        }
    }
}

/// Cross-reference encoding used when writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XRefFormat {
    /// Classic `xref` table followed by a `trailer` dictionary
    #[default]
    Table,
    /// `/Type /XRef` stream (PDF 1.5+)
    Stream,
}

/// Compliance profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compliance {
    #[default]
    None,
    /// Tagged output with a structure tree (PDF/UA-1)
    PdfUa,
}

/// How a merged document is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Write a complete new file containing every foreign object
    #[default]
    Rewrite,
    /// Append changed and new objects after the original bytes
    Incremental,
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// ISO A4 (595.28 x 841.89 points)
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };

    /// US Letter (612 x 792 points)
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Options controlling how documents are serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Header version
    pub version: PdfVersion,
    /// Compress content streams authored by the engine with FlateDecode
    pub compress: bool,
    /// Cross-reference encoding
    pub xref_format: XRefFormat,
    /// Pack non-stream objects into an object stream (stream xref only)
    pub object_streams: bool,
    /// Compliance profile
    pub compliance: Compliance,
    /// Write mode for merged documents
    pub merge_mode: MergeMode,
    /// `/Producer` entry of the info dictionary
    pub producer: Option<String>,
    /// Document natural language (`/Lang`), e.g. "en-US"
    pub language: Option<String>,
    /// Document title
    pub title: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            version: PdfVersion::default(),
            compress: true,
            xref_format: XRefFormat::default(),
            object_streams: false,
            compliance: Compliance::default(),
            merge_mode: MergeMode::default(),
            producer: None,
            language: None,
            title: None,
        }
    }
}

impl WriteOptions {
    /// Parse options from JSON; missing fields take their defaults
    ///
    /// # Example
    /// ```ignore
    /// let options = WriteOptions::from_json(r#"{"xref_format": "stream", "compliance": "pdf_ua"}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether objects should be packed into object streams
    pub fn packs_objects(&self) -> bool {
        self.object_streams && self.xref_format == XRefFormat::Stream
    }

    pub fn is_tagged(&self) -> bool {
        self.compliance == Compliance::PdfUa
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = WriteOptions::default();
        assert_eq!(options.version, PdfVersion::V1_7);
        assert_eq!(options.xref_format, XRefFormat::Table);
        assert!(options.compress);
        assert!(!options.packs_objects());
    }

    #[test]
    fn test_from_json_partial() {
        let options = WriteOptions::from_json(
            r#"{"xref_format": "stream", "object_streams": true, "compliance": "pdf_ua", "version": "2.0"}"#,
        )
        .unwrap();
        assert_eq!(options.xref_format, XRefFormat::Stream);
        assert_eq!(options.compliance, Compliance::PdfUa);
        assert_eq!(options.version.as_str(), "2.0");
        assert!(options.packs_objects());
        assert!(options.is_tagged());
        assert_eq!(options.merge_mode, MergeMode::Rewrite);
    }

    #[test]
    fn test_from_json_invalid() {
        let result = WriteOptions::from_json(r#"{"xref_format": "binary"}"#);
        assert!(matches!(result, Err(crate::PdfError::ConfigError(_))));
    }

    #[test]
    fn test_object_streams_need_stream_xref() {
        let options = WriteOptions {
            object_streams: true,
            ..Default::default()
        };
        assert!(!options.packs_objects());
    }

    #[test]
    fn test_page_sizes() {
        assert_eq!(PageSize::default(), PageSize::A4);
        assert_eq!(PageSize::LETTER.height, 792.0);
    }
}
