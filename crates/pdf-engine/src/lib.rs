//! PDF Engine - byte-level PDF reading and writing
//!
//! This crate provides functionality for:
//! - Tokenizing and parsing PDF objects, including compressed object streams
//! - Resolving classic and stream cross-reference sections across `/Prev` chains
//! - Allocating and serializing objects with exact xref offsets
//! - Building the accessibility structure tree for PDF/UA output
//! - Merging new content into an existing PDF (rewrite or incremental update)
//!
//! # Example
//!
//! ```ignore
//! use pdf_engine::{FontResource, PageSize, PdfDocument, WriteOptions};
//!
//! let mut doc = PdfDocument::new(WriteOptions::default());
//! let font = doc.register_font(FontResource::standard("helv", "Helvetica"))?;
//! let page = doc.add_page(PageSize::A4)?;
//! let name = doc.use_font(font)?;
//! doc.append_content(page, format!("BT /{name} 12 Tf 72 760 Td (Hello) Tj ET").as_bytes())?;
//! let bytes = doc.complete()?;
//! ```

mod config;
mod document;
mod filter;
mod font;
mod image;
mod info;
mod lexer;
mod merge;
mod navigation;
mod object;
mod parser;
mod reader;
mod resources;
mod structure;
mod writer;
mod xref;

pub use config::{Compliance, MergeMode, PageSize, PdfVersion, WriteOptions, XRefFormat};
pub use document::PdfDocument;
pub use filter::{flate_decode, flate_encode};
pub use font::{build_to_unicode_cmap, EmbeddedFont, FontMetrics, FontProgram, FontResource};
pub use image::{image_operators, ImageResource, SoftMask};
pub use info::{format_pdf_date, DocumentInfo};
pub use lexer::{Lexer, Scan, Terminator, Token};
pub use merge::MergeDocument;
pub use navigation::{Destination, LinkTarget, Rect};
pub use object::{dict_get, dict_remove, dict_set, write_tokens, Dictionary, Object, StringFormat};
pub use parser::{parse_object_at, ObjectStream, PdfObject};
pub use reader::ParsedDocument;
pub use resources::{ExtGStateId, FontId, ImageId, LayerId, ResourceRegistry};
pub use structure::{MarkedContent, StructElem, StructKey, StructureTreeBuilder};
pub use writer::{ObjectWriter, Trailer};
pub use xref::{find_startxref, resolve_xref, XRefEntry, XRefKind, XRefSection, XRefTable};

use thiserror::Error;

/// Errors that can occur during PDF operations
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Malformed syntax at byte {offset}: expected {expected}")]
    MalformedSyntax { offset: usize, expected: String },

    #[error("Unsupported xref encoding at byte {offset}: {reason}")]
    UnsupportedXRefEncoding { offset: usize, reason: String },

    #[error("Dangling reference: object {0} is not in the object table")]
    DanglingReference(u32),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid page number: {0} (document has {1} pages)")]
    InvalidPage(usize, usize),

    #[error("Font not found: {0}")]
    FontNotFound(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Form field not found: {0}")]
    FieldNotFound(String),

    #[error("Encrypted documents are not supported")]
    Encrypted,

    #[error("Unsupported stream filter: {0}")]
    UnsupportedFilter(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),
}

impl PdfError {
    pub(crate) fn syntax(offset: usize, expected: impl Into<String>) -> Self {
        PdfError::MalformedSyntax {
            offset,
            expected: expected.into(),
        }
    }

    pub(crate) fn xref(offset: usize, reason: impl Into<String>) -> Self {
        PdfError::UnsupportedXRefEncoding {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        PdfError::ProtocolViolation(message.into())
    }
}

/// Result type for PDF operations
pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_offset() {
        let err = PdfError::syntax(42, "endobj");
        assert_eq!(
            err.to_string(),
            "Malformed syntax at byte 42: expected endobj"
        );
    }

    #[test]
    fn test_xref_error_message() {
        let err = PdfError::xref(7, "/W must have three entries");
        assert!(err.to_string().contains("byte 7"));
    }
}
