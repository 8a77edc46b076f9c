//! # pdfio
//!
//! A pure Rust library for reading PDF files: it opens a document, resolves
//! its object graph and turns page content into a tree of page objects. It
//! does not render, print or write PDF.
//!
//! ## Features
//!
//! - **COS layer**: lexer, object parser, classic and stream cross-reference
//!   tables, object streams and incremental updates
//! - **Recovery**: damaged cross-reference data is rebuilt by scanning the file
//! - **Filters**: Flate, LZW, ASCIIHex, ASCII85 and RunLength with PNG/TIFF
//!   predictors
//! - **Pages**: page tree flattening with inherited attributes, page labels
//! - **Content**: content stream tokenizer with inline images, grouped into
//!   text objects, marked content, saved states and text runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfio::{PDDoc, PageObject};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PDDoc::open("document.pdf")?;
//! println!("Version: {}", doc.version());
//!
//! let page = doc.get_page(1)?;
//! for object in page.get_content_objects()? {
//!     if let PageObject::TextObject(group) = &object {
//!         for run in object.text_runs() {
//!             println!("{:?}: {}", run.state.font, run.text);
//!         }
//!         println!("closed by {:?}", group.end.as_ref().map(|e| &e.operator));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Low-level object access
//!
//! ```rust,no_run
//! use pdfio::CosDoc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = CosDoc::open("document.pdf")?;
//! let catalog = doc.get_object(doc.get_root().get("Root").unwrap());
//! println!("Catalog: {:?}", catalog.as_dict().map(|d| d.len()));
//! for id in doc.object_ids() {
//!     println!("{} {} obj: {}", id.0, id.1, doc.resolve(id).type_name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`cos`] - physical structure: objects, cross-references, filters, [`CosDoc`]
//! - [`pd`] - logical structure: [`PDDoc`], [`PDPage`], page objects
//! - [`common`] - text strings, dates and rectangles
//! - [`error`] - document-level errors

pub mod common;
pub mod cos;
pub mod error;
pub mod pd;

#[cfg(test)]
mod test_helpers;

pub use common::{decode_text_string, CDDate, CDRect};
pub use cos::{
    CosArray, CosDict, CosDoc, CosName, CosObject, CosStream, CosString, ErrorKind, ObjectId,
    ParseError, ParseOptions, ParseResult, PdfVersion,
};
pub use error::{PdfError, Result};
pub use pd::{
    DocumentInfo, InfoValue, PDDoc, PDPage, PageElement, PageObject, PageObjectGroup,
    PageSelector, TextRun, TextState,
};

/// Current version of pdfio
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Supported PDF versions
pub mod pdf_version {
    /// Header versions read without a warning
    pub const SUPPORTED_VERSIONS: &[&str] = &[
        "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "2.0",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(pdf_version::SUPPORTED_VERSIONS.contains(&"1.7"));
    }

    #[test]
    fn test_open_through_reexports() {
        let doc = PDDoc::from_bytes(test_helpers::create_minimal_pdf()).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);
        let objects = doc.get_page(1).unwrap().get_content_objects().unwrap();
        assert!(matches!(objects[0], PageObject::TextObject(_)));
    }
}
