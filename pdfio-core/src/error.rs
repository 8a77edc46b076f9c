use crate::cos::{ErrorKind, ParseError};
use thiserror::Error;

/// Document-level errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page number {requested} (document has {count} pages)")]
    InvalidPageNumber { requested: u32, count: u32 },

    #[error("No page has label {0:?}")]
    PageLabelNotFound(String),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Document is encrypted")]
    Encrypted,
}

impl PdfError {
    /// Position in the error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfError::Parse(err) => err.kind(),
            PdfError::Io(_) => ErrorKind::Io,
            PdfError::InvalidPageNumber { .. } | PdfError::PageLabelNotFound(_) => {
                ErrorKind::Reference
            }
            PdfError::InvalidStructure(_) => ErrorKind::Structural,
            PdfError::Encrypted => ErrorKind::Unsupported,
        }
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
