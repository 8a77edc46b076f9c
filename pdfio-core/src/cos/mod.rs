//! COS layer
//!
//! The physical object model of PDF: a byte source, the lexer, the object
//! parser, cross-reference resolution (classic tables, xref streams, object
//! streams and `/Prev` update chains), the stream filter pipeline and
//! [`CosDoc`], which ties them together behind a cached `get_object`.

pub mod document;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod source;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

pub use self::document::CosDoc;
pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Lexer, Token};
pub use self::objects::{
    CosArray, CosDict, CosName, CosObject, CosStream, CosString, ObjectId, ParseContext,
};
pub use self::source::ByteSource;

/// Result type for COS-level operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while reading the physical structure of a file
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File is empty")]
    EmptyFile,

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
}

/// Coarse classification of a [`ParseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed syntax or broken file structure
    Structural,
    /// Corrupt or unsupported filter data, scoped to one stream
    Decode,
    /// Reference to a missing or invalid object
    Reference,
    /// Underlying read failure
    Io,
    /// Encryption, object-stream `/Extends` and similar
    Unsupported,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Io(_) => ErrorKind::Io,
            ParseError::EmptyFile
            | ParseError::InvalidHeader
            | ParseError::SyntaxError { .. }
            | ParseError::UnexpectedToken { .. }
            | ParseError::MissingKey(_)
            | ParseError::InvalidXRef
            | ParseError::InvalidTrailer => ErrorKind::Structural,
            ParseError::InvalidReference(..) | ParseError::CircularReference => {
                ErrorKind::Reference
            }
            ParseError::StreamDecodeError(_) => ErrorKind::Decode,
            ParseError::UnsupportedFeature(_) => ErrorKind::Unsupported,
        }
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }
}

/// Parsing behaviour switches
///
/// The default is [`ParseOptions::lenient`]: damaged files are repaired where
/// possible and only unrecoverable problems surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Resynchronize on malformed syntax instead of failing
    pub lenient_syntax: bool,
    /// Scan for `endstream` when `/Length` is missing or wrong
    pub lenient_streams: bool,
    /// Rebuild the xref index by scanning the file when it is unusable
    pub recover_xref: bool,
    /// Upper bound for the `endstream` scan
    pub max_recovery_bytes: usize,
    /// Maximum nesting of arrays/dictionaries and page-tree levels
    pub max_recursion_depth: usize,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            lenient_syntax: false,
            lenient_streams: false,
            recover_xref: false,
            max_recovery_bytes: 0,
            max_recursion_depth: 256,
        }
    }

    pub fn lenient() -> Self {
        Self {
            lenient_syntax: true,
            lenient_streams: true,
            recover_xref: true,
            max_recovery_bytes: 16 * 1024 * 1024,
            max_recursion_depth: 256,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}
