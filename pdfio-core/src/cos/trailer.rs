//! PDF trailer handling
//!
//! Each xref section carries a trailer (ISO 32000-1 Section 7.5.5): a classic
//! `trailer << >>` dictionary or the dictionary of an xref stream. Files with
//! incremental updates have one per section, newest first.

use super::objects::{CosDict, CosObject, ObjectId};
use super::{ParseError, ParseResult};

/// Trailer of one xref section
#[derive(Debug, Clone)]
pub struct PdfTrailer {
    /// The trailer dictionary
    pub dict: CosDict,
    /// Byte offset of previous xref section (if any)
    pub prev: Option<u64>,
    /// Byte offset of the hybrid-file xref stream (if any)
    pub xref_stm: Option<u64>,
    /// Byte offset of this xref section
    pub xref_offset: u64,
}

impl PdfTrailer {
    pub fn from_dict(dict: CosDict, xref_offset: u64) -> Self {
        let offset = |key: &str| dict.get_integer(key).and_then(|i| u64::try_from(i).ok());
        let prev = offset("Prev");
        let xref_stm = offset("XRefStm");
        PdfTrailer {
            dict,
            prev,
            xref_stm,
            xref_offset,
        }
    }

    /// Number of entries declared by `/Size`
    pub fn size(&self) -> ParseResult<u32> {
        self.dict
            .get_integer("Size")
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))
    }

    /// Reference to the document catalog
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get("Root")
            .and_then(|obj| obj.as_reference())
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(|obj| obj.as_reference())
    }

    pub fn id(&self) -> Option<&CosObject> {
        self.dict.get("ID")
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }
}

/// Trailers of every section in a `/Prev` chain, newest first
#[derive(Debug, Clone, Default)]
pub struct TrailerChain {
    trailers: Vec<PdfTrailer>,
}

impl TrailerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an older trailer
    pub fn push(&mut self, trailer: PdfTrailer) {
        self.trailers.push(trailer);
    }

    /// The newest trailer
    pub fn current(&self) -> Option<&PdfTrailer> {
        self.trailers.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PdfTrailer> {
        self.trailers.iter()
    }

    pub fn len(&self) -> usize {
        self.trailers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trailers.is_empty()
    }

    /// One dictionary where newer sections win key by key
    ///
    /// The section-linking keys are dropped since they describe a single
    /// section, not the document.
    pub fn merged(&self) -> CosDict {
        let mut merged = CosDict::new();
        for trailer in &self.trailers {
            for (key, value) in trailer.dict.iter() {
                if matches!(
                    key.as_str(),
                    "Prev" | "XRefStm" | "W" | "Index" | "Length" | "Filter" | "DecodeParms"
                ) {
                    continue;
                }
                if !merged.contains_key(key.as_str()) {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}
