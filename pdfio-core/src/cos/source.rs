//! Positioned byte access over a PDF file

use super::lexer::Lexer;
use super::{ParseError, ParseResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// The complete bytes of one PDF file
///
/// The input is read once at open so that lexers can be positioned at any
/// offset independently and the file handle is released immediately.
#[derive(Debug, Clone)]
pub struct ByteSource {
    data: Vec<u8>,
}

impl ByteSource {
    /// Read a file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read everything from `reader`
    pub fn from_reader<R: Read>(mut reader: R) -> ParseResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        if data.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes from `offset` to the end, empty when out of range
    pub fn slice_from(&self, offset: usize) -> &[u8] {
        self.data.get(offset..).unwrap_or(&[])
    }

    /// A lexer reading from absolute `offset`
    pub fn lexer_at(&self, offset: usize) -> Lexer<'_> {
        let mut lexer = Lexer::new(&self.data);
        lexer.seek(offset);
        lexer
    }

    /// Last occurrence of `pattern` within the final `window` bytes
    pub fn rfind_in_tail(&self, pattern: &[u8], window: usize) -> Option<usize> {
        let start = self.data.len().saturating_sub(window);
        rfind(&self.data[start..], pattern).map(|pos| start + pos)
    }

    /// First occurrence of `pattern` at or after `from`
    pub fn find_from(&self, pattern: &[u8], from: usize) -> Option<usize> {
        find(self.slice_from(from), pattern).map(|pos| from + pos)
    }

    /// Every occurrence of `pattern`, in file order
    pub fn find_all(&self, pattern: &[u8]) -> Vec<usize> {
        let mut hits = Vec::new();
        let mut from = 0;
        while let Some(pos) = self.find_from(pattern, from) {
            hits.push(pos);
            from = pos + 1;
        }
        hits
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
