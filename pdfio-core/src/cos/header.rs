//! PDF Header Parser
//!
//! Parses the `%PDF-x.y` header line according to ISO 32000-1 Section 7.5.2

use super::{ParseError, ParseResult};
use std::fmt;
use tracing::warn;

/// How far into the file a lenient reader looks for the header
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Versions defined by ISO 32000 and its predecessors
    pub fn is_known(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Byte offset of `%PDF-`; non-zero when junk precedes the header
    pub offset: usize,
    /// The second line is a comment with at least four bytes >= 128
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Parse the header at the start of `data`
    ///
    /// With `lenient`, the header may be preceded by up to 1 KiB of junk.
    pub fn parse(data: &[u8], lenient: bool) -> ParseResult<Self> {
        let offset = if data.starts_with(b"%PDF-") {
            0
        } else if lenient {
            let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
            super::source::find(window, b"%PDF-").ok_or(ParseError::InvalidHeader)?
        } else {
            return Err(ParseError::InvalidHeader);
        };

        let line_start = offset + 5;
        let line_end = data[line_start..]
            .iter()
            .position(|b| matches!(b, b'\r' | b'\n'))
            .map_or(data.len(), |p| line_start + p);
        let version = parse_version(&data[line_start..line_end])?;

        if !version.is_known() {
            warn!("Unknown PDF version {version}, reading anyway");
        }
        if offset > 0 {
            warn!("PDF header found at offset {offset}");
        }

        Ok(PdfHeader {
            version,
            offset,
            has_binary_marker: has_binary_marker(&data[line_end..]),
        })
    }
}

fn parse_version(line: &[u8]) -> ParseResult<PdfVersion> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    let (major, minor) = text.split_once('.').ok_or(ParseError::InvalidHeader)?;
    // Some writers append junk after the minor digit.
    let minor: String = minor.chars().take_while(char::is_ascii_digit).collect();

    let major = major.parse::<u8>().map_err(|_| ParseError::InvalidHeader)?;
    let minor = minor.parse::<u8>().map_err(|_| ParseError::InvalidHeader)?;
    Ok(PdfVersion::new(major, minor))
}

fn has_binary_marker(rest: &[u8]) -> bool {
    let start = rest
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .unwrap_or(rest.len());
    let line = &rest[start..];
    if line.first() != Some(&b'%') {
        return false;
    }
    line.iter()
        .skip(1)
        .take_while(|b| !matches!(b, b'\r' | b'\n'))
        .filter(|b| **b >= 128)
        .count()
        >= 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_with_binary_marker() {
        let header = PdfHeader::parse(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n1 0 obj", false).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 4));
        assert_eq!(header.offset, 0);
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_parse_header_crlf_without_marker() {
        let header = PdfHeader::parse(b"%PDF-1.7\r\n1 0 obj", false).unwrap();
        assert_eq!(header.version.to_string(), "1.7");
        assert!(!header.has_binary_marker);
    }

    #[test]
    fn test_header_after_junk() {
        let data = b"garbage bytes\n%PDF-2.0\n";
        assert!(matches!(
            PdfHeader::parse(data, false),
            Err(ParseError::InvalidHeader)
        ));
        let header = PdfHeader::parse(data, true).unwrap();
        assert_eq!(header.version, PdfVersion::new(2, 0));
        assert_eq!(header.offset, 14);
    }

    #[test]
    fn test_invalid_headers() {
        assert!(PdfHeader::parse(b"%PDF-abc\n", true).is_err());
        assert!(PdfHeader::parse(b"not a pdf", true).is_err());
        assert!(PdfHeader::parse(b"%PDF-1\n", true).is_err());
    }

    #[test]
    fn test_unknown_version_is_accepted() {
        let header = PdfHeader::parse(b"%PDF-1.9\n", false).unwrap();
        assert!(!header.version.is_known());
    }

    #[test]
    fn test_trailing_junk_after_minor() {
        let header = PdfHeader::parse(b"%PDF-1.5x\n", false).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 5));
    }
}
