//! Common data structures: text strings, dates and rectangles
//!
//! These interpret COS values the way ISO 32000-1 Section 7.9 defines them.

use crate::cos::{CosArray, CosObject};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use std::fmt;

/// PDFDocEncoding code points 0x18..=0x1F
const PDF_DOC_LOW: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

/// PDFDocEncoding code points 0x80..=0xA0
const PDF_DOC_HIGH: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// Decode a PDF text string
///
/// A UTF-16BE byte order mark selects UTF-16, a UTF-8 BOM selects UTF-8;
/// anything else is PDFDocEncoding.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| pdf_doc_char(b)).collect()
}

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDF_DOC_LOW[usize::from(byte - 0x18)],
        0x7F | 0xAD => '\u{FFFD}',
        0x80..=0xA0 => PDF_DOC_HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

/// A PDF date (`D:YYYYMMDDHHmmSSOHH'mm'`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CDDate(pub DateTime<FixedOffset>);

impl CDDate {
    /// Parse a date string; every field after the year is optional
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix("D:").unwrap_or(text);
        let bytes = text.as_bytes();

        let digits_at = |start: usize, len: usize| -> Option<u32> {
            let field = bytes.get(start..start + len)?;
            if !field.iter().all(u8::is_ascii_digit) {
                return None;
            }
            std::str::from_utf8(field).ok()?.parse().ok()
        };

        let year = digits_at(0, 4)? as i32;
        let mut pos = 4;
        let mut field = |default: u32| -> u32 {
            match digits_at(pos, 2) {
                Some(value) => {
                    pos += 2;
                    value
                }
                None => default,
            }
        };
        let month = field(1);
        let day = field(1);
        let hour = field(0);
        let minute = field(0);
        let second = field(0);

        let offset_seconds = match bytes.get(pos) {
            Some(sign @ (b'+' | b'-')) => {
                let hours = digits_at(pos + 1, 2).unwrap_or(0) as i32;
                // Minutes follow an apostrophe, which some writers leave out.
                let minute_start = if bytes.get(pos + 3) == Some(&b'\'') {
                    pos + 4
                } else {
                    pos + 3
                };
                let minutes = digits_at(minute_start, 2).unwrap_or(0) as i32;
                let seconds = hours * 3600 + minutes * 60;
                if *sign == b'-' {
                    -seconds
                } else {
                    seconds
                }
            }
            _ => 0,
        };

        let offset = FixedOffset::east_opt(offset_seconds)?;
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
        let date = offset.from_local_datetime(&naive).single()?;
        Some(CDDate(date))
    }

    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

impl fmt::Display for CDDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = self.0.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let offset = offset.abs();
        write!(
            f,
            "{}{sign}{:02}'{:02}'",
            self.0.format("D:%Y%m%d%H%M%S"),
            offset / 3600,
            offset % 3600 / 60
        )
    }
}

/// A rectangle with normalized corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CDRect {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl CDRect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        CDRect {
            llx: x1.min(x2),
            lly: y1.min(y2),
            urx: x1.max(x2),
            ury: y1.max(y2),
        }
    }

    /// Read `[x1 y1 x2 y2]`; `None` unless all four are numbers
    pub fn from_array(array: &CosArray) -> Option<Self> {
        if array.len() != 4 {
            return None;
        }
        let mut values = array.iter().map(CosObject::as_real);
        Some(CDRect::new(
            values.next()??,
            values.next()??,
            values.next()??,
            values.next()??,
        ))
    }

    pub fn from_object(obj: &CosObject) -> Option<Self> {
        obj.as_array().and_then(Self::from_array)
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    /// Overlap of two rectangles, `None` when they are disjoint
    pub fn intersect(&self, other: &CDRect) -> Option<CDRect> {
        let rect = CDRect {
            llx: self.llx.max(other.llx),
            lly: self.lly.max(other.lly),
            urx: self.urx.min(other.urx),
            ury: self.ury.min(other.ury),
        };
        (rect.llx <= rect.urx && rect.lly <= rect.ury).then_some(rect)
    }
}
