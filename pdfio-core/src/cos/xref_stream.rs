//! Cross-reference stream support for PDF 1.5+
//!
//! Cross-reference streams (ISO 32000-1 Section 7.5.8) store the xref index as
//! fixed-width binary records inside a stream whose dictionary doubles as the
//! trailer.

use super::objects::{CosDict, CosStream};
use super::xref::XRefEntry;
use super::{ParseError, ParseResult};
use tracing::warn;

/// A decoded cross-reference stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    /// Stream dictionary, which is also the trailer of this section
    pub dict: CosDict,
    /// Decoded stream data
    pub data: Vec<u8>,
    /// Field widths from the W array
    pub widths: [usize; 3],
    /// Index array (pairs of [first_object_number, count])
    pub index: Vec<(u32, u32)>,
}

impl XRefStream {
    /// Decode a cross-reference stream object
    pub fn parse(stream: &CosStream) -> ParseResult<Self> {
        let dict = &stream.dict;

        let w = dict
            .get("W")
            .and_then(|obj| obj.as_array())
            .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
        let widths: Vec<usize> = w
            .iter()
            .map(|obj| {
                obj.as_integer()
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|n| *n <= 8)
                    .ok_or_else(|| ParseError::syntax(0, "invalid width in xref stream W array"))
            })
            .collect::<ParseResult<_>>()?;
        let widths: [usize; 3] = widths.try_into().map_err(|w: Vec<usize>| {
            ParseError::syntax(0, format!("W array must have 3 elements, found {}", w.len()))
        })?;

        let index = match dict.get("Index").and_then(|obj| obj.as_array()) {
            Some(array) => array
                .0
                .chunks_exact(2)
                .filter_map(|pair| {
                    let first = u32::try_from(pair[0].as_integer()?).ok()?;
                    let count = u32::try_from(pair[1].as_integer()?).ok()?;
                    Some((first, count))
                })
                .collect(),
            None => {
                let size = dict
                    .get_integer("Size")
                    .and_then(|s| u32::try_from(s).ok())
                    .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
                vec![(0, size)]
            }
        };

        let data = stream.decode()?.to_vec();

        Ok(XRefStream {
            dict: dict.clone(),
            data,
            widths,
            index,
        })
    }

    /// Byte offset of the previous section, if any
    pub fn prev(&self) -> Option<u64> {
        self.dict
            .get_integer("Prev")
            .and_then(|p| u64::try_from(p).ok())
    }

    /// Expand the records into (object number, entry) pairs
    ///
    /// Truncated data yields the complete records that are present.
    pub fn entries(&self) -> Vec<(u32, XRefEntry)> {
        let entry_size: usize = self.widths.iter().sum();
        let mut entries = Vec::new();
        if entry_size == 0 {
            return entries;
        }

        let mut records = self.data.chunks_exact(entry_size);
        for &(first, count) in &self.index {
            for i in 0..count {
                let Some(record) = records.next() else {
                    warn!(
                        "Xref stream truncated at object {}",
                        first.saturating_add(i)
                    );
                    return entries;
                };
                let (type_field, rest) = record.split_at(self.widths[0]);
                let (field2, field3) = rest.split_at(self.widths[1]);

                // Type defaults to 1 when its width is zero.
                let entry_type = if self.widths[0] == 0 {
                    1
                } else {
                    read_field(type_field)
                };
                let field2 = read_field(field2);
                let field3 = read_field(field3);

                let num = first.saturating_add(i);
                let entry = match entry_type {
                    1 => match u16::try_from(field3) {
                        Ok(generation) => XRefEntry::InUse {
                            offset: field2,
                            generation,
                        },
                        Err(_) => oversized_entry(num, "generation", field3),
                    },
                    2 => match (u32::try_from(field2), u32::try_from(field3)) {
                        (Ok(stream_object_number), Ok(index_within_stream)) => {
                            XRefEntry::Compressed {
                                stream_object_number,
                                index_within_stream,
                            }
                        }
                        _ => oversized_entry(num, "object stream reference", field2.max(field3)),
                    },
                    // Type 0 and unknown types both resolve to null.
                    _ => XRefEntry::Free {
                        next_free_object: u32::try_from(field2).unwrap_or(0),
                        generation: u16::try_from(field3).unwrap_or(u16::MAX),
                    },
                };
                entries.push((num, entry));
            }
        }
        entries
    }
}

/// An entry whose fields do not fit their types is kept as free
fn oversized_entry(num: u32, field: &str, value: u64) -> XRefEntry {
    warn!("Xref stream entry {num}: {field} {value} out of range, treating as free");
    XRefEntry::Free {
        next_free_object: 0,
        generation: u16::MAX,
    }
}

/// Read a big-endian unsigned field
pub fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cos::objects::{CosArray, CosObject};

    fn xref_stream(widths: [i64; 3], index: Option<Vec<i64>>, size: i64, data: Vec<u8>) -> CosStream {
        let mut dict = CosDict::new();
        dict.insert("Type", CosObject::Name("XRef".into()));
        dict.insert(
            "W",
            CosObject::Array(CosArray(widths.iter().map(|w| CosObject::Integer(*w)).collect())),
        );
        dict.insert("Size", CosObject::Integer(size));
        if let Some(index) = index {
            dict.insert(
                "Index",
                CosObject::Array(CosArray(index.into_iter().map(CosObject::Integer).collect())),
            );
        }
        CosStream::new(dict, data)
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[]), 0);
        assert_eq!(read_field(&[0x01]), 1);
        assert_eq!(read_field(&[0x01, 0x00]), 256);
        assert_eq!(read_field(&[0x00, 0x01, 0x02]), 258);
    }

    #[test]
    fn test_entries_all_types() {
        let data = vec![
            0, 0, 0, 0xFF, // free
            1, 0, 0x10, 0, // offset 16
            2, 0, 0x05, 3, // in stream 5, index 3
        ];
        let xref = XRefStream::parse(&xref_stream([1, 2, 1], None, 3, data)).unwrap();
        let entries = xref.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            (
                0,
                XRefEntry::Free {
                    next_free_object: 0,
                    generation: 255
                }
            )
        );
        assert_eq!(
            entries[1],
            (
                1,
                XRefEntry::InUse {
                    offset: 16,
                    generation: 0
                }
            )
        );
        assert_eq!(
            entries[2],
            (
                2,
                XRefEntry::Compressed {
                    stream_object_number: 5,
                    index_within_stream: 3
                }
            )
        );
    }

    #[test]
    fn test_index_subsections() {
        let data = vec![1, 0, 10, 1, 0, 20, 1, 0, 30];
        let xref =
            XRefStream::parse(&xref_stream([1, 2, 0], Some(vec![3, 1, 10, 2]), 12, data)).unwrap();
        let numbers: Vec<u32> = xref.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![3, 10, 11]);
    }

    #[test]
    fn test_zero_type_width_defaults_to_in_use() {
        let xref = XRefStream::parse(&xref_stream([0, 1, 0], None, 1, vec![42])).unwrap();
        assert_eq!(
            xref.entries(),
            vec![(
                0,
                XRefEntry::InUse {
                    offset: 42,
                    generation: 0
                }
            )]
        );
    }

    #[test]
    fn test_truncated_data_keeps_complete_records() {
        let data = vec![1, 0, 10, 1, 0];
        let xref = XRefStream::parse(&xref_stream([1, 2, 0], None, 2, data)).unwrap();
        assert_eq!(xref.entries().len(), 1);
    }

    #[test]
    fn test_unknown_type_is_free() {
        let xref = XRefStream::parse(&xref_stream([1, 1, 1], None, 1, vec![7, 1, 1])).unwrap();
        assert!(matches!(xref.entries()[0].1, XRefEntry::Free { .. }));
    }

    #[test]
    fn test_oversized_fields_become_free() {
        let data = vec![
            2, 1, 0, 0, 0, 0, 0, 0, 1, // stream number 2^32
            1, 0, 0, 0, 0, 0x40, 1, 0, 0, // generation 65536
            2, 0, 0, 0, 0, 7, 0, 0, 2, // in stream 7, index 2
        ];
        let xref = XRefStream::parse(&xref_stream([1, 5, 3], None, 3, data)).unwrap();
        let entries = xref.entries();
        assert!(matches!(entries[0].1, XRefEntry::Free { .. }));
        assert!(matches!(entries[1].1, XRefEntry::Free { .. }));
        assert_eq!(
            entries[2].1,
            XRefEntry::Compressed {
                stream_object_number: 7,
                index_within_stream: 2
            }
        );
    }

    #[test]
    fn test_bad_w_array() {
        assert!(XRefStream::parse(&xref_stream([1, 2, 0], None, 1, vec![])).is_ok());
        let mut stream = xref_stream([1, 2, 0], None, 1, vec![]);
        stream.dict.insert(
            "W",
            CosObject::Array(CosArray(vec![CosObject::Integer(1), CosObject::Integer(2)])),
        );
        assert!(XRefStream::parse(&stream).is_err());
        stream.dict.remove("W");
        assert!(matches!(
            XRefStream::parse(&stream),
            Err(ParseError::MissingKey(_))
        ));
    }
}
