//! Object streams (PDF 1.5+)
//!
//! An object stream packs several non-stream objects into one compressed
//! stream. The decoded payload starts with `N` pairs of integers
//! (object number, offset relative to `/First`), followed by the objects.

use super::lexer::{Lexer, Token};
use super::objects::{CosObject, CosStream, ObjectId, ParseContext};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use tracing::warn;

/// A parsed object stream
#[derive(Debug)]
pub struct ObjectStream {
    /// Number of objects declared by `/N`
    n: u32,
    /// Offset of the first object within the decoded data
    first: usize,
    /// Member objects in stream order
    objects: Vec<(u32, CosObject)>,
    /// Object number -> index in `objects`
    by_number: HashMap<u32, usize>,
    /// Parent stream named by `/Extends`
    extends: Option<ObjectId>,
}

impl ObjectStream {
    /// Parse every member of `stream`
    ///
    /// The stream must already decode with its own dictionary, or `decoded`
    /// must be supplied by a caller that resolved indirect filter entries.
    pub fn parse(
        stream: &CosStream,
        decoded: &[u8],
        options: &ParseOptions,
    ) -> ParseResult<Self> {
        let dict = &stream.dict;

        let n = dict
            .get_integer("N")
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = dict
            .get_integer("First")
            .and_then(|f| usize::try_from(f).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;
        let extends = dict.get("Extends").and_then(|obj| obj.as_reference());

        let mut lexer = Lexer::new(decoded);
        let mut offsets = Vec::with_capacity(n.min(4096) as usize);
        for i in 0..n {
            let pair = match (lexer.next_token(), lexer.next_token()) {
                (Token::Integer(num), Token::Integer(offset)) => {
                    u32::try_from(num).ok().zip(usize::try_from(offset).ok())
                }
                _ => None,
            };
            match pair {
                Some(pair) => offsets.push(pair),
                None if options.lenient_syntax => {
                    warn!("Object stream header ends after {i} of {n} entries");
                    break;
                }
                None => {
                    return Err(ParseError::syntax(
                        lexer.position(),
                        "expected object number and offset in object stream",
                    ))
                }
            }
        }

        let mut objects = Vec::with_capacity(offsets.len());
        let mut by_number = HashMap::with_capacity(offsets.len());
        for (num, offset) in offsets {
            let object = match Self::parse_member(decoded, first.saturating_add(offset), options) {
                Ok(object) => object,
                Err(err) if options.lenient_syntax => {
                    warn!("Object {num} in object stream unreadable: {err}");
                    CosObject::Null
                }
                Err(err) => return Err(err),
            };
            by_number.entry(num).or_insert(objects.len());
            objects.push((num, object));
        }

        Ok(ObjectStream {
            n,
            first,
            objects,
            by_number,
            extends,
        })
    }

    fn parse_member(data: &[u8], offset: usize, options: &ParseOptions) -> ParseResult<CosObject> {
        if offset >= data.len() {
            return Err(ParseError::syntax(offset, "object offset beyond object stream data"));
        }
        let mut lexer = Lexer::new(data);
        lexer.seek(offset);
        let mut ctx = ParseContext::new(options);
        let object = CosObject::parse(&mut lexer, &mut ctx)?;
        if matches!(object, CosObject::Stream(_)) {
            return Err(ParseError::syntax(offset, "stream object inside object stream"));
        }
        Ok(object)
    }

    /// Object declared at position `index`, with its object number
    pub fn get_by_index(&self, index: u32) -> Option<(u32, &CosObject)> {
        self.objects
            .get(index as usize)
            .map(|(num, obj)| (*num, obj))
    }

    /// Look up a member by object number
    ///
    /// A miss on a stream that declares `/Extends` is reported as unsupported
    /// rather than as an absent object.
    pub fn get_object(&self, obj_num: u32) -> ParseResult<Option<&CosObject>> {
        match self.by_number.get(&obj_num) {
            Some(&index) => Ok(Some(&self.objects[index].1)),
            None if self.extends.is_some() => Err(ParseError::UnsupportedFeature(
                "object stream /Extends chains".to_string(),
            )),
            None => Ok(None),
        }
    }

    /// Member object for an xref entry: the index is preferred, and the
    /// object number is checked against it
    pub fn get_entry(&self, obj_num: u32, index: u32) -> ParseResult<Option<&CosObject>> {
        match self.get_by_index(index) {
            Some((num, obj)) if num == obj_num => Ok(Some(obj)),
            _ => self.get_object(obj_num),
        }
    }

    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.iter().map(|(num, _)| *num)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn declared_count(&self) -> u32 {
        self.n
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn extends(&self) -> Option<ObjectId> {
        self.extends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cos::objects::CosDict;

    fn object_stream(n: i64, first: i64, data: &[u8]) -> CosStream {
        let mut dict = CosDict::new();
        dict.insert("Type", CosObject::Name("ObjStm".into()));
        dict.insert("N", CosObject::Integer(n));
        dict.insert("First", CosObject::Integer(first));
        CosStream::new(dict, data.to_vec())
    }

    const BODY: &[u8] = b"10 0 11 14 12 22 <</Type/Font>> [1 2 3] (hello)";

    #[test]
    fn test_parse_members() {
        let stream = object_stream(3, 17, BODY);
        let objstm = ObjectStream::parse(&stream, BODY, &ParseOptions::default()).unwrap();
        assert_eq!(objstm.len(), 3);
        assert_eq!(objstm.object_numbers().collect::<Vec<_>>(), vec![10, 11, 12]);

        let (num, font) = objstm.get_by_index(0).unwrap();
        assert_eq!(num, 10);
        assert_eq!(font.as_dict().unwrap().get_type(), Some("Font"));
        assert_eq!(objstm.get_object(11).unwrap().unwrap().as_array().unwrap().len(), 3);
        assert_eq!(
            objstm.get_entry(12, 2).unwrap().unwrap().as_string().unwrap().as_bytes(),
            b"hello"
        );
        assert!(objstm.get_object(99).unwrap().is_none());
    }

    #[test]
    fn test_entry_falls_back_to_number() {
        let stream = object_stream(3, 17, BODY);
        let objstm = ObjectStream::parse(&stream, BODY, &ParseOptions::default()).unwrap();
        // Wrong index, right number
        assert!(objstm.get_entry(11, 0).unwrap().unwrap().as_array().is_some());
    }

    #[test]
    fn test_missing_keys() {
        let mut stream = object_stream(1, 4, b"1 0 null");
        stream.dict.remove("First");
        let result = ObjectStream::parse(&stream, b"1 0 null", &ParseOptions::default());
        assert!(matches!(result, Err(ParseError::MissingKey(key)) if key == "First"));
    }

    #[test]
    fn test_short_header() {
        let data = b"5 0 true";
        let stream = object_stream(4, 4, data);
        let objstm = ObjectStream::parse(&stream, data, &ParseOptions::lenient()).unwrap();
        assert_eq!(objstm.len(), 1);
        assert_eq!(objstm.declared_count(), 4);
        assert!(ObjectStream::parse(&stream, data, &ParseOptions::strict()).is_err());
    }

    #[test]
    fn test_extends_miss_is_unsupported() {
        let mut stream = object_stream(1, 4, b"1 0 null");
        stream.dict.insert("Extends", CosObject::Reference(7, 0));
        let objstm = ObjectStream::parse(&stream, b"1 0 null", &ParseOptions::default()).unwrap();
        assert_eq!(objstm.extends(), Some((7, 0)));
        assert!(objstm.get_object(1).unwrap().is_some());
        assert!(matches!(
            objstm.get_object(2),
            Err(ParseError::UnsupportedFeature(_))
        ));
    }
}
