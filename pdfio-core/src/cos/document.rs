//! COS document
//!
//! [`CosDoc`] owns the bytes of one file and its cross-reference index and
//! resolves indirect references on demand. Resolved objects are cached and
//! handed out as shared [`Rc`] handles.

use super::header::{PdfHeader, PdfVersion};
use super::object_stream::ObjectStream;
use super::objects::{CosArray, CosDict, CosObject, CosStream, ObjectId, ParseContext};
use super::source::ByteSource;
use super::xref::{scan_object_headers, XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// A PDF file at the object level
pub struct CosDoc {
    source: ByteSource,
    header: PdfHeader,
    xref: XRefTable,
    options: ParseOptions,
    /// Cache of resolved objects
    object_cache: RefCell<HashMap<ObjectId, Rc<CosObject>>>,
    /// Cache of parsed object streams, keyed by stream object number
    object_stream_cache: RefCell<HashMap<u32, Rc<ObjectStream>>>,
    /// Ids whose resolution is in progress
    resolving: RefCell<HashSet<ObjectId>>,
    /// `N G obj` headers found by scanning, built on first need
    scanned_offsets: OnceCell<HashMap<ObjectId, usize>>,
}

impl CosDoc {
    /// Open a file with lenient options
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> ParseResult<Self> {
        Self::from_source(ByteSource::open(path)?, options)
    }

    pub fn from_reader<R: Read>(reader: R) -> ParseResult<Self> {
        Self::from_reader_with_options(reader, ParseOptions::default())
    }

    pub fn from_reader_with_options<R: Read>(reader: R, options: ParseOptions) -> ParseResult<Self> {
        Self::from_source(ByteSource::from_reader(reader)?, options)
    }

    pub fn from_bytes(data: Vec<u8>) -> ParseResult<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    pub fn from_bytes_with_options(data: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        if data.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        Self::from_source(ByteSource::from_bytes(data), options)
    }

    fn from_source(source: ByteSource, options: ParseOptions) -> ParseResult<Self> {
        let header = PdfHeader::parse(source.as_bytes(), options.lenient_syntax)?;
        let xref = XRefTable::parse(&source, &options)?;
        debug!(
            "Opened PDF {} with {} xref entries",
            header.version,
            xref.len()
        );
        if xref.trailer().contains_key("Encrypt") {
            warn!("Document is encrypted; stream data cannot be decoded");
        }

        Ok(CosDoc {
            source,
            header,
            xref,
            options,
            object_cache: RefCell::new(HashMap::new()),
            object_stream_cache: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            scanned_offsets: OnceCell::new(),
        })
    }

    pub fn version(&self) -> PdfVersion {
        self.header.version
    }

    pub fn header(&self) -> &PdfHeader {
        &self.header
    }

    /// The merged trailer dictionary
    pub fn get_root(&self) -> &CosDict {
        self.xref.trailer()
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn is_encrypted(&self) -> bool {
        self.get_root().contains_key("Encrypt")
    }

    /// Ids of every in-use object, sorted
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .xref
            .iter()
            .filter(|(_, entry)| entry.is_in_use())
            .map(|(num, entry)| (*num, entry.generation()))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve `obj` if it is a reference
    ///
    /// Direct objects are returned as they are. Unresolvable references
    /// (free, missing, wrong generation, unreadable, cyclic) yield `Null`.
    pub fn get_object(&self, obj: &CosObject) -> Rc<CosObject> {
        match obj.as_reference() {
            Some(id) => self.resolve(id),
            None => Rc::new(obj.clone()),
        }
    }

    /// Like [`get_object`](Self::get_object) but reports why a reference failed
    pub fn get_object_strict(&self, obj: &CosObject) -> ParseResult<Rc<CosObject>> {
        match obj.as_reference() {
            Some(id) => self.load(id),
            None => Ok(Rc::new(obj.clone())),
        }
    }

    /// Resolve an object id, `Null` on failure
    pub fn resolve(&self, id: ObjectId) -> Rc<CosObject> {
        match self.load(id) {
            Ok(obj) => obj,
            Err(err) => {
                debug!("Object {} {} resolves to null: {err}", id.0, id.1);
                Rc::new(CosObject::Null)
            }
        }
    }

    /// Whether `id` has been resolved and cached
    pub fn is_cached(&self, id: ObjectId) -> bool {
        self.object_cache.borrow().contains_key(&id)
    }

    fn load(&self, id: ObjectId) -> ParseResult<Rc<CosObject>> {
        if let Some(obj) = self.object_cache.borrow().get(&id) {
            trace!("Cache hit for object {} {}", id.0, id.1);
            return Ok(Rc::clone(obj));
        }

        if !self.resolving.borrow_mut().insert(id) {
            return Err(ParseError::CircularReference);
        }
        let result = self.load_uncached(id);
        self.resolving.borrow_mut().remove(&id);

        let obj = Rc::new(result?);
        self.object_cache.borrow_mut().insert(id, Rc::clone(&obj));
        Ok(obj)
    }

    fn load_uncached(&self, id: ObjectId) -> ParseResult<CosObject> {
        let (num, gen) = id;
        let entry = *self
            .xref
            .get_entry(num)
            .ok_or(ParseError::InvalidReference(num, gen))?;

        match entry {
            XRefEntry::Free { .. } => {
                debug!("Object {num} {gen} is free");
                Ok(CosObject::Null)
            }
            XRefEntry::InUse { generation, .. } if generation != gen => {
                Err(ParseError::InvalidReference(num, gen))
            }
            XRefEntry::InUse { offset, .. } => self.load_at(id, offset),
            XRefEntry::Compressed {
                stream_object_number,
                index_within_stream,
            } => {
                if gen != 0 {
                    return Err(ParseError::InvalidReference(num, gen));
                }
                let objstm = self.object_stream(stream_object_number)?;
                objstm
                    .get_entry(num, index_within_stream)?
                    .cloned()
                    .ok_or(ParseError::InvalidReference(num, gen))
            }
        }
    }

    /// Parse the object at `offset`, falling back to a scanned location
    /// when the header there names a different object
    fn load_at(&self, id: ObjectId, offset: u64) -> ParseResult<CosObject> {
        let first = match self.parse_at(offset) {
            Ok((found, obj)) if found == id => return Ok(obj),
            other => other,
        };

        if self.options.recover_xref {
            let scanned = self
                .scanned_offsets()
                .get(&id)
                .copied()
                .filter(|pos| *pos as u64 != offset);
            if let Some(pos) = scanned {
                warn!(
                    "Object {} {} not at xref offset {offset}, using {pos}",
                    id.0, id.1
                );
                let (found, obj) = self.parse_at(pos as u64)?;
                if found == id {
                    return Ok(obj);
                }
            }
        }

        match first {
            Ok((found, _)) => Err(ParseError::syntax(
                offset as usize,
                format!(
                    "expected object {} {}, found {} {}",
                    id.0, id.1, found.0, found.1
                ),
            )),
            Err(err) => Err(err),
        }
    }

    fn parse_at(&self, offset: u64) -> ParseResult<(ObjectId, CosObject)> {
        let pos = usize::try_from(offset)
            .ok()
            .filter(|pos| *pos < self.source.len())
            .ok_or_else(|| ParseError::syntax(0, format!("object offset {offset} out of range")))?;
        let resolve_length = |id: ObjectId| self.resolve_length(id);
        let mut ctx = ParseContext::new(&self.options).with_length_resolver(&resolve_length);
        let mut lexer = self.source.lexer_at(pos);
        CosObject::parse_indirect(&mut lexer, &mut ctx)
    }

    fn resolve_length(&self, id: ObjectId) -> Option<usize> {
        self.load(id)
            .ok()
            .and_then(|obj| obj.as_integer())
            .and_then(|len| usize::try_from(len).ok())
    }

    fn scanned_offsets(&self) -> &HashMap<ObjectId, usize> {
        self.scanned_offsets.get_or_init(|| {
            scan_object_headers(self.source.as_bytes())
                .into_iter()
                .map(|header| ((header.number, header.generation), header.offset))
                .collect()
        })
    }

    fn object_stream(&self, num: u32) -> ParseResult<Rc<ObjectStream>> {
        if let Some(objstm) = self.object_stream_cache.borrow().get(&num) {
            return Ok(Rc::clone(objstm));
        }

        let gen = self.xref.get_entry(num).map_or(0, |entry| entry.generation());
        let obj = self.load((num, gen))?;
        let stream = obj.as_stream().ok_or_else(|| {
            ParseError::syntax(0, format!("object {num} is not an object stream"))
        })?;
        let data = self.decode_stream(stream)?;
        let objstm = Rc::new(ObjectStream::parse(stream, data, &self.options)?);

        self.object_stream_cache
            .borrow_mut()
            .insert(num, Rc::clone(&objstm));
        Ok(objstm)
    }

    /// Decode a stream, resolving indirect `/Filter` and `/DecodeParms` first
    pub fn decode_stream<'s>(&self, stream: &'s CosStream) -> ParseResult<&'s [u8]> {
        if self.is_encrypted() {
            return Err(ParseError::UnsupportedFeature(
                "encrypted stream data".to_string(),
            ));
        }

        let indirect = ["Filter", "DecodeParms"]
            .iter()
            .any(|key| stream.dict.get(key).is_some_and(has_reference));
        if !indirect {
            return stream.decode();
        }

        let mut dict = stream.dict.clone();
        for key in ["Filter", "DecodeParms"] {
            if let Some(value) = stream.dict.get(key) {
                dict.insert(key, self.resolve_one_level(value));
            }
        }
        stream.decode_with(&dict)
    }

    /// Decoded stream bytes, empty when decoding fails
    pub fn decoded_data<'s>(&self, stream: &'s CosStream) -> &'s [u8] {
        match self.decode_stream(stream) {
            Ok(data) => data,
            Err(err) => {
                warn!("Stream decode failed, using empty payload: {err}");
                &[]
            }
        }
    }

    /// Resolve `value` and, for arrays, each element
    fn resolve_one_level(&self, value: &CosObject) -> CosObject {
        let resolved = self.get_object(value);
        match resolved.as_ref() {
            CosObject::Array(array) => CosObject::Array(CosArray(
                array
                    .iter()
                    .map(|item| self.get_object(item).as_ref().clone())
                    .collect(),
            )),
            other => other.clone(),
        }
    }
}

fn has_reference(obj: &CosObject) -> bool {
    match obj {
        CosObject::Reference(..) => true,
        CosObject::Array(array) => array.iter().any(has_reference),
        _ => false,
    }
}

impl std::fmt::Debug for CosDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosDoc")
            .field("version", &self.header.version)
            .field("size", &self.source.len())
            .field("objects", &self.xref.len())
            .field("recovered", &self.xref.is_recovered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_minimal_pdf, PdfBuilder, HELLO_CONTENT};
    use pretty_assertions::assert_eq;

    fn reference(num: u32, gen: u16) -> CosObject {
        CosObject::Reference(num, gen)
    }

    #[test]
    fn test_open_minimal() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        assert_eq!(doc.version(), PdfVersion::new(1, 7));
        assert_eq!(doc.get_root().get("Root"), Some(&reference(1, 0)));
        assert!(!doc.is_encrypted());
        assert_eq!(
            doc.object_ids(),
            vec![(1, 0), (2, 0), (3, 0), (4, 0), (5, 0)]
        );
    }

    #[test]
    fn test_get_object_idempotent_and_cached() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        assert!(!doc.is_cached((1, 0)));
        let first = doc.get_object(&reference(1, 0));
        assert!(doc.is_cached((1, 0)));
        let second = doc.get_object(&reference(1, 0));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.as_dict().unwrap().get_type(), Some("Catalog"));
    }

    #[test]
    fn test_direct_object_passes_through() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        let obj = CosObject::Integer(42);
        assert_eq!(*doc.get_object(&obj), obj);
    }

    #[test]
    fn test_unresolvable_references_are_null() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        // free
        assert!(doc.get_object(&reference(0, 65535)).is_null());
        // missing
        assert!(doc.get_object(&reference(99, 0)).is_null());
        // wrong generation
        assert!(doc.get_object(&reference(1, 3)).is_null());
        assert!(matches!(
            doc.get_object_strict(&reference(1, 3)),
            Err(ParseError::InvalidReference(1, 3))
        ));
    }

    #[test]
    fn test_stream_decode_through_document() {
        let doc = CosDoc::from_bytes(create_minimal_pdf()).unwrap();
        let contents = doc.get_object(&reference(4, 0));
        let stream = contents.as_stream().unwrap();
        assert_eq!(doc.decode_stream(stream).unwrap(), HELLO_CONTENT);
    }

    #[test]
    fn test_indirect_length() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog >>")
            .object(2, "<< /Length 3 0 R >>\nstream\nabcdef\nendstream")
            .object(3, "6");
        let doc = CosDoc::from_bytes_with_options(
            pdf.finish_with_table("/Root 1 0 R"),
            ParseOptions::strict(),
        )
        .unwrap();
        let obj = doc.get_object(&reference(2, 0));
        assert_eq!(obj.as_stream().unwrap().raw_data(), b"abcdef");
    }

    #[test]
    fn test_self_referential_length_is_repaired() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog >>")
            .object(2, "<< /Length 2 0 R >>\nstream\nxyz\nendstream");
        let doc = CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R")).unwrap();
        let obj = doc.get_object(&reference(2, 0));
        assert_eq!(obj.as_stream().unwrap().raw_data(), b"xyz");
    }

    #[test]
    fn test_compressed_objects() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>").object_stream(
            5,
            &[
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (3, "[1 2 3]"),
            ],
        );
        let xref = pdf.xref_stream(6, "/Root 1 0 R");
        pdf.startxref(xref);

        let doc = CosDoc::from_bytes(pdf.finish()).unwrap();
        let pages = doc.get_object(&reference(2, 0));
        assert_eq!(pages.as_dict().unwrap().get_type(), Some("Pages"));
        let array = doc.get_object(&reference(3, 0));
        assert_eq!(array.as_array().unwrap().len(), 3);
        assert!(doc.get_object(&reference(3, 1)).is_null());
    }

    #[test]
    fn test_wrong_xref_offset_uses_scan() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog >>").object(2, "(two)");
        let obj1 = pdf.offset_of(1);
        let xref = pdf.position();
        pdf.raw(
            format!(
                "xref\n0 3\n0000000000 65535 f \n{obj1:010} 00000 n \n{obj1:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n"
            )
            .as_bytes(),
        );
        pdf.startxref(xref);
        let data = pdf.finish();

        let doc = CosDoc::from_bytes(data.clone()).unwrap();
        let two = doc.get_object(&reference(2, 0));
        assert_eq!(two.as_string().unwrap().as_bytes(), b"two");

        let strict = CosDoc::from_bytes_with_options(data, ParseOptions::strict()).unwrap();
        assert!(strict.get_object(&reference(2, 0)).is_null());
    }

    #[test]
    fn test_indirect_filter_resolved() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog >>")
            .stream(2, "/Filter 3 0 R", b"48656C6C6F>")
            .object(3, "/ASCIIHexDecode");
        let doc = CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R")).unwrap();
        let obj = doc.get_object(&reference(2, 0));
        assert_eq!(doc.decode_stream(obj.as_stream().unwrap()).unwrap(), b"Hello");
    }

    #[test]
    fn test_encrypted_document() {
        let mut pdf = PdfBuilder::new();
        pdf.object(1, "<< /Type /Catalog >>")
            .stream(2, "", b"secret")
            .object(3, "<< /Filter /Standard /V 2 >>");
        let doc =
            CosDoc::from_bytes(pdf.finish_with_table("/Root 1 0 R /Encrypt 3 0 R")).unwrap();
        assert!(doc.is_encrypted());
        let obj = doc.get_object(&reference(2, 0));
        let stream = obj.as_stream().unwrap();
        assert!(matches!(
            doc.decode_stream(stream),
            Err(ParseError::UnsupportedFeature(_))
        ));
        assert!(doc.decoded_data(stream).is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            CosDoc::from_bytes(Vec::new()),
            Err(ParseError::EmptyFile)
        ));
        assert!(matches!(
            CosDoc::from_reader(std::io::Cursor::new(Vec::new())),
            Err(ParseError::EmptyFile)
        ));
    }

    #[test]
    fn test_open_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &create_minimal_pdf()).unwrap();
        let doc = CosDoc::open(file.path()).unwrap();
        assert_eq!(doc.object_ids().len(), 5);
    }
}
