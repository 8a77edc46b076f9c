//! Cross-reference resolution
//!
//! Builds the object-number index of a file from classic xref tables
//! (ISO 32000-1 Section 7.5.4), cross-reference streams and the `/Prev`
//! chain left by incremental updates. When the index cannot be read the
//! file is scanned for `N G obj` headers instead.

use super::lexer::{is_regular, is_whitespace, Lexer, Token};
use super::object_stream::ObjectStream;
use super::objects::{CosDict, CosObject, ObjectId, ParseContext};
use super::source::ByteSource;
use super::trailer::{PdfTrailer, TrailerChain};
use super::xref_stream::XRefStream;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Location of one object number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object; resolves to null
    Free { next_free_object: u32, generation: u16 },
    /// Uncompressed object at a byte offset
    InUse { offset: u64, generation: u16 },
    /// Member of an object stream
    Compressed {
        stream_object_number: u32,
        index_within_stream: u32,
    },
}

impl XRefEntry {
    /// Generation an object reference must carry to match this entry
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// An `N G obj` header found by scanning raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub number: u32,
    pub generation: u16,
    pub offset: usize,
}

/// One xref section and its trailer
struct XRefSection {
    entries: Vec<(u32, XRefEntry)>,
    trailer: PdfTrailer,
}

/// Cross-reference index of a whole file
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailers: TrailerChain,
    trailer: CosDict,
    recovered: bool,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the index of `source`, falling back to a rebuild when allowed
    pub fn parse(source: &ByteSource, options: &ParseOptions) -> ParseResult<Self> {
        match Self::parse_chain(source, options) {
            Ok(table) if table.trailer.contains_key("Root") || !options.recover_xref => Ok(table),
            Ok(table) => {
                warn!("Trailer has no /Root, rebuilding cross-reference table");
                Self::recover(source, options).or(Ok(table))
            }
            Err(err) if options.recover_xref => {
                warn!("Cross-reference table unusable ({err}), rebuilding");
                Self::recover(source, options)
            }
            Err(err) => Err(err),
        }
    }

    /// Follow `startxref` and the `/Prev` chain, newest section first
    fn parse_chain(source: &ByteSource, options: &ParseOptions) -> ParseResult<Self> {
        let start = Self::find_startxref(source)?;
        let mut table = Self::new();
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                warn!("Cross-reference /Prev loop at offset {offset}");
                break;
            }
            let section = match Self::parse_section(source, offset, options) {
                Ok(section) => section,
                Err(err) if !table.trailers.is_empty() && options.lenient_syntax => {
                    warn!("Ignoring unreadable older xref section at {offset}: {err}");
                    break;
                }
                Err(err) => return Err(err),
            };
            debug!(
                "Xref section at {offset}: {} entries",
                section.entries.len()
            );
            table.merge_entries(section.entries);

            // Hybrid files: the stream fills what the table leaves out.
            if let Some(stm) = section.trailer.xref_stm {
                if visited.insert(stm) {
                    match Self::parse_section(source, stm, options) {
                        Ok(hybrid) => table.merge_entries(hybrid.entries),
                        Err(err) => warn!("Ignoring unreadable /XRefStm at {stm}: {err}"),
                    }
                }
            }

            next = section.trailer.prev;
            table.trailers.push(section.trailer);
        }

        table.trailer = table.trailers.merged();
        Ok(table)
    }

    /// Entries of older sections never replace those already known
    fn merge_entries(&mut self, entries: Vec<(u32, XRefEntry)>) {
        for (num, entry) in entries {
            self.entries.entry(num).or_insert(entry);
        }
    }

    /// Byte offset named by the last `startxref`
    pub fn find_startxref(source: &ByteSource) -> ParseResult<u64> {
        let pos = source
            .rfind_in_tail(b"startxref", 1024)
            .or_else(|| source.rfind_in_tail(b"startxref", source.len()))
            .ok_or(ParseError::InvalidXRef)?;

        let mut lexer = source.lexer_at(pos);
        lexer.next_token();
        match lexer.next_token() {
            Token::Integer(offset) if offset >= 0 && (offset as u64) < source.len() as u64 => {
                Ok(offset as u64)
            }
            _ => Err(ParseError::InvalidXRef),
        }
    }

    fn parse_section(
        source: &ByteSource,
        offset: u64,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        let pos = usize::try_from(offset)
            .ok()
            .filter(|pos| *pos < source.len())
            .ok_or(ParseError::InvalidXRef)?;
        let mut lexer = source.lexer_at(pos);

        match lexer.next_token() {
            Token::XRef => {
                let (entries, dict) = Self::parse_classic(&mut lexer, options)?;
                Ok(XRefSection {
                    entries,
                    trailer: PdfTrailer::from_dict(dict, offset),
                })
            }
            Token::Integer(_) => {
                lexer.seek(pos);
                let mut ctx = ParseContext::new(options);
                let (_, object) = CosObject::parse_indirect(&mut lexer, &mut ctx)?;
                let CosObject::Stream(stream) = object else {
                    return Err(ParseError::InvalidXRef);
                };
                if stream.dict.get_type() != Some("XRef") {
                    if !options.lenient_syntax || !stream.dict.contains_key("W") {
                        return Err(ParseError::InvalidXRef);
                    }
                    warn!("Xref stream at {offset} lacks /Type /XRef");
                }
                let xref = XRefStream::parse(&stream)?;
                Ok(XRefSection {
                    entries: xref.entries(),
                    trailer: PdfTrailer::from_dict(xref.dict, offset),
                })
            }
            _ => Err(ParseError::InvalidXRef),
        }
    }

    /// Subsections and trailer following an `xref` keyword
    fn parse_classic(
        lexer: &mut Lexer<'_>,
        options: &ParseOptions,
    ) -> ParseResult<(Vec<(u32, XRefEntry)>, CosDict)> {
        let mut entries = Vec::new();

        loop {
            match lexer.next_token() {
                Token::Integer(first) => {
                    let count = match lexer.next_token() {
                        Token::Integer(count) if count >= 0 => count,
                        _ => return Err(ParseError::InvalidXRef),
                    };
                    let mut first = u32::try_from(first).map_err(|_| ParseError::InvalidXRef)?;
                    for i in 0..count {
                        let Some((offset, generation, in_use)) = Self::read_record(lexer) else {
                            if !options.lenient_syntax {
                                return Err(ParseError::InvalidXRef);
                            }
                            warn!("Xref subsection {first} ends after {i} of {count} records");
                            return Self::resync_to_trailer(lexer, entries, options);
                        };
                        // Some writers number the subsection holding the free-list head from 1.
                        if i == 0 && first == 1 && !in_use && offset == 0 && generation == 65535 {
                            warn!("Xref subsection starting at 1 shifted to 0");
                            first = 0;
                        }
                        let Some(num) = u32::try_from(i).ok().and_then(|i| first.checked_add(i))
                        else {
                            return Err(ParseError::InvalidXRef);
                        };
                        let entry = if in_use {
                            XRefEntry::InUse { offset, generation }
                        } else {
                            let next_free_object = u32::try_from(offset).unwrap_or_else(|_| {
                                warn!("Free xref entry {num} links past u32 ({offset})");
                                0
                            });
                            XRefEntry::Free {
                                next_free_object,
                                generation,
                            }
                        };
                        entries.push((num, entry));
                    }
                }
                Token::Trailer => break,
                _ if options.lenient_syntax => {
                    return Self::resync_to_trailer(lexer, entries, options);
                }
                _ => return Err(ParseError::InvalidXRef),
            }
        }

        let dict = Self::read_trailer_dict(lexer, options)?;
        Ok((entries, dict))
    }

    /// `offset generation n|f`
    fn read_record(lexer: &mut Lexer<'_>) -> Option<(u64, u16, bool)> {
        let offset = match lexer.next_token() {
            Token::Integer(offset) => u64::try_from(offset).ok()?,
            _ => return None,
        };
        let generation = match lexer.next_token() {
            Token::Integer(gen) => u16::try_from(gen).ok()?,
            _ => return None,
        };
        match lexer.next_token() {
            Token::Keyword(kind) if kind == "n" => Some((offset, generation, true)),
            Token::Keyword(kind) if kind == "f" => Some((offset, generation, false)),
            _ => None,
        }
    }

    fn resync_to_trailer(
        lexer: &mut Lexer<'_>,
        entries: Vec<(u32, XRefEntry)>,
        options: &ParseOptions,
    ) -> ParseResult<(Vec<(u32, XRefEntry)>, CosDict)> {
        let from = lexer.position();
        let pos = super::source::find(&lexer.input()[from..], b"trailer")
            .ok_or(ParseError::InvalidTrailer)?;
        lexer.seek(from + pos);
        lexer.next_token();
        let dict = Self::read_trailer_dict(lexer, options)?;
        Ok((entries, dict))
    }

    fn read_trailer_dict(lexer: &mut Lexer<'_>, options: &ParseOptions) -> ParseResult<CosDict> {
        let mut ctx = ParseContext::new(options);
        match CosObject::parse(lexer, &mut ctx) {
            Ok(CosObject::Dictionary(dict)) => Ok(dict),
            _ => Err(ParseError::InvalidTrailer),
        }
    }

    /// Rebuild the index by scanning every byte of the file
    ///
    /// Later definitions of an object number win. The trailer comes from the
    /// last readable `trailer` dictionary, else from xref stream dictionaries;
    /// a missing `/Root` is filled with the first catalog found.
    pub fn recover(source: &ByteSource, options: &ParseOptions) -> ParseResult<Self> {
        warn!("Scanning {} bytes to rebuild cross-reference table", source.len());
        let headers = scan_object_headers(source.as_bytes());
        if headers.is_empty() {
            return Err(ParseError::InvalidXRef);
        }

        let mut table = Self::new();
        table.recovered = true;
        for header in &headers {
            table.entries.insert(
                header.number,
                XRefEntry::InUse {
                    offset: header.offset as u64,
                    generation: header.generation,
                },
            );
        }

        let lenient = ParseOptions {
            max_recursion_depth: options.max_recursion_depth,
            ..ParseOptions::lenient()
        };

        for pos in source.find_all(b"trailer").into_iter().rev() {
            let mut lexer = source.lexer_at(pos);
            if lexer.next_token() != Token::Trailer {
                continue;
            }
            if let Ok(dict) = Self::read_trailer_dict(&mut lexer, &lenient) {
                table.trailers.push(PdfTrailer::from_dict(dict, pos as u64));
            }
        }

        let mut catalog: Option<ObjectId> = None;
        let mut xref_dicts = Vec::new();
        let mut members = Vec::new();
        for header in &headers {
            // Superseded definitions are skipped.
            if table.entries.get(&header.number).and_then(|e| match e {
                XRefEntry::InUse { offset, .. } => Some(*offset),
                _ => None,
            }) != Some(header.offset as u64)
            {
                continue;
            }
            let mut lexer = source.lexer_at(header.offset);
            let mut ctx = ParseContext::new(&lenient);
            let Ok((id, object)) = CosObject::parse_indirect(&mut lexer, &mut ctx) else {
                continue;
            };
            match &object {
                CosObject::Stream(stream) => match stream.dict.get_type() {
                    Some("XRef") => xref_dicts.push((header.offset, stream.dict.clone())),
                    Some("ObjStm") => {
                        let Ok(data) = stream.decode() else { continue };
                        let Ok(objstm) = ObjectStream::parse(stream, data, &lenient) else {
                            continue;
                        };
                        for (index, member) in objstm.object_numbers().enumerate() {
                            if catalog.is_none() {
                                let is_catalog = objstm
                                    .get_by_index(index as u32)
                                    .and_then(|(_, obj)| obj.as_dict())
                                    .and_then(|dict| dict.get_type())
                                    == Some("Catalog");
                                if is_catalog {
                                    catalog = Some((member, 0));
                                }
                            }
                            members.push((member, id.0, index as u32));
                        }
                    }
                    _ => {}
                },
                CosObject::Dictionary(dict) if catalog.is_none() => {
                    if dict.get_type() == Some("Catalog") {
                        catalog = Some(id);
                    }
                }
                _ => {}
            }
        }

        for (member, stream_object_number, index_within_stream) in members {
            table.entries.entry(member).or_insert(XRefEntry::Compressed {
                stream_object_number,
                index_within_stream,
            });
        }

        if table.trailers.is_empty() {
            xref_dicts.sort_by(|a, b| b.0.cmp(&a.0));
            for (offset, dict) in xref_dicts {
                table.trailers.push(PdfTrailer::from_dict(dict, offset as u64));
            }
        }

        table.trailer = table.trailers.merged();
        let root_usable = table
            .trailer
            .get("Root")
            .and_then(|root| root.as_reference())
            .is_some_and(|(num, _)| table.entries.contains_key(&num));
        if !root_usable {
            let catalog = catalog.ok_or_else(|| ParseError::MissingKey("Root".to_string()))?;
            warn!("Using catalog {} {} found by scan as /Root", catalog.0, catalog.1);
            table
                .trailer
                .insert("Root", CosObject::Reference(catalog.0, catalog.1));
        }

        debug!("Recovered {} objects", table.entries.len());
        Ok(table)
    }

    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Merged trailer of all sections, newest keys winning
    pub fn trailer(&self) -> &CosDict {
        &self.trailer
    }

    /// Per-section trailers, newest first
    pub fn trailers(&self) -> &TrailerChain {
        &self.trailers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Whether the index was rebuilt by scanning
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }
}

/// Every `N G obj` header in `data`, in file order
pub fn scan_object_headers(data: &[u8]) -> Vec<ObjectHeader> {
    let mut headers = Vec::new();
    let mut from = 0;
    while let Some(found) = super::source::find(&data[from..], b"obj") {
        let pos = from + found;
        from = pos + 3;
        if data.get(pos + 3).is_some_and(|b| is_regular(*b)) {
            continue;
        }
        if let Some(header) = header_before(data, pos) {
            headers.push(header);
        }
    }
    headers
}

/// Parse `N G` backwards from the `obj` keyword at `pos`
fn header_before(data: &[u8], pos: usize) -> Option<ObjectHeader> {
    let mut i = pos;
    let skip_ws = |i: &mut usize| -> bool {
        let start = *i;
        while *i > 0 && is_whitespace(data[*i - 1]) {
            *i -= 1;
        }
        *i < start
    };
    let digits = |i: &mut usize| -> Option<(usize, usize)> {
        let end = *i;
        while *i > 0 && data[*i - 1].is_ascii_digit() && end - *i < 10 {
            *i -= 1;
        }
        (*i < end).then_some((*i, end))
    };

    if !skip_ws(&mut i) {
        return None;
    }
    let (gen_start, gen_end) = digits(&mut i)?;
    if !skip_ws(&mut i) {
        return None;
    }
    let (num_start, num_end) = digits(&mut i)?;
    if num_start > 0 && is_regular(data[num_start - 1]) {
        return None;
    }

    let number = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    Some(ObjectHeader {
        number,
        generation,
        offset: num_start,
    })
}
