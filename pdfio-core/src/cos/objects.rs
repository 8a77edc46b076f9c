//! COS objects
//!
//! The closed set of PDF object kinds (ISO 32000-1 Section 7.3), the parser
//! that builds them from a [`Lexer`] and the serializer that writes them back.

use super::filters;
use super::lexer::{is_regular, Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Identity of an indirect object: (object number, generation)
pub type ObjectId = (u32, u16);

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CosName(pub String);

/// PDF String object; the bytes are kept undecoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CosString(pub Vec<u8>);

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CosArray(pub Vec<CosObject>);

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CosDict(pub HashMap<CosName, CosObject>);

/// PDF Stream object
///
/// Holds the raw bytes exactly as stored in the file. Decoding through the
/// filter pipeline happens on demand and the result is cached.
#[derive(Debug, Clone)]
pub struct CosStream {
    pub dict: CosDict,
    pub data: Vec<u8>,
    decoded: OnceCell<Vec<u8>>,
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum CosObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(CosName),
    LiteralString(CosString),
    HexString(CosString),
    Array(CosArray),
    Dictionary(CosDict),
    Stream(CosStream),
    Reference(u32, u16),
}

/// Per-parse state passed down by the caller
///
/// Carries the options in force, the current nesting depth and an optional
/// resolver used when a stream's `/Length` is an indirect reference.
pub struct ParseContext<'a> {
    options: &'a ParseOptions,
    length_resolver: Option<&'a dyn Fn(ObjectId) -> Option<usize>>,
    depth: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(options: &'a ParseOptions) -> Self {
        Self {
            options,
            length_resolver: None,
            depth: 0,
        }
    }

    pub fn with_length_resolver(mut self, resolver: &'a dyn Fn(ObjectId) -> Option<usize>) -> Self {
        self.length_resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        self.options
    }

    fn enter(&mut self, position: usize) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.options.max_recursion_depth {
            return Err(ParseError::syntax(position, "objects nested too deeply"));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

impl CosObject {
    /// Parse one object from a byte slice with lenient options
    pub fn from_bytes(input: &[u8]) -> ParseResult<Self> {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options);
        Self::parse(&mut Lexer::new(input), &mut ctx)
    }

    /// Parse a PDF object from a lexer
    pub fn parse(lexer: &mut Lexer<'_>, ctx: &mut ParseContext<'_>) -> ParseResult<Self> {
        let token = lexer.next_token();
        Self::parse_from_token(lexer, token, ctx)
    }

    /// Parse a PDF object starting from an already-read token
    pub fn parse_from_token(
        lexer: &mut Lexer<'_>,
        token: Token,
        ctx: &mut ParseContext<'_>,
    ) -> ParseResult<Self> {
        match token {
            Token::Null => Ok(CosObject::Null),
            Token::Boolean(b) => Ok(CosObject::Boolean(b)),
            Token::Integer(i) => Ok(Self::parse_integer_or_reference(lexer, i)),
            Token::Real(r) => Ok(CosObject::Real(r)),
            Token::String(s) => Ok(CosObject::LiteralString(CosString(s))),
            Token::HexString(s) => Ok(CosObject::HexString(CosString(s))),
            Token::Name(n) => Ok(CosObject::Name(CosName(n))),
            Token::ArrayStart => Self::parse_array(lexer, ctx),
            Token::DictStart => Self::parse_dictionary_or_stream(lexer, ctx),
            Token::Eof => Err(ParseError::syntax(
                lexer.position(),
                "unexpected end of input",
            )),
            other => Err(ParseError::UnexpectedToken {
                expected: "object".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// `<int> <int> R` collapses into a reference; anything else is pushed back
    fn parse_integer_or_reference(lexer: &mut Lexer<'_>, number: i64) -> Self {
        let Ok(obj_num) = u32::try_from(number) else {
            return CosObject::Integer(number);
        };

        let second = lexer.next_token();
        let gen = match &second {
            Token::Integer(g) => u16::try_from(*g).ok(),
            _ => None,
        };
        let Some(gen) = gen else {
            lexer.push_token(second);
            return CosObject::Integer(number);
        };

        let third = lexer.next_token();
        if third.is_keyword("R") {
            return CosObject::Reference(obj_num, gen);
        }
        lexer.push_token(third);
        lexer.push_token(second);
        CosObject::Integer(number)
    }

    fn parse_array(lexer: &mut Lexer<'_>, ctx: &mut ParseContext<'_>) -> ParseResult<Self> {
        ctx.enter(lexer.position())?;
        let mut elements = Vec::new();

        loop {
            let token = lexer.next_token();
            match token {
                Token::ArrayEnd => break,
                Token::Eof => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::syntax(lexer.position(), "unterminated array"));
                    }
                    warn!("Unterminated array closed at end of input");
                    break;
                }
                Token::DictEnd | Token::BraceStart | Token::BraceEnd | Token::Keyword(_) => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::UnexpectedToken {
                            expected: "array element or ]".to_string(),
                            found: format!("{token:?}"),
                        });
                    }
                    // Scan on towards the matching ']'.
                    warn!("Skipping {token:?} inside array at {}", lexer.position());
                }
                t if is_structural_keyword(&t) => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::syntax(lexer.position(), "unterminated array"));
                    }
                    lexer.push_token(t);
                    break;
                }
                t => elements.push(Self::parse_from_token(lexer, t, ctx)?),
            }
        }

        ctx.exit();
        Ok(CosObject::Array(CosArray(elements)))
    }

    fn parse_dictionary_or_stream(
        lexer: &mut Lexer<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> ParseResult<Self> {
        let dict = Self::parse_dictionary_inner(lexer, ctx)?;

        let next = lexer.next_token();
        if next == Token::Stream {
            let stream = Self::parse_stream_data(lexer, dict, ctx)?;
            return Ok(CosObject::Stream(stream));
        }
        lexer.push_token(next);
        Ok(CosObject::Dictionary(dict))
    }

    fn parse_dictionary_inner(
        lexer: &mut Lexer<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> ParseResult<CosDict> {
        ctx.enter(lexer.position())?;
        let mut dict = CosDict::new();

        loop {
            let token = lexer.next_token();
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value_token = lexer.next_token();
                    match value_token {
                        Token::DictEnd if ctx.options.lenient_syntax => {
                            dict.insert(key, CosObject::Null);
                            break;
                        }
                        t if is_structural_keyword(&t) && ctx.options.lenient_syntax => {
                            dict.insert(key, CosObject::Null);
                            lexer.push_token(t);
                            break;
                        }
                        t if !is_value_start(&t) && ctx.options.lenient_syntax => {
                            warn!("Dropping value {t:?} of /{key}");
                            dict.insert(key, CosObject::Null);
                        }
                        t => {
                            let value = Self::parse_from_token(lexer, t, ctx)?;
                            dict.insert(key, value);
                        }
                    }
                }
                Token::Eof => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::syntax(
                            lexer.position(),
                            "unterminated dictionary",
                        ));
                    }
                    warn!("Unterminated dictionary closed at end of input");
                    break;
                }
                t if is_structural_keyword(&t) => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::syntax(
                            lexer.position(),
                            "unterminated dictionary",
                        ));
                    }
                    lexer.push_token(t);
                    break;
                }
                other => {
                    if !ctx.options.lenient_syntax {
                        return Err(ParseError::UnexpectedToken {
                            expected: "name or >>".to_string(),
                            found: format!("{other:?}"),
                        });
                    }
                    warn!("Skipping {other:?} in dictionary key position");
                }
            }
        }

        ctx.exit();
        Ok(dict)
    }

    fn parse_stream_data(
        lexer: &mut Lexer<'_>,
        mut dict: CosDict,
        ctx: &mut ParseContext<'_>,
    ) -> ParseResult<CosStream> {
        // 'stream' must be followed by an EOL; tolerate stray spaces first.
        while matches!(lexer.peek_byte(), Some(b' ' | b'\t')) {
            lexer.read_bytes(1);
        }
        lexer.read_newline();
        let start = lexer.position();

        let declared = match dict.get("Length") {
            Some(CosObject::Integer(len)) => usize::try_from(*len).ok(),
            Some(CosObject::Reference(num, gen)) => {
                ctx.length_resolver.and_then(|resolve| resolve((*num, *gen)))
            }
            _ => None,
        };

        if let Some(length) = declared {
            let data = lexer.read_bytes(length);
            if data.len() == length && Self::at_endstream(lexer) {
                lexer.next_token();
                return Ok(CosStream::new(dict, data.to_vec()));
            }
        }

        if !ctx.options.lenient_streams {
            return Err(match declared {
                None => ParseError::MissingKey("Length".to_string()),
                Some(_) => ParseError::syntax(start, "stream length does not reach endstream"),
            });
        }

        lexer.seek(start);
        let Some(raw) = lexer.read_until_sequence(b"endstream", ctx.options.max_recovery_bytes)
        else {
            return Err(ParseError::syntax(start, "unterminated stream"));
        };
        let data = trim_trailing_eol(raw).to_vec();
        lexer.next_token();

        warn!(
            "Stream at offset {start}: /Length {:?} repaired to {}",
            declared,
            data.len()
        );
        dict.insert("Length", CosObject::Integer(data.len() as i64));
        Ok(CosStream::new(dict, data))
    }

    fn at_endstream(lexer: &mut Lexer<'_>) -> bool {
        lexer.skip_whitespace();
        let rest = &lexer.input()[lexer.position()..];
        rest.starts_with(b"endstream")
    }

    /// Parse an indirect object definition `N G obj ... endobj`
    pub fn parse_indirect(
        lexer: &mut Lexer<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> ParseResult<(ObjectId, CosObject)> {
        let start = lexer.position();
        let num = match lexer.next_token() {
            Token::Integer(n) => u32::try_from(n).map_err(|_| ParseError::syntax(start, "bad object number"))?,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "object number".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        let gen = match lexer.next_token() {
            Token::Integer(g) => u16::try_from(g).map_err(|_| ParseError::syntax(start, "bad generation"))?,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "generation number".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        match lexer.next_token() {
            Token::Obj => {}
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "obj".to_string(),
                    found: format!("{other:?}"),
                })
            }
        }

        let token = lexer.next_token();
        let object = if token == Token::EndObj && ctx.options.lenient_syntax {
            lexer.push_token(token);
            CosObject::Null
        } else {
            Self::parse_from_token(lexer, token, ctx)?
        };

        match lexer.next_token() {
            Token::EndObj => {}
            other => {
                if !ctx.options.lenient_syntax {
                    return Err(ParseError::UnexpectedToken {
                        expected: "endobj".to_string(),
                        found: format!("{other:?}"),
                    });
                }
                warn!("Object {num} {gen}: missing endobj");
                lexer.push_token(other);
            }
        }

        Ok(((num, gen), object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CosObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CosObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CosObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an Integer or Real
    pub fn as_real(&self) -> Option<f64> {
        match self {
            CosObject::Real(r) => Some(*r),
            CosObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Either string kind
    pub fn as_string(&self) -> Option<&CosString> {
        match self {
            CosObject::LiteralString(s) | CosObject::HexString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&CosName> {
        match self {
            CosObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&CosArray> {
        match self {
            CosObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&CosDict> {
        match self {
            CosObject::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&CosStream> {
        match self {
            CosObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            CosObject::Reference(num, gen) => Some((*num, *gen)),
            _ => None,
        }
    }

    /// Kind name, used in log and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CosObject::Null => "null",
            CosObject::Boolean(_) => "boolean",
            CosObject::Integer(_) => "integer",
            CosObject::Real(_) => "real",
            CosObject::Name(_) => "name",
            CosObject::LiteralString(_) => "string",
            CosObject::HexString(_) => "hex string",
            CosObject::Array(_) => "array",
            CosObject::Dictionary(_) => "dictionary",
            CosObject::Stream(_) => "stream",
            CosObject::Reference(..) => "reference",
        }
    }

    /// Serialize in PDF syntax
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            CosObject::Null => out.extend_from_slice(b"null"),
            CosObject::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            CosObject::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            CosObject::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
            CosObject::Name(n) => write_name(n.as_str(), out),
            CosObject::LiteralString(s) => write_literal_string(&s.0, out),
            CosObject::HexString(s) => {
                out.push(b'<');
                for byte in &s.0 {
                    out.extend_from_slice(format!("{byte:02X}").as_bytes());
                }
                out.push(b'>');
            }
            CosObject::Array(arr) => {
                out.push(b'[');
                for (i, obj) in arr.0.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    obj.write_to(out);
                }
                out.push(b']');
            }
            CosObject::Dictionary(dict) => dict.write_to(out),
            CosObject::Stream(stream) => {
                let mut dict = stream.dict.clone();
                dict.insert("Length", CosObject::Integer(stream.data.len() as i64));
                dict.write_to(out);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(&stream.data);
                out.extend_from_slice(b"\nendstream");
            }
            CosObject::Reference(num, gen) => {
                out.extend_from_slice(format!("{num} {gen} R").as_bytes());
            }
        }
    }
}

impl fmt::Display for CosObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Tokens that can only appear between objects, never inside one
fn is_structural_keyword(token: &Token) -> bool {
    matches!(
        token,
        Token::Obj
            | Token::EndObj
            | Token::Stream
            | Token::EndStream
            | Token::XRef
            | Token::Trailer
            | Token::StartXRef
    )
}

fn is_value_start(token: &Token) -> bool {
    matches!(
        token,
        Token::Null
            | Token::Boolean(_)
            | Token::Integer(_)
            | Token::Real(_)
            | Token::String(_)
            | Token::HexString(_)
            | Token::Name(_)
            | Token::ArrayStart
            | Token::DictStart
    )
}

fn trim_trailing_eol(data: &[u8]) -> &[u8] {
    if let Some(rest) = data.strip_suffix(b"\r\n") {
        rest
    } else if let Some(rest) = data.strip_suffix(b"\n") {
        rest
    } else if let Some(rest) = data.strip_suffix(b"\r") {
        rest
    } else {
        data
    }
}

/// Shortest text that reads back as the same Real (never as an Integer)
fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    out.push(b'/');
    for &byte in name.as_bytes() {
        if (0x21..=0x7E).contains(&byte) && byte != b'#' && is_regular(byte) {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    }
}

fn write_literal_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

impl CosName {
    pub fn new(name: impl Into<String>) -> Self {
        CosName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CosName {
    fn from(name: &str) -> Self {
        CosName(name.to_string())
    }
}

impl From<String> for CosName {
    fn from(name: String) -> Self {
        CosName(name)
    }
}

impl CosString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        CosString(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as a PDF text string (UTF-16BE with BOM, else PDFDocEncoding)
    pub fn to_text(&self) -> String {
        crate::common::decode_text_string(&self.0)
    }
}

impl CosArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CosObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, obj: CosObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CosObject> {
        self.0.iter()
    }
}

impl From<Vec<CosObject>> for CosArray {
    fn from(objects: Vec<CosObject>) -> Self {
        CosArray(objects)
    }
}

impl CosDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CosObject> {
        self.0.get(&CosName::from(key))
    }

    /// Insert an entry; an existing value under the same key is replaced
    pub fn insert(&mut self, key: impl Into<CosName>, value: CosObject) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<CosObject> {
        self.0.remove(&CosName::from(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&CosName::from(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CosName, &CosObject)> {
        self.0.iter()
    }

    /// Value of a name entry
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(CosObject::as_name).map(CosName::as_str)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(CosObject::as_integer)
    }

    /// The `/Type` entry
    pub fn get_type(&self) -> Option<&str> {
        self.get_name("Type")
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        out.extend_from_slice(b"<<");
        for (key, value) in entries {
            write_name(key.as_str(), out);
            out.push(b' ');
            value.write_to(out);
        }
        out.extend_from_slice(b">>");
    }
}

impl CosStream {
    pub fn new(dict: CosDict, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            decoded: OnceCell::new(),
        }
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Decode through the filters named in the stream's own dictionary
    ///
    /// The first successful result is cached; later calls are free.
    pub fn decode(&self) -> ParseResult<&[u8]> {
        self.decode_with(&self.dict)
    }

    /// Decode using `dict` in place of the stream dictionary
    ///
    /// Used when `/Filter` or `/DecodeParms` were indirect and had to be
    /// resolved by the document first.
    pub fn decode_with(&self, dict: &CosDict) -> ParseResult<&[u8]> {
        if let Some(data) = self.decoded.get() {
            return Ok(data);
        }
        let data = filters::decode_stream(&self.data, dict)?;
        Ok(self.decoded.get_or_init(|| data))
    }

    /// Decoded bytes, or an empty payload when decoding fails
    pub fn decoded_data(&self) -> &[u8] {
        match self.decode() {
            Ok(data) => data,
            Err(err) => {
                warn!("Stream decode failed, using empty payload: {err}");
                &[]
            }
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }
}

impl PartialEq for CosStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &[u8]) -> CosObject {
        CosObject::from_bytes(input).unwrap()
    }

    fn parse_strict(input: &[u8]) -> ParseResult<CosObject> {
        let options = ParseOptions::strict();
        let mut ctx = ParseContext::new(&options);
        CosObject::parse(&mut Lexer::new(input), &mut ctx)
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse(b"null"), CosObject::Null);
        assert_eq!(parse(b"true"), CosObject::Boolean(true));
        assert_eq!(parse(b"-42"), CosObject::Integer(-42));
        assert_eq!(parse(b"2.5"), CosObject::Real(2.5));
        assert_eq!(parse(b"/Type"), CosObject::Name(CosName::new("Type")));
        assert_eq!(
            parse(b"(text)"),
            CosObject::LiteralString(CosString::new(b"text".to_vec()))
        );
        assert_eq!(
            parse(b"<7465>"),
            CosObject::HexString(CosString::new(b"te".to_vec()))
        );
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse(b"12 0 R"), CosObject::Reference(12, 0));
        let obj = parse(b"[1 0 R 2 3 4 5 0 R]");
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr.get(0), Some(&CosObject::Reference(1, 0)));
        assert_eq!(arr.get(1), Some(&CosObject::Integer(2)));
        assert_eq!(arr.get(2), Some(&CosObject::Integer(3)));
        assert_eq!(arr.get(3), Some(&CosObject::Integer(4)));
        assert_eq!(arr.get(4), Some(&CosObject::Reference(5, 0)));
    }

    #[test]
    fn test_negative_numbers_are_not_references() {
        let obj = parse(b"[-1 0 R]");
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.get(0), Some(&CosObject::Integer(-1)));
        assert_eq!(arr.get(1), Some(&CosObject::Integer(0)));
        // The dangling R is skipped in lenient mode.
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn test_parse_dictionary() {
        let obj = parse(b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Count 3 >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Page"));
        assert_eq!(dict.get("Parent"), Some(&CosObject::Reference(2, 0)));
        assert_eq!(dict.get_integer("Count"), Some(3));
        assert_eq!(dict.get("MediaBox").and_then(|m| m.as_array()).map(|a| a.len()), Some(4));
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        let obj = parse(b"<< /A 1 /B 2 /A 3 >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get_integer("A"), Some(3));
    }

    #[test]
    fn test_parse_stream_with_direct_length() {
        let obj = parse(b"<< /Length 5 >>\nstream\nHello\nendstream");
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"Hello");
        assert_eq!(stream.decode().unwrap(), b"Hello");
        assert!(stream.is_decoded());
    }

    #[test]
    fn test_parse_stream_with_wrong_length_repairs() {
        let obj = parse(b"<< /Length 2 >>\r\nstream\r\nHello World\r\nendstream");
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"Hello World");
        assert_eq!(stream.dict.get_integer("Length"), Some(11));
    }

    #[test]
    fn test_parse_stream_with_indirect_length() {
        let options = ParseOptions::strict();
        let resolver = |id: ObjectId| if id == (9, 0) { Some(4) } else { None };
        let mut ctx = ParseContext::new(&options).with_length_resolver(&resolver);
        let mut lexer = Lexer::new(b"<< /Length 9 0 R >>\nstream\nABCD\nendstream");
        let obj = CosObject::parse(&mut lexer, &mut ctx).unwrap();
        assert_eq!(obj.as_stream().unwrap().raw_data(), b"ABCD");
    }

    #[test]
    fn test_strict_stream_without_length_fails() {
        let result = parse_strict(b"<< >>\nstream\nABCD\nendstream");
        assert!(matches!(result, Err(ParseError::MissingKey(_))));
    }

    #[test]
    fn test_unterminated_array_lenient_and_strict() {
        assert_eq!(
            parse(b"[1 2 3"),
            CosObject::Array(CosArray(vec![
                CosObject::Integer(1),
                CosObject::Integer(2),
                CosObject::Integer(3)
            ]))
        );
        assert!(parse_strict(b"[1 2 3").is_err());
    }

    #[test]
    fn test_mismatched_closer_scans_forward() {
        let obj = parse(b"[1 >> 2]");
        assert_eq!(obj.as_array().unwrap().len(), 2);

        let obj = parse(b"<< /A 1 ] /B 2 >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_integer("A"), Some(1));
        assert_eq!(dict.get_integer("B"), Some(2));
    }

    #[test]
    fn test_dictionary_missing_close_before_stream() {
        let obj = parse(b"<< /Length 3 stream\nabc\nendstream");
        assert_eq!(obj.as_stream().unwrap().raw_data(), b"abc");
    }

    #[test]
    fn test_dictionary_missing_value() {
        let obj = parse(b"<< /A 1 /B >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("B"), Some(&CosObject::Null));
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = vec![b'['; 300];
        input.extend(vec![b']'; 300]);
        assert!(matches!(
            CosObject::from_bytes(&input),
            Err(ParseError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_parse_indirect_object() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options);
        let mut lexer = Lexer::new(b"7 0 obj\n<< /Type /Catalog >>\nendobj\n8 0 obj 42 endobj");
        let (id, obj) = CosObject::parse_indirect(&mut lexer, &mut ctx).unwrap();
        assert_eq!(id, (7, 0));
        assert_eq!(obj.as_dict().unwrap().get_type(), Some("Catalog"));
        let (id, obj) = CosObject::parse_indirect(&mut lexer, &mut ctx).unwrap();
        assert_eq!(id, (8, 0));
        assert_eq!(obj, CosObject::Integer(42));
    }

    #[test]
    fn test_parse_indirect_tolerates_missing_endobj() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options);
        let mut lexer = Lexer::new(b"1 0 obj (x)\n2 0 obj null endobj");
        let (id, obj) = CosObject::parse_indirect(&mut lexer, &mut ctx).unwrap();
        assert_eq!(id, (1, 0));
        assert_eq!(obj, CosObject::LiteralString(CosString::new(b"x".to_vec())));
        let (id, _) = CosObject::parse_indirect(&mut lexer, &mut ctx).unwrap();
        assert_eq!(id, (2, 0));
    }

    #[test]
    fn test_parse_indirect_empty_body() {
        let options = ParseOptions::default();
        let mut ctx = ParseContext::new(&options);
        let mut lexer = Lexer::new(b"3 0 obj endobj");
        let (_, obj) = CosObject::parse_indirect(&mut lexer, &mut ctx).unwrap();
        assert!(obj.is_null());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut dict = CosDict::new();
        dict.insert("Name", CosObject::Name(CosName::new("A B#")));
        dict.insert("Str", CosObject::LiteralString(CosString::new(b"a(b)\\c\rd".to_vec())));
        dict.insert("Hex", CosObject::HexString(CosString::new(vec![0, 255, 16])));
        dict.insert("Real", CosObject::Real(3.0));
        dict.insert("Small", CosObject::Real(1e-7));
        dict.insert("Ref", CosObject::Reference(4, 2));
        dict.insert(
            "Arr",
            CosObject::Array(CosArray(vec![
                CosObject::Integer(5),
                CosObject::Integer(0),
                CosObject::Null,
                CosObject::Boolean(false),
            ])),
        );
        let original = CosObject::Dictionary(dict);
        let bytes = original.to_bytes();
        assert_eq!(CosObject::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn test_serialize_stream_round_trip() {
        let mut dict = CosDict::new();
        dict.insert("Type", CosObject::Name(CosName::new("XObject")));
        let stream = CosObject::Stream(CosStream::new(dict, b"endstream? no".to_vec()));
        let parsed = CosObject::from_bytes(&stream.to_bytes()).unwrap();
        let parsed = parsed.as_stream().unwrap();
        assert_eq!(parsed.raw_data(), b"endstream? no");
        assert_eq!(parsed.dict.get_integer("Length"), Some(13));
    }

    #[test]
    fn test_display() {
        assert_eq!(CosObject::Reference(3, 0).to_string(), "3 0 R");
        assert_eq!(CosObject::Real(2.0).to_string(), "2.0");
        assert_eq!(
            CosObject::Array(CosArray(vec![CosObject::Integer(1), CosObject::Null])).to_string(),
            "[1 null]"
        );
    }

    #[test]
    fn test_accessors() {
        let obj = CosObject::Integer(7);
        assert_eq!(obj.as_integer(), Some(7));
        assert_eq!(obj.as_real(), Some(7.0));
        assert!(obj.as_name().is_none());
        assert_eq!(obj.type_name(), "integer");
        assert_eq!(CosObject::Reference(1, 2).as_reference(), Some((1, 2)));
        let hex = CosObject::HexString(CosString::new(b"x".to_vec()));
        assert_eq!(hex.as_string().map(CosString::as_bytes), Some(&b"x"[..]));
    }
}
