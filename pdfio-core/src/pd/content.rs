//! Content stream tokenizer
//!
//! Splits decoded content bytes (ISO 32000-1 Section 7.8.2) into operators
//! with their operands. Operands are read with the COS object parser; arity is
//! not checked. Inline images (`BI ... ID ... EI`) come out as one item with
//! their raw data.

use crate::cos::lexer::is_whitespace;
use crate::cos::{CosDict, CosObject, Lexer, ParseContext, ParseOptions, Token};
use tracing::{debug, warn};

/// An operator and the operands that preceded it
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    pub operator: String,
    pub operands: Vec<CosObject>,
}

impl PageElement {
    pub fn new(operator: impl Into<String>, operands: Vec<CosObject>) -> Self {
        PageElement {
            operator: operator.into(),
            operands,
        }
    }
}

/// Inline image: its parameters and undecoded sample data
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub params: CosDict,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Parameter by full or abbreviated key (`Width` or `W`)
    pub fn param(&self, key: &str, abbreviation: &str) -> Option<&CosObject> {
        self.params.get(key).or_else(|| self.params.get(abbreviation))
    }

    pub fn width(&self) -> Option<i64> {
        self.param("Width", "W").and_then(CosObject::as_integer)
    }

    pub fn height(&self) -> Option<i64> {
        self.param("Height", "H").and_then(CosObject::as_integer)
    }
}

/// One item of a content stream
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Element(PageElement),
    InlineImage(InlineImage),
}

/// Pull tokenizer over decoded content bytes
pub struct ContentTokenizer<'a> {
    lexer: Lexer<'a>,
    options: ParseOptions,
}

impl<'a> ContentTokenizer<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        ContentTokenizer {
            lexer: Lexer::new(content),
            options: ParseOptions::lenient(),
        }
    }

    fn read_operand(&mut self, token: Token) -> Option<CosObject> {
        let mut ctx = ParseContext::new(&self.options);
        match CosObject::parse_from_token(&mut self.lexer, token, &mut ctx) {
            Ok(obj) => Some(obj),
            Err(err) => {
                warn!("Skipping unreadable content operand: {err}");
                None
            }
        }
    }

    /// Read the `BI` parameter pairs and the data after `ID`
    fn read_inline_image(&mut self) -> InlineImage {
        let mut params = CosDict::new();
        loop {
            match self.lexer.next_token() {
                Token::Keyword(k) if k == "ID" => break,
                Token::Eof => {
                    warn!("Inline image without ID");
                    return InlineImage {
                        params,
                        data: Vec::new(),
                    };
                }
                Token::Name(key) => {
                    let value = self.lexer.next_token();
                    if value.is_keyword("ID") {
                        self.lexer.push_token(value);
                        continue;
                    }
                    let value = self.read_operand(value).unwrap_or(CosObject::Null);
                    params.insert(key, value);
                }
                other => debug!("Skipping {other:?} in inline image parameters"),
            }
        }

        // A single whitespace byte separates ID from the data.
        if self.lexer.peek_byte().is_some_and(is_whitespace) {
            self.lexer.read_bytes(1);
        }

        let declared = params
            .get("L")
            .or_else(|| params.get("Length"))
            .and_then(CosObject::as_integer)
            .and_then(|len| usize::try_from(len).ok());
        let data = declared
            .and_then(|len| self.read_declared_data(len))
            .unwrap_or_else(|| self.scan_to_end_marker());

        InlineImage { params, data }
    }

    /// Data of a declared length, if `EI` really follows it
    fn read_declared_data(&mut self, length: usize) -> Option<Vec<u8>> {
        let start = self.lexer.position();
        let data = self.lexer.read_bytes(length);
        if data.len() == length && self.lexer.next_token().is_keyword("EI") {
            return Some(data.to_vec());
        }
        debug!("Inline image length {length} does not reach EI, scanning");
        self.lexer.seek(start);
        None
    }

    /// Data up to the next `EI` with whitespace before it and whitespace or
    /// end of input after it
    fn scan_to_end_marker(&mut self) -> Vec<u8> {
        let input = self.lexer.input();
        let start = self.lexer.position();

        let marker = (start..input.len().saturating_sub(1)).find(|&i| {
            &input[i..i + 2] == b"EI"
                && i > 0
                && is_whitespace(input[i - 1])
                && input.get(i + 2).map_or(true, |&b| is_whitespace(b))
        });

        match marker {
            Some(i) => {
                let end = if i > start { i - 1 } else { i };
                self.lexer.seek(i + 2);
                input[start..end].to_vec()
            }
            None => {
                warn!("Inline image at {start} has no EI, taking the rest of the stream");
                self.lexer.seek(input.len());
                input[start..].to_vec()
            }
        }
    }
}

fn structural_operator(token: &Token) -> Option<&'static str> {
    match token {
        Token::Obj => Some("obj"),
        Token::EndObj => Some("endobj"),
        Token::Stream => Some("stream"),
        Token::EndStream => Some("endstream"),
        Token::XRef => Some("xref"),
        Token::Trailer => Some("trailer"),
        Token::StartXRef => Some("startxref"),
        _ => None,
    }
}

impl<'a> Iterator for ContentTokenizer<'a> {
    type Item = ContentItem;

    fn next(&mut self) -> Option<ContentItem> {
        let mut operands = Vec::new();
        loop {
            let token = self.lexer.next_token();
            match token {
                Token::Eof => {
                    if !operands.is_empty() {
                        debug!("Dropping {} operands without operator", operands.len());
                    }
                    return None;
                }
                Token::Keyword(op) if op == "BI" => {
                    if !operands.is_empty() {
                        debug!("Dropping {} operands before BI", operands.len());
                    }
                    return Some(ContentItem::InlineImage(self.read_inline_image()));
                }
                Token::Keyword(op) if op == ")" || op == ">" => {
                    warn!("Skipping stray '{op}' in content stream");
                }
                Token::Keyword(op) => {
                    return Some(ContentItem::Element(PageElement::new(op, operands)));
                }
                Token::ArrayEnd | Token::DictEnd | Token::BraceStart | Token::BraceEnd => {
                    warn!("Skipping stray {token:?} in content stream");
                }
                t => {
                    if let Some(op) = structural_operator(&t) {
                        return Some(ContentItem::Element(PageElement::new(op, operands)));
                    }
                    if let Some(operand) = self.read_operand(t) {
                        operands.push(operand);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cos::CosName;

    fn elements(content: &[u8]) -> Vec<PageElement> {
        ContentTokenizer::new(content)
            .filter_map(|item| match item {
                ContentItem::Element(e) => Some(e),
                ContentItem::InlineImage(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_operators_and_operands() {
        let ops = elements(b"BT /F1 12 Tf 100 200 Td (Hello World) Tj ET");
        let names: Vec<_> = ops.iter().map(|e| e.operator.as_str()).collect();
        assert_eq!(names, vec!["BT", "Tf", "Td", "Tj", "ET"]);
        assert_eq!(
            ops[1].operands,
            vec![CosObject::Name(CosName::new("F1")), CosObject::Integer(12)]
        );
        assert_eq!(
            ops[2].operands,
            vec![CosObject::Integer(100), CosObject::Integer(200)]
        );
        assert!(ops[4].operands.is_empty());
    }

    #[test]
    fn test_quote_operators_and_arrays() {
        let ops = elements(b"[(A) -120 (B)] TJ (x) ' 1 2 (y) \" T*");
        assert_eq!(ops[0].operator, "TJ");
        assert_eq!(ops[0].operands[0].as_array().map(|a| a.len()), Some(3));
        assert_eq!(ops[1].operator, "'");
        assert_eq!(ops[2].operator, "\"");
        assert_eq!(ops[2].operands.len(), 3);
        assert_eq!(ops[3].operator, "T*");
    }

    #[test]
    fn test_marked_content_dict_operand() {
        let ops = elements(b"/Span << /MCID 3 /ActualText (fi) >> BDC EMC");
        assert_eq!(ops[0].operator, "BDC");
        let props = ops[0].operands[1].as_dict().unwrap();
        assert_eq!(props.get_integer("MCID"), Some(3));
        assert_eq!(ops[1].operator, "EMC");
    }

    #[test]
    fn test_comments_and_stray_closers() {
        let ops = elements(b"% header\nq ] 1 0 0 1 0 0 cm ) Q");
        let names: Vec<_> = ops.iter().map(|e| e.operator.as_str()).collect();
        assert_eq!(names, vec!["q", "cm", "Q"]);
        assert_eq!(ops[1].operands.len(), 6);
    }

    #[test]
    fn test_trailing_operands_dropped() {
        let ops = elements(b"0 g 1 2");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operator, "g");
    }

    #[test]
    fn test_inline_image_scanned() {
        let content = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \x01EI\xff EI Q";
        let items: Vec<_> = ContentTokenizer::new(content).collect();
        assert_eq!(items.len(), 3);
        match &items[1] {
            ContentItem::InlineImage(image) => {
                assert_eq!(image.width(), Some(2));
                assert_eq!(image.height(), Some(1));
                // "EI" inside the data has no whitespace around it
                assert_eq!(image.data, b"\x01EI\xff".to_vec());
            }
            other => panic!("expected inline image, got {other:?}"),
        }
        assert!(matches!(&items[2], ContentItem::Element(e) if e.operator == "Q"));
    }

    #[test]
    fn test_inline_image_declared_length() {
        let content = b"BI /W 1 /H 1 /L 4 ID a EI EI Q";
        let items: Vec<_> = ContentTokenizer::new(content).collect();
        match &items[0] {
            ContentItem::InlineImage(image) => assert_eq!(image.data, b"a EI".to_vec()),
            other => panic!("expected inline image, got {other:?}"),
        }
        assert!(matches!(&items[1], ContentItem::Element(e) if e.operator == "Q"));
    }

    #[test]
    fn test_inline_image_wrong_length_falls_back_to_scan() {
        let content = b"BI /W 1 /L 50 ID abc EI Q";
        let items: Vec<_> = ContentTokenizer::new(content).collect();
        match &items[0] {
            ContentItem::InlineImage(image) => assert_eq!(image.data, b"abc".to_vec()),
            other => panic!("expected inline image, got {other:?}"),
        }
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_inline_image_without_end_marker() {
        let content = b"BI /W 1 ID xyz";
        let items: Vec<_> = ContentTokenizer::new(content).collect();
        assert_eq!(items.len(), 1);
        match &items[0] {
            ContentItem::InlineImage(image) => assert_eq!(image.data, b"xyz".to_vec()),
            other => panic!("expected inline image, got {other:?}"),
        }
    }
}
