//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer never
//! fails: malformed input degrades into the closest sensible token, and the
//! object parser decides what to do with it.

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string `( ... )`, escapes resolved
    String(Vec<u8>),

    /// Hexadecimal string `< ... >`, decoded
    HexString(Vec<u8>),

    /// Name object (e.g., /Type), `#xx` escapes resolved
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Left brace { (PostScript calculator functions)
    BraceStart,

    /// Right brace }
    BraceEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// Null object
    Null,

    /// xref keyword
    XRef,

    /// trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Any other run of regular characters: `R`, `n`, `f`, content operators
    Keyword(String),

    /// End of input
    Eof,
}

impl Token {
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Token::Keyword(k) if k == word)
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// PDF Lexer over an in-memory byte slice
///
/// The lexer owns only its position and a push-back buffer, so any number of
/// lexers can read the same document concurrently at different offsets.
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    token_buffer: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            token_buffer: Vec::new(),
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.token_buffer.pop() {
            return token;
        }

        self.skip_whitespace();

        let Some(ch) = self.peek_byte() else {
            return Token::Eof;
        };

        match ch {
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.position += 1;
                if self.peek_byte() == Some(b'>') {
                    self.position += 1;
                    Token::DictEnd
                } else {
                    Token::Keyword(">".to_string())
                }
            }
            b'[' => {
                self.position += 1;
                Token::ArrayStart
            }
            b']' => {
                self.position += 1;
                Token::ArrayEnd
            }
            b'{' => {
                self.position += 1;
                Token::BraceStart
            }
            b'}' => {
                self.position += 1;
                Token::BraceEnd
            }
            b')' => {
                self.position += 1;
                Token::Keyword(")".to_string())
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ => self.read_keyword(),
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> &Token {
        if self.token_buffer.is_empty() {
            let token = self.next_token();
            self.token_buffer.push(token);
        }
        // The buffer was filled just above.
        &self.token_buffer[self.token_buffer.len() - 1]
    }

    /// Push a token back; tokens come back out in LIFO order
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute offset, dropping any pushed-back tokens
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.input.len());
        self.token_buffer.clear();
    }

    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    pub fn is_eof(&self) -> bool {
        self.token_buffer.is_empty() && self.position >= self.input.len()
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) {
                self.position += 1;
            } else if ch == b'%' {
                self.skip_comment();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_byte() {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.position += 1;
        }
    }

    /// Consume one end-of-line marker (CRLF, LF or CR) if present
    pub fn read_newline(&mut self) {
        match self.peek_byte() {
            Some(b'\r') => {
                self.position += 1;
                if self.peek_byte() == Some(b'\n') {
                    self.position += 1;
                }
            }
            Some(b'\n') => self.position += 1,
            _ => {}
        }
    }

    /// Read up to `n` raw bytes; fewer are returned at end of input
    pub fn read_bytes(&mut self, n: usize) -> &'a [u8] {
        let start = self.position;
        let end = start.saturating_add(n).min(self.input.len());
        self.position = end;
        &self.input[start..end]
    }

    /// Read raw bytes up to (not including) `sequence`, leaving the lexer at
    /// its start. Returns `None` and does not move when it is absent.
    pub fn read_until_sequence(&mut self, sequence: &[u8], limit: usize) -> Option<&'a [u8]> {
        let start = self.position;
        let end = start.saturating_add(limit).min(self.input.len());
        let window = &self.input[start..end];
        let found = super::source::find(window, sequence)?;
        self.position = start + found;
        Some(&window[..found])
    }

    fn read_name(&mut self) -> Token {
        self.position += 1; // '/'
        let mut bytes = Vec::new();

        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;
            if ch == b'#' {
                let hi = self.input.get(self.position).and_then(|b| hex_value(*b));
                let lo = self.input.get(self.position + 1).and_then(|b| hex_value(*b));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    bytes.push(hi << 4 | lo);
                    self.position += 2;
                    continue;
                }
            }
            bytes.push(ch);
        }

        Token::Name(bytes_to_name(bytes))
    }

    fn read_literal_string(&mut self) -> Token {
        self.position += 1; // '('
        let mut string = Vec::new();
        let mut depth = 1usize;

        while let Some(ch) = self.peek_byte() {
            self.position += 1;
            match ch {
                b'\\' => self.read_escape(&mut string),
                b'(' => {
                    depth += 1;
                    string.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Token::String(string);
                    }
                    string.push(ch);
                }
                b'\r' => {
                    if self.peek_byte() == Some(b'\n') {
                        self.position += 1;
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        // Unterminated: keep what was read.
        Token::String(string)
    }

    fn read_escape(&mut self, string: &mut Vec<u8>) {
        let Some(ch) = self.peek_byte() else {
            return;
        };
        self.position += 1;
        match ch {
            b'n' => string.push(b'\n'),
            b'r' => string.push(b'\r'),
            b't' => string.push(b'\t'),
            b'b' => string.push(b'\x08'),
            b'f' => string.push(b'\x0C'),
            b'0'..=b'7' => {
                let mut value = u16::from(ch - b'0');
                for _ in 0..2 {
                    match self.peek_byte() {
                        Some(next @ b'0'..=b'7') => {
                            self.position += 1;
                            value = value * 8 + u16::from(next - b'0');
                        }
                        _ => break,
                    }
                }
                string.push((value & 0xFF) as u8);
            }
            // Line continuation
            b'\r' => {
                if self.peek_byte() == Some(b'\n') {
                    self.position += 1;
                }
            }
            b'\n' => {}
            // \( \) \\ and unknown escapes yield the character itself
            _ => string.push(ch),
        }
    }

    fn read_angle_bracket(&mut self) -> Token {
        self.position += 1; // '<'
        if self.peek_byte() == Some(b'<') {
            self.position += 1;
            return Token::DictStart;
        }

        let mut bytes = Vec::new();
        let mut high: Option<u8> = None;
        while let Some(ch) = self.peek_byte() {
            self.position += 1;
            if ch == b'>' {
                break;
            }
            let Some(value) = hex_value(ch) else {
                // Whitespace is allowed, anything else is ignored.
                continue;
            };
            match high.take() {
                Some(hi) => bytes.push(hi << 4 | value),
                None => high = Some(value),
            }
        }
        if let Some(hi) = high {
            bytes.push(hi << 4);
        }

        Token::HexString(bytes)
    }

    fn read_number(&mut self) -> Token {
        let text = self.read_regular_run();
        parse_loose_number(&text).unwrap_or(Token::Name(text))
    }

    fn read_keyword(&mut self) -> Token {
        let word = self.read_regular_run();
        if word.is_empty() {
            // A lone delimiter nothing else claims; step over it.
            let ch = self.peek_byte().unwrap_or(b' ');
            self.position += 1;
            return Token::Keyword(char::from(ch).to_string());
        }

        match word.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            "obj" => Token::Obj,
            "endobj" => Token::EndObj,
            "stream" => Token::Stream,
            "endstream" => Token::EndStream,
            "xref" => Token::XRef,
            "trailer" => Token::Trailer,
            "startxref" => Token::StartXRef,
            _ => Token::Keyword(word),
        }
    }

    fn read_regular_run(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.peek_byte() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;
        }
        bytes_to_name(self.input[start..self.position].to_vec())
    }
}

/// Interpret a run of regular characters as a number.
///
/// Accepts what real-world writers produce: repeated leading signs, a bare
/// leading or trailing `.`, and exponents. Returns `None` for anything else.
fn parse_loose_number(text: &str) -> Option<Token> {
    let digits_start = text.find(|c| c != '+' && c != '-')?;
    let (signs, body) = text.split_at(digits_start);
    let negative = signs.contains('-');

    if body.is_empty() || body == "." {
        return None;
    }
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    if !body.as_bytes()[0].is_ascii_digit() && body.as_bytes()[0] != b'.' {
        return None;
    }

    let is_real = body.contains(['.', 'e', 'E']);
    if !is_real {
        if let Ok(value) = body.parse::<i64>() {
            return Some(Token::Integer(if negative { -value } else { value }));
        }
    }

    let value = body.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(Token::Real(if negative { -value } else { value }))
}

pub(crate) fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Names are byte sequences; UTF-8 is kept, anything else maps byte-per-char.
pub(crate) fn bytes_to_name(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(name) => name,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}
