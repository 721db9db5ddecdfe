//! Cursor over an immutable text buffer with line/offset tracking.
//!
//! Every delimiter the primitives stop at is ASCII, so the slices they hand
//! out always fall on UTF-8 boundaries.

use crate::error::ParseError;

/// Horizontal whitespace. A newline is never blank.
pub fn is_blank(c: u8) -> bool {
    c.is_ascii_whitespace() && c != b'\n'
}

fn is_identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_numeric_char(c: u8) -> bool {
    c.is_ascii_digit() || matches!(c, b'+' | b'-' | b'.' | b'E' | b'e')
}

/// Validate raw file content before handing it to a parser.
///
/// Rejects empty content, UTF-16/UTF-32 byte order marks, invalid UTF-8
/// and Windows line endings.
pub fn decode(bytes: &[u8]) -> Result<&str, ParseError> {
    match bytes.first().copied() {
        None => return Err(ParseError::new("Empty file", 1, 0)),
        Some(0xFF | 0xFE | 0x00) => return Err(ParseError::new("Bad encoding, not UTF-8", 1, 0)),
        Some(_) => {}
    }
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let offset = e.valid_up_to();
        let line = 1 + bytes[..offset].iter().filter(|&&c| c == b'\n').count();
        ParseError::new("Bad encoding, not UTF-8", line, offset)
    })?;
    if let Some(offset) = text.find("\r\n") {
        let line = 1 + text[..offset].matches('\n').count();
        return Err(ParseError::new("Windows line endings not supported", line, offset));
    }
    Ok(text)
}

pub struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Result<Self, ParseError> {
        if text.is_empty() {
            return Err(ParseError::new("Empty file", 1, 0));
        }
        Ok(Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
        })
    }

    // -- Position -------------------------------------------------------------

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn is_at(&self, c: u8) -> bool {
        self.peek() == Some(c)
    }

    pub fn is_line_end(&self) -> bool {
        self.is_at(b'\n')
    }

    /// Text from the cursor to the end of the current line, not consumed.
    pub fn rest_of_line(&self) -> &'a str {
        let end = self.bytes[self.pos..]
            .iter()
            .position(|&c| c == b'\n')
            .map_or(self.bytes.len(), |n| self.pos + n);
        &self.text[self.pos..end]
    }

    /// Text between `start` and the cursor.
    pub fn slice_from(&self, start: usize) -> &'a str {
        &self.text[start.min(self.pos)..self.pos]
    }

    /// Error located at the cursor.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.pos.min(self.bytes.len()))
    }

    // -- Skipping -------------------------------------------------------------

    pub fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    pub fn eat_line_end(&mut self) -> bool {
        if self.is_line_end() {
            self.pos += 1;
            self.line += 1;
            true
        } else {
            false
        }
    }

    /// Consume the rest of the line including its newline, returning the
    /// content before it.
    pub fn skip_line(&mut self) -> &'a str {
        let content = self.rest_of_line();
        self.pos += content.len();
        self.eat_line_end();
        content
    }

    /// Skip any run of blanks and newlines.
    pub fn skip_empty_lines(&mut self) {
        loop {
            self.skip_blanks();
            if !self.eat_line_end() {
                break;
            }
        }
    }

    /// Skip past the next `close`, tracking newlines. False if the buffer
    /// ends first.
    pub fn skip_past(&mut self, close: &str) -> bool {
        while !self.at_end() {
            if self.eat(close) {
                return true;
            }
            if !self.eat_line_end() {
                self.pos += 1;
            }
        }
        false
    }

    // -- Matching -------------------------------------------------------------

    pub fn eat(&mut self, s: &str) -> bool {
        if self.bytes[self.pos..].starts_with(s.as_bytes()) {
            self.advance(s.len());
            true
        } else {
            false
        }
    }

    pub fn eat_char(&mut self, c: u8) -> bool {
        if self.is_at(c) {
            self.advance(1);
            true
        } else {
            false
        }
    }

    /// Whether `kw` is next and not immediately followed by an identifier
    /// character (so `END_IF` does not match inside `END_IFOO`).
    pub fn peek_keyword(&self, kw: &str) -> bool {
        self.bytes[self.pos..].starts_with(kw.as_bytes())
            && !self
                .bytes
                .get(self.pos + kw.len())
                .copied()
                .is_some_and(is_identifier_char)
    }

    pub fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.advance(kw.len());
            true
        } else {
            false
        }
    }

    // -- Collecting -----------------------------------------------------------

    fn collect_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    /// Run of alphanumerics and underscores.
    pub fn collect_identifier(&mut self) -> &'a str {
        self.collect_while(is_identifier_char)
    }

    /// Run up to the next whitespace.
    pub fn collect_token(&mut self) -> &'a str {
        self.collect_while(|c| !c.is_ascii_whitespace())
    }

    pub fn collect_digits(&mut self) -> &'a str {
        self.collect_while(|c| c.is_ascii_digit())
    }

    /// Digits, signs, dots and exponent markers.
    pub fn collect_numeric_literal(&mut self) -> &'a str {
        self.collect_while(is_numeric_char)
    }

    /// Collect up to (not including) `c`, trimming trailing blanks.
    ///
    /// `c` itself is left for the caller. Reaching the end of the buffer is
    /// an error located where the region started.
    pub fn collect_until_char_trimmed(&mut self, c: u8) -> Result<&'a str, ParseError> {
        let (start, start_line) = (self.pos, self.line);
        let mut end = start;
        while let Some(ch) = self.peek() {
            if ch == c {
                return Ok(&self.text[start..end]);
            }
            if ch == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
            if !is_blank(ch) {
                end = self.pos;
            }
        }
        Err(ParseError::new(
            format!("Unclosed content ('{}' expected)", c as char),
            start_line,
            start,
        ))
    }

    /// Collect every line up to one that begins, after leading blanks, with
    /// the keyword `kw`. The keyword is consumed; the returned text ends
    /// with the newline that precedes its line.
    pub fn collect_until_newline_then_keyword(&mut self, kw: &str) -> Result<&'a str, ParseError> {
        let (start, start_line) = (self.pos, self.line);
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                self.eat_line_end();
                let line_start = self.pos;
                self.skip_blanks();
                if self.eat_keyword(kw) {
                    return Ok(&self.text[start..line_start]);
                }
            } else {
                self.pos += 1;
            }
        }
        Err(ParseError::new(
            format!("Unclosed content (\"{kw}\" expected)"),
            start_line,
            start,
        ))
    }

    /// Non-negative decimal index, after optional blanks.
    pub fn extract_index(&mut self) -> Result<usize, ParseError> {
        self.skip_blanks();
        match self.peek() {
            Some(b'+') => return Err(self.error("Invalid index '+'")),
            Some(b'-') => return Err(self.error("Negative index")),
            _ => {}
        }
        let digits = self.collect_digits();
        if digits.is_empty() {
            return Err(match self.peek() {
                Some(c) if !c.is_ascii_whitespace() => {
                    self.error(format!("Invalid char '{}' in index", c as char))
                }
                _ => self.error("Index not found"),
            });
        }
        digits
            .parse()
            .map_err(|_| self.error(format!("Index {digits} out of range")))
    }

    /// Optionally signed decimal integer, after optional blanks.
    pub fn extract_integer(&mut self) -> Result<i64, ParseError> {
        self.skip_blanks();
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        if self.collect_digits().is_empty() {
            self.pos = start;
            return Err(self.error("Integer not found"));
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse()
            .map_err(|_| self.error(format!("Integer {literal} out of range")))
    }

    /// Advance over bytes known not to contain a newline.
    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.bytes.len());
    }
}
