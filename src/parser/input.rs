//! Low-level input handling for the XML parser.
//!
//! [`ParserInput`] is a cursor over a UTF-8 buffer whose line endings have
//! already been normalized. It tracks the position (line, codepoint column,
//! byte offset), classifies the markup at the cursor, and provides the
//! lexical primitives shared by the content and DTD parsers: names,
//! character references, quoted literals and whitespace.
//!
//! Self-contained constructs (comments, CDATA sections, processing
//! instructions and the XML declaration) are scanned by the free functions
//! at the bottom of this module.

use std::borrow::Cow;

use crate::error::{ErrorKind, ParseError, SourceLocation};
use crate::util::chars::{is_name_char, is_name_start_char, is_pubid_char, is_xml_char};

/// The XML namespace URI, pre-bound to the `xml` prefix.
pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace URI of `xmlns` declarations.
pub(crate) const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Highest line number reported without `BigLines`.
const MAX_SMALL_LINE: u32 = 65_535;

/// Converts `\r\n` and lone `\r` to `\n` (XML 1.0 §2.11).
///
/// Borrows the input unchanged when it contains no carriage return.
pub(crate) fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

// -------------------------------------------------------------------------
// Markup classification
// -------------------------------------------------------------------------

/// The lexical unit starting at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkupKind {
    /// `<!--`
    Comment,
    /// `<![CDATA[`
    CData,
    /// `<?`
    ProcessingInstruction,
    /// `<!DOCTYPE`
    DocType,
    /// `<!ENTITY`
    EntityDecl,
    /// `<!ELEMENT`
    ElementDecl,
    /// `<!ATTLIST`
    AttlistDecl,
    /// `<!NOTATION`
    NotationDecl,
    /// Any other `<!`.
    UnknownDecl,
    /// `</`
    EndTag,
    /// `<` followed by anything else.
    StartTag,
    /// `&#`
    CharRef,
    /// `&` followed by anything else.
    EntityRef,
    /// Character data.
    Text,
    /// End of input.
    Eof,
}

// -------------------------------------------------------------------------
// Position checkpointing
// -------------------------------------------------------------------------

/// A snapshot of the input position, restored with
/// [`ParserInput::restore_position`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedPosition {
    pos: usize,
    line: u32,
    column: u32,
}

// -------------------------------------------------------------------------
// ParserInput
// -------------------------------------------------------------------------

/// Cursor over normalized XML text.
pub(crate) struct ParserInput<'a> {
    /// The input text.
    text: &'a str,

    /// Current byte offset in `text`.
    pos: usize,

    /// Current line number (1-based).
    line: u32,

    /// Current column number (1-based, in codepoints).
    column: u32,

    /// Maximum allowed name length in bytes.
    max_name_length: usize,

    /// Highest line number reported in locations.
    max_line: u32,

    /// Location reported for everything read from this input. Set for
    /// entity replacement text, which has no position of its own.
    origin: Option<SourceLocation>,
}

impl<'a> ParserInput<'a> {
    /// Creates a cursor at the start of `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
            column: 1,
            max_name_length: crate::parser::options::DEFAULT_MAX_NAME_LENGTH,
            max_line: MAX_SMALL_LINE,
            origin: None,
        }
    }

    /// Sets the maximum name length.
    pub fn set_max_name_length(&mut self, max: usize) {
        self.max_name_length = max;
    }

    /// Reports line numbers above 65535 instead of clamping them.
    pub fn set_big_lines(&mut self, big: bool) {
        self.max_line = if big { u32::MAX } else { MAX_SMALL_LINE };
    }

    /// Reports every location as `origin`.
    pub fn set_origin(&mut self, origin: SourceLocation) {
        self.origin = Some(origin);
    }

    // -- Position queries --

    /// Returns the current source location.
    pub fn location(&self) -> SourceLocation {
        if let Some(origin) = self.origin {
            return origin;
        }
        SourceLocation {
            line: self.line.min(self.max_line),
            column: self.column,
            byte_offset: self.pos,
        }
    }

    /// Returns `true` if all input has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Returns the current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns the text between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        self.text.get(start..end).unwrap_or("")
    }

    /// Returns the unconsumed input.
    pub fn rest(&self) -> &'a str {
        self.text.get(self.pos..).unwrap_or("")
    }

    pub fn save_position(&self) -> SavedPosition {
        SavedPosition {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore_position(&mut self, saved: SavedPosition) {
        self.pos = saved.pos;
        self.line = saved.line;
        self.column = saved.column;
    }

    // -- Peek operations --

    /// Returns the byte at the current position without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    /// Returns the byte at `current_position + offset` without consuming.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + offset).copied()
    }

    /// Returns the character at the current position without consuming it.
    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Returns `true` if the remaining input starts with `s`.
    pub fn looking_at(&self, s: &[u8]) -> bool {
        self.rest().as_bytes().starts_with(s)
    }

    /// Classifies the markup at the cursor.
    pub fn classify(&self) -> MarkupKind {
        let rest = self.rest().as_bytes();
        match rest {
            [] => MarkupKind::Eof,
            [b'<', b'!', b'-', b'-', ..] => MarkupKind::Comment,
            [b'<', b'!', b'[', b'C', b'D', b'A', b'T', b'A', b'[', ..] => MarkupKind::CData,
            [b'<', b'!', ..] => {
                let decl = &rest[2..];
                if decl.starts_with(b"DOCTYPE") {
                    MarkupKind::DocType
                } else if decl.starts_with(b"ENTITY") {
                    MarkupKind::EntityDecl
                } else if decl.starts_with(b"ELEMENT") {
                    MarkupKind::ElementDecl
                } else if decl.starts_with(b"ATTLIST") {
                    MarkupKind::AttlistDecl
                } else if decl.starts_with(b"NOTATION") {
                    MarkupKind::NotationDecl
                } else {
                    MarkupKind::UnknownDecl
                }
            }
            [b'<', b'?', ..] => MarkupKind::ProcessingInstruction,
            [b'<', b'/', ..] => MarkupKind::EndTag,
            [b'<', ..] => MarkupKind::StartTag,
            [b'&', b'#', ..] => MarkupKind::CharRef,
            [b'&', ..] => MarkupKind::EntityRef,
            _ => MarkupKind::Text,
        }
    }

    // -- Advance operations --

    /// Advances the position by `count` bytes, updating line/column.
    pub fn advance(&mut self, count: usize) {
        let bytes = self.text.as_bytes();
        let end = (self.pos + count).min(bytes.len());
        for &b in &bytes[self.pos..end] {
            if b == b'\n' {
                self.line = self.line.saturating_add(1);
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column = self.column.saturating_add(1);
            }
        }
        self.pos = end;
    }

    /// Advances past one character.
    pub fn advance_char(&mut self, ch: char) {
        if ch == '\n' {
            self.line = self.line.saturating_add(1);
            self.column = 1;
        } else {
            self.column = self.column.saturating_add(1);
        }
        self.pos += ch.len_utf8();
    }

    /// Consumes the next character, rejecting characters outside `Char`.
    pub fn next_char(&mut self) -> Result<char, ParseError> {
        let ch = self
            .peek_char()
            .ok_or_else(|| self.fatal(ErrorKind::Lexical, "unexpected end of input"))?;
        if !is_xml_char(ch) {
            return Err(self.fatal(
                ErrorKind::Lexical,
                format!("invalid XML character: U+{:04X}", ch as u32),
            ));
        }
        self.advance_char(ch);
        Ok(ch)
    }

    /// Skips forward to the next occurrence of `byte`, or to the end.
    /// Returns `true` if anything was skipped.
    pub fn skip_to(&mut self, byte: u8) -> bool {
        let skip = self
            .rest()
            .bytes()
            .position(|b| b == byte)
            .unwrap_or(self.rest().len());
        self.advance(skip);
        skip > 0
    }

    // -- Expect operations --

    /// Consumes `expected` or fails with an error of `kind`.
    pub fn expect_byte(&mut self, expected: u8, kind: ErrorKind) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.advance(1);
                Ok(())
            }
            Some(b) => Err(self.fatal(
                kind,
                format!("expected '{}', found '{}'", expected as char, b as char),
            )),
            None => Err(self.fatal(
                kind,
                format!("expected '{}', found end of input", expected as char),
            )),
        }
    }

    /// Consumes `expected` or fails with an error of `kind`.
    pub fn expect_str(&mut self, expected: &[u8], kind: ErrorKind) -> Result<(), ParseError> {
        if self.looking_at(expected) {
            self.advance(expected.len());
            Ok(())
        } else {
            Err(self.fatal(
                kind,
                format!("expected '{}'", String::from_utf8_lossy(expected)),
            ))
        }
    }

    // -- Whitespace --

    /// Skips whitespace characters. Returns `true` if any were consumed.
    pub fn skip_whitespace(&mut self) -> bool {
        let count = self
            .rest()
            .bytes()
            .take_while(|&b| crate::util::chars::is_whitespace(b))
            .count();
        self.advance(count);
        count > 0
    }

    /// Skips whitespace, returning an error of `kind` if none is found.
    pub fn skip_whitespace_required(&mut self, kind: ErrorKind) -> Result<(), ParseError> {
        if !self.skip_whitespace() {
            return Err(self.fatal(kind, "whitespace required"));
        }
        Ok(())
    }

    // -- Name parsing (XML 1.0 §2.3) --

    /// Returns `true` if a `Name` starts at the cursor.
    pub fn at_name_start(&self) -> bool {
        self.peek_char().is_some_and(is_name_start_char)
    }

    /// Parses an XML `Name` (production `[5]`).
    pub fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek_char() {
            None => return Err(self.fatal(ErrorKind::Lexical, "expected name, found end of input")),
            Some(c) if !is_name_start_char(c) => {
                return Err(self.fatal(
                    ErrorKind::Lexical,
                    format!("invalid name start character: '{}'", c.escape_default()),
                ));
            }
            Some(_) => {}
        }

        let len: usize = self
            .rest()
            .chars()
            .take_while(|&c| is_name_char(c))
            .map(char::len_utf8)
            .sum();
        if len > self.max_name_length {
            return Err(self.fatal(
                ErrorKind::LimitExceeded,
                format!(
                    "name length ({len}) exceeds maximum ({})",
                    self.max_name_length
                ),
            ));
        }
        self.advance(len);
        Ok(self.slice(start, self.pos).to_string())
    }

    // -- References (XML 1.0 §4.1) --

    /// Parses a character reference (`&#N;` or `&#xH;`).
    pub fn parse_char_ref(&mut self) -> Result<char, ParseError> {
        self.expect_str(b"&#", ErrorKind::Lexical)?;
        let (radix, digits_start) = if self.peek() == Some(b'x') {
            self.advance(1);
            (16, self.pos)
        } else {
            (10, self.pos)
        };
        let count = self
            .rest()
            .bytes()
            .take_while(|b| b.is_ascii_digit() || (radix == 16 && b.is_ascii_hexdigit()))
            .count();
        self.advance(count);
        let digits = self.slice(digits_start, self.pos);
        if digits.is_empty() {
            return Err(self.fatal(ErrorKind::Lexical, "invalid character reference: no digits"));
        }
        if self.peek() != Some(b';') {
            return Err(self.fatal(ErrorKind::Entity, "character reference not terminated by ';'"));
        }
        self.advance(1);

        let ch = u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)
            .filter(|&c| is_xml_char(c));
        ch.ok_or_else(|| {
            self.fatal(
                ErrorKind::Lexical,
                format!("character reference &#{}{digits}; is not a valid XML character",
                    if radix == 16 { "x" } else { "" }),
            )
        })
    }

    /// Parses `&name;` and returns the name.
    pub fn parse_entity_ref(&mut self) -> Result<String, ParseError> {
        self.expect_byte(b'&', ErrorKind::Entity)?;
        if !self.at_name_start() {
            return Err(self.fatal(ErrorKind::Entity, "entity reference: expecting name"));
        }
        let name = self.parse_name()?;
        if self.peek() != Some(b';') {
            return Err(self
                .fatal(
                    ErrorKind::Entity,
                    format!("entity reference '{name}' not terminated by ';'"),
                )
                .with_name(name));
        }
        self.advance(1);
        Ok(name)
    }

    /// Parses `%name;` and returns the name.
    pub fn parse_pe_ref(&mut self) -> Result<String, ParseError> {
        self.expect_byte(b'%', ErrorKind::Dtd)?;
        if !self.at_name_start() {
            return Err(self.fatal(ErrorKind::Dtd, "parameter entity reference: expecting name"));
        }
        let name = self.parse_name()?;
        if self.peek() != Some(b';') {
            return Err(self
                .fatal(
                    ErrorKind::Entity,
                    format!("parameter entity reference '%{name}' not terminated by ';'"),
                )
                .with_name(name));
        }
        self.advance(1);
        Ok(name)
    }

    // -- Literals --

    /// Parses a quoted literal without interpreting its content.
    pub fn parse_quoted_value(&mut self, kind: ErrorKind) -> Result<&'a str, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal(kind, "expected quoted value")),
        };
        self.advance(1);
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.fatal(kind, "unterminated quoted value")),
                Some(b) if b == quote => break,
                Some(_) => {
                    self.next_char()?;
                }
            }
        }
        let value = self.slice(start, self.pos);
        self.advance(1);
        Ok(value)
    }

    /// Parses a `PubidLiteral` (production `[12]`).
    pub fn parse_pubid_literal(&mut self) -> Result<&'a str, ParseError> {
        let value = self.parse_quoted_value(ErrorKind::Dtd)?;
        if let Some(c) = value.chars().find(|&c| !is_pubid_char(c)) {
            return Err(self.fatal(
                ErrorKind::Dtd,
                format!("invalid character '{}' in public identifier", c.escape_default()),
            ));
        }
        Ok(value)
    }

    /// Consumes text up to `delim` and the delimiter itself, returning the
    /// text before it. Fails with an unterminated-`what` error at EOF.
    pub fn take_until(&mut self, delim: &[u8], what: &str) -> Result<&'a str, ParseError> {
        let start = self.pos;
        loop {
            if self.looking_at(delim) {
                let content = self.slice(start, self.pos);
                self.advance(delim.len());
                return Ok(content);
            }
            if self.at_end() {
                return Err(self.fatal(ErrorKind::Lexical, format!("unterminated {what}")));
            }
            self.next_char()?;
        }
    }

    // -- Error helpers --

    /// Creates a `ParseError` at the current location.
    pub fn fatal(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        let mut err = ParseError::new(kind, message);
        err.location = self.location();
        err
    }
}

// -------------------------------------------------------------------------
// Namespace resolver
// -------------------------------------------------------------------------

/// Namespace scope stack mirroring element nesting.
///
/// Each frame holds the `(prefix, uri)` bindings introduced on one element;
/// a `None` prefix is the default namespace.
pub(crate) struct NamespaceResolver {
    stack: Vec<Vec<(Option<String>, String)>>,
}

impl NamespaceResolver {
    /// Creates a resolver with the `xml` prefix pre-bound.
    pub fn new() -> Self {
        let initial = vec![(Some("xml".to_string()), XML_NAMESPACE.to_string())];
        Self {
            stack: vec![initial],
        }
    }

    /// Pushes a new (empty) scope for an element.
    pub fn push_scope(&mut self) {
        self.stack.push(Vec::new());
    }

    /// Pops the current scope.
    pub fn pop_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drops scopes until only `depth` remain.
    pub fn truncate(&mut self, depth: usize) {
        self.stack.truncate(depth.max(1));
    }

    /// Binds a prefix in the current scope.
    pub fn bind(&mut self, prefix: Option<String>, uri: String) {
        if let Some(frame) = self.stack.last_mut() {
            frame.push((prefix, uri));
        }
    }

    /// Resolves a prefix to its URI. `xmlns=""` undeclares the default
    /// namespace, so an empty binding resolves to `None`.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .and_then(|(_, uri)| (!uri.is_empty()).then_some(uri.as_str()))
    }
}

// -------------------------------------------------------------------------
// Self-contained constructs
// -------------------------------------------------------------------------

/// Parses a comment (`<!-- ... -->`), returning its content.
///
/// See XML 1.0 §2.5 production `[15]`.
pub(crate) fn parse_comment_content<'a>(
    input: &mut ParserInput<'a>,
) -> Result<&'a str, ParseError> {
    input.expect_str(b"<!--", ErrorKind::Lexical)?;
    let start = input.pos();
    loop {
        if input.looking_at(b"-->") {
            let content = input.slice(start, input.pos());
            input.advance(3);
            return Ok(content);
        }
        if input.looking_at(b"--") {
            return Err(input.fatal(ErrorKind::Lexical, "'--' not allowed inside comments"));
        }
        if input.at_end() {
            return Err(input.fatal(ErrorKind::Lexical, "unterminated comment"));
        }
        input.next_char()?;
    }
}

/// Parses a CDATA section (`<![CDATA[ ... ]]>`), returning its content.
///
/// See XML 1.0 §2.7 production `[18]`.
pub(crate) fn parse_cdata_content<'a>(
    input: &mut ParserInput<'a>,
) -> Result<&'a str, ParseError> {
    input.expect_str(b"<![CDATA[", ErrorKind::Lexical)?;
    input.take_until(b"]]>", "CDATA section")
}

/// Parses a processing instruction (`<?target data?>`).
///
/// See XML 1.0 §2.6 production `[16]`.
pub(crate) fn parse_pi_content(
    input: &mut ParserInput<'_>,
) -> Result<(String, Option<String>), ParseError> {
    input.expect_str(b"<?", ErrorKind::Lexical)?;
    let start = input.location();
    let target = input.parse_name()?;

    if target == "xml" {
        let mut err = ParseError::new(
            ErrorKind::Structural,
            "XML declaration allowed only at the start of the document",
        );
        err.location = start;
        return Err(err);
    }
    if target.eq_ignore_ascii_case("xml") {
        return Err(input
            .fatal(ErrorKind::Lexical, format!("PI target '{target}' is reserved"))
            .with_name(target));
    }
    if target.contains(':') {
        return Err(input
            .fatal(ErrorKind::Namespace, format!("colons are forbidden from PI names '{target}'"))
            .with_name(target));
    }

    if input.looking_at(b"?>") {
        input.advance(2);
        return Ok((target, None));
    }
    input.skip_whitespace_required(ErrorKind::Lexical)?;
    let data = input.take_until(b"?>", "processing instruction")?;
    let data = (!data.is_empty()).then(|| data.to_string());
    Ok((target, data))
}

/// Parsed XML declaration data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlDeclaration {
    /// XML version (e.g. `"1.0"`).
    pub version: String,
    /// Optional encoding declaration.
    pub encoding: Option<String>,
    /// Optional standalone declaration.
    pub standalone: Option<bool>,
}

/// Parses an XML declaration (`<?xml version="1.0" ...?>`).
///
/// See XML 1.0 §2.8 production `[23]`.
pub(crate) fn parse_xml_decl(input: &mut ParserInput<'_>) -> Result<XmlDeclaration, ParseError> {
    input.expect_str(b"<?xml", ErrorKind::Lexical)?;
    input.skip_whitespace_required(ErrorKind::Lexical)?;

    input.expect_str(b"version", ErrorKind::Lexical)?;
    parse_eq(input)?;
    let version = input.parse_quoted_value(ErrorKind::Lexical)?.to_string();
    if !is_valid_version_num(&version) {
        return Err(input.fatal(
            ErrorKind::Lexical,
            format!("unsupported XML version '{version}'"),
        ));
    }

    let mut had_ws = input.skip_whitespace();
    let encoding = if input.looking_at(b"encoding") {
        if !had_ws {
            return Err(input.fatal(ErrorKind::Lexical, "whitespace required before encoding"));
        }
        input.advance(8);
        parse_eq(input)?;
        let enc = input.parse_quoted_value(ErrorKind::Lexical)?;
        if !is_valid_encoding_name(enc) {
            return Err(input.fatal(
                ErrorKind::Encoding,
                format!("invalid encoding name '{enc}'"),
            ));
        }
        had_ws = input.skip_whitespace();
        Some(enc.to_string())
    } else {
        None
    };

    let standalone = if input.looking_at(b"standalone") {
        if !had_ws {
            return Err(input.fatal(ErrorKind::Lexical, "whitespace required before standalone"));
        }
        input.advance(10);
        parse_eq(input)?;
        let value = match input.parse_quoted_value(ErrorKind::Lexical)? {
            "yes" => true,
            "no" => false,
            _ => return Err(input.fatal(ErrorKind::Lexical, "standalone must be 'yes' or 'no'")),
        };
        input.skip_whitespace();
        Some(value)
    } else {
        None
    };

    input.expect_str(b"?>", ErrorKind::Lexical)?;

    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

/// `Eq ::= S? '=' S?`
fn parse_eq(input: &mut ParserInput<'_>) -> Result<(), ParseError> {
    input.skip_whitespace();
    input.expect_byte(b'=', ErrorKind::Lexical)?;
    input.skip_whitespace();
    Ok(())
}

/// `VersionNum ::= '1.' [0-9]+`
fn is_valid_version_num(s: &str) -> bool {
    s.strip_prefix("1.")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// `EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*`
fn is_valid_encoding_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_peek_and_advance() {
        let mut input = ParserInput::new("abc");
        assert_eq!(input.peek(), Some(b'a'));
        assert_eq!(input.peek_at(1), Some(b'b'));
        input.advance(1);
        assert_eq!(input.peek(), Some(b'b'));
        input.advance(2);
        assert!(input.at_end());
        assert_eq!(input.classify(), MarkupKind::Eof);
    }

    #[test]
    fn test_line_column_tracking() {
        let mut input = ParserInput::new("ab\ncd");
        input.advance(2);
        assert_eq!(input.location().column, 3);
        input.advance(1);
        assert_eq!(input.location().line, 2);
        assert_eq!(input.location().column, 1);
        assert_eq!(input.location().byte_offset, 3);
    }

    #[test]
    fn test_column_counts_codepoints() {
        let mut input = ParserInput::new("\u{E4}\u{E4}x");
        input.advance(4);
        assert_eq!(input.location().column, 3);
        assert_eq!(input.location().byte_offset, 4);
        assert_eq!(input.peek_char(), Some('x'));
    }

    #[test]
    fn test_line_clamp() {
        let text = "\n".repeat(70_000);
        let mut input = ParserInput::new(&text);
        input.advance(70_000);
        assert_eq!(input.location().line, 65_535);
        input.set_big_lines(true);
        assert_eq!(input.location().line, 70_001);
    }

    #[test]
    fn test_origin_overrides_location() {
        let origin = SourceLocation {
            line: 7,
            column: 3,
            byte_offset: 40,
        };
        let mut input = ParserInput::new("abc");
        input.set_origin(origin);
        input.advance(2);
        assert_eq!(input.location(), origin);
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
        assert!(matches!(normalize_line_endings("abc"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_classify() {
        let cases = [
            ("<!-- c -->", MarkupKind::Comment),
            ("<![CDATA[x]]>", MarkupKind::CData),
            ("<?pi?>", MarkupKind::ProcessingInstruction),
            ("<!DOCTYPE a>", MarkupKind::DocType),
            ("<!ENTITY a 'b'>", MarkupKind::EntityDecl),
            ("<!ELEMENT a ANY>", MarkupKind::ElementDecl),
            ("<!ATTLIST a b CDATA #IMPLIED>", MarkupKind::AttlistDecl),
            ("<!NOTATION n SYSTEM 'x'>", MarkupKind::NotationDecl),
            ("<!FOO>", MarkupKind::UnknownDecl),
            ("</a>", MarkupKind::EndTag),
            ("<a>", MarkupKind::StartTag),
            ("&#32;", MarkupKind::CharRef),
            ("&amp;", MarkupKind::EntityRef),
            ("text", MarkupKind::Text),
        ];
        for (text, kind) in cases {
            assert_eq!(ParserInput::new(text).classify(), kind, "{text}");
        }
    }

    #[test]
    fn test_parse_name() {
        let mut input = ParserInput::new("foo:bar-1 rest");
        assert_eq!(input.parse_name().unwrap(), "foo:bar-1");
        assert_eq!(input.peek(), Some(b' '));

        let mut input = ParserInput::new("1abc");
        assert_eq!(input.parse_name().unwrap_err().kind, ErrorKind::Lexical);
    }

    #[test]
    fn test_name_length_limit() {
        let mut input = ParserInput::new("abcdef");
        input.set_max_name_length(3);
        assert_eq!(input.parse_name().unwrap_err().kind, ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_char_refs() {
        assert_eq!(ParserInput::new("&#x20;").parse_char_ref().unwrap(), ' ');
        assert_eq!(ParserInput::new("&#160;").parse_char_ref().unwrap(), '\u{A0}');
        let err = ParserInput::new("&#0;").parse_char_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
        let err = ParserInput::new("&#xD800;").parse_char_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
        let err = ParserInput::new("&#32 ").parse_char_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);
    }

    #[test]
    fn test_entity_ref() {
        let mut input = ParserInput::new("&foo;x");
        assert_eq!(input.parse_entity_ref().unwrap(), "foo");
        assert_eq!(input.peek(), Some(b'x'));

        let err = ParserInput::new("&gt<").parse_entity_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);
        assert_eq!(err.name.as_deref(), Some("gt"));
        let err = ParserInput::new("&//0x20;").parse_entity_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);
    }

    #[test]
    fn test_comments() {
        let mut input = ParserInput::new("<!-- hi -->x");
        assert_eq!(parse_comment_content(&mut input).unwrap(), " hi ");
        assert_eq!(input.peek(), Some(b'x'));

        assert_eq!(parse_comment_content(&mut ParserInput::new("<!---->")).unwrap(), "");
        assert!(parse_comment_content(&mut ParserInput::new("<!-- a -- b -->")).is_err());
        assert!(parse_comment_content(&mut ParserInput::new("<!----->")).is_err());
        assert!(parse_comment_content(&mut ParserInput::new("<!--->")).is_err());
        assert!(parse_comment_content(&mut ParserInput::new("<!-- \u{1} -->")).is_err());
    }

    #[test]
    fn test_cdata() {
        let mut input = ParserInput::new("<![CDATA[<>&\"`]]>");
        assert_eq!(parse_cdata_content(&mut input).unwrap(), "<>&\"`");
        assert!(parse_cdata_content(&mut ParserInput::new("<![CDATA[abc")).is_err());
    }

    #[test]
    fn test_processing_instructions() {
        let mut input = ParserInput::new("<?target some data?>");
        let (target, data) = parse_pi_content(&mut input).unwrap();
        assert_eq!(target, "target");
        assert_eq!(data.as_deref(), Some("some data"));

        let (_, data) = parse_pi_content(&mut ParserInput::new("<?t?>")).unwrap();
        assert_eq!(data, None);

        let err = parse_pi_content(&mut ParserInput::new("<?xml version='1.0'?>")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structural);
        let err = parse_pi_content(&mut ParserInput::new("<?XmL x?>")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
    }

    #[test]
    fn test_xml_decl() {
        let mut input =
            ParserInput::new(r#"<?xml version="1.0" encoding='UTF-8' standalone="yes"?>"#);
        let decl = parse_xml_decl(&mut input).unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(decl.standalone, Some(true));

        let decl = parse_xml_decl(&mut ParserInput::new("<?xml version='1.1' standalone='no'?>"))
            .unwrap();
        assert_eq!(decl.standalone, Some(false));

        assert!(parse_xml_decl(&mut ParserInput::new("<?xml version='2.0'?>")).is_err());
        assert!(parse_xml_decl(&mut ParserInput::new("<?xml encoding='UTF-8'?>")).is_err());
        let err =
            parse_xml_decl(&mut ParserInput::new("<?xml version='1.0' encoding='8bit'?>"))
                .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Encoding);
    }

    #[test]
    fn test_namespace_resolver() {
        let mut ns = NamespaceResolver::new();
        assert_eq!(ns.resolve(Some("xml")), Some(XML_NAMESPACE));
        ns.push_scope();
        ns.bind(None, "urn:a".to_string());
        ns.bind(Some("p".to_string()), "urn:p".to_string());
        ns.push_scope();
        ns.bind(None, String::new());
        assert_eq!(ns.resolve(None), None);
        assert_eq!(ns.resolve(Some("p")), Some("urn:p"));
        ns.pop_scope();
        assert_eq!(ns.resolve(None), Some("urn:a"));
        ns.truncate(1);
        assert_eq!(ns.resolve(Some("p")), None);
        assert_eq!(ns.depth(), 1);
    }
}
