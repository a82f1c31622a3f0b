//! Encoding detection and transcoding.
//!
//! Implements BOM sniffing and XML declaration encoding detection per
//! XML 1.0 Section 4.3.3 and Appendix F, bridging to `encoding_rs` for the
//! UTF-16 conversions.
//!
//! # Encoding Detection Strategy
//!
//! 1. Check for a Byte Order Mark (BOM), or the UTF-16 form of `<?`.
//! 2. Otherwise the input is ASCII-compatible: read the `encoding=` label
//!    of the XML declaration directly from the bytes.
//! 3. Decode with the label (UTF-8 when absent or ignored).
//!
//! Supported encodings are UTF-8, UTF-16 (LE/BE), ISO-8859-1 and US-ASCII.

use std::fmt;

use log::debug;

use crate::error::{ErrorKind, ParseError, SourceLocation};

/// An error that occurs during encoding detection or transcoding.
#[derive(Debug, Clone)]
pub struct EncodingError {
    /// A human-readable description of the encoding error.
    pub message: String,
    /// Byte offset of the offending input, when known.
    pub byte_offset: Option<usize>,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            byte_offset: None,
        }
    }

    fn at(mut self, byte_offset: usize) -> Self {
        self.byte_offset = Some(byte_offset);
        self
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encoding error: {}", self.message)
    }
}

impl std::error::Error for EncodingError {}

/// The encodings this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedEncoding {
    Utf8,
    Utf16,
    Latin1,
    Ascii,
}

impl SupportedEncoding {
    /// Looks up an encoding label (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use xmldom::encoding::SupportedEncoding;
    ///
    /// assert_eq!(SupportedEncoding::for_label("utf-8"), Some(SupportedEncoding::Utf8));
    /// assert_eq!(SupportedEncoding::for_label("Latin1"), Some(SupportedEncoding::Latin1));
    /// assert_eq!(SupportedEncoding::for_label("Shift_JIS"), None);
    /// ```
    #[must_use]
    pub fn for_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Some(Self::Utf8),
            "UTF-16" | "UTF16" | "UTF-16LE" | "UTF-16BE" => Some(Self::Utf16),
            "ISO-8859-1" | "ISO8859-1" | "ISO_8859-1" | "ISO-LATIN-1" | "LATIN1" | "L1" => {
                Some(Self::Latin1)
            }
            "US-ASCII" | "ASCII" => Some(Self::Ascii),
            _ => None,
        }
    }
}

/// Detects the encoding of an XML byte stream by inspecting the Byte Order Mark.
///
/// Returns a tuple of (encoding name, number of BOM bytes to skip).
///
/// Per XML 1.0 Appendix F, the detection order is:
/// - `EF BB BF` -> UTF-8
/// - `FE FF`    -> UTF-16 BE
/// - `FF FE`    -> UTF-16 LE
/// - `3C 00 3F 00` -> UTF-16 LE without BOM
/// - `00 3C 00 3F` -> UTF-16 BE without BOM
/// - anything else -> UTF-8 (default per XML spec)
///
/// # Examples
///
/// ```
/// use xmldom::encoding::detect_encoding;
///
/// let (enc, skip) = detect_encoding(b"\xEF\xBB\xBFhello");
/// assert_eq!(enc, "UTF-8");
/// assert_eq!(skip, 3);
///
/// let (enc, skip) = detect_encoding(b"<root/>");
/// assert_eq!(enc, "UTF-8");
/// assert_eq!(skip, 0);
/// ```
#[must_use]
pub fn detect_encoding(bytes: &[u8]) -> (&'static str, usize) {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => ("UTF-8", 3),
        [0xFE, 0xFF, ..] => ("UTF-16BE", 2),
        [0xFF, 0xFE, ..] => ("UTF-16LE", 2),
        [0x3C, 0x00, 0x3F, 0x00, ..] => ("UTF-16LE", 0),
        [0x00, 0x3C, 0x00, 0x3F, ..] => ("UTF-16BE", 0),
        _ => ("UTF-8", 0),
    }
}

/// Decodes raw XML bytes into a `String`.
///
/// Returns the text and the name of the encoding it was decoded from. With
/// `ignore_declared`, the declaration's label is not consulted and
/// ASCII-compatible input is read as UTF-8.
///
/// # Errors
///
/// Returns an `Encoding` kind `ParseError` for malformed byte sequences
/// and unsupported declared encodings.
///
/// # Examples
///
/// ```
/// use xmldom::encoding::decode;
///
/// let (text, from) = decode(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>\xE9</a>", false).unwrap();
/// assert_eq!(from, "ISO-8859-1");
/// assert!(text.ends_with("<a>\u{e9}</a>"));
/// ```
pub fn decode(bytes: &[u8], ignore_declared: bool) -> Result<(String, &'static str), ParseError> {
    decode_inner(bytes, ignore_declared).map_err(|e| {
        let mut err = ParseError::new(ErrorKind::Encoding, e.message);
        err.location = location_of(bytes, e.byte_offset.unwrap_or(0));
        err
    })
}

fn decode_inner(
    bytes: &[u8],
    ignore_declared: bool,
) -> Result<(String, &'static str), EncodingError> {
    let (detected, skip) = detect_encoding(bytes);
    let content = &bytes[skip..];

    if detected != "UTF-8" {
        debug!("decoding input as {detected}");
        return decode_utf16(content, detected).map(|text| (text, detected));
    }

    let declared = if ignore_declared {
        None
    } else {
        extract_encoding_from_ascii_bytes(content)
    };
    let Some(label) = declared else {
        return decode_utf8(content, skip).map(|text| (text, "UTF-8"));
    };

    match SupportedEncoding::for_label(&label) {
        Some(SupportedEncoding::Utf8) => decode_utf8(content, skip).map(|text| (text, "UTF-8")),
        Some(SupportedEncoding::Latin1) => {
            debug!("decoding input as ISO-8859-1");
            Ok((
                encoding_rs::mem::decode_latin1(content).into_owned(),
                "ISO-8859-1",
            ))
        }
        Some(SupportedEncoding::Ascii) => match content.iter().position(|b| !b.is_ascii()) {
            Some(offset) => Err(EncodingError::new(format!(
                "byte 0x{:02X} is not valid US-ASCII",
                content[offset]
            ))
            .at(offset + skip)),
            None => decode_utf8(content, skip).map(|text| (text, "US-ASCII")),
        },
        Some(SupportedEncoding::Utf16) => Err(EncodingError::new(format!(
            "document labelled {label} but has no UTF-16 content"
        ))),
        None => Err(EncodingError::new(format!("unsupported encoding '{label}'"))),
    }
}

/// `base` is the offset of `bytes` within the whole input.
fn decode_utf8(bytes: &[u8], base: usize) -> Result<String, EncodingError> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(e) => Err(EncodingError::new("input is not valid UTF-8").at(base + e.valid_up_to())),
    }
}

fn decode_utf16(bytes: &[u8], name: &str) -> Result<String, EncodingError> {
    let encoding = if name == "UTF-16BE" {
        encoding_rs::UTF_16BE
    } else {
        encoding_rs::UTF_16LE
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(std::borrow::Cow::into_owned)
        .ok_or_else(|| EncodingError::new(format!("malformed byte sequence for encoding {name}")))
}

/// Checks a declared encoding label against how the text was obtained.
///
/// `decoded_from` is `None` for text handed over as a `&str`, which is
/// already Unicode: any single-byte label is accepted, a UTF-16 label is
/// inconsistent.
///
/// # Errors
///
/// Returns `EncodingError` for unsupported labels and for labels that
/// contradict the detected encoding.
pub fn check_declared_encoding(
    label: &str,
    decoded_from: Option<&str>,
) -> Result<(), EncodingError> {
    let Some(declared) = SupportedEncoding::for_label(label) else {
        return Err(EncodingError::new(format!("unsupported encoding '{label}'")));
    };
    let from_utf16 = matches!(decoded_from, Some("UTF-16LE" | "UTF-16BE"));
    match (declared, from_utf16) {
        (SupportedEncoding::Utf16, false) => Err(EncodingError::new(format!(
            "document labelled {label} but has no UTF-16 content"
        ))),
        (SupportedEncoding::Utf16, true) => Ok(()),
        (_, true) => Err(EncodingError::new(format!(
            "document labelled {label} but has UTF-16 content"
        ))),
        (_, false) => Ok(()),
    }
}

/// Extracts the `encoding` attribute from raw bytes by treating them as ASCII.
///
/// The XML declaration must be in ASCII-compatible characters, so the bytes
/// can be scanned directly. Returns `None` if no encoding declaration is
/// found.
fn extract_encoding_from_ascii_bytes(bytes: &[u8]) -> Option<String> {
    let limit = bytes.len().min(200);
    let scan = &bytes[..limit];

    if !scan.starts_with(b"<?xml") {
        return None;
    }

    let decl_end = scan.windows(2).position(|w| w == b"?>")?;
    let decl = &scan[..decl_end];

    let needle = b"encoding";
    let enc_pos = decl.windows(needle.len()).position(|w| w == needle)?;
    let after_enc = &decl[enc_pos + needle.len()..];

    let after_enc = skip_ascii_whitespace(after_enc);
    if after_enc.first() != Some(&b'=') {
        return None;
    }
    let after_eq = skip_ascii_whitespace(&after_enc[1..]);

    let quote = *after_eq.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let after_quote = &after_eq[1..];
    let end = after_quote.iter().position(|&b| b == quote)?;
    let label = &after_quote[..end];

    if label.iter().all(u8::is_ascii) {
        Some(String::from_utf8_lossy(label).into_owned())
    } else {
        None
    }
}

fn skip_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let skip = bytes
        .iter()
        .take_while(|&&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    &bytes[skip..]
}

/// Line and column of a byte offset, counting columns in characters of
/// the valid UTF-8 prefix.
fn location_of(bytes: &[u8], offset: usize) -> SourceLocation {
    let prefix = &bytes[..offset.min(bytes.len())];
    let line_start = prefix.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
    let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = String::from_utf8_lossy(&prefix[line_start..]).chars().count() + 1;
    SourceLocation {
        line: u32::try_from(line).unwrap_or(u32::MAX),
        column: u32::try_from(column).unwrap_or(u32::MAX),
        byte_offset: offset,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_boms() {
        assert_eq!(detect_encoding(b"\xEF\xBB\xBF<root/>"), ("UTF-8", 3));
        assert_eq!(detect_encoding(b"\xFF\xFE<\x00r\x00"), ("UTF-16LE", 2));
        assert_eq!(detect_encoding(b"\xFE\xFF\x00<\x00r"), ("UTF-16BE", 2));
        assert_eq!(detect_encoding(b"<\x00?\x00x\x00"), ("UTF-16LE", 0));
        assert_eq!(detect_encoding(b""), ("UTF-8", 0));
        assert_eq!(detect_encoding(b"\xEF"), ("UTF-8", 0));
    }

    #[test]
    fn test_decode_utf8() {
        let (text, from) = decode(b"<?xml version=\"1.0\"?><root>hello</root>", false).unwrap();
        assert_eq!(text, "<?xml version=\"1.0\"?><root>hello</root>");
        assert_eq!(from, "UTF-8");
    }

    #[test]
    fn test_decode_utf8_with_bom_strips_it() {
        let (text, _) = decode(b"\xEF\xBB\xBF<root/>", false).unwrap();
        assert_eq!(text, "<root/>");
    }

    #[test]
    fn test_decode_latin1_is_not_windows_1252() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>caf\xE9\x80</r>";
        let (text, from) = decode(bytes, false).unwrap();
        assert_eq!(from, "ISO-8859-1");
        assert!(text.contains("caf\u{e9}\u{80}"));
    }

    #[test]
    fn test_decode_utf16le() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a>\u{e9}</a>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, from) = decode(&bytes, false).unwrap();
        assert_eq!(text, "<a>\u{e9}</a>");
        assert_eq!(from, "UTF-16LE");
    }

    #[test]
    fn test_decode_invalid_utf8_reports_offset() {
        let err = decode(b"<a>\nab\xFF</a>", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Encoding);
        assert_eq!(err.location.byte_offset, 6);
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.column, 3);
    }

    #[test]
    fn test_decode_ascii_rejects_high_bytes() {
        let err = decode(b"<?xml version=\"1.0\" encoding=\"US-ASCII\"?><a>\xE9</a>", false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Encoding);
    }

    #[test]
    fn test_decode_unsupported_label() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"Shift_JIS\"?><a/>";
        assert!(decode(bytes, false).is_err());
        let (text, from) = decode(bytes, true).unwrap();
        assert_eq!(from, "UTF-8");
        assert!(text.ends_with("<a/>"));
    }

    #[test]
    fn test_check_declared_encoding() {
        assert!(check_declared_encoding("utf-8", None).is_ok());
        assert!(check_declared_encoding("ISO-8859-1", Some("ISO-8859-1")).is_ok());
        assert!(check_declared_encoding("UTF-16", Some("UTF-16LE")).is_ok());
        assert!(check_declared_encoding("UTF-16", None).is_err());
        assert!(check_declared_encoding("UTF-8", Some("UTF-16BE")).is_err());
        let err = check_declared_encoding("EBCDIC", None).unwrap_err();
        assert!(err.message.contains("unsupported encoding"));
    }

    #[test]
    fn test_extract_encoding_label() {
        assert_eq!(
            extract_encoding_from_ascii_bytes(b"<?xml version='1.0' encoding='UTF-8'?><r/>"),
            Some("UTF-8".to_string())
        );
        assert_eq!(extract_encoding_from_ascii_bytes(b"<?xml version=\"1.0\"?><r/>"), None);
        assert_eq!(extract_encoding_from_ascii_bytes(b"<r/>"), None);
    }

    #[test]
    fn test_encoding_error_display() {
        let err = EncodingError::new("test error");
        assert_eq!(err.to_string(), "encoding error: test error");
        let _: &dyn std::error::Error = &err;
    }
}
