//! XML 1.0 parser.
//!
//! A hand-rolled recursive descent parser conforming to the W3C XML 1.0
//! (Fifth Edition) specification. The parser builds a `Document` tree,
//! honors the [`ParseOption`] flags, and supports a recovery mode for
//! processing malformed input.
//!
//! The parser is hand-rolled (not combinator-based) because:
//! 1. Error recovery requires fine-grained control over parse state
//! 2. Entity replacement text is parsed in place by nested parsers

mod dtd;
pub(crate) mod input;
pub mod options;
mod xml;

pub use options::{ParseOption, ParseOptions};

use crate::error::ParseError;
use crate::tree::Document;

/// Parses an XML document from a string with default options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed XML.
///
/// # Examples
///
/// ```
/// use xmldom::parser::parse_str;
///
/// let doc = parse_str("<root>Hello</root>").unwrap();
/// let root = doc.root_element().unwrap();
/// assert_eq!(doc.text_content(root), "Hello");
/// ```
pub fn parse_str(input: &str) -> Result<Document, ParseError> {
    parse_str_with_options(input, &ParseOptions::default())
}

/// Parses an XML document from a string with the given options.
///
/// The input is already decoded, so only UTF-8 compatible encoding
/// declarations are accepted (see [`crate::encoding`]).
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed XML. With
/// [`ParseOption::RECOVER`] only resource limit and encoding errors are
/// returned; everything else ends up in `Document::diagnostics`.
///
/// # Examples
///
/// ```
/// use xmldom::parser::{parse_str_with_options, ParseOption, ParseOptions};
///
/// let opts = ParseOptions::from(ParseOption::RECOVER);
/// let doc = parse_str_with_options("<root><unclosed></root>", &opts).unwrap();
/// assert!(doc.root_element().is_some());
/// assert!(!doc.diagnostics.is_empty());
/// ```
pub fn parse_str_with_options(input: &str, options: &ParseOptions) -> Result<Document, ParseError> {
    xml::parse_document(input, options, None)
}

/// Parses an XML document from raw bytes.
///
/// The encoding is detected from a byte order mark or the XML declaration
/// and the input is transcoded to UTF-8 before parsing.
///
/// # Errors
///
/// Returns `ParseError` if the bytes cannot be decoded or the document is
/// not well-formed.
pub fn parse_bytes_with_options(
    input: &[u8],
    options: &ParseOptions,
) -> Result<Document, ParseError> {
    let ignore_declared = options.has(ParseOption::IGNORE_ENC);
    let (text, decoded_from) = crate::encoding::decode(input, ignore_declared)?;
    xml::parse_document(&text, options, Some(decoded_from))
}
