//! Error types and diagnostics for XML parsing.
//!
//! Every problem the parser detects is classified by an [`ErrorKind`] and a
//! [`ErrorSeverity`], and carries the source location (line, column, byte
//! offset) where it was detected plus, when relevant, the element or entity
//! name involved.
//!
//! Without recovery the first error aborts the parse and is returned as a
//! [`ParseError`]. In recovery mode errors are collected as
//! [`ParseDiagnostic`]s on the resulting document instead.

use std::fmt;

/// The class of a well-formedness problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Disallowed character or unterminated construct.
    Lexical,
    /// Tag mismatch, stray content outside the root, missing root.
    Structural,
    /// Unquoted value, duplicate name, misplaced reference.
    Attribute,
    /// Undefined, recursive or unterminated entity reference.
    Entity,
    /// Unsupported or inconsistent declared encoding.
    Encoding,
    /// Unbound prefix or reserved prefix misuse.
    Namespace,
    /// Malformed internal subset or validity failure.
    Dtd,
    /// Nesting, expansion or size cap reached.
    LimitExceeded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lexical => "lexical error",
            Self::Structural => "structural error",
            Self::Attribute => "attribute error",
            Self::Entity => "entity error",
            Self::Encoding => "encoding error",
            Self::Namespace => "namespace error",
            Self::Dtd => "DTD error",
            Self::LimitExceeded => "limit exceeded",
        };
        f.write_str(name)
    }
}

/// Severity level for a parse diagnostic, matching libxml2's `xmlErrorLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// A non-fatal issue that doesn't prevent parsing.
    Warning,
    /// A recoverable error: the parser can continue but the document is malformed.
    Error,
    /// An unrecoverable error: parsing must stop.
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single diagnostic emitted during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The severity of this diagnostic.
    pub severity: ErrorSeverity,
    /// Human-readable error message.
    pub message: String,
    /// Where in the source this error occurred.
    pub location: SourceLocation,
    /// The element, attribute or entity name involved, if any.
    pub name: Option<String>,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.location)
    }
}

/// The error type returned when XML parsing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The primary error message.
    pub message: String,
    /// Where in the source the fatal error occurred.
    pub location: SourceLocation,
    /// The element, attribute or entity name involved, if any.
    pub name: Option<String>,
    /// All diagnostics collected before the fatal error (warnings and, in
    /// recovery mode, recovered errors).
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseError {
    /// Creates an error with no location information.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: SourceLocation::default(),
            name: None,
            diagnostics: Vec::new(),
        }
    }

    /// Attaches the name of the element or entity involved.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Converts this error into a diagnostic of the given severity.
    #[must_use]
    pub fn to_diagnostic(&self, severity: ErrorSeverity) -> ParseDiagnostic {
        ParseDiagnostic {
            kind: self.kind,
            severity,
            message: self.message.clone(),
            location: self.location,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation {
            line: 10,
            column: 5,
            byte_offset: 42,
        };
        assert_eq!(loc.to_string(), "10:5");
    }

    #[test]
    fn test_parse_error_display() {
        let mut err = ParseError::new(ErrorKind::Structural, "unexpected end of input");
        err.location = SourceLocation {
            line: 1,
            column: 15,
            byte_offset: 14,
        };
        assert_eq!(
            err.to_string(),
            "parse error at 1:15: unexpected end of input"
        );
    }

    #[test]
    fn test_parse_diagnostic_display() {
        let diag = ParseDiagnostic {
            kind: ErrorKind::Attribute,
            severity: ErrorSeverity::Warning,
            message: "attribute value not quoted".to_string(),
            location: SourceLocation {
                line: 3,
                column: 10,
                byte_offset: 50,
            },
            name: None,
        };
        assert_eq!(
            diag.to_string(),
            "warning: attribute value not quoted at 3:10"
        );
    }

    #[test]
    fn test_error_severity_display() {
        assert_eq!(ErrorSeverity::Warning.to_string(), "warning");
        assert_eq!(ErrorSeverity::Error.to_string(), "error");
        assert_eq!(ErrorSeverity::Fatal.to_string(), "fatal error");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Entity.to_string(), "entity error");
        assert_eq!(ErrorKind::LimitExceeded.to_string(), "limit exceeded");
    }

    #[test]
    fn test_with_name_and_to_diagnostic() {
        let err = ParseError::new(ErrorKind::Entity, "Entity 'foo' not defined").with_name("foo");
        let diag = err.to_diagnostic(ErrorSeverity::Error);
        assert_eq!(diag.kind, ErrorKind::Entity);
        assert_eq!(diag.name.as_deref(), Some("foo"));
        assert_eq!(diag.message, "Entity 'foo' not defined");
    }

    #[test]
    fn test_parse_error_is_error_trait() {
        let err = ParseError::new(ErrorKind::Lexical, "test");
        let _: &dyn std::error::Error = &err;
    }
}
