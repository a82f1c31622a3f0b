//! `QName` (qualified name) handling.
//!
//! A `QName` is a name of the form `prefix:localname` or just `localname` (with
//! no prefix). This module provides utilities for splitting and checking
//! qualified names as defined by the Namespaces in XML 1.0 specification.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

/// Splits a `QName` into its prefix and local name parts.
///
/// Returns `(Some(prefix), localname)` if the name contains a colon,
/// or `(None, localname)` if it does not.
///
/// # Examples
///
/// ```
/// use xmldom::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Checks that a name is a legal `QName` (Namespaces in XML 1.0 §4).
///
/// A `QName` has at most one colon, and neither prefix nor local part may be
/// empty. Returns a description of the problem, or `None` if valid.
#[must_use]
pub fn qname_error(name: &str) -> Option<&'static str> {
    let colons = name.bytes().filter(|&b| b == b':').count();
    if colons > 1 {
        return Some("QName contains multiple colons");
    }
    if colons == 1 && (name.starts_with(':') || name.ends_with(':')) {
        return Some("QName has empty prefix or local part");
    }
    None
}

/// Joins a prefix and local name back into a `QName`.
#[must_use]
pub fn join_qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname_with_prefix() {
        assert_eq!(split_qname("xml:lang"), (Some("xml"), "lang"));
    }

    #[test]
    fn test_split_qname_without_prefix() {
        assert_eq!(split_qname("div"), (None, "div"));
    }

    #[test]
    fn test_split_qname_multiple_colons() {
        // Only splits on first colon
        assert_eq!(split_qname("a:b:c"), (Some("a"), "b:c"));
    }

    #[test]
    fn test_qname_error() {
        assert_eq!(qname_error("a:b"), None);
        assert_eq!(qname_error("ab"), None);
        assert!(qname_error("a:b:c").is_some());
        assert!(qname_error(":b").is_some());
        assert!(qname_error("a:").is_some());
    }

    #[test]
    fn test_join_qname() {
        assert_eq!(join_qname(Some("bar"), "foo"), "bar:foo");
        assert_eq!(join_qname(None, "foo"), "foo");
    }
}
