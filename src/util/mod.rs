//! Utility modules for xmldom.
//!
//! Contains the XML character classifier, the string interning dictionary
//! and `QName` handling.

pub mod chars;
pub mod dict;
pub mod qname;
