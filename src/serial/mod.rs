//! XML serialization.
//!
//! This module serializes a `Document` tree back to XML text. The
//! serializer handles escaping, the XML declaration, the internal DTD
//! subset and an optional indentation mode.

pub mod xml;

pub use xml::serialize;
