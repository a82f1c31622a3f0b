//! # xmldom
//!
//! An XML 1.0 DOM parser and serializer with a libxml2-compatible option
//! set. Documents are parsed into an arena tree, the tree can be inspected
//! through `Document`, and the serializer writes it back so that parsing
//! the output yields a structurally equal tree.
//!
//! ## Quick Start
//!
//! ```
//! use xmldom::{Document, ParseOption, ParseOptions};
//!
//! let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
//! let root = doc.root_element().unwrap();
//! assert_eq!(doc.node_name(root), Some("root"));
//!
//! let opts = ParseOptions::from(ParseOption::NO_BLANKS | ParseOption::NSCLEAN);
//! let doc = Document::parse_str_with_options("<a> <b/> </a>", &opts).unwrap();
//! assert_eq!(doc.dump(false), "<?xml version=\"1.0\"?>\n<a><b/></a>\n");
//! ```

pub mod encoding;
pub mod error;
pub mod parser;
pub mod serial;
pub mod tree;
pub mod util;

// Re-export primary types at the crate root for convenience.
pub use error::{ErrorKind, ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
pub use parser::{ParseOption, ParseOptions};
pub use tree::{Attribute, Document, NodeId, NodeKind};
