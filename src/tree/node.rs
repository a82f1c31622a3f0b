//! Node type definitions.
//!
//! The `NodeKind` enum carries the payload of every node type in the
//! document arena. Navigation links live in `NodeData`, not here.
//!
//! Names, namespace URIs and text are `Arc<str>` so that the parser can
//! hand out one shared allocation per distinct string from the document's
//! dictionary.

use std::sync::Arc;

use super::entities::EntityDecl;
use super::Attribute;
use crate::util::chars::is_blank;

/// The kind of an XML node and its associated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; there is exactly one per `Document`.
    Document,

    /// An element node, e.g. `<bar:foo a="x">`.
    Element {
        /// The element's local name.
        name: Arc<str>,
        /// Namespace prefix (e.g. `"bar"` in `bar:foo`), if any.
        prefix: Option<Arc<str>>,
        /// Namespace URI after resolution, if any.
        namespace: Option<Arc<str>>,
        /// Attributes in source order.
        attributes: Vec<Attribute>,
    },

    /// Character data.
    Text {
        /// The decoded text (references resolved).
        content: Arc<str>,
        /// `true` when the content is XML whitespace only.
        blank: bool,
    },

    /// A CDATA section, e.g. `<![CDATA[...]]>`.
    CData {
        /// The CDATA content (no escaping applied).
        content: String,
    },

    /// A comment, without the `<!--` and `-->` delimiters.
    Comment {
        /// The comment text.
        content: String,
    },

    /// A processing instruction, e.g. `<?target data?>`.
    ProcessingInstruction {
        /// The PI target.
        target: Arc<str>,
        /// The PI data, if any.
        data: Option<String>,
    },

    /// An unexpanded entity reference. Its children hold the parsed
    /// replacement content (none for external entities).
    EntityRef {
        /// The entity name (without `&` and `;`).
        name: Arc<str>,
    },

    /// The document type declaration. Its children are the internal
    /// subset declarations in source order.
    DocumentType {
        /// The root element name declared in the DOCTYPE.
        name: String,
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
        /// The SYSTEM identifier, if any.
        system_id: Option<String>,
    },

    /// An `<!ENTITY …>` declaration from the internal subset.
    EntityDecl(EntityDecl),

    /// Any other internal subset declaration (`<!ELEMENT`, `<!ATTLIST`,
    /// `<!NOTATION`), kept verbatim.
    MarkupDecl {
        /// The declaration text including `<!` and `>`.
        content: String,
    },
}

impl NodeKind {
    /// Builds a text node, computing its `blank` flag.
    #[must_use]
    pub fn text(content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        let blank = is_blank(&content);
        Self::Text { content, blank }
    }

    /// Returns `true` for element nodes.
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }
}
