//! Arena-based XML document tree.
//!
//! All nodes live in a contiguous `Vec<NodeData>` owned by the `Document`
//! and are referenced by `NodeId`, a newtype over `NonZeroU32`. Navigation
//! links (parent, first/last child, siblings) are arena indices, so the tree
//! has no reference cycles and dropping the `Document` frees everything.
//!
//! Accessors hand out borrows tied to the `Document`, which means a node or
//! string can never outlive the tree it came from.

pub mod entities;
mod node;

pub use node::NodeKind;

use crate::error::{ParseDiagnostic, ParseError};
use crate::parser::ParseOptions;
use crate::util::dict::Dict;
use entities::EntityTable;
use std::num::NonZeroU32;
use std::sync::Arc;

/// A typed index into the document's node arena.
///
/// `Option<NodeId>` has the same size as `NodeId` (niche optimization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Creates a `NodeId` from an arena index (always at least 1).
    fn from_index(index: usize) -> Self {
        let offset = u32::try_from(index.saturating_sub(1)).unwrap_or(u32::MAX);
        Self(NonZeroU32::MIN.saturating_add(offset))
    }

    /// Returns the raw index as a `usize` for indexing into the arena.
    fn as_index(self) -> usize {
        self.0.get() as usize
    }
}

/// Storage for a single node in the document arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// What kind of node this is and its payload.
    pub kind: NodeKind,
    /// Parent node. The document node has none.
    pub parent: Option<NodeId>,
    /// First child node.
    pub first_child: Option<NodeId>,
    /// Last child node (for O(1) append).
    pub last_child: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// An XML attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The local name (e.g. `"lang"` for `xml:lang`).
    pub name: Arc<str>,
    /// Namespace prefix, if any.
    pub prefix: Option<Arc<str>>,
    /// Namespace URI after resolution, if any.
    pub namespace: Option<Arc<str>>,
    /// The normalized value with references expanded.
    pub value: String,
    /// The quote character used in the source, `"` or `'`.
    pub quote: char,
}

impl Attribute {
    /// Returns the qualified name (`prefix:name` or `name`).
    #[must_use]
    pub fn qualified_name(&self) -> String {
        crate::util::qname::join_qname(self.prefix.as_deref(), &self.name)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.prefix == other.prefix
            && self.namespace == other.namespace
            && self.value == other.value
    }
}

/// An XML document.
///
/// The `Document` owns all nodes in an arena and provides methods for
/// tree navigation. Parsing is the only way to obtain a populated one.
///
/// # Examples
///
/// ```
/// use xmldom::Document;
///
/// let doc = Document::parse_str("<root><child/></root>").unwrap();
/// let root = doc.root_element().unwrap();
/// assert_eq!(doc.node_name(root), Some("root"));
/// assert_eq!(doc.children(root).count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    /// The node arena. Index 0 is unused (placeholder for `NonZeroU32`).
    nodes: Vec<NodeData>,
    /// The document node id (not the root element).
    root: NodeId,
    /// XML version from the XML declaration (e.g. "1.0").
    pub version: Option<String>,
    /// Encoding from the XML declaration (e.g. "UTF-8").
    pub encoding: Option<String>,
    /// Standalone flag from the XML declaration.
    pub standalone: Option<bool>,
    /// Diagnostics collected during parsing (warnings and recovered errors).
    pub diagnostics: Vec<ParseDiagnostic>,
    pub(crate) entities: EntityTable,
    pub(crate) dict: Option<Dict>,
}

impl Document {
    /// Creates a new empty document holding only the document node.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(64);
        // Index 0: placeholder (NodeId uses NonZeroU32)
        nodes.push(NodeData::new(NodeKind::Document));
        nodes.push(NodeData::new(NodeKind::Document));
        Self {
            nodes,
            root: NodeId::from_index(1),
            version: None,
            encoding: None,
            standalone: None,
            diagnostics: Vec::new(),
            entities: EntityTable::new(),
            dict: Some(Dict::new()),
        }
    }

    /// Parses an XML string with default options.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the input is not well-formed XML.
    pub fn parse_str(input: &str) -> Result<Self, ParseError> {
        crate::parser::parse_str(input)
    }

    /// Parses an XML string with the given options.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the input is not well-formed XML (or, in
    /// recovery mode, if a limit is exceeded).
    pub fn parse_str_with_options(
        input: &str,
        options: &ParseOptions,
    ) -> Result<Self, ParseError> {
        crate::parser::parse_str_with_options(input, options)
    }

    /// Parses XML from raw bytes, detecting the encoding.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the encoding is unsupported, the bytes are
    /// invalid in that encoding, or the XML is not well-formed.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmldom::{Document, ParseOptions};
    ///
    /// let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>\xE4</r>";
    /// let doc = Document::parse_bytes(bytes, &ParseOptions::default()).unwrap();
    /// let root = doc.root_element().unwrap();
    /// assert_eq!(doc.text_content(root), "\u{E4}");
    /// ```
    pub fn parse_bytes(input: &[u8], options: &ParseOptions) -> Result<Self, ParseError> {
        crate::parser::parse_bytes_with_options(input, options)
    }

    /// Serializes the document. See [`crate::serial::serialize`].
    #[must_use]
    pub fn dump(&self, format: bool) -> String {
        crate::serial::serialize(self, format)
    }

    /// Returns the document node id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the root element, if the document has one.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| self.node(id).kind.is_element())
    }

    /// Returns the document type declaration node, if any.
    #[must_use]
    pub fn doctype(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| matches!(self.node(id).kind, NodeKind::DocumentType { .. }))
    }

    /// Returns the entity table (predefined plus declared entities).
    #[must_use]
    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Returns the string dictionary, unless parsed with `NoDict`.
    #[must_use]
    pub fn dict(&self) -> Option<&Dict> {
        self.dict.as_ref()
    }

    /// Returns the `NodeData` for the given node.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this document.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Returns the name of a node, if applicable.
    ///
    /// Elements give their local name, PIs their target, and entity
    /// references, DOCTYPEs and entity declarations their entity or root
    /// name. Other nodes return `None`.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::ProcessingInstruction { target: name, .. }
            | NodeKind::EntityRef { name } => Some(name),
            NodeKind::DocumentType { name, .. } => Some(name),
            NodeKind::EntityDecl(decl) => Some(&decl.name),
            _ => None,
        }
    }

    /// Returns the namespace prefix of an element.
    #[must_use]
    pub fn node_prefix(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { prefix, .. } => prefix.as_deref(),
            _ => None,
        }
    }

    /// Returns the resolved namespace URI of an element.
    #[must_use]
    pub fn node_namespace(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } => namespace.as_deref(),
            _ => None,
        }
    }

    /// Returns the text of a text, CDATA, comment or PI node.
    #[must_use]
    pub fn node_text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content, .. } => Some(content),
            NodeKind::Comment { content } | NodeKind::CData { content } => Some(content),
            NodeKind::ProcessingInstruction { data, .. } => data.as_deref(),
            _ => None,
        }
    }

    /// Returns the concatenated character data of a node and its
    /// descendants, including the expansion of entity references.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let data = |node: NodeId| match &self.node(node).kind {
            NodeKind::Text { content, .. } => Some(&**content),
            NodeKind::CData { content } => Some(content.as_str()),
            _ => None,
        };
        if let Some(text) = data(id) {
            return text.to_string();
        }
        self.descendants(id).filter_map(data).collect()
    }

    /// Returns the attributes of an element, or an empty slice.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Returns an attribute value by qualified name (`a` or `p:a`).
    #[must_use]
    pub fn attribute(&self, id: NodeId, qname: &str) -> Option<&str> {
        let (prefix, local) = crate::util::qname::split_qname(qname);
        self.attributes(id)
            .iter()
            .find(|a| &*a.name == local && a.prefix.as_deref() == prefix)
            .map(|a| a.value.as_str())
    }

    /// Returns an attribute value by namespace URI and local name.
    #[must_use]
    pub fn attribute_ns(&self, id: NodeId, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| &*a.name == local && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    // --- Navigation ---

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns the first child of a node.
    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    /// Returns the last child of a node.
    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    /// Returns the next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    /// Returns the previous sibling of a node.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Returns an iterator over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Returns an iterator over a node and its ancestors (walking up to root).
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// Returns an iterator over all descendants of a node (depth-first).
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.first_child(id),
        }
    }

    // --- Construction (parser only) ---

    pub(crate) fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(
            self.node(child).parent.is_none(),
            "child already has a parent; detach it first"
        );

        self.node_mut(child).parent = Some(parent);

        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
            self.node_mut(parent).last_child = Some(child);
        } else {
            self.node_mut(parent).first_child = Some(child);
            self.node_mut(parent).last_child = Some(child);
        }
    }

    /// Unlinks a node from its parent. The node stays in the arena but is
    /// unreachable.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };

        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;

        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }

        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }

        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Returns the number of allocated nodes, including detached ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    // --- Comparison ---

    /// Compares two documents node by node.
    ///
    /// Node kinds, names, namespace URIs, attributes (name, prefix, URI,
    /// value), character data and internal subset declarations must match.
    /// Arena layout, attribute quote characters and diagnostics are
    /// ignored; a missing version counts as `"1.0"`.
    ///
    /// ```
    /// use xmldom::Document;
    ///
    /// let a = Document::parse_str("<a x='1'><b/></a>").unwrap();
    /// let b = Document::parse_str("<?xml version=\"1.0\"?><a x=\"1\"><b></b></a>").unwrap();
    /// assert!(a.structurally_eq(&b));
    /// ```
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.version.as_deref().unwrap_or("1.0") != other.version.as_deref().unwrap_or("1.0")
            || self.encoding != other.encoding
            || self.standalone != other.standalone
        {
            return false;
        }

        let mut stack = vec![(self.root, other.root)];
        while let Some((a, b)) = stack.pop() {
            if !kind_eq(&self.node(a).kind, &other.node(b).kind) {
                return false;
            }
            let mut left = self.children(a);
            let mut right = other.children(b);
            loop {
                match (left.next(), right.next()) {
                    (None, None) => break,
                    (Some(x), Some(y)) => stack.push((x, y)),
                    _ => return false,
                }
            }
        }
        true
    }
}

fn kind_eq(a: &NodeKind, b: &NodeKind) -> bool {
    match (a, b) {
        (
            NodeKind::Element {
                name: n1,
                prefix: p1,
                namespace: ns1,
                attributes: a1,
            },
            NodeKind::Element {
                name: n2,
                prefix: p2,
                namespace: ns2,
                attributes: a2,
            },
        ) => {
            n1 == n2
                && p1 == p2
                && ns1 == ns2
                && a1.len() == a2.len()
                && a1.iter().zip(a2).all(|(x, y)| x.same_content(y))
        }
        (NodeKind::Text { content: c1, .. }, NodeKind::Text { content: c2, .. }) => c1 == c2,
        _ => a == b,
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over all descendants of a node.
pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        if let Some(child) = self.doc.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }

        let mut node = current;
        loop {
            if node == self.root {
                self.next = None;
                break;
            }
            if let Some(sibling) = self.doc.next_sibling(node) {
                self.next = Some(sibling);
                break;
            }
            match self.doc.parent(node) {
                Some(parent) => node = parent,
                None => {
                    self.next = None;
                    break;
                }
            }
        }
        Some(current)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn element(name: &str) -> NodeKind {
        NodeKind::Element {
            name: name.into(),
            prefix: None,
            namespace: None,
            attributes: vec![],
        }
    }

    #[test]
    fn test_new_document_has_root() {
        let doc = Document::new();
        assert!(matches!(doc.node(doc.root()).kind, NodeKind::Document));
        assert_eq!(doc.node_count(), 1);
        assert!(doc.root_element().is_none());
        assert!(doc.doctype().is_none());
    }

    #[test]
    fn test_append_multiple_children() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.create_node(NodeKind::text("A"));
        let b = doc.create_node(NodeKind::text("B"));
        let c = doc.create_node(NodeKind::text("C"));
        doc.append_child(root, a);
        doc.append_child(root, b);
        doc.append_child(root, c);

        assert_eq!(doc.first_child(root), Some(a));
        assert_eq!(doc.last_child(root), Some(c));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.prev_sibling(c), Some(b));
        assert_eq!(doc.children(root).collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn test_detach_middle_child() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.create_node(NodeKind::text("A"));
        let b = doc.create_node(NodeKind::text(" "));
        let c = doc.create_node(NodeKind::text("C"));
        doc.append_child(root, a);
        doc.append_child(root, b);
        doc.append_child(root, c);

        doc.detach(b);
        assert_eq!(doc.children(root).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(doc.parent(b), None);
        assert_eq!(doc.prev_sibling(c), Some(a));

        doc.detach(c);
        assert_eq!(doc.last_child(root), Some(a));
    }

    #[test]
    fn test_descendants_and_ancestors() {
        let mut doc = Document::new();
        let root = doc.root();
        let top = doc.create_node(element("top"));
        let left = doc.create_node(element("left"));
        let leaf = doc.create_node(NodeKind::text("x"));
        let right = doc.create_node(element("right"));
        doc.append_child(root, top);
        doc.append_child(top, left);
        doc.append_child(left, leaf);
        doc.append_child(top, right);

        let order: Vec<NodeId> = doc.descendants(root).collect();
        assert_eq!(order, vec![top, left, leaf, right]);
        let subtree: Vec<NodeId> = doc.descendants(left).collect();
        assert_eq!(subtree, vec![leaf]);
        let up: Vec<NodeId> = doc.ancestors(leaf).collect();
        assert_eq!(up, vec![leaf, left, top, root]);
    }

    #[test]
    fn test_text_flag_and_content() {
        assert!(matches!(NodeKind::text(" \n"), NodeKind::Text { blank: true, .. }));
        assert!(matches!(NodeKind::text(" x"), NodeKind::Text { blank: false, .. }));

        let doc = Document::parse_str("<a>one<b>two</b><![CDATA[three]]></a>").unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.text_content(a), "onetwothree");
    }

    #[test]
    fn test_attribute_lookup() {
        let doc =
            Document::parse_str(r#"<a xmlns:p="urn:p" p:x="1" x="2"/>"#).unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.attribute(a, "x"), Some("2"));
        assert_eq!(doc.attribute(a, "p:x"), Some("1"));
        assert_eq!(doc.attribute_ns(a, Some("urn:p"), "x"), Some("1"));
        assert_eq!(doc.attribute_ns(a, None, "x"), Some("2"));
        assert_eq!(doc.attribute(a, "y"), None);
    }

    #[test]
    fn test_structurally_eq_detects_differences() {
        let a = Document::parse_str("<a><b x='1'/>text</a>").unwrap();
        let b = Document::parse_str("<a><b x=\"1\"/>text</a>").unwrap();
        let c = Document::parse_str("<a><b x='2'/>text</a>").unwrap();
        let d = Document::parse_str("<a><b x='1'/>text<c/></a>").unwrap();
        assert!(a.structurally_eq(&b));
        assert!(!a.structurally_eq(&c));
        assert!(!a.structurally_eq(&d));
        assert!(!d.structurally_eq(&a));
    }

    #[test]
    fn test_document_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Document>();
    }
}
