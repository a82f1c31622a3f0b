//! XML serializer.
//!
//! Serializes a `Document` tree into a well-formed XML string that parses
//! back to a structurally equal tree under the options it was parsed with.

use crate::tree::entities::{EntityDecl, EntityDefinition};
use crate::tree::{Attribute, Document, NodeId, NodeKind};

const INDENT: &str = "  ";

/// Serializes a document to an XML string.
///
/// The XML declaration is always emitted, and every top-level node is
/// followed by a newline. With `format`, elements whose children are only
/// elements, comments and processing instructions are indented by two
/// spaces per level; anything holding character data is written inline.
///
/// # Examples
///
/// ```
/// use xmldom::Document;
/// use xmldom::serial::serialize;
///
/// let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
/// assert_eq!(
///     serialize(&doc, false),
///     "<?xml version=\"1.0\"?>\n<root><child>Hello</child></root>\n"
/// );
/// assert_eq!(
///     serialize(&doc, true),
///     "<?xml version=\"1.0\"?>\n<root>\n  <child>Hello</child>\n</root>\n"
/// );
/// ```
#[must_use]
pub fn serialize(doc: &Document, format: bool) -> String {
    let mut output = String::with_capacity(doc.node_count() * 16);

    let version = doc.version.as_deref().unwrap_or("1.0");
    output.push_str("<?xml version=\"");
    output.push_str(version);
    output.push('"');
    if let Some(encoding) = &doc.encoding {
        output.push_str(" encoding=\"");
        output.push_str(encoding);
        output.push('"');
    }
    if let Some(standalone) = doc.standalone {
        output.push_str(" standalone=\"");
        output.push_str(if standalone { "yes" } else { "no" });
        output.push('"');
    }
    output.push_str("?>\n");

    for child in doc.children(doc.root()) {
        serialize_node(doc, child, &mut output, format, 0);
        output.push('\n');
    }

    output
}

/// Returns `true` if the element has children and none of them carries
/// character data, meaning it's safe to add indentation.
fn is_element_only(doc: &Document, id: NodeId) -> bool {
    doc.first_child(id).is_some()
        && doc.children(id).all(|child| {
            matches!(
                doc.node(child).kind,
                NodeKind::Element { .. }
                    | NodeKind::Comment { .. }
                    | NodeKind::ProcessingInstruction { .. }
            )
        })
}

fn write_indent(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

/// Pending output while walking the tree.
enum Visit {
    Node(NodeId, usize),
    Indent(usize),
    EndTag(NodeId),
}

/// Writes the subtree at `id`. The walk keeps its own stack, so deep trees
/// do not grow the call stack.
fn serialize_node(doc: &Document, id: NodeId, out: &mut String, format: bool, depth: usize) {
    let mut stack = vec![Visit::Node(id, depth)];
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Node(node, depth) => write_node(doc, node, out, format, depth, &mut stack),
            Visit::Indent(depth) => write_indent(out, depth),
            Visit::EndTag(node) => {
                if let NodeKind::Element { name, prefix, .. } = &doc.node(node).kind {
                    out.push_str("</");
                    write_qname(out, prefix.as_deref(), name);
                    out.push('>');
                }
            }
        }
    }
}

/// Writes one node. Element children and the end tag are queued on
/// `stack` rather than written here.
fn write_node(
    doc: &Document,
    id: NodeId,
    out: &mut String,
    format: bool,
    depth: usize,
    stack: &mut Vec<Visit>,
) {
    match &doc.node(id).kind {
        NodeKind::Element {
            name,
            prefix,
            attributes,
            ..
        } => {
            out.push('<');
            write_qname(out, prefix.as_deref(), name);
            for attr in attributes {
                write_attribute(out, attr);
            }

            if doc.first_child(id).is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            let indent = format && is_element_only(doc, id);
            stack.push(Visit::EndTag(id));
            if indent {
                stack.push(Visit::Indent(depth));
            }
            let mut child = doc.last_child(id);
            while let Some(c) = child {
                stack.push(Visit::Node(c, depth + 1));
                if indent {
                    stack.push(Visit::Indent(depth + 1));
                }
                child = doc.prev_sibling(c);
            }
        }
        NodeKind::Text { content, .. } => write_escaped_text(out, content),
        NodeKind::CData { content } => {
            out.push_str("<![CDATA[");
            out.push_str(content);
            out.push_str("]]>");
        }
        NodeKind::Comment { content } => {
            out.push_str("<!--");
            out.push_str(content);
            out.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if let Some(d) = data {
                out.push(' ');
                out.push_str(d);
            }
            out.push_str("?>");
        }
        NodeKind::EntityRef { name } => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
        NodeKind::DocumentType {
            name,
            public_id,
            system_id,
        } => {
            out.push_str("<!DOCTYPE ");
            out.push_str(name);
            write_external_id(out, public_id.as_deref(), system_id.as_deref());
            if doc.first_child(id).is_some() {
                out.push_str(" [\n");
                // Internal subset declarations are leaves.
                for decl in doc.children(id) {
                    write_node(doc, decl, out, false, depth, stack);
                    out.push('\n');
                }
                out.push(']');
            }
            out.push('>');
        }
        NodeKind::EntityDecl(decl) => write_entity_decl(out, decl),
        NodeKind::MarkupDecl { content } => out.push_str(content),
        NodeKind::Document => {}
    }
}

fn write_qname(out: &mut String, prefix: Option<&str>, name: &str) {
    if let Some(pfx) = prefix {
        out.push_str(pfx);
        out.push(':');
    }
    out.push_str(name);
}

/// Writes a literal in whichever quote it does not contain.
fn write_literal(out: &mut String, value: &str) {
    let quote = if value.contains('"') { '\'' } else { '"' };
    out.push(quote);
    out.push_str(value);
    out.push(quote);
}

fn write_external_id(out: &mut String, public_id: Option<&str>, system_id: Option<&str>) {
    match (public_id, system_id) {
        (Some(pub_id), Some(sys_id)) => {
            out.push_str(" PUBLIC ");
            write_literal(out, pub_id);
            out.push(' ');
            write_literal(out, sys_id);
        }
        (None, Some(sys_id)) => {
            out.push_str(" SYSTEM ");
            write_literal(out, sys_id);
        }
        _ => {}
    }
}

fn write_entity_decl(out: &mut String, decl: &EntityDecl) {
    out.push_str("<!ENTITY ");
    if decl.parameter {
        out.push_str("% ");
    }
    out.push_str(&decl.name);
    match &decl.definition {
        EntityDefinition::Internal { literal, .. } => {
            out.push(' ');
            write_literal(out, literal);
        }
        EntityDefinition::External {
            public_id,
            system_id,
            notation,
        } => {
            write_external_id(out, public_id.as_deref(), Some(system_id));
            if let Some(notation) = notation {
                out.push_str(" NDATA ");
                out.push_str(notation);
            }
        }
    }
    out.push('>');
}

fn write_attribute(out: &mut String, attr: &Attribute) {
    out.push(' ');
    write_qname(out, attr.prefix.as_deref(), &attr.name);
    out.push('=');
    out.push(attr.quote);
    write_escaped_attr(out, &attr.value, attr.quote);
    out.push(attr.quote);
}

/// Escapes text content for XML output.
///
/// `<`, `>`, `&` are escaped with named entity references and `\r` is
/// encoded as `&#13;` so that line-ending normalization does not eat it.
fn write_escaped_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

/// Escapes an attribute value for output inside `quote`.
///
/// Whitespace characters other than space are written as character
/// references, which attribute value normalization leaves intact.
fn write_escaped_attr(out: &mut String, value: &str, quote: char) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' if quote == '"' => out.push_str("&quot;"),
            '\'' if quote == '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}
