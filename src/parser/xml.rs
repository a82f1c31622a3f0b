//! Core XML 1.0 parser.
//!
//! A hand-rolled parser for XML 1.0 (Fifth Edition). See
//! <https://www.w3.org/TR/xml/> for the grammar.
//!
//! All state that outlives a single input buffer lives in [`ParseContext`]:
//! the document under construction, namespace scopes, the open elements,
//! the entity stack and the diagnostics. An [`XmlParser`] pairs that
//! context with a cursor.
//!
//! Element content is parsed by a single loop. Open elements live on a
//! stack in the context and entity replacement text on a stack of
//! [`EntityFrame`]s, each read through a short-lived `XmlParser` over the
//! replacement string. Nesting depth is therefore bounded by the limits,
//! never by the size of the call stack.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace};

use crate::error::{ErrorKind, ErrorSeverity, ParseDiagnostic, ParseError, SourceLocation};
use crate::tree::entities::{predefined_entity, EntityDefinition};
use crate::tree::{Attribute, Document, NodeId, NodeKind};
use crate::util::qname::{qname_error, split_qname};

use super::dtd::{AttributeDecl, AttributeDefault};
use super::input::{
    normalize_line_endings, parse_cdata_content, parse_comment_content, parse_pi_content,
    parse_xml_decl, MarkupKind, NamespaceResolver, ParserInput, SavedPosition, XMLNS_NAMESPACE,
    XML_NAMESPACE,
};
use super::options::{Limits, ParseOption, ParseOptions};

/// Text nodes up to this many bytes are interned with `Compact`.
const COMPACT_TEXT_LENGTH: usize = 24;

/// Parses a complete document.
///
/// `decoded_from` names the encoding the text was transcoded from when the
/// caller started with bytes.
pub(crate) fn parse_document(
    text: &str,
    options: &ParseOptions,
    decoded_from: Option<&'static str>,
) -> Result<Document, ParseError> {
    let text = normalize_line_endings(text);
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);

    let mut ctx = ParseContext::new(options, decoded_from);
    let result = XmlParser::new(text, &mut ctx).parse_document();
    ctx.finish(result)
}

// -------------------------------------------------------------------------
// Shared parse state
// -------------------------------------------------------------------------

/// State shared by the top-level parser and the parsers over entity
/// replacement text.
pub(crate) struct ParseContext {
    /// The document being built.
    pub(crate) doc: Document,
    flags: ParseOption,
    pub(crate) limits: Limits,
    ns: NamespaceResolver,
    diagnostics: Vec<ParseDiagnostic>,
    /// Names of the entities currently being expanded.
    pub(crate) entity_stack: Vec<String>,
    /// Number of user entity references expanded so far.
    entity_expansions: u32,
    /// Elements whose end tag has not been seen yet, innermost last.
    open_elements: Vec<OpenElement>,
    /// Character data not yet turned into a text node.
    pending_text: Option<PendingText>,
    /// ATTLIST declarations keyed by element name.
    pub(crate) attlists: HashMap<String, Vec<AttributeDecl>>,
    /// Names from ELEMENT declarations.
    pub(crate) declared_elements: HashSet<String>,
    /// Undeclared entities are warnings rather than errors (the document
    /// has an external subset or parameter entity references).
    pub(crate) lenient_entities: bool,
    /// Root element name from the DOCTYPE.
    pub(crate) doctype_name: Option<String>,
    /// A mismatched end tag is closing open elements until it reaches the
    /// ancestor it names.
    unwinding: bool,
    decoded_from: Option<&'static str>,
}

struct OpenElement {
    node: NodeId,
    qname: String,
}

struct PendingText {
    parent: NodeId,
    text: String,
}

/// Recovery checkpoint of the nesting state.
#[derive(Debug, Clone, Copy)]
struct Mark {
    ns_depth: usize,
    open_elements: usize,
}

impl ParseContext {
    fn new(options: &ParseOptions, decoded_from: Option<&'static str>) -> Self {
        let flags = options.flags;
        let reserved = flags & ParseOption::RESERVED;
        if !reserved.is_empty() {
            debug!("ignoring options without effect on a DOM parse: {reserved}");
        }

        let mut doc = Document::new();
        if flags.contains(ParseOption::NO_DICT) {
            doc.dict = None;
        }
        Self {
            doc,
            flags,
            limits: options.limits(),
            ns: NamespaceResolver::new(),
            diagnostics: Vec::new(),
            entity_stack: Vec::new(),
            entity_expansions: 0,
            open_elements: Vec::new(),
            pending_text: None,
            attlists: HashMap::new(),
            declared_elements: HashSet::new(),
            lenient_entities: false,
            doctype_name: None,
            unwinding: false,
            decoded_from,
        }
    }

    pub(crate) fn has(&self, flag: ParseOption) -> bool {
        self.flags.contains(flag)
    }

    /// Records a diagnostic unless suppressed by `NoError`/`NoWarning`.
    fn report(&mut self, err: &ParseError, severity: ErrorSeverity) {
        let suppressed = match severity {
            ErrorSeverity::Warning => self.has(ParseOption::NO_WARNING),
            ErrorSeverity::Error | ErrorSeverity::Fatal => self.has(ParseOption::NO_ERROR),
        };
        if !suppressed {
            self.diagnostics.push(err.to_diagnostic(severity));
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            ns_depth: self.ns.depth(),
            open_elements: self.open_elements.len(),
        }
    }

    fn reset(&mut self, mark: Mark) {
        self.ns.truncate(mark.ns_depth);
        self.open_elements.truncate(mark.open_elements);
        self.unwinding = false;
    }

    /// Counts one user entity expansion against the limit.
    pub(crate) fn count_expansion(&mut self, loc: SourceLocation) -> Result<(), ParseError> {
        self.entity_expansions += 1;
        if self.entity_expansions > self.limits.max_entity_expansions {
            return Err(error_at(
                ErrorKind::LimitExceeded,
                format!(
                    "entity expansion limit exceeded ({})",
                    self.limits.max_entity_expansions
                ),
                loc,
            ));
        }
        Ok(())
    }

    /// Checks that `name` may be expanded inside the current entity stack.
    pub(crate) fn check_entity_nesting(
        &self,
        name: &str,
        loc: SourceLocation,
    ) -> Result<(), ParseError> {
        if self.entity_stack.iter().any(|n| n == name) {
            return Err(error_at(
                ErrorKind::Entity,
                format!("detected an entity reference loop on '{name}'"),
                loc,
            )
            .with_name(name));
        }
        let depth = u32::try_from(self.entity_stack.len()).unwrap_or(u32::MAX);
        if depth >= self.limits.max_entity_depth {
            return Err(error_at(
                ErrorKind::LimitExceeded,
                format!(
                    "maximum entity nesting depth exceeded ({})",
                    self.limits.max_entity_depth
                ),
                loc,
            )
            .with_name(name));
        }
        Ok(())
    }

    /// Returns a shared handle for `s`: the dictionary's copy, or a fresh
    /// allocation under `NoDict`.
    pub(crate) fn intern(&mut self, s: &str) -> Arc<str> {
        match self.doc.dict.as_mut() {
            Some(dict) => dict.intern(s),
            None => Arc::from(s),
        }
    }

    /// Resolves a prefix (`None` for the default namespace) to an interned
    /// namespace URI.
    fn resolve_namespace(&mut self, prefix: Option<&str>) -> Option<Arc<str>> {
        let uri = self.ns.resolve(prefix)?;
        Some(match self.doc.dict.as_mut() {
            Some(dict) => dict.intern(uri),
            None => Arc::from(uri),
        })
    }

    /// Appends a new node to `parent`, after any buffered text.
    pub(crate) fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        self.flush_text();
        let node = self.doc.create_node(kind);
        self.doc.append_child(parent, node);
        node
    }

    /// Buffers character data for `parent` and returns the length of the
    /// text node it will become.
    fn push_text(&mut self, parent: NodeId, text: &str) -> usize {
        if let Some(pending) = self.pending_text.as_mut().filter(|p| p.parent == parent) {
            pending.text.push_str(text);
            return pending.text.len();
        }
        self.flush_text();
        self.pending_text = Some(PendingText {
            parent,
            text: text.to_string(),
        });
        text.len()
    }

    /// Turns buffered character data into a text node, merged into a text
    /// node that already ends its parent.
    fn flush_text(&mut self) {
        let Some(PendingText { parent, mut text }) = self.pending_text.take() else {
            return;
        };
        let last = self.doc.last_child(parent);
        if let Some(last) = last {
            if let NodeKind::Text { content, .. } = &self.doc.node(last).kind {
                text.insert_str(0, content);
                let kind = self.text_node(text);
                self.doc.node_mut(last).kind = kind;
                return;
            }
        }
        let kind = self.text_node(text);
        let node = self.doc.create_node(kind);
        self.doc.append_child(parent, node);
    }

    /// Builds a text node, interning short content with `Compact`.
    fn text_node(&mut self, text: String) -> NodeKind {
        let compact = self.flags.contains(ParseOption::COMPACT);
        let content: Arc<str> = match self.doc.dict.as_mut() {
            Some(dict) if compact && text.len() <= COMPACT_TEXT_LENGTH => dict.intern(&text),
            _ => Arc::from(text),
        };
        NodeKind::text(content)
    }

    fn finish(mut self, result: Result<(), ParseError>) -> Result<Document, ParseError> {
        match result {
            Ok(()) => {
                self.flush_text();
                let mut doc = self.doc;
                doc.diagnostics = self.diagnostics;
                Ok(doc)
            }
            Err(mut err) => {
                err.diagnostics = self.diagnostics;
                Err(err)
            }
        }
    }
}

/// Creates an error at a known location.
pub(crate) fn error_at(
    kind: ErrorKind,
    message: impl Into<String>,
    location: SourceLocation,
) -> ParseError {
    let mut err = ParseError::new(kind, message);
    err.location = location;
    err
}

/// Replacement text of an internal entity referenced from content.
struct EntityFrame {
    name: String,
    text: String,
    /// Cursor into `text`; `None` before the first step.
    position: Option<SavedPosition>,
    /// Location of the reference, reported for everything inside.
    origin: SourceLocation,
    /// Node receiving the replacement content: an `EntityRef`, or the
    /// referencing element under `NoEnt`.
    target: NodeId,
    /// Number of open elements when the reference was read. Elements
    /// opened inside the replacement text must close inside it.
    scope: usize,
}

/// Outcome of one step of the content loop.
enum Step {
    Continue,
    /// Parse this entity's replacement text next.
    Enter(EntityFrame),
    /// The current input is exhausted.
    End,
}

/// An attribute as written in a start tag, before namespace processing.
struct RawAttribute {
    qname: String,
    value: String,
    quote: char,
    location: SourceLocation,
}

// -------------------------------------------------------------------------
// XmlParser
// -------------------------------------------------------------------------

/// A parser over one input buffer: the document or some entity replacement text.
pub(crate) struct XmlParser<'a, 'c> {
    pub(crate) input: ParserInput<'a>,
    pub(crate) ctx: &'c mut ParseContext,
    /// Parsing entity replacement text rather than the document itself.
    in_entity: bool,
}

impl<'a, 'c> XmlParser<'a, 'c> {
    pub(crate) fn new(text: &'a str, ctx: &'c mut ParseContext) -> Self {
        let mut input = ParserInput::new(text);
        input.set_max_name_length(ctx.limits.max_name_length);
        input.set_big_lines(ctx.has(ParseOption::BIG_LINES));
        Self {
            input,
            ctx,
            in_entity: false,
        }
    }

    /// Creates a parser over entity replacement text referenced at `origin`.
    pub(crate) fn for_entity(
        text: &'a str,
        ctx: &'c mut ParseContext,
        origin: SourceLocation,
    ) -> Self {
        let mut parser = Self::new(text, ctx);
        parser.input.set_origin(origin);
        parser.in_entity = true;
        parser
    }

    // --- Error handling ---

    /// Handles a recoverable error: recorded in recovery mode, returned
    /// otherwise. Limit and encoding errors always abort.
    pub(crate) fn fail(&mut self, err: ParseError) -> Result<(), ParseError> {
        let aborts = matches!(err.kind, ErrorKind::LimitExceeded | ErrorKind::Encoding);
        if aborts || !self.ctx.has(ParseOption::RECOVER) {
            return Err(err);
        }
        debug!("recovering from {} at {}: {}", err.kind, err.location, err.message);
        self.ctx.report(&err, ErrorSeverity::Error);
        Ok(())
    }

    /// Reports a warning, promoted to an error under `Pedantic`.
    pub(crate) fn warn(&mut self, err: ParseError) -> Result<(), ParseError> {
        if self.ctx.has(ParseOption::PEDANTIC) {
            return self.fail(err);
        }
        self.ctx.report(&err, ErrorSeverity::Warning);
        Ok(())
    }

    /// Reports a validity error. These never abort the parse.
    fn validity_error(&mut self, message: String, name: &str) {
        let err = self.input.fatal(ErrorKind::Dtd, message).with_name(name);
        self.ctx.report(&err, ErrorSeverity::Error);
    }

    /// Skips to the next `<` after an error, always making progress.
    fn resync(&mut self, before: usize) {
        if self.input.pos() == before {
            if let Some(c) = self.input.peek_char() {
                self.input.advance_char(c);
            }
        }
        self.input.skip_to(b'<');
        debug!("resynchronized at {}", self.input.location());
    }

    // --- Document ---
    // See XML 1.0 §2.1: [1] document ::= prolog element Misc*

    fn parse_document(&mut self) -> Result<(), ParseError> {
        let root = self.ctx.doc.root();

        if self.input.looking_at(b"<?xml")
            && self
                .input
                .peek_at(5)
                .is_some_and(crate::util::chars::is_whitespace)
        {
            let before = self.input.pos();
            match parse_xml_decl(&mut self.input) {
                Ok(decl) => self.apply_xml_decl(decl)?,
                Err(err) => {
                    self.fail(err)?;
                    self.resync(before);
                }
            }
        }

        let mut seen_doctype = false;
        loop {
            self.input.skip_whitespace();
            let before = self.input.pos();
            // A start tag that failed to parse leaves no root behind, so the
            // next one may still become the root element.
            let has_root = self.ctx.doc.root_element().is_some();
            let step = match self.input.classify() {
                MarkupKind::Eof => break,
                MarkupKind::Comment => self.parse_comment(root),
                MarkupKind::ProcessingInstruction => self.parse_processing_instruction(root),
                MarkupKind::DocType if !has_root && !seen_doctype => {
                    seen_doctype = true;
                    self.parse_doctype()
                }
                MarkupKind::StartTag if !has_root => self.parse_root_element(root),
                _ if has_root => {
                    let err = self
                        .input
                        .fatal(ErrorKind::Structural, "extra content at the end of the document");
                    self.fail(err)?;
                    break;
                }
                MarkupKind::DocType => Err(self
                    .input
                    .fatal(ErrorKind::Structural, "DOCTYPE declaration not allowed here")),
                _ => Err(self
                    .input
                    .fatal(ErrorKind::Structural, "start tag expected, '<' not found")),
            };
            if let Err(err) = step {
                self.fail(err)?;
                self.ctx.reset(Mark {
                    ns_depth: 1,
                    open_elements: 0,
                });
                self.resync(before);
            }
        }

        if self.ctx.doc.root_element().is_none() {
            let err = self.input.fatal(ErrorKind::Structural, "document has no root element");
            self.fail(err)?;
        }
        Ok(())
    }

    fn apply_xml_decl(&mut self, decl: super::input::XmlDeclaration) -> Result<(), ParseError> {
        if decl.version != "1.0" {
            let err = self.input.fatal(
                ErrorKind::Lexical,
                format!("unsupported version '{}', parsing as 1.0", decl.version),
            );
            self.warn(err)?;
        }
        if let Some(label) = &decl.encoding {
            if self.ctx.has(ParseOption::IGNORE_ENC) {
                debug!("ignoring declared encoding '{label}'");
            } else if let Err(e) =
                crate::encoding::check_declared_encoding(label, self.ctx.decoded_from)
            {
                return Err(self.input.fatal(ErrorKind::Encoding, e.message));
            }
        }
        self.ctx.doc.version = Some(decl.version);
        self.ctx.doc.encoding = decl.encoding;
        self.ctx.doc.standalone = decl.standalone;
        Ok(())
    }

    fn parse_root_element(&mut self, root: NodeId) -> Result<(), ParseError> {
        self.parse_start_tag(root)?;
        self.parse_content()
    }

    // --- Elements ---
    // See XML 1.0 §3: [39] element ::= EmptyElemTag | STag content ETag

    /// Parses a start tag and appends the element to `parent`. A non-empty
    /// element is pushed onto the open element stack.
    fn parse_start_tag(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.input.location();
        self.input.advance(1); // '<'

        if !self.input.at_name_start() {
            let message = if self.input.peek() == Some(b'&') {
                "entity reference not allowed as element name"
            } else {
                "invalid element name"
            };
            return Err(self.input.fatal(ErrorKind::Structural, message));
        }
        let qname = self.input.parse_name()?;
        if let Some(problem) = qname_error(&qname) {
            let err = self
                .input
                .fatal(ErrorKind::Namespace, format!("{problem}: '{qname}'"))
                .with_name(qname.as_str());
            self.fail(err)?;
        }

        let depth = u32::try_from(self.ctx.open_elements.len()).unwrap_or(u32::MAX);
        if depth >= self.ctx.limits.max_depth {
            return Err(error_at(
                ErrorKind::LimitExceeded,
                format!("maximum nesting depth exceeded ({})", self.ctx.limits.max_depth),
                start,
            ));
        }

        // -- Attributes --
        let mut raw_attrs: Vec<RawAttribute> = Vec::new();
        let empty = loop {
            let had_ws = self.input.skip_whitespace();
            match self.input.peek() {
                Some(b'>') => {
                    self.input.advance(1);
                    break false;
                }
                Some(b'/') if self.input.looking_at(b"/>") => {
                    self.input.advance(2);
                    break true;
                }
                None => return Err(self.unterminated_start_tag(&qname)),
                Some(_) => match self.parse_attribute(&qname, had_ws) {
                    Ok(attr) => {
                        if raw_attrs.iter().any(|a| a.qname == attr.qname) {
                            let err = error_at(
                                ErrorKind::Attribute,
                                format!("attribute '{}' redefined", attr.qname),
                                attr.location,
                            )
                            .with_name(attr.qname.as_str());
                            self.fail(err)?;
                        } else {
                            raw_attrs.push(attr);
                        }
                    }
                    Err(err) => {
                        // Keep the element and the attributes read so far.
                        self.fail(err)?;
                        match self.skip_start_tag() {
                            Some(empty) => break empty,
                            None => return Err(self.unterminated_start_tag(&qname)),
                        }
                    }
                },
            }
        };

        self.apply_attlist(&qname, &mut raw_attrs);
        if self.ctx.has(ParseOption::DTD_VALID) {
            self.validate_element(&qname, &raw_attrs, parent);
        }

        // -- Namespaces --
        self.ctx.ns.push_scope();
        let attributes = self.resolve_attributes(raw_attrs)?;
        let (prefix, local) = split_qname(&qname);
        let namespace = match prefix {
            Some(p) => {
                let uri = self.ctx.resolve_namespace(Some(p));
                if uri.is_none() {
                    let err = error_at(
                        ErrorKind::Namespace,
                        format!("namespace prefix '{p}' on '{local}' is not defined"),
                        start,
                    )
                    .with_name(qname.as_str());
                    self.fail(err)?;
                }
                uri
            }
            None => self.ctx.resolve_namespace(None),
        };

        let name = self.ctx.intern(local);
        let prefix = prefix.map(|p| self.ctx.intern(p));
        let node = self.ctx.append(
            parent,
            NodeKind::Element {
                name,
                prefix,
                namespace,
                attributes,
            },
        );

        if empty {
            self.ctx.ns.pop_scope();
        } else {
            self.ctx.open_elements.push(OpenElement { node, qname });
        }
        Ok(())
    }

    fn unterminated_start_tag(&self, qname: &str) -> ParseError {
        self.input
            .fatal(
                ErrorKind::Structural,
                format!("couldn't find end of start tag '{qname}'"),
            )
            .with_name(qname)
    }

    /// Skips the rest of a broken start tag. Returns whether it was an
    /// empty-element tag, or `None` if the input ends first.
    fn skip_start_tag(&mut self) -> Option<bool> {
        let start = self.input.pos();
        self.input.skip_to(b'>');
        if self.input.at_end() {
            return None;
        }
        let empty = self.input.slice(start, self.input.pos()).ends_with('/');
        self.input.advance(1);
        debug!("skipped the rest of a start tag, resuming at {}", self.input.location());
        Some(empty)
    }

    /// Closes the innermost open element.
    fn close_element(&mut self) {
        self.ctx.flush_text();
        let Some(element) = self.ctx.open_elements.pop() else {
            return;
        };
        if self.ctx.has(ParseOption::NO_BLANKS) {
            self.strip_blanks(element.node);
        }
        self.ctx.ns.pop_scope();
    }

    /// Parses `Name Eq AttValue` inside the start tag of `element`. See
    /// XML 1.0 §3.1 `[41]`.
    fn parse_attribute(&mut self, element: &str, had_ws: bool) -> Result<RawAttribute, ParseError> {
        match self.input.peek() {
            Some(b'/') => {
                return Err(self.input.fatal(
                    ErrorKind::Structural,
                    format!("expected '>' to close start tag '{element}'"),
                ));
            }
            Some(b'&') => {
                return Err(self.input.fatal(
                    ErrorKind::Attribute,
                    "entity reference not allowed as attribute name",
                ));
            }
            _ if !had_ws || !self.input.at_name_start() => {
                return Err(self.input.fatal(
                    ErrorKind::Attribute,
                    format!("attributes construct error in start tag '{element}'"),
                ));
            }
            _ => {}
        }

        let location = self.input.location();
        let qname = self.input.parse_name()?;
        self.input.skip_whitespace();
        if self.input.peek() != Some(b'=') {
            return Err(self
                .input
                .fatal(
                    ErrorKind::Attribute,
                    format!("specification mandates value for attribute '{qname}'"),
                )
                .with_name(qname));
        }
        self.input.advance(1);
        self.input.skip_whitespace();

        let quote = match self.input.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                return Err(self
                    .input
                    .fatal(
                        ErrorKind::Attribute,
                        format!("value of attribute '{qname}' must be quoted"),
                    )
                    .with_name(qname));
            }
        };
        let value = self.parse_attribute_value()?;
        Ok(RawAttribute {
            qname,
            value,
            quote: char::from(quote),
            location,
        })
    }

    /// Parses a quoted attribute value, expanding references and
    /// normalizing whitespace (XML 1.0 §3.3.3).
    pub(crate) fn parse_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.input.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.input.fatal(ErrorKind::Attribute, "attribute value must be quoted")),
        };
        self.input.advance(1);

        let max = self.ctx.limits.max_attribute_length;
        let mut value = String::new();
        loop {
            match self.input.peek() {
                None => {
                    return Err(self
                        .input
                        .fatal(ErrorKind::Attribute, "unterminated attribute value"));
                }
                Some(b) if b == quote => {
                    self.input.advance(1);
                    break;
                }
                Some(b'<') => {
                    return Err(self.input.fatal(
                        ErrorKind::Attribute,
                        "unescaped '<' not allowed in attribute values",
                    ));
                }
                Some(b'&') if self.input.peek_at(1) == Some(b'#') => {
                    value.push(self.input.parse_char_ref()?);
                }
                Some(b'&') => {
                    let loc = self.input.location();
                    let name = self.input.parse_entity_ref()?;
                    match predefined_entity(&name) {
                        Some(text) => value.push_str(text),
                        None => self.expand_attribute_entity(&name, loc, &mut value, max)?,
                    }
                }
                Some(_) => match self.input.next_char()? {
                    '\t' | '\n' | '\r' => value.push(' '),
                    c => value.push(c),
                },
            }
            if value.len() > max {
                return Err(self.input.fatal(
                    ErrorKind::LimitExceeded,
                    format!("attribute value length exceeds maximum ({max})"),
                ));
            }
        }
        Ok(value)
    }

    /// Expands a user entity inside an attribute value with an explicit
    /// work stack. Quotes in replacement text are literal characters.
    fn expand_attribute_entity(
        &mut self,
        name: &str,
        loc: SourceLocation,
        out: &mut String,
        max: usize,
    ) -> Result<(), ParseError> {
        struct Frame {
            name: String,
            text: String,
            pos: usize,
        }

        let mut stack: Vec<Frame> = Vec::new();
        if let Some(text) = self.attribute_entity_text(name, loc)? {
            stack.push(Frame {
                name: name.to_string(),
                text,
                pos: 0,
            });
        }

        while let Some(frame) = stack.last_mut() {
            let rest = &frame.text[frame.pos..];
            let Some(c) = rest.chars().next() else {
                stack.pop();
                continue;
            };
            match c {
                '&' => {
                    let mut sub = ParserInput::new(rest);
                    sub.set_origin(loc);
                    if rest.as_bytes().get(1) == Some(&b'#') {
                        let ch = sub.parse_char_ref()?;
                        frame.pos += sub.pos();
                        out.push(match ch {
                            '\t' | '\n' | '\r' => ' ',
                            other => other,
                        });
                    } else {
                        let inner = sub.parse_entity_ref()?;
                        frame.pos += sub.pos();
                        if let Some(text) = predefined_entity(&inner) {
                            out.push_str(text);
                        } else {
                            if stack.iter().any(|f| f.name == inner)
                                || self.ctx.entity_stack.iter().any(|n| *n == inner)
                            {
                                return Err(error_at(
                                    ErrorKind::Entity,
                                    format!("detected an entity reference loop on '{inner}'"),
                                    loc,
                                )
                                .with_name(inner));
                            }
                            let depth = u32::try_from(stack.len()).unwrap_or(u32::MAX);
                            if depth >= self.ctx.limits.max_entity_depth {
                                return Err(error_at(
                                    ErrorKind::LimitExceeded,
                                    format!(
                                        "maximum entity nesting depth exceeded ({})",
                                        self.ctx.limits.max_entity_depth
                                    ),
                                    loc,
                                )
                                .with_name(inner));
                            }
                            if let Some(text) = self.attribute_entity_text(&inner, loc)? {
                                stack.push(Frame {
                                    name: inner,
                                    text,
                                    pos: 0,
                                });
                            }
                        }
                    }
                }
                '<' => {
                    return Err(error_at(
                        ErrorKind::Attribute,
                        format!(
                            "'<' in entity '{}' is not allowed in attribute values",
                            frame.name
                        ),
                        loc,
                    )
                    .with_name(frame.name.as_str()));
                }
                '\t' | '\n' | '\r' => {
                    out.push(' ');
                    frame.pos += 1;
                }
                _ => {
                    out.push(c);
                    frame.pos += c.len_utf8();
                }
            }
            if out.len() > max {
                return Err(error_at(
                    ErrorKind::LimitExceeded,
                    format!("attribute value length exceeds maximum ({max})"),
                    loc,
                ));
            }
        }
        Ok(())
    }

    /// Looks up the replacement text of an entity referenced from an
    /// attribute value. `None` means the reference expands to nothing.
    fn attribute_entity_text(
        &mut self,
        name: &str,
        loc: SourceLocation,
    ) -> Result<Option<String>, ParseError> {
        let definition = self
            .ctx
            .doc
            .entities
            .general(name)
            .map(|decl| decl.definition.clone());
        match definition {
            None => {
                self.undeclared_entity(name, loc)?;
                Ok(None)
            }
            Some(EntityDefinition::External { .. }) => Err(error_at(
                ErrorKind::Entity,
                format!("attribute references external entity '{name}'"),
                loc,
            )
            .with_name(name)),
            Some(EntityDefinition::Internal { value, .. }) => {
                self.ctx.count_expansion(loc)?;
                trace!("expanding entity '{name}' in attribute value");
                Ok(Some(value))
            }
        }
    }

    /// Handles a reference to an undeclared entity.
    fn undeclared_entity(&mut self, name: &str, loc: SourceLocation) -> Result<(), ParseError> {
        let err = error_at(
            ErrorKind::Entity,
            format!("entity '{name}' not defined"),
            loc,
        )
        .with_name(name);
        if self.ctx.lenient_entities {
            self.warn(err)
        } else {
            Err(err)
        }
    }

    /// Applies ATTLIST information: tokenized value normalization and, with
    /// `DTDAttr`, defaulted attributes.
    fn apply_attlist(&mut self, qname: &str, raw_attrs: &mut Vec<RawAttribute>) {
        let Some(decls) = self.ctx.attlists.get(qname) else {
            return;
        };
        for attr in raw_attrs.iter_mut() {
            if decls.iter().any(|d| d.tokenized && d.name == attr.qname) {
                attr.value = collapse_whitespace(&attr.value);
            }
        }
        if !self.ctx.has(ParseOption::DTD_ATTR) {
            return;
        }
        let location = self.input.location();
        for decl in decls {
            let default = match &decl.default {
                AttributeDefault::Value(v) | AttributeDefault::Fixed(v) => v,
                AttributeDefault::Required | AttributeDefault::Implied => continue,
            };
            if raw_attrs.iter().any(|a| a.qname == decl.name) {
                continue;
            }
            raw_attrs.push(RawAttribute {
                qname: decl.name.clone(),
                value: default.clone(),
                quote: '"',
                location,
            });
        }
    }

    /// Structural validity checks enabled by `DTDValid`.
    fn validate_element(&mut self, qname: &str, raw_attrs: &[RawAttribute], parent: NodeId) {
        if parent == self.ctx.doc.root() && !self.in_entity {
            match self.ctx.doctype_name.clone() {
                None => self.validity_error("validation failed: no DTD found".to_string(), qname),
                Some(name) if name != qname => self.validity_error(
                    format!("root element name '{qname}' does not match DOCTYPE name '{name}'"),
                    qname,
                ),
                Some(_) => {}
            }
        }
        if !self.ctx.declared_elements.is_empty() && !self.ctx.declared_elements.contains(qname) {
            self.validity_error(format!("no declaration for element '{qname}'"), qname);
        }

        let mut problems = Vec::new();
        if let Some(decls) = self.ctx.attlists.get(qname) {
            for decl in decls {
                let given = raw_attrs.iter().find(|a| a.qname == decl.name);
                match (&decl.default, given) {
                    (AttributeDefault::Required, None) => problems.push(format!(
                        "element '{qname}' does not carry required attribute '{}'",
                        decl.name
                    )),
                    (AttributeDefault::Fixed(v), Some(a)) if a.value != *v => problems.push(
                        format!(
                            "value of attribute '{}' of '{qname}' differs from its #FIXED value",
                            decl.name
                        ),
                    ),
                    _ => {}
                }
            }
        }
        for message in problems {
            self.validity_error(message, qname);
        }
    }


    /// Harvests namespace declarations into the current scope, then
    /// resolves attribute prefixes. Keeps source order.
    fn resolve_attributes(
        &mut self,
        raw_attrs: Vec<RawAttribute>,
    ) -> Result<Vec<Attribute>, ParseError> {
        let mut slots: Vec<Option<Attribute>> = Vec::with_capacity(raw_attrs.len());
        let mut pending: Vec<(usize, RawAttribute)> = Vec::new();

        for raw in raw_attrs {
            if let Some(problem) = qname_error(&raw.qname) {
                let err = error_at(
                    ErrorKind::Namespace,
                    format!("{problem}: '{}'", raw.qname),
                    raw.location,
                )
                .with_name(raw.qname.as_str());
                self.fail(err)?;
            }
            let bound = match split_qname(&raw.qname) {
                (None, "xmlns") => Some(None),
                (Some("xmlns"), p) => Some(Some(p.to_string())),
                _ => None,
            };
            match bound {
                Some(bound) => {
                    let attr = self.declare_namespace(bound, raw)?;
                    slots.push(attr);
                }
                None => {
                    pending.push((slots.len(), raw));
                    slots.push(None);
                }
            }
        }

        let mut seen: Vec<(Arc<str>, Arc<str>)> = Vec::new();
        for (slot, raw) in pending {
            let (prefix, local) = split_qname(&raw.qname);
            let namespace = match prefix {
                Some(p) => {
                    let uri = self.ctx.resolve_namespace(Some(p));
                    if uri.is_none() {
                        let err = error_at(
                            ErrorKind::Namespace,
                            format!("namespace prefix '{p}' for '{local}' is not defined"),
                            raw.location,
                        )
                        .with_name(raw.qname.as_str());
                        self.fail(err)?;
                    }
                    uri
                }
                None => None,
            };
            let name = self.ctx.intern(local);
            if let Some(uri) = &namespace {
                if seen.iter().any(|(u, n)| u == uri && *n == name) {
                    let err = error_at(
                        ErrorKind::Attribute,
                        format!("namespaced attribute '{local}' in '{uri}' redefined"),
                        raw.location,
                    )
                    .with_name(raw.qname.as_str());
                    self.fail(err)?;
                    continue;
                }
                seen.push((Arc::clone(uri), Arc::clone(&name)));
            }
            let prefix = prefix.map(|p| self.ctx.intern(p));
            slots[slot] = Some(Attribute {
                name,
                prefix,
                namespace,
                value: raw.value,
                quote: raw.quote,
            });
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Processes one `xmlns` / `xmlns:p` attribute. Returns the attribute
    /// to keep, or `None` when `Nsclean` drops it.
    fn declare_namespace(
        &mut self,
        bound: Option<String>,
        raw: RawAttribute,
    ) -> Result<Option<Attribute>, ParseError> {
        let uri = raw.value;
        let location = raw.location;
        let problem = match bound.as_deref() {
            Some("xmlns") => Some("redefinition of the xmlns prefix is forbidden"),
            Some("xml") if uri != XML_NAMESPACE => {
                Some("xml namespace prefix mapped to wrong URI")
            }
            Some(p) if p != "xml" && uri == XML_NAMESPACE => {
                Some("xml namespace URI mapped to wrong prefix")
            }
            None if uri == XML_NAMESPACE => Some("xml namespace URI cannot be the default namespace"),
            _ if uri == XMLNS_NAMESPACE => Some("reuse of the xmlns namespace name is forbidden"),
            Some(_) if uri.is_empty() => Some("empty namespace URI is not allowed for a prefix"),
            _ => None,
        };
        if let Some(problem) = problem {
            let err = error_at(ErrorKind::Namespace, format!("{problem}: '{}'", raw.qname), location)
                .with_name(raw.qname.as_str());
            self.fail(err)?;
        }
        if !uri.is_empty() && !is_absolute_uri(&uri) {
            let err = error_at(
                ErrorKind::Namespace,
                format!("namespace URI '{uri}' is not absolute"),
                location,
            )
            .with_name(raw.qname.as_str());
            self.warn(err)?;
        }

        if self.ctx.has(ParseOption::NSCLEAN)
            && self.ctx.ns.resolve(bound.as_deref()).unwrap_or("") == uri
        {
            debug!("nsclean: dropping redundant declaration {}", raw.qname);
            return Ok(None);
        }

        let (prefix, local) = split_qname(&raw.qname);
        let name = self.ctx.intern(local);
        let prefix = prefix.map(|p| self.ctx.intern(p));
        let namespace = Some(self.ctx.intern(XMLNS_NAMESPACE));
        self.ctx.ns.bind(bound, uri.clone());
        Ok(Some(Attribute {
            name,
            prefix,
            namespace,
            value: uri,
            quote: raw.quote,
        }))
    }

    // --- Content ---
    // See XML 1.0 §3.1: [43] content

    /// Parses content until every open element is closed. Replacement
    /// text of entities referenced along the way is read from a stack of
    /// frames, innermost last.
    fn parse_content(&mut self) -> Result<(), ParseError> {
        let mut frames: Vec<EntityFrame> = Vec::new();
        while !self.ctx.open_elements.is_empty() {
            let step = match frames.last_mut() {
                None => self.content_step(0, None)?,
                Some(frame) => {
                    let mut sub = XmlParser::for_entity(&frame.text, &mut *self.ctx, frame.origin);
                    if let Some(saved) = frame.position {
                        sub.input.restore_position(saved);
                    }
                    let step = sub.content_step(frame.scope, Some(frame.target))?;
                    frame.position = Some(sub.input.save_position());
                    step
                }
            };
            match step {
                Step::Continue => {}
                Step::Enter(frame) => {
                    trace!("expanding entity '{}' in content", frame.name);
                    self.ctx.entity_stack.push(frame.name.clone());
                    frames.push(frame);
                }
                Step::End => {
                    if frames.pop().is_none() {
                        break;
                    }
                    self.ctx.entity_stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Parses one content item. Elements opened below `scope` belong to
    /// an enclosing input; `target` receives content when none of this
    /// input's elements is open.
    fn content_step(&mut self, scope: usize, target: Option<NodeId>) -> Result<Step, ParseError> {
        let parent = if self.ctx.open_elements.len() > scope {
            self.ctx.open_elements.last().map(|open| open.node)
        } else {
            target
        };
        let Some(parent) = parent else {
            return Ok(Step::End);
        };

        let mark = self.ctx.mark();
        let before = self.input.pos();
        match self.parse_content_item(parent, scope) {
            Ok(step) => Ok(step),
            Err(err) => {
                self.fail(err)?;
                self.ctx.reset(mark);
                self.resync(before);
                Ok(Step::Continue)
            }
        }
    }

    fn parse_content_item(&mut self, parent: NodeId, scope: usize) -> Result<Step, ParseError> {
        match self.input.classify() {
            MarkupKind::Eof => {
                let unclosed = self
                    .ctx
                    .open_elements
                    .get(scope..)
                    .and_then(|open| open.last())
                    .map(|open| open.qname.clone());
                let Some(name) = unclosed else {
                    return Ok(Step::End);
                };
                let err = self
                    .input
                    .fatal(
                        ErrorKind::Structural,
                        format!("premature end of data in tag '{name}'"),
                    )
                    .with_name(name);
                self.fail(err)?;
                self.close_element();
            }
            MarkupKind::EndTag => self.parse_end_tag(scope)?,
            MarkupKind::StartTag => self.parse_start_tag(parent)?,
            MarkupKind::Comment => self.parse_comment(parent)?,
            MarkupKind::ProcessingInstruction => self.parse_processing_instruction(parent)?,
            MarkupKind::CData => self.parse_cdata(parent)?,
            MarkupKind::CharRef => {
                let c = self.input.parse_char_ref()?;
                let mut buf = [0u8; 4];
                self.append_text(parent, c.encode_utf8(&mut buf))?;
            }
            MarkupKind::EntityRef => {
                if let Some(frame) = self.parse_entity_in_content(parent)? {
                    return Ok(Step::Enter(frame));
                }
            }
            MarkupKind::Text => self.parse_char_data(parent)?,
            MarkupKind::DocType
            | MarkupKind::EntityDecl
            | MarkupKind::ElementDecl
            | MarkupKind::AttlistDecl
            | MarkupKind::NotationDecl
            | MarkupKind::UnknownDecl => {
                return Err(self.input.fatal(
                    ErrorKind::Structural,
                    "markup declaration not allowed in content",
                ));
            }
        }
        Ok(Step::Continue)
    }

    /// Parses `</Name S? >` and closes the matching open element. See
    /// XML 1.0 §3.1 `[42]`.
    fn parse_end_tag(&mut self, scope: usize) -> Result<(), ParseError> {
        let saved = self.input.save_position();
        let location = self.input.location();
        self.input.advance(2);
        if !self.input.at_name_start() {
            return Err(self.input.fatal(ErrorKind::Structural, "invalid end tag name"));
        }
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();
        self.input.expect_byte(b'>', ErrorKind::Structural)?;

        let open_count = self.ctx.open_elements.len();
        if open_count <= scope {
            return Err(error_at(
                ErrorKind::Entity,
                format!("end tag '{name}' not allowed in entity replacement text"),
                location,
            )
            .with_name(name));
        }
        if self.ctx.open_elements[open_count - 1].qname == name {
            self.ctx.unwinding = false;
            self.close_element();
            return Ok(());
        }

        let open = self.ctx.open_elements[open_count - 1].qname.clone();
        let belongs_to_ancestor = self.ctx.open_elements[scope..open_count - 1]
            .iter()
            .any(|e| e.qname == name);
        if !(belongs_to_ancestor && self.ctx.unwinding) {
            let err = error_at(
                ErrorKind::Structural,
                format!("opening and ending tag mismatch: '{open}' and '{name}'"),
                location,
            )
            .with_name(name.as_str());
            self.fail(err)?;
        }
        if belongs_to_ancestor {
            // Close the inner element and leave the tag for the ancestor.
            self.ctx.unwinding = true;
            self.input.restore_position(saved);
            self.close_element();
        }
        Ok(())
    }

    /// Parses character data. See XML 1.0 §2.4 `[14]`.
    fn parse_char_data(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.input.pos();
        loop {
            match self.input.peek() {
                None | Some(b'<' | b'&') => break,
                Some(b']') if self.input.looking_at(b"]]>") => {
                    let text = self.input.slice(start, self.input.pos());
                    self.append_text(parent, text)?;
                    return Err(self.input.fatal(
                        ErrorKind::Lexical,
                        "sequence ']]>' not allowed in content",
                    ));
                }
                Some(_) => {
                    self.input.next_char()?;
                }
            }
        }
        let text = self.input.slice(start, self.input.pos());
        self.append_text(parent, text)
    }

    /// Appends character data, merging with adjacent text.
    fn append_text(&mut self, parent: NodeId, text: &str) -> Result<(), ParseError> {
        if text.is_empty() {
            return Ok(());
        }
        let max = self.ctx.limits.max_text_length;
        if self.ctx.push_text(parent, text) > max {
            return Err(self.input.fatal(
                ErrorKind::LimitExceeded,
                format!("text node length exceeds maximum ({max})"),
            ));
        }
        Ok(())
    }

    /// Removes whitespace-only text children of an element that has
    /// element children and no other character data.
    fn strip_blanks(&mut self, element: NodeId) {
        let doc = &self.ctx.doc;
        let children: Vec<NodeId> = doc.children(element).collect();
        let has_element = children.iter().any(|&c| doc.node(c).kind.is_element());
        let has_data = children.iter().any(|&c| {
            matches!(
                doc.node(c).kind,
                NodeKind::Text { blank: false, .. } | NodeKind::CData { .. } | NodeKind::EntityRef { .. }
            )
        });
        if !has_element || has_data {
            return;
        }
        for child in children {
            if matches!(self.ctx.doc.node(child).kind, NodeKind::Text { blank: true, .. }) {
                self.ctx.doc.detach(child);
            }
        }
    }

    // --- References in content ---
    // See XML 1.0 §4.4.2 (included) and §4.4.3 (included if validating)

    /// Handles a general entity reference in content. Returns the frame
    /// to parse next for an internal entity.
    fn parse_entity_in_content(
        &mut self,
        parent: NodeId,
    ) -> Result<Option<EntityFrame>, ParseError> {
        let loc = self.input.location();
        let name = self.input.parse_entity_ref()?;
        if let Some(text) = predefined_entity(&name) {
            self.append_text(parent, text)?;
            return Ok(None);
        }

        let definition = self
            .ctx
            .doc
            .entities
            .general(&name)
            .map(|decl| decl.definition.clone());
        match definition {
            None => {
                self.undeclared_entity(&name, loc)?;
                if !self.ctx.has(ParseOption::NO_ENT) {
                    self.append_entity_ref(parent, &name);
                }
                Ok(None)
            }
            Some(EntityDefinition::External {
                notation: Some(_), ..
            }) => Err(error_at(
                ErrorKind::Entity,
                format!("reference to unparsed entity '{name}'"),
                loc,
            )
            .with_name(name)),
            Some(EntityDefinition::External { .. }) => {
                if self.ctx.has(ParseOption::NO_ENT) {
                    let err = error_at(
                        ErrorKind::Entity,
                        format!("external entity '{name}' not loaded"),
                        loc,
                    )
                    .with_name(name);
                    self.warn(err)?;
                } else {
                    self.append_entity_ref(parent, &name);
                }
                Ok(None)
            }
            Some(EntityDefinition::Internal { value, .. }) => {
                self.ctx.count_expansion(loc)?;
                self.ctx.check_entity_nesting(&name, loc)?;
                // With `NoEnt` the replacement content lands in place.
                let target = if self.ctx.has(ParseOption::NO_ENT) {
                    parent
                } else {
                    self.append_entity_ref(parent, &name)
                };
                Ok(Some(EntityFrame {
                    name,
                    text: value,
                    position: None,
                    origin: loc,
                    target,
                    scope: self.ctx.open_elements.len(),
                }))
            }
        }
    }

    fn append_entity_ref(&mut self, parent: NodeId, name: &str) -> NodeId {
        let name = self.ctx.intern(name);
        self.ctx.append(parent, NodeKind::EntityRef { name })
    }

    // --- Other content ---

    pub(crate) fn parse_comment(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let content = parse_comment_content(&mut self.input)?.to_string();
        self.ctx.append(parent, NodeKind::Comment { content });
        Ok(())
    }

    fn parse_cdata(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let content = parse_cdata_content(&mut self.input)?;
        if self.ctx.has(ParseOption::NO_CDATA) {
            return self.append_text(parent, content);
        }
        if content.len() > self.ctx.limits.max_text_length {
            return Err(self.input.fatal(
                ErrorKind::LimitExceeded,
                format!(
                    "CDATA section length exceeds maximum ({})",
                    self.ctx.limits.max_text_length
                ),
            ));
        }
        self.ctx.append(
            parent,
            NodeKind::CData {
                content: content.to_string(),
            },
        );
        Ok(())
    }

    pub(crate) fn parse_processing_instruction(
        &mut self,
        parent: NodeId,
    ) -> Result<(), ParseError> {
        let (target, data) = parse_pi_content(&mut self.input)?;
        let target = self.ctx.intern(&target);
        self.ctx
            .append(parent, NodeKind::ProcessingInstruction { target, data });
        Ok(())
    }
}

/// Collapses runs of spaces and trims, for tokenized attribute types
/// (XML 1.0 §3.3.3).
pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Returns `true` if `uri` starts with a URI scheme (RFC 3986 §3.1).
fn is_absolute_uri(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut bytes = scheme.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}
