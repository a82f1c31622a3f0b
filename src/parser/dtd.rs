//! Document type declaration and internal subset parsing.
//!
//! Entity declarations feed the document's entity table. ELEMENT and
//! ATTLIST declarations are recorded for attribute defaulting and the
//! structural checks of `DTDValid`, and every declaration is kept as a
//! child of the `DocumentType` node so the subset can be written back.
//! External subsets are never loaded.
//!
//! See XML 1.0 §2.8 for the grammar.

use log::{debug, trace};

use crate::error::{ErrorKind, ParseError, SourceLocation};
use crate::tree::entities::{predefined_entity, EntityDecl, EntityDefinition};
use crate::tree::{NodeId, NodeKind};

use super::input::{MarkupKind, SavedPosition};
use super::options::ParseOption;
use super::xml::{collapse_whitespace, error_at, XmlParser};

/// Declared type of an attribute. See XML 1.0 §3.3.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation,
    Enumeration,
}

impl AttributeType {
    /// Every type but CDATA gets tokenized value normalization.
    fn is_tokenized(&self) -> bool {
        *self != Self::CData
    }
}

/// Default declaration of an attribute. See XML 1.0 §3.3.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeDefault {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

/// One attribute definition from an `<!ATTLIST …>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeDecl {
    pub name: String,
    pub tokenized: bool,
    pub default: AttributeDefault,
}

/// Replacement text of a parameter entity referenced between
/// declarations.
struct SubsetFrame {
    name: String,
    text: String,
    position: Option<SavedPosition>,
    origin: SourceLocation,
    /// Last child of the DOCTYPE node before the expansion.
    last: Option<NodeId>,
}

enum SubsetStep {
    Continue,
    Enter(SubsetFrame),
    End,
}

impl XmlParser<'_, '_> {
    // --- DOCTYPE ---
    // See XML 1.0 §2.8: [28] doctypedecl

    pub(crate) fn parse_doctype(&mut self) -> Result<(), ParseError> {
        self.input.expect_str(b"<!DOCTYPE", ErrorKind::Dtd)?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        let name = self.input.parse_name()?;

        let had_ws = self.input.skip_whitespace();
        let (public_id, system_id) =
            if had_ws && (self.input.looking_at(b"SYSTEM") || self.input.looking_at(b"PUBLIC")) {
                let (public_id, system_id) = self.parse_external_id()?;
                self.input.skip_whitespace();
                (public_id, Some(system_id))
            } else {
                (None, None)
            };

        let root = self.ctx.doc.root();
        let doctype = self.ctx.append(
            root,
            NodeKind::DocumentType {
                name: name.clone(),
                public_id,
                system_id: system_id.clone(),
            },
        );
        self.ctx.doctype_name = Some(name);

        if let Some(system_id) = system_id {
            self.ctx.lenient_entities = true;
            if self.ctx.has(ParseOption::DTD_LOAD) {
                let err = self.input.fatal(
                    ErrorKind::Dtd,
                    format!("external subset '{system_id}' not loaded"),
                );
                self.warn(err)?;
            }
        }

        if self.input.peek() == Some(b'[') {
            self.input.advance(1);
            self.parse_internal_subset(doctype)?;
            self.input.skip_whitespace();
        }
        self.input.expect_byte(b'>', ErrorKind::Dtd)
    }

    /// Parses `SYSTEM "sys"` or `PUBLIC "pub" "sys"`.
    fn parse_external_id(&mut self) -> Result<(Option<String>, String), ParseError> {
        if self.input.looking_at(b"SYSTEM") {
            self.input.advance(6);
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            let system_id = self.input.parse_quoted_value(ErrorKind::Dtd)?;
            Ok((None, system_id.to_string()))
        } else if self.input.looking_at(b"PUBLIC") {
            self.input.advance(6);
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            let public_id = self.input.parse_pubid_literal()?.to_string();
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            let system_id = self.input.parse_quoted_value(ErrorKind::Dtd)?;
            Ok((Some(public_id), system_id.to_string()))
        } else {
            Err(self
                .input
                .fatal(ErrorKind::Dtd, "expected 'SYSTEM' or 'PUBLIC'"))
        }
    }

    // --- Internal subset ---
    // See XML 1.0 §2.8: [28b] intSubset

    /// Parses declarations into `parent` up to the closing `]`.
    /// Parameter entities referenced between declarations are expanded
    /// from a stack of frames, innermost last.
    fn parse_internal_subset(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let mut frames: Vec<SubsetFrame> = Vec::new();
        loop {
            let step = match frames.last_mut() {
                None => self.subset_step(parent, false)?,
                Some(frame) => {
                    let mut sub = XmlParser::for_entity(&frame.text, &mut *self.ctx, frame.origin);
                    if let Some(saved) = frame.position {
                        sub.input.restore_position(saved);
                    }
                    let step = sub.subset_step(parent, true)?;
                    frame.position = Some(sub.input.save_position());
                    step
                }
            };
            match step {
                SubsetStep::Continue => {}
                SubsetStep::Enter(frame) => {
                    self.ctx.entity_stack.push(format!("%{}", frame.name));
                    frames.push(frame);
                }
                SubsetStep::End => {
                    let Some(frame) = frames.pop() else {
                        return Ok(());
                    };
                    self.ctx.entity_stack.pop();
                    self.collapse_pe_expansion(parent, &frame);
                }
            }
        }
    }

    /// Parses one declaration. `nested` is set for parameter entity
    /// replacement text, which ends at end of input instead of `]`.
    fn subset_step(&mut self, parent: NodeId, nested: bool) -> Result<SubsetStep, ParseError> {
        self.input.skip_whitespace();
        let before = self.input.pos();
        let result = match self.input.peek() {
            None if nested => return Ok(SubsetStep::End),
            None => {
                return Err(self
                    .input
                    .fatal(ErrorKind::Dtd, "internal subset not terminated"));
            }
            Some(b']') if !nested => {
                self.input.advance(1);
                return Ok(SubsetStep::End);
            }
            Some(b'%') => match self.parse_pe_in_subset(parent) {
                Ok(Some(frame)) => return Ok(SubsetStep::Enter(frame)),
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            },
            Some(b'<') => match self.input.classify() {
                MarkupKind::EntityDecl => self.parse_entity_decl(parent),
                MarkupKind::ElementDecl => self.parse_element_decl(parent),
                MarkupKind::AttlistDecl => self.parse_attlist_decl(parent),
                MarkupKind::NotationDecl => self.parse_notation_decl(parent),
                MarkupKind::Comment => self.parse_comment(parent),
                MarkupKind::ProcessingInstruction => self.parse_processing_instruction(parent),
                _ => Err(self
                    .input
                    .fatal(ErrorKind::Dtd, "markup declaration expected")),
            },
            Some(_) => Err(self
                .input
                .fatal(ErrorKind::Dtd, "markup declaration expected")),
        };
        if let Err(err) = result {
            self.fail(err)?;
            self.resync_subset(before);
        }
        Ok(SubsetStep::Continue)
    }

    /// Skips to the start of the next declaration or the end of the subset.
    fn resync_subset(&mut self, before: usize) {
        if self.input.pos() == before {
            if let Some(c) = self.input.peek_char() {
                self.input.advance_char(c);
            }
        }
        while let Some(b) = self.input.peek() {
            if matches!(b, b'<' | b']' | b'%') {
                break;
            }
            match self.input.peek_char() {
                Some(c) => self.input.advance_char(c),
                None => break,
            }
        }
    }

    /// Handles `%name;` between declarations. An internal entity comes
    /// back as a frame whose declarations are parsed next; the tree keeps
    /// only the reference.
    fn parse_pe_in_subset(&mut self, parent: NodeId) -> Result<Option<SubsetFrame>, ParseError> {
        let loc = self.input.location();
        let name = self.input.parse_pe_ref()?;
        self.ctx.lenient_entities = true;

        let definition = self
            .ctx
            .doc
            .entities
            .parameter(&name)
            .map(|decl| decl.definition.clone());
        match definition {
            None => {
                let err = error_at(
                    ErrorKind::Entity,
                    format!("PEReference: %{name}; not found"),
                    loc,
                )
                .with_name(name.as_str());
                self.warn(err)?;
            }
            Some(EntityDefinition::External { system_id, .. }) => {
                debug!("external parameter entity %{name}; ({system_id}) not loaded");
            }
            Some(EntityDefinition::Internal { value, .. }) => {
                self.ctx.count_expansion(loc)?;
                self.ctx.check_entity_nesting(&format!("%{name}"), loc)?;
                trace!("expanding parameter entity %{name};");
                return Ok(Some(SubsetFrame {
                    last: self.ctx.doc.last_child(parent),
                    name,
                    text: value,
                    position: None,
                    origin: loc,
                }));
            }
        }

        self.ctx.append(
            parent,
            NodeKind::MarkupDecl {
                content: format!("%{name};"),
            },
        );
        Ok(None)
    }

    /// Replaces the declarations a finished expansion added to `parent`
    /// with the `%name;` reference.
    fn collapse_pe_expansion(&mut self, parent: NodeId, frame: &SubsetFrame) {
        let mut next = match frame.last {
            Some(last) => self.ctx.doc.next_sibling(last),
            None => self.ctx.doc.first_child(parent),
        };
        while let Some(id) = next {
            next = self.ctx.doc.next_sibling(id);
            self.ctx.doc.detach(id);
        }
        self.ctx.append(
            parent,
            NodeKind::MarkupDecl {
                content: format!("%{};", frame.name),
            },
        );
    }

    // --- ENTITY declaration ---
    // See XML 1.0 §4.2: [70] EntityDecl

    fn parse_entity_decl(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let loc = self.input.location();
        self.input.expect_str(b"<!ENTITY", ErrorKind::Dtd)?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;

        let parameter = self.input.peek() == Some(b'%');
        if parameter {
            self.input.advance(1);
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        }
        let name = self.input.parse_name()?;
        // Namespaces in XML 1.0: entity names must be NCNames.
        if name.contains(':') {
            let err = self
                .input
                .fatal(
                    ErrorKind::Namespace,
                    format!("colons are forbidden from entity names '{name}'"),
                )
                .with_name(name.as_str());
            self.fail(err)?;
        }
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;

        let definition = if matches!(self.input.peek(), Some(b'"' | b'\'')) {
            let (value, literal) = self.parse_entity_value()?;
            EntityDefinition::Internal { value, literal }
        } else {
            let (public_id, system_id) = self.parse_external_id()?;
            let had_ws = self.input.skip_whitespace();
            let notation = if self.input.looking_at(b"NDATA") {
                if parameter {
                    return Err(self.input.fatal(
                        ErrorKind::Dtd,
                        "NDATA annotation is not allowed on parameter entities",
                    ));
                }
                if !had_ws {
                    return Err(self
                        .input
                        .fatal(ErrorKind::Dtd, "whitespace required before NDATA"));
                }
                self.input.advance(5);
                self.input.skip_whitespace_required(ErrorKind::Dtd)?;
                Some(self.input.parse_name()?)
            } else {
                None
            };
            EntityDefinition::External {
                public_id,
                system_id,
                notation,
            }
        };

        self.input.skip_whitespace();
        self.input.expect_byte(b'>', ErrorKind::Dtd)?;

        let decl = EntityDecl {
            name,
            parameter,
            definition,
        };
        // The first declaration is binding (XML 1.0 §4.2).
        if !self.ctx.doc.entities.declare(decl.clone())
            && (parameter || predefined_entity(&decl.name).is_none())
        {
            let err = error_at(
                ErrorKind::Entity,
                format!("entity '{}' already defined", decl.name),
                loc,
            )
            .with_name(decl.name.as_str());
            self.warn(err)?;
        }

        self.ctx.append(parent, NodeKind::EntityDecl(decl));
        Ok(())
    }

    /// Parses an `EntityValue` (production `[9]`), returning the
    /// replacement text and the literal as written.
    ///
    /// Character references are resolved here; general entity references
    /// are kept and resolved where the entity is used.
    fn parse_entity_value(&mut self) -> Result<(String, String), ParseError> {
        let quote = self.input.peek();
        self.input.advance(1);
        let start = self.input.pos();
        let mut value = String::new();
        loop {
            match self.input.peek() {
                None => {
                    return Err(self
                        .input
                        .fatal(ErrorKind::Dtd, "entity value not terminated"));
                }
                b if b == quote => break,
                Some(b'%') => {
                    return Err(self.input.fatal(
                        ErrorKind::Dtd,
                        "parameter entity references are forbidden in internal subset markup",
                    ));
                }
                Some(b'&') if self.input.peek_at(1) == Some(b'#') => {
                    value.push(self.input.parse_char_ref()?);
                }
                Some(b'&') => {
                    let ref_start = self.input.pos();
                    self.input.parse_entity_ref()?;
                    value.push_str(self.input.slice(ref_start, self.input.pos()));
                }
                Some(_) => value.push(self.input.next_char()?),
            }
        }
        let literal = self.input.slice(start, self.input.pos()).to_string();
        self.input.advance(1);
        Ok((value, literal))
    }

    // --- ELEMENT and NOTATION declarations ---
    // See XML 1.0 §3.2: [45] elementdecl and §4.7: [82] NotationDecl

    fn parse_element_decl(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.input.pos();
        self.input.expect_str(b"<!ELEMENT", ErrorKind::Dtd)?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        self.finish_verbatim_decl(parent, start)?;
        self.ctx.declared_elements.insert(name);
        Ok(())
    }

    fn parse_notation_decl(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.input.pos();
        self.input.expect_str(b"<!NOTATION", ErrorKind::Dtd)?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        let name = self.input.parse_name()?;
        if name.contains(':') {
            let err = self
                .input
                .fatal(
                    ErrorKind::Namespace,
                    format!("colons are forbidden from notation names '{name}'"),
                )
                .with_name(name);
            self.fail(err)?;
        }
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        self.finish_verbatim_decl(parent, start)
    }

    /// Consumes the rest of a declaration up to its closing `>`, skipping
    /// quoted literals, and keeps the text from `start` as a node.
    fn finish_verbatim_decl(&mut self, parent: NodeId, start: usize) -> Result<(), ParseError> {
        let mut quote = None;
        loop {
            match (self.input.peek(), quote) {
                (None, _) => {
                    return Err(self
                        .input
                        .fatal(ErrorKind::Dtd, "markup declaration not terminated"));
                }
                (Some(b), Some(q)) if b == q => {
                    quote = None;
                    self.input.advance(1);
                }
                (Some(b @ (b'"' | b'\'')), None) => {
                    quote = Some(b);
                    self.input.advance(1);
                }
                (Some(b'>'), None) => {
                    self.input.advance(1);
                    break;
                }
                _ => {
                    self.input.next_char()?;
                }
            }
        }
        let content = self.input.slice(start, self.input.pos()).to_string();
        self.ctx.append(parent, NodeKind::MarkupDecl { content });
        Ok(())
    }

    // --- ATTLIST declaration ---
    // See XML 1.0 §3.3: [52] AttlistDecl

    fn parse_attlist_decl(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.input.pos();
        self.input.expect_str(b"<!ATTLIST", ErrorKind::Dtd)?;
        self.input.skip_whitespace_required(ErrorKind::Dtd)?;
        let element_name = self.input.parse_name()?;

        let mut decls = Vec::new();
        loop {
            let had_ws = self.input.skip_whitespace();
            if self.input.peek() == Some(b'>') {
                self.input.advance(1);
                break;
            }
            if !had_ws {
                return Err(self
                    .input
                    .fatal(ErrorKind::Dtd, "whitespace required in ATTLIST declaration"));
            }

            let name = self.input.parse_name()?;
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            let attribute_type = self.parse_attribute_type()?;
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            let tokenized = attribute_type.is_tokenized();
            let default = match self.parse_attribute_default()? {
                AttributeDefault::Fixed(v) if tokenized => {
                    AttributeDefault::Fixed(collapse_whitespace(&v))
                }
                AttributeDefault::Value(v) if tokenized => {
                    AttributeDefault::Value(collapse_whitespace(&v))
                }
                other => other,
            };
            decls.push(AttributeDecl {
                name,
                tokenized,
                default,
            });
        }

        let content = self.input.slice(start, self.input.pos()).to_string();
        self.ctx.append(parent, NodeKind::MarkupDecl { content });

        // The first definition of an attribute is binding (XML 1.0 §3.3).
        let known = self.ctx.attlists.entry(element_name).or_default();
        for decl in decls {
            if !known.iter().any(|k| k.name == decl.name) {
                known.push(decl);
            }
        }
        Ok(())
    }

    fn parse_attribute_type(&mut self) -> Result<AttributeType, ParseError> {
        const KEYWORDS: [(&[u8], AttributeType); 8] = [
            (b"CDATA", AttributeType::CData),
            (b"IDREFS", AttributeType::IdRefs),
            (b"IDREF", AttributeType::IdRef),
            (b"ID", AttributeType::Id),
            (b"ENTITIES", AttributeType::Entities),
            (b"ENTITY", AttributeType::Entity),
            (b"NMTOKENS", AttributeType::NmTokens),
            (b"NMTOKEN", AttributeType::NmToken),
        ];

        for (keyword, attribute_type) in KEYWORDS {
            if self.input.looking_at(keyword) {
                self.input.advance(keyword.len());
                return Ok(attribute_type);
            }
        }
        if self.input.looking_at(b"NOTATION") {
            self.input.advance(8);
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            self.skip_enumeration()?;
            Ok(AttributeType::Notation)
        } else if self.input.peek() == Some(b'(') {
            self.skip_enumeration()?;
            Ok(AttributeType::Enumeration)
        } else {
            Err(self.input.fatal(ErrorKind::Dtd, "attribute type expected"))
        }
    }

    /// Skips `( a | b | c )`.
    fn skip_enumeration(&mut self) -> Result<(), ParseError> {
        self.input.expect_byte(b'(', ErrorKind::Dtd)?;
        loop {
            match self.input.peek() {
                None => {
                    return Err(self
                        .input
                        .fatal(ErrorKind::Dtd, "enumeration not terminated"));
                }
                Some(b')') => {
                    self.input.advance(1);
                    return Ok(());
                }
                Some(b'>' | b'"' | b'\'' | b'<') => {
                    return Err(self.input.fatal(ErrorKind::Dtd, "expected ')' in enumeration"));
                }
                Some(_) => {
                    self.input.next_char()?;
                }
            }
        }
    }

    fn parse_attribute_default(&mut self) -> Result<AttributeDefault, ParseError> {
        if self.input.looking_at(b"#REQUIRED") {
            self.input.advance(9);
            Ok(AttributeDefault::Required)
        } else if self.input.looking_at(b"#IMPLIED") {
            self.input.advance(8);
            Ok(AttributeDefault::Implied)
        } else if self.input.looking_at(b"#FIXED") {
            self.input.advance(6);
            self.input.skip_whitespace_required(ErrorKind::Dtd)?;
            Ok(AttributeDefault::Fixed(self.parse_attribute_value()?))
        } else {
            Ok(AttributeDefault::Value(self.parse_attribute_value()?))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::error::{ErrorKind, ErrorSeverity};
    use crate::parser::{parse_str, parse_str_with_options, ParseOption, ParseOptions};
    use crate::tree::entities::EntityDefinition;
    use crate::tree::NodeKind;
    use pretty_assertions::assert_eq;

    fn with(input: &str, flags: ParseOption) -> crate::tree::Document {
        parse_str_with_options(input, &ParseOptions::from(flags)).unwrap()
    }

    #[test]
    fn test_doctype_identifiers() {
        let doc = parse_str(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "xhtml1-strict.dtd"><html/>"#,
        )
        .unwrap();
        let doctype = doc.doctype().unwrap();
        assert_eq!(
            doc.node(doctype).kind,
            NodeKind::DocumentType {
                name: "html".into(),
                public_id: Some("-//W3C//DTD XHTML 1.0 Strict//EN".into()),
                system_id: Some("xhtml1-strict.dtd".into()),
            }
        );
    }

    #[test]
    fn test_subset_declarations_are_kept_in_order() {
        let doc = parse_str(
            "<!DOCTYPE a [\n<!ELEMENT a (#PCDATA)>\n<!-- c -->\n<!ATTLIST a x CDATA #IMPLIED>\n<!ENTITY e \"v\">\n<!NOTATION n SYSTEM \"n\">\n]><a/>",
        )
        .unwrap();
        let doctype = doc.doctype().unwrap();
        let kinds: Vec<_> = doc.children(doctype).map(|c| doc.node(c).kind.clone()).collect();
        assert_eq!(kinds.len(), 5);
        assert_eq!(
            kinds[0],
            NodeKind::MarkupDecl {
                content: "<!ELEMENT a (#PCDATA)>".into()
            }
        );
        assert_eq!(kinds[1], NodeKind::Comment { content: " c ".into() });
        assert!(matches!(kinds[3], NodeKind::EntityDecl(_)));
        assert_eq!(
            kinds[4],
            NodeKind::MarkupDecl {
                content: "<!NOTATION n SYSTEM \"n\">".into()
            }
        );
    }

    #[test]
    fn test_entity_value_keeps_literal() {
        let doc = parse_str("<!DOCTYPE a [<!ENTITY e \"x&#65;&amp;y\">]><a/>").unwrap();
        let decl = doc.entities().general("e").unwrap();
        assert_eq!(
            decl.definition,
            EntityDefinition::Internal {
                value: "xA&amp;y".into(),
                literal: "x&#65;&amp;y".into(),
            }
        );
    }

    #[test]
    fn test_redeclared_entity_warns() {
        let doc = parse_str("<!DOCTYPE a [<!ENTITY e \"1\"><!ENTITY e \"2\">]><a>&e;</a>").unwrap();
        assert_eq!(doc.text_content(doc.root_element().unwrap()), "1");
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].severity, ErrorSeverity::Warning);
    }

    #[test]
    fn test_unparsed_entity_reference_is_error() {
        let err = parse_str(
            "<!DOCTYPE a [<!NOTATION png SYSTEM \"png\"><!ENTITY pic SYSTEM \"p.png\" NDATA png>]><a>&pic;</a>",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);

        let err = parse_str("<!DOCTYPE a [<!ENTITY % p SYSTEM \"p\" NDATA n>]><a/>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dtd);
    }

    #[test]
    fn test_parameter_entity_declares_entities() {
        let doc = parse_str(
            "<!DOCTYPE a [<!ENTITY % decls \"<!ENTITY e 'inner'>\">%decls;]><a>&e;</a>",
        )
        .unwrap();
        assert_eq!(doc.text_content(doc.root_element().unwrap()), "inner");
        let doctype = doc.doctype().unwrap();
        let last = doc.last_child(doctype).unwrap();
        assert_eq!(
            doc.node(last).kind,
            NodeKind::MarkupDecl {
                content: "%decls;".into()
            }
        );
        assert_eq!(doc.children(doctype).count(), 2);
    }

    #[test]
    fn test_undeclared_entity_is_lenient_with_external_subset() {
        let doc = parse_str("<!DOCTYPE a SYSTEM \"a.dtd\"><a>&undeclared;</a>").unwrap();
        let a = doc.root_element().unwrap();
        let r = doc.first_child(a).unwrap();
        assert_eq!(doc.node_name(r), Some("undeclared"));
        assert_eq!(doc.diagnostics[0].kind, ErrorKind::Entity);

        let err = parse_str("<a>&undeclared;</a>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);
    }

    #[test]
    fn test_dtd_attr_defaults() {
        let input = "<!DOCTYPE a [<!ATTLIST a x CDATA 'dx' y NMTOKENS '  p   q ' z CDATA #IMPLIED>]><a x='given'/>";
        let doc = with(input, ParseOption::DTD_ATTR);
        let a = doc.root_element().unwrap();
        assert_eq!(doc.attribute(a, "x"), Some("given"));
        assert_eq!(doc.attribute(a, "y"), Some("p q"));
        assert_eq!(doc.attribute(a, "z"), None);

        let doc = parse_str(input).unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.attributes(a).len(), 1);
    }

    #[test]
    fn test_tokenized_attribute_normalization() {
        let doc = parse_str("<!DOCTYPE a [<!ATTLIST a id ID #IMPLIED>]><a id='  x  '/>").unwrap();
        let a = doc.root_element().unwrap();
        assert_eq!(doc.attribute(a, "id"), Some("x"));
    }

    #[test]
    fn test_dtd_valid_reports_without_failing() {
        let input = "<!DOCTYPE a [<!ELEMENT a ANY><!ATTLIST a r CDATA #REQUIRED f CDATA #FIXED 'v'>]><a f='w'><b/></a>";
        let doc = with(input, ParseOption::DTD_VALID);
        let errors: Vec<_> = doc
            .diagnostics
            .iter()
            .filter(|d| d.kind == ErrorKind::Dtd)
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|d| d.severity == ErrorSeverity::Error));

        let doc = with("<a/>", ParseOption::DTD_VALID);
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[test]
    fn test_dtd_load_warns() {
        let doc = with("<!DOCTYPE a SYSTEM \"a.dtd\"><a/>", ParseOption::DTD_LOAD);
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].kind, ErrorKind::Dtd);
    }

    #[test]
    fn test_unterminated_subset() {
        let err = parse_str("<!DOCTYPE a [<!ENTITY e 'v'>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dtd);
    }

    #[test]
    fn test_parameter_reference_in_entity_value() {
        let err = parse_str("<!DOCTYPE a [<!ENTITY % q \"x\"><!ENTITY % p \"%q;\">]><a/>")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Dtd);
    }

    #[test]
    fn test_parameter_entity_loop() {
        let err = parse_str("<!DOCTYPE a [<!ENTITY % p \"&#37;p;\">%p;]><a/>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Entity);
    }
}
