//! Entity declarations and the per-document entity table.
//!
//! The table is seeded with the five predefined entities of XML 1.0 §4.6
//! and extended by `<!ENTITY …>` declarations from the internal subset.
//! General and parameter entities live in separate namespaces.

use std::collections::HashMap;

/// The predefined entities and their replacement characters.
pub const PREDEFINED_ENTITIES: [(&str, &str); 5] = [
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("apos", "'"),
    ("quot", "\""),
];

/// Returns the replacement text of a predefined entity.
#[must_use]
pub fn predefined_entity(name: &str) -> Option<&'static str> {
    PREDEFINED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// What an entity name stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityDefinition {
    /// An internal entity, e.g. `<!ENTITY foo "bar">`.
    Internal {
        /// Replacement text. Character references are already resolved;
        /// general entity references are kept for resolution at use.
        value: String,
        /// The literal as written between the quotes, used for output.
        literal: String,
    },
    /// An external entity, e.g. `<!ENTITY foo SYSTEM "foo.xml">`.
    ///
    /// External entities are never loaded.
    External {
        /// The PUBLIC identifier, if any.
        public_id: Option<String>,
        /// The SYSTEM identifier.
        system_id: String,
        /// The `NDATA` notation of an unparsed entity.
        notation: Option<String>,
    },
}

/// A single `<!ENTITY …>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    /// The entity name.
    pub name: String,
    /// `true` for parameter entities (`<!ENTITY % name …>`).
    pub parameter: bool,
    /// The replacement text or external identifiers.
    pub definition: EntityDefinition,
}

impl EntityDecl {
    /// Returns the replacement text of an internal entity.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match &self.definition {
            EntityDefinition::Internal { value, .. } => Some(value),
            EntityDefinition::External { .. } => None,
        }
    }

    /// Returns `true` if this is an external entity.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self.definition, EntityDefinition::External { .. })
    }

    /// Returns `true` if this is an unparsed (`NDATA`) entity.
    #[must_use]
    pub fn is_unparsed(&self) -> bool {
        matches!(
            self.definition,
            EntityDefinition::External {
                notation: Some(_),
                ..
            }
        )
    }
}

/// Entity name to declaration mapping for one document.
///
/// # Examples
///
/// ```
/// use xmldom::tree::entities::EntityTable;
///
/// let table = EntityTable::new();
/// assert_eq!(table.general_value("amp"), Some("&"));
/// assert!(table.general("foo").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    general: HashMap<String, EntityDecl>,
    parameter: HashMap<String, EntityDecl>,
}

impl EntityTable {
    /// Creates a table holding the predefined entities.
    #[must_use]
    pub fn new() -> Self {
        let mut general = HashMap::new();
        for (name, value) in PREDEFINED_ENTITIES {
            general.insert(
                name.to_string(),
                EntityDecl {
                    name: name.to_string(),
                    parameter: false,
                    definition: EntityDefinition::Internal {
                        value: value.to_string(),
                        literal: value.to_string(),
                    },
                },
            );
        }
        Self {
            general,
            parameter: HashMap::new(),
        }
    }

    /// Records a declaration.
    ///
    /// The first declaration of a name is binding. Returns `false` when
    /// the name was already declared and the new declaration was ignored.
    pub fn declare(&mut self, decl: EntityDecl) -> bool {
        let map = if decl.parameter {
            &mut self.parameter
        } else {
            &mut self.general
        };
        if map.contains_key(&decl.name) {
            return false;
        }
        map.insert(decl.name.clone(), decl);
        true
    }

    /// Looks up a general entity.
    #[must_use]
    pub fn general(&self, name: &str) -> Option<&EntityDecl> {
        self.general.get(name)
    }

    /// Looks up a parameter entity.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&EntityDecl> {
        self.parameter.get(name)
    }

    /// Returns the replacement text of an internal general entity.
    #[must_use]
    pub fn general_value(&self, name: &str) -> Option<&str> {
        self.general(name).and_then(EntityDecl::value)
    }

    /// Number of user-declared entities (both kinds).
    #[must_use]
    pub fn declared_len(&self) -> usize {
        self.general.len() - PREDEFINED_ENTITIES.len() + self.parameter.len()
    }
}
