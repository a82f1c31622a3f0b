//! Parser option flags and limits.
//!
//! [`ParseOption`] is the libxml2-compatible flag set: each flag occupies a
//! fixed bit position and has a canonical name. [`ParseOptions`] bundles a
//! flag set together with the resource limits enforced while parsing.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of parser option flags.
///
/// Flags combine with `|`. The `Display` form lists the enabled flags in
/// bit order, e.g. `[NoEnt|NoBlanks]`; the empty set renders as `[]`.
///
/// ```
/// use xmldom::parser::ParseOption;
///
/// let opts = ParseOption::NO_BLANKS | ParseOption::NO_ENT;
/// assert_eq!(opts.to_string(), "[NoEnt|NoBlanks]");
/// assert_eq!(ParseOption::empty().to_string(), "[]");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParseOption(u32);

impl ParseOption {
    /// Recover on errors and return a partial tree.
    pub const RECOVER: Self = Self(1 << 0);
    /// Substitute entities.
    pub const NO_ENT: Self = Self(1 << 1);
    /// Load the external subset.
    pub const DTD_LOAD: Self = Self(1 << 2);
    /// Apply default DTD attributes.
    pub const DTD_ATTR: Self = Self(1 << 3);
    /// Validate against the DTD.
    pub const DTD_VALID: Self = Self(1 << 4);
    /// Suppress error reports.
    pub const NO_ERROR: Self = Self(1 << 5);
    /// Suppress warning reports.
    pub const NO_WARNING: Self = Self(1 << 6);
    /// Report normally ignored warnings as errors.
    pub const PEDANTIC: Self = Self(1 << 7);
    /// Remove blank text nodes.
    pub const NO_BLANKS: Self = Self(1 << 8);
    /// Reserved.
    pub const SAX1: Self = Self(1 << 9);
    /// Reserved.
    pub const XINCLUDE: Self = Self(1 << 10);
    /// Forbid network access.
    pub const NO_NET: Self = Self(1 << 11);
    /// Do not use a string dictionary.
    pub const NO_DICT: Self = Self(1 << 12);
    /// Remove redundant namespace declarations.
    pub const NSCLEAN: Self = Self(1 << 13);
    /// Merge CDATA sections into text nodes.
    pub const NO_CDATA: Self = Self(1 << 14);
    /// Reserved.
    pub const NO_XINC_NODE: Self = Self(1 << 15);
    /// Intern short text nodes.
    pub const COMPACT: Self = Self(1 << 16);
    /// XML 1.0 name rules (the default).
    pub const OLD10: Self = Self(1 << 17);
    /// Do not fix up `xml:base`.
    pub const NO_BASE_FIX: Self = Self(1 << 18);
    /// Relax hard-coded limits.
    pub const HUGE: Self = Self(1 << 19);
    /// Reserved.
    pub const OLD_SAX: Self = Self(1 << 20);
    /// Ignore the declared encoding.
    pub const IGNORE_ENC: Self = Self(1 << 21);
    /// Report line numbers above 65535.
    pub const BIG_LINES: Self = Self(1 << 22);

    /// Every flag with its canonical name, in bit order.
    const NAMED: [(Self, &'static str); 23] = [
        (Self::RECOVER, "Recover"),
        (Self::NO_ENT, "NoEnt"),
        (Self::DTD_LOAD, "DTDLoad"),
        (Self::DTD_ATTR, "DTDAttr"),
        (Self::DTD_VALID, "DTDValid"),
        (Self::NO_ERROR, "NoError"),
        (Self::NO_WARNING, "NoWarning"),
        (Self::PEDANTIC, "Pedantic"),
        (Self::NO_BLANKS, "NoBlanks"),
        (Self::SAX1, "SAX1"),
        (Self::XINCLUDE, "XInclude"),
        (Self::NO_NET, "NoNet"),
        (Self::NO_DICT, "NoDict"),
        (Self::NSCLEAN, "Nsclean"),
        (Self::NO_CDATA, "NoCDATA"),
        (Self::NO_XINC_NODE, "NoXIncNode"),
        (Self::COMPACT, "Compact"),
        (Self::OLD10, "Old10"),
        (Self::NO_BASE_FIX, "NoBaseFix"),
        (Self::HUGE, "Huge"),
        (Self::OLD_SAX, "OldSAX"),
        (Self::IGNORE_ENC, "IgnoreEnc"),
        (Self::BIG_LINES, "BigLines"),
    ];

    /// Flags accepted for compatibility that have no effect on a DOM parse.
    pub const RESERVED: Self = Self(
        Self::SAX1.0 | Self::XINCLUDE.0 | Self::NO_XINC_NODE.0 | Self::OLD_SAX.0,
    );

    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every defined flag.
    #[must_use]
    pub const fn all() -> Self {
        Self((1 << 23) - 1)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a set from raw bits, dropping undefined ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::all().0)
    }

    /// Returns `true` if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets the flags of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the flags of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Sets or clears the flags of `other`.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Looks up a single flag by its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }

    /// Returns the canonical name of a single flag.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(flag, _)| *flag == self)
            .map(|(_, n)| *n)
    }

    /// Iterates over the enabled flags in bit order.
    pub fn iter(self) -> impl Iterator<Item = (Self, &'static str)> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
    }
}

impl BitOr for ParseOption {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParseOption {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ParseOption {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ParseOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (_, name)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(name)?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for ParseOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseOption{self}")
    }
}

// -------------------------------------------------------------------------
// Limits
// -------------------------------------------------------------------------

/// Default maximum element nesting depth.
pub const DEFAULT_MAX_DEPTH: u32 = 256;

/// Maximum element nesting depth with [`ParseOption::HUGE`].
pub const HUGE_MAX_DEPTH: u32 = 2048;

/// Default maximum entity reference nesting.
pub const DEFAULT_MAX_ENTITY_DEPTH: u32 = 40;

/// Maximum entity reference nesting with [`ParseOption::HUGE`].
pub const HUGE_MAX_ENTITY_DEPTH: u32 = 1024;

/// Default maximum length (in bytes) of an expanded attribute value.
pub const DEFAULT_MAX_ATTRIBUTE_LENGTH: usize = 10 * 1024 * 1024;

/// Default maximum length (in bytes) of a text node.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 10 * 1024 * 1024;

/// Attribute and text length cap with [`ParseOption::HUGE`].
pub const HUGE_MAX_LENGTH: usize = 1_000_000_000;

/// Default maximum length (in bytes) of a name.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 50_000;

/// Default maximum number of entity expansions per document.
pub const DEFAULT_MAX_ENTITY_EXPANSIONS: u32 = 10_000;

/// Entity expansion cap with [`ParseOption::HUGE`].
pub const HUGE_MAX_ENTITY_EXPANSIONS: u32 = 10_000_000;

/// The limits in force for one parse, after applying [`ParseOption::HUGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Limits {
    pub max_depth: u32,
    pub max_entity_depth: u32,
    pub max_attribute_length: usize,
    pub max_text_length: usize,
    pub max_name_length: usize,
    pub max_entity_expansions: u32,
}

/// Parse options controlling parser behavior and security limits.
///
/// Use the builder pattern to configure options:
///
/// ```
/// use xmldom::parser::{ParseOption, ParseOptions};
///
/// let opts = ParseOptions::default()
///     .recover(true)
///     .no_blanks(true)
///     .max_depth(128);
/// assert!(opts.flags.contains(ParseOption::RECOVER | ParseOption::NO_BLANKS));
///
/// let opts = ParseOptions::from(ParseOption::NO_ENT | ParseOption::NSCLEAN);
/// assert_eq!(opts.flags.to_string(), "[NoEnt|Nsclean]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// The option flags.
    pub flags: ParseOption,

    // -- Security limits --
    /// Maximum element nesting depth (default: 256).
    pub max_depth: u32,
    /// Maximum nesting of entity references (default: 40).
    pub max_entity_depth: u32,
    /// Maximum length in bytes of an expanded attribute value (default: 10 MB).
    pub max_attribute_length: usize,
    /// Maximum length in bytes of a single text node (default: 10 MB).
    pub max_text_length: usize,
    /// Maximum length in bytes of an element or attribute name (default: 50,000).
    pub max_name_length: usize,
    /// Maximum number of entity reference expansions per document (default: 10,000).
    pub max_entity_expansions: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            flags: ParseOption::empty(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_entity_depth: DEFAULT_MAX_ENTITY_DEPTH,
            max_attribute_length: DEFAULT_MAX_ATTRIBUTE_LENGTH,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            max_entity_expansions: DEFAULT_MAX_ENTITY_EXPANSIONS,
        }
    }
}

impl From<ParseOption> for ParseOptions {
    fn from(flags: ParseOption) -> Self {
        Self::default().flags(flags)
    }
}

impl ParseOptions {
    /// Replaces the whole flag set.
    #[must_use]
    pub fn flags(mut self, flags: ParseOption) -> Self {
        self.flags = flags;
        self
    }

    /// Adds flags to the set.
    #[must_use]
    pub fn with(mut self, flags: ParseOption) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Enables or disables error recovery mode.
    #[must_use]
    pub fn recover(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::RECOVER, yes);
        self
    }

    /// Enables or disables entity substitution.
    #[must_use]
    pub fn no_ent(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::NO_ENT, yes);
        self
    }

    /// Enables or disables stripping of blank text nodes.
    #[must_use]
    pub fn no_blanks(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::NO_BLANKS, yes);
        self
    }

    /// Enables or disables merging CDATA sections into text.
    #[must_use]
    pub fn no_cdata(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::NO_CDATA, yes);
        self
    }

    /// Enables or disables removal of redundant namespace declarations.
    #[must_use]
    pub fn nsclean(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::NSCLEAN, yes);
        self
    }

    /// Enables or disables relaxed limits.
    #[must_use]
    pub fn huge(mut self, yes: bool) -> Self {
        self.flags.set(ParseOption::HUGE, yes);
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: u32) -> Self {
        self.max_depth = max;
        self
    }

    /// Sets the maximum entity reference nesting.
    #[must_use]
    pub fn max_entity_depth(mut self, max: u32) -> Self {
        self.max_entity_depth = max;
        self
    }

    /// Sets the maximum attribute value length in bytes.
    #[must_use]
    pub fn max_attribute_length(mut self, max: usize) -> Self {
        self.max_attribute_length = max;
        self
    }

    /// Sets the maximum text node length in bytes.
    #[must_use]
    pub fn max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    /// Sets the maximum element/attribute name length in bytes.
    #[must_use]
    pub fn max_name_length(mut self, max: usize) -> Self {
        self.max_name_length = max;
        self
    }

    /// Sets the maximum number of entity reference expansions.
    #[must_use]
    pub fn max_entity_expansions(mut self, max: u32) -> Self {
        self.max_entity_expansions = max;
        self
    }

    /// Returns `true` if `flag` is enabled.
    #[must_use]
    pub fn has(&self, flag: ParseOption) -> bool {
        self.flags.contains(flag)
    }

    /// Resolves the limits for a parse. `Huge` only ever raises a limit.
    pub(crate) fn limits(&self) -> Limits {
        let mut limits = Limits {
            max_depth: self.max_depth,
            max_entity_depth: self.max_entity_depth,
            max_attribute_length: self.max_attribute_length,
            max_text_length: self.max_text_length,
            max_name_length: self.max_name_length,
            max_entity_expansions: self.max_entity_expansions,
        };
        if self.has(ParseOption::HUGE) {
            limits.max_depth = limits.max_depth.max(HUGE_MAX_DEPTH);
            limits.max_entity_depth = limits.max_entity_depth.max(HUGE_MAX_ENTITY_DEPTH);
            limits.max_attribute_length = limits.max_attribute_length.max(HUGE_MAX_LENGTH);
            limits.max_text_length = limits.max_text_length.max(HUGE_MAX_LENGTH);
            limits.max_entity_expansions =
                limits.max_entity_expansions.max(HUGE_MAX_ENTITY_EXPANSIONS);
        }
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_single_flags() {
        assert_eq!(ParseOption::RECOVER.to_string(), "[Recover]");
        assert_eq!(ParseOption::DTD_LOAD.to_string(), "[DTDLoad]");
        assert_eq!(ParseOption::NO_CDATA.to_string(), "[NoCDATA]");
        assert_eq!(ParseOption::BIG_LINES.to_string(), "[BigLines]");
    }

    #[test]
    fn test_render_uses_bit_order() {
        let opts = ParseOption::NO_BLANKS | ParseOption::NO_ENT;
        assert_eq!(opts.to_string(), "[NoEnt|NoBlanks]");
        let opts = ParseOption::BIG_LINES | ParseOption::RECOVER | ParseOption::NSCLEAN;
        assert_eq!(opts.to_string(), "[Recover|Nsclean|BigLines]");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(ParseOption::empty().to_string(), "[]");
        assert_eq!(ParseOption::default().to_string(), "[]");
    }

    #[test]
    fn test_bit_positions() {
        assert_eq!(ParseOption::RECOVER.bits(), 1);
        assert_eq!(ParseOption::NO_BLANKS.bits(), 256);
        assert_eq!(ParseOption::NSCLEAN.bits(), 1 << 13);
        assert_eq!(ParseOption::BIG_LINES.bits(), 1 << 22);
        assert_eq!(ParseOption::all().iter().count(), 23);
    }

    #[test]
    fn test_name_lookup_roundtrip() {
        for (flag, name) in ParseOption::all().iter() {
            assert_eq!(ParseOption::from_name(name), Some(flag));
            assert_eq!(flag.name(), Some(name));
        }
        assert_eq!(ParseOption::from_name("Bogus"), None);
    }

    #[test]
    fn test_set_algebra() {
        let mut opts = ParseOption::empty();
        assert!(opts.is_empty());
        opts |= ParseOption::RECOVER;
        opts.insert(ParseOption::HUGE);
        assert!(opts.contains(ParseOption::RECOVER | ParseOption::HUGE));
        opts.remove(ParseOption::RECOVER);
        assert!(!opts.contains(ParseOption::RECOVER));
        assert!(opts.intersects(ParseOption::HUGE | ParseOption::NO_ENT));
        assert_eq!(
            ParseOption::from_bits_truncate(u32::MAX),
            ParseOption::all()
        );
    }

    #[test]
    fn test_builder_sets_flags() {
        let opts = ParseOptions::default().recover(true).no_ent(true).no_ent(false);
        assert_eq!(opts.flags, ParseOption::RECOVER);
        let opts = ParseOptions::default().with(ParseOption::NO_CDATA | ParseOption::NSCLEAN);
        assert!(opts.has(ParseOption::NO_CDATA));
        assert!(opts.has(ParseOption::NSCLEAN));
    }

    #[test]
    fn test_huge_raises_limits() {
        let normal = ParseOptions::default().limits();
        assert_eq!(normal.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(normal.max_entity_depth, DEFAULT_MAX_ENTITY_DEPTH);

        let huge = ParseOptions::from(ParseOption::HUGE).limits();
        assert_eq!(huge.max_depth, HUGE_MAX_DEPTH);
        assert_eq!(huge.max_entity_depth, HUGE_MAX_ENTITY_DEPTH);
        assert_eq!(huge.max_attribute_length, HUGE_MAX_LENGTH);

        // Huge never lowers an explicitly raised limit.
        let custom = ParseOptions::from(ParseOption::HUGE).max_depth(5000).limits();
        assert_eq!(custom.max_depth, 5000);
    }
}
