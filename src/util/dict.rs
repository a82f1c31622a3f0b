//! String interning dictionary.
//!
//! A parsed document owns a `Dict` that hands out shared `Arc<str>` handles
//! for element, attribute and PI names, prefixes and namespace URIs, and,
//! with the `Compact` option, short text content. Equal strings interned
//! through the same dictionary share one allocation. With `NoDict` the
//! parser skips the dictionary and every node gets its own allocation.

use std::collections::HashSet;
use std::sync::Arc;

/// A string interning dictionary.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use xmldom::util::dict::Dict;
///
/// let mut dict = Dict::new();
/// let a = dict.intern("foobar");
/// let b = dict.intern("foobar");
/// let c = dict.intern("foo");
///
/// assert!(Arc::ptr_eq(&a, &b));
/// assert!(!Arc::ptr_eq(&a, &c));
/// assert_eq!(dict.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Dict {
    lookup: HashSet<Arc<str>>,
    /// Interned strings in first-seen order.
    order: Vec<Arc<str>>,
}

impl Dict {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `s`, interning it on first sight.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(found) = self.get(s) {
            return Arc::clone(found);
        }
        let shared: Arc<str> = Arc::from(s);
        self.lookup.insert(Arc::clone(&shared));
        self.order.push(Arc::clone(&shared));
        shared
    }

    /// Looks up the handle for `s` without interning it.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<&Arc<str>> {
        self.lookup.get(s)
    }

    /// Returns `true` if `s` has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.lookup.contains(s)
    }

    /// Iterates over the interned strings in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intern_shares_storage() {
        let mut dict = Dict::new();
        let a = dict.intern("item");
        let b = dict.intern("id");
        let again = dict.intern("item");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(&*again, "item");
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_lookup_without_interning() {
        let mut dict = Dict::new();
        let handle = dict.intern("xmlns");
        assert!(dict.get("xmlns").is_some_and(|h| Arc::ptr_eq(h, &handle)));
        assert_eq!(dict.get("xml"), None);
        assert!(!dict.contains("xml"));
        assert_eq!(dict.len(), 1);
        assert!(!dict.is_empty());
    }

    #[test]
    fn test_iter_keeps_first_seen_order() {
        let mut dict = Dict::new();
        for name in ["root", "child", "root", "leaf"] {
            dict.intern(name);
        }
        let names: Vec<_> = dict.iter().collect();
        assert_eq!(names, ["root", "child", "leaf"]);
    }
}
