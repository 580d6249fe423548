//! Dotted key paths and sanitized lookup keys.
//!
//! Segments are looked up by their sanitized form (trimmed, `-` and `_`
//! removed, lower-cased) but always displayed with their original text.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::ops::Bound;

/// Normalize a segment for lookup.
pub fn sanitize(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// One dot-delimited component of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Text as written, trimmed
    pub original: String,
    /// Lookup identity
    pub sanitized: String,
}

impl Segment {
    pub fn new(raw: &str) -> Self {
        let original = raw.trim().to_string();
        let sanitized = sanitize(&original);
        Self {
            original,
            sanitized,
        }
    }
}

/// A dotted key path split into segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    /// Parse a path that names an existing location. An empty string is the root.
    pub fn parse(path: &str) -> Self {
        if path.trim().is_empty() {
            return Self::default();
        }
        Self::parse_query(path)
    }

    /// Parse a partially typed query. Empty and trailing segments are kept so
    /// that `"server."` still asks for every child of `server`.
    pub fn parse_query(query: &str) -> Self {
        Self {
            segments: query.split('.').map(Segment::new).collect(),
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether `index` addresses the final segment.
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.segments.len()
    }

    /// Path without its final segment.
    pub fn parent(&self) -> Option<KeyPath> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.original)?;
        }
        Ok(())
    }
}

/// Sorted map from sanitized key to value, with prefix lookup.
///
/// Backs trie children, hint tables, bean members and enum constants.
#[derive(Debug, Clone)]
pub struct PrefixIndex<V> {
    entries: BTreeMap<String, V>,
}

impl<V> Default for PrefixIndex<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> PrefixIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value for the key.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, V> {
        self.entries.iter()
    }

    pub fn values(&self) -> btree_map::Values<'_, String, V> {
        self.entries.values()
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a V)> + 'a {
        self.entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    pub fn retain(&mut self, f: impl FnMut(&String, &mut V) -> bool) {
        self.entries.retain(f);
    }
}

impl<V> FromIterator<(String, V)> for PrefixIndex<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(" Server-Port "), "serverport");
        assert_eq!(sanitize("context_path"), "contextpath");
        assert_eq!(sanitize("contextPath"), "contextpath");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_parse_path() {
        let path = KeyPath::parse("server.servlet.context-path");
        assert_eq!(path.len(), 3);
        assert_eq!(path.get(2).unwrap().original, "context-path");
        assert_eq!(path.get(2).unwrap().sanitized, "contextpath");
        assert_eq!(path.to_string(), "server.servlet.context-path");
    }

    #[test]
    fn test_parse_empty_path_is_root() {
        assert!(KeyPath::parse("").is_empty());
        assert!(KeyPath::parse("   ").is_empty());
    }

    #[test]
    fn test_parse_query_keeps_trailing_segment() {
        let query = KeyPath::parse_query("server.");
        assert_eq!(query.len(), 2);
        assert_eq!(query.get(1).unwrap().sanitized, "");
        assert!(query.is_last(1));

        assert_eq!(KeyPath::parse_query("").len(), 1);
    }

    #[test]
    fn test_parent() {
        let path = KeyPath::parse("a.b.c");
        assert_eq!(path.parent().unwrap().to_string(), "a.b");
        assert!(KeyPath::default().parent().is_none());
    }

    #[test]
    fn test_prefix_index_lookup() {
        let mut index = PrefixIndex::new();
        index.insert("port".to_string(), 1);
        index.insert("servlet".to_string(), 2);
        index.insert("session".to_string(), 3);
        index.insert("address".to_string(), 4);

        let keys: Vec<_> = index.with_prefix("se").map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["servlet", "session"]);

        assert_eq!(index.with_prefix("").count(), 4);
        assert_eq!(index.with_prefix("x").count(), 0);
        assert_eq!(index.get("port"), Some(&1));
    }

    #[test]
    fn test_prefix_index_remove() {
        let mut index: PrefixIndex<u32> = [("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(index.remove("a"), Some(1));
        assert_eq!(index.len(), 1);
        assert!(!index.contains_key("a"));
    }
}
