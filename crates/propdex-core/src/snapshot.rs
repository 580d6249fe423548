//! Immutable, published state of one module's index.

use chrono::{DateTime, Utc};
use propdex_indexer::{
    ClassGraphCache, GraphContext, QueryContext, SourceId, SourceInfo, SuggestionTrie, TypeCatalog,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One generation of a module's index.
///
/// Snapshots are never mutated once published; a pass builds the next one
/// from a clone and swaps it in.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    /// Bumped on every committed pass
    pub generation: u64,

    pub trie: SuggestionTrie,

    /// Sources merged into `trie`, by identity
    pub seen: HashMap<SourceId, SourceInfo>,

    /// Types available to the class graph
    pub resolver: Arc<TypeCatalog>,

    /// When this generation was committed
    pub indexed_at: Option<DateTime<Utc>>,

    pub stats: IndexStats,
}

/// Size of a snapshot and cost of the pass that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub sources: usize,
    pub nodes: usize,
    pub groups: usize,
    pub properties: usize,
    pub types: usize,
    pub last_pass_ms: u64,
}

impl Default for IndexSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            trie: SuggestionTrie::new(),
            seen: HashMap::new(),
            resolver: Arc::new(TypeCatalog::new()),
            indexed_at: None,
            stats: IndexStats::default(),
        }
    }
}

impl IndexSnapshot {
    /// Read-only query view over this generation.
    pub fn query_context<'a>(&'a self, cache: &'a ClassGraphCache) -> QueryContext<'a> {
        QueryContext::new(
            &self.trie,
            GraphContext::new(self.resolver.as_ref(), cache, self.generation),
        )
    }

    pub(crate) fn compute_stats(&self, last_pass_ms: u64) -> IndexStats {
        IndexStats {
            generation: self.generation,
            sources: self.seen.len(),
            nodes: self.trie.node_count(),
            groups: self.trie.group_count(),
            properties: self.trie.property_count(),
            types: self.resolver.len(),
            last_pass_ms,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propdex_indexer::{KeyPath, MetadataDocument, MetadataIndexBuilder};
    use std::path::Path;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = IndexSnapshot::default();
        assert_eq!(snapshot.generation, 0);
        assert!(!snapshot.is_indexed());
        assert!(snapshot.trie.is_empty());
    }

    #[test]
    fn test_stats_and_queries() {
        let mut snapshot = IndexSnapshot::default();
        let doc = MetadataDocument::from_json(
            r#"{"properties": [{"name": "server.port"}, {"name": "server.address"}]}"#,
            Path::new("test.json"),
        )
        .unwrap();
        MetadataIndexBuilder::new(&mut snapshot.trie).merge_document(&doc, &SourceId::from("s1"));

        let stats = snapshot.compute_stats(3);
        assert_eq!(stats.properties, 2);
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.last_pass_ms, 3);

        let cache = ClassGraphCache::new(4);
        let ctx = snapshot.query_context(&cache);
        assert!(ctx.resolve(&KeyPath::parse("server.port")).is_some());
    }
}
