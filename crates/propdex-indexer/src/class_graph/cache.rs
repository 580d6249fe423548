//! Per-module memo of class graph nodes.

use super::ClassNode;
use crate::types::TypeRef;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cache of class graph nodes keyed by `(type, generation)`.
///
/// A node built for an older generation is never returned for a newer one,
/// so committing a pass needs no invalidation sweep.
pub struct ClassGraphCache {
    entries: Mutex<LruCache<(TypeRef, u64), Arc<ClassNode>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl ClassGraphCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Node for `type_ref` in `generation`, created uninitialized on first use.
    pub fn get_or_create(&self, type_ref: &TypeRef, generation: u64) -> Arc<ClassNode> {
        let key = (type_ref.clone(), generation);
        let mut entries = self.entries.lock();

        if let Some(node) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(node);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(ClassNode::new(type_ref.clone()));
        entries.put(key, Arc::clone(&node));
        node
    }

    /// Drop every node built for a generation older than `generation`.
    pub fn retire_before(&self, generation: u64) -> usize {
        let mut entries = self.entries.lock();
        let stale: Vec<_> = entries
            .iter()
            .filter(|((_, g), _)| *g < generation)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        if !stale.is_empty() {
            debug!(retired = stale.len(), generation, "Retired class graph nodes");
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for ClassGraphCache {
    fn default() -> Self {
        Self::new(512)
    }
}
