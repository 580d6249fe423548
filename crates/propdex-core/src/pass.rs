//! One indexing pass: diff visible sources against the last snapshot,
//! retire what went away, merge what is new, then retry declarations the
//! retired sources were blocking.

use crate::snapshot::{IndexSnapshot, IndexStats};
use crate::CoreError;
use chrono::Utc;
use propdex_indexer::{
    MetadataDocument, MetadataIndexBuilder, SourceDiscovery, SourceId, SourceInfo, TypeCatalog,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What became of a requested pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// A new generation was published
    Committed(IndexStats),
    /// A newer request cancelled this pass before it published
    Superseded,
}

/// Sources to retire and sources to merge.
#[derive(Debug, Default)]
pub struct SourceDiff {
    /// Gone or modified since the last pass
    pub stale: Vec<SourceId>,
    /// New or modified since the last pass
    pub fresh: Vec<SourceInfo>,
}

impl SourceDiff {
    pub fn compute(seen: &HashMap<SourceId, SourceInfo>, current: &[SourceInfo]) -> Self {
        let visible: HashMap<&SourceId, &SourceInfo> = current.iter().map(|s| (&s.id, s)).collect();

        let mut stale: Vec<SourceId> = seen
            .values()
            .filter(|old| visible.get(&old.id).map_or(true, |new| old.is_modified(new)))
            .map(|old| old.id.clone())
            .collect();
        stale.sort();

        let mut fresh: Vec<SourceInfo> = current
            .iter()
            .filter(|new| seen.get(&new.id).map_or(true, |old| old.is_modified(new)))
            .cloned()
            .collect();
        fresh.sort_by(|a, b| a.id.cmp(&b.id));

        Self { stale, fresh }
    }

    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.fresh.is_empty()
    }
}

/// Inputs of one pass over one module.
pub(crate) struct IndexPass<'a> {
    pub module: &'a str,
    pub base: &'a IndexSnapshot,
    pub discovery: &'a dyn SourceDiscovery,
    pub type_catalogs: &'a [PathBuf],
    pub token: &'a CancellationToken,
}

impl IndexPass<'_> {
    /// Build the next snapshot. Returns `None` once cancelled.
    pub fn run(self) -> Result<Option<IndexSnapshot>, CoreError> {
        let started = Instant::now();
        let discovered = self.discovery.discover()?;
        let diff = SourceDiff::compute(&self.base.seen, &discovered.sources);

        debug!(
            module = %self.module,
            stale = diff.stale.len(),
            fresh = diff.fresh.len(),
            "Computed source diff"
        );

        let mut trie = self.base.trie.clone();
        let mut seen = self.base.seen.clone();
        let mut builder = MetadataIndexBuilder::new(&mut trie);

        for id in &diff.stale {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            builder.remove_source(id);
            seen.remove(id);
        }

        for info in diff.fresh {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            if let Some(file) = &info.metadata_file {
                match MetadataDocument::load(file) {
                    Ok(document) => {
                        let report = builder.merge_document(&document, &info.id);
                        if report.rejected > 0 {
                            debug!(source = %info.id, rejected = report.rejected, "Source has declarations held back");
                        }
                    }
                    Err(e) => {
                        // Left out of `seen` so the next pass retries it
                        warn!(source = %info.id, error = %e, "Skipping unreadable metadata");
                        builder.remove_source(&info.id);
                        continue;
                    }
                }
            }
            seen.insert(info.id.clone(), info);
        }

        if self.token.is_cancelled() {
            return Ok(None);
        }
        let retried = builder.reconcile();
        if retried.added + retried.duplicates > 0 {
            debug!(
                module = %self.module,
                applied = retried.added + retried.duplicates,
                "Applied declarations unblocked by retired sources"
            );
        }
        let dangling = trie.dangling_hint_count();
        if dangling > 0 {
            warn!(module = %self.module, dangling, "Hints target undeclared properties");
        }

        let mut catalogs: Vec<&PathBuf> = self.type_catalogs.iter().collect();
        catalogs.extend(discovered.type_catalogs.iter());
        let mut resolver = TypeCatalog::new();
        for path in catalogs {
            match TypeCatalog::load(path) {
                Ok(catalog) => resolver.merge(catalog),
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable type catalog"),
            }
        }

        let mut snapshot = IndexSnapshot {
            generation: self.base.generation + 1,
            trie,
            seen,
            resolver: Arc::new(resolver),
            indexed_at: Some(Utc::now()),
            stats: IndexStats::default(),
        };
        let elapsed = started.elapsed().as_millis() as u64;
        snapshot.stats = snapshot.compute_stats(elapsed);

        info!(
            module = %self.module,
            generation = snapshot.generation,
            sources = snapshot.stats.sources,
            properties = snapshot.stats.properties,
            duration_ms = elapsed,
            "Index pass complete"
        );
        Ok(Some(snapshot))
    }
}
