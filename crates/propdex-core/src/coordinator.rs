//! Query facade over every registered module.

use crate::config::EngineConfig;
use crate::metrics::{LatencyTracker, Metrics, MetricsSnapshot};
use crate::module::ModuleIndex;
use crate::pass::PassOutcome;
use crate::snapshot::{IndexSnapshot, IndexStats};
use crate::CoreError;
use parking_lot::RwLock;
use propdex_indexer::suggestion::{key_suggestions, value_suggestions};
use propdex_indexer::{
    docs, sanitize, ClasspathDiscovery, DiscoveryOptions, KeyPath, KeyQuery, KeySuggestion,
    PathElement, SourceDiscovery, ValueSuggestion,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A resolved position in one generation of a module's index.
///
/// Queries through a handle see the generation it was resolved in, even if
/// a newer one has been published since.
#[derive(Clone)]
pub struct NodeHandle {
    module: Arc<ModuleIndex>,
    snapshot: Arc<IndexSnapshot>,
    elements: Vec<PathElement>,
}

impl NodeHandle {
    pub fn module_id(&self) -> &str {
        self.module.id()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Whether the handle points at the root.
    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    /// Dotted path of the handle.
    pub fn path(&self) -> String {
        propdex_indexer::query::dotted_path(&self.snapshot.trie, &self.elements)
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("module", &self.module.id())
            .field("generation", &self.snapshot.generation)
            .field("path", &self.path())
            .finish()
    }
}

/// Owns the index of every module and serves queries against them.
pub struct IndexCoordinator {
    config: EngineConfig,
    modules: RwLock<HashMap<String, Arc<ModuleIndex>>>,
    metrics: Arc<Metrics>,
    latency: LatencyTracker,
}

impl IndexCoordinator {
    /// Create a coordinator with the modules declared in `config`.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let coordinator = Self {
            config: config.clone(),
            modules: RwLock::new(HashMap::new()),
            metrics: Arc::new(Metrics::new()),
            latency: LatencyTracker::default(),
        };
        for module in &config.modules {
            coordinator.register_roots(&module.id, module.roots.clone(), module.type_catalogs.clone())?;
        }
        Ok(coordinator)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a module whose sources come from `discovery`.
    pub fn register_module(
        &self,
        id: &str,
        discovery: Arc<dyn SourceDiscovery>,
        type_catalogs: Vec<PathBuf>,
    ) -> Result<(), CoreError> {
        let mut modules = self.modules.write();
        if modules.contains_key(id) {
            return Err(CoreError::DuplicateModule(id.to_string()));
        }
        let module = ModuleIndex::new(
            id.to_string(),
            discovery,
            type_catalogs,
            self.config.class_graph_cache_capacity,
            Arc::clone(&self.metrics),
        );
        modules.insert(id.to_string(), Arc::new(module));
        info!(module = %id, "Registered module");
        Ok(())
    }

    /// Register a module over classpath roots on disk.
    pub fn register_roots(
        &self,
        id: &str,
        roots: Vec<PathBuf>,
        type_catalogs: Vec<PathBuf>,
    ) -> Result<(), CoreError> {
        let options = DiscoveryOptions {
            follow_symlinks: self.config.follow_symlinks,
            ..Default::default()
        };
        self.register_module(id, Arc::new(ClasspathDiscovery::new(roots, options)), type_catalogs)
    }

    /// Drop a module, cancelling its pass in flight.
    pub fn unregister_module(&self, id: &str) -> Result<(), CoreError> {
        let module = self
            .modules
            .write()
            .remove(id)
            .ok_or_else(|| CoreError::UnknownModule(id.to_string()))?;
        module.cancel();
        info!(module = %id, "Unregistered module");
        Ok(())
    }

    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.modules.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn module(&self, id: &str) -> Result<Arc<ModuleIndex>, CoreError> {
        self.modules
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownModule(id.to_string()))
    }

    /// Resolve a dotted path every segment of which must exist.
    ///
    /// The empty path resolves to the root.
    pub fn resolve_ancestor_path(&self, module_id: &str, path: &str) -> Result<Option<NodeHandle>, CoreError> {
        let started = Instant::now();
        let module = self.module(module_id)?;
        let snapshot = module.snapshot();

        let elements = snapshot
            .query_context(module.cache())
            .resolve(&KeyPath::parse(path));
        self.record("resolve", started);

        Ok(elements.map(|elements| NodeHandle {
            module,
            snapshot,
            elements,
        }))
    }

    /// Keys below `ancestor` matching a partially typed dotted query.
    pub fn suggest_keys(
        &self,
        module_id: &str,
        ancestor: &NodeHandle,
        query: &str,
        excluded_siblings: &[String],
    ) -> Result<BTreeSet<KeySuggestion>, CoreError> {
        self.check_handle(module_id, ancestor)?;
        let started = Instant::now();

        let ctx = ancestor.snapshot.query_context(ancestor.module.cache());
        let key_query = KeyQuery::new(query).exclude(excluded_siblings);
        let found = ctx.search(&ancestor.elements, &key_query);
        let suggestions = key_suggestions(&ctx, ancestor.elements.len(), &found);

        debug!(module = %module_id, query, results = suggestions.len(), "Suggested keys");
        self.record("keys", started);
        Ok(suggestions)
    }

    /// Values accepted at `leaf` starting with `prefix`.
    pub fn suggest_values(
        &self,
        module_id: &str,
        leaf: &NodeHandle,
        prefix: &str,
        excluded_siblings: &[String],
    ) -> Result<BTreeSet<ValueSuggestion>, CoreError> {
        self.check_handle(module_id, leaf)?;
        let started = Instant::now();

        let ctx = leaf.snapshot.query_context(leaf.module.cache());
        let excluded: HashSet<String> = excluded_siblings.iter().map(|s| sanitize(s)).collect();
        let suggestions = value_suggestions(&ctx, &leaf.elements, prefix, &excluded);

        self.record("values", started);
        Ok(suggestions)
    }

    /// Plain-text documentation of the key a handle points at.
    pub fn documentation_for(&self, handle: &NodeHandle) -> Option<String> {
        let ctx = handle.snapshot.query_context(handle.module.cache());
        docs::documentation(&ctx, &handle.elements)
    }

    /// Plain-text documentation of one value accepted at `leaf`.
    pub fn value_documentation_for(&self, leaf: &NodeHandle, value: &str) -> Option<String> {
        let ctx = leaf.snapshot.query_context(leaf.module.cache());
        docs::value_documentation(&ctx, &leaf.elements, value)
    }

    /// Start a pass for a module and return immediately.
    pub fn reindex(&self, module_id: &str) -> Result<(), CoreError> {
        let module = self.module(module_id)?;
        // Outcome is logged by the pass itself
        drop(module.start_pass());
        Ok(())
    }

    /// Start a pass for every module.
    pub fn reindex_all(&self) {
        let modules: Vec<_> = self.modules.read().values().cloned().collect();
        for module in modules {
            drop(module.start_pass());
        }
    }

    /// Run a pass for a module and wait for its outcome.
    pub async fn reindex_now(&self, module_id: &str) -> Result<PassOutcome, CoreError> {
        let module = self.module(module_id)?;
        module
            .start_pass()
            .await
            .map_err(|e| CoreError::Join(e.to_string()))?
    }

    /// Wait until a module has no pass in flight.
    pub async fn wait_idle(&self, module_id: &str) -> Result<(), CoreError> {
        self.module(module_id)?.wait_idle().await;
        Ok(())
    }

    pub fn stats(&self, module_id: &str) -> Result<IndexStats, CoreError> {
        Ok(self.module(module_id)?.snapshot().stats)
    }

    /// Indented dump of a module's trie.
    pub fn render_tree(&self, module_id: &str) -> Result<String, CoreError> {
        Ok(self.module(module_id)?.snapshot().trie.render())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    fn check_handle(&self, module_id: &str, handle: &NodeHandle) -> Result<(), CoreError> {
        if handle.module_id() == module_id {
            Ok(())
        } else {
            Err(CoreError::ForeignHandle {
                handle: handle.module_id().to_string(),
                requested: module_id.to_string(),
            })
        }
    }

    fn record(&self, operation: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        self.metrics.record_query(elapsed);
        self.latency.record(operation, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propdex_indexer::discovery::METADATA_FILES;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_metadata(root: &Path, content: &str) {
        let path = root.join(METADATA_FILES[0]);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    async fn indexed(root: &Path) -> IndexCoordinator {
        let coordinator = IndexCoordinator::new(EngineConfig::default()).unwrap();
        coordinator
            .register_roots("web", vec![root.to_path_buf()], vec![])
            .unwrap();
        coordinator.reindex_now("web").await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let coordinator = IndexCoordinator::new(EngineConfig::default()).unwrap();
        assert!(matches!(
            coordinator.resolve_ancestor_path("nope", ""),
            Err(CoreError::UnknownModule(_))
        ));
        assert!(coordinator.reindex("nope").is_err());
    }

    #[tokio::test]
    async fn test_duplicate_module() {
        let coordinator = IndexCoordinator::new(EngineConfig::default()).unwrap();
        coordinator.register_roots("web", vec![], vec![]).unwrap();
        assert!(matches!(
            coordinator.register_roots("web", vec![], vec![]),
            Err(CoreError::DuplicateModule(_))
        ));
    }

    #[tokio::test]
    async fn test_suggest_from_root_and_ancestor() {
        let temp_dir = tempdir().unwrap();
        write_metadata(
            temp_dir.path(),
            r#"{"properties": [{"name": "server.port"}, {"name": "server.servlet.path"}]}"#,
        );
        let coordinator = indexed(temp_dir.path()).await;

        let root = coordinator.resolve_ancestor_path("web", "").unwrap().unwrap();
        assert!(root.is_root());
        let keys: Vec<_> = coordinator
            .suggest_keys("web", &root, "serv", &[])
            .unwrap()
            .into_iter()
            .map(|k| k.full_path)
            .collect();
        assert_eq!(keys, vec!["server.port", "server.servlet.path"]);

        let server = coordinator.resolve_ancestor_path("web", "server").unwrap().unwrap();
        let keys: Vec<_> = coordinator
            .suggest_keys("web", &server, "", &["port".to_string()])
            .unwrap()
            .into_iter()
            .map(|k| k.display_path)
            .collect();
        assert_eq!(keys, vec!["servlet.path"]);
    }

    #[tokio::test]
    async fn test_values_and_documentation() {
        let temp_dir = tempdir().unwrap();
        write_metadata(
            temp_dir.path(),
            r#"{
                "properties": [{"name": "app.mode", "type": "java.lang.String", "defaultValue": "fast",
                                "description": "Execution mode."}],
                "hints": [{"name": "app.mode", "values": [
                    {"value": "fast", "description": "Skip checks."},
                    {"value": "safe"}
                ]}]
            }"#,
        );
        let coordinator = indexed(temp_dir.path()).await;

        let leaf = coordinator.resolve_ancestor_path("web", "app.mode").unwrap().unwrap();
        let values: Vec<_> = coordinator
            .suggest_values("web", &leaf, "", &[])
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.iter().any(|v| v.display_value == "fast" && v.is_default));

        let excluded = coordinator
            .suggest_values("web", &leaf, "", &["FAST".to_string()])
            .unwrap();
        assert_eq!(excluded.len(), 1);

        let doc = coordinator.documentation_for(&leaf).unwrap();
        assert!(doc.starts_with("String app.mode = fast"));
        assert!(doc.contains("Execution mode."));

        let value_doc = coordinator.value_documentation_for(&leaf, "fast").unwrap();
        assert!(value_doc.contains("Skip checks."));
    }

    #[tokio::test]
    async fn test_foreign_handle_rejected() {
        let temp_dir = tempdir().unwrap();
        let coordinator = indexed(temp_dir.path()).await;
        coordinator.register_roots("api", vec![], vec![]).unwrap();

        let root = coordinator.resolve_ancestor_path("web", "").unwrap().unwrap();
        assert!(matches!(
            coordinator.suggest_keys("api", &root, "", &[]),
            Err(CoreError::ForeignHandle { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_metrics_recorded() {
        let temp_dir = tempdir().unwrap();
        let coordinator = indexed(temp_dir.path()).await;

        let root = coordinator.resolve_ancestor_path("web", "").unwrap().unwrap();
        coordinator.suggest_keys("web", &root, "a", &[]).unwrap();

        assert_eq!(coordinator.metrics().queries_total, 2);
        assert_eq!(coordinator.metrics().passes_committed, 1);
        assert_eq!(coordinator.latency().sample_count("keys"), 1);
    }
}
