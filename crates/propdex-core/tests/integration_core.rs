//! Coordinator tests over real classpath directories.

use propdex_core::{EngineConfig, IndexCoordinator, ModuleConfig, PassOutcome};
use propdex_indexer::discovery::{METADATA_FILES, TYPE_CATALOG_FILE};
use propdex_indexer::TrieEntry;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn keys(coordinator: &IndexCoordinator, ancestor: &str, query: &str) -> Vec<String> {
    let handle = coordinator
        .resolve_ancestor_path("app", ancestor)
        .unwrap()
        .unwrap();
    coordinator
        .suggest_keys("app", &handle, query, &[])
        .unwrap()
        .into_iter()
        .map(|k| k.full_path)
        .collect()
}

fn coordinator_for(roots: &[&Path]) -> IndexCoordinator {
    let config = EngineConfig {
        modules: vec![ModuleConfig {
            id: "app".to_string(),
            roots: roots.iter().map(|r| r.to_path_buf()).collect(),
            type_catalogs: vec![],
        }],
        ..Default::default()
    };
    IndexCoordinator::new(config).unwrap()
}

fn values(coordinator: &IndexCoordinator, path: &str) -> Vec<String> {
    let leaf = coordinator.resolve_ancestor_path("app", path).unwrap().unwrap();
    coordinator
        .suggest_values("app", &leaf, "", &[])
        .unwrap()
        .into_iter()
        .map(|v| v.display_value)
        .collect()
}

fn doc(coordinator: &IndexCoordinator, path: &str) -> Option<String> {
    let handle = coordinator.resolve_ancestor_path("app", path).unwrap()?;
    coordinator.documentation_for(&handle)
}

/// Every indexed node with its documentation and value choices.
fn observe(coordinator: &IndexCoordinator) -> Vec<(TrieEntry, Option<String>, Vec<String>)> {
    let snapshot = coordinator.module("app").unwrap().snapshot();
    snapshot
        .trie
        .entries()
        .into_iter()
        .map(|entry| {
            let documentation = doc(coordinator, &entry.path);
            let choices = if entry.kind == "property" {
                values(coordinator, &entry.path)
            } else {
                Vec::new()
            };
            (entry, documentation, choices)
        })
        .collect()
}

async fn observe_fresh(roots: &[&Path]) -> Vec<(TrieEntry, Option<String>, Vec<String>)> {
    let coordinator = coordinator_for(roots);
    coordinator.reindex_now("app").await.unwrap();
    observe(&coordinator)
}

#[tokio::test]
async fn test_sources_come_and_go() {
    let temp_dir = tempdir().unwrap();
    let web = temp_dir.path().join("web");
    let data = temp_dir.path().join("data");
    write(&web, METADATA_FILES[0], r#"{"properties": [{"name": "server.port"}]}"#);
    write(&data, METADATA_FILES[0], r#"{"properties": [{"name": "spring.datasource.url"}]}"#);

    let coordinator = coordinator_for(&[&web, &data]);
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(keys(&coordinator, "", ""), vec!["server.port", "spring.datasource.url"]);

    fs::remove_file(data.join(METADATA_FILES[0])).unwrap();
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(keys(&coordinator, "", ""), vec!["server.port"]);

    let stats = coordinator.stats("app").unwrap();
    assert_eq!(stats.generation, 2);
    // The emptied root is still remembered as seen
    assert_eq!(stats.sources, 2);
}

#[tokio::test]
async fn test_modified_source_is_replaced() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.old"}]}"#);
    let coordinator = coordinator_for(&[temp_dir.path()]);
    coordinator.reindex_now("app").await.unwrap();

    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.new"}]}"#);
    coordinator.reindex_now("app").await.unwrap();

    assert_eq!(keys(&coordinator, "", "a."), vec!["a.new"]);
    assert!(coordinator.resolve_ancestor_path("app", "a.old").unwrap().is_none());
}

#[tokio::test]
async fn test_hint_from_another_root_survives_property_rewrite() {
    let temp_dir = tempdir().unwrap();
    let props = temp_dir.path().join("a-props");
    let hints = temp_dir.path().join("b-hints");
    write(&props, METADATA_FILES[0], r#"{"properties": [{"name": "app.mode", "type": "java.lang.String"}]}"#);
    write(
        &hints,
        METADATA_FILES[0],
        r#"{"hints": [{"name": "app.mode", "values": [{"value": "fast"}, {"value": "safe"}]}]}"#,
    );

    let coordinator = coordinator_for(&[&props, &hints]);
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(values(&coordinator, "app.mode"), vec!["fast", "safe"]);

    write(
        &props,
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.mode", "type": "java.lang.String", "description": "Run mode."}]}"#,
    );
    coordinator.reindex_now("app").await.unwrap();

    assert_eq!(values(&coordinator, "app.mode"), vec!["fast", "safe"]);
    assert_eq!(observe(&coordinator), observe_fresh(&[&props, &hints]).await);
}

#[tokio::test]
async fn test_hint_merged_before_its_property() {
    let temp_dir = tempdir().unwrap();
    let hints = temp_dir.path().join("a-hints");
    let props = temp_dir.path().join("b-props");
    write(
        &hints,
        METADATA_FILES[0],
        r#"{"hints": [{"name": "app.mode", "values": [{"value": "fast"}, {"value": "safe"}]}]}"#,
    );
    write(&props, METADATA_FILES[0], r#"{"properties": [{"name": "app.mode", "type": "java.lang.String"}]}"#);

    let coordinator = coordinator_for(&[&hints, &props]);
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(values(&coordinator, "app.mode"), vec!["fast", "safe"]);

    // Same root, additional document sorting before the main one
    let single = temp_dir.path().join("single");
    write(
        &single,
        METADATA_FILES[1],
        r#"{"hints": [{"name": "app.level", "values": [{"value": "low"}]}]}"#,
    );
    write(&single, METADATA_FILES[0], r#"{"properties": [{"name": "app.level"}]}"#);
    coordinator.register_roots("single", vec![single.clone()], vec![]).unwrap();
    coordinator.reindex_now("single").await.unwrap();

    let leaf = coordinator.resolve_ancestor_path("single", "app.level").unwrap().unwrap();
    let found: Vec<_> = coordinator
        .suggest_values("single", &leaf, "", &[])
        .unwrap()
        .into_iter()
        .map(|v| v.display_value)
        .collect();
    assert_eq!(found, vec!["low"]);
}

#[tokio::test]
async fn test_shared_key_follows_rewritten_declaration() {
    let temp_dir = tempdir().unwrap();
    let a = temp_dir.path().join("a-lib");
    let b = temp_dir.path().join("b-lib");
    write(
        &a,
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.mode", "type": "java.lang.String", "description": "Old."}]}"#,
    );
    write(
        &b,
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.mode", "type": "java.lang.String", "description": "From b."}]}"#,
    );

    let coordinator = coordinator_for(&[&a, &b]);
    coordinator.reindex_now("app").await.unwrap();
    assert!(doc(&coordinator, "app.mode").unwrap().contains("Old."));

    write(
        &a,
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.mode", "type": "java.lang.Boolean", "description": "New."}]}"#,
    );
    coordinator.reindex_now("app").await.unwrap();

    let rewritten = doc(&coordinator, "app.mode").unwrap();
    assert!(rewritten.contains("Boolean"));
    assert!(rewritten.contains("New."));
    assert_eq!(observe(&coordinator), observe_fresh(&[&a, &b]).await);

    fs::remove_file(a.join(METADATA_FILES[0])).unwrap();
    coordinator.reindex_now("app").await.unwrap();
    assert!(doc(&coordinator, "app.mode").unwrap().contains("From b."));
    assert_eq!(observe(&coordinator), observe_fresh(&[&a, &b]).await);
}

#[tokio::test]
async fn test_incremental_passes_match_fresh_builds() {
    let temp_dir = tempdir().unwrap();
    let a = temp_dir.path().join("lib-a");
    let b = temp_dir.path().join("lib-b");
    let c = temp_dir.path().join("lib-c");
    let roots = [a.as_path(), b.as_path(), c.as_path()];
    write(
        &a,
        METADATA_FILES[0],
        r#"{
            "groups": [{"name": "app", "description": "Application from a."}],
            "properties": [
                {"name": "app.mode", "type": "java.lang.String", "description": "From a."},
                {"name": "app.size", "type": "java.lang.Integer"}
            ],
            "hints": [{"name": "app.size", "values": [{"value": 1}, {"value": 2}]}]
        }"#,
    );
    write(
        &b,
        METADATA_FILES[0],
        r#"{
            "groups": [{"name": "app", "description": "Application from b."}],
            "properties": [
                {"name": "app.mode", "type": "java.lang.String", "description": "From b."},
                {"name": "app.name", "type": "java.lang.String"}
            ],
            "hints": [
                {"name": "app.mode", "values": [{"value": "fast"}, {"value": "safe"}]},
                {"name": "app.extra", "values": [{"value": "on"}]}
            ]
        }"#,
    );

    let coordinator = coordinator_for(&roots);
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(observe(&coordinator), observe_fresh(&roots).await);

    write(
        &a,
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.mode", "type": "java.lang.Boolean", "description": "Flag from a."}]}"#,
    );
    coordinator.reindex_now("app").await.unwrap();
    assert!(coordinator.resolve_ancestor_path("app", "app.size").unwrap().is_none());
    assert_eq!(observe(&coordinator), observe_fresh(&roots).await);

    write(&c, METADATA_FILES[0], r#"{"properties": [{"name": "app.extra"}]}"#);
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(values(&coordinator, "app.extra"), vec!["on"]);
    assert_eq!(observe(&coordinator), observe_fresh(&roots).await);

    fs::remove_file(a.join(METADATA_FILES[0])).unwrap();
    coordinator.reindex_now("app").await.unwrap();
    assert_eq!(values(&coordinator, "app.mode"), vec!["fast", "safe"]);
    assert_eq!(observe(&coordinator), observe_fresh(&roots).await);
}

#[tokio::test]
async fn test_unchanged_pass_keeps_structure() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.b"}, {"name": "a.c"}]}"#);
    let coordinator = coordinator_for(&[temp_dir.path()]);

    coordinator.reindex_now("app").await.unwrap();
    let before = coordinator.render_tree("app").unwrap();
    coordinator.reindex_now("app").await.unwrap();

    assert_eq!(coordinator.render_tree("app").unwrap(), before);
    assert_eq!(coordinator.stats("app").unwrap().generation, 2);
}

#[tokio::test]
async fn test_class_backed_properties() {
    let temp_dir = tempdir().unwrap();
    write(
        temp_dir.path(),
        METADATA_FILES[0],
        r#"{"properties": [{"name": "app.pool", "type": "com.acme.Pool"}]}"#,
    );
    write(
        temp_dir.path(),
        TYPE_CATALOG_FILE,
        r#"{"types": {
            "com.acme.Pool": {"kind": "bean", "members": [
                {"name": "max-size", "type": "int", "description": "Upper bound."},
                {"name": "mode", "type": "com.acme.Mode"},
                {"name": "parent", "type": "com.acme.Pool"}
            ]},
            "com.acme.Mode": {"kind": "enum", "constants": [{"name": "FAST"}, {"name": "SAFE"}]}
        }}"#,
    );
    let coordinator = coordinator_for(&[temp_dir.path()]);
    coordinator.reindex_now("app").await.unwrap();

    assert_eq!(
        keys(&coordinator, "app.pool", ""),
        vec!["app.pool.max-size", "app.pool.mode", "app.pool.parent"]
    );
    assert_eq!(
        keys(&coordinator, "", "app.pool.parent.parent.ma"),
        vec!["app.pool.parent.parent.max-size"]
    );

    let mode = coordinator
        .resolve_ancestor_path("app", "app.pool.parent.mode")
        .unwrap()
        .unwrap();
    let values: Vec<_> = coordinator
        .suggest_values("app", &mode, "s", &[])
        .unwrap()
        .into_iter()
        .map(|v| v.display_value)
        .collect();
    assert_eq!(values, vec!["SAFE"]);

    let doc = coordinator
        .documentation_for(
            &coordinator
                .resolve_ancestor_path("app", "app.pool.max-size")
                .unwrap()
                .unwrap(),
        )
        .unwrap();
    assert!(doc.starts_with("int app.pool.max-size"));
    assert!(doc.contains("Upper bound."));
}

#[tokio::test]
async fn test_handles_keep_their_generation() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.b"}]}"#);
    let coordinator = coordinator_for(&[temp_dir.path()]);
    coordinator.reindex_now("app").await.unwrap();

    let old_root = coordinator.resolve_ancestor_path("app", "").unwrap().unwrap();
    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.c"}]}"#);
    coordinator.reindex_now("app").await.unwrap();

    let old: Vec<_> = coordinator
        .suggest_keys("app", &old_root, "a", &[])
        .unwrap()
        .into_iter()
        .map(|k| k.full_path)
        .collect();
    assert_eq!(old, vec!["a.b"]);
    assert_eq!(keys(&coordinator, "", "a"), vec!["a.c"]);
}

#[tokio::test]
async fn test_fire_and_forget_reindex() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), METADATA_FILES[0], r#"{"properties": [{"name": "a.b"}]}"#);
    let coordinator = coordinator_for(&[temp_dir.path()]);

    coordinator.reindex("app").unwrap();
    coordinator.reindex_all();
    coordinator.wait_idle("app").await.unwrap();

    assert_eq!(keys(&coordinator, "", ""), vec!["a.b"]);
    // The first pass was superseded before it could publish
    assert_eq!(coordinator.metrics().passes_committed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queries_run_during_reindex() {
    let temp_dir = tempdir().unwrap();
    let properties: Vec<String> = (0..200)
        .map(|i| format!(r#"{{"name": "group{}.key{}"}}"#, i % 10, i))
        .collect();
    write(
        temp_dir.path(),
        METADATA_FILES[0],
        &format!(r#"{{"properties": [{}]}}"#, properties.join(",")),
    );
    let coordinator = Arc::new(coordinator_for(&[temp_dir.path()]));
    coordinator.reindex_now("app").await.unwrap();

    let reader = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            for _ in 0..50 {
                let root = coordinator.resolve_ancestor_path("app", "").unwrap().unwrap();
                let found = coordinator.suggest_keys("app", &root, "group1.", &[]).unwrap();
                assert_eq!(found.len(), 20);
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..3 {
        let outcome = coordinator.reindex_now("app").await.unwrap();
        assert!(matches!(outcome, PassOutcome::Committed(_)));
    }
    reader.await.unwrap();
}
