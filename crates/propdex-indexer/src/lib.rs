//! Propdex Indexer
//!
//! This crate provides the metadata index for Propdex, including:
//! - Discovery of configuration metadata documents in classpath roots
//! - A dotted-path trie of groups and properties with per-source bookkeeping
//! - Hint tables for known values and map keys
//! - A lazily expanded class graph below class-typed properties
//! - Key and value suggestions plus rendered documentation
//! - Classpath watching with debounced change batches

pub mod class_graph;
pub mod discovery;
pub mod docs;
mod error;
pub mod hint;
pub mod key;
pub mod metadata;
pub mod query;
mod source;
pub mod suggestion;
pub mod tree;
pub mod types;
pub mod watcher;

pub use class_graph::{CacheStats, ClassGraphCache, ClassNode, GraphContext};
pub use discovery::{ClasspathDiscovery, Discovered, DiscoveryOptions, SourceDiscovery};
pub use error::IndexerError;
pub use key::{sanitize, KeyPath};
pub use metadata::{DeprecationLevel, MetadataDocument};
pub use query::{KeyQuery, PathElement, QueryContext};
pub use source::{compute_hash, SourceId, SourceInfo};
pub use suggestion::{KeySuggestion, ValueSuggestion};
pub use tree::{
    MergeOutcome, MergeReport, MetadataIndexBuilder, NodeId, NodeKind, SuggestionTrie, TrieEntry,
};
pub use types::{SuggestionNodeType, TypeCatalog, TypeRef, TypeResolver};
pub use watcher::{ChangeBatcher, ChangeKind, ClasspathChange, ClasspathWatcher, WatcherOptions};
