//! Propdex Core Components
//!
//! This crate owns the per-module indexes: configuration, background
//! cancellable reindexing, atomically published snapshots, and the query
//! facade used by editors and the CLI.

mod config;
mod coordinator;
mod error;
mod metrics;
mod module;
mod pass;
mod snapshot;

pub use config::{default_config_dir, EngineConfig, ModuleConfig};
pub use coordinator::{IndexCoordinator, NodeHandle};
pub use error::CoreError;
pub use metrics::{LatencyTracker, Metrics, MetricsSnapshot, PassResult};
pub use module::ModuleIndex;
pub use pass::{PassOutcome, SourceDiff};
pub use snapshot::{IndexSnapshot, IndexStats};
