//! Core error types for Propdex.

use propdex_indexer::IndexerError;
use thiserror::Error;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// No module registered under this id
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Module registered twice
    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    /// A node handle was used with a module it does not belong to
    #[error("Handle belongs to module {handle}, not {requested}")]
    ForeignHandle { handle: String, requested: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Indexer failure
    #[error(transparent)]
    Indexer(#[from] IndexerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Indexing task panicked or was aborted
    #[error("Indexing task failed: {0}")]
    Join(String),
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::Join(e.to_string())
    }
}
