//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during indexing operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata document could not be parsed
    #[error("Metadata parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Declared type name could not be parsed
    #[error("Invalid type name '{name}': {reason}")]
    InvalidTypeName { name: String, reason: String },
}

impl IndexerError {
    /// Build a parse error for a metadata file.
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        IndexerError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}
