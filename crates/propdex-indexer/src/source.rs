//! Source descriptors.
//!
//! A source is one metadata document inside one classpath root. Its marker
//! is a content hash, so a rewritten but identical file is not a change.

use crate::IndexerError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a source, stable across passes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity and freshness of one metadata-bearing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Source identity
    pub id: SourceId,

    /// Classpath root the source was found in
    pub root: PathBuf,

    /// Metadata document, absent when the root carries none
    pub metadata_file: Option<PathBuf>,

    /// Whether the root is an archive rather than a directory
    pub archive: bool,

    /// Freshness signature
    pub marker: String,
}

impl SourceInfo {
    /// Describe a metadata document inside a directory root.
    pub fn from_metadata_file(root: &Path, metadata_file: &Path) -> Result<Self, IndexerError> {
        let content = std::fs::read(metadata_file)?;
        Ok(Self {
            id: SourceId::new(format!("{}!{}", root.display(), relative(root, metadata_file))),
            root: root.to_path_buf(),
            metadata_file: Some(metadata_file.to_path_buf()),
            archive: false,
            marker: compute_hash(&content),
        })
    }

    /// Describe a root that carries no readable metadata document.
    ///
    /// It is still remembered as seen, so its disappearance is noticed.
    pub fn without_metadata(root: &Path, archive: bool) -> Self {
        let marker = std::fs::metadata(root)
            .ok()
            .and_then(|m| {
                let modified = m.modified().ok()?;
                let since = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
                Some(format!("{}:{}", since.as_millis(), m.len()))
            })
            .unwrap_or_default();

        Self {
            id: SourceId::new(root.display().to_string()),
            root: root.to_path_buf(),
            metadata_file: None,
            archive,
            marker,
        }
    }

    pub fn contains_metadata_file(&self) -> bool {
        self.metadata_file.is_some()
    }

    /// Whether `other` describes a different revision of this source.
    pub fn is_modified(&self, other: &SourceInfo) -> bool {
        self.marker != other.marker || self.metadata_file != other.metadata_file
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Compute the hex SHA-256 digest of some content.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn relative(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
