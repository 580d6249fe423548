//! Locating metadata documents in classpath roots.

use crate::{IndexerError, SourceInfo};
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, warn};

/// Metadata documents a root may carry, relative to the root.
pub const METADATA_FILES: [&str; 2] = [
    "META-INF/spring-configuration-metadata.json",
    "META-INF/additional-spring-configuration-metadata.json",
];

/// Type catalog a root may carry, relative to the root.
pub const TYPE_CATALOG_FILE: &str = "META-INF/propdex-types.json";

/// Everything found in one pass over the roots.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    /// One entry per metadata document, plus one per root without any
    pub sources: Vec<SourceInfo>,
    /// Type catalog files
    pub type_catalogs: Vec<PathBuf>,
}

/// Enumerates the sources currently visible to a module.
pub trait SourceDiscovery: Send + Sync {
    fn discover(&self) -> Result<Discovered, IndexerError>;
}

/// Options for [`ClasspathDiscovery`].
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Follow symbolic links while walking
    pub follow_symlinks: bool,
    /// How deep below a root to look for `META-INF`
    pub max_depth: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            max_depth: 6,
        }
    }
}

/// Discovers sources in directory roots on disk.
///
/// Archives are recorded as seen but not opened; extract them into a
/// directory root to index their metadata.
#[derive(Debug, Clone)]
pub struct ClasspathDiscovery {
    roots: Vec<PathBuf>,
    options: DiscoveryOptions,
}

impl ClasspathDiscovery {
    pub fn new(roots: Vec<PathBuf>, options: DiscoveryOptions) -> Self {
        Self { roots, options }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn discover_root(&self, root: &Path, found: &mut Discovered) -> Result<(), IndexerError> {
        if root.is_file() {
            let archive = root
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "jar" | "zip" | "war"));
            if archive {
                debug!(root = ?root, "Archive root recorded without reading");
                found.sources.push(SourceInfo::without_metadata(root, true));
            }
            return Ok(());
        }
        if !root.is_dir() {
            debug!(root = ?root, "Classpath root not visible");
            return Ok(());
        }

        let files = self.walk(root)?;
        let mut documents = 0;
        for file in files {
            if matches_suffix(&file, TYPE_CATALOG_FILE) {
                found.type_catalogs.push(file);
                continue;
            }
            let Some(owner) = METADATA_FILES
                .iter()
                .find_map(|name| owner_root(&file, name))
            else {
                continue;
            };
            match SourceInfo::from_metadata_file(&owner, &file) {
                Ok(info) => {
                    documents += 1;
                    found.sources.push(info);
                }
                Err(e) => warn!(path = ?file, error = %e, "Failed to read metadata file"),
            }
        }

        if documents == 0 {
            found.sources.push(SourceInfo::without_metadata(root, false));
        }
        Ok(())
    }

    /// Files below `root` that may be metadata or catalogs, sorted.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, IndexerError> {
        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(root)
            .follow_links(self.options.follow_symlinks)
            .standard_filters(false)
            .max_depth(Some(self.options.max_depth))
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) => {
                        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                        let in_meta_inf = entry
                            .path()
                            .parent()
                            .and_then(|p| p.file_name())
                            .is_some_and(|name| name == "META-INF");
                        if is_file && in_meta_inf {
                            let _ = tx.send(entry.into_path());
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Walk error");
                    }
                }
                WalkState::Continue
            })
        });

        drop(tx);

        let mut files: Vec<PathBuf> = rx.into_iter().collect();
        files.sort();
        Ok(files)
    }
}

impl SourceDiscovery for ClasspathDiscovery {
    fn discover(&self) -> Result<Discovered, IndexerError> {
        let mut found = Discovered::default();
        for root in &self.roots {
            self.discover_root(root, &mut found)?;
        }
        found.sources.sort_by(|a, b| a.id.cmp(&b.id));
        found.sources.dedup_by(|a, b| a.id == b.id);

        info!(
            roots = self.roots.len(),
            sources = found.sources.len(),
            catalogs = found.type_catalogs.len(),
            "Discovered sources"
        );
        Ok(found)
    }
}

fn matches_suffix(file: &Path, relative: &str) -> bool {
    file.ends_with(relative)
}

/// Root that owns `file` when it is the metadata document `relative`.
fn owner_root(file: &Path, relative: &str) -> Option<PathBuf> {
    if !file.ends_with(relative) {
        return None;
    }
    // META-INF/<name> is two components
    file.parent()?.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_directory_with_both_documents() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), METADATA_FILES[0], "{}");
        write(temp_dir.path(), METADATA_FILES[1], "{}");

        let discovery = ClasspathDiscovery::new(vec![temp_dir.path().to_path_buf()], DiscoveryOptions::default());
        let found = discovery.discover().unwrap();

        assert_eq!(found.sources.len(), 2);
        assert!(found.sources.iter().all(|s| s.contains_metadata_file()));
        assert!(found.sources.iter().all(|s| s.root == temp_dir.path()));
    }

    #[test]
    fn test_nested_roots() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), &format!("lib-a/{}", METADATA_FILES[0]), "{}");
        write(temp_dir.path(), &format!("lib-b/{}", METADATA_FILES[0]), "{}");
        write(temp_dir.path(), &format!("lib-b/{}", TYPE_CATALOG_FILE), "{}");
        write(temp_dir.path(), "lib-b/META-INF/MANIFEST.MF", "");

        let discovery = ClasspathDiscovery::new(vec![temp_dir.path().to_path_buf()], DiscoveryOptions::default());
        let found = discovery.discover().unwrap();

        assert_eq!(found.sources.len(), 2);
        assert_eq!(found.type_catalogs.len(), 1);
        assert!(found.sources[0].root.ends_with("lib-a"));
    }

    #[test]
    fn test_root_without_metadata() {
        let temp_dir = tempdir().unwrap();
        let discovery = ClasspathDiscovery::new(vec![temp_dir.path().to_path_buf()], DiscoveryOptions::default());
        let found = discovery.discover().unwrap();

        assert_eq!(found.sources.len(), 1);
        assert!(!found.sources[0].contains_metadata_file());
    }

    #[test]
    fn test_archive_and_missing_roots() {
        let temp_dir = tempdir().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        fs::write(&jar, b"PK").unwrap();

        let discovery = ClasspathDiscovery::new(
            vec![jar, temp_dir.path().join("missing")],
            DiscoveryOptions::default(),
        );
        let found = discovery.discover().unwrap();

        assert_eq!(found.sources.len(), 1);
        assert!(found.sources[0].archive);
    }
}
