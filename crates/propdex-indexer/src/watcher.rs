//! Watching classpath roots for metadata changes.
//!
//! Only metadata documents, type catalogs and archives matter; every
//! other event under a root is dropped before it reaches the channel.

use crate::discovery::{METADATA_FILES, TYPE_CATALOG_FILE};
use crate::IndexerError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change to a file that can affect a module's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathChange {
    /// Changed file
    pub path: PathBuf,
    /// Watched root the file lives under
    pub root: PathBuf,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Quiet period before a burst of events is delivered
    pub debounce: Duration,
    /// Channel capacity
    pub capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            capacity: 1024,
        }
    }
}

/// Debounced watcher over a set of classpath roots.
pub struct ClasspathWatcher {
    options: WatcherOptions,
    roots: Vec<PathBuf>,
    tx: mpsc::Sender<ClasspathChange>,
    rx: mpsc::Receiver<ClasspathChange>,
    debouncers: Vec<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl ClasspathWatcher {
    pub fn new(options: WatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        Self {
            options,
            roots: Vec::new(),
            tx,
            rx,
            debouncers: Vec::new(),
        }
    }

    /// Start watching `root`. Archive roots are watched through their
    /// parent directory.
    pub fn watch(&mut self, root: &Path) -> Result<(), IndexerError> {
        let root = root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(root.to_path_buf()))?;
        let (target, mode) = if root.is_dir() {
            (root.clone(), RecursiveMode::Recursive)
        } else {
            let parent = root
                .parent()
                .ok_or_else(|| IndexerError::NotFound(root.clone()))?
                .to_path_buf();
            (parent, RecursiveMode::NonRecursive)
        };

        let tx = self.tx.clone();
        let owner = root.clone();
        let mut debouncer = new_debouncer(
            self.options.debounce,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for change in convert_event(&event.event, &owner) {
                            if let Err(e) = tx.blocking_send(change) {
                                error!(error = %e, "Failed to send classpath change");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        debouncer
            .watch(&target, mode)
            .map_err(|e: notify::Error| IndexerError::Watcher(e.to_string()))?;

        info!(root = ?root, "Watching classpath root");
        self.roots.push(root);
        self.debouncers.push(debouncer);
        Ok(())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub async fn next(&mut self) -> Option<ClasspathChange> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<ClasspathChange> {
        self.rx.try_recv().ok()
    }
}

/// Whether a change to `path` under `root` can alter the index.
pub fn is_relevant(path: &Path, root: &Path) -> bool {
    if root.is_file() || root.extension().is_some_and(|e| e == "jar") {
        return path == root;
    }
    path.ends_with(TYPE_CATALOG_FILE) || METADATA_FILES.iter().any(|name| path.ends_with(name))
}

fn convert_event(event: &Event, root: &Path) -> Vec<ClasspathChange> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Any | EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| is_relevant(path, root))
        .map(|path| {
            debug!(path = ?path, kind = ?kind, "Classpath change detected");
            ClasspathChange {
                path: path.clone(),
                root: root.to_path_buf(),
                kind,
            }
        })
        .collect()
}

/// Collects changes until a quiet period has passed.
pub struct ChangeBatcher {
    changes: Vec<ClasspathChange>,
    quiet_period: Duration,
    last_change: Instant,
}

impl ChangeBatcher {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            changes: Vec::new(),
            quiet_period,
            last_change: Instant::now(),
        }
    }

    pub fn add(&mut self, change: ClasspathChange) {
        self.last_change = Instant::now();
        match self.changes.iter_mut().find(|c| c.path == change.path) {
            Some(existing) => {
                // Delete wins over later modifications
                if change.kind == ChangeKind::Deleted || existing.kind != ChangeKind::Deleted {
                    existing.kind = change.kind;
                }
            }
            None => self.changes.push(change),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.changes.is_empty() && self.last_change.elapsed() >= self.quiet_period
    }

    pub fn take(&mut self) -> Vec<ClasspathChange> {
        std::mem::take(&mut self.changes)
    }

    /// Roots touched by the pending changes.
    pub fn dirty_roots(&self) -> BTreeSet<PathBuf> {
        self.changes.iter().map(|c| c.root.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
