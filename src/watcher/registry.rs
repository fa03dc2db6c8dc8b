//! Registry of live watch handles and the directories they observe.
//!
//! Owns the bidirectional `handle <-> directory` association and the
//! recursive walk that extends coverage to a whole subtree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::WatchResult;
use super::event::{EventKind, WatchHandle};
use super::service::WatchService;

/// Live watch entries keyed by handle, with a reverse index by path.
///
/// At most one live handle exists per directory. Registering a directory
/// that is already watched asks the service again (re-arming the OS watch,
/// which matters when the directory was deleted and recreated) and replaces
/// the old entry if the service issues a different handle.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: HashMap<WatchHandle, PathBuf>,
    by_path: HashMap<PathBuf, WatchHandle>,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single directory with the service.
    ///
    /// Failures (unreadable directory, permission denied, path vanished) are
    /// logged and returned; the directory is simply left unmonitored.
    pub fn register_one<S>(&mut self, service: &mut S, path: &Path) -> WatchResult<WatchHandle>
    where
        S: WatchService + ?Sized,
    {
        match service.register(path, &EventKind::ALL) {
            Ok(handle) => {
                crate::debug_event!("registry", "watching", "{} {handle}", path.display());
                if let Some(previous) = self.by_path.insert(path.to_path_buf(), handle)
                    && previous != handle
                {
                    self.entries.remove(&previous);
                }
                if let Some(old) = self.entries.insert(handle, path.to_path_buf())
                    && old.as_path() != path
                {
                    self.by_path.remove(&old);
                }
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!("[registry] failed to watch {}: {e}", path.display());
                Err(e)
            }
        }
    }

    /// Register `root` and every directory beneath it.
    ///
    /// Symlinks are not followed, so they act as leaves and cannot form
    /// cycles. A directory that cannot be read is skipped without aborting
    /// the walk of its siblings. Returns the number of new entries.
    pub fn register_tree<S>(&mut self, service: &mut S, root: &Path) -> usize
    where
        S: WatchService + ?Sized,
    {
        let before = self.entries.len();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e.path().unwrap_or(root);
                    tracing::warn!("[registry] cannot walk {}: {e}", at.display());
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            // Already logged by register_one
            let _ = self.register_one(service, entry.path());
        }

        self.entries.len().saturating_sub(before)
    }

    /// Resolve a handle to the directory it watches.
    pub fn lookup(&self, handle: WatchHandle) -> Option<&Path> {
        self.entries.get(&handle).map(PathBuf::as_path)
    }

    /// Remove the entry for `handle`. No-op if it is already gone.
    pub fn retire(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let path = self.entries.remove(&handle)?;
        if self.by_path.get(&path) == Some(&handle) {
            self.by_path.remove(&path);
        }
        Some(path)
    }

    /// Handle currently watching `path`, if any.
    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.by_path.get(path).copied()
    }

    /// Whether `path` has a live entry.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    /// True once every watched directory has been retired.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All watched directories, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.values().map(PathBuf::as_path)
    }
}
