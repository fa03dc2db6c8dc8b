//! Watch service built on `notify`, one non-recursive watch per directory.
//!
//! notify reports paths, not handles, so this service keeps the handle table
//! the OS primitive would otherwise own: every affected path is routed to the
//! handle of its parent directory, queued there, and the handle is signalled
//! once until it is reset.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::event::{EventKind, RawEvent, WatchHandle};
use super::service::{Wakeup, WatchService};
use super::{WatchError, WatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Ready,
    Signalled,
}

/// Device and inode of a watched directory.
type FileId = (u64, u64);

#[derive(Debug)]
struct WatchedDir {
    path: PathBuf,
    id: Option<FileId>,
    kinds: Vec<EventKind>,
    pending: Vec<RawEvent>,
    state: HandleState,
}

/// Interrupts a blocked [`NotifyWatchService::wait_for_signal`].
///
/// Cheap to clone; safe to call from a signal handler thread.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Sender<()>,
}

impl Canceller {
    pub fn cancel(&self) {
        // The service owns a receiver for its whole lifetime
        let _ = self.tx.send(());
    }
}

/// [`WatchService`] backed by `notify::RecommendedWatcher`.
pub struct NotifyWatchService {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    cancel_rx: Receiver<()>,
    cancel_tx: Sender<()>,
    next_id: u64,
    dirs: HashMap<WatchHandle, WatchedDir>,
    by_path: HashMap<PathBuf, WatchHandle>,
    signalled: VecDeque<WatchHandle>,
}

impl NotifyWatchService {
    /// Acquire the OS watch primitive.
    pub fn new() -> WatchResult<Self> {
        let (tx, events) = unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        let (cancel_tx, cancel_rx) = unbounded();

        Ok(Self {
            watcher,
            events,
            cancel_rx,
            cancel_tx,
            next_id: 0,
            dirs: HashMap::new(),
            by_path: HashMap::new(),
            signalled: VecDeque::new(),
        })
    }

    /// Handle that interrupts the blocking wait from another thread.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            tx: self.cancel_tx.clone(),
        }
    }

    fn ingest(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                let err = WatchError::EventError {
                    details: e.to_string(),
                };
                tracing::error!("[watcher] {err}");
                return;
            }
        };

        for (kind, path) in classify(&event) {
            self.route(kind, &path);
        }
    }

    /// Queue `path` against its parent's handle.
    fn route(&mut self, kind: EventKind, path: &Path) {
        // A watched directory that went away takes its subtree with it: wake
        // every handle at or below it so their resets retire them.
        if self.by_path.contains_key(path) && (kind == EventKind::Deleted || !path.is_dir()) {
            let mut stale: Vec<(usize, WatchHandle)> = self
                .by_path
                .iter()
                .filter(|(p, _)| p.starts_with(path))
                .map(|(p, h)| (p.components().count(), *h))
                .collect();
            // Outermost first
            stale.sort_by_key(|(depth, _)| *depth);
            for (_, handle) in stale {
                self.signal(handle);
            }
        }

        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let Some(&handle) = self.by_path.get(parent) else {
            crate::debug_event!("watcher", "unrouted", "{kind} {}", path.display());
            return;
        };
        let Some(dir) = self.dirs.get_mut(&handle) else {
            return;
        };
        if !dir.kinds.contains(&kind) {
            return;
        }

        dir.pending.push(RawEvent::new(kind, handle, name));
        self.signal(handle);
    }

    fn signal(&mut self, handle: WatchHandle) {
        if let Some(dir) = self.dirs.get_mut(&handle)
            && dir.state == HandleState::Ready
        {
            dir.state = HandleState::Signalled;
            self.signalled.push_back(handle);
        }
    }

    fn forget(&mut self, handle: WatchHandle) -> Option<WatchedDir> {
        let dir = self.dirs.remove(&handle)?;
        if self.by_path.get(&dir.path) == Some(&handle) {
            self.by_path.remove(&dir.path);
        }
        self.signalled.retain(|h| *h != handle);
        Some(dir)
    }
}

impl WatchService for NotifyWatchService {
    fn register(&mut self, dir: &Path, kinds: &[EventKind]) -> WatchResult<WatchHandle> {
        if !dir.is_dir() {
            return Err(WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        // Re-arm even when known: the directory may have been recreated.
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let id = file_id(dir);
        if let Some(&handle) = self.by_path.get(dir)
            && let Some(existing) = self.dirs.get_mut(&handle)
        {
            existing.id = id;
            for kind in kinds {
                if !existing.kinds.contains(kind) {
                    existing.kinds.push(*kind);
                }
            }
            return Ok(handle);
        }

        self.next_id += 1;
        let handle = WatchHandle::new(self.next_id);
        self.dirs.insert(
            handle,
            WatchedDir {
                path: dir.to_path_buf(),
                id,
                kinds: kinds.to_vec(),
                pending: Vec::new(),
                state: HandleState::Ready,
            },
        );
        self.by_path.insert(dir.to_path_buf(), handle);

        Ok(handle)
    }

    fn wait_for_signal(&mut self) -> WatchResult<Wakeup> {
        let events = self.events.clone();
        let cancel = self.cancel_rx.clone();

        loop {
            if let Some(handle) = self.signalled.pop_front() {
                return Ok(Wakeup::Signalled(handle));
            }

            crossbeam_channel::select! {
                recv(cancel) -> _ => return Ok(Wakeup::Cancelled),
                recv(events) -> msg => match msg {
                    Ok(res) => {
                        self.ingest(res);
                        // Take everything already delivered before picking a handle
                        while let Ok(res) = events.try_recv() {
                            self.ingest(res);
                        }
                    }
                    Err(_) => return Err(WatchError::ChannelClosed),
                },
            }
        }
    }

    fn pending_events(&mut self, handle: WatchHandle) -> Vec<RawEvent> {
        self.dirs
            .get_mut(&handle)
            .map(|dir| std::mem::take(&mut dir.pending))
            .unwrap_or_default()
    }

    fn reset(&mut self, handle: WatchHandle) -> bool {
        let Some(dir) = self.dirs.get(&handle) else {
            return false;
        };

        if !dir.path.is_dir() {
            if let Some(gone) = self.forget(handle) {
                // A directory renamed within the tree keeps one OS watch, now
                // registered under its new path; leave that one armed.
                let moved = gone.id.is_some() && self.dirs.values().any(|d| d.id == gone.id);
                if !moved {
                    // The OS usually dropped the watch already
                    let _ = self.watcher.unwatch(&gone.path);
                }
            }
            return false;
        }

        let requeue = !dir.pending.is_empty();
        if requeue {
            self.signalled.push_back(handle);
        } else if let Some(dir) = self.dirs.get_mut(&handle) {
            dir.state = HandleState::Ready;
        }
        true
    }
}

#[cfg(unix)]
fn file_id(path: &Path) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn file_id(_path: &Path) -> Option<FileId> {
    None
}

/// Map a notify event onto (kind, affected path) pairs.
///
/// Rename halves become delete/create. `RenameMode::Both` is skipped because
/// backends that emit it also emit the `From` and `To` halves. Renames of
/// unknown direction are classified by whether the path still exists.
fn classify(event: &Event) -> Vec<(EventKind, PathBuf)> {
    let kind = match &event.kind {
        NotifyKind::Create(_) => EventKind::Created,
        NotifyKind::Remove(_) => EventKind::Deleted,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => EventKind::Deleted,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Created,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        NotifyKind::Modify(ModifyKind::Name(_)) => {
            return event
                .paths
                .iter()
                .map(|path| {
                    let kind = if path.exists() {
                        EventKind::Created
                    } else {
                        EventKind::Deleted
                    };
                    (kind, path.clone())
                })
                .collect();
        }
        NotifyKind::Modify(_) | NotifyKind::Any => EventKind::Modified,
        NotifyKind::Access(_) | NotifyKind::Other => return Vec::new(),
    };

    event.paths.iter().map(|path| (kind, path.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn canonical_tempdir() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn test_classify_maps_notify_kinds() {
        let p = PathBuf::from("/w/x");

        let created = Event::new(NotifyKind::Create(CreateKind::File)).add_path(p.clone());
        assert_eq!(classify(&created), vec![(EventKind::Created, p.clone())]);

        let removed = Event::new(NotifyKind::Remove(RemoveKind::Folder)).add_path(p.clone());
        assert_eq!(classify(&removed), vec![(EventKind::Deleted, p.clone())]);

        let written = Event::new(NotifyKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(p.clone());
        assert_eq!(classify(&written), vec![(EventKind::Modified, p.clone())]);

        let from = Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(p.clone());
        assert_eq!(classify(&from), vec![(EventKind::Deleted, p.clone())]);

        let to =
            Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::To))).add_path(p.clone());
        assert_eq!(classify(&to), vec![(EventKind::Created, p.clone())]);
    }

    #[test]
    fn test_classify_skips_access_and_rename_both() {
        let access = Event::new(NotifyKind::Access(AccessKind::Any)).add_path("/w/x".into());
        assert!(classify(&access).is_empty());

        let both = Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/w/x".into())
            .add_path("/w/y".into());
        assert!(classify(&both).is_empty());
    }

    #[test]
    fn test_classify_unknown_rename_uses_existence() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join("here"), "x").unwrap();

        let event = Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(root.join("here"))
            .add_path(root.join("gone"));

        assert_eq!(
            classify(&event),
            vec![
                (EventKind::Created, root.join("here")),
                (EventKind::Deleted, root.join("gone")),
            ]
        );
    }

    #[test]
    fn test_register_rejects_files_and_missing_paths() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join("file"), "x").unwrap();
        let mut service = NotifyWatchService::new().unwrap();

        assert!(service.register(&root.join("file"), &EventKind::ALL).is_err());
        assert!(service.register(&root.join("missing"), &EventKind::ALL).is_err());
    }

    #[test]
    fn test_register_same_directory_returns_same_handle() {
        let (_dir, root) = canonical_tempdir();
        let mut service = NotifyWatchService::new().unwrap();

        let first = service.register(&root, &EventKind::ALL).unwrap();
        let second = service.register(&root, &EventKind::ALL).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_events_routed_to_parent_handle_and_signalled_once() {
        let (_dir, root) = canonical_tempdir();
        let mut service = NotifyWatchService::new().unwrap();
        let handle = service.register(&root, &EventKind::ALL).unwrap();

        service.ingest(Ok(
            Event::new(NotifyKind::Create(CreateKind::File)).add_path(root.join("a.txt"))
        ));
        service.ingest(Ok(Event::new(NotifyKind::Modify(ModifyKind::Data(
            DataChange::Content,
        )))
        .add_path(root.join("a.txt"))));

        assert_eq!(service.wait_for_signal().unwrap(), Wakeup::Signalled(handle));
        assert!(service.signalled.is_empty());

        let events = service.pending_events(handle);
        assert_eq!(
            events,
            vec![
                RawEvent::new(EventKind::Created, handle, "a.txt"),
                RawEvent::new(EventKind::Modified, handle, "a.txt"),
            ]
        );
        assert!(service.pending_events(handle).is_empty());
        assert!(service.reset(handle));
    }

    #[test]
    fn test_reset_requeues_when_events_arrived_meanwhile() {
        let (_dir, root) = canonical_tempdir();
        let mut service = NotifyWatchService::new().unwrap();
        let handle = service.register(&root, &EventKind::ALL).unwrap();

        service.ingest(Ok(
            Event::new(NotifyKind::Create(CreateKind::File)).add_path(root.join("one"))
        ));
        assert_eq!(service.wait_for_signal().unwrap(), Wakeup::Signalled(handle));
        service.pending_events(handle);

        service.ingest(Ok(
            Event::new(NotifyKind::Create(CreateKind::File)).add_path(root.join("two"))
        ));
        assert!(service.reset(handle));
        assert_eq!(service.wait_for_signal().unwrap(), Wakeup::Signalled(handle));
        assert_eq!(
            service.pending_events(handle),
            vec![RawEvent::new(EventKind::Created, handle, "two")]
        );
    }

    #[test]
    fn test_unrequested_kinds_are_dropped() {
        let (_dir, root) = canonical_tempdir();
        let mut service = NotifyWatchService::new().unwrap();
        let handle = service.register(&root, &[EventKind::Created]).unwrap();

        service.ingest(Ok(
            Event::new(NotifyKind::Remove(RemoveKind::File)).add_path(root.join("gone"))
        ));

        assert!(service.signalled.is_empty());
        assert!(service.pending_events(handle).is_empty());
    }

    #[test]
    fn test_deleted_directory_signals_own_handle_and_reset_invalidates() {
        let (_dir, root) = canonical_tempdir();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        let mut service = NotifyWatchService::new().unwrap();
        let parent = service.register(&root, &EventKind::ALL).unwrap();
        let child = service.register(&sub, &EventKind::ALL).unwrap();

        fs::remove_dir(&sub).unwrap();
        service.ingest(Ok(
            Event::new(NotifyKind::Remove(RemoveKind::Folder)).add_path(sub.clone())
        ));

        let mut woken = vec![
            service.wait_for_signal().unwrap(),
            service.wait_for_signal().unwrap(),
        ];
        woken.sort_by_key(|w| match w {
            Wakeup::Signalled(h) => h.id(),
            Wakeup::Cancelled => u64::MAX,
        });
        assert_eq!(woken, vec![Wakeup::Signalled(parent), Wakeup::Signalled(child)]);

        assert_eq!(
            service.pending_events(parent),
            vec![RawEvent::new(EventKind::Deleted, parent, "sub")]
        );
        assert!(service.pending_events(child).is_empty());
        assert!(!service.reset(child));
        // Invalid handles stay invalid
        assert!(!service.reset(child));
        assert!(service.reset(parent));
    }

    #[test]
    fn test_renamed_directory_signals_whole_subtree() {
        let (_dir, root) = canonical_tempdir();
        fs::create_dir_all(root.join("a/b")).unwrap();
        let mut service = NotifyWatchService::new().unwrap();
        let parent = service.register(&root, &EventKind::ALL).unwrap();
        let a = service.register(&root.join("a"), &EventKind::ALL).unwrap();
        let b = service.register(&root.join("a/b"), &EventKind::ALL).unwrap();

        fs::rename(root.join("a"), root.join("x")).unwrap();
        service.ingest(Ok(Event::new(NotifyKind::Modify(ModifyKind::Name(
            RenameMode::From,
        )))
        .add_path(root.join("a"))));

        let woken: Vec<_> = (0..3).map(|_| service.wait_for_signal().unwrap()).collect();
        assert_eq!(
            woken,
            vec![
                Wakeup::Signalled(a),
                Wakeup::Signalled(b),
                Wakeup::Signalled(parent)
            ]
        );

        assert!(!service.reset(a));
        assert!(!service.reset(b));
        assert!(service.reset(parent));
        assert!(service.by_path.keys().all(|p| p == &root));
    }

    #[cfg(unix)]
    #[test]
    fn test_moved_directory_registered_again_shares_file_id() {
        let (_dir, root) = canonical_tempdir();
        fs::create_dir_all(root.join("a/b")).unwrap();
        let mut service = NotifyWatchService::new().unwrap();
        let old = service.register(&root.join("a/b"), &EventKind::ALL).unwrap();

        fs::rename(root.join("a"), root.join("x")).unwrap();
        let new = service.register(&root.join("x/b"), &EventKind::ALL).unwrap();

        assert_ne!(old, new);
        assert!(service.dirs[&new].id.is_some());
        assert_eq!(service.dirs[&old].id, service.dirs[&new].id);
        assert!(!service.reset(old));
        assert!(service.reset(new));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let mut service = NotifyWatchService::new().unwrap();
        service.canceller().cancel();
        assert_eq!(service.wait_for_signal().unwrap(), Wakeup::Cancelled);
    }

    #[test]
    fn test_notify_errors_are_not_fatal() {
        let (_dir, root) = canonical_tempdir();
        let mut service = NotifyWatchService::new().unwrap();
        service.register(&root, &EventKind::ALL).unwrap();

        service.ingest(Err(notify::Error::generic("boom")));
        assert!(service.signalled.is_empty());
    }
}
