//! The single control loop: wait, resolve, drain, reset.

use std::path::Path;

use super::event::{EventKind, WatchHandle};
use super::registry::WatchRegistry;
use super::service::{Wakeup, WatchService};
use super::{WatchError, WatchResult};
use crate::output::EventSink;

/// Why [`EventLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The wait was interrupted by a cancellation request.
    Cancelled,
    /// Every watched directory became invalid.
    Exhausted,
}

/// Drives a [`WatchService`], keeps the [`WatchRegistry`] current and
/// reports every drained event to an [`EventSink`].
///
/// Entries created inside a new directory between its creation and the end
/// of its registration walk are not reported; coverage starts once the
/// walk has registered it.
pub struct EventLoop<S, K> {
    service: S,
    registry: WatchRegistry,
    sink: K,
}

impl<S: WatchService, K: EventSink> EventLoop<S, K> {
    pub fn new(service: S, sink: K) -> Self {
        Self {
            service,
            registry: WatchRegistry::new(),
            sink,
        }
    }

    /// Register `root` and everything beneath it. Returns the number of
    /// directories added.
    pub fn watch_root(&mut self, root: &Path) -> usize {
        self.registry.register_tree(&mut self.service, root)
    }

    /// Directories currently watched.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// The underlying watch service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Where events are reported.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Process signals until cancelled or until no directory is left.
    ///
    /// Only a watch service that can no longer deliver signals ends the loop
    /// with an error; per-directory and per-event failures are logged.
    pub fn run(&mut self) -> WatchResult<RunOutcome> {
        if self.registry.is_empty() {
            tracing::warn!("[watcher] nothing to watch");
            return Ok(RunOutcome::Exhausted);
        }

        crate::log_event!("watcher", "started", "{} directories", self.registry.len());

        loop {
            let handle = match self.service.wait_for_signal()? {
                Wakeup::Signalled(handle) => handle,
                Wakeup::Cancelled => {
                    crate::log_event!("watcher", "cancelled");
                    return Ok(RunOutcome::Cancelled);
                }
            };

            self.process(handle);

            if self.registry.is_empty() {
                crate::log_event!("watcher", "all watched directories are gone");
                return Ok(RunOutcome::Exhausted);
            }
        }
    }

    /// Handle one signalled watch: drain its events, then reset it.
    pub fn process(&mut self, handle: WatchHandle) {
        match self.registry.lookup(handle).map(Path::to_path_buf) {
            Some(dir) => {
                for event in self.service.pending_events(handle) {
                    let child = dir.join(&event.name);
                    self.sink.report(event.kind, &child);

                    if event.kind == EventKind::Created && is_real_dir(&child) {
                        let added = self.registry.register_tree(&mut self.service, &child);
                        crate::debug_event!(
                            "watcher",
                            "extended",
                            "{} (+{added})",
                            child.display()
                        );
                    }
                }
            }
            None => {
                let dropped = self.service.pending_events(handle).len();
                let err = WatchError::UnknownHandle { handle };
                tracing::warn!("[watcher] {err}, dropped {dropped} events");
            }
        }

        if !self.service.reset(handle)
            && let Some(path) = self.registry.retire(handle)
        {
            crate::log_event!("watcher", "retired", "{}", path.display());
        }
    }
}

/// Directory test that does not follow symlinks.
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
