//! Watch service trait: the seam to the OS notification primitive.

use std::path::Path;

use super::WatchResult;
use super::event::{EventKind, RawEvent, WatchHandle};

/// Outcome of blocking on the watch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A handle has queued events (or changed validity) and is ready to drain.
    Signalled(WatchHandle),
    /// The wait was interrupted by an external cancellation request.
    Cancelled,
}

/// Low-level notification source watching immediate children of directories.
///
/// Implementations issue a fresh [`WatchHandle`] per registration, queue raw
/// events against it, and signal it at most once until it is reset.
pub trait WatchService {
    /// Watch `dir` for the given kinds of change to its immediate children.
    fn register(&mut self, dir: &Path, kinds: &[EventKind]) -> WatchResult<WatchHandle>;

    /// Block until some handle is signalled or the wait is cancelled.
    fn wait_for_signal(&mut self) -> WatchResult<Wakeup>;

    /// Drain every event currently queued against `handle`, in arrival order.
    fn pending_events(&mut self, handle: WatchHandle) -> Vec<RawEvent>;

    /// Return `handle` to the ready state.
    ///
    /// Returns `false` once the handle is no longer valid, e.g. its directory
    /// was deleted. An invalid handle is never signalled again.
    fn reset(&mut self, handle: WatchHandle) -> bool;
}
