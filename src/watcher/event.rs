//! Event and handle types shared by the registry, the watch service and the loop.

use std::ffi::OsString;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token identifying one registered directory's subscription.
///
/// Issued by a [`WatchService`](super::WatchService); never reused by the
/// same service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of change observed for an entry of a watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Deleted,
    Modified,
}

impl EventKind {
    /// Every kind; what the registry asks the service for.
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Deleted, EventKind::Modified];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::Modified => "modified",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single notification queued against a watch handle.
///
/// `name` is relative to the directory the handle watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub handle: WatchHandle,
    pub name: OsString,
}

impl RawEvent {
    pub fn new(kind: EventKind, handle: WatchHandle, name: impl Into<OsString>) -> Self {
        Self {
            kind,
            handle,
            name: name.into(),
        }
    }
}
