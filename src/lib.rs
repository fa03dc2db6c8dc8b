//! Recursive directory watcher.
//!
//! Watches a root directory and every directory beneath it, reports each
//! create, delete and modify with the affected path, extends coverage as new
//! directories appear and retires watches whose directories are gone.

pub mod cli;
pub mod config;
pub mod logging;
pub mod output;
pub mod watcher;

pub use config::Settings;
pub use output::{ConsoleSink, EventSink, OutputFormat};
pub use watcher::{
    Canceller, EventKind, EventLoop, NotifyWatchService, RawEvent, RunOutcome, Wakeup, WatchError,
    WatchHandle, WatchRegistry, WatchResult, WatchService,
};
