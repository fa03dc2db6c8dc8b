//! Recursive directory watcher.
//!
//! A single control loop owns a registry of watch handles, one per
//! directory, and grows it as new directories appear.
//!
//! # Architecture
//!
//! ```text
//! EventLoop
//!   - WatchService (notify, one non-recursive watch per directory)
//!   - WatchRegistry (handle <-> directory)
//!   - EventSink (stdout)
//!         |
//!   wait -> resolve -> drain -> reset
//!                        |
//!              created dir -> register_tree
//! ```

mod error;
mod event;
mod event_loop;
mod notify_service;
mod registry;
mod service;

pub use error::{WatchError, WatchResult};
pub use event::{EventKind, RawEvent, WatchHandle};
pub use event_loop::{EventLoop, RunOutcome};
pub use notify_service::{Canceller, NotifyWatchService};
pub use registry::WatchRegistry;
pub use service::{Wakeup, WatchService};
