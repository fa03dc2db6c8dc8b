//! Watch command: the process entry for the event loop.

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::output::ConsoleSink;
use crate::watcher::{EventLoop, NotifyWatchService, RunOutcome};

/// Watch the configured root until interrupted or until it is gone.
///
/// Only failing to resolve the root or to acquire the watch service is
/// fatal; everything after that is logged and skipped.
pub fn run_watch(settings: &Settings) -> Result<RunOutcome> {
    let root = settings.watch_root().with_context(|| match &settings.watch.root {
        Some(root) => format!("cannot watch {}", root.display()),
        None => "cannot resolve the current directory".to_string(),
    })?;

    let service = NotifyWatchService::new().context("failed to create watch service")?;
    let canceller = service.canceller();
    ctrlc::set_handler(move || canceller.cancel())
        .context("failed to install interrupt handler")?;

    let mut event_loop = EventLoop::new(service, ConsoleSink::stdout(settings.watch.format));

    crate::log_event!("watcher", "watching", "{}", root.display());
    event_loop.watch_root(&root);

    let outcome = event_loop.run()?;
    Ok(outcome)
}
