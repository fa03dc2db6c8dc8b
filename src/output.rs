//! Reporting of processed events.
//!
//! Events go to stdout, one per line; logs stay on stderr so the event
//! stream can be piped.

use std::io::{self, Stdout, Write};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::watcher::EventKind;

/// Line format for reported events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<kind> <path>`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Receives every processed event, in drain order.
pub trait EventSink {
    fn report(&mut self, kind: EventKind, path: &Path);
}

#[derive(Serialize)]
struct EventLine<'a> {
    kind: EventKind,
    path: &'a Path,
}

/// Writes events to a stream, flushing after each line.
pub struct ConsoleSink<W: Write = Stdout> {
    out: W,
    format: OutputFormat,
}

impl ConsoleSink<Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, kind: EventKind, path: &Path) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{kind:<8} {}", path.display())?,
            OutputFormat::Json => {
                let line = serde_json::to_string(&EventLine { kind, path })
                    .map_err(io::Error::other)?;
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> EventSink for ConsoleSink<W> {
    fn report(&mut self, kind: EventKind, path: &Path) {
        if let Err(e) = self.write_line(kind, path) {
            tracing::warn!("[output] failed to report {kind} {}: {e}", path.display());
        }
    }
}
