//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;
use crate::output::OutputFormat;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Recursively watch a directory tree
#[derive(Parser, Debug)]
#[command(
    name = "dirwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Recursively watch a directory tree",
    long_about = "Watch a directory and every directory beneath it, printing each \
                  create, delete and modify with the path it affects. New \
                  subdirectories are picked up as they appear.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Directory to watch [default: current directory]
    pub path: Option<PathBuf>,

    /// Event line format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Path to custom settings.toml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write default settings to .dirwatch/settings.toml and exit
    #[arg(long)]
    pub init: bool,

    /// Overwrite existing settings with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.path {
            settings.watch.root = Some(path.clone());
        }
        if let Some(format) = self.format {
            settings.watch.format = format;
        }
    }
}
