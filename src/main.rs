use anyhow::{Context, Result};
use clap::Parser;

use dirwatch::cli::Cli;
use dirwatch::cli::commands::{run_init, run_watch};
use dirwatch::{RunOutcome, Settings, logging};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init {
        let dir = std::env::current_dir().context("cannot resolve the current directory")?;
        let path = run_init(&dir, cli.force)?;
        println!("Created configuration file at: {}", path.display());
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| *e)
    .context("failed to load configuration")?;
    cli.apply(&mut settings);

    logging::init_with_config(&settings.logging);

    match run_watch(&settings)? {
        RunOutcome::Cancelled => dirwatch::log_event!("watcher", "stopped", "interrupted"),
        RunOutcome::Exhausted => {
            dirwatch::log_event!("watcher", "stopped", "no watched directories left")
        }
    }

    Ok(())
}
