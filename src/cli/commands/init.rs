//! Init command: write a default settings file.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::config::Settings;

/// Create `.dirwatch/settings.toml` under `dir` with default values.
pub fn run_init(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(".dirwatch").join("settings.toml");

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Settings::default()
        .save(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", config_path.display()))?;

    Ok(config_path)
}
