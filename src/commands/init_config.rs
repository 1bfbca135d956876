//! `aqmon init-config`: write a default settings file.

use std::path::PathBuf;

use anyhow::{bail, Result};
use aqmon_lib::Settings;

use super::DEFAULT_CONFIG_FILE;

pub fn execute(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Settings::default().save(&path)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
