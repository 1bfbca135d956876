//! Handlers behind each `aqmon` subcommand.

pub mod history;
pub mod init_config;
pub mod monitor;
pub mod ports;

use std::path::{Path, PathBuf};

use anyhow::Result;
use aqmon_lib::{Reading, Settings};

pub const DEFAULT_CONFIG_FILE: &str = "aqmon.json";

/// Flags that apply to every subcommand.
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
}

/// Settings file, then `AQMON_*` environment, then command-line flags.
pub fn load_settings(overrides: &Overrides) -> Result<Settings> {
    let path = overrides
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut settings = Settings::load(Some(Path::new(&path)))?;
    settings.apply_env();
    if let Some(db) = &overrides.db {
        settings.database_path = db.clone();
    }
    Ok(settings)
}

pub fn print_reading(reading: &Reading, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reading)?);
    } else {
        println!(
            "{}  PM2.5 {:>6.1} µg/m³  PM10 {:>6.1} µg/m³",
            reading.timestamp().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            reading.pm25(),
            reading.pm10()
        );
    }
    Ok(())
}
