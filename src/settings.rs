use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::StoreOptions;
use crate::link::{DeviceSelector, DEFAULT_BAUD_RATE};
use crate::sensing::{AcquisitionConfig, DEFAULT_SUBSCRIBER_CAPACITY};

pub const ENV_DEVICE: &str = "AQMON_DEVICE";
pub const ENV_DEVICE_DESCRIPTION: &str = "AQMON_DEVICE_DESCRIPTION";
pub const ENV_DB: &str = "AQMON_DB";

const DEFAULT_DESCRIPTION: &str = "USB-SERIAL";
const DEFAULT_DB_NAME: &str = "air_quality.db";
const DEFAULT_HISTORY_LIMIT: usize = 288;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceSettings {
    /// Explicit device node. Takes precedence over `description`.
    pub path: Option<PathBuf>,
    pub description: String,
    pub baud_rate: u32,
    pub query_mode: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: None,
            description: DEFAULT_DESCRIPTION.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            query_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcquisitionSettings {
    pub poll_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub subscriber_capacity: usize,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            read_timeout_ms: 2_000,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub device: DeviceSettings,
    pub database_path: PathBuf,
    /// Keep only this many newest readings; unlimited when absent.
    pub retention_limit: Option<u64>,
    /// Default row count for history queries.
    pub history_limit: usize,
    pub acquisition: AcquisitionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: DeviceSettings::default(),
            database_path: PathBuf::from(DEFAULT_DB_NAME),
            retention_limit: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            acquisition: AcquisitionSettings::default(),
        }
    }
}

impl Settings {
    /// Reads `path` when it exists, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings in {}", path.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Applies `AQMON_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DEVICE).filter(|v| !v.is_empty()) {
            self.device.path = Some(PathBuf::from(path));
        }
        if let Some(description) = lookup(ENV_DEVICE_DESCRIPTION).filter(|v| !v.is_empty()) {
            self.device.path = None;
            self.device.description = description;
        }
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let acquisition = &self.acquisition;
        if acquisition.poll_interval_ms == 0 {
            bail!("acquisition.pollIntervalMs must be greater than zero");
        }
        if acquisition.read_timeout_ms == 0 {
            bail!("acquisition.readTimeoutMs must be greater than zero");
        }
        if acquisition.subscriber_capacity == 0 {
            bail!("acquisition.subscriberCapacity must be greater than zero");
        }
        if self.retention_limit == Some(0) {
            bail!("retentionLimit must be greater than zero when set");
        }
        if self.device.path.is_none() && self.device.description.trim().is_empty() {
            bail!("either device.path or device.description must be set");
        }
        if acquisition.poll_interval_ms < 1_000 {
            warn!(
                "Polling every {}ms is faster than the sensor measures; expect repeated timeouts",
                acquisition.poll_interval_ms
            );
        }
        Ok(())
    }

    pub fn device_selector(&self) -> DeviceSelector {
        match &self.device.path {
            Some(path) => DeviceSelector::Path(path.clone()),
            None => DeviceSelector::Description(self.device.description.clone()),
        }
    }

    pub fn acquisition_config(&self) -> AcquisitionConfig {
        let a = &self.acquisition;
        AcquisitionConfig {
            poll_interval: Duration::from_millis(a.poll_interval_ms),
            read_timeout: Duration::from_millis(a.read_timeout_ms),
            backoff_initial: Duration::from_millis(a.backoff_initial_ms),
            backoff_max: Duration::from_millis(a.backoff_max_ms),
            subscriber_capacity: a.subscriber_capacity,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            retention_limit: self.retention_limit,
        }
    }
}
