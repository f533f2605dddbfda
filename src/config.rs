use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::poller::{IoErrorPolicy, PollSettings};
use crate::{KnownReceiver, STEELSERIES_VENDOR_ID};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub vendor_id: u16,
    pub product_ids: Vec<u16>,     // Tried in order
    pub poll_interval_secs: u64,
    pub recovery_pause_ms: u64,    // Between re-discovery and re-probe
    pub relocate_attempts: u32,
    pub read_timeout_ms: u32,
    pub on_io_error: IoErrorPolicy,
    pub io_error_threshold: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
    pub icon_dir: PathBuf,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub max_files: usize,
    pub level: String,             // Used when RUST_LOG is unset
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vendor_id: STEELSERIES_VENDOR_ID,
            product_ids: vec![KnownReceiver::Arctis7v2017.product_id()],
            poll_interval_secs: 5,
            recovery_pause_ms: 1000,
            relocate_attempts: 1,
            read_timeout_ms: 1000,
            on_io_error: IoErrorPolicy::Continue,
            io_error_threshold: 3,
            backoff_base_ms: 1000,
            backoff_max_secs: 60,
            icon_dir: PathBuf::from("Icons"),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "arctis-tray.log".to_string(),
            max_files: 3,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            recovery_pause: Duration::from_millis(self.recovery_pause_ms),
            relocate_attempts: self.relocate_attempts,
            on_io_error: self.on_io_error,
            io_error_threshold: self.io_error_threshold,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        }
    }

    /// Read timeout as hidapi expects it.
    pub fn read_timeout(&self) -> i32 {
        i32::try_from(self.read_timeout_ms).unwrap_or(i32::MAX)
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(base.join("arctis-tray"))
}

pub fn validate_config(config: &AppConfig) -> anyhow::Result<()> {
    if config.product_ids.is_empty() {
        bail!("product_ids must list at least one receiver");
    }
    for (i, id) in config.product_ids.iter().enumerate() {
        if config.product_ids[..i].contains(id) {
            bail!("product_ids lists 0x{:04x} more than once", id);
        }
    }
    if !(1..=3600).contains(&config.poll_interval_secs) {
        bail!("poll_interval_secs must be between 1 and 3600 seconds");
    }
    if config.read_timeout_ms == 0 {
        bail!("read_timeout_ms must be at least 1");
    }
    if config.io_error_threshold == 0 {
        bail!("io_error_threshold must be at least 1");
    }
    if config.relocate_attempts == 0 {
        bail!("relocate_attempts must be at least 1");
    }
    if config.backoff_base_ms == 0 {
        bail!("backoff_base_ms must be at least 1");
    }
    if config.log.max_files == 0 {
        bail!("log.max_files must be at least 1");
    }
    Ok(())
}

/// Loads `path`, writing the defaults there first if it does not exist.
pub fn load_config_from(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let default_config = AppConfig::default();
        fs::write(path, toml::to_string(&default_config)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(default_config);
    }

    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: AppConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}
