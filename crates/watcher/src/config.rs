//! Daemon configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectorConfig;
use crate::detect::mount::DEFAULT_MOUNT_TABLE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Mount table to scan for resolved mount paths
    #[serde(default = "DetectorSettings::default_mount_table")]
    pub mount_table: PathBuf,
    /// Fixed wait before each mount-table scan, in milliseconds
    #[serde(default = "DetectorSettings::default_mount_grace_ms")]
    pub mount_grace_ms: u64,
    /// Monitor readiness wait interval, in milliseconds
    #[serde(default = "DetectorSettings::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings {
                log_level: "info".to_string(),
            },
            detector: DetectorSettings::default(),
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            mount_table: Self::default_mount_table(),
            mount_grace_ms: Self::default_mount_grace_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

impl DetectorSettings {
    fn default_mount_table() -> PathBuf {
        PathBuf::from(DEFAULT_MOUNT_TABLE)
    }

    fn default_mount_grace_ms() -> u64 {
        1000
    }

    fn default_poll_interval_ms() -> u64 {
        250
    }
}

impl DaemonConfig {
    /// Default config location: `~/.config/usb-storage-watch/config.toml`,
    /// falling back to `/etc/usb-storage-watch/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-storage-watch").join("config.toml")
        } else {
            PathBuf::from("/etc/usb-storage-watch/config.toml")
        }
    }

    fn system_path() -> PathBuf {
        PathBuf::from("/etc/usb-storage-watch/config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load from the default locations, or fall back to built-in defaults.
    pub fn load_or_default() -> Self {
        for path in [Self::default_path(), Self::system_path()] {
            if path.is_file()
                && let Ok(config) = Self::load(&path)
            {
                return config;
            }
        }
        Self::default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, contents)
            .with_context(|| format!("writing config file {}", path.display()))
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            mount_table: self.detector.mount_table.clone(),
            mount_grace: Duration::from_millis(self.detector.mount_grace_ms),
            poll_interval: Duration::from_millis(self.detector.poll_interval_ms),
        }
    }
}
