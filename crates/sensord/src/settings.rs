//! Daemon settings file.
//!
//! Everything here is operator-side tuning read once at startup. What
//! the device owner configures at runtime lives in the persisted
//! [`sensor_core::ConfigRecord`] instead.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use sensor_core::SleepPolicy;
use sensor_net::{LinkConfig, SensorConfig, UpdateSettings, WifiConfig};

/// Capacity reserved for the config block, with headroom for schema
/// growth.
pub const CONFIG_MEDIUM_CAPACITY: usize = 1024;

/// Capacity of the update journal region; it only ever holds two
/// version strings.
pub const JOURNAL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// TCP port of the configuration API.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Overrides the compiled-in firmware version, for tests and
    /// staged rollouts.
    #[serde(default)]
    pub firmware_version: Option<String>,

    /// Run one sample-publish-sleep cycle instead of the steady loop.
    #[serde(default)]
    pub one_shot: bool,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub update: UpdateSettings,

    #[serde(default)]
    pub power: SleepPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            firmware_version: None,
            one_shot: false,
            storage: StorageSettings::default(),
            wifi: WifiConfig::default(),
            sensor: SensorConfig::default(),
            link: LinkConfig::default(),
            update: UpdateSettings::default(),
            power: SleepPolicy::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

fn default_listen_port() -> u16 {
    8080
}

/// Where the persistent pieces of the node live. Everything defaults
/// to well-known names under one data directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Upper bound on a downloadable firmware image.
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            slot_capacity: default_slot_capacity(),
        }
    }
}

impl StorageSettings {
    pub fn config_medium(&self) -> PathBuf {
        self.data_dir.join("config.bin")
    }

    pub fn journal(&self) -> PathBuf {
        self.data_dir.join("update-journal.bin")
    }

    pub fn version_file(&self) -> PathBuf {
        self.data_dir.join("version")
    }

    pub fn staging_image(&self) -> PathBuf {
        self.data_dir.join("firmware.staging")
    }

    pub fn active_image(&self) -> PathBuf {
        self.data_dir.join("firmware.bin")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("sensor-data")
}

fn default_slot_capacity() -> u64 {
    4 * 1024 * 1024
}
