//! Configuration types for the networking components.
//!
//! These come from the daemon's TOML file, not from the persisted
//! [`sensor_core::ConfigRecord`]: they select adapters and tune
//! timings, while the record carries what the device owner configures
//! at runtime.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Which WiFi adapter backs the connectivity manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WifiConfig {
    /// Scriptable in-memory adapter.
    Mock(MockWifiConfig),
    /// Real interface driven through `wpa_cli`.
    Wpa(WpaConfig),
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self::Mock(MockWifiConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockWifiConfig {
    /// Uppercase hex hardware address the mock reports.
    #[serde(default = "default_mock_hardware_id")]
    pub hardware_id: String,
    /// Artificial latency for join attempts, in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,
    /// Signal strength reported while associated.
    #[serde(default = "default_mock_signal_dbm")]
    pub signal_dbm: i32,
}

impl Default for MockWifiConfig {
    fn default() -> Self {
        Self {
            hardware_id: default_mock_hardware_id(),
            latency_ms: 0,
            signal_dbm: default_mock_signal_dbm(),
        }
    }
}

fn default_mock_hardware_id() -> String {
    "A0B1C2D3E4F5".to_string()
}

fn default_mock_signal_dbm() -> i32 {
    -58
}

#[derive(Debug, Clone, Deserialize)]
pub struct WpaConfig {
    #[serde(default = "default_wpa_interface")]
    pub interface: String,
    /// Path of the `wpa_cli` binary.
    #[serde(default = "default_wpa_cli")]
    pub wpa_cli: String,
}

impl Default for WpaConfig {
    fn default() -> Self {
        Self {
            interface: default_wpa_interface(),
            wpa_cli: default_wpa_cli(),
        }
    }
}

fn default_wpa_interface() -> String {
    "wlan0".to_string()
}

fn default_wpa_cli() -> String {
    "wpa_cli".to_string()
}

/// Timings of the connectivity state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Upper bound on one association attempt.
    #[serde(default = "default_associate_timeout_secs")]
    pub associate_timeout_secs: u64,
    /// Cool-down between link loss and the reassociation attempt.
    #[serde(default = "default_link_cooldown_secs")]
    pub link_cooldown_secs: u64,
    /// Interval between association retries out of recovery mode.
    #[serde(default = "default_recovery_retry_secs")]
    pub recovery_retry_secs: u64,
    /// Cadence of the system task's health tick.
    #[serde(default = "default_health_poll_secs")]
    pub health_poll_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            associate_timeout_secs: default_associate_timeout_secs(),
            link_cooldown_secs: default_link_cooldown_secs(),
            recovery_retry_secs: default_recovery_retry_secs(),
            health_poll_secs: default_health_poll_secs(),
        }
    }
}

impl LinkConfig {
    pub fn associate_timeout(&self) -> Duration {
        Duration::from_secs(self.associate_timeout_secs)
    }

    pub fn link_cooldown(&self) -> Duration {
        Duration::from_secs(self.link_cooldown_secs)
    }

    pub fn recovery_retry(&self) -> Duration {
        Duration::from_secs(self.recovery_retry_secs)
    }

    pub fn health_poll(&self) -> Duration {
        Duration::from_secs(self.health_poll_secs)
    }
}

fn default_associate_timeout_secs() -> u64 {
    20
}

fn default_link_cooldown_secs() -> u64 {
    300
}

fn default_recovery_retry_secs() -> u64 {
    600
}

fn default_health_poll_secs() -> u64 {
    10
}

/// Timings and intervals of the update coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettings {
    /// Interval between periodic update checks.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Whole-request deadline for the manifest query.
    #[serde(default = "default_manifest_timeout_secs")]
    pub manifest_timeout_secs: u64,
    /// Whole-request deadline for the image download.
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
    /// Deadline for outcome/error report posts.
    #[serde(default = "default_report_timeout_secs")]
    pub report_timeout_secs: u64,
    /// Bound on the short-lived association for the boot-time report.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            manifest_timeout_secs: default_manifest_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            report_timeout_secs: default_report_timeout_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl UpdateSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

fn default_check_interval_secs() -> u64 {
    3600
}

fn default_manifest_timeout_secs() -> u64 {
    10
}

fn default_image_timeout_secs() -> u64 {
    15
}

fn default_report_timeout_secs() -> u64 {
    10
}

fn default_join_timeout_secs() -> u64 {
    10
}

/// Which sensor probe feeds the readings.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorConfig {
    /// Fixed, scriptable readings.
    Mock(MockSensorConfig),
    /// Plain-number files, sysfs style.
    Files(FileSensorConfig),
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::Mock(MockSensorConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockSensorConfig {
    #[serde(default = "default_mock_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_mock_humidity")]
    pub humidity: Option<f32>,
    #[serde(default = "default_mock_pressure")]
    pub pressure: Option<f32>,
    #[serde(default = "default_mock_vcc")]
    pub vcc: f32,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            temperature: default_mock_temperature(),
            humidity: default_mock_humidity(),
            pressure: default_mock_pressure(),
            vcc: default_mock_vcc(),
        }
    }
}

fn default_mock_temperature() -> Option<f32> {
    Some(21.5)
}

fn default_mock_humidity() -> Option<f32> {
    Some(48.0)
}

fn default_mock_pressure() -> Option<f32> {
    Some(755.0)
}

fn default_mock_vcc() -> f32 {
    3.3
}

/// One file-backed measurement channel: the file holds a plain number
/// which is multiplied by `scale`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub path: PathBuf,
    #[serde(default = "default_channel_scale")]
    pub scale: f32,
}

/// Most sysfs channels report milli-units.
fn default_channel_scale() -> f32 {
    0.001
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSensorConfig {
    pub temperature: Option<ChannelConfig>,
    pub humidity: Option<ChannelConfig>,
    pub pressure: Option<ChannelConfig>,
    pub vcc: Option<ChannelConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wifi_config_defaults_to_mock() {
        assert!(matches!(WifiConfig::default(), WifiConfig::Mock(_)));
    }

    #[test]
    fn tagged_adapter_selection_parses() {
        let config: WifiConfig = toml::from_str(
            r#"
            type = "wpa"
            interface = "wlp2s0"
            "#,
        )
        .unwrap();
        match config {
            WifiConfig::Wpa(wpa) => {
                assert_eq!(wpa.interface, "wlp2s0");
                assert_eq!(wpa.wpa_cli, "wpa_cli");
            }
            other => panic!("expected wpa adapter, got {other:?}"),
        }
    }

    #[test]
    fn link_timings_default_sanely() {
        let link = LinkConfig::default();
        assert_eq!(link.associate_timeout(), Duration::from_secs(20));
        assert_eq!(link.link_cooldown(), Duration::from_secs(300));
        assert_eq!(link.recovery_retry(), Duration::from_secs(600));
        assert_eq!(link.health_poll(), Duration::from_secs(10));
    }

    #[test]
    fn update_intervals_default_sanely() {
        let update = UpdateSettings::default();
        assert_eq!(update.check_interval(), Duration::from_secs(3600));
        assert_eq!(update.manifest_timeout(), Duration::from_secs(10));
        assert_eq!(update.image_timeout(), Duration::from_secs(15));
    }
}
