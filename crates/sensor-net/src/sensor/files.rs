use async_trait::async_trait;
use tracing::debug;

use crate::config::{ChannelConfig, FileSensorConfig};
use crate::sensor::{ProbeSample, SensorProbe};

/// Assumed supply voltage when no vcc channel is configured, the usual
/// rail on mains-powered hosts.
const VCC_FALLBACK: f32 = 3.3;

/// Probe reading plain-number files, one per quantity, the way iio and
/// hwmon sysfs channels expose them. Each channel carries a scale for
/// drivers that report milli-units.
pub struct FileProbe {
    config: FileSensorConfig,
}

impl FileProbe {
    pub fn new(config: FileSensorConfig) -> Self {
        Self { config }
    }

    async fn read_channel(channel: &ChannelConfig) -> Option<f32> {
        let raw = match tokio::fs::read_to_string(&channel.path).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %channel.path.display(), error = %err, "sensor channel unreadable");
                return None;
            }
        };
        match raw.trim().parse::<f32>() {
            Ok(value) => Some(value * channel.scale),
            Err(err) => {
                debug!(path = %channel.path.display(), error = %err, "sensor channel not numeric");
                None
            }
        }
    }

    async fn read_optional(channel: Option<&ChannelConfig>) -> Option<f32> {
        match channel {
            Some(channel) => Self::read_channel(channel).await,
            None => None,
        }
    }
}

#[async_trait]
impl SensorProbe for FileProbe {
    async fn sample(&self) -> ProbeSample {
        ProbeSample {
            temperature: Self::read_optional(self.config.temperature.as_ref()).await,
            humidity: Self::read_optional(self.config.humidity.as_ref()).await,
            pressure: Self::read_optional(self.config.pressure.as_ref()).await,
            vcc: Self::read_optional(self.config.vcc.as_ref())
                .await
                .unwrap_or(VCC_FALLBACK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    fn channel(path: &Path, scale: f32) -> Option<ChannelConfig> {
        Some(ChannelConfig {
            path: path.to_path_buf(),
            scale,
        })
    }

    #[tokio::test]
    async fn channels_are_scaled_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path = dir.path().join("temp_input");
        fs::write(&temp_path, "21520\n").unwrap();

        let probe = FileProbe::new(FileSensorConfig {
            temperature: channel(&temp_path, 0.001),
            humidity: None,
            pressure: None,
            vcc: None,
        });
        let sample = probe.sample().await;
        assert!((sample.temperature.unwrap() - 21.52).abs() < 1e-4);
        assert_eq!(sample.humidity, None);
        assert_eq!(sample.vcc, VCC_FALLBACK);
    }

    #[tokio::test]
    async fn unreadable_or_garbage_channels_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let garbage_path = dir.path().join("humidity");
        fs::write(&garbage_path, "not-a-number").unwrap();

        let probe = FileProbe::new(FileSensorConfig {
            temperature: channel(&dir.path().join("missing"), 1.0),
            humidity: channel(&garbage_path, 1.0),
            pressure: None,
            vcc: None,
        });
        let sample = probe.sample().await;
        assert_eq!(sample.temperature, None);
        assert_eq!(sample.humidity, None);
    }

    #[tokio::test]
    async fn vcc_channel_overrides_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let vcc_path = dir.path().join("in_voltage");
        fs::write(&vcc_path, "2810").unwrap();

        let probe = FileProbe::new(FileSensorConfig {
            temperature: None,
            humidity: None,
            pressure: None,
            vcc: channel(&vcc_path, 0.001),
        });
        let sample = probe.sample().await;
        assert!((sample.vcc - 2.81).abs() < 1e-4);
    }
}
