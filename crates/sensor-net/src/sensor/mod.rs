//! Sensor sampling behind a pluggable probe.

mod files;
mod mock;

pub use files::FileProbe;
pub use mock::MockProbe;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use sensor_core::models::SensorReadings;

use crate::config::SensorConfig;

/// One raw measurement as the hardware reported it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeSample {
    /// Degrees Celsius, before the configured offset.
    pub temperature: Option<f32>,
    /// Relative humidity, percent.
    pub humidity: Option<f32>,
    /// Millimeters of mercury.
    pub pressure: Option<f32>,
    /// Supply voltage.
    pub vcc: f32,
}

/// One measurement source. Quantities a probe cannot deliver come back
/// as `None`.
#[async_trait]
pub trait SensorProbe: Send + Sync {
    async fn sample(&self) -> ProbeSample;
}

/// Builds the probe selected by the daemon config.
pub fn create_probe(config: &SensorConfig) -> Arc<dyn SensorProbe> {
    match config {
        SensorConfig::Mock(mock) => Arc::new(MockProbe::new(mock.clone())),
        SensorConfig::Files(files) => Arc::new(FileProbe::new(files.clone())),
    }
}

/// Applies the temperature offset, drops implausible values and stamps
/// the sampling time. A sensor wired to the wrong bus produces wild
/// numbers rather than read errors, so the windows are the real guard.
pub fn validate(sample: ProbeSample, temp_offset: f32) -> SensorReadings {
    SensorReadings {
        temperature: sample
            .temperature
            .map(|celsius| celsius + temp_offset)
            .filter(|celsius| *celsius > -100.0 && *celsius < 100.0),
        humidity: sample
            .humidity
            .filter(|percent| (0.0..=100.0).contains(percent)),
        pressure: sample.pressure.filter(|mmhg| *mmhg > 300.0 && *mmhg < 1200.0),
        vcc: sample.vcc,
        sampled_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_applied_before_the_plausibility_window() {
        let sample = ProbeSample {
            temperature: Some(21.0),
            ..ProbeSample::default()
        };
        let readings = validate(sample, -1.5);
        assert_eq!(readings.temperature, Some(19.5));
        assert!(readings.sampled_at.is_some());

        // A large calibration offset can push a reading over the edge.
        let readings = validate(sample, 80.0);
        assert_eq!(readings.temperature, None);
    }

    #[test]
    fn implausible_values_are_dropped() {
        let sample = ProbeSample {
            temperature: Some(-999.0),
            humidity: Some(100.5),
            pressure: Some(745.3),
            vcc: 3.3,
        };
        let readings = validate(sample, 0.0);
        assert_eq!(readings.temperature, None);
        assert_eq!(readings.humidity, None);
        assert_eq!(readings.pressure, Some(745.3));
    }

    #[test]
    fn humidity_bounds_are_inclusive() {
        let sample = ProbeSample {
            humidity: Some(100.0),
            ..ProbeSample::default()
        };
        assert_eq!(validate(sample, 0.0).humidity, Some(100.0));

        let sample = ProbeSample {
            humidity: Some(0.0),
            ..ProbeSample::default()
        };
        assert_eq!(validate(sample, 0.0).humidity, Some(0.0));
    }

    #[test]
    fn nan_never_survives_validation() {
        let sample = ProbeSample {
            temperature: Some(f32::NAN),
            humidity: Some(f32::NAN),
            pressure: Some(f32::NAN),
            vcc: 3.3,
        };
        let readings = validate(sample, 0.0);
        assert_eq!(readings.temperature, None);
        assert_eq!(readings.humidity, None);
        assert_eq!(readings.pressure, None);
    }
}
