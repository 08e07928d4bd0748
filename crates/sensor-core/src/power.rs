//! Voltage-aware duty-cycle policy.

use std::time::Duration;

use serde::Deserialize;

/// Sleep durations keyed off the supply voltage, used by the one-shot
/// duty cycle. Lower voltage means longer sleeps, stretching what is
/// left of the battery.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepPolicy {
    #[serde(default = "default_baseline_secs")]
    pub baseline_secs: u64,
    #[serde(default = "default_low_voltage")]
    pub low_voltage: f32,
    #[serde(default = "default_low_secs")]
    pub low_secs: u64,
    #[serde(default = "default_critical_voltage")]
    pub critical_voltage: f32,
    #[serde(default = "default_critical_secs")]
    pub critical_secs: u64,
}

fn default_baseline_secs() -> u64 {
    300
}

fn default_low_voltage() -> f32 {
    2.8
}

fn default_low_secs() -> u64 {
    1800
}

fn default_critical_voltage() -> f32 {
    2.7
}

fn default_critical_secs() -> u64 {
    3600
}

impl Default for SleepPolicy {
    fn default() -> Self {
        Self {
            baseline_secs: default_baseline_secs(),
            low_voltage: default_low_voltage(),
            low_secs: default_low_secs(),
            critical_voltage: default_critical_voltage(),
            critical_secs: default_critical_secs(),
        }
    }
}

impl SleepPolicy {
    pub fn duration_for(&self, vcc: f32) -> Duration {
        let secs = if vcc < self.critical_voltage {
            self.critical_secs
        } else if vcc < self.low_voltage {
            self.low_secs
        } else {
            self.baseline_secs
        };
        Duration::from_secs(secs)
    }
}
