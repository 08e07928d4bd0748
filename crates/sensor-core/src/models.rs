//! Shared runtime state types.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// WiFi association lifecycle. Owned by the connectivity manager,
/// observed read-only by everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Disassociated,
    Associating,
    Associated,
    RecoveryMode,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Disassociated => "disassociated",
            ConnectivityState::Associating => "associating",
            ConnectivityState::Associated => "associated",
            ConnectivityState::RecoveryMode => "recovery_mode",
        };
        f.write_str(name)
    }
}

/// Latest environmental sample. Channels that failed plausibility
/// checks or are not wired on this node read as None.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorReadings {
    /// Degrees Celsius, calibration offset already applied.
    pub temperature: Option<f32>,
    /// Relative humidity in percent.
    pub humidity: Option<f32>,
    /// Millimeters of mercury.
    pub pressure: Option<f32>,
    /// Supply voltage in volts.
    pub vcc: f32,
    pub sampled_at: Option<DateTime<Utc>>,
}

/// Shared cell for the latest readings, guarded by its own lock so the
/// sensor task never contends with configuration transactions.
#[derive(Default)]
pub struct ReadingsCell {
    inner: RwLock<SensorReadings>,
}

impl ReadingsCell {
    pub fn get(&self) -> SensorReadings {
        *self.inner.read()
    }

    pub fn set(&self, readings: SensorReadings) {
        *self.inner.write() = readings;
    }
}

/// Requests a process restart after a delay.
///
/// Configuration saves and firmware activation both end in a restart;
/// the daemon implements this by exiting so its supervisor respawns
/// the node, tests record the request instead.
pub trait Restarter: Send + Sync {
    fn request_restart(&self, delay: Duration);
}

/// [`Restarter`] that only records requests.
#[derive(Default)]
pub struct RecordingRestarter {
    requests: Mutex<Vec<Duration>>,
}

impl RecordingRestarter {
    pub fn requests(&self) -> Vec<Duration> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Restarter for RecordingRestarter {
    fn request_restart(&self, delay: Duration) {
        self.requests.lock().push(delay);
    }
}
