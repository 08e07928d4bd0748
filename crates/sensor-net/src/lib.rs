//! sensor-net - everything that talks to the outside world.
//!
//! Connectivity management, firmware updates, MQTT publishing,
//! telemetry posts and sensor sampling, each behind a trait seam so
//! the hardware-facing half can be mocked in tests. State and
//! persistence live in `sensor-core`; this crate moves bytes.

pub mod config;
mod endpoint;
pub mod link;
pub mod mqtt;
pub mod sensor;
pub mod telemetry;
pub mod update;
pub mod wifi;

pub use config::{LinkConfig, SensorConfig, UpdateSettings, WifiConfig};
pub use link::{ConnectivityManager, LinkError};
pub use mqtt::{MqttError, MqttPublisher};
pub use sensor::{ProbeSample, SensorProbe};
pub use telemetry::{TelemetryError, TelemetryReporter};
pub use update::{FileSlot, FirmwareSlot, MockSlot, SlotError, UpdateCoordinator, UpdateError};
pub use wifi::{WifiAdapter, WifiError};
