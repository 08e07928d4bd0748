//! Core building blocks for the sensor node.
//!
//! This crate owns everything the rest of the workspace reasons with:
//! the persisted configuration (schema, checksums, defaults), the raw
//! storage abstraction, the firmware update journal and version file,
//! and the shared runtime state types. It performs no network I/O.

pub mod error;
pub mod journal;
pub mod ledger;
pub mod models;
pub mod power;
pub mod store;
pub mod version;

pub use error::{LedgerError, StoreError};
pub use journal::{JournalEntry, UpdateJournal};
pub use ledger::{ConfigHandle, ConfigLedger, ConfigRecord, LoadReport};
pub use models::{
    ConnectivityState, ReadingsCell, RecordingRestarter, Restarter, SensorReadings,
};
pub use power::SleepPolicy;
pub use store::{ByteStore, FileStore, MemStore};
pub use version::VersionStore;
