//! Integration tests for the sensor node.
//!
//! This crate contains end-to-end tests that exercise the full stack
//! in one process:
//! - configuration persistence across simulated reboots and power loss
//! - the firmware update protocol against in-process OTA endpoint stubs
//! - the configuration API over a real TCP listener
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sensor-tests
//! ```
//!
//! All endpoints bind to ephemeral loopback ports, so the tests need
//! no privileges and run in parallel.
//!
//! # Test Structure
//!
//! - `lifecycle_test.rs` - config survival across reboots, power loss
//!   and medium corruption
//! - `update_e2e_test.rs` - the full OTA protocol with stubbed
//!   manifest/image/result endpoints
//! - `node_e2e_test.rs` - reconfiguration through the REST API and the
//!   reboot that follows

// This crate only contains tests, no library code
