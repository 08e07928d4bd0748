//! HTTP handlers for the configuration API.

pub mod config;
pub mod restart;
pub mod status;
pub mod update;

use std::time::Duration;

/// Grace period between a response and the restart it announced.
pub(crate) const RESTART_DELAY: Duration = Duration::from_secs(2);
