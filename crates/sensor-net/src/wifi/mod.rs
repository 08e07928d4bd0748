//! WiFi control behind a pluggable adapter.
//!
//! The connectivity manager drives whichever [`WifiAdapter`] the
//! daemon config selects: a scriptable mock, or a real interface
//! through wpa_supplicant's control front end.

mod mock;
mod wpa;

pub use mock::{JoinBehavior, MockWifiAdapter};
pub use wpa::WpaCliAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WifiConfig;

#[derive(Debug, Error)]
pub enum WifiError {
    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("access point failed: {0}")]
    AccessPointFailed(String),

    #[error("wifi control command failed: {0}")]
    CommandFailed(String),
}

/// Low-level WiFi operations of one wireless interface.
#[async_trait]
pub trait WifiAdapter: Send + Sync {
    /// One association attempt against an infrastructure network.
    /// Resolves when the link is up or the attempt has failed; callers
    /// bound it with a timeout.
    async fn join(&self, ssid: &str, passphrase: &str) -> Result<(), WifiError>;

    /// Hosts an access point. `passphrase` None means an open network.
    async fn start_access_point(
        &self,
        ssid: &str,
        passphrase: Option<&str>,
    ) -> Result<(), WifiError>;

    /// Tears down any association attempt or hosted access point.
    async fn disconnect(&self);

    /// Whether the infrastructure link is currently up.
    async fn link_up(&self) -> bool;

    /// Received signal strength in dBm, when associated.
    async fn signal_strength(&self) -> Option<i32>;

    /// Uppercase hex hardware address, no separators.
    fn hardware_id(&self) -> String;
}

/// Builds the adapter selected by the daemon config.
pub fn create_adapter(config: &WifiConfig) -> Result<Arc<dyn WifiAdapter>, WifiError> {
    match config {
        WifiConfig::Mock(mock) => Ok(Arc::new(MockWifiAdapter::new(mock.clone()))),
        WifiConfig::Wpa(wpa) => Ok(Arc::new(WpaCliAdapter::new(wpa.clone())?)),
    }
}
