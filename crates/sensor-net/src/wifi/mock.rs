//! Scriptable in-memory WiFi adapter.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::sleep;

use super::{WifiAdapter, WifiError};
use crate::config::MockWifiConfig;

/// How a scripted join attempt resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinBehavior {
    /// Succeed after the configured latency.
    Succeed,
    /// Fail after the configured latency.
    Fail,
    /// Never resolve, so the caller's timeout fires.
    Hang,
}

/// In-memory [`WifiAdapter`] used by tests and by hosts without a
/// wireless interface.
pub struct MockWifiAdapter {
    hardware_id: String,
    latency: Duration,
    join_behavior: RwLock<JoinBehavior>,
    join_attempts: AtomicUsize,
    link_up: AtomicBool,
    signal_dbm: AtomicI32,
    joined_ssid: RwLock<Option<String>>,
    access_point: RwLock<Option<(String, Option<String>)>>,
}

impl MockWifiAdapter {
    pub fn new(config: MockWifiConfig) -> Self {
        Self {
            hardware_id: config.hardware_id,
            latency: Duration::from_millis(config.latency_ms),
            join_behavior: RwLock::new(JoinBehavior::Succeed),
            join_attempts: AtomicUsize::new(0),
            link_up: AtomicBool::new(false),
            signal_dbm: AtomicI32::new(config.signal_dbm),
            joined_ssid: RwLock::new(None),
            access_point: RwLock::new(None),
        }
    }

    pub fn set_join_behavior(&self, behavior: JoinBehavior) {
        *self.join_behavior.write() = behavior;
    }

    /// Simulates link loss or recovery of an existing association.
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }

    pub fn set_signal_strength(&self, dbm: i32) {
        self.signal_dbm.store(dbm, Ordering::SeqCst);
    }

    pub fn join_attempts(&self) -> usize {
        self.join_attempts.load(Ordering::SeqCst)
    }

    pub fn joined_ssid(&self) -> Option<String> {
        self.joined_ssid.read().clone()
    }

    /// The hosted access point as (ssid, passphrase), if any.
    pub fn access_point(&self) -> Option<(String, Option<String>)> {
        self.access_point.read().clone()
    }
}

#[async_trait]
impl WifiAdapter for MockWifiAdapter {
    async fn join(&self, ssid: &str, _passphrase: &str) -> Result<(), WifiError> {
        self.join_attempts.fetch_add(1, Ordering::SeqCst);
        // Copy the scripted behavior out so no lock guard lives across
        // an await; the join future must stay Send.
        let behavior = *self.join_behavior.read();
        match behavior {
            JoinBehavior::Hang => futures::future::pending().await,
            JoinBehavior::Fail => {
                sleep(self.latency).await;
                Err(WifiError::JoinFailed(format!("no association with {ssid}")))
            }
            JoinBehavior::Succeed => {
                sleep(self.latency).await;
                *self.access_point.write() = None;
                *self.joined_ssid.write() = Some(ssid.to_string());
                self.link_up.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn start_access_point(
        &self,
        ssid: &str,
        passphrase: Option<&str>,
    ) -> Result<(), WifiError> {
        self.link_up.store(false, Ordering::SeqCst);
        *self.joined_ssid.write() = None;
        *self.access_point.write() = Some((ssid.to_string(), passphrase.map(str::to_string)));
        Ok(())
    }

    async fn disconnect(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        *self.joined_ssid.write() = None;
        *self.access_point.write() = None;
    }

    async fn link_up(&self) -> bool {
        self.link_up.load(Ordering::SeqCst)
    }

    async fn signal_strength(&self) -> Option<i32> {
        self.link_up
            .load(Ordering::SeqCst)
            .then(|| self.signal_dbm.load(Ordering::SeqCst))
    }

    fn hardware_id(&self) -> String {
        self.hardware_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_replaces_any_hosted_access_point() {
        let adapter = MockWifiAdapter::new(MockWifiConfig::default());
        adapter.start_access_point("Sensor_AA", None).await.unwrap();
        assert!(adapter.access_point().is_some());

        adapter.join("Home", "secret1").await.unwrap();
        assert_eq!(adapter.joined_ssid().as_deref(), Some("Home"));
        assert!(adapter.access_point().is_none());
        assert!(adapter.link_up().await);
        assert_eq!(adapter.signal_strength().await, Some(-58));
    }

    #[tokio::test]
    async fn join_runs_on_a_spawned_task() {
        // The connectivity manager drives joins from spawned tasks, so
        // the future has to cross threads.
        let adapter = std::sync::Arc::new(MockWifiAdapter::new(MockWifiConfig::default()));
        let worker = std::sync::Arc::clone(&adapter);
        tokio::spawn(async move { worker.join("Home", "secret1").await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(adapter.joined_ssid().as_deref(), Some("Home"));
    }

    #[tokio::test]
    async fn scripted_failure_counts_the_attempt() {
        let adapter = MockWifiAdapter::new(MockWifiConfig::default());
        adapter.set_join_behavior(JoinBehavior::Fail);
        assert!(adapter.join("Home", "secret1").await.is_err());
        assert_eq!(adapter.join_attempts(), 1);
        assert!(!adapter.link_up().await);
        assert_eq!(adapter.signal_strength().await, None);
    }
}
