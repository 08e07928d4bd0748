//! Connectivity state machine.
//!
//! The manager owns the [`ConnectivityState`] and every retry timer
//! around it. Everything else observes the state through a watch
//! channel; nothing outside this module transitions it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use sensor_core::{ConfigHandle, ConfigRecord, ConnectivityState};

use crate::config::LinkConfig;
use crate::wifi::{WifiAdapter, WifiError};

/// Why an association attempt did not end in Associated.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("association attempt timed out")]
    AssociationTimeout,

    #[error("transient link loss")]
    TransientLinkLoss,

    #[error(transparent)]
    Adapter(#[from] WifiError),
}

pub struct ConnectivityManager {
    adapter: Arc<dyn WifiAdapter>,
    config: Arc<ConfigHandle>,
    timings: LinkConfig,
    state_tx: watch::Sender<ConnectivityState>,
    retry: Mutex<RetryState>,
}

#[derive(Default)]
struct RetryState {
    recovery_since: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl ConnectivityManager {
    pub fn new(adapter: Arc<dyn WifiAdapter>, config: Arc<ConfigHandle>, timings: LinkConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Disassociated);
        Self {
            adapter,
            config,
            timings,
            state_tx,
            retry: Mutex::new(RetryState::default()),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    /// Watch channel carrying every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    pub fn adapter(&self) -> &Arc<dyn WifiAdapter> {
        &self.adapter
    }

    fn set_state(&self, next: ConnectivityState) {
        let previous = *self.state_tx.borrow();
        if previous != next {
            info!(from = %previous, to = %next, "connectivity state changed");
            self.state_tx.send_replace(next);
        }
    }

    /// Runs the connection decision tree and returns the state it
    /// settled in.
    ///
    /// The `apmode` flag wins over stored credentials and skips the
    /// association attempt entirely; an empty ssid or a failed or
    /// timed-out join all end in recovery mode. An empty passphrase
    /// with a configured ssid is an open network, not missing
    /// credentials.
    pub async fn connect(&self) -> ConnectivityState {
        let record = self.config.snapshot();
        if record.apmode {
            info!("access point operation forced by configuration");
            self.enter_recovery(&record).await;
            return self.state();
        }
        if record.ssid.is_empty() {
            info!("no stored credentials, entering recovery mode");
            self.enter_recovery(&record).await;
            return self.state();
        }
        match self
            .try_associate(&record, self.timings.associate_timeout())
            .await
        {
            Ok(()) => {
                if !record.domain.is_empty() {
                    info!(domain = %record.domain, "link up, host name announced");
                }
            }
            Err(err) => {
                warn!(error = %err, ssid = %record.ssid, "association failed, entering recovery mode");
                self.enter_recovery(&record).await;
            }
        }
        self.state()
    }

    /// One periodic health tick: link loss detection, the cool-down
    /// reassociation and the recovery retry.
    pub async fn maintain(&self) {
        match self.state() {
            ConnectivityState::Associated => {
                if !self.adapter.link_up().await {
                    let loss = LinkError::TransientLinkLoss;
                    warn!("{loss}, reassociating after cool-down");
                    self.retry.lock().cooldown_until =
                        Some(Instant::now() + self.timings.link_cooldown());
                    self.set_state(ConnectivityState::Disassociated);
                }
            }
            ConnectivityState::Disassociated => {
                let due = {
                    let mut retry = self.retry.lock();
                    let due = retry
                        .cooldown_until
                        .map_or(true, |at| Instant::now() >= at);
                    if due {
                        retry.cooldown_until = None;
                    }
                    due
                };
                if due {
                    self.connect().await;
                }
            }
            ConnectivityState::RecoveryMode => {
                let record = self.config.snapshot();
                if record.apmode || record.ssid.is_empty() {
                    return;
                }
                let due = self
                    .retry
                    .lock()
                    .recovery_since
                    .map_or(true, |since| since.elapsed() >= self.timings.recovery_retry());
                if due {
                    info!("retrying infrastructure association from recovery mode");
                    self.connect().await;
                }
            }
            ConnectivityState::Associating => {}
        }
    }

    /// Ensures an association for a short-lived exchange, such as the
    /// boot-time update report. On failure the node settles back into
    /// recovery mode.
    pub async fn ensure_associated(&self, bound: Duration) -> bool {
        if self.state() == ConnectivityState::Associated {
            return true;
        }
        let record = self.config.snapshot();
        if record.ssid.is_empty() {
            return false;
        }
        match self.try_associate(&record, bound).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "short-lived association failed");
                self.enter_recovery(&record).await;
                false
            }
        }
    }

    async fn try_associate(&self, record: &ConfigRecord, bound: Duration) -> Result<(), LinkError> {
        self.set_state(ConnectivityState::Associating);
        let attempt = self.adapter.join(&record.ssid, &record.password);
        match timeout(bound, attempt).await {
            Ok(Ok(())) => {
                self.set_state(ConnectivityState::Associated);
                Ok(())
            }
            Ok(Err(err)) => {
                self.adapter.disconnect().await;
                Err(LinkError::Adapter(err))
            }
            Err(_) => {
                self.adapter.disconnect().await;
                Err(LinkError::AssociationTimeout)
            }
        }
    }

    /// Starts the recovery access point and records the retry anchor.
    ///
    /// Flag-forced operation reuses the configured credentials when an
    /// ssid is present; the fallback is an open network named after
    /// the hardware id.
    async fn enter_recovery(&self, record: &ConfigRecord) {
        let (ssid, passphrase) = if record.apmode && !record.ssid.is_empty() {
            let passphrase = (!record.password.is_empty()).then(|| record.password.clone());
            (record.ssid.clone(), passphrase)
        } else {
            (format!("Sensor_{}", self.adapter.hardware_id()), None)
        };
        match self
            .adapter
            .start_access_point(&ssid, passphrase.as_deref())
            .await
        {
            Ok(()) => info!(ssid = %ssid, open = passphrase.is_none(), "recovery access point up"),
            Err(err) => warn!(error = %err, "failed to start recovery access point"),
        }
        self.retry.lock().recovery_since = Some(Instant::now());
        self.set_state(ConnectivityState::RecoveryMode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockWifiConfig;
    use crate::wifi::{JoinBehavior, MockWifiAdapter};
    use sensor_core::{ConfigLedger, MemStore};

    fn config_with(fields: &[(&str, &str)]) -> Arc<ConfigHandle> {
        let handle = ConfigHandle::open(ConfigLedger::new(Box::new(MemStore::new(1024))));
        handle
            .transact(|record| {
                for (name, value) in fields {
                    assert!(record.set_field(name, value));
                }
            })
            .unwrap();
        Arc::new(handle)
    }

    fn manager_with(
        fields: &[(&str, &str)],
        latency_ms: u64,
    ) -> (Arc<ConnectivityManager>, Arc<MockWifiAdapter>) {
        let adapter = Arc::new(MockWifiAdapter::new(MockWifiConfig {
            latency_ms,
            ..MockWifiConfig::default()
        }));
        let manager = Arc::new(ConnectivityManager::new(
            adapter.clone(),
            config_with(fields),
            LinkConfig::default(),
        ));
        (manager, adapter)
    }

    /// Collects every state change into a vector for order assertions.
    fn spawn_state_collector(
        manager: &ConnectivityManager,
    ) -> Arc<Mutex<Vec<ConnectivityState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut rx = manager.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                sink.lock().push(*rx.borrow_and_update());
            }
        });
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn valid_credentials_walk_through_associating() {
        let (manager, adapter) = manager_with(
            &[("ssid", "Home"), ("password", "secret1"), ("domain", "node-1")],
            50,
        );
        let seen = spawn_state_collector(&manager);

        assert_eq!(manager.connect().await, ConnectivityState::Associated);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            *seen.lock(),
            vec![ConnectivityState::Associating, ConnectivityState::Associated]
        );
        assert_eq!(adapter.joined_ssid().as_deref(), Some("Home"));
    }

    #[tokio::test(start_paused = true)]
    async fn open_network_joins_with_an_empty_passphrase() {
        let (manager, adapter) = manager_with(&[("ssid", "CoffeeShop")], 0);

        assert_eq!(manager.connect().await, ConnectivityState::Associated);
        assert_eq!(adapter.join_attempts(), 1);
        assert_eq!(adapter.joined_ssid().as_deref(), Some("CoffeeShop"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_credentials_go_straight_to_recovery() {
        let (manager, adapter) = manager_with(&[], 50);
        let seen = spawn_state_collector(&manager);

        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Associating is never entered.
        assert_eq!(*seen.lock(), vec![ConnectivityState::RecoveryMode]);
        assert_eq!(adapter.join_attempts(), 0);
        let (ssid, passphrase) = adapter.access_point().expect("recovery AP");
        assert_eq!(ssid, "Sensor_A0B1C2D3E4F5");
        assert_eq!(passphrase, None);
    }

    #[tokio::test(start_paused = true)]
    async fn apmode_flag_wins_over_stored_credentials() {
        let (manager, adapter) = manager_with(
            &[("apmode", "1"), ("ssid", "Barn"), ("password", "haystack")],
            50,
        );

        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);
        assert_eq!(adapter.join_attempts(), 0);
        let (ssid, passphrase) = adapter.access_point().expect("forced AP");
        assert_eq!(ssid, "Barn");
        assert_eq!(passphrase.as_deref(), Some("haystack"));
    }

    #[tokio::test(start_paused = true)]
    async fn association_timeout_falls_back_to_recovery() {
        let (manager, adapter) = manager_with(&[("ssid", "Home"), ("password", "secret1")], 0);
        adapter.set_join_behavior(JoinBehavior::Hang);

        let before = Instant::now();
        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);
        assert!(before.elapsed() >= LinkConfig::default().associate_timeout());
        assert_eq!(adapter.join_attempts(), 1);
        assert!(adapter.access_point().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_reassociates_after_cooldown() {
        let (manager, adapter) = manager_with(&[("ssid", "Home"), ("password", "secret1")], 0);
        assert_eq!(manager.connect().await, ConnectivityState::Associated);

        adapter.set_link_up(false);
        manager.maintain().await;
        assert_eq!(manager.state(), ConnectivityState::Disassociated);
        assert_eq!(adapter.join_attempts(), 1);

        // Within the cool-down nothing happens.
        tokio::time::advance(Duration::from_secs(60)).await;
        manager.maintain().await;
        assert_eq!(manager.state(), ConnectivityState::Disassociated);
        assert_eq!(adapter.join_attempts(), 1);

        tokio::time::advance(LinkConfig::default().link_cooldown()).await;
        manager.maintain().await;
        assert_eq!(manager.state(), ConnectivityState::Associated);
        assert_eq!(adapter.join_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_retries_on_its_interval() {
        let (manager, adapter) = manager_with(&[("ssid", "Home"), ("password", "secret1")], 0);
        adapter.set_join_behavior(JoinBehavior::Fail);
        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);
        assert_eq!(adapter.join_attempts(), 1);

        // Too early: the retry interval has not elapsed.
        manager.maintain().await;
        assert_eq!(adapter.join_attempts(), 1);

        tokio::time::advance(LinkConfig::default().recovery_retry()).await;
        adapter.set_join_behavior(JoinBehavior::Succeed);
        manager.maintain().await;
        assert_eq!(manager.state(), ConnectivityState::Associated);
        assert_eq!(adapter.join_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flag_forced_recovery_never_retries() {
        let (manager, adapter) = manager_with(
            &[("apmode", "1"), ("ssid", "Barn"), ("password", "haystack")],
            0,
        );
        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);

        tokio::time::advance(Duration::from_secs(7200)).await;
        manager.maintain().await;
        assert_eq!(manager.state(), ConnectivityState::RecoveryMode);
        assert_eq!(adapter.join_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_association_settles_back_to_recovery_on_failure() {
        let (manager, adapter) = manager_with(&[("ssid", "Home"), ("password", "secret1")], 0);
        adapter.set_join_behavior(JoinBehavior::Fail);
        assert_eq!(manager.connect().await, ConnectivityState::RecoveryMode);

        assert!(!manager.ensure_associated(Duration::from_secs(10)).await);
        assert_eq!(manager.state(), ConnectivityState::RecoveryMode);

        adapter.set_join_behavior(JoinBehavior::Succeed);
        assert!(manager.ensure_associated(Duration::from_secs(10)).await);
        assert_eq!(manager.state(), ConnectivityState::Associated);
    }
}
