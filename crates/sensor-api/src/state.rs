//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sensor_core::ledger::ConfigHandle;
use sensor_core::models::{ReadingsCell, Restarter};
use sensor_net::link::ConnectivityManager;
use sensor_net::update::UpdateCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub link: Arc<ConnectivityManager>,
    pub updates: Arc<UpdateCoordinator>,
    pub readings: Arc<ReadingsCell>,
    pub restarter: Arc<dyn Restarter>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigHandle>,
        link: Arc<ConnectivityManager>,
        updates: Arc<UpdateCoordinator>,
        readings: Arc<ReadingsCell>,
        restarter: Arc<dyn Restarter>,
    ) -> Self {
        Self {
            config,
            link,
            updates,
            readings,
            restarter,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
