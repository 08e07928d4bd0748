//! Periodic device telemetry posts.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use sensor_core::ledger::ConfigHandle;
use sensor_core::models::ConnectivityState;

use crate::endpoint::service_url;
use crate::link::ConnectivityManager;

const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry delivery failed: {0}")]
    Delivery(String),
}

#[derive(Serialize)]
struct TelemetryItem {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct TelemetryBody {
    uid: String,
    items: Vec<TelemetryItem>,
}

/// Posts signal strength and supply voltage to the configured
/// collection endpoint. Silently does nothing while the endpoint is
/// unconfigured or the device is off the network.
pub struct TelemetryReporter {
    http: Client,
    config: Arc<ConfigHandle>,
    link: Arc<ConnectivityManager>,
}

impl TelemetryReporter {
    pub fn new(config: Arc<ConfigHandle>, link: Arc<ConnectivityManager>) -> Self {
        Self {
            http: Client::new(),
            config,
            link,
        }
    }

    pub async fn send(&self, vcc: f32) -> Result<(), TelemetryError> {
        let (uid, post_url) = self
            .config
            .with(|record| (record.uid.clone(), record.post_url.clone()));
        if post_url.is_empty() || self.link.state() != ConnectivityState::Associated {
            return Ok(());
        }

        let rssi = self.link.adapter().signal_strength().await;
        let body = TelemetryBody {
            uid,
            items: vec![
                TelemetryItem {
                    name: "rssi",
                    value: rssi.map_or_else(String::new, |dbm| dbm.to_string()),
                },
                TelemetryItem {
                    name: "vcc",
                    value: format!("{vcc:.2}"),
                },
            ],
        };

        let url = service_url(&post_url)
            .map_err(|err| TelemetryError::Delivery(err.to_string()))?;
        self.http
            .post(url)
            .timeout(REPORT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|err| TelemetryError::Delivery(err.to_string()))?;
        debug!(vcc, rssi, "telemetry report delivered");
        Ok(())
    }
}
