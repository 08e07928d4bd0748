//! Retained sensor readings on MQTT.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sensor_core::ledger::{ConfigHandle, ConfigRecord};
use sensor_core::models::SensorReadings;

/// Pause between broker connection attempts while the link is down.
const RECONNECT_SPACING: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_QUEUE: usize = 64;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("mqtt publish failed: {0}")]
    Publish(String),
}

/// Broker coordinates a client was built against. A change in any of
/// them retires the client.
#[derive(Clone, PartialEq)]
struct BrokerSettings {
    server: String,
    port: u16,
    client_id: String,
    user: String,
    password: String,
}

impl BrokerSettings {
    fn from_record(record: &ConfigRecord, hardware_id: &str) -> Option<Self> {
        if record.mqtt_server.is_empty() || record.mqtt_port == 0 {
            return None;
        }
        let client_id = if record.mqtt_client_id.is_empty() {
            format!("node_{hardware_id}")
        } else {
            record.mqtt_client_id.clone()
        };
        Some(Self {
            server: record.mqtt_server.clone(),
            port: record.mqtt_port,
            client_id,
            user: record.mqtt_user.clone(),
            password: record.mqtt_password.clone(),
        })
    }
}

struct ActiveClient {
    client: AsyncClient,
    settings: BrokerSettings,
    driver: JoinHandle<()>,
}

impl Drop for ActiveClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Publishes readings to `/iot/{lowercase hardware id}/sensors/...`
/// as retained values, one topic per quantity.
///
/// The client exists only while the broker is configured and is
/// rebuilt when the broker settings change. Publishes are
/// fire-and-forget; a dead broker costs nothing but a queue slot.
pub struct MqttPublisher {
    config: Arc<ConfigHandle>,
    hardware_id: String,
    active: Mutex<Option<ActiveClient>>,
    last_publish: Mutex<Option<Instant>>,
}

impl MqttPublisher {
    pub fn new(config: Arc<ConfigHandle>, hardware_id: String) -> Self {
        Self {
            config,
            hardware_id,
            active: Mutex::new(None),
            last_publish: Mutex::new(None),
        }
    }

    /// Publishes one set of readings. Returns whether anything was
    /// handed to the client: an unconfigured broker or a publish
    /// inside the configured interval skips quietly. The first publish
    /// after startup is exempt from the interval gate.
    pub fn publish(&self, readings: &SensorReadings) -> Result<bool, MqttError> {
        let record = self.config.snapshot();
        let Some(settings) = BrokerSettings::from_record(&record, &self.hardware_id) else {
            return Ok(false);
        };

        let interval = Duration::from_millis(u64::from(record.publishing_interval));
        {
            let last = self.last_publish.lock();
            if let Some(at) = *last {
                if at.elapsed() < interval {
                    return Ok(false);
                }
            }
        }

        let base = self.base_topic();
        let mut published = false;
        {
            let mut active = self.active.lock();
            let client = self.client_for(&mut active, settings);
            for (leaf, value) in [
                ("temperature", readings.temperature),
                ("humidity", readings.humidity),
                ("pressure", readings.pressure),
            ] {
                let Some(value) = value else { continue };
                client
                    .try_publish(
                        format!("{base}/{leaf}"),
                        QoS::AtMostOnce,
                        true,
                        format!("{value:.1}"),
                    )
                    .map_err(|err| MqttError::Publish(err.to_string()))?;
                published = true;
            }
        }

        if published {
            *self.last_publish.lock() = Some(Instant::now());
            debug!(topic = %base, "sensor readings published");
        }
        Ok(published)
    }

    fn base_topic(&self) -> String {
        format!("/iot/{}/sensors", self.hardware_id.to_lowercase())
    }

    /// Returns the live client, building or rebuilding it when the
    /// broker settings demand one.
    fn client_for<'a>(
        &self,
        active: &'a mut Option<ActiveClient>,
        settings: BrokerSettings,
    ) -> &'a AsyncClient {
        let stale = active
            .as_ref()
            .is_some_and(|current| current.settings != settings);
        if stale {
            info!(server = %settings.server, port = settings.port, "broker changed, rebuilding the mqtt client");
            *active = None;
        }

        &active
            .get_or_insert_with(|| Self::build_client(settings))
            .client
    }

    fn build_client(settings: BrokerSettings) -> ActiveClient {
        let mut options =
            MqttOptions::new(&settings.client_id, &settings.server, settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        if !settings.user.is_empty() {
            options.set_credentials(&settings.user, &settings.password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
        let server = settings.server.clone();
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(err) => {
                        warn!(server = %server, error = %err, "mqtt connection lost");
                        tokio::time::sleep(RECONNECT_SPACING).await;
                    }
                }
            }
        });

        ActiveClient {
            client,
            settings,
            driver,
        }
    }
}
