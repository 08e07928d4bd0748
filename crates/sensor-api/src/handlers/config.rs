//! Configuration reads and saves.
//!
//! Saves apply their fields through the record's own coercion rules
//! inside one configuration transaction, then schedule a restart so
//! every task picks the new settings up from a clean boot.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use sensor_core::ledger::ConfigRecord;

use crate::error::ApiError;
use crate::handlers::RESTART_DELAY;
use crate::state::AppState;

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigRecord> {
    Json(state.config.snapshot())
}

#[derive(Debug, Serialize)]
pub struct SaveOutcome {
    pub saved: Vec<&'static str>,
    pub rejected: Vec<&'static str>,
    pub restarting: bool,
}

#[derive(Debug, Deserialize)]
pub struct WifiSettings {
    pub apmode: Option<bool>,
    pub ssid: Option<String>,
    pub password: Option<String>,
}

/// POST /api/config/wifi
pub async fn save_wifi(
    State(state): State<AppState>,
    Json(body): Json<WifiSettings>,
) -> Result<Json<SaveOutcome>, ApiError> {
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    if let Some(apmode) = body.apmode {
        fields.push(("apmode", if apmode { "1" } else { "0" }.to_string()));
    }
    if body.apmode == Some(true) {
        // The AP checkbox wins: stored credentials would fight the
        // hosted network at the next boot.
        fields.push(("ssid", String::new()));
        fields.push(("password", String::new()));
    } else {
        if let Some(ssid) = body.ssid {
            fields.push(("ssid", ssid));
        }
        if let Some(password) = body.password {
            fields.push(("password", password));
        }
    }
    save_and_restart(&state, fields)
}

#[derive(Debug, Deserialize)]
pub struct NodeSettings {
    pub uid: Option<String>,
    pub post_url: Option<String>,
    pub ota_url: Option<String>,
    pub ota_result_url: Option<String>,
    #[serde(rename = "publishingInterval")]
    pub publishing_interval: Option<i64>,
    pub temp_offset: Option<f64>,
}

/// POST /api/config/node
pub async fn save_node(
    State(state): State<AppState>,
    Json(body): Json<NodeSettings>,
) -> Result<Json<SaveOutcome>, ApiError> {
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    if let Some(uid) = body.uid {
        fields.push(("uid", uid));
    }
    if let Some(post_url) = body.post_url {
        fields.push(("post_url", post_url));
    }
    if let Some(ota_url) = body.ota_url {
        fields.push(("ota_url", ota_url));
    }
    if let Some(ota_result_url) = body.ota_result_url {
        fields.push(("ota_result_url", ota_result_url));
    }
    if let Some(interval) = body.publishing_interval {
        fields.push(("publishingInterval", interval.to_string()));
    }
    if let Some(offset) = body.temp_offset {
        fields.push(("temp_offset", offset.to_string()));
    }
    save_and_restart(&state, fields)
}

#[derive(Debug, Deserialize)]
pub struct MqttSettings {
    pub mqtt_server: Option<String>,
    pub mqtt_port: Option<i64>,
    pub mqtt_user: Option<String>,
    pub mqtt_password: Option<String>,
}

/// POST /api/config/mqtt
pub async fn save_mqtt(
    State(state): State<AppState>,
    Json(body): Json<MqttSettings>,
) -> Result<Json<SaveOutcome>, ApiError> {
    let mut fields: Vec<(&'static str, String)> = Vec::new();
    if let Some(server) = body.mqtt_server {
        fields.push(("mqtt_server", server));
    }
    if let Some(port) = body.mqtt_port {
        fields.push(("mqtt_port", port.to_string()));
    }
    if let Some(user) = body.mqtt_user {
        fields.push(("mqtt_user", user));
    }
    if let Some(password) = body.mqtt_password {
        fields.push(("mqtt_password", password));
    }
    save_and_restart(&state, fields)
}

fn save_and_restart(
    state: &AppState,
    fields: Vec<(&'static str, String)>,
) -> Result<Json<SaveOutcome>, ApiError> {
    let mut saved = Vec::new();
    let mut rejected = Vec::new();
    state.config.transact(|record| {
        for (name, value) in &fields {
            if record.set_field(name, value) {
                saved.push(*name);
            } else {
                rejected.push(*name);
            }
        }
    })?;

    info!(saved = ?saved, rejected = ?rejected, "configuration saved, restart scheduled");
    state.restarter.request_restart(RESTART_DELAY);
    Ok(Json(SaveOutcome {
        saved,
        rejected,
        restarting: true,
    }))
}
