//! Node status for dashboards and health monitoring.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use sensor_core::ledger::LoadReport;
use sensor_core::models::{ConnectivityState, SensorReadings};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: ConnectivityState,
    pub version: String,
    pub uid: String,
    pub uptime_secs: u64,
    pub readings: SensorReadings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    /// What the last configuration load found on the medium.
    pub storage: LoadReport,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let rssi = state.link.adapter().signal_strength().await;
    Json(StatusResponse {
        state: state.link.state(),
        version: state.updates.running_version(),
        uid: state.config.with(|record| record.uid.clone()),
        uptime_secs: state.uptime().as_secs(),
        readings: state.readings.get(),
        rssi,
        storage: state.config.load_report(),
    })
}
