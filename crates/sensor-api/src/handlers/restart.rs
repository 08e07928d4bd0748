//! Manual restart.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::handlers::RESTART_DELAY;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub restarting: bool,
}

/// POST /api/restart
pub async fn restart(State(state): State<AppState>) -> Json<RestartResponse> {
    info!("restart requested over the API");
    state.restarter.request_restart(RESTART_DELAY);
    Json(RestartResponse { restarting: true })
}
