//! Manual update check.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UpdateCheckResponse {
    pub current: String,
    /// Candidate version, absent when the node is up to date or the
    /// endpoint could not say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<String>,
}

/// POST /api/update/check
pub async fn check(State(state): State<AppState>) -> Json<UpdateCheckResponse> {
    let available = state.updates.check_for_update().await;
    Json(UpdateCheckResponse {
        current: state.updates.running_version(),
        available,
    })
}
