//! sensor-api - configuration and status REST API.
//!
//! JSON surface of the node: status for dashboards, configuration
//! reads/saves, manual update check and restart. All routes except
//! `/health` sit behind basic auth with the stored web password.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the REST API router with the given application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/status", get(handlers::status::get_status))
        .route("/api/config", get(handlers::config::get_config))
        .route("/api/config/wifi", post(handlers::config::save_wifi))
        .route("/api/config/node", post(handlers::config::save_node))
        .route("/api/config/mqtt", post(handlers::config::save_mqtt))
        .route("/api/update/check", post(handlers::update::check))
        .route("/api/restart", post(handlers::restart::restart))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
