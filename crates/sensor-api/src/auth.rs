//! Basic authentication middleware.
//!
//! Validates `Authorization: Basic` with the fixed user `admin` and
//! the stored `web_password` on all requests except `/health`. The
//! node is its own access point in recovery mode, so the API is
//! reachable by anyone in radio range; the password is the only gate.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;

use crate::state::AppState;

const USERNAME: &str = "admin";

pub async fn require_auth(
    State(state): State<AppState>,
    authorization: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let expected = state.config.with(|record| record.web_password.clone());
    let authorized = authorization.as_ref().is_some_and(|TypedHeader(auth)| {
        auth.username() == USERNAME && auth.password() == expected
    });

    if authorized {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "unauthorized request");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"Secure Area\"")],
        )
            .into_response()
    }
}
