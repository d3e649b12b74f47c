use super::super::state::ServerState;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Lets a request through only with `Authorization: Bearer <cron_secret>`.
pub async fn require_internal_secret(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (&state.config.cron_secret, provided) {
        (Some(secret), Some(provided)) if secret == provided => next.run(request).await,
        _ => {
            warn!("Rejected unauthorized call to {}", request.uri().path());
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}
