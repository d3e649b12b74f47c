use crate::catalog::ApiError;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // The client is expected to drop its session and sign in again.
            ApiError::RefreshFailed(_) | ApiError::AuthExpired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "RefreshAccessTokenError", "sign_out": true})),
            )
                .into_response(),
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            ApiError::RateLimited { retry_after } => {
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "Provider rate limit exceeded"})),
                )
                    .into_response();
                if let Some(retry_after) = retry_after {
                    response
                        .headers_mut()
                        .insert(RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
                }
                response
            }
            ApiError::TransientNetwork(_) | ApiError::Status { .. } | ApiError::Parse(_) => {
                error!("Provider failure: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": "Provider unavailable"})),
                )
                    .into_response()
            }
            ApiError::Storage(_) => {
                error!("{}", self);
                internal_error_response()
            }
        }
    }
}

pub(super) fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
        .into_response()
}
