//! Internal routes: the token refresh trigger for an external cron, and
//! account administration for the sign-in frontend. All of them sit behind
//! [`require_internal_secret`](super::require_internal_secret).

use super::errors::internal_error_response;
use super::http_layers::require_internal_secret;
use super::state::{GuardedTokenManager, ServerState};
use crate::oauth::TokenGrant;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

async fn refresh_tokens(State(token_manager): State<GuardedTokenManager>) -> Response {
    match token_manager.refresh_expiring().await {
        Ok(report) => {
            info!(
                "Cron token refresh processed {} accounts",
                report.processed()
            );
            Json(json!({
                "message": "Token refresh completed",
                "processed": report.processed(),
                "results": report,
            }))
            .into_response()
        }
        Err(e) => {
            error!("Cron token refresh failed: {:#}", e);
            internal_error_response()
        }
    }
}

async fn put_account(
    State(token_manager): State<GuardedTokenManager>,
    Path(user_id): Path<String>,
    Json(grant): Json<TokenGrant>,
) -> Response {
    match token_manager.record_grant(&user_id, &grant) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to store grant of {}: {:#}", user_id, e);
            internal_error_response()
        }
    }
}

async fn get_account_state(
    State(token_manager): State<GuardedTokenManager>,
    Path(user_id): Path<String>,
) -> Response {
    match token_manager.state(&user_id) {
        Ok(state) => Json(json!({
            "user_id": user_id,
            "provider": token_manager.provider(),
            "state": state,
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to read account of {}: {:#}", user_id, e);
            internal_error_response()
        }
    }
}

async fn delete_account(
    State(token_manager): State<GuardedTokenManager>,
    Path(user_id): Path<String>,
) -> Response {
    match token_manager.sign_out(&user_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to sign out {}: {:#}", user_id, e);
            internal_error_response()
        }
    }
}

pub fn make_cron_routes(state: ServerState) -> Router {
    Router::new()
        .route("/refresh-tokens", get(refresh_tokens))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal_secret,
        ))
        .with_state(state)
}

pub fn make_account_routes(state: ServerState) -> Router {
    Router::new()
        .route(
            "/{user_id}",
            get(get_account_state)
                .put(put_account)
                .delete(delete_account),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal_secret,
        ))
        .with_state(state)
}
