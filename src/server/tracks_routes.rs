use super::errors::internal_error_response;
use super::http_layers::require_internal_secret;
use super::state::{GuardedTokenManager, GuardedTrackCache, ServerState};
use crate::catalog::{ApiError, AudioDimension, CachedTrack};
use axum::{
    extract::{Path, Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

#[derive(Deserialize, Debug)]
struct TracksQuery {
    #[serde(default)]
    ids: String,
}

/// With a `user_id`, picks missing from the cache are asked from the provider
/// with that user's credentials.
#[derive(Deserialize, Debug)]
struct RepresentingQuery {
    user_id: Option<String>,
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

async fn get_tracks(
    State(cache): State<GuardedTrackCache>,
    Query(query): Query<TracksQuery>,
) -> Response {
    let ids = split_ids(&query.ids);
    if ids.is_empty() {
        return ApiError::Validation("no track ids given".to_string()).into_response();
    }
    match cache.get_cached(&ids).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            error!("Failed to read cached tracks: {:#}", e);
            internal_error_response()
        }
    }
}

async fn put_tracks(
    State(cache): State<GuardedTrackCache>,
    Json(entries): Json<Vec<CachedTrack>>,
) -> Response {
    let received = entries.len();
    match cache.put_many(entries).await {
        Ok(stored) => Json(json!({"received": received, "stored": stored})).into_response(),
        Err(e) => {
            error!("Failed to store tracks: {:#}", e);
            internal_error_response()
        }
    }
}

async fn get_representatives(
    State(cache): State<GuardedTrackCache>,
    State(token_manager): State<GuardedTokenManager>,
    Path(feature): Path<String>,
    Query(query): Query<RepresentingQuery>,
) -> Response {
    let dimension: AudioDimension = match feature.parse() {
        Ok(dimension) => dimension,
        Err(e) => return ApiError::into_response(e),
    };
    let picks = match query.user_id {
        Some(user_id) => {
            let session = token_manager.session(&user_id);
            cache.find_representatives(&session, dimension).await
        }
        None => {
            cache.await_pending_writes().await;
            cache
                .find_cached_representatives(dimension)
                .map_err(ApiError::from)
        }
    };
    match picks {
        Ok(picks) => Json(picks).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_representative(
    State(cache): State<GuardedTrackCache>,
    State(token_manager): State<GuardedTokenManager>,
    Path((feature, min, max)): Path<(String, f64, f64)>,
    Query(query): Query<RepresentingQuery>,
) -> Response {
    let dimension: AudioDimension = match feature.parse() {
        Ok(dimension) => dimension,
        Err(e) => return ApiError::into_response(e),
    };
    if !(min < max) {
        return ApiError::Validation(format!("min {} must be below max {}", min, max))
            .into_response();
    }
    let pick = match query.user_id {
        Some(user_id) => {
            let session = token_manager.session(&user_id);
            cache.find_representative(&session, dimension, min, max).await
        }
        None => {
            cache.await_pending_writes().await;
            cache
                .find_cached_representative(dimension, min, max)
                .map_err(ApiError::from)
        }
    };
    match pick {
        Ok(pick) => Json(pick).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Reads are public; writing entries shares the secret of the internal routes.
pub fn make_tracks_routes(state: ServerState) -> Router {
    let guarded_put = post(put_tracks).route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_internal_secret,
    ));
    Router::new()
        .route("/", get(get_tracks).merge(guarded_put))
        .route("/representing/{feature}", get(get_representatives))
        .route("/representing/{feature}/{min}/{max}", get(get_representative))
        .with_state(state)
}
