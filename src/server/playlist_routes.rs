use super::state::{
    GuardedPlaylistPublisher, GuardedRecommendationClient, GuardedTokenManager, ServerState,
};
use super::ServerConfig;
use crate::catalog::{ApiError, CachedTrack, FilterSpec, PlaylistRef};
use crate::oauth::AccountSession;
use crate::playlist::{
    Budget, DraftSummary, GenerationRequest, PlaylistAssembler, TerminationReason,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Search results requested when the candidate pool is a search query.
const SEARCH_POOL_LIMIT: u32 = 50;
const DEFAULT_RECOMMENDATION_LIMIT: u32 = 20;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
enum PoolSource {
    Playlist(String),
    Search(String),
}

#[derive(Deserialize, Debug)]
struct GeneratePlaylistBody {
    pub user_id: String,
    pub seed_track_id: String,
    pub pool: Option<PoolSource>,
    #[serde(default)]
    pub filters: HashMap<String, f64>,
    pub max_tracks: Option<usize>,
    pub min_duration_ms: Option<u64>,
    pub allow_explicit: Option<bool>,
    #[serde(default)]
    pub publish: bool,
    pub name: Option<String>,
}

#[derive(Serialize)]
struct GeneratePlaylistResponse {
    tracks: Vec<CachedTrack>,
    summary: DraftSummary,
    starting_len: usize,
    termination: TerminationReason,
    playlist: Option<PlaylistRef>,
}

#[derive(Deserialize, Debug)]
struct RecommendationsBody {
    pub user_id: String,
    #[serde(default)]
    pub seed_track_ids: Vec<String>,
    #[serde(default)]
    pub filters: HashMap<String, f64>,
    pub limit: Option<u32>,
}

fn parse_filters(filters: &HashMap<String, f64>) -> Result<FilterSpec, ApiError> {
    FilterSpec::from_params(filters.iter().map(|(name, value)| (name.as_str(), *value)))
}

async fn load_pool(
    recommendations: &GuardedRecommendationClient,
    session: &AccountSession,
    pool: Option<PoolSource>,
) -> Result<Vec<CachedTrack>, ApiError> {
    let cache = recommendations.cache();
    let tracks = match pool {
        None => return Ok(Vec::new()),
        Some(PoolSource::Playlist(id)) => cache.gateway().playlist_tracks(session, &id).await?,
        Some(PoolSource::Search(query)) => {
            cache
                .gateway()
                .search_tracks(session, &query, SEARCH_POOL_LIMIT)
                .await?
        }
    };
    cache.hydrate(session, tracks).await
}

async fn generate_playlist(
    State(config): State<ServerConfig>,
    State(recommendations): State<GuardedRecommendationClient>,
    State(publisher): State<GuardedPlaylistPublisher>,
    State(token_manager): State<GuardedTokenManager>,
    Json(body): Json<GeneratePlaylistBody>,
) -> Response {
    match build_playlist(config, recommendations, publisher, token_manager, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn build_playlist(
    config: ServerConfig,
    recommendations: GuardedRecommendationClient,
    publisher: GuardedPlaylistPublisher,
    token_manager: GuardedTokenManager,
    body: GeneratePlaylistBody,
) -> Result<Response, ApiError> {
    let filter = parse_filters(&body.filters)?;
    let budget = Budget {
        max_tracks: body.max_tracks.unwrap_or(config.default_max_tracks),
        min_duration_ms: body.min_duration_ms.or(config.default_min_duration_ms),
    };
    budget.validate()?;
    let session = token_manager.session(&body.user_id);

    let seed = recommendations
        .cache()
        .get_many(&session, std::slice::from_ref(&body.seed_track_id))
        .await?
        .into_iter()
        .next();
    let Some(seed) = seed else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("seed track {} not found", body.seed_track_id)})),
        )
            .into_response());
    };
    let pool = load_pool(&recommendations, &session, body.pool).await?;

    let request = GenerationRequest {
        seed,
        pool,
        filter,
        budget,
        allow_explicit: body.allow_explicit.unwrap_or(config.default_allow_explicit),
    };
    let mut assembler = PlaylistAssembler::new(recommendations.clone(), StdRng::from_os_rng());
    let outcome = assembler.generate(&session, request).await?;

    let playlist = if body.publish {
        let provider_user = token_manager.provider_account_id(&body.user_id)?;
        Some(
            publisher
                .publish(&session, &provider_user, body.name.as_deref(), &outcome.draft)
                .await?,
        )
    } else {
        None
    };

    let response = GeneratePlaylistResponse {
        summary: outcome.draft.summary(),
        tracks: outcome.draft.into_tracks(),
        starting_len: outcome.starting_len,
        termination: outcome.termination,
        playlist,
    };
    Ok(Json(response).into_response())
}

async fn post_recommendations(
    State(recommendations): State<GuardedRecommendationClient>,
    State(token_manager): State<GuardedTokenManager>,
    Json(body): Json<RecommendationsBody>,
) -> Response {
    let filter = match parse_filters(&body.filters) {
        Ok(filter) => filter,
        Err(err) => return err.into_response(),
    };
    let session = token_manager.session(&body.user_id);
    let limit = body.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
    let result = if body.seed_track_ids.is_empty() {
        recommendations.get_filtered(&session, &filter, limit).await
    } else {
        recommendations
            .get_recommendations(&session, &body.seed_track_ids, &filter, limit)
            .await
    };
    match result {
        Ok(tracks) => Json(tracks).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn make_playlist_routes(state: ServerState) -> Router {
    Router::new()
        .route("/generate", post(generate_playlist))
        .with_state(state)
}

pub fn make_recommendation_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", post(post_recommendations))
        .with_state(state)
}
