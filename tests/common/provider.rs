//! In-process stand-in for the music provider's Web API and token endpoint
//!
//! Serves the handful of endpoints the server calls, from a small catalog
//! defined here, and records what it was asked so tests can assert on it.

use super::constants::*;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct CatalogTrack {
    pub id: &'static str,
    pub artist: &'static str,
    pub key: i32,
    pub mode: i32,
    pub energy: f64,
}

/// The test catalog, in the order recommendations return it.
pub fn catalog() -> Vec<CatalogTrack> {
    let track = |id, artist, key, mode, energy| CatalogTrack {
        id,
        artist,
        key,
        mode,
        energy,
    };
    vec![
        track(F_MAJOR_TRACK_ID, "Artist F", 5, 1, 0.5),
        track(E_MINOR_SAME_ARTIST_TRACK_ID, "Seed Artist", 4, 0, 0.5),
        track(E_MAJOR_TRACK_ID, "Artist E", 4, 1, 0.9),
        track(A_MAJOR_TRACK_ID, "Artist A", 9, 1, 0.7),
        track(D_MAJOR_TRACK_ID, "Artist D", 2, 1, 0.6),
        track(G_MAJOR_TRACK_ID, "Artist G", 7, 1, 0.4),
        track(SEED_TRACK_ID, "Seed Artist", 0, 1, 0.3),
    ]
}

fn wire_track(track: &CatalogTrack) -> Value {
    json!({
        "id": track.id,
        "name": format!("Song {}", track.id),
        "uri": format!("spotify:track:{}", track.id),
        "duration_ms": TRACK_DURATION_MS,
        "explicit": false,
        "popularity": 60,
        "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", track.id)},
        "album": {"name": "Album", "images": [], "artists": [{"id": null, "name": track.artist}]},
        "artists": [{"id": null, "name": track.artist}],
    })
}

fn wire_features(track: &CatalogTrack) -> Value {
    json!({
        "id": track.id,
        "key": track.key,
        "mode": track.mode,
        "tempo": 120.0,
        "energy": track.energy,
        "valence": 0.5,
        "danceability": 0.5,
        "acousticness": 0.2,
        "instrumentalness": 0.0,
        "liveness": 0.1,
        "loudness": -7.0,
        "speechiness": 0.05,
        "time_signature": 4,
    })
}

#[derive(Default)]
struct ProviderState {
    token_script: VecDeque<(StatusCode, Value)>,
    token_calls: usize,
    issued_tokens: usize,
    refresh_tokens_seen: Vec<String>,
    rejected_tokens: HashSet<String>,
    rate_limit_recommendations: usize,
    recommendation_calls: usize,
    bearer_tokens_seen: Vec<String>,
    created_playlists: Vec<(String, String)>,
    appended: HashMap<String, Vec<String>>,
}

type SharedState = Arc<Mutex<ProviderState>>;

/// Handle on a running fake provider
pub struct FakeProvider {
    pub base_url: String,
    state: SharedState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeProvider {
    pub async fn spawn() -> Self {
        let state: SharedState = Arc::new(Mutex::new(ProviderState::default()));
        let app = Router::new()
            .route("/api/token", post(token))
            .route("/v1/recommendations", get(recommendations))
            .route("/v1/audio-features", get(audio_features))
            .route("/v1/tracks", get(tracks))
            .route("/v1/search", get(search))
            .route(
                "/v1/playlists/{id}/tracks",
                get(playlist_tracks).post(append_tracks),
            )
            .route("/v1/users/{user_id}/playlists", post(create_playlist))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake provider");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake provider failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn api_base_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.base_url)
    }

    /// Queues one answer of the token endpoint. Unscripted calls succeed.
    pub fn script_token_response(&self, status: StatusCode, body: Value) {
        self.state
            .lock()
            .unwrap()
            .token_script
            .push_back((status, body));
    }

    /// API calls with this bearer token get a 401.
    pub fn reject_access_token(&self, token: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_tokens
            .insert(token.to_string());
    }

    /// The next `count` recommendation calls get a 429.
    pub fn rate_limit_recommendations(&self, count: usize) {
        self.state.lock().unwrap().rate_limit_recommendations = count;
    }

    pub fn token_calls(&self) -> usize {
        self.state.lock().unwrap().token_calls
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().refresh_tokens_seen.clone()
    }

    pub fn recommendation_calls(&self) -> usize {
        self.state.lock().unwrap().recommendation_calls
    }

    pub fn bearer_tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().bearer_tokens_seen.clone()
    }

    pub fn created_playlists(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_playlists.clone()
    }

    pub fn appended_uris(&self, playlist_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .appended
            .get(playlist_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn ids_param(params: &HashMap<String, String>, name: &str) -> Vec<String> {
    params
        .get(name)
        .map(|ids| ids.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Records the bearer token, answering 401 when it was marked as rejected.
fn check_bearer(state: &SharedState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    let mut state = state.lock().unwrap();
    state.bearer_tokens_seen.push(token.clone());
    if state.rejected_tokens.contains(&token) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"status": 401, "message": "The access token expired"}})),
        )
            .into_response());
    }
    Ok(())
}

async fn token(
    State(state): State<SharedState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.token_calls += 1;
    if let Some(refresh_token) = form.get("refresh_token") {
        state.refresh_tokens_seen.push(refresh_token.clone());
    }
    if let Some((status, body)) = state.token_script.pop_front() {
        return (status, Json(body)).into_response();
    }
    state.issued_tokens += 1;
    Json(json!({
        "access_token": format!("refreshed-{}", state.issued_tokens),
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "playlist-modify-private",
    }))
    .into_response()
}

/// Every catalog track except the seeds, honoring `min_energy`/`max_energy`.
async fn recommendations(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    {
        let mut state = state.lock().unwrap();
        state.recommendation_calls += 1;
        if state.rate_limit_recommendations > 0 {
            state.rate_limit_recommendations -= 1;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "0")],
                Json(json!({"error": {"status": 429, "message": "API rate limit exceeded"}})),
            )
                .into_response();
        }
    }
    let seeds: HashSet<String> = ids_param(&params, "seed_tracks").into_iter().collect();
    let bound = |name: &str| params.get(name).and_then(|v| v.parse::<f64>().ok());
    let (min_energy, max_energy) = (bound("min_energy"), bound("max_energy"));
    let tracks: Vec<Value> = catalog()
        .iter()
        .filter(|t| !seeds.contains(t.id))
        .filter(|t| min_energy.map_or(true, |min| t.energy >= min))
        .filter(|t| max_energy.map_or(true, |max| t.energy <= max))
        .map(wire_track)
        .collect();
    Json(json!({"tracks": tracks})).into_response()
}

async fn audio_features(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    let catalog = catalog();
    let features: Vec<Value> = ids_param(&params, "ids")
        .iter()
        .map(|id| {
            catalog
                .iter()
                .find(|t| t.id == id.as_str())
                .map(wire_features)
                .unwrap_or(Value::Null)
        })
        .collect();
    Json(json!({"audio_features": features})).into_response()
}

async fn tracks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    let catalog = catalog();
    let tracks: Vec<Value> = ids_param(&params, "ids")
        .iter()
        .map(|id| {
            catalog
                .iter()
                .find(|t| t.id == id.as_str())
                .map(wire_track)
                .unwrap_or(Value::Null)
        })
        .collect();
    Json(json!({"tracks": tracks})).into_response()
}

async fn search(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    let items: Vec<Value> = catalog().iter().map(wire_track).collect();
    let total = items.len();
    Json(json!({"tracks": {"items": items, "next": null, "offset": 0, "limit": 50, "total": total}}))
        .into_response()
}

/// The pool playlist: F major, A major, G major, E minor, D major.
async fn playlist_tracks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    if id != POOL_PLAYLIST_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"status": 404, "message": "Not found."}})),
        )
            .into_response();
    }
    let catalog = catalog();
    let items: Vec<Value> = [
        F_MAJOR_TRACK_ID,
        A_MAJOR_TRACK_ID,
        G_MAJOR_TRACK_ID,
        E_MINOR_SAME_ARTIST_TRACK_ID,
        D_MAJOR_TRACK_ID,
    ]
    .iter()
    .filter_map(|id| catalog.iter().find(|t| t.id == *id))
    .map(|t| json!({"track": wire_track(t)}))
    .collect();
    let total = items.len();
    Json(json!({"items": items, "next": null, "offset": 0, "limit": 50, "total": total}))
        .into_response()
}

async fn create_playlist(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    let mut state = state.lock().unwrap();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state.created_playlists.push((user_id, name));
    let id = format!("created-{}", state.created_playlists.len());
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "external_urls": {"spotify": format!("https://open.spotify.com/playlist/{}", id)},
        })),
    )
        .into_response()
}

async fn append_tracks(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_bearer(&state, &headers) {
        return response;
    }
    let uris: Vec<String> = body["uris"]
        .as_array()
        .map(|uris| {
            uris.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    state
        .lock()
        .unwrap()
        .appended
        .entry(id)
        .or_default()
        .extend(uris);
    (StatusCode::CREATED, Json(json!({"snapshot_id": "snapshot"}))).into_response()
}
