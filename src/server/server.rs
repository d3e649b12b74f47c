use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::account_routes::{make_account_routes, make_cron_routes};
use super::metrics::metrics_handler;
use super::playlist_routes::{make_playlist_routes, make_recommendation_routes};
use super::tracks_routes::make_tracks_routes;
use super::{log_requests, state::*};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub provider: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        provider: state.token_manager.provider().to_string(),
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    let app: Router = home_router
        .nest("/v1/tracks", make_tracks_routes(state.clone()))
        .nest(
            "/v1/recommendations",
            make_recommendation_routes(state.clone()),
        )
        .nest("/v1/playlist", make_playlist_routes(state.clone()))
        .nest("/v1/cron", make_cron_routes(state.clone()))
        .nest("/v1/accounts", make_account_routes(state.clone()));

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the API and the Prometheus endpoint until `shutdown` is cancelled.
pub async fn run_server(
    state: ServerState,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let metrics_shutdown = shutdown.clone();
    let metrics_server = axum::serve(metrics_listener, make_metrics_app())
        .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await });
    let api_server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::try_join!(async { api_server.await }, async { metrics_server.await })?;
    Ok(())
}
