//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases, talking to its
//! own [`FakeProvider`].

use super::constants::*;
use super::provider::FakeProvider;
use fifths_playlist_server::catalog::{CatalogGateway, HttpCatalogClient};
use fifths_playlist_server::config::{CacheSettings, RetrySettings, TokenSettings};
use fifths_playlist_server::oauth::{
    OAuthTokenClient, SqliteAccountStore, TokenLifecycleManager, SPOTIFY_PROVIDER,
};
use fifths_playlist_server::playlist::PlaylistPublisher;
use fifths_playlist_server::rate_limit::{RateLimiter, RateLimiterConfig, RetryPolicy};
use fifths_playlist_server::recommendations::RecommendationClient;
use fifths_playlist_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use fifths_playlist_server::track_cache::{SqliteTrackStore, TrackFeatureCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The provider this server talks to
    pub provider: FakeProvider,

    /// Token manager for direct account access in tests
    pub token_manager: Arc<TokenLifecycleManager>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a fake provider and a server wired to it, on random ports
    pub async fn spawn() -> Self {
        let provider = FakeProvider::spawn().await;
        let temp_db_dir = TempDir::new().expect("Failed to create temp db dir");

        let timeout = Duration::from_secs(REQUEST_TIMEOUT_SECS);
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            permits: 100,
            window: Duration::from_secs(1),
        }));
        let retry = RetryPolicy::new(&RetrySettings {
            max_retries: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            backoff_multiplier: 2.0,
        });

        let track_store = Arc::new(
            SqliteTrackStore::new(temp_db_dir.path().join("tracks.db"))
                .expect("Failed to open track store"),
        );
        let account_store = Arc::new(
            SqliteAccountStore::new(temp_db_dir.path().join("accounts.db"))
                .expect("Failed to open account store"),
        );

        let gateway = Arc::new(CatalogGateway::new(
            Arc::new(
                HttpCatalogClient::new(&provider.api_base_url(), timeout)
                    .expect("Failed to build catalog client"),
            ),
            limiter.clone(),
            retry.clone(),
        ));
        let track_cache = Arc::new(TrackFeatureCache::new(
            track_store,
            gateway.clone(),
            CacheSettings::default(),
        ));
        let recommendations = Arc::new(RecommendationClient::new(
            track_cache.clone(),
            vec!["pop".to_string()],
        ));
        let publisher = Arc::new(PlaylistPublisher::new(gateway, "Circle of Fifths".to_string()));
        let token_manager = Arc::new(TokenLifecycleManager::new(
            account_store,
            Arc::new(
                OAuthTokenClient::new(&provider.token_url(), CLIENT_ID, CLIENT_SECRET, timeout)
                    .expect("Failed to build token client"),
            ),
            limiter,
            retry,
            TokenSettings::default(),
            SPOTIFY_PROVIDER,
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                cron_secret: Some(CRON_SECRET.to_string()),
                ..ServerConfig::default()
            },
            start_time: Instant::now(),
            track_cache,
            recommendations,
            publisher,
            token_manager: token_manager.clone(),
        };
        let app = make_app(state);

        // Spawn server in background task with graceful shutdown
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            provider,
            token_manager,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
