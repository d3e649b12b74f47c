use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fifths_playlist_server::background_jobs::jobs::TokenRefreshJob;
use fifths_playlist_server::background_jobs::{JobContext, JobScheduler};
use fifths_playlist_server::catalog::{CatalogGateway, HttpCatalogClient};
use fifths_playlist_server::config;
use fifths_playlist_server::oauth::{
    OAuthTokenClient, SqliteAccountStore, TokenLifecycleManager, SPOTIFY_PROVIDER,
};
use fifths_playlist_server::playlist::PlaylistPublisher;
use fifths_playlist_server::rate_limit::{RateLimiter, RetryPolicy};
use fifths_playlist_server::recommendations::RecommendationClient;
use fifths_playlist_server::server::{metrics, run_server, RequestsLoggingLevel};
use fifths_playlist_server::server::{ServerConfig, ServerState};
use fifths_playlist_server::track_cache::{SqliteTrackStore, TrackFeatureCache};

const SCHEDULER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(35);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (tracks.db, accounts.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Base URL of the provider Web API.
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// OAuth token endpoint used for refreshes.
    #[clap(long)]
    pub token_url: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    pub client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Bearer secret for the cron and account routes.
    #[clap(long, env = "CRON_SECRET")]
    pub cron_secret: Option<String>,

    /// Timeout in seconds for provider requests.
    #[clap(long, default_value_t = 15)]
    pub provider_timeout_sec: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            api_base_url: args.api_base_url.clone(),
            token_url: args.token_url.clone(),
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
            cron_secret: args.cron_secret.clone(),
            provider_timeout_sec: args.provider_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  api_base_url: {}", app_config.api_base_url);

    let client_id = app_config
        .client_id
        .clone()
        .context("client_id must be specified via --client-id or in config file")?;
    let client_secret = app_config
        .client_secret
        .clone()
        .context("client_secret must be specified via --client-secret or in config file")?;
    if app_config.cron_secret.is_none() {
        info!("No cron secret configured, internal routes will reject every call");
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    let timeout = Duration::from_secs(app_config.provider_timeout_sec);
    let limiter = Arc::new(RateLimiter::new(app_config.rate_limit.limiter_config()));
    let retry = RetryPolicy::new(&app_config.retry);

    info!("Opening track cache at {:?}", app_config.tracks_db_path());
    let track_store = Arc::new(SqliteTrackStore::new(app_config.tracks_db_path())?);
    info!("Opening account store at {:?}", app_config.accounts_db_path());
    let account_store = Arc::new(SqliteAccountStore::new(app_config.accounts_db_path())?);

    let gateway = Arc::new(CatalogGateway::new(
        Arc::new(HttpCatalogClient::new(&app_config.api_base_url, timeout)?),
        limiter.clone(),
        retry.clone(),
    ));
    let track_cache = Arc::new(TrackFeatureCache::new(
        track_store,
        gateway.clone(),
        app_config.cache.clone(),
    ));
    let recommendations = Arc::new(RecommendationClient::new(
        track_cache.clone(),
        app_config.cache.genre_seeds.clone(),
    ));
    let publisher = Arc::new(PlaylistPublisher::new(
        gateway,
        app_config.playlist.default_name.clone(),
    ));
    let token_manager = Arc::new(TokenLifecycleManager::new(
        account_store,
        Arc::new(OAuthTokenClient::new(
            &app_config.token_url,
            &client_id,
            &client_secret,
            timeout,
        )?),
        limiter,
        retry,
        app_config.tokens.clone(),
        SPOTIFY_PROVIDER,
    ));

    // Set up background job scheduler
    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(shutdown_token.child_token(), token_manager.clone());
    let mut scheduler = JobScheduler::new(shutdown_token.clone(), job_context);
    scheduler.register_job(Arc::new(TokenRefreshJob::new(Duration::from_secs(
        app_config.tokens.refresh_interval_secs,
    ))));

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
            cron_secret: app_config.cron_secret.clone(),
            default_max_tracks: app_config.playlist.max_tracks,
            default_min_duration_ms: app_config.playlist.min_duration_ms,
            default_allow_explicit: app_config.playlist.allow_explicit,
        },
        start_time: Instant::now(),
        track_cache,
        recommendations,
        publisher,
        token_manager,
    };

    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let result = tokio::select! {
        result = run_server(state, app_config.metrics_port, shutdown_token.clone()) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    // A refresh in flight is awaited by the scheduler before it returns.
    shutdown_token.cancel();
    if tokio::time::timeout(SCHEDULER_SHUTDOWN_TIMEOUT, scheduler_handle)
        .await
        .is_err()
    {
        info!("Scheduler did not stop in time, exiting anyway");
    }
    result
}
