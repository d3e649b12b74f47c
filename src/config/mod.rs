mod file_config;

pub use file_config::{
    CacheConfig, FileConfig, PlaylistConfig, RateLimitConfig, RetryConfig, TokensConfig,
};

use crate::catalog::DEFAULT_API_BASE_URL;
use crate::oauth::DEFAULT_TOKEN_URL;
use crate::rate_limit::RateLimiterConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PLAYLIST_NAME: &str = "Circle of Fifths";
pub const DEFAULT_GENRE_SEEDS: [&str; 5] = ["pop", "rock", "country", "acoustic", "r-n-b"];

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub api_base_url: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub cron_secret: Option<String>,
    pub provider_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Provider
    pub api_base_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub cron_secret: Option<String>,
    pub provider_timeout_sec: u64,

    // Feature configs (with defaults)
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub tokens: TokenSettings,
    pub playlist: PlaylistSettings,
    pub cache: CacheSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let token_url = file
            .token_url
            .or_else(|| cli.token_url.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let client_id = file.client_id.or_else(|| cli.client_id.clone());
        let client_secret = file.client_secret.or_else(|| cli.client_secret.clone());
        let cron_secret = file.cron_secret.or_else(|| cli.cron_secret.clone());
        let provider_timeout_sec = file
            .provider_timeout_sec
            .unwrap_or(cli.provider_timeout_sec);

        let rl_file = file.rate_limit.unwrap_or_default();
        let rl_default = RateLimitSettings::default();
        let rate_limit = RateLimitSettings {
            permits: rl_file.permits.unwrap_or(rl_default.permits),
            window_secs: rl_file.window_secs.unwrap_or(rl_default.window_secs),
        };
        if rate_limit.permits == 0 || rate_limit.window_secs == 0 {
            bail!("rate_limit.permits and rate_limit.window_secs must be positive");
        }

        let retry_file = file.retry.unwrap_or_default();
        let retry_default = RetrySettings::default();
        let retry = RetrySettings {
            max_retries: retry_file.max_retries.unwrap_or(retry_default.max_retries),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(retry_default.initial_backoff_ms),
            max_backoff_ms: retry_file
                .max_backoff_ms
                .unwrap_or(retry_default.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(retry_default.backoff_multiplier),
        };
        if retry.backoff_multiplier < 1.0 {
            bail!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            );
        }

        let tokens_file = file.tokens.unwrap_or_default();
        let tokens_default = TokenSettings::default();
        let tokens = TokenSettings {
            foreground_refresh_threshold_secs: tokens_file
                .foreground_refresh_threshold_secs
                .unwrap_or(tokens_default.foreground_refresh_threshold_secs),
            background_refresh_threshold_secs: tokens_file
                .background_refresh_threshold_secs
                .unwrap_or(tokens_default.background_refresh_threshold_secs),
            refresh_interval_secs: tokens_file
                .refresh_interval_secs
                .unwrap_or(tokens_default.refresh_interval_secs),
        };

        let playlist_file = file.playlist.unwrap_or_default();
        let playlist_default = PlaylistSettings::default();
        let playlist = PlaylistSettings {
            max_tracks: playlist_file
                .max_tracks
                .unwrap_or(playlist_default.max_tracks),
            min_duration_ms: playlist_file
                .min_duration_ms
                .or(playlist_default.min_duration_ms),
            allow_explicit: playlist_file
                .allow_explicit
                .unwrap_or(playlist_default.allow_explicit),
            default_name: playlist_file
                .default_name
                .unwrap_or(playlist_default.default_name),
        };
        if playlist.max_tracks == 0 {
            bail!("playlist.max_tracks must be positive");
        }

        let cache_file = file.cache.unwrap_or_default();
        let cache_default = CacheSettings::default();
        let cache = CacheSettings {
            representative_pool_size: cache_file
                .representative_pool_size
                .unwrap_or(cache_default.representative_pool_size)
                .max(1),
            genre_seeds: cache_file.genre_seeds.unwrap_or(cache_default.genre_seeds),
        };
        if cache.genre_seeds.is_empty() || cache.genre_seeds.len() > 5 {
            bail!(
                "cache.genre_seeds must hold 1 to 5 genres, got {}",
                cache.genre_seeds.len()
            );
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            api_base_url,
            token_url,
            client_id,
            client_secret,
            cron_secret,
            provider_timeout_sec,
            rate_limit,
            retry,
            tokens,
            playlist,
            cache,
        })
    }

    pub fn tracks_db_path(&self) -> PathBuf {
        self.db_dir.join("tracks.db")
    }

    pub fn accounts_db_path(&self) -> PathBuf {
        self.db_dir.join("accounts.db")
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub permits: u32,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            permits: self.permits,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            permits: 20,
            window_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub foreground_refresh_threshold_secs: u64,
    pub background_refresh_threshold_secs: u64,
    pub refresh_interval_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            foreground_refresh_threshold_secs: 300,
            background_refresh_threshold_secs: 1_800,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistSettings {
    pub max_tracks: usize,
    pub min_duration_ms: Option<u64>,
    pub allow_explicit: bool,
    pub default_name: String,
}

impl Default for PlaylistSettings {
    fn default() -> Self {
        Self {
            max_tracks: 100,
            min_duration_ms: None,
            allow_explicit: true,
            default_name: DEFAULT_PLAYLIST_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub representative_pool_size: usize,
    pub genre_seeds: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            representative_pool_size: 10,
            genre_seeds: DEFAULT_GENRE_SEEDS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
