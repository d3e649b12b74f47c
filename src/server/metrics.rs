use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all server metrics
const PREFIX: &str = "fifths";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Provider Metrics
    pub static ref PROVIDER_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_provider_calls_total"), "Calls to the music provider"),
        &["endpoint", "outcome"]
    ).expect("Failed to create provider_calls_total metric");

    pub static ref PROVIDER_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_provider_call_duration_seconds"),
            "Provider call duration in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["endpoint"]
    ).expect("Failed to create provider_call_duration_seconds metric");

    // Rate Limiting Metrics
    pub static ref RATE_LIMITER_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_rate_limiter_wait_seconds"),
            "Time spent waiting for a rate limiter permit"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0])
    ).expect("Failed to create rate_limiter_wait_seconds metric");

    pub static ref RATE_LIMIT_HITS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_rate_limit_hits_total"),
        "Rate limited responses received from the provider"
    ).expect("Failed to create rate_limit_hits_total metric");

    // Track Cache Metrics
    pub static ref TRACK_CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_track_cache_lookups_total"), "Track cache lookups by result"),
        &["result"]
    ).expect("Failed to create track_cache_lookups_total metric");

    // Token Metrics
    pub static ref TOKEN_REFRESHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_token_refreshes_total"), "Access token refreshes"),
        &["trigger", "outcome"]
    ).expect("Failed to create token_refreshes_total metric");

    // Playlist Metrics
    pub static ref PLAYLISTS_GENERATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_playlists_generated_total"), "Generated playlists by termination reason"),
        &["termination"]
    ).expect("Failed to create playlists_generated_total metric");

    pub static ref PLAYLIST_LENGTH_TRACKS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_playlist_length_tracks"),
            "Number of tracks in generated playlists"
        )
        .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0])
    ).expect("Failed to create playlist_length_tracks metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 5.0, 30.0, 60.0, 300.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_CALL_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMITER_WAIT_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRACK_CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TOKEN_REFRESHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PLAYLISTS_GENERATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PLAYLIST_LENGTH_TRACKS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record one provider call. `outcome` is the HTTP status or `network_error`.
pub fn record_provider_call(endpoint: &str, outcome: &str, duration: Duration) {
    PROVIDER_CALLS_TOTAL
        .with_label_values(&[endpoint, outcome])
        .inc();

    PROVIDER_CALL_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(duration.as_secs_f64());
}

pub fn record_rate_limiter_wait(waited: Duration) {
    RATE_LIMITER_WAIT_SECONDS.observe(waited.as_secs_f64());
}

/// Record a 429 answered by the provider
pub fn record_rate_limit_hit() {
    RATE_LIMIT_HITS_TOTAL.inc();
}

pub fn record_cache_lookup(hits: usize, misses: usize) {
    TRACK_CACHE_LOOKUPS_TOTAL
        .with_label_values(&["hit"])
        .inc_by(hits as f64);
    TRACK_CACHE_LOOKUPS_TOTAL
        .with_label_values(&["miss"])
        .inc_by(misses as f64);
}

pub fn record_token_refresh(trigger: &str, outcome: &str) {
    TOKEN_REFRESHES_TOTAL
        .with_label_values(&[trigger, outcome])
        .inc();
}

pub fn record_playlist_generated(track_count: usize, termination: &str) {
    PLAYLISTS_GENERATED_TOTAL
        .with_label_values(&[termination])
        .inc();
    PLAYLIST_LENGTH_TRACKS.observe(track_count as f64);
}

/// Record a finished background job run
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();

    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
