use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Bearer secret of the cron and account routes. Those routes answer 401
    /// to everyone when unset.
    pub cron_secret: Option<String>,
    pub default_max_tracks: usize,
    pub default_min_duration_ms: Option<u64>,
    pub default_allow_explicit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            cron_secret: None,
            default_max_tracks: 100,
            default_min_duration_ms: None,
            default_allow_explicit: true,
        }
    }
}
