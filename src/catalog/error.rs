use std::time::Duration;
use thiserror::Error;

/// Failure of a call against the music provider or its token endpoint.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    #[error("Access token expired or rejected")]
    AuthExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Whether a retry of the same call can be expected to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::TransientNetwork(_)
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short stable identifier for logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::TransientNetwork(_) => "transient_network",
            ApiError::AuthExpired => "auth_expired",
            ApiError::RefreshFailed(_) => "refresh_failed",
            ApiError::Validation(_) => "validation",
            ApiError::Status { .. } => "status",
            ApiError::Parse(_) => "parse",
            ApiError::Storage(_) => "storage",
        }
    }

    /// Maps a non-success HTTP status to the error taxonomy.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: String) -> Self {
        match status {
            401 => ApiError::AuthExpired,
            429 => ApiError::RateLimited { retry_after },
            500..=599 => ApiError::TransientNetwork(format!("status {}: {}", status, message)),
            _ => ApiError::Status { status, message },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::TransientNetwork(err.to_string())
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}
