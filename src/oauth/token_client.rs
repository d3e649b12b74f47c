//! Refresh-token exchange against the provider's OAuth token endpoint.

use super::models::RefreshedToken;
use crate::catalog::ApiError;
use crate::server::metrics;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError>;
}

pub struct OAuthTokenClient {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    token_type: Option<String>,
    scope: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

impl OAuthTokenClient {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthTokenClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::record_provider_call("token", "network_error", start.elapsed());
                return Err(e.into());
            }
        };

        let status = response.status();
        metrics::record_provider_call("token", status.as_str(), start.elapsed());
        if status.is_success() {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| ApiError::Parse(format!("token: {}", e)))?;
            return Ok(RefreshedToken {
                access_token: body.access_token,
                expires_in: body.expires_in,
                token_type: body.token_type,
                scope: body.scope,
                refresh_token: body.refresh_token,
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        debug!("Token refresh failed with status {}: {}", status, body);

        // 401 from the token endpoint means the client or grant is bad, not the access token.
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ApiError::from_status(status.as_u16(), retry_after, body));
        }
        let message = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(TokenErrorBody {
                error,
                error_description: Some(description),
            }) => format!("{}: {}", error, description),
            Ok(TokenErrorBody { error, .. }) => error,
            Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
        };
        Err(ApiError::RefreshFailed(message))
    }
}
