//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per server endpoint. When API routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

/// Unix seconds, `offset_secs` from now.
pub fn epoch_in(offset_secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + offset_secs
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client whose [`TEST_USER`] holds tokens valid for `expires_in_secs`
    ///
    /// # Panics
    ///
    /// Panics if storing the grant fails (indicates test infrastructure problem).
    pub async fn signed_in(base_url: String, expires_in_secs: i64) -> Self {
        let client = Self::new(base_url);
        let response = client.put_account(TEST_USER, expires_in_secs).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::NO_CONTENT,
            "Storing the test grant failed: {:?}",
            response.text().await
        );
        client
    }

    // ========================================================================
    // Accounts (internal)
    // ========================================================================

    /// PUT /v1/accounts/{user_id}
    pub async fn put_account(&self, user_id: &str, expires_in_secs: i64) -> Response {
        self.client
            .put(format!("{}/v1/accounts/{}", self.base_url, user_id))
            .bearer_auth(CRON_SECRET)
            .json(&json!({
                "provider_account_id": PROVIDER_ACCOUNT_ID,
                "access_token": INITIAL_ACCESS_TOKEN,
                "refresh_token": INITIAL_REFRESH_TOKEN,
                "expires_at": epoch_in(expires_in_secs),
                "token_type": "Bearer",
                "scope": "playlist-modify-private",
            }))
            .send()
            .await
            .expect("Put account request failed")
    }

    /// GET /v1/accounts/{user_id}
    pub async fn get_account_state(&self, user_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/accounts/{}", self.base_url, user_id))
            .bearer_auth(CRON_SECRET)
            .send()
            .await
            .expect("Get account request failed")
    }

    /// DELETE /v1/accounts/{user_id}
    pub async fn delete_account(&self, user_id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/accounts/{}", self.base_url, user_id))
            .bearer_auth(CRON_SECRET)
            .send()
            .await
            .expect("Delete account request failed")
    }

    // ========================================================================
    // Cron (internal)
    // ========================================================================

    /// GET /v1/cron/refresh-tokens with the configured secret
    pub async fn refresh_tokens(&self) -> Response {
        self.refresh_tokens_with_secret(Some(CRON_SECRET)).await
    }

    pub async fn refresh_tokens_with_secret(&self, secret: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/v1/cron/refresh-tokens", self.base_url));
        if let Some(secret) = secret {
            request = request.bearer_auth(secret);
        }
        request.send().await.expect("Refresh tokens request failed")
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// GET /v1/tracks?ids=...
    pub async fn get_tracks(&self, ids: &[&str]) -> Response {
        self.client
            .get(format!("{}/v1/tracks", self.base_url))
            .query(&[("ids", ids.join(","))])
            .send()
            .await
            .expect("Get tracks request failed")
    }

    /// POST /v1/tracks, optionally with a bearer secret
    pub async fn put_tracks_with_secret(&self, entries: Value, secret: Option<&str>) -> Response {
        let mut request = self
            .client
            .post(format!("{}/v1/tracks", self.base_url))
            .json(&entries);
        if let Some(secret) = secret {
            request = request.bearer_auth(secret);
        }
        request.send().await.expect("Put tracks request failed")
    }

    /// GET /v1/tracks/representing/{feature}, with provider fallback for `user_id`
    pub async fn get_representatives(&self, feature: &str, user_id: Option<&str>) -> Response {
        let mut request = self
            .client
            .get(format!("{}/v1/tracks/representing/{}", self.base_url, feature));
        if let Some(user_id) = user_id {
            request = request.query(&[("user_id", user_id)]);
        }
        request.send().await.expect("Get representatives request failed")
    }

    // ========================================================================
    // Recommendations and playlists
    // ========================================================================

    /// POST /v1/recommendations
    pub async fn post_recommendations(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/v1/recommendations", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Recommendations request failed")
    }

    /// POST /v1/playlist/generate
    pub async fn generate_playlist(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/v1/playlist/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Generate playlist request failed")
    }
}
