use super::error::ApiError;
use super::models::{AudioFeatures, PlaylistRef, RecommendationQuery, Track};
use super::{CatalogApi, TokenProvider, MAX_ITEMS_PER_APPEND, PLAYLIST_PAGE_SIZE};
use crate::rate_limit::{RateLimiter, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Every provider call passes through here: a permit is acquired from the
/// shared [`RateLimiter`] before each attempt, the caller's credential is
/// attached, and retryable failures are retried under the [`RetryPolicy`].
///
/// A rejected credential (`AuthExpired`) triggers exactly one forced refresh
/// followed by one more attempt; callers never see `AuthExpired` unless the
/// refreshed token is rejected too.
pub struct CatalogGateway {
    api: Arc<dyn CatalogApi>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl CatalogGateway {
    pub fn new(api: Arc<dyn CatalogApi>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            api,
            limiter,
            retry,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn call<T, F, Fut>(
        &self,
        endpoint: &'static str,
        credentials: &dyn TokenProvider,
        op: F,
    ) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut token = credentials.access_token().await?;
        let mut retry_count = 0;
        let mut refreshed = false;

        loop {
            self.limiter.acquire().await;
            let error = match op(token.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let retryable = self.retry.should_retry(&error, retry_count);
            match error {
                ApiError::AuthExpired if !refreshed => {
                    debug!("{}: access token rejected, refreshing", endpoint);
                    refreshed = true;
                    token = credentials.force_refresh(&token).await?;
                }
                // A known Retry-After holds back every caller, even when this one gives up.
                ApiError::RateLimited { retry_after } if retryable || retry_after.is_some() => {
                    let delay = retry_after.unwrap_or_else(|| self.retry.backoff(retry_count));
                    self.limiter.penalize(delay).await;
                    if !retryable {
                        return Err(ApiError::RateLimited { retry_after });
                    }
                    retry_count += 1;
                }
                _ if retryable => {
                    let delay = self.retry.backoff(retry_count);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        endpoint, error, retry_count + 1, self.retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                _ => return Err(error),
            }
        }
    }

    pub async fn recommendations(
        &self,
        credentials: &dyn TokenProvider,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, ApiError> {
        let api = &self.api;
        self.call("recommendations", credentials, move |token| async move {
            api.recommendations(&token, query).await
        })
        .await
    }

    pub async fn audio_features(
        &self,
        credentials: &dyn TokenProvider,
        ids: &[String],
    ) -> Result<Vec<(String, AudioFeatures)>, ApiError> {
        let api = &self.api;
        self.call("audio_features", credentials, move |token| async move {
            api.audio_features(&token, ids).await
        })
        .await
    }

    pub async fn tracks(
        &self,
        credentials: &dyn TokenProvider,
        ids: &[String],
    ) -> Result<Vec<Track>, ApiError> {
        let api = &self.api;
        self.call("tracks", credentials, move |token| async move {
            api.tracks(&token, ids).await
        })
        .await
    }

    /// All tracks of a playlist, following pagination.
    pub async fn playlist_tracks(
        &self,
        credentials: &dyn TokenProvider,
        playlist_id: &str,
    ) -> Result<Vec<Track>, ApiError> {
        let api = &self.api;
        let mut tracks = Vec::new();
        let mut offset = Some(0);
        while let Some(current) = offset {
            let page = self
                .call("playlist_tracks", credentials, move |token| async move {
                    api.playlist_tracks_page(&token, playlist_id, current, PLAYLIST_PAGE_SIZE)
                        .await
                })
                .await?;
            tracks.extend(page.items);
            offset = page.next_offset;
        }
        Ok(tracks)
    }

    pub async fn search_tracks(
        &self,
        credentials: &dyn TokenProvider,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Track>, ApiError> {
        let api = &self.api;
        self.call("search", credentials, move |token| async move {
            api.search_tracks(&token, query, limit).await
        })
        .await
    }

    pub async fn create_playlist(
        &self,
        credentials: &dyn TokenProvider,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistRef, ApiError> {
        let api = &self.api;
        self.call("create_playlist", credentials, move |token| async move {
            api.create_playlist(&token, user_id, name).await
        })
        .await
    }

    /// Appends `uris` in order, split into provider-sized chunks at increasing
    /// positions starting from `position`.
    pub async fn append_playlist_items(
        &self,
        credentials: &dyn TokenProvider,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<(), ApiError> {
        let api = &self.api;
        for (index, chunk) in uris.chunks(MAX_ITEMS_PER_APPEND).enumerate() {
            let at = position + index * MAX_ITEMS_PER_APPEND;
            self.call("append_playlist_items", credentials, move |token| async move {
                api.append_playlist_items(&token, playlist_id, chunk, at).await
            })
            .await?;
        }
        Ok(())
    }
}
