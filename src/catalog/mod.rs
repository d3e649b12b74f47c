//! Access to the music provider: wire models, the HTTP client and the
//! rate-limited gateway every other component goes through.

mod client;
mod error;
pub mod filters;
mod gateway;
mod models;
pub mod wire;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{HttpCatalogClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use filters::{AudioDimension, DimensionFilter, DimensionRange, FilterSpec, ValueBucket};
pub use gateway::CatalogGateway;
pub use models::{AudioFeatures, CachedTrack, Page, PlaylistRef, RecommendationQuery, Track};

#[cfg(test)]
pub(crate) use models::fixtures;

use async_trait::async_trait;

/// Provider track lookups accept at most this many ids per call.
pub const MAX_TRACKS_PER_LOOKUP: usize = 50;
/// Audio-feature lookups accept at most this many ids per call.
pub const MAX_FEATURES_PER_LOOKUP: usize = 100;
/// Playlist appends accept at most this many URIs per call.
pub const MAX_ITEMS_PER_APPEND: usize = 100;
/// Page size used when listing playlist items.
pub const PLAYLIST_PAGE_SIZE: u32 = 50;

/// Raw provider operations. Implementations do not rate limit or retry;
/// [`CatalogGateway`] does.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn recommendations(
        &self,
        token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, ApiError>;

    /// Features for up to [`MAX_FEATURES_PER_LOOKUP`] ids. Ids the provider has
    /// no analysis for are absent from the result.
    async fn audio_features(
        &self,
        token: &str,
        ids: &[String],
    ) -> Result<Vec<(String, AudioFeatures)>, ApiError>;

    async fn tracks(&self, token: &str, ids: &[String]) -> Result<Vec<Track>, ApiError>;

    async fn playlist_tracks_page(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Track>, ApiError>;

    async fn search_tracks(&self, token: &str, query: &str, limit: u32) -> Result<Vec<Track>, ApiError>;

    async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistRef, ApiError>;

    async fn append_playlist_items(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<(), ApiError>;
}

/// Source of the bearer credential for provider calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid access token, refreshed first if it is about to expire.
    async fn access_token(&self) -> Result<String, ApiError>;

    /// Called once when the provider rejected `rejected`, a token returned by
    /// [`TokenProvider::access_token`].
    async fn force_refresh(&self, rejected: &str) -> Result<String, ApiError>;
}

/// A fixed credential, for app-level calls and tests.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }

    async fn force_refresh(&self, _rejected: &str) -> Result<String, ApiError> {
        Err(ApiError::RefreshFailed(
            "static credential cannot be refreshed".to_string(),
        ))
    }
}
