//! Recommendation calls whose results come back hydrated with audio features.

use crate::catalog::{ApiError, CachedTrack, FilterSpec, RecommendationQuery, TokenProvider};
use crate::track_cache::TrackFeatureCache;
use std::sync::Arc;
use tracing::debug;

pub const MAX_SEED_TRACKS: usize = 5;
pub const MAX_RECOMMENDATION_LIMIT: u32 = 100;

pub struct RecommendationClient {
    cache: Arc<TrackFeatureCache>,
    genre_seeds: Vec<String>,
}

impl RecommendationClient {
    pub fn new(cache: Arc<TrackFeatureCache>, genre_seeds: Vec<String>) -> Self {
        Self { cache, genre_seeds }
    }

    pub fn cache(&self) -> &Arc<TrackFeatureCache> {
        &self.cache
    }

    /// One recommendation call seeded by `seed_ids`, hydrated through the cache.
    ///
    /// Tracks whose features could not be fetched come back with
    /// `features: None`; that is never an error.
    pub async fn get_recommendations(
        &self,
        credentials: &dyn TokenProvider,
        seed_ids: &[String],
        filter: &FilterSpec,
        limit: u32,
    ) -> Result<Vec<CachedTrack>, ApiError> {
        if seed_ids.is_empty() || seed_ids.len() > MAX_SEED_TRACKS {
            return Err(ApiError::Validation(format!(
                "between 1 and {} seed tracks are required, got {}",
                MAX_SEED_TRACKS,
                seed_ids.len()
            )));
        }
        let query = RecommendationQuery {
            seed_tracks: seed_ids.to_vec(),
            seed_genres: Vec::new(),
            filter: filter.clone(),
            limit,
        };
        self.fetch(credentials, query).await
    }

    /// Genre-seeded recommendations matching `filter`, used to preview what a
    /// filter selects before any seed track is chosen.
    pub async fn get_filtered(
        &self,
        credentials: &dyn TokenProvider,
        filter: &FilterSpec,
        limit: u32,
    ) -> Result<Vec<CachedTrack>, ApiError> {
        let query = RecommendationQuery {
            seed_tracks: Vec::new(),
            seed_genres: self.genre_seeds.clone(),
            filter: filter.clone(),
            limit,
        };
        self.fetch(credentials, query).await
    }

    async fn fetch(
        &self,
        credentials: &dyn TokenProvider,
        query: RecommendationQuery,
    ) -> Result<Vec<CachedTrack>, ApiError> {
        if query.limit == 0 || query.limit > MAX_RECOMMENDATION_LIMIT {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_RECOMMENDATION_LIMIT, query.limit
            )));
        }
        query.filter.validate()?;

        let tracks = self
            .cache
            .gateway()
            .recommendations(credentials, &query)
            .await?;
        debug!("Provider recommended {} tracks", tracks.len());
        self.cache.hydrate(credentials, tracks).await
    }
}
