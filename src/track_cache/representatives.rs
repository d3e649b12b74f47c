//! Example tracks illustrating a value range of one audio dimension.

use super::TrackFeatureCache;
use crate::catalog::{
    ApiError, AudioDimension, CachedTrack, FilterSpec, RecommendationQuery, TokenProvider,
    ValueBucket,
};
use rand::Rng;
use tracing::{debug, warn};

/// Popularity examples are fetched at these targets instead of by quartile.
pub const POPULARITY_EXAMPLE_TARGETS: [u32; 7] = [0, 20, 30, 40, 50, 70, 90];

const POPULARITY_GENRE_SEED: &str = "pop";

/// Cached popularity examples: each target covers the values up to the next one.
fn popularity_buckets() -> Vec<ValueBucket> {
    let range = AudioDimension::Popularity.range();
    POPULARITY_EXAMPLE_TARGETS
        .iter()
        .enumerate()
        .map(|(i, target)| {
            let max = POPULARITY_EXAMPLE_TARGETS
                .get(i + 1)
                .map_or(range.hi, |next| *next as f64);
            range.bucket(*target as f64, max)
        })
        .collect()
}

fn example_buckets(dimension: AudioDimension) -> Vec<ValueBucket> {
    if dimension == AudioDimension::Popularity {
        popularity_buckets()
    } else {
        dimension.range().quartile_buckets()
    }
}

impl TrackFeatureCache {
    /// Random pick among the most popular cached entries with
    /// `min <= dimension < max`. A `max` at the top of the dimension's range
    /// is included.
    pub fn find_cached_representative(
        &self,
        dimension: AudioDimension,
        min: f64,
        max: f64,
    ) -> anyhow::Result<Option<CachedTrack>> {
        self.cached_pick(dimension, dimension.range().bucket(min, max))
    }

    fn cached_pick(
        &self,
        dimension: AudioDimension,
        bucket: ValueBucket,
    ) -> anyhow::Result<Option<CachedTrack>> {
        let mut candidates =
            self.store
                .top_in_range(dimension, bucket, self.settings.representative_pool_size)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = self.rng.lock().unwrap().random_range(0..candidates.len());
        Ok(Some(candidates.swap_remove(index)))
    }

    /// Cache-only picks, one per quartile bucket of `dimension` or one per
    /// [`POPULARITY_EXAMPLE_TARGETS`] entry for popularity.
    pub fn find_cached_representatives(
        &self,
        dimension: AudioDimension,
    ) -> anyhow::Result<Vec<Option<CachedTrack>>> {
        example_buckets(dimension)
            .into_iter()
            .map(|bucket| self.cached_pick(dimension, bucket))
            .collect()
    }

    /// A cached pick if one exists, otherwise a single genre-seeded
    /// recommendation bounded to `[min, max]`, hydrated through the cache.
    pub async fn find_representative(
        &self,
        credentials: &dyn TokenProvider,
        dimension: AudioDimension,
        min: f64,
        max: f64,
    ) -> Result<Option<CachedTrack>, ApiError> {
        let bucket = dimension.range().bucket(min, max);
        let query = self.bounded_query(dimension, bucket)?;
        self.cached_or_recommended(credentials, dimension, bucket, query)
            .await
    }

    /// Same buckets as [`Self::find_cached_representatives`]; buckets the
    /// cache cannot fill are asked from the provider.
    pub async fn find_representatives(
        &self,
        credentials: &dyn TokenProvider,
        dimension: AudioDimension,
    ) -> Result<Vec<Option<CachedTrack>>, ApiError> {
        let mut picks = Vec::new();
        if dimension == AudioDimension::Popularity {
            for (target, bucket) in POPULARITY_EXAMPLE_TARGETS.iter().zip(popularity_buckets()) {
                let query = RecommendationQuery {
                    seed_tracks: Vec::new(),
                    seed_genres: vec![POPULARITY_GENRE_SEED.to_string()],
                    filter: FilterSpec::new().with_target(dimension, *target as f64),
                    limit: 1,
                };
                picks.push(
                    self.cached_or_recommended(credentials, dimension, bucket, query)
                        .await?,
                );
            }
            return Ok(picks);
        }

        for bucket in dimension.range().quartile_buckets() {
            let query = self.bounded_query(dimension, bucket)?;
            picks.push(
                self.cached_or_recommended(credentials, dimension, bucket, query)
                    .await?,
            );
        }
        Ok(picks)
    }

    /// Provider bounds are inclusive, so an open integer bound steps down by one.
    fn bounded_query(
        &self,
        dimension: AudioDimension,
        bucket: ValueBucket,
    ) -> Result<RecommendationQuery, ApiError> {
        let max = if dimension.range().integer && !bucket.inclusive_max {
            bucket.max - 1.0
        } else {
            bucket.max
        };
        let filter = FilterSpec::new().with_range(dimension, Some(bucket.min), Some(max));
        filter.validate()?;
        Ok(RecommendationQuery {
            seed_tracks: Vec::new(),
            seed_genres: self.settings.genre_seeds.clone(),
            filter,
            limit: 1,
        })
    }

    async fn cached_or_recommended(
        &self,
        credentials: &dyn TokenProvider,
        dimension: AudioDimension,
        bucket: ValueBucket,
        query: RecommendationQuery,
    ) -> Result<Option<CachedTrack>, ApiError> {
        self.await_pending_writes().await;
        match self.cached_pick(dimension, bucket) {
            Ok(Some(entry)) => return Ok(Some(entry)),
            Ok(None) => debug!(
                "No cached {} in [{}, {}], asking provider",
                dimension, bucket.min, bucket.max
            ),
            Err(err) => warn!("Representative lookup in cache failed: {:#}", err),
        }
        self.first_recommendation(credentials, &query).await
    }

    async fn first_recommendation(
        &self,
        credentials: &dyn TokenProvider,
        query: &RecommendationQuery,
    ) -> Result<Option<CachedTrack>, ApiError> {
        let tracks = self.gateway.recommendations(credentials, query).await?;
        Ok(self.hydrate(credentials, tracks).await?.into_iter().next())
    }
}
