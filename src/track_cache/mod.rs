//! Cache-aside store of track metadata and audio features.
//!
//! Lookups consult the local store first and fall back to the provider for
//! everything missing; whatever the provider returns is written back so the
//! next lookup for the same track is free.

mod cache;
mod representatives;
mod schema;
mod store;

pub use cache::TrackFeatureCache;
pub use representatives::POPULARITY_EXAMPLE_TARGETS;
pub use schema::TRACK_CACHE_VERSIONED_SCHEMAS;
pub use store::SqliteTrackStore;

use crate::catalog::{AudioDimension, CachedTrack, ValueBucket};
use anyhow::Result;

pub trait TrackStore: Send + Sync {
    /// Entries stored for `ids`, in no particular order. Unknown ids are skipped.
    fn get_many(&self, ids: &[String]) -> Result<Vec<CachedTrack>>;

    /// Idempotent upsert. A stored feature vector is never replaced. Returns
    /// the number of rows inserted or upgraded.
    fn put_many(&self, entries: &[CachedTrack]) -> Result<usize>;

    /// The `limit` most popular hydrated entries whose dimension lies in `bucket`.
    fn top_in_range(
        &self,
        dimension: AudioDimension,
        bucket: ValueBucket,
        limit: usize,
    ) -> Result<Vec<CachedTrack>>;

    fn count(&self) -> Result<usize>;
}
