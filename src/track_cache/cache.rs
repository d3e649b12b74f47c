use super::TrackStore;
use crate::catalog::{
    ApiError, AudioFeatures, CachedTrack, CatalogGateway, TokenProvider, Track,
    MAX_FEATURES_PER_LOOKUP, MAX_TRACKS_PER_LOOKUP,
};
use crate::config::CacheSettings;
use crate::server::metrics;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct TrackFeatureCache {
    pub(super) store: Arc<dyn TrackStore>,
    pub(super) gateway: Arc<CatalogGateway>,
    pub(super) settings: CacheSettings,
    pub(super) rng: Mutex<StdRng>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl TrackFeatureCache {
    pub fn new(
        store: Arc<dyn TrackStore>,
        gateway: Arc<CatalogGateway>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
            rng: Mutex::new(StdRng::from_os_rng()),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the generator used for representative picks.
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            ..self
        }
    }

    pub fn gateway(&self) -> &Arc<CatalogGateway> {
        &self.gateway
    }

    /// Entries for `ids` in request order, fetching whatever the store lacks.
    ///
    /// Ids the provider does not know are omitted. A failed metadata chunk is
    /// logged and its ids omitted; a failed feature chunk yields entries
    /// without features. Only `RefreshFailed` is returned as an error.
    pub async fn get_many(
        &self,
        credentials: &dyn TokenProvider,
        ids: &[String],
    ) -> Result<Vec<CachedTrack>, ApiError> {
        self.await_pending_writes().await;
        let ids = unique(ids.iter().cloned());
        let mut cached = self.load(&ids);

        let mut hits = 0;
        let mut without_features = Vec::new();
        let mut unknown = Vec::new();
        for id in &ids {
            match cached.get(id) {
                Some(entry) if entry.features.is_some() => hits += 1,
                Some(entry) => without_features.push(entry.track.clone()),
                None => unknown.push(id.clone()),
            }
        }
        metrics::record_cache_lookup(hits, ids.len() - hits);
        debug!(
            "Track cache: {} hits, {} without features, {} unknown",
            hits,
            without_features.len(),
            unknown.len()
        );

        let mut to_hydrate = without_features;
        for chunk in unknown.chunks(MAX_TRACKS_PER_LOOKUP) {
            match self.gateway.tracks(credentials, chunk).await {
                Ok(tracks) => to_hydrate.extend(tracks),
                Err(ApiError::RefreshFailed(reason)) => return Err(ApiError::RefreshFailed(reason)),
                Err(err) => warn!("Track lookup failed for {} ids: {}", chunk.len(), err),
            }
        }

        for entry in self.fetch_features(credentials, to_hydrate).await? {
            cached.insert(entry.track.id.clone(), entry);
        }
        Ok(ids.iter().filter_map(|id| cached.remove(id)).collect())
    }

    /// Attaches features to tracks the caller already holds, in input order.
    ///
    /// Tracks whose features are cached are served from the store; the rest
    /// are fetched in chunks, with the same per-chunk degradation as
    /// [`TrackFeatureCache::get_many`].
    pub async fn hydrate(
        &self,
        credentials: &dyn TokenProvider,
        tracks: Vec<Track>,
    ) -> Result<Vec<CachedTrack>, ApiError> {
        self.await_pending_writes().await;
        let mut seen = HashSet::new();
        let tracks: Vec<Track> = tracks
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let mut cached = self.load(&ids);
        cached.retain(|_, entry| entry.features.is_some());
        metrics::record_cache_lookup(cached.len(), ids.len() - cached.len());

        let misses: Vec<Track> = tracks
            .iter()
            .filter(|t| !cached.contains_key(&t.id))
            .cloned()
            .collect();
        for entry in self.fetch_features(credentials, misses).await? {
            cached.insert(entry.track.id.clone(), entry);
        }
        Ok(ids.iter().filter_map(|id| cached.remove(id)).collect())
    }

    /// Stores entries directly, waiting for the write to complete. Keys are
    /// normalised the way provider responses are.
    pub async fn put_many(&self, entries: Vec<CachedTrack>) -> anyhow::Result<usize> {
        self.await_pending_writes().await;
        let entries: Vec<CachedTrack> = entries.into_iter().map(CachedTrack::normalized).collect();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.put_many(&entries)).await?
    }

    /// Cache-only lookup, no provider calls.
    pub async fn get_cached(&self, ids: &[String]) -> anyhow::Result<Vec<CachedTrack>> {
        self.await_pending_writes().await;
        let ids = unique(ids.iter().cloned());
        let mut found: HashMap<String, CachedTrack> = self
            .store
            .get_many(&ids)?
            .into_iter()
            .map(|e| (e.track.id.clone(), e))
            .collect();
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Waits for every write-back scheduled so far.
    pub async fn await_pending_writes(&self) {
        let pending = std::mem::take(&mut *self.pending_writes.lock().unwrap());
        for handle in pending {
            if let Err(err) = handle.await {
                warn!("Track cache write-back task failed: {}", err);
            }
        }
    }

    fn load(&self, ids: &[String]) -> HashMap<String, CachedTrack> {
        match self.store.get_many(ids) {
            Ok(entries) => entries
                .into_iter()
                .map(|e| (e.track.id.clone(), e))
                .collect(),
            Err(err) => {
                warn!("Track cache read failed, treating as misses: {:#}", err);
                HashMap::new()
            }
        }
    }

    async fn fetch_features(
        &self,
        credentials: &dyn TokenProvider,
        tracks: Vec<Track>,
    ) -> Result<Vec<CachedTrack>, ApiError> {
        let mut entries = Vec::with_capacity(tracks.len());
        let mut hydrated = Vec::new();
        for chunk in tracks.chunks(MAX_FEATURES_PER_LOOKUP) {
            let ids: Vec<String> = chunk.iter().map(|t| t.id.clone()).collect();
            match self.gateway.audio_features(credentials, &ids).await {
                Ok(features) => {
                    let mut by_id: HashMap<String, AudioFeatures> = features.into_iter().collect();
                    for track in chunk {
                        let entry = CachedTrack::new(track.clone(), by_id.remove(&track.id));
                        if entry.features.is_some() {
                            hydrated.push(entry.clone());
                        }
                        entries.push(entry);
                    }
                }
                Err(ApiError::RefreshFailed(reason)) => return Err(ApiError::RefreshFailed(reason)),
                Err(err) => {
                    warn!(
                        "Audio features lookup failed for {} tracks, continuing without: {}",
                        chunk.len(),
                        err
                    );
                    entries.extend(chunk.iter().map(|t| CachedTrack::new(t.clone(), None)));
                }
            }
        }
        self.schedule_write_back(hydrated);
        Ok(entries)
    }

    fn schedule_write_back(&self, entries: Vec<CachedTrack>) {
        if entries.is_empty() {
            return;
        }
        let store = self.store.clone();
        let handle = tokio::task::spawn_blocking(move || {
            if let Err(err) = store.put_many(&entries) {
                warn!(
                    "Failed to write back {} track cache entries: {:#}",
                    entries.len(),
                    err
                );
            }
        });
        self.pending_writes.lock().unwrap().push(handle);
    }
}

fn unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}
