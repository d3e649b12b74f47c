//! In-memory provider used by unit tests.

use super::error::ApiError;
use super::filters::{AudioDimension, DimensionFilter};
use super::models::{AudioFeatures, CachedTrack, Page, PlaylistRef, RecommendationQuery, Track};
use super::CatalogApi;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    catalog: Vec<CachedTrack>,
    playlists: HashMap<String, Vec<Track>>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    calls: HashMap<&'static str, usize>,
    tokens: HashMap<&'static str, Vec<String>>,
    feature_batches: Vec<usize>,
    queries: Vec<RecommendationQuery>,
    scripted_recommendations: VecDeque<Vec<Track>>,
    appends: Vec<(String, usize, usize)>,
    created: Vec<(String, String)>,
}

/// Recommendations return every catalog track passing the query's range
/// bounds, in insertion order, unless a scripted response is queued.
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: Track, features: Option<AudioFeatures>) {
        self.state
            .lock()
            .unwrap()
            .catalog
            .push(CachedTrack::new(track, features));
    }

    pub fn add_cached(&self, entry: CachedTrack) {
        self.state.lock().unwrap().catalog.push(entry);
    }

    pub fn add_playlist(&self, id: &str, tracks: Vec<Track>) {
        self.state
            .lock()
            .unwrap()
            .playlists
            .insert(id.to_string(), tracks);
    }

    pub fn fail_next(&self, endpoint: &'static str, error: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    pub fn script_recommendations(&self, tracks: Vec<Track>) {
        self.state
            .lock()
            .unwrap()
            .scripted_recommendations
            .push_back(tracks);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn tokens_seen(&self, endpoint: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    pub fn feature_batches(&self) -> Vec<usize> {
        self.state.lock().unwrap().feature_batches.clone()
    }

    pub fn queries(&self) -> Vec<RecommendationQuery> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn appends(&self) -> Vec<(String, usize, usize)> {
        self.state.lock().unwrap().appends.clone()
    }

    pub fn created_playlists(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created.clone()
    }

    fn enter(&self, endpoint: &'static str, token: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint).or_default() += 1;
        state
            .tokens
            .entry(endpoint)
            .or_default()
            .push(token.to_string());
        match state.failures.get_mut(endpoint).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn dimension_value(entry: &CachedTrack, dimension: AudioDimension) -> Option<f64> {
    let f = entry.features.as_ref();
    match dimension {
        AudioDimension::Popularity => Some(entry.track.popularity as f64),
        AudioDimension::DurationMs => Some(entry.track.duration_ms as f64),
        AudioDimension::Acousticness => f.map(|f| f.acousticness),
        AudioDimension::Danceability => f.map(|f| f.danceability),
        AudioDimension::Energy => f.map(|f| f.energy),
        AudioDimension::Instrumentalness => f.map(|f| f.instrumentalness),
        AudioDimension::Key => f.map(|f| f.key as f64),
        AudioDimension::Liveness => f.map(|f| f.liveness),
        AudioDimension::Loudness => f.map(|f| f.loudness),
        AudioDimension::Mode => f.map(|f| f.mode.as_raw() as f64),
        AudioDimension::Speechiness => f.map(|f| f.speechiness),
        AudioDimension::Tempo => f.map(|f| f.tempo),
        AudioDimension::TimeSignature => f.map(|f| f.time_signature as f64),
        AudioDimension::Valence => f.map(|f| f.valence),
    }
}

fn passes_bounds(entry: &CachedTrack, query: &RecommendationQuery) -> bool {
    query.filter.iter().all(|(dimension, filter)| match *filter {
        DimensionFilter::Target(_) => true,
        DimensionFilter::Range { min, max } => match dimension_value(entry, dimension) {
            Some(value) => min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m),
            None => false,
        },
    })
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn recommendations(
        &self,
        token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, ApiError> {
        self.enter("recommendations", token)?;
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        if let Some(scripted) = state.scripted_recommendations.pop_front() {
            return Ok(scripted);
        }
        Ok(state
            .catalog
            .iter()
            .filter(|entry| !query.seed_tracks.contains(&entry.track.id))
            .filter(|entry| passes_bounds(entry, query))
            .take(query.limit as usize)
            .map(|entry| entry.track.clone())
            .collect())
    }

    async fn audio_features(
        &self,
        token: &str,
        ids: &[String],
    ) -> Result<Vec<(String, AudioFeatures)>, ApiError> {
        self.enter("audio_features", token)?;
        let mut state = self.state.lock().unwrap();
        state.feature_batches.push(ids.len());
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .catalog
                    .iter()
                    .find(|entry| &entry.track.id == id)
                    .and_then(|entry| entry.features.clone())
                    .map(|features| (id.clone(), features))
            })
            .collect())
    }

    async fn tracks(&self, token: &str, ids: &[String]) -> Result<Vec<Track>, ApiError> {
        self.enter("tracks", token)?;
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .catalog
                    .iter()
                    .find(|entry| &entry.track.id == id)
                    .map(|entry| entry.track.clone())
            })
            .collect())
    }

    async fn playlist_tracks_page(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Track>, ApiError> {
        self.enter("playlist_tracks", token)?;
        let state = self.state.lock().unwrap();
        let tracks = state.playlists.get(playlist_id).ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("playlist {} not found", playlist_id),
        })?;
        let start = (offset as usize).min(tracks.len());
        let end = (start + limit as usize).min(tracks.len());
        Ok(Page {
            items: tracks[start..end].to_vec(),
            next_offset: (end < tracks.len()).then_some(end as u32),
        })
    }

    async fn search_tracks(&self, token: &str, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        self.enter("search", token)?;
        let query = query.to_lowercase();
        let state = self.state.lock().unwrap();
        Ok(state
            .catalog
            .iter()
            .filter(|entry| {
                entry.track.name.to_lowercase().contains(&query)
                    || entry.track.artist_name.to_lowercase().contains(&query)
            })
            .take(limit as usize)
            .map(|entry| entry.track.clone())
            .collect())
    }

    async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistRef, ApiError> {
        self.enter("create_playlist", token)?;
        let mut state = self.state.lock().unwrap();
        state.created.push((user_id.to_string(), name.to_string()));
        let id = format!("created-{}", state.created.len());
        Ok(PlaylistRef {
            external_url: Some(format!("https://open.spotify.com/playlist/{}", id)),
            id,
        })
    }

    async fn append_playlist_items(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<(), ApiError> {
        self.enter("append_playlist_items", token)?;
        self.state
            .lock()
            .unwrap()
            .appends
            .push((playlist_id.to_string(), uris.len(), position));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{cached, track};
    use crate::keys::Mode;

    #[test]
    fn dimension_values_read_track_and_features() {
        let t = cached("a", "x", 4, Mode::Minor);
        assert_eq!(dimension_value(&t, AudioDimension::Popularity), Some(50.0));
        assert_eq!(dimension_value(&t, AudioDimension::Tempo), Some(120.0));
        assert_eq!(dimension_value(&t, AudioDimension::Mode), Some(0.0));

        let bare = CachedTrack::new(track("b", "y"), None);
        assert_eq!(dimension_value(&bare, AudioDimension::Energy), None);
        assert_eq!(dimension_value(&bare, AudioDimension::DurationMs), Some(200_000.0));
    }
}
