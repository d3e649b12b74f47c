use super::filters::FilterSpec;
use crate::keys::{Mode, MusicalKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    /// Primary artist, the first album artist when the provider reports one.
    pub artist_name: String,
    pub album_art_url: Option<String>,
    pub duration_ms: u64,
    pub explicit: bool,
    pub external_url: Option<String>,
    pub uri: String,
    pub popularity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// Pitch class `0..=11`, or -1 when the provider could not detect one.
    pub key: i32,
    pub mode: Mode,
    pub tempo: f64,
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub time_signature: u32,
}

impl AudioFeatures {
    /// Keys outside `-1..=11` become unknown.
    pub fn normalize_key(key: i32) -> i32 {
        if (-1..12).contains(&key) {
            key
        } else {
            -1
        }
    }

    pub fn musical_key(&self) -> Option<MusicalKey> {
        MusicalKey::from_raw(self.key, self.mode.as_raw() as i32)
    }
}

/// A track together with its audio features, keyed by track id.
///
/// `features` is `None` when hydration failed or the provider has no analysis;
/// such tracks never match a key during generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTrack {
    pub track: Track,
    pub features: Option<AudioFeatures>,
}

impl CachedTrack {
    pub fn new(track: Track, features: Option<AudioFeatures>) -> Self {
        Self { track, features }
    }

    pub fn id(&self) -> &str {
        &self.track.id
    }

    pub fn artist_name(&self) -> &str {
        &self.track.artist_name
    }

    pub fn musical_key(&self) -> Option<MusicalKey> {
        self.features.as_ref().and_then(AudioFeatures::musical_key)
    }

    /// Same entry with its key brought into `-1..=11`.
    pub fn normalized(mut self) -> Self {
        if let Some(features) = self.features.as_mut() {
            features.key = AudioFeatures::normalize_key(features.key);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub external_url: Option<String>,
}

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<u32>,
}

/// Parameters of a single recommendation call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecommendationQuery {
    pub seed_tracks: Vec<String>,
    pub seed_genres: Vec<String>,
    pub filter: FilterSpec,
    pub limit: u32,
}
