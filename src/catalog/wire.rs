//! JSON shapes of the provider's Web API.

use super::models::{AudioFeatures, PlaylistRef, Track};
use crate::keys::Mode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct WireArtist {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct WireImage {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct WireAlbum {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<WireImage>,
    #[serde(default)]
    pub artists: Vec<WireArtist>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct WireExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WireTrack {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub external_urls: WireExternalUrls,
    #[serde(default)]
    pub album: WireAlbum,
    #[serde(default)]
    pub artists: Vec<WireArtist>,
}

impl WireTrack {
    /// Local files and unavailable items come back without an id; they are dropped.
    pub fn into_track(self) -> Option<Track> {
        let id = self.id?;
        let artist_name = self
            .album
            .artists
            .into_iter()
            .next()
            .or_else(|| self.artists.into_iter().next())
            .map(|a| a.name)
            .unwrap_or_default();
        let uri = if self.uri.is_empty() {
            format!("spotify:track:{}", id)
        } else {
            self.uri
        };
        Some(Track {
            id,
            name: self.name,
            artist_name,
            album_art_url: self.album.images.into_iter().next().map(|i| i.url),
            duration_ms: self.duration_ms,
            explicit: self.explicit,
            external_url: self.external_urls.spotify,
            uri,
            popularity: self.popularity,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WireAudioFeatures {
    pub id: String,
    pub key: i32,
    pub mode: i32,
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

impl WireAudioFeatures {
    /// Keys outside `-1..=11` become unknown; a mode outside `{0, 1}` discards
    /// the vector entirely.
    pub fn into_features(self) -> Option<(String, AudioFeatures)> {
        let mode = Mode::from_raw(self.mode)?;
        Some((
            self.id,
            AudioFeatures {
                key: AudioFeatures::normalize_key(self.key),
                mode,
                tempo: self.tempo,
                energy: self.energy,
                valence: self.valence,
                danceability: self.danceability,
                acousticness: self.acousticness,
                instrumentalness: self.instrumentalness,
                liveness: self.liveness,
                loudness: self.loudness,
                speechiness: self.speechiness,
                time_signature: self.time_signature,
            },
        ))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecommendationsResponse {
    pub tracks: Vec<WireTrack>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AudioFeaturesResponse {
    pub audio_features: Vec<Option<WireAudioFeatures>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TracksResponse {
    pub tracks: Vec<Option<WireTrack>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlaylistItem {
    pub track: Option<WireTrack>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PagingObject<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u32,
}

impl<T> PagingObject<T> {
    pub fn next_offset(&self) -> Option<u32> {
        self.next.as_ref().map(|_| self.offset + self.items.len() as u32)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchResponse {
    pub tracks: PagingObject<WireTrack>,
}

#[derive(Debug, Serialize)]
pub struct CreatePlaylistBody<'a> {
    pub name: &'a str,
    pub public: bool,
    pub description: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WirePlaylist {
    pub id: String,
    #[serde(default)]
    pub external_urls: WireExternalUrls,
}

impl From<WirePlaylist> for PlaylistRef {
    fn from(p: WirePlaylist) -> Self {
        PlaylistRef {
            id: p.id,
            external_url: p.external_urls.spotify,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddItemsBody<'a> {
    pub uris: &'a [String],
    pub position: usize,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}
