use crate::catalog::CachedTrack;
use crate::keys::MusicalKey;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// A track may not share its primary artist with any of this many
/// immediately preceding tracks.
pub const RECENT_ARTIST_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error("track {0} is already in the playlist")]
    DuplicateTrack(String),
    #[error("artist '{artist}' of track {track_id} played within the last {window} tracks")]
    RecentArtist {
        track_id: String,
        artist: String,
        window: usize,
    },
    #[error("track {0} is explicit and explicit content is not allowed")]
    ExplicitNotAllowed(String),
}

/// An in-progress playlist.
///
/// Drafts are values: [`PlaylistDraft::with_track`] returns a new draft and
/// leaves the receiver untouched, so length and duration only ever grow along
/// a chain of drafts.
#[derive(Debug, Clone)]
pub struct PlaylistDraft {
    tracks: Vec<CachedTrack>,
    chosen_ids: HashSet<String>,
    recent_artists: VecDeque<String>,
    duration_ms: u64,
    allow_explicit: bool,
}

impl PlaylistDraft {
    pub fn new(allow_explicit: bool) -> Self {
        Self {
            tracks: Vec::new(),
            chosen_ids: HashSet::new(),
            recent_artists: VecDeque::with_capacity(RECENT_ARTIST_WINDOW + 1),
            duration_ms: 0,
            allow_explicit,
        }
    }

    /// A draft opening with `seed`. The seed is the caller's choice and is
    /// not subject to the explicit-content policy.
    pub fn seeded(seed: CachedTrack, allow_explicit: bool) -> Self {
        let mut draft = Self::new(allow_explicit);
        draft.chosen_ids.insert(seed.id().to_string());
        draft.recent_artists.push_back(seed.artist_name().to_string());
        draft.duration_ms = seed.track.duration_ms;
        draft.tracks.push(seed);
        draft
    }

    /// Checks whether `candidate` could be appended.
    pub fn admits(&self, candidate: &CachedTrack) -> Result<(), DraftError> {
        if self.chosen_ids.contains(candidate.id()) {
            return Err(DraftError::DuplicateTrack(candidate.id().to_string()));
        }
        if self
            .recent_artists
            .iter()
            .any(|artist| artist == candidate.artist_name())
        {
            return Err(DraftError::RecentArtist {
                track_id: candidate.id().to_string(),
                artist: candidate.artist_name().to_string(),
                window: RECENT_ARTIST_WINDOW,
            });
        }
        if candidate.track.explicit && !self.allow_explicit {
            return Err(DraftError::ExplicitNotAllowed(candidate.id().to_string()));
        }
        Ok(())
    }

    pub fn with_track(&self, track: CachedTrack) -> Result<Self, DraftError> {
        self.admits(&track)?;
        let mut next = self.clone();
        next.chosen_ids.insert(track.id().to_string());
        next.recent_artists.push_back(track.artist_name().to_string());
        if next.recent_artists.len() > RECENT_ARTIST_WINDOW {
            next.recent_artists.pop_front();
        }
        next.duration_ms += track.track.duration_ms;
        next.tracks.push(track);
        Ok(next)
    }

    pub fn tracks(&self) -> &[CachedTrack] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<CachedTrack> {
        self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.chosen_ids.contains(track_id)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn last(&self) -> Option<&CachedTrack> {
        self.tracks.last()
    }

    /// Key of the last chosen track, the position in the key progression.
    pub fn current_key(&self) -> Option<MusicalKey> {
        self.last().and_then(CachedTrack::musical_key)
    }

    pub fn recent_artists(&self) -> impl Iterator<Item = &str> {
        self.recent_artists.iter().map(String::as_str)
    }

    /// Ids of the last `n` chosen tracks, oldest first.
    pub fn last_ids(&self, n: usize) -> Vec<String> {
        let skip = self.tracks.len().saturating_sub(n);
        self.tracks[skip..]
            .iter()
            .map(|t| t.id().to_string())
            .collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.track.uri.clone()).collect()
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            track_count: self.len(),
            duration_ms: self.duration_ms,
            duration: format_duration_ms(self.duration_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftSummary {
    pub track_count: usize,
    pub duration_ms: u64,
    pub duration: String,
}

/// Renders a duration as `"1h 2m 3s"`, omitting the hours when zero.
pub fn format_duration_ms(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1_000;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}
