use super::draft::{format_duration_ms, PlaylistDraft};
use crate::catalog::{ApiError, CachedTrack, FilterSpec, TokenProvider};
use crate::keys::{next_key_candidates, MusicalKey};
use crate::recommendations::{RecommendationClient, MAX_RECOMMENDATION_LIMIT, MAX_SEED_TRACKS};
use crate::server::metrics;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Length of the opening sequence drawn from the candidate pool, seed included.
pub const STARTING_SEQUENCE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    pub max_tracks: usize,
    /// Stop once the playlist is at least this long.
    pub min_duration_ms: Option<u64>,
}

impl Budget {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.max_tracks == 0 {
            return Err(ApiError::Validation(
                "max_tracks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn exhausted_by(&self, draft: &PlaylistDraft) -> Option<TerminationReason> {
        if draft.len() >= self.max_tracks {
            return Some(TerminationReason::MaxTracksReached);
        }
        match self.min_duration_ms {
            Some(min) if draft.duration_ms() >= min => Some(TerminationReason::MinDurationReached),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    MaxTracksReached,
    MinDurationReached,
    NoMatchingCandidates,
    SeedKeyUnknown,
    /// The recommendation call failed after retries; the run keeps what it has.
    UpstreamUnavailable(String),
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::MaxTracksReached => "max_tracks_reached",
            TerminationReason::MinDurationReached => "min_duration_reached",
            TerminationReason::NoMatchingCandidates => "no_matching_candidates",
            TerminationReason::SeedKeyUnknown => "seed_key_unknown",
            TerminationReason::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::UpstreamUnavailable(reason) => {
                write!(f, "{} ({})", self.as_str(), reason)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub seed: CachedTrack,
    /// Tracks preferred for the opening sequence, in priority order.
    pub pool: Vec<CachedTrack>,
    pub filter: FilterSpec,
    pub budget: Budget,
    pub allow_explicit: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub draft: PlaylistDraft,
    /// How many of the draft's leading tracks came from the seed and pool.
    pub starting_len: usize,
    pub termination: TerminationReason,
}

fn matches_any(track: &CachedTrack, candidates: &[MusicalKey; 2]) -> bool {
    track
        .musical_key()
        .is_some_and(|key| candidates.contains(&key))
}

/// Phase 1: walks the circle of fifths through `pool`, starting from `seed`.
///
/// Each step takes the first pool track in either candidate key that the
/// draft admits, and stops at the first step with none. Returns a draft of
/// one to [`STARTING_SEQUENCE_LEN`] tracks.
pub fn choose_starting_five(
    pool: &[CachedTrack],
    seed: CachedTrack,
    allow_explicit: bool,
) -> PlaylistDraft {
    starting_sequence(pool, seed, allow_explicit, STARTING_SEQUENCE_LEN)
}

fn starting_sequence(
    pool: &[CachedTrack],
    seed: CachedTrack,
    allow_explicit: bool,
    max_len: usize,
) -> PlaylistDraft {
    let mut draft = PlaylistDraft::seeded(seed, allow_explicit);
    while draft.len() < max_len {
        let Some(current) = draft.current_key() else {
            break;
        };
        let candidates = next_key_candidates(current);
        let next = pool
            .iter()
            .filter(|track| matches_any(track, &candidates))
            .find_map(|track| draft.with_track(track.clone()).ok());
        match next {
            Some(longer) => draft = longer,
            None => break,
        }
    }
    draft
}

/// Greedy key-progression playlist builder.
///
/// Every appended track is in one of the two keys a fifth up from the
/// previous track. There is no backtracking: when no recommended candidate
/// fits, the run ends with the playlist built so far.
pub struct PlaylistAssembler<R: Rng + Send> {
    recommendations: Arc<RecommendationClient>,
    rng: R,
}

impl<R: Rng + Send> PlaylistAssembler<R> {
    pub fn new(recommendations: Arc<RecommendationClient>, rng: R) -> Self {
        Self {
            recommendations,
            rng,
        }
    }

    /// Runs both phases. Fails only on a malformed request, before any
    /// provider call, or with `RefreshFailed`.
    pub async fn generate(
        &mut self,
        credentials: &dyn TokenProvider,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, ApiError> {
        request.filter.validate()?;
        request.budget.validate()?;

        let seed_id = request.seed.id().to_string();
        if request.seed.musical_key().is_none() {
            info!("Seed track {} has no known key, nothing to follow", seed_id);
            let draft = PlaylistDraft::seeded(request.seed, request.allow_explicit);
            return Ok(self.finish(draft, 1, TerminationReason::SeedKeyUnknown));
        }

        let draft = starting_sequence(
            &request.pool,
            request.seed,
            request.allow_explicit,
            STARTING_SEQUENCE_LEN.min(request.budget.max_tracks),
        );
        let starting_len = draft.len();
        debug!(
            "Starting sequence for {}: {} tracks from a pool of {}",
            seed_id,
            starting_len,
            request.pool.len()
        );

        let (draft, termination) = self
            .grow_playlist(credentials, draft, &request.filter, &request.budget)
            .await?;
        Ok(self.finish(draft, starting_len, termination))
    }

    /// Phase 2: extends `draft` with recommended tracks until the budget is
    /// met or no candidate continues the key progression.
    pub async fn grow_playlist(
        &mut self,
        credentials: &dyn TokenProvider,
        mut draft: PlaylistDraft,
        filter: &FilterSpec,
        budget: &Budget,
    ) -> Result<(PlaylistDraft, TerminationReason), ApiError> {
        loop {
            if let Some(reason) = budget.exhausted_by(&draft) {
                return Ok((draft, reason));
            }
            let Some(current) = draft.current_key() else {
                return Ok((draft, TerminationReason::SeedKeyUnknown));
            };
            let candidates = next_key_candidates(current);
            let seeds = draft.last_ids(MAX_SEED_TRACKS);

            let recommended = match self
                .recommendations
                .get_recommendations(credentials, &seeds, filter, MAX_RECOMMENDATION_LIMIT)
                .await
            {
                Ok(recommended) => recommended,
                Err(err @ (ApiError::RefreshFailed(_) | ApiError::Validation(_))) => return Err(err),
                Err(err) => {
                    warn!("Recommendations unavailable, ending run early: {}", err);
                    return Ok((draft, TerminationReason::UpstreamUnavailable(err.to_string())));
                }
            };

            let considered = recommended.len();
            let mut matching: Vec<CachedTrack> = recommended
                .into_iter()
                .filter(|track| draft.admits(track).is_ok() && matches_any(track, &candidates))
                .collect();
            if matching.is_empty() {
                debug!(
                    "None of {} candidates in {} or {}",
                    considered, candidates[0], candidates[1]
                );
                return Ok((draft, TerminationReason::NoMatchingCandidates));
            }

            let pick = matching.swap_remove(self.rng.random_range(0..matching.len()));
            debug!(
                "Next track '{}' by {} ({}), chosen from {} of {}",
                pick.track.name,
                pick.artist_name(),
                pick.musical_key()
                    .map(|k| k.label())
                    .unwrap_or_else(|| "?".to_string()),
                matching.len() + 1,
                considered
            );
            draft = match draft.with_track(pick) {
                Ok(longer) => longer,
                Err(err) => {
                    warn!("Admitted candidate rejected by draft: {}", err);
                    return Ok((draft, TerminationReason::NoMatchingCandidates));
                }
            };
        }
    }

    fn finish(
        &self,
        draft: PlaylistDraft,
        starting_len: usize,
        termination: TerminationReason,
    ) -> GenerationOutcome {
        info!(
            "Generated playlist of {} tracks ({}), ended by {}",
            draft.len(),
            format_duration_ms(draft.duration_ms()),
            termination
        );
        metrics::record_playlist_generated(draft.len(), termination.as_str());
        GenerationOutcome {
            draft,
            starting_len,
            termination,
        }
    }
}
