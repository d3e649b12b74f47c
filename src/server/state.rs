use axum::extract::FromRef;

use crate::oauth::TokenLifecycleManager;
use crate::playlist::PlaylistPublisher;
use crate::recommendations::RecommendationClient;
use crate::track_cache::TrackFeatureCache;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedTrackCache = Arc<TrackFeatureCache>;
pub type GuardedRecommendationClient = Arc<RecommendationClient>;
pub type GuardedPlaylistPublisher = Arc<PlaylistPublisher>;
pub type GuardedTokenManager = Arc<TokenLifecycleManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub track_cache: GuardedTrackCache,
    pub recommendations: GuardedRecommendationClient,
    pub publisher: GuardedPlaylistPublisher,
    pub token_manager: GuardedTokenManager,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedTrackCache {
    fn from_ref(input: &ServerState) -> Self {
        input.track_cache.clone()
    }
}

impl FromRef<ServerState> for GuardedRecommendationClient {
    fn from_ref(input: &ServerState) -> Self {
        input.recommendations.clone()
    }
}

impl FromRef<ServerState> for GuardedPlaylistPublisher {
    fn from_ref(input: &ServerState) -> Self {
        input.publisher.clone()
    }
}

impl FromRef<ServerState> for GuardedTokenManager {
    fn from_ref(input: &ServerState) -> Self {
        input.token_manager.clone()
    }
}
