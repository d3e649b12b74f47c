use super::draft::PlaylistDraft;
use crate::catalog::{ApiError, CatalogGateway, PlaylistRef, TokenProvider};
use std::sync::Arc;
use tracing::info;

/// Materializes a draft as a playlist in the user's provider account.
pub struct PlaylistPublisher {
    gateway: Arc<CatalogGateway>,
    default_name: String,
}

impl PlaylistPublisher {
    pub fn new(gateway: Arc<CatalogGateway>, default_name: String) -> Self {
        Self {
            gateway,
            default_name,
        }
    }

    /// Creates the playlist, then appends the draft's tracks in order.
    pub async fn publish(
        &self,
        credentials: &dyn TokenProvider,
        user_id: &str,
        name: Option<&str>,
        draft: &PlaylistDraft,
    ) -> Result<PlaylistRef, ApiError> {
        if draft.is_empty() {
            return Err(ApiError::Validation(
                "cannot publish an empty playlist".to_string(),
            ));
        }
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default_name);

        let playlist = self
            .gateway
            .create_playlist(credentials, user_id, name)
            .await?;
        self.gateway
            .append_playlist_items(credentials, &playlist.id, &draft.uris(), 0)
            .await?;
        info!(
            "Published playlist '{}' ({}) with {} tracks for {}",
            name,
            playlist.id,
            draft.len(),
            user_id
        );
        Ok(playlist)
    }
}
