//! reqwest implementation of [`CatalogApi`] against the provider's Web API.

use super::error::ApiError;
use super::models::{AudioFeatures, Page, PlaylistRef, RecommendationQuery, Track};
use super::wire::{
    AddItemsBody, AudioFeaturesResponse, CreatePlaylistBody, ErrorBody, PagingObject,
    PlaylistItem, RecommendationsResponse, SearchResponse, TracksResponse, WirePlaylist,
};
use super::CatalogApi;
use crate::server::metrics;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    async fn send(&self, endpoint: &'static str, request: RequestBuilder) -> Result<Response, ApiError> {
        let start = Instant::now();
        let result = request.send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_provider_call(endpoint, "network_error", start.elapsed());
                return Err(e.into());
            }
        };

        let status = response.status();
        metrics::record_provider_call(endpoint, status.as_str(), start.elapsed());
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        debug!("{} failed with status {}: {}", endpoint, status, message);
        Err(ApiError::from_status(status.as_u16(), retry_after, message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(endpoint, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Parse(format!("{}: {}", endpoint, e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn recommendations(
        &self,
        token: &str,
        query: &RecommendationQuery,
    ) -> Result<Vec<Track>, ApiError> {
        let mut params: Vec<(String, String)> = vec![("limit".to_string(), query.limit.to_string())];
        if !query.seed_tracks.is_empty() {
            params.push(("seed_tracks".to_string(), query.seed_tracks.join(",")));
        }
        if !query.seed_genres.is_empty() {
            params.push(("seed_genres".to_string(), query.seed_genres.join(",")));
        }
        params.extend(query.filter.to_query_params());

        let request = self
            .client
            .get(self.url("/recommendations"))
            .bearer_auth(token)
            .query(&params);
        let response: RecommendationsResponse = self.send_json("recommendations", request).await?;
        Ok(response
            .tracks
            .into_iter()
            .filter_map(|t| t.into_track())
            .collect())
    }

    async fn audio_features(
        &self,
        token: &str,
        ids: &[String],
    ) -> Result<Vec<(String, AudioFeatures)>, ApiError> {
        let request = self
            .client
            .get(self.url("/audio-features"))
            .bearer_auth(token)
            .query(&[("ids", ids.join(","))]);
        let response: AudioFeaturesResponse = self.send_json("audio_features", request).await?;
        Ok(response
            .audio_features
            .into_iter()
            .flatten()
            .filter_map(|f| f.into_features())
            .collect())
    }

    async fn tracks(&self, token: &str, ids: &[String]) -> Result<Vec<Track>, ApiError> {
        let request = self
            .client
            .get(self.url("/tracks"))
            .bearer_auth(token)
            .query(&[("ids", ids.join(","))]);
        let response: TracksResponse = self.send_json("tracks", request).await?;
        Ok(response
            .tracks
            .into_iter()
            .flatten()
            .filter_map(|t| t.into_track())
            .collect())
    }

    async fn playlist_tracks_page(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Track>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!(
                "/playlists/{}/tracks",
                urlencoding::encode(playlist_id)
            )))
            .bearer_auth(token)
            .query(&[("offset", offset), ("limit", limit)]);
        let page: PagingObject<PlaylistItem> = self.send_json("playlist_tracks", request).await?;
        let next_offset = page.next_offset();
        Ok(Page {
            items: page
                .items
                .into_iter()
                .filter_map(|item| item.track.and_then(|t| t.into_track()))
                .collect(),
            next_offset,
        })
    }

    async fn search_tracks(&self, token: &str, query: &str, limit: u32) -> Result<Vec<Track>, ApiError> {
        let limit = limit.to_string();
        let request = self
            .client
            .get(self.url("/search"))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())]);
        let response: SearchResponse = self.send_json("search", request).await?;
        Ok(response
            .tracks
            .items
            .into_iter()
            .filter_map(|t| t.into_track())
            .collect())
    }

    async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        name: &str,
    ) -> Result<PlaylistRef, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/users/{}/playlists", urlencoding::encode(user_id))))
            .bearer_auth(token)
            .json(&CreatePlaylistBody {
                name,
                public: false,
                description: "Generated along the circle of fifths",
            });
        let playlist: WirePlaylist = self.send_json("create_playlist", request).await?;
        Ok(playlist.into())
    }

    async fn append_playlist_items(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&format!(
                "/playlists/{}/tracks",
                urlencoding::encode(playlist_id)
            )))
            .bearer_auth(token)
            .json(&AddItemsBody { uris, position });
        self.send("append_playlist_items", request).await?;
        Ok(())
    }
}
