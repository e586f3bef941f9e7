//! Adds linked YouTube videos to a playlist via the Data API v3.

use std::collections::HashSet;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::{self, ClientCredentials};
use crate::config::Config;
use crate::constants::USER_AGENT;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

static VIDEO_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/)([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/embed/([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/v/([A-Za-z0-9_-]{11})").unwrap(),
        Regex::new(r"youtube\.com/shorts/([A-Za-z0-9_-]{11})").unwrap(),
    ]
});

/// Extract the 11-character video id from a YouTube URL.
#[must_use]
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: ContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    video_id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

enum InsertOutcome {
    Added,
    AlreadyPresent,
}

pub struct PlaylistPublisher {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client: ClientCredentials,
    refresh_token: String,
    playlist_id: String,
}

impl PlaylistPublisher {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        client: ClientCredentials,
        refresh_token: impl Into<String>,
        playlist_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: API_BASE.to_string(),
            token_url: auth::GOOGLE.token_url.to_string(),
            client,
            refresh_token: refresh_token.into(),
            playlist_id: playlist_id.into(),
        }
    }

    /// Publisher for the configured playlist, if playlist publishing is set up.
    #[must_use]
    pub fn from_config(http: reqwest::Client, config: &Config) -> Option<Self> {
        if !config.collect_youtube_links {
            return None;
        }
        let playlist_id = config.youtube_playlist_id.as_deref()?;
        let (client_id, client_secret, refresh_token) = config.youtube_credentials()?;

        Some(Self::new(
            http,
            ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            },
            refresh_token,
            playlist_id,
        ))
    }

    /// Point the publisher at different API and token endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    /// Add every video in `urls` that is not yet in the playlist.
    ///
    /// URLs without a recognizable video id are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if no access token could be obtained.
    pub async fn publish(&self, urls: &[String]) -> Result<PlaylistSummary> {
        let mut summary = PlaylistSummary::default();

        let video_ids: Vec<String> = urls.iter().filter_map(|u| extract_video_id(u)).collect();
        if video_ids.is_empty() {
            return Ok(summary);
        }

        let token = auth::refresh_access_token(&self.http, &self.token_url, &self.client, &self.refresh_token)
            .await?
            .access_token;

        let mut present = match self.existing_video_ids(&token).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list existing playlist items: {e:#}");
                HashSet::new()
            }
        };

        for video_id in video_ids {
            if present.contains(&video_id) {
                summary.skipped += 1;
                continue;
            }

            match self.insert(&token, &video_id).await {
                Ok(InsertOutcome::Added) => {
                    info!(video_id = %video_id, "Added video to playlist");
                    summary.added += 1;
                }
                Ok(InsertOutcome::AlreadyPresent) => summary.skipped += 1,
                Err(e) => {
                    warn!(video_id = %video_id, "Failed to add video to playlist: {e:#}");
                    summary.failed += 1;
                    continue;
                }
            }
            present.insert(video_id);
        }

        Ok(summary)
    }

    async fn existing_video_ids(&self, token: &str) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/playlistItems", self.api_base))
                .header("User-Agent", USER_AGENT)
                .bearer_auth(token)
                .query(&[
                    ("part", "contentDetails"),
                    ("playlistId", self.playlist_id.as_str()),
                    ("maxResults", "50"),
                ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: PlaylistItemsPage = request
                .send()
                .await
                .context("Playlist listing request failed")?
                .error_for_status()
                .context("Playlist listing returned an error")?
                .json()
                .await
                .context("Failed to parse playlist listing")?;

            ids.extend(page.items.into_iter().map(|item| item.content_details.video_id));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = ids.len(), "Existing playlist items");
        Ok(ids)
    }

    async fn insert(&self, token: &str, video_id: &str) -> Result<InsertOutcome> {
        let body = json!({
            "snippet": {
                "playlistId": self.playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id,
                },
            },
        });

        let response = self
            .http
            .post(format!("{}/playlistItems", self.api_base))
            .header("User-Agent", USER_AGENT)
            .bearer_auth(token)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await
            .context("Playlist insert request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(InsertOutcome::Added);
        }

        let text = response.text().await.unwrap_or_default();
        let already_present = serde_json::from_str::<ApiErrorBody>(&text)
            .is_ok_and(|body| body.error.errors.iter().any(|e| e.reason == "videoAlreadyInPlaylist"));
        if already_present {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        anyhow::bail!("YouTube API returned {status}: {text}")
    }
}

impl std::fmt::Debug for PlaylistPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistPublisher")
            .field("api_base", &self.api_base)
            .field("playlist_id", &self.playlist_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://youtu.be/dQw4w9WgXcQ?t=10", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/v/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/shorts/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/watch?v=short", None),
            ("https://www.youtube.com/channel/UC123", None),
            ("https://vimeo.com/12345678", None),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_video_id(url).as_deref(), expected, "{url}");
        }
    }

    #[test]
    fn test_from_config_requires_everything() {
        let mut config = Config::for_testing();
        let http = reqwest::Client::new();
        assert!(PlaylistPublisher::from_config(http.clone(), &config).is_none());

        config.collect_youtube_links = true;
        config.youtube_playlist_id = Some("PL123".to_string());
        assert!(PlaylistPublisher::from_config(http.clone(), &config).is_none());

        config.youtube_client_id = Some("id".to_string());
        config.youtube_client_secret = Some("secret".to_string());
        config.youtube_refresh_token = Some("refresh".to_string());
        assert!(PlaylistPublisher::from_config(http, &config).is_some());
    }
}
