//! A live status checker backed by the YouTube Data API v3.

use crate::checker::CheckerError;
use crate::config::CheckerConfig;
use crate::core::{LiveStatus, LiveStatusChecker, WatchTarget};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Maximum number of response body characters kept in error messages.
const ERROR_BODY_LIMIT: usize = 256;

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    #[serde(default)]
    actual_end_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchListResponse {
    page_info: Option<PageInfo>,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_results: u64,
}

/// Queries the YouTube Data API to decide whether a stream is still live.
///
/// With a known video id the `videos` endpoint is consulted and the stream is
/// live until `liveStreamingDetails.actualEndTime` is set. Without one, a live
/// event search on the channel is performed.
pub struct YouTubeChecker {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl YouTubeChecker {
    /// Creates a checker with its own HTTP client using the configured timeout.
    pub fn new(config: &CheckerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self::with_client(
            client,
            config.api_base_url.clone(),
            config.api_key.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, api_base: String, api_key: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CheckerError> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| CheckerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckerError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CheckerError::Decode(e.to_string()))
    }

    async fn check_video(&self, video_id: &str) -> Result<LiveStatus, CheckerError> {
        let response: VideoListResponse = self
            .get_json("videos", &[("part", "liveStreamingDetails"), ("id", video_id)])
            .await?;

        let status = match response
            .items
            .first()
            .and_then(|item| item.live_streaming_details.as_ref())
        {
            Some(details) => match details.actual_end_time.as_deref() {
                Some(ended) if !ended.is_empty() => LiveStatus::NotLive,
                _ => LiveStatus::Live,
            },
            // Unknown video, or a regular upload without live details.
            None => LiveStatus::NotLive,
        };
        Ok(status)
    }

    async fn check_channel(&self, channel_id: &str) -> Result<LiveStatus, CheckerError> {
        let response: SearchListResponse = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id),
                    ("eventType", "live"),
                    ("type", "video"),
                ],
            )
            .await?;

        let total = response
            .page_info
            .map(|p| p.total_results)
            .unwrap_or(response.items.len() as u64);
        Ok(if total > 0 {
            LiveStatus::Live
        } else {
            LiveStatus::NotLive
        })
    }
}

#[async_trait]
impl LiveStatusChecker for YouTubeChecker {
    #[instrument(skip(self), fields(channel_id = %target.channel_id))]
    async fn check(&self, target: &WatchTarget) -> Result<LiveStatus, CheckerError> {
        let status = match target.stream_id.as_deref().filter(|id| !id.is_empty()) {
            Some(video_id) => self.check_video(video_id).await?,
            None => self.check_channel(&target.channel_id).await?,
        };
        debug!(?status, "Live status checked");
        Ok(status)
    }
}
