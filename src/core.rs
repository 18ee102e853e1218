//! Core domain types and service traits for ytwatch
//!
//! This module defines the data structures exchanged between the webhook,
//! the poll monitor and the live status checker, together with the trait
//! contracts that decouple them.

use crate::checker::CheckerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The externally observed state of a channel's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamStatus {
    Online,
    Offline,
    /// Any status string other than "online" or "offline".
    Other(String),
}

impl StreamStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, StreamStatus::Online)
    }
}

impl From<String> for StreamStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "online" => StreamStatus::Online,
            "offline" => StreamStatus::Offline,
            _ => StreamStatus::Other(value),
        }
    }
}

impl From<&str> for StreamStatus {
    fn from(value: &str) -> Self {
        StreamStatus::from(value.to_string())
    }
}

impl From<StreamStatus> for String {
    fn from(status: StreamStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Online => write!(f, "online"),
            StreamStatus::Offline => write!(f, "offline"),
            StreamStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One externally observed state transition for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAlert {
    /// The YouTube channel id. Must be non-empty when handed to the monitor.
    pub channel_id: String,
    /// The video id of the stream, when the source knows it.
    pub stream_id: Option<String>,
    pub status: StreamStatus,
    /// Display-only name resolved from the streamer directory.
    pub streamer_name: Option<String>,
}

impl StreamAlert {
    /// Creates an "online" alert for a channel.
    pub fn online(channel_id: impl Into<String>, stream_id: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            stream_id,
            status: StreamStatus::Online,
            streamer_name: None,
        }
    }

    /// Creates an "offline" alert for a channel.
    pub fn offline(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            stream_id: None,
            status: StreamStatus::Offline,
            streamer_name: None,
        }
    }

    pub fn with_streamer_name(mut self, name: Option<String>) -> Self {
        self.streamer_name = name;
        self
    }

    /// Returns the target a live status checker should query for this alert.
    pub fn target(&self) -> WatchTarget {
        WatchTarget {
            channel_id: self.channel_id.clone(),
            stream_id: self.stream_id.clone(),
        }
    }
}

/// A single entry decoded from a push notification feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub published: String,
    pub updated: String,
    /// The `rel="alternate"` link, i.e. the canonical watch URL.
    pub alternate_link: Option<String>,
}

/// What a live status checker is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub channel_id: String,
    pub stream_id: Option<String>,
}

/// The definitive answer of a live status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Live,
    NotLive,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Answers "is this channel/stream live right now?"
#[async_trait]
pub trait LiveStatusChecker: Send + Sync {
    /// Checks the current live status of a target.
    ///
    /// # Returns
    /// * `Ok(LiveStatus::Live)` while the stream is running
    /// * `Ok(LiveStatus::NotLive)` once the stream has definitively ended
    /// * `Err` when liveness could not be confirmed (network, API or decode failure)
    async fn check(&self, target: &WatchTarget) -> Result<LiveStatus, CheckerError>;
}

/// Receives alerts produced by the webhook.
#[async_trait]
pub trait AlertConsumer: Send + Sync {
    /// A short, descriptive name used in logs.
    fn name(&self) -> &str;

    /// Consumes one alert.
    async fn consume(&self, alert: StreamAlert) -> anyhow::Result<()>;
}

/// A pass-through consumer that only logs the alerts it receives.
#[derive(Debug, Default, Clone)]
pub struct LoggingConsumer;

#[async_trait]
impl AlertConsumer for LoggingConsumer {
    fn name(&self) -> &str {
        "logging"
    }

    async fn consume(&self, alert: StreamAlert) -> anyhow::Result<()> {
        tracing::info!(
            channel_id = %alert.channel_id,
            stream_id = ?alert.stream_id,
            streamer = ?alert.streamer_name,
            status = %alert.status,
            "Received stream alert"
        );
        Ok(())
    }
}
