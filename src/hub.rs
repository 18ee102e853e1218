//! PubSubHubbub subscription management.
//!
//! `HubSubscriber` sends subscribe and unsubscribe requests for a channel's
//! video feed to the configured hub. Verification is asynchronous: the hub
//! later calls back the webhook route with a challenge.

use crate::config::HubConfig;
use crate::directory::StreamerDirectory;
use crate::events::{EventKind, EventLog};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Topic prefix of a YouTube channel's video feed.
pub const TOPIC_BASE: &str = "https://www.youtube.com/xml/feeds/videos.xml?channel_id=";

const ERROR_BODY_LIMIT: usize = 256;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("hub answered {status}: {body}")]
    Status { status: u16, body: String },
}

/// The `hub.mode` of a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the verify token for a channel. Returns `None` when both the
/// prefix and suffix are empty, in which case no token is sent.
pub fn verify_token(prefix: &str, channel_id: &str, suffix: &str) -> Option<String> {
    if prefix.is_empty() && suffix.is_empty() {
        return None;
    }
    Some(format!("{prefix}{channel_id}{suffix}"))
}

pub fn topic_url(channel_id: &str) -> String {
    format!("{TOPIC_BASE}{channel_id}")
}

fn truncate(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

/// Sends subscription requests to the hub.
#[derive(Clone)]
pub struct HubSubscriber {
    client: reqwest::Client,
    config: HubConfig,
    events: EventLog,
}

impl HubSubscriber {
    pub fn new(config: HubConfig, events: EventLog) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self::with_client(client, config, events))
    }

    pub fn with_client(client: reqwest::Client, config: HubConfig, events: EventLog) -> Self {
        Self {
            client,
            config,
            events,
        }
    }

    /// Subscriptions are only sent once a callback URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.alerts_enabled()
    }

    /// Subscribes to a channel's feed. Failures are logged and recorded,
    /// never returned.
    pub async fn ensure_subscription(&self, channel_id: &str) {
        self.ensure(HubMode::Subscribe, channel_id).await;
    }

    /// Unsubscribes from a channel's feed. Failures are logged and recorded,
    /// never returned.
    pub async fn ensure_unsubscription(&self, channel_id: &str) {
        self.ensure(HubMode::Unsubscribe, channel_id).await;
    }

    async fn ensure(&self, mode: HubMode, channel_id: &str) {
        if !self.is_enabled() {
            debug!(channel_id, %mode, "Alerts disabled, skipping hub request");
            return;
        }
        if channel_id.trim().is_empty() {
            debug!(%mode, "Empty channel id, skipping hub request");
            return;
        }

        let outcome = match self.send(mode, channel_id).await {
            Ok(()) => {
                info!(channel_id, %mode, "Hub accepted request");
                let kind = match mode {
                    HubMode::Subscribe => EventKind::Subscribed,
                    HubMode::Unsubscribe => EventKind::Unsubscribed,
                };
                self.events.record(channel_id, kind, None);
                "accepted"
            }
            Err(e) => {
                warn!(channel_id, %mode, error = %e, "Hub request failed");
                self.events.record(
                    channel_id,
                    EventKind::SubscriptionFailed,
                    Some(format!("{mode}: {e}")),
                );
                "failed"
            }
        };
        metrics::counter!("hub_requests_total", "mode" => mode.as_str(), "outcome" => outcome)
            .increment(1);
    }

    /// Sends one request to the hub and reports its outcome.
    pub async fn send(&self, mode: HubMode, channel_id: &str) -> Result<(), HubError> {
        let topic = topic_url(channel_id);
        let mut form: Vec<(&str, String)> = vec![
            ("hub.mode", mode.as_str().to_string()),
            ("hub.topic", topic),
            ("hub.callback", self.config.callback_url.clone()),
            ("hub.verify", "async".to_string()),
        ];
        if let Some(token) = verify_token(
            &self.config.verify_token_prefix,
            channel_id,
            &self.config.verify_token_suffix,
        ) {
            form.push(("hub.verify_token", token));
        }
        if let Some(secret) = self.config.secret.as_deref().filter(|s| !s.is_empty()) {
            form.push(("hub.secret", secret.to_string()));
        }

        let response = self
            .client
            .post(&self.config.hub_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(HubError::Status {
            status: status.as_u16(),
            body: truncate(&body, ERROR_BODY_LIMIT),
        })
    }

    /// Subscribes every channel of a directory snapshot.
    #[instrument(skip_all, fields(channels = directory.len()))]
    pub async fn subscribe_all(&self, directory: &StreamerDirectory) {
        if !self.is_enabled() {
            info!("No callback URL configured, hub subscriptions disabled");
            return;
        }
        for channel_id in directory.channel_ids() {
            self.ensure_subscription(&channel_id).await;
        }
    }
}
