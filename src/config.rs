//! Configuration management for ytwatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, a `ytwatch.toml` file, `YTWATCH_`
//! environment variables and command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// The file read when no `--config` argument is given.
pub const DEFAULT_CONFIG_FILE: &str = "ytwatch.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Settings for the inbound HTTP server.
    pub server: ServerConfig,
    /// Settings for hub subscriptions.
    pub hub: HubConfig,
    /// Settings for the YouTube live status checker.
    pub checker: CheckerConfig,
    /// Settings for the poll monitor.
    pub monitor: MonitorConfig,
    /// Settings for notification delivery.
    pub webhook: WebhookConfig,
    /// The streamer directory.
    pub directory: DirectoryConfig,
    /// The recent-events ring buffer.
    pub events: EventsConfig,
    /// Prometheus metrics.
    pub metrics: MetricsConfig,
}

/// Configuration for the inbound HTTP server.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// The address the webhook server binds to.
    pub listen_address: SocketAddr,
    /// The path of the hub callback route.
    pub webhook_path: String,
    /// Notification bodies larger than this are rejected.
    pub max_body_bytes: usize,
}

/// Subscription parameters shared by every channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HubConfig {
    /// The hub's subscription endpoint.
    pub hub_url: String,
    /// The public URL of this service's webhook route. Empty disables alerts.
    pub callback_url: String,
    /// Optional shared secret forwarded to the hub.
    pub secret: Option<String>,
    pub verify_token_prefix: String,
    pub verify_token_suffix: String,
    pub request_timeout_seconds: u64,
}

impl HubConfig {
    /// Alerts are enabled once a callback URL is configured.
    pub fn alerts_enabled(&self) -> bool {
        !self.callback_url.trim().is_empty()
    }
}

/// Configuration for the YouTube Data API checker.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CheckerConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub request_timeout_seconds: u64,
}

/// Configuration for the poll monitor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MonitorConfig {
    /// When disabled, notifications are only logged.
    pub enabled: bool,
    /// Seconds between two live status checks of one watch.
    pub poll_interval_seconds: u64,
}

/// How the webhook hands alerts to the consumer.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Await the consumer inside the request handler.
    Immediate,
    /// Push onto a bounded queue drained by a background task.
    #[default]
    Queued,
}

/// Which channels the webhook accepts.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChannelPolicy {
    /// Accept every channel.
    #[default]
    Open,
    /// Accept only `channel_id`. Mismatching verifications get 404 and
    /// mismatching notification entries are ignored.
    Strict { channel_id: String },
}

/// Configuration for notification delivery.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebhookConfig {
    pub delivery: DeliveryMode,
    /// Capacity of the alert queue in queued mode.
    pub queue_capacity: usize,
    pub channel_policy: ChannelPolicy,
}

/// An inline streamer directory entry.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamerEntry {
    pub channel_id: String,
    #[serde(default)]
    pub name: String,
}

/// Configuration for the streamer directory.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct DirectoryConfig {
    /// A JSON streamer list. Takes precedence over `streamers`.
    pub streamers_file: Option<PathBuf>,
    /// Reload `streamers_file` when it changes.
    pub watch: bool,
    /// Inline entries used when no file is configured.
    #[serde(default)]
    pub streamers: Vec<StreamerEntry>,
}

/// Configuration for the recent-events ring buffer.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventsConfig {
    pub capacity: usize,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in order, later ones winning: defaults, the TOML
    /// file, `YTWATCH_` environment variables (nested keys separated by
    /// `__`, e.g. `YTWATCH_HUB__CALLBACK_URL`), and command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("YTWATCH_").split("__"))
            .merge(cli)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_seconds == 0 {
            anyhow::bail!("monitor.poll_interval_seconds must be greater than zero");
        }
        if self.webhook.delivery == DeliveryMode::Queued && self.webhook.queue_capacity == 0 {
            anyhow::bail!("webhook.queue_capacity must be greater than zero in queued mode");
        }
        if !self.server.webhook_path.starts_with('/') {
            anyhow::bail!("server.webhook_path must start with '/'");
        }
        if self.server.webhook_path == "/events" {
            anyhow::bail!("server.webhook_path must not shadow the /events route");
        }
        if let ChannelPolicy::Strict { channel_id } = &self.webhook.channel_policy {
            if channel_id.trim().is_empty() {
                anyhow::bail!("webhook.channel_policy.channel_id is required in strict mode");
            }
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
                webhook_path: "/alerts".to_string(),
                max_body_bytes: 1024 * 1024,
            },
            hub: HubConfig {
                hub_url: "https://pubsubhubbub.appspot.com/subscribe".to_string(),
                callback_url: String::new(),
                secret: None,
                verify_token_prefix: String::new(),
                verify_token_suffix: String::new(),
                request_timeout_seconds: 10,
            },
            checker: CheckerConfig {
                api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
                api_key: String::new(),
                request_timeout_seconds: 10,
            },
            monitor: MonitorConfig {
                enabled: true,
                poll_interval_seconds: 60,
            },
            webhook: WebhookConfig {
                delivery: DeliveryMode::Queued,
                queue_capacity: 256,
                channel_policy: ChannelPolicy::Open,
            },
            directory: DirectoryConfig::default(),
            events: EventsConfig { capacity: 200 },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
