//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `ytwatch.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// YouTube live-alert service: hub subscriptions, push notifications and live polling.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the webhook server listens on (e.g. 0.0.0.0:8080).
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Public callback URL registered with the hub.
    #[arg(long, value_name = "URL")]
    pub callback_url: Option<String>,

    /// Seconds between live status checks.
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<u64>,

    /// Capacity of the queued alert delivery channel.
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,

    /// Override the log level (e.g. debug, info).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut server = Dict::new();
        if let Some(listen) = &self.listen {
            server.insert("listen_address".into(), Value::from(listen.clone()));
        }
        if !server.is_empty() {
            dict.insert("server".into(), Value::from(server));
        }

        let mut hub = Dict::new();
        if let Some(url) = &self.callback_url {
            hub.insert("callback_url".into(), Value::from(url.clone()));
        }
        if !hub.is_empty() {
            dict.insert("hub".into(), Value::from(hub));
        }

        if let Some(interval) = self.poll_interval {
            let mut monitor = Dict::new();
            monitor.insert("poll_interval_seconds".into(), Value::from(interval));
            dict.insert("monitor".into(), Value::from(monitor));
        }

        if let Some(capacity) = self.queue_capacity {
            let mut webhook = Dict::new();
            webhook.insert("queue_capacity".into(), Value::from(capacity));
            dict.insert("webhook".into(), Value::from(webhook));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
