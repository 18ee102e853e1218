//! # Internal Metrics Module
//!
//! Infrastructure for collecting and exposing application metrics.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: The entry point for initializing the metrics system.
//!   It sets up the Prometheus recorder, binds the metrics listener, and
//!   constructs the `Metrics` handle.
//!
//! - **`Metrics`**: A lightweight, cloneable struct holding handles to the
//!   metrics the application shell updates. Most per-event counters are
//!   updated via macro at the call site.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) An `axum`-based web server
//!   that exposes the `/metrics` endpoint for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub directory_channels: Gauge,
    pub directory_reloads_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        Self::describe();
        Self {
            directory_channels: metrics::gauge!("directory_channels"),
            directory_reloads_total: metrics::counter!("directory_reloads_total"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            directory_channels: metrics::gauge!("disabled"),
            directory_reloads_total: metrics::counter!("disabled"),
        }
    }

    fn describe() {
        metrics::describe_counter!("notifications_received_total", Unit::Count, "Total number of notification entries accepted by the webhook.");
        metrics::describe_counter!("notifications_rejected_total", Unit::Count, "Total number of notification bodies rejected as unsupported or malformed.");
        metrics::describe_counter!("hub_verifications_total", Unit::Count, "Total number of hub verification handshakes answered, labeled by mode.");
        metrics::describe_counter!("hub_requests_total", Unit::Count, "Total number of subscription requests sent to the hub, labeled by mode and outcome.");
        metrics::describe_counter!("alerts_dropped_total", Unit::Count, "Total number of alerts dropped because the delivery queue was full.");
        metrics::describe_gauge!("alert_queue_depth", Unit::Count, "The current number of alerts waiting in the delivery queue.");
        metrics::describe_gauge!("active_watchers", Unit::Count, "The current number of channels being polled for live status.");
        metrics::describe_counter!("checker_errors_total", Unit::Count, "Total number of failed live status checks.");
        metrics::describe_gauge!("directory_channels", Unit::Count, "The number of channels in the current streamer directory.");
        metrics::describe_counter!("directory_reloads_total", Unit::Count, "Total number of streamer directory reloads that changed the channel set.");
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the metrics system.
///
/// This builder is responsible for initializing the `PrometheusRecorder`,
/// binding the `MetricsServer` listener, and creating the `Metrics` handle.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer` with its bound address.
    ///
    /// If metrics are disabled, or the recorder cannot be set up, this
    /// returns a disabled `Metrics` instance and `None` for the server.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        // Bind before installing the recorder so a bind failure leaves the
        // global recorder untouched.
        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    address = %self.config.listen_address,
                    error = %e,
                    "Failed to bind metrics server"
                );
                return (Metrics::disabled(), None);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = %e, "Failed to get local address for metrics server");
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!(error = %e, "Failed to install Prometheus recorder");
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}
