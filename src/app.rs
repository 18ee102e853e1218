//! The main application logic, decoupled from the entry point.

use crate::{
    checker::YouTubeChecker,
    config::{Config, DeliveryMode},
    core::{AlertConsumer, LiveStatusChecker, LoggingConsumer, StreamAlert},
    directory::{DirectoryDiff, DirectoryHandle, StreamerDirectory},
    events::EventLog,
    hub::HubSubscriber,
    internal_metrics::{Metrics, MetricsBuilder},
    monitor::{IntervalTickSource, PollMonitor, TickSource},
    task_manager::TaskManager,
    webhook::{self, AlertDispatcher, WebhookServer, WebhookState},
};
use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    webhook_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    monitor: Option<PollMonitor>,
    events: EventLog,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the webhook server is bound to.
    pub fn webhook_addr(&self) -> SocketAddr {
        self.webhook_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// The poll monitor, when the monitor is the alert consumer.
    pub fn monitor(&self) -> Option<&PollMonitor> {
        self.monitor.as_ref()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        if let Some(monitor) = &self.monitor {
            monitor.stop_all();
        }
        self.task_manager.shutdown(SHUTDOWN_GRACE).await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap out the outbound dependencies.
pub struct AppBuilder {
    config: Config,
    checker_override: Option<Arc<dyn LiveStatusChecker>>,
    tick_source_override: Option<Arc<dyn TickSource>>,
    consumer_override: Option<Arc<dyn AlertConsumer>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            checker_override: None,
            tick_source_override: None,
            consumer_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the live status checker used by the poll monitor.
    pub fn checker_override(mut self, checker: Arc<dyn LiveStatusChecker>) -> Self {
        self.checker_override = Some(checker);
        self
    }

    /// Overrides the tick source used by the poll monitor.
    pub fn tick_source_override(mut self, tick_source: Arc<dyn TickSource>) -> Self {
        self.tick_source_override = Some(tick_source);
        self
    }

    /// Replaces the alert consumer entirely. The poll monitor is not built.
    pub fn consumer_override(mut self, consumer: Arc<dyn AlertConsumer>) -> Self {
        self.consumer_override = Some(consumer);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and starts all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone())
                    .build(task_manager.get_shutdown_rx())
                    .await
            }
        };
        let metrics_addr = metrics_server_info.map(|(server, addr)| {
            task_manager.spawn("MetricsServer", server.run());
            info!(address = %addr, "Metrics server listening");
            addr
        });

        // =========================================================================
        // 2. Event Log & Streamer Directory
        // =========================================================================
        let events = EventLog::new(config.events.capacity);
        let directory = load_directory(&config).await?;
        if let Some(directory) = &directory {
            metrics.directory_channels.set(directory.snapshot().len() as f64);
        }

        // =========================================================================
        // 3. Alert Consumer
        // =========================================================================
        let mut monitor = None;
        let consumer: Arc<dyn AlertConsumer> = match self.consumer_override {
            Some(consumer) => consumer,
            None if config.monitor.enabled => {
                let checker: Arc<dyn LiveStatusChecker> = match self.checker_override {
                    Some(checker) => checker,
                    None => {
                        if config.checker.api_key.trim().is_empty() {
                            anyhow::bail!(
                                "checker.api_key is required while monitor.enabled is true"
                            );
                        }
                        Arc::new(YouTubeChecker::new(&config.checker)?)
                    }
                };
                let tick_source: Arc<dyn TickSource> = match self.tick_source_override {
                    Some(tick_source) => tick_source,
                    None => Arc::new(IntervalTickSource),
                };
                let poll_monitor = PollMonitor::with_tick_source(
                    checker,
                    Duration::from_secs(config.monitor.poll_interval_seconds),
                    tick_source,
                )
                .with_event_log(events.clone());
                monitor = Some(poll_monitor.clone());
                Arc::new(poll_monitor)
            }
            None => {
                info!("Poll monitor disabled, alerts will only be logged");
                Arc::new(LoggingConsumer)
            }
        };

        // =========================================================================
        // 4. Delivery
        // =========================================================================
        let dispatcher = match config.webhook.delivery {
            DeliveryMode::Immediate => AlertDispatcher::immediate(consumer, events.clone()),
            DeliveryMode::Queued => {
                let (dispatcher, drain) = AlertDispatcher::queued(
                    consumer,
                    config.webhook.queue_capacity,
                    events.clone(),
                );
                task_manager.spawn_with_heartbeat("AlertDrain", drain.run(task_manager.get_shutdown_rx()));
                dispatcher
            }
        };

        // =========================================================================
        // 5. Webhook Server
        // =========================================================================
        let state = WebhookState {
            dispatcher,
            directory: directory.clone(),
            policy: config.webhook.channel_policy.clone(),
            events: events.clone(),
        };
        let router = webhook::router(state, &config.server.webhook_path, config.server.max_body_bytes);
        let listener = TcpListener::bind(config.server.listen_address)
            .await
            .with_context(|| format!("failed to bind webhook server to {}", config.server.listen_address))?;
        let webhook_addr = listener.local_addr()?;
        task_manager.spawn(
            "WebhookServer",
            WebhookServer::new(listener, router, task_manager.get_shutdown_rx()).run(),
        );
        info!(address = %webhook_addr, path = %config.server.webhook_path, "Webhook server listening");

        // =========================================================================
        // 6. Hub Subscriptions
        // =========================================================================
        let hub = HubSubscriber::new(config.hub.clone(), events.clone())?;
        if let Some(directory) = &directory {
            let snapshot = directory.snapshot();
            let startup_hub = hub.clone();
            let mut shutdown_rx = task_manager.get_shutdown_rx();
            task_manager.spawn("HubStartup", async move {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {}
                    _ = startup_hub.subscribe_all(&snapshot) => {}
                }
            });

            if config.directory.watch {
                if let Some(diffs) = directory.watch(&task_manager)? {
                    task_manager.spawn_with_heartbeat(
                        "HubSync",
                        sync_subscriptions(
                            diffs,
                            hub,
                            directory.clone(),
                            monitor.clone(),
                            metrics,
                            task_manager.get_shutdown_rx(),
                        ),
                    );
                }
            }
        }

        info!("ytwatch initialized successfully.");
        Ok(App {
            task_manager,
            webhook_addr,
            metrics_addr,
            monitor,
            events,
        })
    }
}

async fn load_directory(config: &Config) -> Result<Option<DirectoryHandle>> {
    if let Some(path) = &config.directory.streamers_file {
        let handle = DirectoryHandle::from_file(path.clone())
            .await
            .context("failed to load streamer directory")?;
        return Ok(Some(handle));
    }
    if !config.directory.streamers.is_empty() {
        let directory = StreamerDirectory::from_entries(&config.directory.streamers);
        info!(channels = directory.len(), "Using inline streamer directory");
        return Ok(Some(DirectoryHandle::fixed(directory)));
    }
    Ok(None)
}

/// Follows directory reloads with hub subscription changes. Channels removed
/// from the directory are also unwatched.
async fn sync_subscriptions(
    mut diffs: mpsc::Receiver<DirectoryDiff>,
    hub: HubSubscriber,
    directory: DirectoryHandle,
    monitor: Option<PollMonitor>,
    metrics: Metrics,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let diff = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("Hub sync received shutdown signal.");
                break;
            }
            diff = diffs.recv() => match diff {
                Some(diff) => diff,
                None => break,
            },
        };

        metrics.directory_reloads_total.increment(1);
        metrics.directory_channels.set(directory.snapshot().len() as f64);
        for channel_id in &diff.added {
            hub.ensure_subscription(channel_id).await;
        }
        for channel_id in &diff.removed {
            hub.ensure_unsubscription(channel_id).await;
            if let Some(monitor) = &monitor {
                if let Err(e) = monitor.handle(StreamAlert::offline(channel_id.clone())) {
                    warn!(channel_id = %channel_id, error = %e, "Failed to stop watch");
                }
            }
        }
    }
    info!("Hub sync finished.");
}
