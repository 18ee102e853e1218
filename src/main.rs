//! ytwatch - YouTube live-alert service
//!
//! Subscribes to channel feeds on a PubSubHubbub hub, turns pushed Atom
//! notifications into stream alerts and polls live channels until their
//! stream ends.

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ytwatch::{app::App, cli::Cli, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!(error = %err, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ytwatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.server.listen_address);
    info!("Webhook Path: {}", config.server.webhook_path);
    info!("Hub URL: {}", config.hub.hub_url);
    info!(
        "Alerts: {}",
        if config.hub.alerts_enabled() { "Enabled" } else { "Disabled (no callback URL)" }
    );
    info!("Monitor: {}", if config.monitor.enabled { "Enabled" } else { "Disabled" });
    info!("Poll Interval: {}s", config.monitor.poll_interval_seconds);
    info!("Delivery: {:?} (queue capacity {})", config.webhook.delivery, config.webhook.queue_capacity);
    info!("Channel Policy: {:?}", config.webhook.channel_policy);
    match &config.directory.streamers_file {
        Some(path) => info!("Streamer Directory: {} (watch: {})", path.display(), config.directory.watch),
        None => info!("Streamer Directory: {} inline entries", config.directory.streamers.len()),
    }
    info!("Metrics: {}", if config.metrics.enabled { "Enabled" } else { "Disabled" });
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    let run = tokio::spawn(app.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send(true).ok();

    match run.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "Application task panicked"),
    }

    info!("Exiting.");
    Ok(())
}
