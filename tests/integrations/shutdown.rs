//! Graceful shutdown with work still in flight.

use std::{sync::Arc, time::Duration};
use tokio::time::{timeout, Instant};
use ytwatch::{checker::test_utils::FakeChecker, monitor::ticker::ManualTickSource};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{app::TestAppBuilder, feeds::atom_feed};

#[tokio::test]
async fn test_shutdown_does_not_wait_for_in_flight_checks() -> anyhow::Result<()> {
    // Arrange: every status check hangs for a minute
    let checker = FakeChecker::new();
    checker.set_delay(Some(Duration::from_secs(60)));
    let app = TestAppBuilder::new()
        .with_checker(Arc::new(checker.clone()))
        .with_tick_source(Arc::new(ManualTickSource::new()))
        .start()
        .await?;
    let monitor = app.monitor.clone().unwrap();

    reqwest::Client::new()
        .post(app.url("/alerts"))
        .header("Content-Type", "application/atom+xml")
        .body(atom_feed(&[("vid1", "UC1")]))
        .send()
        .await?;
    checker.wait_for_calls("UC1", 1, Duration::from_secs(5)).await;
    assert_eq!(monitor.active_watchers(), 1);

    // Act
    let started = Instant::now();
    app.shutdown(Duration::from_secs(5)).await?;

    // Assert
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(monitor.active_watchers(), 0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_signal_stops_idle_app() -> anyhow::Result<()> {
    let app = TestAppBuilder::new().start().await?;
    let addr = app.webhook_addr;

    timeout(Duration::from_secs(5), app.shutdown(Duration::from_secs(5))).await??;

    // The listener is gone once the server task has finished.
    let result = reqwest::Client::new()
        .get(format!("http://{addr}/events"))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(result.is_err());
    Ok(())
}
