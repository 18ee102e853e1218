use std::{net::SocketAddr, time::Duration};
use tokio::sync::watch;
use ytwatch::{app::App, config::Config, events::AlertEvent};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::app::{test_config, TestAppBuilder};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_app_starts_and_answers_verification() {
    let app = TestAppBuilder::new().start().await.unwrap();
    let url = app.url(
        "/alerts?hub.mode=subscribe&hub.challenge=abc123&hub.topic=https%3A%2F%2Fwww.youtube.com%2Fxml%2Ffeeds%2Fvideos.xml%3Fchannel_id%3DUC1",
    );

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "abc123");

    let events: Vec<AlertEvent> = reqwest::get(app.url("/events"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel_id, "UC1");

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_app_fails_to_start_with_missing_directory_file() {
    let mut config = test_config();
    config.directory.streamers_file = Some("/nonexistent/streamers.json".into());

    let result = TestAppBuilder::new().with_config(config).start().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_app_rejects_invalid_config() {
    let mut config = test_config();
    config.monitor.poll_interval_seconds = 0;

    let result = TestAppBuilder::new().with_config(config).start().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_monitor_requires_api_key() {
    let mut config = test_config();
    config.checker.api_key = String::new();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = App::builder(config.clone()).build(shutdown_rx).await;
    let err = result.err().expect("build should fail without an API key");
    assert!(err.to_string().contains("checker.api_key"));

    // Without the monitor no checker is built, so no key is needed.
    config.monitor.enabled = false;
    let app = TestAppBuilder::new().with_config(config).start().await.unwrap();
    assert!(app.monitor.is_none());
    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint_is_served_when_enabled() {
    let mut config: Config = test_config();
    config.metrics.enabled = true;
    config.metrics.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await.unwrap();
    let metrics_addr = app.metrics_addr().expect("metrics server should be running");
    let handle = tokio::spawn(app.run());

    let response = reqwest::get(format!("http://{metrics_addr}/metrics")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}
