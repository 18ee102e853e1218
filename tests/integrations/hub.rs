//! Hub subscriptions driven by the streamer directory.

use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, Request, ResponseTemplate,
};
use ytwatch::{
    config::StreamerEntry,
    directory::StreamerDirectory,
    events::{EventKind, EventLog},
    hub::{HubMode, HubSubscriber},
};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::app::{test_config, TestAppBuilder};

const WAIT: Duration = Duration::from_secs(10);

fn form_bodies(requests: &[Request]) -> Vec<String> {
    requests
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .collect()
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<String> {
    tokio::time::timeout(WAIT, async {
        loop {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.len() >= count {
                return form_bodies(&requests);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("hub did not receive the expected requests")
}

async fn hub_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    server
}

fn hub_config(server: &MockServer) -> ytwatch::config::HubConfig {
    let mut config = test_config().hub;
    config.hub_url = format!("{}/subscribe", server.uri());
    config.callback_url = "https://alerts.example.com/alerts".to_string();
    config
}

#[tokio::test]
async fn test_subscribe_all_sends_one_request_per_channel() {
    let server = hub_server().await;
    let events = EventLog::new(10);
    let hub = HubSubscriber::new(hub_config(&server), events.clone()).unwrap();
    let directory = StreamerDirectory::from_pairs([("UC1", "One"), ("UC2", "Two")]);

    hub.subscribe_all(&directory).await;

    let bodies = wait_for_requests(&server, 2).await;
    assert!(bodies[0].contains("channel_id%3DUC1"));
    assert!(bodies[1].contains("channel_id%3DUC2"));
    assert!(bodies.iter().all(|b| b.contains("hub.mode=subscribe")));
    assert!(bodies.iter().all(|b| !b.contains("hub.verify_token")));
    assert!(events.snapshot().iter().all(|e| e.kind == EventKind::Subscribed));
}

#[tokio::test]
async fn test_secret_is_forwarded_when_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("hub.secret=s3cret"))
        .and(body_string_contains("hub.mode=unsubscribe"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = hub_config(&server);
    config.hub_url = server.uri();
    config.secret = Some("s3cret".to_string());
    let hub = HubSubscriber::new(config, EventLog::new(10)).unwrap();

    hub.send(HubMode::Unsubscribe, "UC1").await.unwrap();
}

#[tokio::test]
async fn test_app_subscribes_inline_directory_at_startup() {
    let server = hub_server().await;
    let mut config = test_config();
    config.hub = hub_config(&server);
    config.directory.streamers = vec![StreamerEntry {
        channel_id: "UC1".to_string(),
        name: "One".to_string(),
    }];

    let app = TestAppBuilder::new().with_config(config).start().await.unwrap();

    let bodies = wait_for_requests(&server, 1).await;
    assert!(bodies[0].contains("hub.callback=https%3A%2F%2Falerts.example.com%2Falerts"));
    assert!(bodies[0].contains("hub.verify=async"));

    app.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_directory_reload_follows_added_and_removed_channels() {
    // Arrange
    let server = hub_server().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("streamers.json");
    std::fs::write(&file, r#"[{"channel_id": "UC1", "name": "One"}]"#).unwrap();

    let mut config = test_config();
    config.hub = hub_config(&server);
    config.directory.streamers_file = Some(file.clone());
    config.directory.watch = true;
    let app = TestAppBuilder::new().with_config(config).start().await.unwrap();
    wait_for_requests(&server, 1).await;

    // Act
    std::fs::write(&file, r#"[{"channel_id": "UC2", "name": "Two"}]"#).unwrap();

    // Assert
    let bodies = wait_for_requests(&server, 3).await;
    assert!(bodies
        .iter()
        .any(|b| b.contains("hub.mode=subscribe") && b.contains("channel_id%3DUC2")));
    assert!(bodies
        .iter()
        .any(|b| b.contains("hub.mode=unsubscribe") && b.contains("channel_id%3DUC1")));

    app.shutdown(WAIT).await.unwrap();
}
