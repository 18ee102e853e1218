use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use ytwatch::{
    config::ChannelPolicy,
    directory::{DirectoryHandle, StreamerDirectory},
    events::{AlertEvent, EventKind, EventLog},
    webhook::{self, AlertDispatcher, WebhookState},
};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{feeds::atom_feed, recording_consumer::RecordingConsumer};

const TOPIC_UC1: &str =
    "https%3A%2F%2Fwww.youtube.com%2Fxml%2Ffeeds%2Fvideos.xml%3Fchannel_id%3DUC1";
const BODY_LIMIT: usize = 16 * 1024;

struct Harness {
    router: Router,
    consumer: RecordingConsumer,
    events: EventLog,
}

fn harness(policy: ChannelPolicy) -> Harness {
    let consumer = RecordingConsumer::new();
    let events = EventLog::new(50);
    let directory = DirectoryHandle::fixed(StreamerDirectory::from_pairs([("UC1", "Streamer One")]));
    let state = WebhookState {
        dispatcher: AlertDispatcher::immediate(Arc::new(consumer.clone()), events.clone()),
        directory: Some(directory),
        policy,
        events: events.clone(),
    };
    Harness {
        router: webhook::router(state, "/alerts", BODY_LIMIT),
        consumer,
        events,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_atom(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/alerts")
        .header(header::CONTENT_TYPE, "application/atom+xml")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_verification_echoes_challenge() {
    let h = harness(ChannelPolicy::Open);
    let uri = format!("/alerts?hub.mode=subscribe&hub.challenge=abc123&hub.topic={TOPIC_UC1}&hub.lease_seconds=432000");

    let response = h.router.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"abc123");

    let recorded = h.events.snapshot();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind, EventKind::Verified);
    assert_eq!(recorded[0].channel_id, "UC1");
}

#[tokio::test]
async fn test_verification_accepts_channel_path_topic() {
    let h = harness(ChannelPolicy::Open);
    let uri = "/alerts?hub.mode=subscribe&hub.challenge=xyz&hub.topic=https%3A%2F%2Fwww.youtube.com%2Fchannel%2FUC7";

    let (status, body) = send(&h.router, get(uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "xyz");
}

#[tokio::test]
async fn test_verification_without_challenge_is_rejected() {
    let h = harness(ChannelPolicy::Open);

    let (status, _) = send(&h.router, get(&format!("/alerts?hub.mode=subscribe&hub.topic={TOPIC_UC1}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, get("/alerts?hub.mode=subscribe&hub.challenge=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&h.router, get("/alerts")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "missing verification parameters");
}

#[tokio::test]
async fn test_verification_with_unparsable_topic_is_rejected() {
    let h = harness(ChannelPolicy::Open);

    let (status, _) = send(&h.router, get("/alerts?hub.mode=subscribe&hub.challenge=abc&hub.topic=garbage")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, get("/alerts?hub.mode=subscribe&hub.challenge=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_strict_policy_rejects_other_channels() {
    let h = harness(ChannelPolicy::Strict {
        channel_id: "UC2".to_string(),
    });

    let uri = format!("/alerts?hub.mode=subscribe&hub.challenge=abc&hub.topic={TOPIC_UC1}");
    let (status, _) = send(&h.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let matching = "/alerts?hub.mode=subscribe&hub.challenge=abc&hub.topic=https%3A%2F%2Fwww.youtube.com%2Fxml%2Ffeeds%2Fvideos.xml%3Fchannel_id%3DUC2";
    let (status, body) = send(&h.router, get(matching)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "abc");

    // Notifications for other channels are ignored but still acknowledged.
    let (status, _) = send(&h.router, post_atom(atom_feed(&[("vid1", "UC1"), ("vid2", "UC2")]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let alerts = h.consumer.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].channel_id, "UC2");
}

#[tokio::test]
async fn test_notification_dispatches_one_alert_per_entry() {
    let h = harness(ChannelPolicy::Open);

    let (status, _) = send(&h.router, post_atom(atom_feed(&[("vid1", "UC1"), ("vid9", "UC9")]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let alerts = h.consumer.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].channel_id, "UC1");
    assert_eq!(alerts[0].stream_id.as_deref(), Some("vid1"));
    assert!(alerts[0].status.is_online());
    assert_eq!(alerts[0].streamer_name.as_deref(), Some("Streamer One"));
    // Unknown channels are forwarded without a name.
    assert_eq!(alerts[1].channel_id, "UC9");
    assert_eq!(alerts[1].streamer_name, None);
}

#[tokio::test]
async fn test_notification_skips_entries_without_ids() {
    let h = harness(ChannelPolicy::Open);
    let body = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:yt="http://www.youtube.com/xml/schemas/2015">
  <entry><yt:videoId>vid1</yt:videoId></entry>
  <entry><yt:videoId>vid2</yt:videoId><yt:channelId>UC1</yt:channelId></entry>
</feed>"#;

    let (status, _) = send(&h.router, post_atom(body)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let alerts = h.consumer.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].stream_id.as_deref(), Some("vid2"));
}

#[tokio::test]
async fn test_notification_sniffs_xml_without_content_type() {
    let h = harness(ChannelPolicy::Open);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/alerts")
        .body(Body::from(atom_feed(&[("vid1", "UC1")])))
        .unwrap();

    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(h.consumer.alerts().len(), 1);
}

#[tokio::test]
async fn test_unsupported_and_malformed_payloads_are_rejected() {
    let h = harness(ChannelPolicy::Open);

    let json = Request::builder()
        .method(Method::POST)
        .uri("/alerts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"hello": "world"}"#))
        .unwrap();
    let (status, _) = send(&h.router, json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, post_atom("<feed><entry></feed>")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.consumer.alerts().is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let h = harness(ChannelPolicy::Open);
    let padding = "x".repeat(BODY_LIMIT * 2);
    let body = format!("<feed><title>{padding}</title></feed>");

    let (status, _) = send(&h.router, post_atom(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_other_methods_are_rejected() {
    let h = harness(ChannelPolicy::Open);
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/alerts")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_events_route_lists_recent_events() {
    let h = harness(ChannelPolicy::Open);
    send(&h.router, post_atom(atom_feed(&[("vid1", "UC1")]))).await;

    let (status, body) = send(&h.router, get("/events")).await;
    assert_eq!(status, StatusCode::OK);
    let events: Vec<AlertEvent> = serde_json::from_str(&body).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Notified);
    assert_eq!(events[0].detail.as_deref(), Some("vid1"));
}

#[tokio::test]
async fn test_queued_delivery_reaches_consumer() {
    let consumer = RecordingConsumer::new();
    let events = EventLog::new(10);
    let (dispatcher, drain) = AlertDispatcher::queued(Arc::new(consumer.clone()), 4, events.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let drain_task = tokio::spawn(drain.run(shutdown_rx));
    let state = WebhookState {
        dispatcher,
        directory: None,
        policy: ChannelPolicy::Open,
        events,
    };
    let router = webhook::router(state, "/alerts", BODY_LIMIT);

    let (status, _) = send(&router, post_atom(atom_feed(&[("vid1", "UC1")]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    consumer.wait_for_count(1, Duration::from_secs(2)).await;

    shutdown_tx.send(true).unwrap();
    drain_task.await.unwrap();
}
