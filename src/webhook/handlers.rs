//! Request handlers for the hub callback route.

use super::WebhookState;
use crate::config::ChannelPolicy;
use crate::core::StreamAlert;
use crate::events::{AlertEvent, EventKind};
use crate::feed::{classify, parse_feed};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Url;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Extracts the channel id from a hub topic URL.
///
/// Accepts both `...videos.xml?channel_id=<id>` and `.../channel/<id>`.
pub fn channel_from_topic(topic: &str) -> Option<String> {
    let url = Url::parse(topic).ok()?;
    if let Some((_, id)) = url
        .query_pairs()
        .find(|(key, value)| key == "channel_id" && !value.trim().is_empty())
    {
        return Some(id.trim().to_string());
    }
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "channel")?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn accepts(policy: &ChannelPolicy, channel_id: &str) -> bool {
    match policy {
        ChannelPolicy::Open => true,
        ChannelPolicy::Strict { channel_id: expected } => expected == channel_id,
    }
}

/// Answers a hub verification request by echoing the challenge.
pub async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(mode), Some(challenge)) = (
        non_empty(&params, "hub.mode"),
        non_empty(&params, "hub.challenge"),
    ) else {
        return (StatusCode::BAD_REQUEST, "missing verification parameters").into_response();
    };

    let Some(channel_id) = params
        .get("hub.topic")
        .and_then(|topic| channel_from_topic(topic))
    else {
        warn!(topic = ?params.get("hub.topic"), "Verification with unparsable topic");
        return (StatusCode::BAD_REQUEST, "invalid topic").into_response();
    };

    if !accepts(&state.policy, &channel_id) {
        warn!(channel_id = %channel_id, "Verification for unexpected channel");
        return (StatusCode::NOT_FOUND, "unknown channel").into_response();
    }

    if let Some(directory) = &state.directory {
        if !directory.contains(&channel_id) {
            info!(channel_id = %channel_id, "Verification for channel missing from the directory");
        }
    }

    let lease = params.get("hub.lease_seconds").map(String::as_str).unwrap_or("-");
    info!(channel_id = %channel_id, mode, lease_seconds = lease, "Hub verification accepted");
    state
        .events
        .record(&channel_id, EventKind::Verified, Some(format!("{mode} lease={lease}")));
    metrics::counter!("hub_verifications_total", "mode" => mode.to_string()).increment(1);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        challenge.to_string(),
    )
        .into_response()
}

/// Parses a pushed Atom feed and dispatches one alert per entry.
pub async fn notify(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = classify(content_type, &body) {
        warn!(content_type = ?content_type, error = %e, "Rejected notification payload");
        metrics::counter!("notifications_rejected_total").increment(1);
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let entries = match parse_feed(&body) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Failed to parse notification feed");
            metrics::counter!("notifications_rejected_total").increment(1);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    debug!(entries = entries.len(), "Parsed notification feed");

    for entry in entries {
        if entry.channel_id.trim().is_empty() || entry.video_id.trim().is_empty() {
            warn!(
                channel_id = %entry.channel_id,
                video_id = %entry.video_id,
                "Skipping notification entry without channel or video id"
            );
            continue;
        }
        if !accepts(&state.policy, &entry.channel_id) {
            info!(channel_id = %entry.channel_id, "Ignoring notification for unexpected channel");
            continue;
        }

        let streamer_name = state
            .directory
            .as_ref()
            .and_then(|directory| directory.name_of(&entry.channel_id));
        info!(
            channel_id = %entry.channel_id,
            video_id = %entry.video_id,
            title = %entry.title,
            streamer = streamer_name.as_deref().unwrap_or("-"),
            "Received video notification"
        );
        state.events.record(
            &entry.channel_id,
            EventKind::Notified,
            Some(entry.video_id.clone()),
        );
        metrics::counter!("notifications_received_total").increment(1);

        let alert = StreamAlert::online(entry.channel_id, Some(entry.video_id))
            .with_streamer_name(streamer_name);
        let outcome = state.dispatcher.dispatch(alert).await;
        debug!(?outcome, "Dispatched alert");
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Any method other than GET and POST on the callback route.
pub async fn unsupported_method() -> Response {
    (StatusCode::BAD_REQUEST, "unsupported method").into_response()
}

/// Returns the recent-events ring buffer, oldest first.
pub async fn recent_events(State(state): State<WebhookState>) -> Json<Vec<AlertEvent>> {
    Json(state.events.snapshot())
}
