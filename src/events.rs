//! In-memory ring buffer of recent alert and lifecycle events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What happened to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Verified,
    Notified,
    WatchStarted,
    WatchEnded,
    Subscribed,
    Unsubscribed,
    SubscriptionFailed,
    Dropped,
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// RFC 3339 timestamp of when the event was recorded.
    pub timestamp: String,
    pub channel_id: String,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A bounded, cloneable event log. The oldest event is evicted once full.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<Mutex<VecDeque<AlertEvent>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn record(&self, channel_id: &str, kind: EventKind, detail: Option<String>) {
        if self.capacity == 0 {
            return;
        }
        let event = AlertEvent {
            timestamp: Utc::now().to_rfc3339(),
            channel_id: channel_id.to_string(),
            kind,
            detail,
        };
        let mut events = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns a copy of the buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<AlertEvent> {
        let events = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(200)
    }
}
