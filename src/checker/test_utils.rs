use crate::{
    checker::CheckerError,
    core::{LiveStatus, LiveStatusChecker, WatchTarget},
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Fake live status checker for testing.
///
/// Responses are queued per channel. Once a channel's queue is empty the
/// default status is returned.
#[derive(Clone)]
pub struct FakeChecker {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<LiveStatus, String>>>>>,
    default_status: Arc<Mutex<LiveStatus>>,
    call_count: Arc<Mutex<HashMap<String, u32>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    called: Arc<Notify>,
}

impl FakeChecker {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_status: Arc::new(Mutex::new(LiveStatus::Live)),
            call_count: Arc::new(Mutex::new(HashMap::new())),
            delay: Arc::new(Mutex::new(None)),
            called: Arc::new(Notify::new()),
        }
    }

    /// Sets the status returned when no queued response remains.
    pub fn set_default(&self, status: LiveStatus) {
        *self.default_status.lock().unwrap() = status;
    }

    /// Makes every check sleep before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Queues a status for a channel.
    pub fn push_status(&self, channel_id: &str, status: LiveStatus) {
        self.responses
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push_back(Ok(status));
    }

    /// Queues a transient error for a channel.
    pub fn push_error(&self, channel_id: &str, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push_back(Err(error.to_string()));
    }

    /// Returns the number of checks started for a channel.
    pub fn call_count(&self, channel_id: &str) -> u32 {
        self.call_count
            .lock()
            .unwrap()
            .get(channel_id)
            .copied()
            .unwrap_or(0)
    }

    /// Waits until at least `target` checks were started for a channel.
    pub async fn wait_for_calls(&self, channel_id: &str, target: u32, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.called.notified();
                if self.call_count(channel_id) >= target {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for live status checks");
    }
}

impl Default for FakeChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveStatusChecker for FakeChecker {
    async fn check(&self, target: &WatchTarget) -> Result<LiveStatus, CheckerError> {
        {
            let mut call_count = self.call_count.lock().unwrap();
            *call_count.entry(target.channel_id.clone()).or_insert(0) += 1;
        }
        self.called.notify_waiters();

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&target.channel_id)
            .and_then(|queue| queue.pop_front());
        match queued {
            Some(Ok(status)) => Ok(status),
            Some(Err(error)) => Err(CheckerError::Transport(error)),
            None => Ok(*self.default_status.lock().unwrap()),
        }
    }
}
