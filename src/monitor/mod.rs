//! The poll monitor.
//!
//! The monitor owns the set of actively watched channels. Every watch runs an
//! independent poll loop that keeps asking the live status checker whether
//! the stream is still running, until it reports the stream has ended or the
//! watch is cancelled.

pub mod ticker;

use crate::{
    core::{AlertConsumer, LiveStatus, LiveStatusChecker, StreamAlert, WatchTarget},
    events::{EventKind, EventLog},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use ticker::{IntervalTickSource, TickSource, Ticker};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("stream alert is missing a channel id")]
    MissingChannelId,
}

/// Why a poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    NotLive,
    Cancelled,
}

/// A live, cancellable watch on one channel.
struct Watch {
    token: CancellationToken,
    /// Distinguishes successive watches on the same channel.
    generation: u64,
    /// An online alert suppressed while the current check was in flight.
    pending: Option<StreamAlert>,
}

/// Tracks live channels and runs one poll loop per watched channel.
///
/// Cloning is cheap; clones share the same set of watches.
#[derive(Clone)]
pub struct PollMonitor {
    checker: Arc<dyn LiveStatusChecker>,
    tick_source: Arc<dyn TickSource>,
    interval: Duration,
    root: CancellationToken,
    watches: Arc<Mutex<HashMap<String, Watch>>>,
    next_generation: Arc<AtomicU64>,
    events: EventLog,
}

impl PollMonitor {
    /// Creates a monitor that polls on wall-clock intervals.
    pub fn new(checker: Arc<dyn LiveStatusChecker>, interval: Duration) -> Self {
        Self::with_tick_source(checker, interval, Arc::new(IntervalTickSource))
    }

    /// Creates a monitor using a custom tick source.
    pub fn with_tick_source(
        checker: Arc<dyn LiveStatusChecker>,
        interval: Duration,
        tick_source: Arc<dyn TickSource>,
    ) -> Self {
        Self {
            checker,
            tick_source,
            interval,
            root: CancellationToken::new(),
            watches: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            events: EventLog::new(0),
        }
    }

    /// Binds every watch to a child of `root`, so cancelling `root` ends all of them.
    pub fn with_root_token(mut self, root: CancellationToken) -> Self {
        self.root = root;
        self
    }

    /// Records watch lifecycle transitions into `events`.
    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Handles one stream alert.
    ///
    /// A non-online alert cancels the channel's watch if there is one. An
    /// online alert starts a watch unless the channel is already watched.
    pub fn handle(&self, alert: StreamAlert) -> Result<(), MonitorError> {
        if alert.channel_id.is_empty() {
            return Err(MonitorError::MissingChannelId);
        }

        if !alert.status.is_online() {
            let removed = {
                let mut watches = self.lock_watches();
                let removed = watches.remove(&alert.channel_id);
                self.publish_gauge(watches.len());
                removed
            };
            match removed {
                Some(watch) => {
                    watch.token.cancel();
                    info!(channel_id = %alert.channel_id, status = %alert.status, "Watch cancelled by status alert");
                    self.events.record(
                        &alert.channel_id,
                        EventKind::WatchEnded,
                        Some(format!("status {}", alert.status)),
                    );
                }
                None => {
                    debug!(channel_id = %alert.channel_id, status = %alert.status, "No watch to cancel");
                }
            }
            return Ok(());
        }

        let (token, generation) = {
            let mut watches = self.lock_watches();
            if let Some(watch) = watches.get_mut(&alert.channel_id) {
                debug!(channel_id = %alert.channel_id, "Channel already watched, ignoring duplicate online alert");
                watch.pending = Some(alert);
                return Ok(());
            }
            let token = self.root.child_token();
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            watches.insert(
                alert.channel_id.clone(),
                Watch {
                    token: token.clone(),
                    generation,
                    pending: None,
                },
            );
            self.publish_gauge(watches.len());
            (token, generation)
        };

        info!(
            channel_id = %alert.channel_id,
            stream_id = ?alert.stream_id,
            streamer = ?alert.streamer_name,
            "Watch started"
        );
        self.events
            .record(&alert.channel_id, EventKind::WatchStarted, alert.stream_id.clone());

        let ticker = self.tick_source.ticker(self.interval);
        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.run_watch(alert.target(), token, generation, ticker).await;
        });
        Ok(())
    }

    /// Returns the number of channels currently watched.
    pub fn active_watchers(&self) -> usize {
        self.lock_watches().len()
    }

    /// Returns `true` if the channel currently has a watch.
    pub fn is_watching(&self, channel_id: &str) -> bool {
        self.lock_watches().contains_key(channel_id)
    }

    /// Cancels every active watch.
    pub fn stop_all(&self) {
        let drained: Vec<(String, Watch)> = {
            let mut watches = self.lock_watches();
            let drained = watches.drain().collect();
            self.publish_gauge(0);
            drained
        };
        if !drained.is_empty() {
            info!("Stopping {} active watches", drained.len());
        }
        for (channel_id, watch) in drained {
            watch.token.cancel();
            debug!(channel_id = %channel_id, "Watch cancelled by shutdown");
        }
    }

    async fn run_watch(
        self,
        target: WatchTarget,
        token: CancellationToken,
        generation: u64,
        mut ticker: Box<dyn Ticker>,
    ) {
        let reason = self.poll(&target, generation, &token, ticker.as_mut()).await;
        ticker.stop();

        let removed = self.remove_if_current(&target.channel_id, generation);
        match reason {
            EndReason::NotLive => {
                info!(channel_id = %target.channel_id, "Stream is no longer live, watch ended");
                let Some(watch) = removed else { return };
                self.events.record(
                    &target.channel_id,
                    EventKind::WatchEnded,
                    Some("stream ended".to_string()),
                );
                // The final check may predate a stream that started while it ran.
                if let Some(alert) = watch.pending {
                    info!(channel_id = %target.channel_id, "Online alert arrived during the final check, watching again");
                    if let Err(e) = self.handle(alert) {
                        warn!(channel_id = %target.channel_id, error = %e, "Failed to restart watch");
                    }
                }
            }
            EndReason::Cancelled => {
                debug!(channel_id = %target.channel_id, "Poll loop cancelled");
            }
        }
    }

    /// Checks once immediately, then on every tick, until the stream ends or
    /// the watch is cancelled.
    async fn poll(
        &self,
        target: &WatchTarget,
        generation: u64,
        token: &CancellationToken,
        ticker: &mut dyn Ticker,
    ) -> EndReason {
        if let Some(reason) = self.check_once(target, generation, token).await {
            return reason;
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return EndReason::Cancelled,
                _ = ticker.tick() => {}
            }

            if let Some(reason) = self.check_once(target, generation, token).await {
                return reason;
            }
        }
    }

    /// Runs a single check. Returns `Some` when the loop must end.
    async fn check_once(
        &self,
        target: &WatchTarget,
        generation: u64,
        token: &CancellationToken,
    ) -> Option<EndReason> {
        self.clear_pending(&target.channel_id, generation);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Some(EndReason::Cancelled),
            result = self.checker.check(target) => result,
        };

        if token.is_cancelled() {
            return Some(EndReason::Cancelled);
        }

        match result {
            Ok(LiveStatus::Live) => {
                debug!(channel_id = %target.channel_id, "Stream still live");
                None
            }
            Ok(LiveStatus::NotLive) => Some(EndReason::NotLive),
            Err(e) => {
                metrics::counter!("checker_errors_total").increment(1);
                warn!(channel_id = %target.channel_id, error = %e, "Live status check failed, will retry on next tick");
                None
            }
        }
    }

    /// Only online alerts received during the last check count as pending.
    fn clear_pending(&self, channel_id: &str, generation: u64) {
        if let Some(watch) = self.lock_watches().get_mut(channel_id) {
            if watch.generation == generation {
                watch.pending = None;
            }
        }
    }

    fn remove_if_current(&self, channel_id: &str, generation: u64) -> Option<Watch> {
        let mut watches = self.lock_watches();
        let is_current = watches
            .get(channel_id)
            .is_some_and(|watch| watch.generation == generation);
        if !is_current {
            return None;
        }
        let removed = watches.remove(channel_id);
        self.publish_gauge(watches.len());
        removed
    }

    fn lock_watches(&self) -> MutexGuard<'_, HashMap<String, Watch>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish_gauge(&self, count: usize) {
        metrics::gauge!("active_watchers").set(count as f64);
    }
}

#[async_trait]
impl AlertConsumer for PollMonitor {
    fn name(&self) -> &str {
        "poll_monitor"
    }

    async fn consume(&self, alert: StreamAlert) -> anyhow::Result<()> {
        self.handle(alert)?;
        Ok(())
    }
}
