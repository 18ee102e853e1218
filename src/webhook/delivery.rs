//! Hands parsed alerts to the alert consumer, either inline or through a
//! bounded queue drained by a background task.

use crate::core::{AlertConsumer, StreamAlert};
use crate::events::{EventKind, EventLog};
use async_channel::{Receiver, Sender, TrySendError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What happened to a dispatched alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The consumer was invoked inline.
    Delivered,
    /// The alert is waiting in the queue.
    Queued,
    /// The queue was full and the alert was discarded.
    Dropped,
}

#[derive(Clone)]
enum Mode {
    Immediate(Arc<dyn AlertConsumer>),
    Queued(Sender<StreamAlert>),
}

/// Routes alerts from the webhook to an `AlertConsumer`.
#[derive(Clone)]
pub struct AlertDispatcher {
    mode: Mode,
    events: EventLog,
}

impl AlertDispatcher {
    /// A dispatcher that awaits the consumer inside the request handler.
    pub fn immediate(consumer: Arc<dyn AlertConsumer>, events: EventLog) -> Self {
        Self {
            mode: Mode::Immediate(consumer),
            events,
        }
    }

    /// A dispatcher backed by a bounded queue of `capacity` alerts.
    ///
    /// The returned `AlertDrain` must be run for queued alerts to reach the
    /// consumer.
    pub fn queued(
        consumer: Arc<dyn AlertConsumer>,
        capacity: usize,
        events: EventLog,
    ) -> (Self, AlertDrain) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let dispatcher = Self {
            mode: Mode::Queued(tx),
            events,
        };
        (dispatcher, AlertDrain { rx, consumer })
    }

    pub async fn dispatch(&self, alert: StreamAlert) -> DispatchOutcome {
        match &self.mode {
            Mode::Immediate(consumer) => {
                if let Err(e) = consumer.consume(alert).await {
                    error!(consumer = consumer.name(), error = %e, "Alert consumer failed");
                }
                DispatchOutcome::Delivered
            }
            Mode::Queued(tx) => match tx.try_send(alert) {
                Ok(()) => {
                    metrics::gauge!("alert_queue_depth").set(tx.len() as f64);
                    DispatchOutcome::Queued
                }
                Err(TrySendError::Full(alert)) => {
                    warn!(channel_id = %alert.channel_id, "Alert queue full, dropping alert");
                    metrics::counter!("alerts_dropped_total").increment(1);
                    self.events.record(
                        &alert.channel_id,
                        EventKind::Dropped,
                        Some("queue full".to_string()),
                    );
                    DispatchOutcome::Dropped
                }
                Err(TrySendError::Closed(alert)) => {
                    warn!(channel_id = %alert.channel_id, "Alert queue closed, dropping alert");
                    metrics::counter!("alerts_dropped_total").increment(1);
                    self.events.record(
                        &alert.channel_id,
                        EventKind::Dropped,
                        Some("queue closed".to_string()),
                    );
                    DispatchOutcome::Dropped
                }
            },
        }
    }

    /// Number of alerts waiting in the queue. Always zero in immediate mode.
    pub fn queued_len(&self) -> usize {
        match &self.mode {
            Mode::Immediate(_) => 0,
            Mode::Queued(tx) => tx.len(),
        }
    }
}

/// The consuming end of a queued dispatcher.
pub struct AlertDrain {
    rx: Receiver<StreamAlert>,
    consumer: Arc<dyn AlertConsumer>,
}

impl AlertDrain {
    /// Returns a future that feeds queued alerts to the consumer until a
    /// shutdown signal is received or every sender is gone.
    pub fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> impl Future<Output = ()> {
        async move {
            info!(consumer = self.consumer.name(), "Alert drain started.");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Alert drain received shutdown signal.");
                        break;
                    }
                    received = self.rx.recv() => {
                        let Ok(alert) = received else {
                            debug!("Alert queue closed.");
                            break;
                        };
                        metrics::gauge!("alert_queue_depth").set(self.rx.len() as f64);
                        if let Err(e) = self.consumer.consume(alert).await {
                            error!(consumer = self.consumer.name(), error = %e, "Alert consumer failed");
                        }
                    }
                }
            }
            info!("Alert drain finished.");
        }
    }
}
