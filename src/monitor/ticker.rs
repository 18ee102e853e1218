//! Tick sources driving the poll loops.
//!
//! Production code uses [`IntervalTickSource`]. Tests inject a
//! [`ManualTickSource`] to drive poll loops deterministically.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// A stream of tick signals for one poll loop.
#[async_trait]
pub trait Ticker: Send {
    /// Waits for the next tick.
    async fn tick(&mut self);

    /// Stops the ticker. Pending and future `tick` calls never complete.
    fn stop(&mut self);
}

/// Creates tickers for new watches.
pub trait TickSource: Send + Sync {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// Wall-clock tick source backed by `tokio::time::interval`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalTickSource;

impl TickSource for IntervalTickSource {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(IntervalTicker::new(period))
    }
}

/// A ticker whose first tick fires one full period after creation.
pub struct IntervalTicker {
    interval: Option<Interval>,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(interval),
        }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn stop(&mut self) {
        self.interval = None;
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::{ManualTickSource, ManualTicker};

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::{TickSource, Ticker};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// A tick source driven by [`ManualTickSource::advance`].
    ///
    /// Every ticker created from the source receives every tick sent after
    /// its creation.
    #[derive(Clone)]
    pub struct ManualTickSource {
        tx: broadcast::Sender<()>,
    }

    impl ManualTickSource {
        pub fn new() -> Self {
            let (tx, _) = broadcast::channel(64);
            Self { tx }
        }

        /// Sends one tick to every live ticker.
        pub fn advance(&self) {
            let _ = self.tx.send(());
        }

        /// Number of tickers that have not been stopped or dropped.
        pub fn active_tickers(&self) -> usize {
            self.tx.receiver_count()
        }
    }

    impl Default for ManualTickSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TickSource for ManualTickSource {
        fn ticker(&self, _period: Duration) -> Box<dyn Ticker> {
            Box::new(ManualTicker {
                rx: Some(self.tx.subscribe()),
            })
        }
    }

    pub struct ManualTicker {
        rx: Option<broadcast::Receiver<()>>,
    }

    #[async_trait]
    impl Ticker for ManualTicker {
        async fn tick(&mut self) {
            match self.rx.as_mut() {
                Some(rx) => match rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        std::future::pending::<()>().await
                    }
                },
                None => std::future::pending::<()>().await,
            }
        }

        fn stop(&mut self) {
            self.rx = None;
        }
    }
}
