#![allow(dead_code)]
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use ytwatch::core::{AlertConsumer, StreamAlert};

/// An alert consumer that remembers every alert it receives.
#[derive(Clone, Default)]
pub struct RecordingConsumer {
    alerts: Arc<Mutex<Vec<StreamAlert>>>,
    notifier: Arc<Notify>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<StreamAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub async fn wait_for_count(&self, target: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notifier.notified();
                if self.alerts.lock().unwrap().len() >= target {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for alerts");
    }
}

#[async_trait]
impl AlertConsumer for RecordingConsumer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn consume(&self, alert: StreamAlert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert);
        self.notifier.notify_waiters();
        Ok(())
    }
}
