//! Lifecycle of every background task the service spawns.
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::utils::heartbeat::run_heartbeat;

type NamedHandle = (&'static str, JoinHandle<()>);

/// Spawns named tasks, hands out the shared shutdown signal and waits for
/// everything to finish on shutdown.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a task and tracks its handle under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    /// Spawns a task together with a heartbeat of the same name.
    pub fn spawn_with_heartbeat<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(name, future);
        self.spawn("Heartbeat", run_heartbeat(name, self.get_shutdown_rx()));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Number of tracked tasks that have not been awaited yet.
    pub fn task_count(&self) -> usize {
        self.lock_handles().len()
    }

    /// Waits for all tracked tasks, aborting any still running after `grace`.
    pub async fn shutdown(self, grace: Duration) {
        let handles: Vec<NamedHandle> = self.lock_handles().drain(..).collect();
        info!(tasks = handles.len(), "TaskManager shutting down, waiting for tasks");

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let aborters: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();
        let joined = join_all(handles.into_iter().map(|(_, handle)| handle));

        let results = match tokio::time::timeout(grace, joined).await {
            Ok(results) => results,
            Err(_) => {
                warn!(grace = ?grace, "Tasks did not finish in time, aborting");
                for aborter in &aborters {
                    aborter.abort();
                }
                return;
            }
        };

        let mut panicked = Vec::new();
        for (name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                Err(e) if e.is_cancelled() => debug!(task_name = name, "Task was cancelled."),
                Err(_) => {
                    error!(task_name = name, "Task panicked during shutdown.");
                    panicked.push(name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(tasks = ?panicked, "{} tasks panicked during shutdown", panicked.len());
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<NamedHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}
