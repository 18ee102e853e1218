//! Streamer directory
//!
//! A read-only mapping from YouTube channel id to a display name. The
//! directory is loaded from a JSON streamer list and can be hot-reloaded when
//! the file changes; a reload swaps the whole snapshot and reports which
//! channels were added or removed so hub subscriptions can follow.

use crate::config::StreamerEntry;
use crate::task_manager::TaskManager;
use arc_swap::ArcSwap;
use notify::{event::EventKind, Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("failed to read streamer list {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse streamer list {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct StreamerRecord {
    #[serde(alias = "channelId")]
    channel_id: String,
    #[serde(default, alias = "display_name")]
    name: String,
}

/// An immutable snapshot of known channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamerDirectory {
    names: HashMap<String, String>,
}

impl StreamerDirectory {
    /// Builds a directory from `(channel_id, name)` pairs. Blank channel ids are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let names = pairs
            .into_iter()
            .map(|(id, name)| (id.into().trim().to_string(), name.into()))
            .filter(|(id, _)| !id.is_empty())
            .collect();
        Self { names }
    }

    pub fn from_entries(entries: &[StreamerEntry]) -> Self {
        Self::from_pairs(entries.iter().map(|e| (e.channel_id.clone(), e.name.clone())))
    }

    /// Parses a JSON array of `{"channel_id": "...", "name": "..."}` records.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let records: Vec<StreamerRecord> = serde_json::from_slice(bytes)?;
        Ok(Self::from_pairs(
            records.into_iter().map(|r| (r.channel_id, r.name)),
        ))
    }

    pub async fn load(path: &Path) -> Result<Self, DirectoryError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&bytes).map_err(|source| DirectoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the display name for a channel, if known and non-empty.
    pub fn name_of(&self, channel_id: &str) -> Option<&str> {
        self.names
            .get(channel_id)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.names.contains_key(channel_id)
    }

    /// Channel ids in a stable order.
    pub fn channel_ids(&self) -> Vec<String> {
        let ids: BTreeSet<&String> = self.names.keys().collect();
        ids.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Computes which channels appear in `newer` but not here, and vice versa.
    pub fn diff(&self, newer: &StreamerDirectory) -> DirectoryDiff {
        let old: BTreeSet<&String> = self.names.keys().collect();
        let new: BTreeSet<&String> = newer.names.keys().collect();
        DirectoryDiff {
            added: new.difference(&old).map(|s| s.to_string()).collect(),
            removed: old.difference(&new).map(|s| s.to_string()).collect(),
        }
    }
}

/// Channels added to and removed from the directory by a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl DirectoryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Shared, atomically swappable access to the current directory snapshot.
#[derive(Clone)]
pub struct DirectoryHandle {
    current: Arc<ArcSwap<StreamerDirectory>>,
    path: Option<PathBuf>,
}

impl DirectoryHandle {
    /// A handle over a snapshot that never changes.
    pub fn fixed(directory: StreamerDirectory) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(directory)),
            path: None,
        }
    }

    /// Loads the streamer list at `path`.
    pub async fn from_file(path: PathBuf) -> Result<Self, DirectoryError> {
        let directory = StreamerDirectory::load(&path).await?;
        info!(path = ?path, channels = directory.len(), "Loaded streamer directory");
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(directory)),
            path: Some(path),
        })
    }

    pub fn snapshot(&self) -> Arc<StreamerDirectory> {
        self.current.load_full()
    }

    /// Resolves a channel's display name from the current snapshot.
    pub fn name_of(&self, channel_id: &str) -> Option<String> {
        self.current.load().name_of(channel_id).map(str::to_string)
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.current.load().contains(channel_id)
    }

    /// Re-reads the streamer list and swaps it in.
    ///
    /// On failure the previous snapshot stays in place. A handle without a
    /// backing file always reports an empty diff.
    pub async fn reload(&self) -> Result<DirectoryDiff, DirectoryError> {
        let Some(path) = &self.path else {
            return Ok(DirectoryDiff::default());
        };
        let newer = Arc::new(StreamerDirectory::load(path).await?);
        let previous = self.current.swap(newer.clone());
        Ok(previous.diff(&newer))
    }

    /// Watches the backing file and reloads on change.
    ///
    /// Every non-empty diff is sent on the returned channel. Returns `None`
    /// when the handle has no backing file.
    pub fn watch(&self, task_manager: &TaskManager) -> anyhow::Result<Option<mpsc::Receiver<DirectoryDiff>>> {
        let Some(path) = self.path.clone() else {
            return Ok(None);
        };
        let path = std::fs::canonicalize(&path).unwrap_or(path);
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if let Err(e) = event_tx.blocking_send(event) {
                        debug!("Directory watcher channel closed: {}", e);
                    }
                }
            },
            Config::default(),
        )?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        info!(path = ?path, "Watching streamer directory for changes");

        let (diff_tx, diff_rx) = mpsc::channel(16);
        let handle = self.clone();
        let mut shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("DirectoryWatcher", async move {
            // Keep the watcher alive for as long as the task runs.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Directory watcher received shutdown signal.");
                        break;
                    }
                    maybe_event = event_rx.recv() => {
                        let Some(event) = maybe_event else { break };
                        if !touches(&event, &path) {
                            continue;
                        }
                        match handle.reload().await {
                            Ok(diff) if diff.is_empty() => {
                                debug!("Streamer directory reloaded without channel changes");
                            }
                            Ok(diff) => {
                                info!(
                                    added = diff.added.len(),
                                    removed = diff.removed.len(),
                                    "Streamer directory reloaded"
                                );
                                if diff_tx.send(diff).await.is_err() {
                                    warn!("Directory diff receiver dropped");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to reload streamer directory, keeping previous snapshot");
                            }
                        }
                    }
                }
            }
            info!("Directory watcher finished.");
        });

        Ok(Some(diff_rx))
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event
            .paths
            .iter()
            .any(|p| p == path || (p.file_name().is_some() && p.file_name() == path.file_name())),
        _ => false,
    }
}
