//! File system watching for incremental re-indexing.
//!
//! notify events are converted to [`FileChange`]s, coalesced per path in a
//! [`ChangeQueue`] and handed to the project's indexer once they have been
//! quiet for the debounce window.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::db::IndexStore;
use crate::indexer::ScanMode;
use crate::registry::SharedIndexer;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("not a directory: {0}")]
    InvalidRoot(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Turn one notify event into per-path changes. Directories and access
/// events are dropped.
fn convert_event(event: &Event) -> Vec<FileChange> {
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Any | EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter(|p| !p.is_dir())
        .map(|path| {
            // a rename reports both ends as Modify
            let kind = if kind == ChangeKind::Modified && !path.exists() {
                ChangeKind::Removed
            } else {
                kind
            };
            FileChange {
                path: path.clone(),
                kind,
            }
        })
        .collect()
}

// ── Queue ────────────────────────────────────────────────────────────

/// Debounce + coalesce. One entry per path; the latest event for a path
/// replaces the earlier one and restarts its quiet period.
#[derive(Debug)]
pub struct ChangeQueue {
    debounce: Duration,
    capacity: usize,
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
    overflowed: bool,
}

impl ChangeQueue {
    pub fn new(debounce: Duration, capacity: usize) -> Self {
        Self {
            debounce,
            capacity: capacity.max(1),
            pending: HashMap::new(),
            overflowed: false,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(Duration::from_millis(config.debounce_ms), config.queue_capacity)
    }

    /// Returns false when the queue is full and the change was dropped.
    pub fn push(&mut self, change: FileChange, now: Instant) -> bool {
        if !self.pending.contains_key(&change.path) && self.pending.len() >= self.capacity {
            self.overflowed = true;
            return false;
        }
        self.pending.insert(change.path, (change.kind, now));
        true
    }

    /// Changes whose quiet period has elapsed, sorted by path.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<FileChange> {
        let debounce = self.debounce;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        let mut changes: Vec<FileChange> = ready
            .into_iter()
            .filter_map(|path| {
                let (kind, _) = self.pending.remove(&path)?;
                Some(FileChange { path, kind })
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    /// When the oldest pending change becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(_, seen)| *seen + self.debounce).min()
    }

    /// Whether changes were dropped since the last call. Resets the flag.
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ── Re-entrancy guard ────────────────────────────────────────────────

/// At most one run in flight; a trigger while busy is a no-op.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard on drop.
#[derive(Debug)]
pub struct RunTicket {
    running: Arc<AtomicBool>,
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl RunGuard {
    pub fn try_begin(&self) -> Option<RunTicket> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunTicket {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

// ── notify adapter ───────────────────────────────────────────────────

pub struct FileWatcher {
    rx: mpsc::Receiver<FileChange>,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `root` recursively.
    pub fn new(root: &Path, capacity: usize) -> Result<Self, WatchError> {
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.to_path_buf()));
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for change in convert_event(&event) {
                    if let Err(e) = tx.blocking_send(change) {
                        error!("Failed to forward change event: {e}");
                    }
                }
            }
            Err(e) => warn!("Watcher error: {e}"),
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching {}", root.display());
        Ok(Self { rx, _watcher: watcher })
    }

    pub async fn next(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }
}

/// Feed debounced changes into `indexer` until `cancel` fires.
///
/// Queue overflow falls back to an incremental full scan. Runs are spawned
/// behind a [`RunGuard`]; ready changes wait in the queue while one is in
/// flight.
pub async fn watch_project<S: IndexStore + 'static>(
    indexer: SharedIndexer<S>,
    mut watcher: FileWatcher,
    config: &WatchConfig,
    cancel: CancellationToken,
) {
    let mut queue = ChangeQueue::from_config(config);
    let guard = RunGuard::default();
    let idle = Duration::from_secs(3600);
    let retry = Duration::from_millis(config.debounce_ms.max(50));

    loop {
        let now = Instant::now();
        let deadline = if guard.is_running() {
            now + retry
        } else {
            queue.next_deadline().unwrap_or(now + idle).max(now)
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Watcher stopping");
                break;
            }
            change = watcher.next() => match change {
                Some(change) => {
                    debug!("Change {:?} {}", change.kind, change.path.display());
                    queue.push(change, Instant::now());
                }
                None => break,
            },
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                let overflow = queue.take_overflow();
                let ready = queue.drain_ready(Instant::now());
                if !overflow && ready.is_empty() {
                    continue;
                }
                let Some(ticket) = guard.try_begin() else {
                    for change in ready {
                        queue.push(change, Instant::now());
                    }
                    continue;
                };
                let indexer = indexer.clone();
                tokio::spawn(async move {
                    let _ticket = ticket;
                    let mut indexer = indexer.lock().await;
                    let report = if overflow {
                        warn!("Change queue overflowed, rescanning");
                        indexer.scan(ScanMode::Incremental).await
                    } else {
                        let paths: Vec<PathBuf> = ready.into_iter().map(|c| c.path).collect();
                        indexer.index_paths(&paths).await
                    };
                    debug!(
                        "Watch run: {} indexed, {} pruned, success {}",
                        report.stats.indexed, report.stats.pruned, report.success
                    );
                });
            }
        }
    }
}
