//! Watch Mode
//!
//! Monitors the local layers root for filesystem changes and requests a
//! re-merge for every settled burst of events. Notification delivery never
//! waits on a merge: the notify callback only forwards into a channel, and
//! the merge itself runs on the [`MergeScheduler`](crate::coordinator::MergeScheduler).

use crate::coordinator::MergeTrigger;
use crate::error::MergeError;
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A batch is flushed after this many debounce periods even if events keep coming
const MAX_BATCH_PERIODS: u32 = 10;

/// Watch mode configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Local layers root; external caches are never watched
    pub layers_root: PathBuf,
    /// Quiet period that closes a batch of events
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub fn new(layers_root: impl Into<PathBuf>) -> Self {
        Self {
            layers_root: layers_root.into(),
            debounce_ms: 100,
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }
}

/// Filesystem change event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Other(PathBuf),
}

impl ChangeEvent {
    /// Convert a notify event. Read-only access is dropped since merges read
    /// layer files and must not trigger themselves; closing a file opened for
    /// writing counts as a modification.
    pub fn from_notify(event: Event) -> Option<Self> {
        let first = event.paths.first().cloned();
        match event.kind {
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                first.map(ChangeEvent::Modified)
            }
            EventKind::Access(AccessKind::Open(_) | AccessKind::Read | AccessKind::Close(_)) => None,
            EventKind::Access(_) => Some(ChangeEvent::Other(first.unwrap_or_default())),
            EventKind::Create(_) => first.map(ChangeEvent::Created),
            EventKind::Modify(notify::event::ModifyKind::Name(_)) if event.paths.len() >= 2 => {
                Some(ChangeEvent::Renamed {
                    from: event.paths[0].clone(),
                    to: event.paths[1].clone(),
                })
            }
            EventKind::Modify(_) => first.map(ChangeEvent::Modified),
            EventKind::Remove(_) => first.map(ChangeEvent::Removed),
            EventKind::Any | EventKind::Other => {
                Some(ChangeEvent::Other(first.unwrap_or_default()))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p)
            | ChangeEvent::Modified(p)
            | ChangeEvent::Removed(p)
            | ChangeEvent::Other(p) => p,
            ChangeEvent::Renamed { to, .. } => to,
        }
    }
}

/// Live subscription on the layers root
pub struct ChangeWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl ChangeWatcher {
    /// Start watching. Must be called from within a Tokio runtime.
    ///
    /// A missing layers root is created so that layers added later are seen.
    pub fn start(config: WatchConfig, trigger: MergeTrigger) -> Result<Self, MergeError> {
        let root = config.layers_root.clone();
        std::fs::create_dir_all(&root).map_err(|e| MergeError::io(&root, e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // receiver gone means the watcher is shutting down
            let _ = tx.send(res);
        })
        .map_err(|e| MergeError::io(&root, std::io::Error::other(e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| MergeError::io(&root, std::io::Error::other(e)))?;

        let debounce = Duration::from_millis(config.debounce_ms);
        let task = tokio::spawn(run_batches(rx, debounce, trigger));

        info!(root = ?root, debounce_ms = config.debounce_ms, "Watching layers");

        Ok(Self {
            root,
            watcher: Some(watcher),
            task,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop delivering events; pending batches are discarded
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!(root = ?self.root, "Stopped watching layers");
        }
        self.task.abort();
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Collect events until `debounce` passes without one, then request a merge.
/// Continuous churn still flushes once the batch is `MAX_BATCH_PERIODS` old.
async fn run_batches(
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    debounce: Duration,
    trigger: MergeTrigger,
) {
    let mut batch: Vec<ChangeEvent> = Vec::new();

    while let Some(first) = rx.recv().await {
        push_event(&mut batch, first);

        let deadline = Instant::now() + debounce * MAX_BATCH_PERIODS;
        let mut closed = false;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = debounce.min(deadline - now);
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(next)) => push_event(&mut batch, next),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            debug!(
                events = batch.len(),
                first = ?batch[0].path(),
                "Layer change detected, requesting merge"
            );
            batch.clear();
            trigger.request();
        }

        if closed {
            break;
        }
    }

    debug!("Watch event channel closed");
}

fn push_event(batch: &mut Vec<ChangeEvent>, received: notify::Result<Event>) {
    match received {
        Ok(event) => {
            if let Some(change) = ChangeEvent::from_notify(event) {
                batch.push(change);
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    }
}
