//! Merge Coordinator
//!
//! Runs fetch → discover → merge as one operation and guarantees that at most
//! one merge touches a given output root at a time. Remote layers are fetched
//! into a staging directory and only moved into the external cache once every
//! fetch has succeeded, so a failed fetch leaves the previous output intact.
//!
//! [`MergeScheduler`] runs merges in the background for change-driven
//! re-merges. Requests that arrive while a merge is running collapse into a
//! single follow-up run.

use crate::config::LayeredConfig;
use crate::discovery::{discover, MergePlan};
use crate::error::{ConfigError, MergeError};
use crate::fetch::{ExternalCache, LayerFetcher};
use crate::overlay::{clean_output, MergeReport, OverlayMerger};
use crate::paths::{normalize_path_string, LayerPaths};
use crate::source::LayerSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{watch, Mutex, Notify, OwnedMutexGuard};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Phase of the current (or last) merge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePhase {
    Idle,
    Fetching,
    Discovering,
    Merging,
    Failed,
}

/// When configured remote layers are downloaded again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Fetch every configured remote layer on every merge
    #[default]
    Always,
    /// Skip layers whose cache was fetched from the same descriptor
    IfMissing,
}

/// Per-coordinator merge behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Empty the output root (except the external cache) before copying
    pub clean_output: bool,
    /// Fetch policy for explicit merges
    pub fetch: FetchPolicy,
}

type OutputLock = Arc<Mutex<()>>;

/// Lock shared by every coordinator writing to `output`.
///
/// Keyed by the NFC form of the path so spellings that differ only in
/// Unicode composition share one lock.
fn output_lock(output: &Path) -> OutputLock {
    static LOCKS: OnceLock<parking_lot::Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>> = OnceLock::new();

    let key = PathBuf::from(normalize_path_string(&output.to_string_lossy()));
    let mut locks = LOCKS.get_or_init(Default::default).lock();
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(key, Arc::downgrade(&lock));
    lock
}

/// Orchestrates merges for one project
pub struct MergeCoordinator {
    paths: LayerPaths,
    sources: Vec<LayerSource>,
    fetcher: Arc<dyn LayerFetcher>,
    options: MergeOptions,
    lock: OutputLock,
    phase: Arc<RwLock<MergePhase>>,
}

impl MergeCoordinator {
    pub fn new(paths: LayerPaths, sources: Vec<LayerSource>, fetcher: Arc<dyn LayerFetcher>) -> Self {
        let lock = output_lock(&paths.output);
        Self {
            paths,
            sources,
            fetcher,
            options: MergeOptions::default(),
            lock,
            phase: Arc::new(RwLock::new(MergePhase::Idle)),
        }
    }

    /// Build a coordinator from configuration, validating every locator up front
    pub fn from_config(
        paths: LayerPaths,
        config: &LayeredConfig,
        fetcher: Arc<dyn LayerFetcher>,
    ) -> Result<Self, ConfigError> {
        let sources = config.validate()?;
        Ok(Self::new(paths, sources, fetcher).with_options(config.merge_options()))
    }

    pub fn with_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn paths(&self) -> &LayerPaths {
        &self.paths
    }

    pub fn sources(&self) -> &[LayerSource] {
        &self.sources
    }

    pub fn phase(&self) -> MergePhase {
        *self.phase.read()
    }

    /// Current precedence order without fetching or copying anything
    pub fn plan(&self) -> Result<MergePlan, MergeError> {
        discover(&self.paths.layers, &self.paths.external)
    }

    /// Run one merge with the configured fetch policy
    pub async fn run_merge(&self) -> Result<MergeReport, MergeError> {
        self.run_merge_with(self.options.fetch).await
    }

    /// Run one merge. Waits for any merge already running on the same output root.
    ///
    /// Dropping the returned future does not release the output root while a
    /// copy is still in progress; the lock is held until the copy finishes.
    pub async fn run_merge_with(&self, policy: FetchPolicy) -> Result<MergeReport, MergeError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;

        let result = self.execute(policy, guard).await;
        match &result {
            Ok(report) => {
                set_phase(&self.phase, MergePhase::Idle);
                info!(
                    output = ?report.output_root,
                    layers = report.layers.len(),
                    copied = report.files_copied,
                    unchanged = report.files_unchanged,
                    overrides = report.overrides.len(),
                    "Merge complete"
                );
            }
            Err(e) => {
                set_phase(&self.phase, MergePhase::Failed);
                error!(error = %e, layer = ?e.layer(), "Merge failed");
            }
        }
        result
    }

    async fn execute(
        &self,
        policy: FetchPolicy,
        guard: OwnedMutexGuard<()>,
    ) -> Result<MergeReport, MergeError> {
        if !self.sources.is_empty() {
            set_phase(&self.phase, MergePhase::Fetching);
            self.fetch_all(policy).await?;
        }

        set_phase(&self.phase, MergePhase::Discovering);
        let layers_root = self.paths.layers.clone();
        let external_root = self.paths.external.clone();
        let output_root = self.paths.output.clone();
        let clean = self.options.clean_output;
        let phase = Arc::clone(&self.phase);

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let plan = discover(&layers_root, &external_root)?;
            set_phase(&phase, MergePhase::Merging);
            if clean {
                clean_output(&output_root)?;
            }
            OverlayMerger::new(output_root).merge(&plan)
        })
        .await
        .map_err(|e| MergeError::Join(e.to_string()))?
    }

    /// Fetch every pending remote layer into staging, then commit them all
    async fn fetch_all(&self, policy: FetchPolicy) -> Result<(), MergeError> {
        let cache = ExternalCache::new(self.paths.external.clone());
        let pending: Vec<&LayerSource> = self
            .sources
            .iter()
            .filter(|source| policy == FetchPolicy::Always || !cache.is_current(source))
            .collect();

        if pending.is_empty() {
            debug!("All remote layers are cached");
            return Ok(());
        }

        let root = &self.paths.project_root;
        std::fs::create_dir_all(root).map_err(|e| MergeError::io(root, e))?;
        // sibling of the output root so commits are plain renames
        let staging = tempfile::Builder::new()
            .prefix(".layers-fetch-")
            .tempdir_in(root)
            .map_err(|e| MergeError::io(root, e))?;

        let mut tasks = JoinSet::new();
        for source in pending {
            let destination = staging.path().join(&source.name);
            std::fs::create_dir_all(&destination).map_err(|e| MergeError::io(&destination, e))?;

            let fetcher = Arc::clone(&self.fetcher);
            let source = source.clone();
            tasks.spawn(async move {
                info!(layer = %source.name, source = %source.descriptor, "Fetching remote layer");
                fetcher
                    .fetch(&source.name, &source.descriptor, &destination)
                    .await
                    .map(|()| (source, destination))
            });
        }

        let mut fetched = Vec::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(layer)) => fetched.push(layer),
                Ok(Err(e)) => {
                    failure = Some(MergeError::from(e));
                    break;
                }
                Err(e) => {
                    failure = Some(MergeError::Join(e.to_string()));
                    break;
                }
            }
        }
        if let Some(err) = failure {
            // staging is removed on drop, after the remaining fetches have stopped
            tasks.shutdown().await;
            return Err(err);
        }

        for (source, staged) in fetched {
            cache
                .commit(&source, &staged)
                .map_err(|e| MergeError::io(cache.layer_dir(&source.name), e))?;
            debug!(layer = %source.name, "Committed remote layer to cache");
        }

        Ok(())
    }
}

fn set_phase(phase: &RwLock<MergePhase>, next: MergePhase) {
    let mut current = phase.write();
    if *current != next {
        debug!(from = ?*current, to = ?next, "Merge phase");
        *current = next;
    }
}

/// Counters published by a [`MergeScheduler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: u64,
    pub failed: u64,
}

/// Cheap handle for requesting a background merge
#[derive(Debug, Clone)]
pub struct MergeTrigger {
    notify: Arc<Notify>,
}

impl MergeTrigger {
    /// Never blocks; repeated requests before the next run starts count once
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

/// Single background worker running merges on request
pub struct MergeScheduler {
    trigger: MergeTrigger,
    stats: watch::Receiver<SchedulerStats>,
    task: JoinHandle<()>,
}

impl MergeScheduler {
    /// Spawn the worker on the current Tokio runtime
    pub fn spawn(coordinator: Arc<MergeCoordinator>, policy: FetchPolicy) -> Self {
        let notify = Arc::new(Notify::new());
        let (stats_tx, stats_rx) = watch::channel(SchedulerStats::default());

        let worker_notify = Arc::clone(&notify);
        let task = tokio::spawn(async move {
            loop {
                worker_notify.notified().await;
                let result = coordinator.run_merge_with(policy).await;
                stats_tx.send_modify(|stats| {
                    stats.completed += 1;
                    if result.is_err() {
                        stats.failed += 1;
                    }
                });
                // failures were already logged by the coordinator; keep serving requests
            }
        });

        Self {
            trigger: MergeTrigger { notify },
            stats: stats_rx,
            task,
        }
    }

    pub fn trigger(&self) -> MergeTrigger {
        self.trigger.clone()
    }

    pub fn request(&self) {
        self.trigger.request();
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStats> {
        self.stats.clone()
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats.borrow()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
