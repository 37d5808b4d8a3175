//! Host build-tool boundary
//!
//! The surrounding build lifecycle talks to the merge engine through two
//! entry points: [`initial_merge`] once at setup, and [`watch`] in
//! interactive development runs.

use crate::config::LayeredConfig;
use crate::coordinator::{FetchPolicy, MergeCoordinator, MergeScheduler, SchedulerStats};
use crate::error::MergeError;
use crate::fetch::{LayerFetcher, SourceFetcher};
use crate::paths::LayerPaths;
use crate::watch::{ChangeWatcher, WatchConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch as channel;
use tracing::info;

/// Kind of run the host is performing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Interactive development: merge, then keep watching
    Dev,
    /// One-shot production build
    #[default]
    Build,
    /// Serve an existing build; the output tree is left as is
    Preview,
}

impl RunMode {
    pub fn merges(self) -> bool {
        self != RunMode::Preview
    }

    pub fn watches(self) -> bool {
        self == RunMode::Dev
    }
}

/// Everything the host hands over to the engine
#[derive(Clone)]
pub struct HostOptions {
    pub project_root: PathBuf,
    pub mode: RunMode,
    pub config: LayeredConfig,
    fetcher: Arc<dyn LayerFetcher>,
}

impl HostOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            mode: RunMode::default(),
            config: LayeredConfig::default(),
            fetcher: Arc::new(SourceFetcher::default()),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_config(mut self, config: LayeredConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn LayerFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn paths(&self) -> Result<LayerPaths, MergeError> {
        Ok(LayerPaths::from_root(&self.project_root)?)
    }

    /// Coordinator for this project; locators are validated here
    pub fn coordinator(&self) -> Result<Arc<MergeCoordinator>, MergeError> {
        let coordinator =
            MergeCoordinator::from_config(self.paths()?, &self.config, Arc::clone(&self.fetcher))?;
        Ok(Arc::new(coordinator))
    }
}

/// Run the setup merge and return the output root the host should read from.
///
/// In [`RunMode::Preview`] nothing is fetched or copied.
pub async fn initial_merge(options: &HostOptions) -> Result<PathBuf, MergeError> {
    let paths = options.paths()?;
    if !options.mode.merges() {
        info!(output = ?paths.output, "Preview run, reusing existing output");
        return Ok(paths.output);
    }

    let report = options.coordinator()?.run_merge().await?;
    Ok(report.output_root)
}

/// Start re-merging on layer changes. Returns `None` unless the run is [`RunMode::Dev`].
///
/// Must be called from within a Tokio runtime.
pub fn watch(
    options: &HostOptions,
    coordinator: Arc<MergeCoordinator>,
) -> Result<Option<WatchHandle>, MergeError> {
    if !options.mode.watches() {
        return Ok(None);
    }

    let config = WatchConfig::new(&coordinator.paths().layers)
        .with_debounce_ms(options.config.watch.debounce_ms);
    // change-driven merges reuse cached remote layers
    let scheduler = MergeScheduler::spawn(coordinator, FetchPolicy::IfMissing);
    let watcher = ChangeWatcher::start(config, scheduler.trigger())?;

    Ok(Some(WatchHandle { watcher, scheduler }))
}

/// Running watcher plus the scheduler it feeds
pub struct WatchHandle {
    watcher: ChangeWatcher,
    scheduler: MergeScheduler,
}

impl WatchHandle {
    pub fn root(&self) -> &Path {
        self.watcher.root()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn subscribe(&self) -> channel::Receiver<SchedulerStats> {
        self.scheduler.subscribe()
    }

    pub fn stop(mut self) {
        self.watcher.stop();
        self.scheduler.stop();
    }
}
