//! CLI route: single route table and run context. Dispatches to the host boundary and presentation.

use crate::cli::output::CliError;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_merge_json, format_merge_summary, format_plan_json, format_plan_table,
};
use crate::config::{ConfigLoader, LayeredConfig};
use crate::host::{self, HostOptions, RunMode};
use crate::paths::LayerPaths;
use std::path::PathBuf;
use tracing::info;

/// Runtime context for CLI execution: project paths and loaded configuration.
pub struct RunContext {
    paths: LayerPaths,
    config: LayeredConfig,
}

impl RunContext {
    /// Create run context from a project root and optional config path.
    pub fn new(root: &str, config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let paths = LayerPaths::resolve(root)?;
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&paths.project_root)?,
        };
        Ok(Self { paths, config })
    }

    pub fn paths(&self) -> &LayerPaths {
        &self.paths
    }

    pub fn config(&self) -> &LayeredConfig {
        &self.config
    }

    fn host_options(&self, mode: RunMode) -> HostOptions {
        HostOptions::new(&self.paths.project_root)
            .with_mode(mode)
            .with_config(self.config.clone())
    }

    /// Execute a command, returning the text to print on stdout.
    pub async fn execute(&self, command: &Commands) -> Result<String, CliError> {
        match command {
            Commands::Merge { clean, json } => {
                let mut options = self.host_options(RunMode::Build);
                if *clean {
                    options.config.merge.clean_output = true;
                }
                let report = options.coordinator()?.run_merge().await?;
                if *json {
                    Ok(format_merge_json(&report)?)
                } else {
                    Ok(format_merge_summary(&report))
                }
            }
            Commands::Plan { json } => {
                let coordinator = self.host_options(RunMode::Build).coordinator()?;
                let plan = coordinator.plan()?;
                if *json {
                    Ok(format_plan_json(&plan)?)
                } else {
                    Ok(format_plan_table(&plan, coordinator.sources()))
                }
            }
            Commands::Watch => self.watch().await,
        }
    }

    async fn watch(&self) -> Result<String, CliError> {
        let options = self.host_options(RunMode::Dev);
        let coordinator = options.coordinator()?;

        let report = coordinator.run_merge().await?;
        println!("{}", format_merge_summary(&report));

        let Some(handle) = host::watch(&options, coordinator)? else {
            return Ok(String::new());
        };
        println!("Watching {} (Ctrl-C to stop)", handle.root().display());

        let signal = tokio::signal::ctrl_c().await;
        let stats = handle.stats();
        handle.stop();
        signal.map_err(CliError::Signal)?;

        info!(completed = stats.completed, failed = stats.failed, "Watch stopped");
        Ok(format!(
            "Stopped watching: {} re-merge(s), {} failed",
            stats.completed, stats.failed
        ))
    }
}
