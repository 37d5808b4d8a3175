//! Configuration System
//!
//! Hierarchical configuration for a layered project: built-in defaults, then
//! `layered.toml` and `layered.<env>.toml` in the project root, then
//! `LAYERED__`-prefixed environment variables.

use crate::coordinator::{FetchPolicy, MergeOptions};
use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::source::{parse_external, LayerSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod merge;
mod sources;

pub use sources::project_file::config_file_paths;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayeredConfig {
    /// Remote layers: layer name → `vcs:<owner>/<repo>[@ref]` or `registry:<package>`
    #[serde(default)]
    pub external: BTreeMap<String, String>,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Merge behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Remove stale output (everything but the external cache) before each merge
    #[serde(default)]
    pub clean_output: bool,

    /// Fetch policy for explicit merges: `always` or `if-missing`
    #[serde(default)]
    pub fetch: FetchPolicy,
}

/// Watch-mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Quiet period before a burst of change events triggers a re-merge
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl LayeredConfig {
    /// Parse every configured remote layer; fails on the first malformed locator
    pub fn validate(&self) -> Result<Vec<LayerSource>, ConfigError> {
        parse_external(&self.external)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            clean_output: self.merge.clean_output,
            fetch: self.merge.fetch,
        }
    }
}

/// Section read verbatim from TOML files
#[derive(Debug, Default, Deserialize)]
struct ExternalSection {
    #[serde(default)]
    external: BTreeMap<String, String>,
}

/// Loads [`LayeredConfig`] from files and environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a project root
    pub fn load(project_root: &Path) -> Result<LayeredConfig, ConfigError> {
        let files = config_file_paths(project_root);
        Self::load_files(&files)
    }

    /// Load configuration from one explicit file (plus defaults and environment)
    pub fn load_from_file(path: &Path) -> Result<LayeredConfig, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Load(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load_files(&[path.to_path_buf()])
    }

    fn load_files(files: &[std::path::PathBuf]) -> Result<LayeredConfig, ConfigError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::project_file::add_files_to_builder(builder, files)?;
        builder = sources::environment::add_to_builder(builder);

        let mut config: LayeredConfig = builder.build()?.try_deserialize()?;

        // `config` folds key case; layer names are case-sensitive directory names
        config.external = read_external_verbatim(files)?;

        Ok(config)
    }
}

/// Later files override earlier ones per layer name
fn read_external_verbatim(
    files: &[std::path::PathBuf],
) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut external = BTreeMap::new();
    for file in files {
        if !file.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(file)
            .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        let section: ExternalSection = toml::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        external.extend(section.external);
    }
    Ok(external)
}
