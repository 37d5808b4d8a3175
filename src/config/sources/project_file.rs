//! Project config file source: layered.toml and layered.{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::{File, FileFormat};
use std::path::{Path, PathBuf};

/// Candidate config files for a project root, lowest precedence first.
/// Precedence: layered.toml (base) then layered.{LAYERED_ENV}.toml (env-specific).
pub fn config_file_paths(project_root: &Path) -> Vec<PathBuf> {
    let env_name = std::env::var("LAYERED_ENV").unwrap_or_else(|_| "development".to_string());
    vec![
        project_root.join("layered.toml"),
        project_root.join(format!("layered.{}.toml", env_name)),
    ]
}

/// Add the existing files among `files` to builder, in order.
pub fn add_files_to_builder(
    builder: ConfigBuilder<DefaultState>,
    files: &[PathBuf],
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = builder;
    for path in files.iter().filter(|p| p.is_file()) {
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
    }
    Ok(builder)
}
