//! CLI output: error surface for command execution.

use crate::error::{ConfigError, MergeError};
use thiserror::Error;

/// Errors a command can end with
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Map command errors to a string for CLI output.
pub fn map_error(e: &CliError) -> String {
    match e.layer() {
        Some(layer) => format!("error: {} (layer: {})", e, layer),
        None => format!("error: {}", e),
    }
}

impl CliError {
    fn layer(&self) -> Option<&str> {
        match self {
            CliError::Merge(e) => e.layer(),
            CliError::Config(ConfigError::InvalidLocator { layer, .. }) => Some(layer),
            _ => None,
        }
    }
}
