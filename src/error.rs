//! Error types for the layered overlay merge engine.

use std::path::PathBuf;
use thiserror::Error;

/// Why a remote layer could not be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network or name resolution failure
    Network,
    /// Repository, ref or package does not exist
    NotFound,
    /// Credentials rejected or missing
    Unauthorized,
    /// Locator could not be turned into a fetch request
    MalformedLocator,
    /// External tool missing or exited with an unrecognised failure
    Tool,
    /// Local I/O while materialising the fetched tree
    Io,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FetchErrorKind::Network => "network failure",
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Unauthorized => "authorization failed",
            FetchErrorKind::MalformedLocator => "malformed locator",
            FetchErrorKind::Tool => "fetch tool failed",
            FetchErrorKind::Io => "I/O error",
        };
        f.write_str(label)
    }
}

/// Remote layer fetch failure, always tagged with the layer it belongs to
#[derive(Debug, Error)]
#[error("Failed to fetch layer '{layer}' ({kind}): {message}")]
pub struct FetchError {
    pub layer: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(layer: impl Into<String>, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn io(layer: impl Into<String>, err: std::io::Error) -> Self {
        Self::new(layer, FetchErrorKind::Io, err.to_string())
    }
}

/// Configuration errors, raised before any fetch or copy begins
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Layer '{layer}': invalid source locator '{locator}': {reason}")]
    InvalidLocator {
        layer: String,
        locator: String,
        reason: String,
    },

    #[error("Invalid layer name '{0}': must be a non-empty single path segment")]
    InvalidLayerName(String),

    #[error("Invalid project root '{0}'")]
    InvalidRoot(String),

    #[error("Configuration error: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Single failure type surfaced to the host for one merge attempt
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Merge task aborted: {0}")]
    Join(String),
}

impl MergeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Layer name attached to the failure, when one is known
    pub fn layer(&self) -> Option<&str> {
        match self {
            MergeError::Fetch(e) => Some(&e.layer),
            MergeError::Config(ConfigError::InvalidLocator { layer, .. }) => Some(layer),
            MergeError::Config(ConfigError::InvalidLayerName(name)) => Some(name),
            _ => None,
        }
    }
}
