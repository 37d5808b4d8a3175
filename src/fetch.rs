//! Remote Layer Fetching
//!
//! The transport for remote layers sits behind the [`LayerFetcher`] trait so the
//! coordinator never depends on how a repository or package is downloaded.
//! [`SourceFetcher`] is the default implementation, dispatching to the `git` and
//! `npm` command-line tools. [`ExternalCache`] owns the on-disk cache of fetched
//! layers under `<output>/.external`.

use crate::error::{FetchError, FetchErrorKind};
use crate::source::{LayerSource, SourceDescriptor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

pub mod git;
pub mod registry;

pub use git::GitFetcher;
pub use registry::RegistryFetcher;

/// Materializes one remote layer into a directory
#[async_trait]
pub trait LayerFetcher: Send + Sync {
    /// Populate `destination` with the full file tree referenced by `source`.
    ///
    /// `destination` exists before the call. Implementations must either leave a
    /// complete tree or fail; retrying into the same directory must be safe.
    async fn fetch(
        &self,
        layer: &str,
        source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<(), FetchError>;
}

/// Default fetcher: `vcs:` through git, `registry:` through npm
#[derive(Debug, Clone, Default)]
pub struct SourceFetcher {
    git: GitFetcher,
    registry: RegistryFetcher,
}

impl SourceFetcher {
    pub fn new(git: GitFetcher, registry: RegistryFetcher) -> Self {
        Self { git, registry }
    }
}

#[async_trait]
impl LayerFetcher for SourceFetcher {
    async fn fetch(
        &self,
        layer: &str,
        source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<(), FetchError> {
        match source {
            SourceDescriptor::Vcs { .. } => self.git.fetch(layer, source, destination).await,
            SourceDescriptor::Registry { .. } => {
                self.registry.fetch(layer, source, destination).await
            }
        }
    }
}

/// Run an external tool, mapping spawn failures and non-zero exits to [`FetchError`]
pub(crate) async fn run_tool(layer: &str, command: &mut Command) -> Result<Output, FetchError> {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    debug!(layer, program = %program, "Running fetch tool");

    let output = command.output().await.map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
            format!("'{}' is not installed or not on PATH", program)
        } else {
            format!("failed to run '{}': {}", program, e)
        };
        FetchError::new(layer, FetchErrorKind::Tool, message)
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let kind = classify_failure(&stderr);
        let message = if stderr.is_empty() {
            format!("'{}' exited with {:?}", program, output.status.code())
        } else {
            stderr
        };
        return Err(FetchError::new(layer, kind, message));
    }

    Ok(output)
}

/// Best-effort classification of a tool's stderr
pub(crate) fn classify_failure(stderr: &str) -> FetchErrorKind {
    let text = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(&[
        "could not resolve host",
        "enotfound",
        "eai_again",
        "timed out",
        "etimedout",
        "connection refused",
        "network is unreachable",
        "econnreset",
    ]) {
        FetchErrorKind::Network
    } else if any(&[
        "authentication failed",
        "permission denied",
        "could not read username",
        "e401",
        "e403",
        "error: 401",
        "error: 403",
        "401 unauthorized",
        "403 forbidden",
    ]) {
        FetchErrorKind::Unauthorized
    } else if any(&[
        "not found",
        "e404",
        "error: 404",
        "does not exist",
        "remote branch",
        "no matching version",
    ]) {
        FetchErrorKind::NotFound
    } else {
        FetchErrorKind::Tool
    }
}

/// On-disk cache of fetched remote layers
///
/// Each layer lives in `<root>/<name>/` with a `<root>/<name>.source` marker
/// recording the descriptor it was fetched from. Markers are plain files, so
/// layer discovery never mistakes them for layers.
#[derive(Debug, Clone)]
pub struct ExternalCache {
    root: PathBuf,
}

impl ExternalCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layer_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn marker_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.source", name))
    }

    /// True when the cached copy was fetched from the same descriptor
    pub fn is_current(&self, source: &LayerSource) -> bool {
        if !self.layer_dir(&source.name).is_dir() {
            return false;
        }
        std::fs::read_to_string(self.marker_path(&source.name))
            .map(|recorded| recorded.trim() == source.descriptor.to_string())
            .unwrap_or(false)
    }

    /// Move a completely fetched layer into the cache, replacing any prior copy
    pub fn commit(&self, source: &LayerSource, staged: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let target = self.layer_dir(&source.name);
        let marker = self.marker_path(&source.name);

        match std::fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if target.is_dir() {
            std::fs::remove_dir_all(&target)?;
        } else if target.exists() {
            std::fs::remove_file(&target)?;
        }

        std::fs::rename(staged, &target)?;
        std::fs::write(&marker, format!("{}\n", source.descriptor))
    }
}
