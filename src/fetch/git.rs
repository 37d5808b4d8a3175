//! Version-control layers fetched with a shallow `git clone`

use super::{run_tool, LayerFetcher};
use crate::error::{FetchError, FetchErrorKind};
use crate::source::SourceDescriptor;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

const DEFAULT_HOST: &str = "https://github.com";

/// Fetches `vcs:<owner>/<repo>[@ref]` layers
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: String,
    host: String,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl GitFetcher {
    /// Use a different git executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Clone from a different host (e.g. a GitHub Enterprise or Gitea base URL)
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{}/{}.git", self.host, owner, repo)
    }
}

#[async_trait]
impl LayerFetcher for GitFetcher {
    async fn fetch(
        &self,
        layer: &str,
        source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let SourceDescriptor::Vcs {
            owner,
            repo,
            reference,
        } = source
        else {
            return Err(FetchError::new(
                layer,
                FetchErrorKind::MalformedLocator,
                format!("'{}' is not a version-control locator", source),
            ));
        };

        let url = self.clone_url(owner, repo);
        info!(layer, url = %url, reference = ?reference, "Cloning layer");

        let mut command = Command::new(&self.program);
        command
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--quiet");
        if let Some(reference) = reference {
            command.arg("--branch").arg(reference);
        }
        command
            .arg(&url)
            .arg(destination)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        run_tool(layer, &mut command).await?;

        // history is not part of the layer
        let git_dir = destination.join(".git");
        if git_dir.exists() {
            tokio::fs::remove_dir_all(&git_dir)
                .await
                .map_err(|e| FetchError::io(layer, e))?;
        }

        Ok(())
    }
}
