//! Package-registry layers fetched with `npm pack` and unpacked with `tar`

use super::{run_tool, LayerFetcher};
use crate::error::{FetchError, FetchErrorKind};
use crate::source::SourceDescriptor;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Fetches `registry:<package>[@version]` layers
#[derive(Debug, Clone)]
pub struct RegistryFetcher {
    npm: String,
    tar: String,
    registry_url: Option<String>,
}

impl Default for RegistryFetcher {
    fn default() -> Self {
        Self {
            npm: "npm".to_string(),
            tar: "tar".to_string(),
            registry_url: None,
        }
    }
}

impl RegistryFetcher {
    pub fn with_npm(mut self, program: impl Into<String>) -> Self {
        self.npm = program.into();
        self
    }

    /// Pack from a registry other than the npm default
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }
}

fn package_spec(package: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}@{}", package, version),
        None => package.to_string(),
    }
}

#[async_trait]
impl LayerFetcher for RegistryFetcher {
    async fn fetch(
        &self,
        layer: &str,
        source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let SourceDescriptor::Registry { package, version } = source else {
            return Err(FetchError::new(
                layer,
                FetchErrorKind::MalformedLocator,
                format!("'{}' is not a registry locator", source),
            ));
        };

        let spec = package_spec(package, version.as_deref());
        info!(layer, package = %spec, "Packing layer from registry");

        let pack_dir = tempfile::TempDir::new().map_err(|e| FetchError::io(layer, e))?;

        let mut pack = Command::new(&self.npm);
        pack.arg("pack")
            .arg(&spec)
            .arg("--silent")
            .arg("--pack-destination")
            .arg(pack_dir.path())
            .kill_on_drop(true);
        if let Some(registry_url) = &self.registry_url {
            pack.arg("--registry").arg(registry_url);
        }
        let output = run_tool(layer, &mut pack).await?;

        // npm prints the tarball file name as the last line
        let stdout = String::from_utf8_lossy(&output.stdout);
        let tarball = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .map(|name| pack_dir.path().join(name))
            .filter(|path| path.is_file())
            .ok_or_else(|| {
                FetchError::new(
                    layer,
                    FetchErrorKind::Tool,
                    format!("npm pack produced no tarball for '{}'", spec),
                )
            })?;

        // tarballs are rooted at `package/`
        let mut unpack = Command::new(&self.tar);
        unpack
            .arg("-xzf")
            .arg(&tarball)
            .arg("-C")
            .arg(destination)
            .arg("--strip-components=1")
            .kill_on_drop(true);
        run_tool(layer, &mut unpack).await?;

        Ok(())
    }
}
