//! Shared test utilities for integration tests
//!
//! Provides a throwaway project layout and an in-memory remote layer fetcher.

use async_trait::async_trait;
use layered_files::error::{FetchError, FetchErrorKind};
use layered_files::fetch::LayerFetcher;
use layered_files::paths::LayerPaths;
use layered_files::source::SourceDescriptor;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across tests
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Temporary project root with `layers/` and `.layers/` underneath
pub struct Project {
    _temp: TempDir,
    pub paths: LayerPaths,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = LayerPaths::from_root(temp.path()).unwrap();
        Self { _temp: temp, paths }
    }

    pub fn root(&self) -> &Path {
        &self.paths.project_root
    }

    /// Write `content` to `<layers>/<layer>/<relative>`
    pub fn layer_file(&self, layer: &str, relative: &str, content: &str) -> &Self {
        write_file(&self.paths.layers.join(layer).join(relative), content);
        self
    }

    pub fn output(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.paths.output.join(relative)).ok()
    }

    pub fn write_config(&self, toml: &str) {
        fs::write(self.root().join("layered.toml"), toml).unwrap();
    }
}

pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Relative paths of every file under `root`, sorted
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Serves remote layers from memory: layer name → (relative path → content)
#[derive(Default)]
pub struct MemoryFetcher {
    layers: HashMap<String, Vec<(String, String)>>,
    failures: HashMap<String, FetchErrorKind>,
    pub calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn with_layer(mut self, layer: &str, files: &[(&str, &str)]) -> Self {
        self.layers.insert(
            layer.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        );
        self
    }

    pub fn failing(mut self, layer: &str, kind: FetchErrorKind) -> Self {
        self.failures.insert(layer.to_string(), kind);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LayerFetcher for MemoryFetcher {
    async fn fetch(
        &self,
        layer: &str,
        _source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failures.get(layer) {
            return Err(FetchError::new(layer, *kind, "simulated failure"));
        }
        let files = self
            .layers
            .get(layer)
            .ok_or_else(|| FetchError::new(layer, FetchErrorKind::NotFound, "no such remote"))?;
        for (relative, content) in files {
            let path = destination.join(relative);
            fs::create_dir_all(path.parent().unwrap()).map_err(|e| FetchError::io(layer, e))?;
            fs::write(&path, content).map_err(|e| FetchError::io(layer, e))?;
        }
        Ok(())
    }
}
