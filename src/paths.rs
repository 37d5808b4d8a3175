//! Canonical locations for the layers root, external cache and merged output
//!
//! A project root may be handed over either as a plain path or as a `file://`
//! location. Both resolve to the same canonical absolute path so downstream
//! comparisons (watch events, lock registry keys) line up. The bytes of an
//! existing root are kept as the filesystem reports them.

use crate::error::ConfigError;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Directory under the project root holding local layers
pub const LAYERS_DIR: &str = "layers";
/// Directory under the project root receiving the merged tree
pub const OUTPUT_DIR: &str = ".layers";
/// Directory under the output root caching fetched remote layers
pub const EXTERNAL_DIR: &str = ".external";

/// Resolved path set for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    pub project_root: PathBuf,
    /// `<root>/layers`
    pub layers: PathBuf,
    /// `<output>/.external`
    pub external: PathBuf,
    /// `<root>/.layers`
    pub output: PathBuf,
}

impl LayerPaths {
    /// Resolve paths from a plain path or `file://` location string
    pub fn resolve(root: &str) -> Result<Self, ConfigError> {
        let root_path = if root.starts_with("file:") {
            file_url_to_path(root)?
        } else {
            PathBuf::from(root)
        };
        Self::from_root(&root_path)
    }

    /// Resolve paths from an already-decoded project root
    pub fn from_root(root: &Path) -> Result<Self, ConfigError> {
        if root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidRoot(String::new()));
        }
        let project_root = canonical_root(root)?;
        let output = project_root.join(OUTPUT_DIR);
        Ok(Self {
            layers: project_root.join(LAYERS_DIR),
            external: output.join(EXTERNAL_DIR),
            output,
            project_root,
        })
    }
}

/// Canonicalize a project root.
///
/// Existing roots go through `dunce` so symlinks and `..` are resolved; a root
/// that does not exist yet is made absolute and normalized lexically.
pub fn canonical_root(path: &Path) -> Result<PathBuf, ConfigError> {
    match dunce::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(_) => {
            let joined = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map_err(|e| ConfigError::InvalidRoot(format!("{}: {}", path.display(), e)))?
                    .join(path)
            };
            Ok(normalize_lexically(&joined))
        }
    }
}

/// NFC-normalize a path string and strip trailing separators (except root).
/// Used for comparison keys only, never to build a path that is opened.
pub fn normalize_path_string(path: &str) -> String {
    let mut result: String = path.nfc().collect();
    if result.len() > 1 {
        while result.ends_with('/') || result.ends_with('\\') {
            result.pop();
        }
    }
    result
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decode a `file://` location into a filesystem path
fn file_url_to_path(url: &str) -> Result<PathBuf, ConfigError> {
    let invalid = || ConfigError::InvalidRoot(url.to_string());

    let rest = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("file:"))
        .ok_or_else(invalid)?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    if !rest.starts_with('/') {
        return Err(invalid());
    }

    let decoded = percent_decode(rest).ok_or_else(invalid)?;

    // `/C:/dir` on Windows drops the leading slash
    let bytes = decoded.as_bytes();
    if cfg!(windows) && bytes.len() >= 3 && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
        return Ok(PathBuf::from(&decoded[1..]));
    }

    Ok(PathBuf::from(decoded))
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
