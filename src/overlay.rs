//! Overlay merge: copy ordered layers into one output tree
//!
//! Layers are applied in ascending precedence, so a later layer's file simply
//! overwrites an earlier one at the same relative path. Only whole files are
//! replaced; contents are never merged.
//!
//! Node handling:
//! - directories are created (an existing file in the way is removed)
//! - regular files are copied byte-for-byte (an existing directory in the way is removed)
//! - symlinks are followed; dangling links are skipped, loops are an error
//! - any other node kind is ignored

use crate::discovery::{Layer, LayerOrigin, MergePlan};
use crate::error::MergeError;
use crate::paths::EXTERNAL_DIR;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// A path supplied by more than one layer during one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideInfo {
    pub path: PathBuf,
    pub from_layer: String,
    pub by_layer: String,
}

/// Layer as it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedLayer {
    pub name: String,
    pub origin: LayerOrigin,
}

/// Outcome of one successful overlay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub output_root: PathBuf,
    pub layers: Vec<AppliedLayer>,
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub overrides: Vec<OverrideInfo>,
}

/// Copies layers into an output root
#[derive(Debug, Clone)]
pub struct OverlayMerger {
    output_root: PathBuf,
}

impl OverlayMerger {
    pub fn new(output_root: PathBuf) -> Self {
        Self { output_root }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Apply every layer of `plan` in order. The output root is created if missing.
    pub fn merge(&self, plan: &MergePlan) -> Result<MergeReport, MergeError> {
        std::fs::create_dir_all(&self.output_root)
            .map_err(|e| MergeError::io(&self.output_root, e))?;

        let mut report = MergeReport {
            output_root: self.output_root.clone(),
            ..MergeReport::default()
        };
        let mut owners: HashMap<PathBuf, String> = HashMap::new();

        for layer in plan {
            self.apply_layer(layer, &mut owners, &mut report)?;
            report.layers.push(AppliedLayer {
                name: layer.name.clone(),
                origin: layer.origin,
            });
        }

        Ok(report)
    }

    fn apply_layer(
        &self,
        layer: &Layer,
        owners: &mut HashMap<PathBuf, String>,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        let copied_before = report.files_copied;
        let unchanged_before = report.files_unchanged;

        let walker = WalkDir::new(&layer.root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name();

        let mut entries = walker.into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| layer.root.clone());
                    if e.loop_ancestor().is_none() && is_dangling_symlink(&path) {
                        warn!(layer = %layer.name, path = ?path, "Skipping dangling symlink");
                        continue;
                    }
                    let io = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("symlink loop"));
                    return Err(MergeError::io(path, io));
                }
            };

            let relative = match entry.path().strip_prefix(&layer.root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            // the fetched-layer cache lives in the output root
            if entry.depth() == 1 && relative.as_os_str() == EXTERNAL_DIR {
                warn!(layer = %layer.name, "Ignoring top-level '{}' in layer", EXTERNAL_DIR);
                if entry.file_type().is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }

            let destination = self.output_root.join(&relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                // a directory replacing a lower layer's file
                if let Some(previous) = owners.remove(&relative) {
                    record_override(report, &relative, previous, &layer.name);
                }
                ensure_directory(&destination)?;
            } else if file_type.is_file() {
                let replaces_dir = std::fs::symlink_metadata(&destination)
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if replaces_dir {
                    for previous in evict_descendants(owners, &relative) {
                        record_override(report, &relative, previous, &layer.name);
                    }
                }
                if copy_file(entry.path(), &destination)? {
                    report.files_copied += 1;
                } else {
                    report.files_unchanged += 1;
                }
                if let Some(previous) = owners.insert(relative.clone(), layer.name.clone()) {
                    record_override(report, &relative, previous, &layer.name);
                }
            }
        }

        debug!(
            layer = %layer.name,
            origin = ?layer.origin,
            copied = report.files_copied - copied_before,
            unchanged = report.files_unchanged - unchanged_before,
            "Applied layer"
        );
        Ok(())
    }
}

fn record_override(report: &mut MergeReport, path: &Path, previous: String, by_layer: &str) {
    if previous == by_layer {
        return;
    }
    trace!(path = ?path, from = %previous, by = %by_layer, "Override");
    report.overrides.push(OverrideInfo {
        path: path.to_path_buf(),
        from_layer: previous,
        by_layer: by_layer.to_string(),
    });
}

/// Drop ownership of every file below `dir`, returning the distinct previous owners in order
fn evict_descendants(owners: &mut HashMap<PathBuf, String>, dir: &Path) -> BTreeSet<String> {
    let mut evicted = BTreeSet::new();
    owners.retain(|path, owner| {
        if path != dir && path.starts_with(dir) {
            evicted.insert(owner.clone());
            false
        } else {
            true
        }
    });
    evicted
}

/// Remove everything in the output root except the external layer cache
pub fn clean_output(output_root: &Path) -> Result<(), MergeError> {
    if !output_root.is_dir() {
        return Ok(());
    }
    let entries = std::fs::read_dir(output_root).map_err(|e| MergeError::io(output_root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| MergeError::io(output_root, e))?;
        if entry.file_name() == EXTERNAL_DIR {
            continue;
        }
        let path = entry.path();
        remove_node(&path)?;
    }
    Ok(())
}

fn is_dangling_symlink(path: &Path) -> bool {
    let is_link = std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    is_link && std::fs::metadata(path).is_err()
}

fn remove_node(path: &Path) -> Result<(), MergeError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(MergeError::io(path, e)),
    };
    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| MergeError::io(path, e))
}

fn ensure_directory(path: &Path) -> Result<(), MergeError> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => remove_node(path)?,
        Err(_) => {}
    }
    std::fs::create_dir_all(path).map_err(|e| MergeError::io(path, e))
}

/// Copy `source` over `destination`. Returns false when the bytes were already identical.
fn copy_file(source: &Path, destination: &Path) -> Result<bool, MergeError> {
    match std::fs::symlink_metadata(destination) {
        Ok(existing) if existing.is_file() => {
            let source_len = std::fs::metadata(source)
                .map_err(|e| MergeError::io(source, e))?
                .len();
            if existing.len() == source_len
                && same_contents(source, destination).map_err(|e| MergeError::io(source, e))?
            {
                return Ok(false);
            }
        }
        // never write through a link or onto a directory
        Ok(_) => remove_node(destination)?,
        Err(_) => {}
    }

    std::fs::copy(source, destination).map_err(|e| MergeError::io(destination, e))?;
    Ok(true)
}

fn same_contents(a: &Path, b: &Path) -> std::io::Result<bool> {
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];

    loop {
        let n = read_chunk(&mut file_a, &mut buf_a)?;
        let m = read_chunk(&mut file_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
