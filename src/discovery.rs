//! Layer discovery and precedence ordering
//!
//! Local and external layer names are pooled into one namespace and sorted by
//! code point. The last layer in a [`MergePlan`] has the highest precedence.
//! When a name exists in both roots the local directory supplies the content.

use crate::error::MergeError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a layer's content is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOrigin {
    Local,
    External,
}

/// A resolved layer, valid for one merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub name: String,
    pub root: PathBuf,
    pub origin: LayerOrigin,
}

/// Layers in ascending precedence order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MergePlan {
    layers: Vec<Layer>,
}

impl MergePlan {
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    /// The layer whose files win every conflict
    pub fn highest(&self) -> Option<&Layer> {
        self.layers.last()
    }
}

impl<'a> IntoIterator for &'a MergePlan {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

/// Build the merge plan from the local layers root and the external cache root.
///
/// Missing roots contribute no layers; neither root existing yields an empty plan.
pub fn discover(local_root: &Path, external_root: &Path) -> Result<MergePlan, MergeError> {
    let local = list_layer_dirs(local_root)?;
    let external = list_layer_dirs(external_root)?;

    let layers: Vec<Layer> = local
        .union(&external)
        .map(|name| {
            if local.contains(name) {
                Layer {
                    name: name.clone(),
                    root: local_root.join(name),
                    origin: LayerOrigin::Local,
                }
            } else {
                Layer {
                    name: name.clone(),
                    root: external_root.join(name),
                    origin: LayerOrigin::External,
                }
            }
        })
        .collect();

    debug!(
        local = local.len(),
        external = external.len(),
        plan = ?layers.iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
        "Discovered layers"
    );

    Ok(MergePlan { layers })
}

/// Names of the immediate subdirectories of `root` (symlinks to directories count)
fn list_layer_dirs(root: &Path) -> Result<BTreeSet<String>, MergeError> {
    let mut names = BTreeSet::new();
    if !root.is_dir() {
        return Ok(names);
    }

    let entries = std::fs::read_dir(root).map_err(|e| MergeError::io(root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| MergeError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => {
                warn!(name = ?raw, root = ?root, "Skipping layer with non UTF-8 name");
            }
        }
    }

    Ok(names)
}
