//! Remote layer source descriptors
//!
//! Configured layers map a layer name to a locator string such as
//! `vcs:owner/repo@v2` or `registry:@scope/theme`. Locators are classified up
//! front so a malformed entry fails before anything is fetched or copied.

use crate::error::ConfigError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Origin kind of a remote layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    Vcs,
    Registry,
}

/// Where a remote layer's files come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Vcs {
        owner: String,
        repo: String,
        reference: Option<String>,
    },
    Registry {
        package: String,
        version: Option<String>,
    },
}

impl SourceDescriptor {
    /// Classify a locator string for the given layer.
    ///
    /// `git:` and `npm:` are accepted as aliases of `vcs:` and `registry:`.
    pub fn parse(layer: &str, locator: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLocator {
            layer: layer.to_string(),
            locator: locator.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = locator.trim();
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("locator must not contain whitespace"));
        }

        let (scheme, body) = trimmed
            .split_once(':')
            .ok_or_else(|| invalid("expected 'vcs:<owner>/<repo>[@ref]' or 'registry:<package>'"))?;

        match scheme {
            "vcs" | "git" => {
                let (slug, reference) = match body.split_once('@') {
                    Some((slug, reference)) => {
                        if reference.is_empty() {
                            return Err(invalid("empty ref after '@'"));
                        }
                        (slug, Some(reference.to_string()))
                    }
                    None => (body, None),
                };
                let mut parts = slug.split('/');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(owner), Some(repo), None) if !owner.is_empty() => {
                        let repo = repo.strip_suffix(".git").unwrap_or(repo);
                        if repo.is_empty() {
                            return Err(invalid("expected '<owner>/<repo>'"));
                        }
                        Ok(SourceDescriptor::Vcs {
                            owner: owner.to_string(),
                            repo: repo.to_string(),
                            reference,
                        })
                    }
                    _ => Err(invalid("expected '<owner>/<repo>'")),
                }
            }
            "registry" | "npm" => {
                if body.is_empty() {
                    return Err(invalid("missing package name"));
                }
                if body.starts_with('-') {
                    return Err(invalid("package name must not start with '-'"));
                }
                // a leading '@' belongs to the scope, a later one separates the version
                let split_at = body
                    .char_indices()
                    .skip(1)
                    .find(|(_, c)| *c == '@')
                    .map(|(i, _)| i);
                let (package, version) = match split_at {
                    Some(i) => (&body[..i], Some(&body[i + 1..])),
                    None => (body, None),
                };
                if version.is_some_and(str::is_empty) {
                    return Err(invalid("empty version after '@'"));
                }
                if package.starts_with('@') {
                    match package.split_once('/') {
                        Some((scope, name)) if scope.len() > 1 && !name.is_empty() => {}
                        _ => return Err(invalid("scoped package must be '@scope/name'")),
                    }
                }
                Ok(SourceDescriptor::Registry {
                    package: package.to_string(),
                    version: version.map(str::to_string),
                })
            }
            other => Err(invalid(&format!("unknown origin '{}'", other))),
        }
    }

    pub fn origin(&self) -> OriginKind {
        match self {
            SourceDescriptor::Vcs { .. } => OriginKind::Vcs,
            SourceDescriptor::Registry { .. } => OriginKind::Registry,
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Vcs {
                owner,
                repo,
                reference,
            } => {
                write!(f, "vcs:{}/{}", owner, repo)?;
                if let Some(reference) = reference {
                    write!(f, "@{}", reference)?;
                }
                Ok(())
            }
            SourceDescriptor::Registry { package, version } => {
                write!(f, "registry:{}", package)?;
                if let Some(version) = version {
                    write!(f, "@{}", version)?;
                }
                Ok(())
            }
        }
    }
}

/// A configured remote layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSource {
    pub name: String,
    pub descriptor: SourceDescriptor,
}

impl LayerSource {
    pub fn parse(name: &str, locator: &str) -> Result<Self, ConfigError> {
        validate_layer_name(name)?;
        Ok(Self {
            name: name.to_string(),
            descriptor: SourceDescriptor::parse(name, locator)?,
        })
    }
}

/// Parse the `external` configuration table, in layer-name order
pub fn parse_external(external: &BTreeMap<String, String>) -> Result<Vec<LayerSource>, ConfigError> {
    external
        .iter()
        .map(|(name, locator)| LayerSource::parse(name, locator))
        .collect()
}

/// Layer names become directory names, so they must be one plain path segment
pub fn validate_layer_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ConfigError::InvalidLayerName(name.to_string()));
    }
    Ok(())
}
