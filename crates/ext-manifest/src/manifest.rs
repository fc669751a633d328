//! Extension manifest parsing and validation.
//!
//! A manifest declares an extension's identity, the schema namespace it owns,
//! the permissions it requests, and the version ranges of the extensions it
//! depends on.
//!
//! # Example TOML
//!
//! ```toml
//! [extension]
//! id = "analytics"
//! version = "1.4.0"
//! namespace = "analytics"
//! description = "Usage analytics"
//! permissions = ["data:read", "data:write"]
//!
//! [dependencies]
//! base-metrics = "^1.0.0"
//! core-audit = ">=2.1.0, <3.0.0"
//! ```
//!
//! Parsing happens in two steps. The raw [`ManifestDocument`] is
//! deserialized as-is, then [`ManifestDocument::validate`] checks every
//! field and produces a typed [`ExtensionManifest`], or the complete list
//! of [`ManifestViolation`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use ext_schema::Namespace;
use ext_schema::naming::{is_reserved_namespace, namespace_syntax_error};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ManifestViolation, Result};
use crate::permission::Permission;
use crate::version::VersionRange;

const MAX_ID_LEN: usize = 64;

/// Platform policy applied while validating manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPolicy {
    /// Namespaces reserved in addition to the built-in ones.
    #[serde(default)]
    pub reserved_namespaces: Vec<String>,
}

/// Raw manifest document, as submitted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ManifestDocument {
    pub extension: ExtensionSection,
    /// Dependency id to range expression.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// The `[extension]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionSection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Defaults to the id with `-` replaced by `_`.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A validated extension manifest. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub id: String,
    pub version: Version,
    pub namespace: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl ManifestDocument {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validate every field, collecting all violations.
    pub fn validate(
        &self,
        policy: &ManifestPolicy,
    ) -> std::result::Result<ExtensionManifest, Vec<ManifestViolation>> {
        let mut violations = Vec::new();
        let ext = &self.extension;

        let id = match ext.id.as_deref().map(str::trim) {
            None | Some("") => {
                violations.push(ManifestViolation::MissingId);
                None
            }
            Some(id) => match extension_id_error(id) {
                Some(reason) => {
                    violations.push(ManifestViolation::InvalidId {
                        id: id.to_string(),
                        reason,
                    });
                    None
                }
                None => Some(id.to_string()),
            },
        };

        let version = match ext.version.as_deref().map(str::trim) {
            None | Some("") => {
                violations.push(ManifestViolation::MissingVersion);
                None
            }
            Some(v) => match Version::parse(v) {
                Ok(version) => Some(version),
                Err(e) => {
                    violations.push(ManifestViolation::InvalidVersion {
                        version: v.to_string(),
                        reason: e.to_string(),
                    });
                    None
                }
            },
        };

        let namespace = match (&ext.namespace, &id) {
            (Some(token), _) => check_namespace(token, policy, &mut violations),
            (None, Some(id)) => check_namespace(&id.replace('-', "_"), policy, &mut violations),
            // Already reported as a missing or invalid id.
            (None, None) => None,
        };

        let mut dependencies = BTreeMap::new();
        for (dep, expr) in &self.dependencies {
            if let Some(reason) = extension_id_error(dep) {
                violations.push(ManifestViolation::InvalidDependencyId {
                    dependency: dep.clone(),
                    reason,
                });
                continue;
            }
            if id.as_deref() == Some(dep.as_str()) {
                violations.push(ManifestViolation::SelfDependency);
                continue;
            }
            match VersionRange::parse(expr) {
                Ok(range) => {
                    dependencies.insert(dep.clone(), range);
                }
                Err(Error::InvalidRange { reason, .. }) => {
                    violations.push(ManifestViolation::InvalidRange {
                        dependency: dep.clone(),
                        range: expr.clone(),
                        reason,
                    });
                }
                Err(other) => violations.push(ManifestViolation::InvalidRange {
                    dependency: dep.clone(),
                    range: expr.clone(),
                    reason: other.to_string(),
                }),
            }
        }

        let mut permissions = BTreeSet::new();
        for raw in &ext.permissions {
            match raw.parse::<Permission>() {
                Ok(p) => {
                    permissions.insert(p);
                }
                Err(_) => violations.push(ManifestViolation::UnknownPermission {
                    permission: raw.clone(),
                }),
            }
        }

        match (id, version, namespace) {
            (Some(id), Some(version), Some(namespace)) if violations.is_empty() => Ok(ExtensionManifest {
                id,
                version,
                namespace,
                description: ext.description.clone(),
                dependencies,
                permissions,
            }),
            _ => Err(violations),
        }
    }
}

impl ExtensionManifest {
    /// Parse and validate a TOML manifest.
    pub fn from_toml(content: &str, policy: &ManifestPolicy) -> Result<Self> {
        ManifestDocument::from_toml(content)?
            .validate(policy)
            .map_err(|violations| Error::InvalidManifest { violations })
    }

    /// Parse and validate a JSON manifest.
    pub fn from_json(content: &str, policy: &ManifestPolicy) -> Result<Self> {
        ManifestDocument::from_json(content)?
            .validate(policy)
            .map_err(|violations| Error::InvalidManifest { violations })
    }

    /// Load a manifest from disk; `.json` files are read as JSON, anything
    /// else as TOML.
    pub fn from_path(path: &Path, policy: &ManifestPolicy) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "json") {
            Self::from_json(&content, policy)
        } else {
            Self::from_toml(&content, policy)
        }
    }

    /// `id@version`, the key a manifest is catalogued under.
    pub fn key(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }
}

/// Check an extension id against `[a-z][a-z0-9-_]*`, at most 64 characters.
pub fn extension_id_error(id: &str) -> Option<String> {
    if id.is_empty() {
        return Some("extension id must not be empty".to_string());
    }
    if id.len() > MAX_ID_LEN {
        return Some(format!("extension id must be at most {MAX_ID_LEN} characters"));
    }
    let mut chars = id.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Some("extension id must start with a lowercase letter".to_string());
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Some(
            "extension id must contain only lowercase letters, digits, hyphens, or underscores".to_string(),
        );
    }
    None
}

fn check_namespace(
    token: &str,
    policy: &ManifestPolicy,
    violations: &mut Vec<ManifestViolation>,
) -> Option<Namespace> {
    if let Some(reason) = namespace_syntax_error(token) {
        violations.push(ManifestViolation::InvalidNamespace {
            namespace: token.to_string(),
            reason,
        });
        return None;
    }
    if is_reserved_namespace(token, &policy.reserved_namespaces) {
        violations.push(ManifestViolation::ReservedNamespace {
            namespace: token.to_string(),
        });
        return None;
    }
    Namespace::new(token).ok()
}
