use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::VersionRange;

/// One problem found while validating a manifest document.
///
/// The validator collects every violation in a single pass; see
/// [`Error::InvalidManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestViolation {
    #[error("extension id is missing")]
    MissingId,

    #[error("invalid extension id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("manifest declares id '{found}' but was submitted as '{expected}'")]
    IdMismatch { expected: String, found: String },

    #[error("version is missing")]
    MissingVersion,

    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("dependency '{dependency}' has invalid range '{range}': {reason}")]
    InvalidRange {
        dependency: String,
        range: String,
        reason: String,
    },

    #[error("invalid dependency id '{dependency}': {reason}")]
    InvalidDependencyId { dependency: String, reason: String },

    #[error("extension cannot depend on itself")]
    SelfDependency,

    #[error("unknown permission '{permission}'")]
    UnknownPermission { permission: String },

    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("namespace '{namespace}' is reserved")]
    ReservedNamespace { namespace: String },
}

impl ManifestViolation {
    /// Document path of the offending entry, e.g. `dependencies.base-metrics`.
    pub fn path(&self) -> String {
        match self {
            Self::MissingId | Self::InvalidId { .. } | Self::IdMismatch { .. } => "extension.id".to_string(),
            Self::MissingVersion | Self::InvalidVersion { .. } => "extension.version".to_string(),
            Self::InvalidRange { dependency, .. } | Self::InvalidDependencyId { dependency, .. } => {
                format!("dependencies.{dependency}")
            }
            Self::SelfDependency => "dependencies".to_string(),
            Self::UnknownPermission { .. } => "extension.permissions".to_string(),
            Self::InvalidNamespace { .. } | Self::ReservedNamespace { .. } => "extension.namespace".to_string(),
        }
    }
}

/// A version range placed on an extension by one of its dependents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Constraint {
    pub range: VersionRange,
    /// `id@version` of the manifest declaring the range.
    pub required_by: String,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.required_by, self.range)
    }
}

/// Errors that can occur in the manifest and resolution layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to parse a TOML manifest document.
    #[error("failed to parse extension manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    /// Failed to parse a JSON manifest document.
    #[error("failed to parse extension manifest JSON: {0}")]
    ManifestJson(#[from] serde_json::Error),

    #[error("extension manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest parsed but failed validation.
    #[error("extension manifest is invalid ({} violation(s)): {}", .violations.len(), join(.violations))]
    InvalidManifest { violations: Vec<ManifestViolation> },

    #[error("invalid version range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    #[error("extension '{extension}' has no version {version}")]
    UnknownVersion { extension: String, version: String },

    /// A different manifest was submitted for an accepted (id, version).
    #[error("manifest for {extension}@{version} was already accepted and cannot change")]
    ManifestImmutable { extension: String, version: String },

    /// The dependency graph has a cycle; `path` starts and ends on the same id.
    #[error("circular dependency: {}", .path.join(" → "))]
    CircularDependency { path: Vec<String> },

    #[error(
        "cannot resolve '{extension}': {reason} [{}]",
        .constraints.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    UnresolvableDependency {
        extension: String,
        reason: String,
        constraints: Vec<Constraint>,
    },
}

fn join(violations: &[ManifestViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
