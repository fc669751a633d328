//! Error types for ext-schema

use std::fmt;

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

/// One problem found while validating a fragment document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentViolation {
    /// Dotted location, e.g. `entities.reports.fields.title`.
    pub path: String,
    pub message: String,
}

impl FragmentViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FragmentViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse fragment document: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to parse JSON document: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid namespace '{name}': {reason}")]
    InvalidNamespace { name: String, reason: String },

    #[error("schema fragment is invalid ({} violation(s)): {}", .violations.len(), join(.violations))]
    InvalidFragment { violations: Vec<FragmentViolation> },
}

fn join(violations: &[FragmentViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
