//! Exhaustive validation results

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a single violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Malformed manifest identity, version, range, permission, or namespace
    Manifest,
    /// Type, required-ness, bound, enum membership, or uniqueness
    ConstraintViolation,
    /// A declared relationship does not resolve to an existing row
    RelationshipIntegrity,
    /// The record carries a field its entity does not declare
    UnknownField,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::RelationshipIntegrity => write!(f, "relationship_integrity"),
            Self::UnknownField => write!(f, "unknown_field"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataViolation {
    pub kind: ViolationKind,
    /// Where the problem is, e.g. `reports.title`
    pub path: String,
    pub message: String,
}

impl DataViolation {
    pub fn new(kind: ViolationKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DataViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}] {}", self.kind, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
        }
    }
}

/// Every problem found in one pass; `valid` iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<DataViolation>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<DataViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &DataViolation> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
