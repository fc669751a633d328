//! Extension manifests and dependency resolution.
//!
//! This crate provides manifest parsing and validation, the version-range
//! grammar, the permission set, the catalog of accepted manifests, and the
//! resolver that turns declared ranges into a consistent install plan.

pub mod catalog;
pub mod dependency;
pub mod error;
pub mod manifest;
pub mod permission;
pub mod resolver;
pub mod version;

pub use catalog::ManifestCatalog;
pub use dependency::{DependencyGraph, DependencyNode};
pub use error::{Constraint, Error, ManifestViolation, Result};
pub use manifest::{ExtensionManifest, ManifestDocument, ManifestPolicy};
pub use permission::{DEFAULT_EXCLUSIVE_PAIRS, Permission};
pub use resolver::{ResolutionResult, resolve};
pub use version::{RangeKind, VersionRange};
