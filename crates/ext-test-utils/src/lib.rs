//! Shared test fixtures for the extension-schema workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`manifest`]: [`ManifestBuilder`](manifest::ManifestBuilder) for manifest documents
//! - [`fragments`]: canned fragments used across suites (reporting V1/V2, plugins)
//! - [`core`]: [`TestCore`](core::TestCore), an isolated engine with install helpers

pub mod core;
pub mod fragments;
pub mod manifest;

pub use core::TestCore;
pub use manifest::ManifestBuilder;

/// Parse a version literal.
///
/// # Panics
/// Panics if `v` is not valid semver.
pub fn v(v: &str) -> semver::Version {
    semver::Version::parse(v).unwrap_or_else(|e| panic!("bad test version '{v}': {e}"))
}
