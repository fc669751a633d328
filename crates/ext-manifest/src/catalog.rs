//! Catalog of accepted extension manifests.
//!
//! The catalog holds every (id, version) the platform has accepted and is
//! the set of available versions the resolver chooses from.

use std::collections::BTreeMap;

use semver::Version;

use crate::error::{Error, Result};
use crate::manifest::ExtensionManifest;

/// Accepted manifests, keyed by id then version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestCatalog {
    entries: BTreeMap<String, BTreeMap<Version, ExtensionManifest>>,
}

impl ManifestCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a manifest.
    ///
    /// Returns `Ok(true)` if it was added, `Ok(false)` if the identical
    /// manifest was already present.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestImmutable` if a different manifest was already
    /// accepted under the same id and version.
    pub fn insert(&mut self, manifest: ExtensionManifest) -> Result<bool> {
        let versions = self.entries.entry(manifest.id.clone()).or_default();
        match versions.get(&manifest.version) {
            Some(existing) if *existing == manifest => Ok(false),
            Some(_) => Err(Error::ManifestImmutable {
                extension: manifest.id,
                version: manifest.version.to_string(),
            }),
            None => {
                versions.insert(manifest.version.clone(), manifest);
                Ok(true)
            }
        }
    }

    /// Builder-style insert for fixtures; later duplicates are ignored.
    pub fn with(mut self, manifest: ExtensionManifest) -> Self {
        let _ = self.insert(manifest);
        self
    }

    pub fn get(&self, id: &str, version: &Version) -> Option<&ExtensionManifest> {
        self.entries.get(id).and_then(|v| v.get(version))
    }

    /// Look up a manifest, distinguishing unknown ids from unknown versions.
    pub fn require(&self, id: &str, version: &Version) -> Result<&ExtensionManifest> {
        let versions = self
            .entries
            .get(id)
            .ok_or_else(|| Error::UnknownExtension(id.to_string()))?;
        versions.get(version).ok_or_else(|| Error::UnknownVersion {
            extension: id.to_string(),
            version: version.to_string(),
        })
    }

    /// All versions of `id`, ascending.
    pub fn versions(&self, id: &str) -> impl DoubleEndedIterator<Item = &ExtensionManifest> {
        self.entries.get(id).into_iter().flat_map(|v| v.values())
    }

    /// Highest accepted version of `id`.
    pub fn latest(&self, id: &str) -> Option<&ExtensionManifest> {
        self.entries.get(id).and_then(|v| v.values().next_back())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All catalogued ids (sorted).
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Every manifest, ordered by id then version.
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionManifest> {
        self.entries.values().flat_map(|v| v.values())
    }

    /// Number of catalogued (id, version) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
