//! Schema registry
//!
//! Holds every registered fragment version, the active pointer per
//! namespace, and the latest generated plan per namespace. Readers take a
//! cheap snapshot (`Arc` clone) and never block on writers for longer than
//! the pointer swap; writers build a new state and swap it in.
//!
//! Mutations are serialized per namespace through [`SchemaRegistry::namespace_lock`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use ext_manifest::ManifestCatalog;
use ext_schema::{Namespace, SchemaFragment};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::conflict::{ActiveFragment, ConflictReport};
use crate::error::{Error, Result};
use crate::migration::MigrationPlan;

/// Lifecycle state of a registered fragment version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    /// Registered with conflicts; kept for inspection only
    Pending,
    /// Conflict-free and awaiting migration
    Candidate,
    /// The namespace's current schema
    Active,
    /// Was active, replaced by a later migration
    Superseded,
}

impl SchemaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Candidate => "candidate",
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }

    /// Whether a plan may migrate into this version.
    pub fn is_plannable(&self) -> bool {
        matches!(self, Self::Candidate | Self::Active)
    }
}

impl fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "candidate" => Ok(Self::Candidate),
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            other => Err(format!("unknown schema status '{other}'")),
        }
    }
}

/// One registered fragment version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub schema_id: String,
    pub extension: String,
    pub version: Version,
    pub namespace: Namespace,
    pub fingerprint: String,
    pub fragment: SchemaFragment,
    pub status: SchemaStatus,
    /// Conflicts found at registration; empty unless pending
    pub conflicts: ConflictReport,
    pub registered_at: DateTime<Utc>,
}

/// Derive the schema id `<extension>@<version>#<fingerprint prefix>`.
pub fn schema_id(extension: &str, version: &Version, fingerprint: &str) -> String {
    let prefix: String = fingerprint.chars().take(12).collect();
    format!("{extension}@{version}#{prefix}")
}

/// The version currently active in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePointer {
    pub extension: String,
    pub version: Version,
    pub schema_id: String,
}

/// Outcome of registering a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub schema_id: String,
    pub status: SchemaStatus,
    pub conflicts: ConflictReport,
}

/// Immutable registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    pub manifests: ManifestCatalog,
    pub history: BTreeMap<String, BTreeMap<Version, SchemaEntry>>,
    pub active: BTreeMap<Namespace, ActivePointer>,
    pub latest_plans: BTreeMap<Namespace, MigrationPlan>,
}

impl RegistryState {
    pub fn entry(&self, extension: &str, version: &Version) -> Option<&SchemaEntry> {
        self.history.get(extension)?.get(version)
    }

    /// Look up an entry, distinguishing unknown extensions from missing versions.
    pub fn require_entry(&self, extension: &str, version: &Version) -> Result<&SchemaEntry> {
        let versions = self
            .history
            .get(extension)
            .ok_or_else(|| Error::UnknownExtension(extension.to_string()))?;
        versions.get(version).ok_or_else(|| Error::SchemaNotFound {
            extension: extension.to_string(),
            version: version.to_string(),
        })
    }

    /// All versions of an extension in ascending version order.
    pub fn history_of(&self, extension: &str) -> Vec<&SchemaEntry> {
        self.history
            .get(extension)
            .map(|versions| versions.values().collect())
            .unwrap_or_default()
    }

    /// The active entry owning `namespace`.
    pub fn active_in(&self, namespace: &Namespace) -> Option<&SchemaEntry> {
        let pointer = self.active.get(namespace)?;
        self.entry(&pointer.extension, &pointer.version)
    }

    /// The active entry of an extension, wherever it lives.
    pub fn active_of(&self, extension: &str) -> Option<&SchemaEntry> {
        self.active
            .values()
            .find(|p| p.extension == extension)
            .and_then(|p| self.entry(&p.extension, &p.version))
    }

    /// Every active fragment, for conflict detection.
    pub fn active_fragments(&self) -> Vec<ActiveFragment<'_>> {
        self.active
            .keys()
            .filter_map(|ns| self.active_in(ns))
            .map(|entry| ActiveFragment {
                extension: &entry.extension,
                namespace: &entry.namespace,
                fragment: &entry.fragment,
            })
            .collect()
    }

    pub(crate) fn put_entry(&mut self, entry: SchemaEntry) {
        self.history
            .entry(entry.extension.clone())
            .or_default()
            .insert(entry.version.clone(), entry);
    }

    pub(crate) fn set_status(&mut self, extension: &str, version: &Version, status: SchemaStatus) {
        if let Some(entry) = self
            .history
            .get_mut(extension)
            .and_then(|versions| versions.get_mut(version))
        {
            entry.status = status;
        }
    }
}

/// Shared, concurrently readable registry.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    state: RwLock<Arc<RegistryState>>,
    locks: Mutex<HashMap<Namespace, Arc<Mutex<()>>>>,
}

impl SchemaRegistry {
    pub fn new(state: RegistryState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// A consistent snapshot; later mutations do not affect it.
    pub fn snapshot(&self) -> Result<Arc<RegistryState>> {
        let guard = self.state.read().map_err(|_| Error::LockPoisoned("registry"))?;
        Ok(Arc::clone(&guard))
    }

    /// Apply `f` to a copy of the current state and publish it if `f`
    /// succeeds. Readers see either the old or the new state, never a mix.
    pub fn update<T>(&self, f: impl FnOnce(&mut RegistryState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write().map_err(|_| Error::LockPoisoned("registry"))?;
        let mut next = RegistryState::clone(&guard);
        let value = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(value)
    }

    /// The mutex serializing mutations of `namespace`.
    pub fn namespace_lock(&self, namespace: &Namespace) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| Error::LockPoisoned("namespace table"))?;
        Ok(Arc::clone(locks.entry(namespace.clone()).or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(extension: &str, version: &str, status: SchemaStatus) -> SchemaEntry {
        let fragment = SchemaFragment::empty();
        let version = Version::parse(version).unwrap();
        let fingerprint = fragment.fingerprint();
        SchemaEntry {
            schema_id: schema_id(extension, &version, &fingerprint),
            extension: extension.to_string(),
            version,
            namespace: Namespace::from_extension_id(extension).unwrap(),
            fingerprint,
            fragment,
            status,
            conflicts: ConflictReport::new(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_schema_id_format() {
        let id = schema_id("analytics", &Version::new(1, 2, 0), "0123456789abcdef");
        assert_eq!(id, "analytics@1.2.0#0123456789ab");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SchemaStatus::Pending,
            SchemaStatus::Candidate,
            SchemaStatus::Active,
            SchemaStatus::Superseded,
        ] {
            assert_eq!(status.as_str().parse::<SchemaStatus>().unwrap(), status);
        }
        assert!(!SchemaStatus::Pending.is_plannable());
        assert!(SchemaStatus::Active.is_plannable());
    }

    #[test]
    fn test_snapshot_is_isolated_from_updates() {
        let registry = SchemaRegistry::default();
        let before = registry.snapshot().unwrap();
        registry
            .update(|state| {
                state.put_entry(entry("analytics", "1.0.0", SchemaStatus::Candidate));
                Ok(())
            })
            .unwrap();
        assert!(before.history.is_empty());
        assert_eq!(registry.snapshot().unwrap().history_of("analytics").len(), 1);
    }

    #[test]
    fn test_failed_update_publishes_nothing() {
        let registry = SchemaRegistry::default();
        let result: Result<()> = registry.update(|state| {
            state.put_entry(entry("analytics", "1.0.0", SchemaStatus::Candidate));
            Err(Error::UnknownExtension("analytics".into()))
        });
        assert!(result.is_err());
        assert!(registry.snapshot().unwrap().history.is_empty());
    }

    #[test]
    fn test_active_lookups() {
        let mut state = RegistryState::default();
        state.put_entry(entry("analytics", "1.0.0", SchemaStatus::Active));
        state.put_entry(entry("analytics", "2.0.0", SchemaStatus::Candidate));
        let ns = Namespace::new("analytics").unwrap();
        state.active.insert(
            ns.clone(),
            ActivePointer {
                extension: "analytics".into(),
                version: Version::new(1, 0, 0),
                schema_id: "x".into(),
            },
        );

        assert_eq!(state.active_in(&ns).unwrap().version, Version::new(1, 0, 0));
        assert_eq!(state.active_of("analytics").unwrap().version, Version::new(1, 0, 0));
        assert_eq!(state.active_fragments().len(), 1);
        assert!(matches!(
            state.require_entry("analytics", &Version::new(3, 0, 0)),
            Err(Error::SchemaNotFound { .. })
        ));
        assert!(matches!(
            state.require_entry("other", &Version::new(1, 0, 0)),
            Err(Error::UnknownExtension(_))
        ));

        state.set_status("analytics", &Version::new(2, 0, 0), SchemaStatus::Active);
        let statuses: Vec<_> = state.history_of("analytics").iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![SchemaStatus::Active, SchemaStatus::Active]);
    }

    #[test]
    fn test_namespace_lock_is_shared_per_namespace() {
        let registry = SchemaRegistry::default();
        let ns = Namespace::new("analytics").unwrap();
        let a = registry.namespace_lock(&ns).unwrap();
        let b = registry.namespace_lock(&ns).unwrap();
        let other = registry.namespace_lock(&Namespace::new("crm").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
