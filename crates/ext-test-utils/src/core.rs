//! [`TestCore`]: an isolated engine for test scenarios.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use ext_core::{EngineConfig, MigrationPlan, MigrationRecord, Registration, SchemaCore, SchemaStatus};
use ext_schema::SchemaFragment;
use tempfile::TempDir;

use crate::fragments;
use crate::manifest::ManifestBuilder;

/// A [`SchemaCore`] over its own store, in memory or in a temporary file.
///
/// Derefs to the core, so every engine operation is available directly.
///
/// # Example
///
/// ```rust,no_run
/// use ext_test_utils::{ManifestBuilder, TestCore, fragments};
///
/// let core = TestCore::in_memory();
/// core.install(&ManifestBuilder::new("reporting", "1.0.0"), fragments::reporting_v1());
/// ```
pub struct TestCore {
    core: SchemaCore,
    dir: Option<TempDir>,
    config: EngineConfig,
}

impl TestCore {
    /// In-memory store with the fixture host schema.
    pub fn in_memory() -> Self {
        Self::with_config(EngineConfig::in_memory(fragments::host()))
    }

    /// Store in a fresh temporary directory; see [`TestCore::reopen`].
    pub fn on_disk() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = EngineConfig::in_memory(fragments::host());
        config.store.path = Some(dir.path().join("extensions.db"));
        let core = SchemaCore::open(config.clone()).unwrap();
        Self {
            core,
            dir: Some(dir),
            config,
        }
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            core: SchemaCore::open(config.clone()).unwrap(),
            dir: None,
            config,
        }
    }

    /// Database file, for on-disk cores.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.config.store.path.clone()
    }

    /// Directory holding the database, for on-disk cores.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Drop the engine and open a new one on the same database file.
    ///
    /// # Panics
    /// Panics for in-memory cores, whose state does not survive.
    pub fn reopen(self) -> Self {
        assert!(self.dir.is_some(), "TestCore::reopen needs an on-disk core");
        let Self { core, dir, config } = self;
        drop(core);
        Self {
            core: SchemaCore::open(config.clone()).unwrap(),
            dir,
            config,
        }
    }

    /// Submit a manifest, asserting it is accepted.
    pub fn submit(&self, manifest: &ManifestBuilder) {
        let result = self.core.submit_manifest(manifest.id(), &manifest.to_toml()).unwrap();
        assert!(result.valid, "manifest rejected: {:?}", result.errors);
    }

    /// Submit and register; returns the registration without asserting its status.
    pub fn register(&self, manifest: &ManifestBuilder, fragment: SchemaFragment) -> Registration {
        self.submit(manifest);
        let (id, version) = identity(manifest);
        self.core.register_fragment(&id, &version, fragment).unwrap()
    }

    /// Submit, register, plan from the active version, and execute with confirmation.
    ///
    /// # Panics
    /// Panics if any step fails or the fragment conflicts.
    pub fn install(&self, manifest: &ManifestBuilder, fragment: SchemaFragment) -> MigrationRecord {
        let registration = self.register(manifest, fragment);
        assert_ne!(
            registration.status,
            SchemaStatus::Pending,
            "fragment conflicts: {:?}",
            registration.conflicts
        );
        let plan = self.plan(manifest);
        self.core.execute_migration(&plan, true, Some("test")).unwrap()
    }

    /// Plan from the extension's active version (if any) to the manifest's version.
    pub fn plan(&self, manifest: &ManifestBuilder) -> MigrationPlan {
        let (id, version) = identity(manifest);
        let from = self
            .core
            .snapshot()
            .unwrap()
            .active_of(&id)
            .map(|e| e.version.clone());
        self.core
            .generate_migration_plan(&id, from.as_ref(), &version)
            .unwrap()
    }
}

impl Deref for TestCore {
    type Target = SchemaCore;

    fn deref(&self) -> &SchemaCore {
        &self.core
    }
}

fn identity(manifest: &ManifestBuilder) -> (String, semver::Version) {
    (manifest.id().to_string(), crate::v(manifest.version()))
}
