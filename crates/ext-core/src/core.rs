//! The engine facade
//!
//! [`SchemaCore`] is the explicit registry object every operation goes
//! through. It owns the store and the in-memory registry; nothing here is
//! global, so tests construct as many isolated cores as they need.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use ext_manifest::{ExtensionManifest, ManifestDocument, ManifestViolation, Permission, ResolutionResult, resolve};
use ext_schema::{Namespace, SchemaFragment};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{DEFAULT_ACTOR, MigrationRecord};
use crate::config::EngineConfig;
use crate::conflict::{ConflictDetector, ConflictReport};
use crate::data::{self, DataValidator, DeleteOutcome};
use crate::error::{Error, Result};
use crate::migration::executor::apply_plan;
use crate::migration::{MigrationPlan, PlanTarget, SafetyReport};
use crate::registry::{
    ActivePointer, Registration, RegistryState, SchemaEntry, SchemaRegistry, SchemaStatus, schema_id,
};
use crate::store::{self, SqliteStore, StoreShape};
use crate::validation::{DataViolation, ValidationResult, ViolationKind};

/// Documents starting with `{` are JSON; anything else is TOML.
fn is_json(document: &str) -> bool {
    document.trim_start().starts_with('{')
}

/// One registered version of an extension, for status listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStatus {
    pub version: Version,
    /// `None` when the manifest is known but no schema was registered
    pub status: Option<SchemaStatus>,
    pub schema_id: Option<String>,
}

/// Everything known about one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStatus {
    pub extension: String,
    pub namespace: Namespace,
    pub active: Option<Version>,
    pub versions: Vec<VersionStatus>,
}

/// Extension schema engine.
#[derive(Debug)]
pub struct SchemaCore {
    config: EngineConfig,
    exclusive_pairs: Vec<(Permission, Permission)>,
    store: SqliteStore,
    registry: SchemaRegistry,
}

impl SchemaCore {
    /// Open the store named by `config` and rehydrate the registry from it.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.store, &config.host)?;
        let state = store.load_state()?;
        tracing::info!(
            extensions = state.history.len(),
            active = state.active.len(),
            "schema core opened"
        );
        Ok(Self {
            exclusive_pairs: config.exclusive_pairs(),
            config,
            store,
            registry: SchemaRegistry::new(state),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Consistent view of the registry.
    pub fn snapshot(&self) -> Result<Arc<RegistryState>> {
        self.registry.snapshot()
    }

    fn detector(&self) -> ConflictDetector<'_> {
        ConflictDetector::new(&self.config.host, &self.exclusive_pairs)
    }

    /// Validate a manifest document and, if valid, add it to the catalog.
    ///
    /// Every problem is reported in the returned result; nothing is stored
    /// unless the manifest is valid. Re-submitting an identical manifest is
    /// a no-op.
    pub fn submit_manifest(&self, extension_id: &str, document: &str) -> Result<ValidationResult> {
        let parsed = if is_json(document) {
            ManifestDocument::from_json(document)
        } else {
            ManifestDocument::from_toml(document)
        };
        let parsed = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                return Ok(ValidationResult::from_errors(vec![DataViolation::new(
                    ViolationKind::Manifest,
                    "",
                    e.to_string(),
                )]));
            }
        };

        let mut violations = Vec::new();
        if let Some(found) = parsed.extension.id.as_deref().filter(|id| *id != extension_id) {
            violations.push(ManifestViolation::IdMismatch {
                expected: extension_id.to_string(),
                found: found.to_string(),
            });
        }
        let manifest = match parsed.validate(&self.config.manifest_policy()) {
            Ok(manifest) if violations.is_empty() => manifest,
            Ok(_) => return Ok(manifest_result(violations)),
            Err(mut found) => {
                violations.append(&mut found);
                return Ok(manifest_result(violations));
            }
        };

        let snapshot = self.registry.snapshot()?;
        if let Some(existing) = snapshot.manifests.get(&manifest.id, &manifest.version) {
            if existing == &manifest {
                tracing::debug!(extension = %manifest.id, version = %manifest.version, "manifest already accepted");
                return Ok(ValidationResult::ok());
            }
            return Ok(immutable_result(&manifest));
        }

        self.store.save_manifest(&manifest)?;
        let inserted = self
            .registry
            .update(|state| state.manifests.insert(manifest.clone()).map_err(Error::from));
        match inserted {
            Ok(_) => {
                tracing::info!(extension = %manifest.id, version = %manifest.version, "manifest accepted");
                Ok(ValidationResult::ok())
            }
            Err(Error::Manifest(ext_manifest::Error::ManifestImmutable { .. })) => Ok(immutable_result(&manifest)),
            Err(e) => Err(e),
        }
    }

    /// Parse a fragment document and register it. See [`Self::register_fragment`].
    pub fn register_schema(&self, extension_id: &str, version: &Version, document: &str) -> Result<Registration> {
        let fragment = if is_json(document) {
            SchemaFragment::from_json(document)?
        } else {
            SchemaFragment::from_toml(document)?
        };
        self.register_fragment(extension_id, version, fragment)
    }

    /// Register a fragment version for an extension whose manifest was
    /// submitted.
    ///
    /// The fragment is checked against every active fragment of other
    /// extensions. With conflicts it is stored as `pending` and never
    /// promoted; without, it becomes a `candidate` for migration. The
    /// conflicts are returned either way.
    ///
    /// # Errors
    ///
    /// Fails if the fragment is invalid, the manifest is unknown, or a
    /// different fragment is already registered for the same version.
    pub fn register_fragment(
        &self,
        extension_id: &str,
        version: &Version,
        fragment: SchemaFragment,
    ) -> Result<Registration> {
        fragment.validate()?;
        let manifest = self
            .registry
            .snapshot()?
            .manifests
            .require(extension_id, version)?
            .clone();

        let lock = self.registry.namespace_lock(&manifest.namespace)?;
        let _guard = lock.lock().map_err(|_| Error::LockPoisoned("namespace"))?;
        let state = self.registry.snapshot()?;
        let fingerprint = fragment.fingerprint();

        if let Some(existing) = state.entry(extension_id, version) {
            if existing.fingerprint != fingerprint {
                tracing::warn!(extension = extension_id, version = %version, "schema change rejected");
                return Err(Error::SchemaImmutable {
                    extension: extension_id.to_string(),
                    version: version.to_string(),
                });
            }
            if existing.status != SchemaStatus::Pending {
                return Ok(Registration {
                    schema_id: existing.schema_id.clone(),
                    status: existing.status,
                    conflicts: existing.conflicts.clone(),
                });
            }
        }

        let conflicts = self
            .detector()
            .detect(&manifest, &fragment, &state.active_fragments());
        let status = if conflicts.is_empty() {
            SchemaStatus::Candidate
        } else {
            SchemaStatus::Pending
        };
        let entry = SchemaEntry {
            schema_id: schema_id(extension_id, version, &fingerprint),
            extension: extension_id.to_string(),
            version: version.clone(),
            namespace: manifest.namespace.clone(),
            fingerprint,
            fragment,
            status,
            conflicts: conflicts.clone(),
            registered_at: state
                .entry(extension_id, version)
                .map_or_else(Utc::now, |e| e.registered_at),
        };

        self.store.save_schema(&entry)?;
        let registration = Registration {
            schema_id: entry.schema_id.clone(),
            status,
            conflicts,
        };
        self.registry.update(|state| {
            state.put_entry(entry);
            Ok(())
        })?;

        if status == SchemaStatus::Pending {
            tracing::warn!(
                extension = extension_id,
                version = %version,
                conflicts = registration.conflicts.len(),
                "schema registered as pending"
            );
        } else {
            tracing::info!(extension = extension_id, version = %version, schema_id = %registration.schema_id, "schema registered");
        }
        Ok(registration)
    }

    /// Conflicts `fragment` would have if registered for `extension_id@version`.
    pub fn detect_conflicts(
        &self,
        extension_id: &str,
        version: &Version,
        fragment: &SchemaFragment,
    ) -> Result<ConflictReport> {
        let state = self.registry.snapshot()?;
        let manifest = state.manifests.require(extension_id, version)?;
        Ok(self.detector().detect(manifest, fragment, &state.active_fragments()))
    }

    /// Resolve the dependency closure of `extension_id@version` against the
    /// current manifest catalog.
    pub fn resolve_dependencies(&self, extension_id: &str, version: &Version) -> Result<ResolutionResult> {
        let state = self.registry.snapshot()?;
        Ok(resolve(&state.manifests, extension_id, version)?)
    }

    /// Generate the plan taking an extension from `from` (or nothing) to `to`.
    ///
    /// The plan becomes the latest for its namespace; any earlier plan for
    /// the namespace is stale from now on. Every dependency in the
    /// resolution must already be installed; the plan records their active
    /// versions and execution fails as stale if any of them changes.
    pub fn generate_migration_plan(
        &self,
        extension_id: &str,
        from: Option<&Version>,
        to: &Version,
    ) -> Result<MigrationPlan> {
        let state = self.registry.snapshot()?;
        let to_entry = state.require_entry(extension_id, to)?;
        match to_entry.status {
            SchemaStatus::Pending => {
                return Err(Error::Conflicts {
                    extension: extension_id.to_string(),
                    version: to.to_string(),
                    report: to_entry.conflicts.clone(),
                });
            }
            status if !status.is_plannable() => {
                return Err(Error::SchemaNotPlannable {
                    extension: extension_id.to_string(),
                    version: to.to_string(),
                    status: status.to_string(),
                });
            }
            _ => {}
        }

        let from_entry = from.map(|v| state.require_entry(extension_id, v)).transpose()?;
        if let Some(from_entry) = from_entry.filter(|e| e.namespace != to_entry.namespace) {
            return Err(Error::NamespaceMismatch {
                extension: extension_id.to_string(),
                from: from_entry.namespace.to_string(),
                to: to_entry.namespace.to_string(),
            });
        }

        let resolution = resolve(&state.manifests, extension_id, to)?;
        let manifest = state.manifests.require(extension_id, to)?;
        let namespace = &to_entry.namespace;
        let observed_active = state.active.get(namespace).map(|p| &p.version);
        let dependency_versions = installed_dependencies(&state, manifest, &resolution)?;

        let plan = MigrationPlan::generate(
            PlanTarget {
                extension: extension_id,
                namespace,
                from: from_entry.map(|e| (&e.version, &e.fragment)),
                to: (to, &to_entry.fragment),
                observed_active,
            },
            manifest.dependencies.clone(),
            resolution.selected,
        )
        .with_dependency_versions(dependency_versions);

        self.store.save_latest_plan(&plan)?;
        self.registry.update(|state| {
            state.latest_plans.insert(plan.namespace.clone(), plan.clone());
            Ok(())
        })?;
        tracing::info!(
            plan = %plan.id,
            migration = %plan.summary(),
            operations = plan.operations.len(),
            risk = %plan.max_risk(),
            "migration plan generated"
        );
        Ok(plan)
    }

    /// The latest plan generated for the extension, if it is still the
    /// latest for its namespace.
    pub fn latest_plan(&self, extension_id: &str) -> Result<Option<MigrationPlan>> {
        Ok(self
            .registry
            .snapshot()?
            .latest_plans
            .values()
            .find(|plan| plan.extension == extension_id)
            .cloned())
    }

    /// Which operations of `plan` need confirmation under the configured policy.
    pub fn validate_migration_safety(&self, plan: &MigrationPlan) -> SafetyReport {
        SafetyReport::for_plan(plan, self.config.policy.block_risky)
    }

    /// Execute a plan in one transaction and promote its target version.
    ///
    /// Confirmation is checked before any lock is taken. Under the namespace
    /// lock the plan is revalidated against the current registry, then every
    /// operation is applied; on failure nothing is kept, the active pointer
    /// is unchanged, and a `rolled_back` record is appended.
    ///
    /// # Errors
    ///
    /// * `UnsafeMigration` - gated operations without confirmation
    /// * `StaleResolution` - the registry moved since the plan was generated
    /// * `MigrationExecution` - the store rejected an operation
    pub fn execute_migration(
        &self,
        plan: &MigrationPlan,
        confirm_destructive: bool,
        actor: Option<&str>,
    ) -> Result<MigrationRecord> {
        let actor = actor.unwrap_or(DEFAULT_ACTOR);
        let block_risky = self.config.policy.block_risky;
        let safety = SafetyReport::for_plan(plan, block_risky);
        if safety.blocked_without_confirmation && !confirm_destructive {
            tracing::warn!(plan = %plan.id, migration = %plan.summary(), "unconfirmed migration refused");
            return Err(Error::UnsafeMigration {
                operations: safety.gated_operations(block_risky),
            });
        }

        let lock = self.registry.namespace_lock(&plan.namespace)?;
        let _guard = lock.lock().map_err(|_| Error::LockPoisoned("namespace"))?;
        let started_at = Utc::now();
        let state = self.registry.snapshot()?;
        self.revalidate(&state, plan)?;

        let from_fragment = match &plan.from_version {
            Some(v) => state.require_entry(&plan.extension, v)?.fragment.clone(),
            None => SchemaFragment::empty(),
        };
        let to_entry = state.require_entry(&plan.extension, &plan.to_version)?;
        let previous = state.active.get(&plan.namespace).cloned();
        let pointer = ActivePointer {
            extension: plan.extension.clone(),
            version: plan.to_version.clone(),
            schema_id: to_entry.schema_id.clone(),
        };

        let committed = {
            let mut conn = self.store.connection()?;
            let tx = conn.transaction()?;
            match apply_plan(&tx, &from_fragment, plan) {
                Ok(executed) => {
                    let record = MigrationRecord::applied(plan, actor, started_at, executed);
                    let catalog = (|| -> Result<()> {
                        if let Some(prev) = previous.as_ref().filter(|p| p.version != plan.to_version) {
                            store::set_status(&tx, &prev.extension, &prev.version, SchemaStatus::Superseded)?;
                        }
                        store::set_status(&tx, &plan.extension, &plan.to_version, SchemaStatus::Active)?;
                        store::set_active(&tx, &plan.namespace, &pointer)?;
                        store::append_record(&tx, &record)?;
                        Ok(())
                    })();
                    catalog
                        .and_then(|()| tx.commit().map_err(Error::from))
                        .map(|()| record)
                        .map_err(|e| (None, e))
                }
                Err(failure) => Err((Some(failure.operation), failure.error)),
            }
        };

        match committed {
            Ok(record) => {
                self.registry.update(|state| {
                    if let Some(prev) = previous.as_ref().filter(|p| p.version != plan.to_version) {
                        state.set_status(&prev.extension, &prev.version, SchemaStatus::Superseded);
                    }
                    state.set_status(&plan.extension, &plan.to_version, SchemaStatus::Active);
                    state.active.insert(plan.namespace.clone(), pointer);
                    Ok(())
                })?;
                tracing::info!(
                    plan = %plan.id,
                    migration = %plan.summary(),
                    operations = record.executed_operations.len(),
                    actor,
                    "migration applied"
                );
                Ok(record)
            }
            Err((operation, error)) => {
                let reason = error.to_string();
                tracing::warn!(
                    plan = %plan.id,
                    migration = %plan.summary(),
                    operation = operation.as_deref().unwrap_or("-"),
                    error = %reason,
                    "migration rolled back"
                );
                let record = MigrationRecord::rolled_back(plan, actor, started_at, operation.clone(), reason.clone());
                self.store.append_record(&record)?;
                Err(Error::MigrationExecution {
                    extension: plan.extension.clone(),
                    operation,
                    reason,
                })
            }
        }
    }

    /// Check that nothing `plan` depends on has moved since it was generated.
    fn revalidate(&self, state: &RegistryState, plan: &MigrationPlan) -> Result<()> {
        let stale = |reason: String| {
            tracing::warn!(plan = %plan.id, namespace = %plan.namespace, reason = %reason, "stale plan");
            Err(Error::StaleResolution {
                namespace: plan.namespace.to_string(),
                reason,
            })
        };

        if state.latest_plans.get(&plan.namespace) != Some(plan) {
            return stale(format!("plan {} is not the latest plan for the namespace", plan.id));
        }

        let active = state.active.get(&plan.namespace);
        let active_version = active.map(|p| &p.version);
        if active_version != plan.observed_active.as_ref() {
            return stale(format!(
                "active version changed from {} to {}",
                display_version(plan.observed_active.as_ref()),
                display_version(active_version)
            ));
        }
        if let Some(owner) = active.filter(|p| p.extension != plan.extension) {
            return stale(format!("namespace is owned by '{}'", owner.extension));
        }
        if active_version != plan.from_version.as_ref() {
            return stale(format!(
                "plan starts from {} but {} is active",
                display_version(plan.from_version.as_ref()),
                display_version(active_version)
            ));
        }

        for (dependency, observed) in &plan.dependency_versions {
            let current = state.active_of(dependency).map(|e| &e.version);
            if current != Some(observed) {
                return stale(format!(
                    "dependency '{dependency}' changed from {observed} to {}",
                    display_version(current)
                ));
            }
        }

        for (dependency, range) in &plan.dependency_ranges {
            match state.active_of(dependency) {
                None => return stale(format!("dependency '{dependency}' is not active")),
                Some(entry) if !range.matches(&entry.version) => {
                    return stale(format!(
                        "dependency '{dependency}' is active at {}, outside {range}",
                        entry.version
                    ));
                }
                Some(_) => {}
            }
        }

        let manifest = state.manifests.require(&plan.extension, &plan.to_version)?;
        let to_entry = state.require_entry(&plan.extension, &plan.to_version)?;
        let report = self
            .detector()
            .detect(manifest, &to_entry.fragment, &state.active_fragments());
        if !report.is_empty() {
            let details: Vec<String> = report.iter().map(ToString::to_string).collect();
            return stale(format!("target schema now conflicts: {}", details.join("; ")));
        }
        Ok(())
    }

    /// Validate a record for `namespace.entity` without writing it.
    pub fn validate_entity_data(&self, namespace: &Namespace, entity: &str, record: &Value) -> Result<ValidationResult> {
        let state = self.registry.snapshot()?;
        let conn = self.store.connection()?;
        DataValidator::new(&state, &self.config.host).validate(&conn, namespace, entity, record)
    }

    /// Validate and write a record; returns its id.
    pub fn insert_record(&self, namespace: &Namespace, entity: &str, record: &Value) -> Result<String> {
        let state = self.registry.snapshot()?;
        let conn = self.store.connection()?;
        let validator = DataValidator::new(&state, &self.config.host);
        data::insert_record(&conn, &validator, namespace, entity, record)
    }

    /// Delete a record and apply the cascade policy of every relationship
    /// pointing at it, atomically.
    pub fn delete_record(&self, namespace: &Namespace, entity: &str, id: &str) -> Result<DeleteOutcome> {
        let state = self.registry.snapshot()?;
        let mut conn = self.store.connection()?;
        let tx = conn.transaction()?;
        let outcome = data::delete_record(&tx, &state, namespace, entity, id)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// The active fragment of an extension, if it has one.
    pub fn get_active_schema(&self, extension_id: &str) -> Result<Option<SchemaFragment>> {
        Ok(self
            .registry
            .snapshot()?
            .active_of(extension_id)
            .map(|entry| entry.fragment.clone()))
    }

    /// Every registered version of an extension, oldest first.
    pub fn get_schema_history(&self, extension_id: &str) -> Result<Vec<SchemaEntry>> {
        let state = self.registry.snapshot()?;
        if !state.history.contains_key(extension_id) && !state.manifests.contains(extension_id) {
            return Err(Error::UnknownExtension(extension_id.to_string()));
        }
        Ok(state.history_of(extension_id).into_iter().cloned().collect())
    }

    /// Audit records, oldest first.
    pub fn migration_log(&self, extension_id: Option<&str>) -> Result<Vec<MigrationRecord>> {
        self.store.migration_log(extension_id)
    }

    pub fn store_shape(&self) -> Result<StoreShape> {
        self.store.shape()
    }

    /// Row count of an entity's table.
    pub fn count_records(&self, namespace: &Namespace, entity: &str) -> Result<u64> {
        let state = self.registry.snapshot()?;
        let (_, def) = DataValidator::new(&state, &self.config.host).target(namespace, entity)?;
        self.store.count_rows(&def.storage_name(namespace))
    }

    /// Per-extension summary of manifests, registered versions, and the
    /// active version.
    pub fn status(&self) -> Result<Vec<ExtensionStatus>> {
        let state = self.registry.snapshot()?;
        let ids: BTreeSet<&str> = state
            .manifests
            .ids()
            .into_iter()
            .chain(state.history.keys().map(String::as_str))
            .collect();

        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            let mut versions: Vec<VersionStatus> = state
                .manifests
                .versions(id)
                .map(|m| {
                    let entry = state.entry(id, &m.version);
                    VersionStatus {
                        version: m.version.clone(),
                        status: entry.map(|e| e.status),
                        schema_id: entry.map(|e| e.schema_id.clone()),
                    }
                })
                .collect();
            for entry in state.history_of(id) {
                if !versions.iter().any(|v| v.version == entry.version) {
                    versions.push(VersionStatus {
                        version: entry.version.clone(),
                        status: Some(entry.status),
                        schema_id: Some(entry.schema_id.clone()),
                    });
                }
            }
            versions.sort_by(|a, b| a.version.cmp(&b.version));

            let namespace = match state.manifests.latest(id) {
                Some(m) => m.namespace.clone(),
                None => match state.history_of(id).first() {
                    Some(entry) => entry.namespace.clone(),
                    None => continue,
                },
            };
            statuses.push(ExtensionStatus {
                extension: id.to_string(),
                namespace,
                active: state.active_of(id).map(|e| e.version.clone()),
                versions,
            });
        }
        Ok(statuses)
    }

    /// Manifest catalogued for `extension_id@version`.
    pub fn manifest(&self, extension_id: &str, version: &Version) -> Result<ExtensionManifest> {
        Ok(self.registry.snapshot()?.manifests.require(extension_id, version)?.clone())
    }
}

/// Active version of every dependency in the resolution.
///
/// Each one must be installed, and a direct dependency must be installed
/// within the range the manifest places on it.
fn installed_dependencies(
    state: &RegistryState,
    manifest: &ExtensionManifest,
    resolution: &ResolutionResult,
) -> Result<BTreeMap<String, Version>> {
    let not_installed = |dependency: &str, reason: String| Error::DependencyNotInstalled {
        extension: manifest.id.clone(),
        dependency: dependency.to_string(),
        reason,
    };

    let mut versions = BTreeMap::new();
    for dependency in resolution.selected.keys().filter(|id| **id != manifest.id) {
        let active = state
            .active_of(dependency)
            .ok_or_else(|| not_installed(dependency, "has no active schema".to_string()))?;
        if let Some(range) = manifest.dependencies.get(dependency) {
            if !range.matches(&active.version) {
                return Err(not_installed(
                    dependency,
                    format!("is active at {}, outside {range}", active.version),
                ));
            }
        }
        versions.insert(dependency.clone(), active.version.clone());
    }
    Ok(versions)
}

fn display_version(version: Option<&Version>) -> String {
    version.map_or_else(|| "nothing".to_string(), ToString::to_string)
}

fn manifest_result(violations: Vec<ManifestViolation>) -> ValidationResult {
    ValidationResult::from_errors(
        violations
            .into_iter()
            .map(|v| DataViolation::new(ViolationKind::Manifest, v.path(), v.to_string()))
            .collect(),
    )
}

fn immutable_result(manifest: &ExtensionManifest) -> ValidationResult {
    tracing::warn!(extension = %manifest.id, version = %manifest.version, "manifest change rejected");
    ValidationResult::from_errors(vec![DataViolation::new(
        ViolationKind::Manifest,
        "extension.version",
        format!("{} is already accepted with different content", manifest.key()),
    )])
}
