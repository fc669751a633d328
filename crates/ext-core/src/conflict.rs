//! Cross-namespace conflict detection
//!
//! A candidate fragment is checked against the host schema and every
//! currently active fragment of *other* extensions. All conflicts are
//! collected; detection never stops at the first one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ext_manifest::{ExtensionManifest, Permission, permission::exclusive_violations};
use ext_schema::{EntityDef, HostSchema, Namespace, SchemaFragment};

use crate::store::ddl;
use serde::{Deserialize, Serialize};

/// What kind of rule a conflict breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    NameConflict,
    PermissionConflict,
    RelationshipTargetMissing,
}

/// Which storage catalog a name conflict occurs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSubtype {
    Namespace,
    Table,
    Enum,
    Index,
}

/// One detected conflict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<NameSubtype>,
    pub subject_namespace: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_namespace: Option<Namespace>,
    pub detail: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.kind, self.subtype) {
            (ConflictKind::NameConflict, Some(NameSubtype::Namespace)) => "name_conflict(namespace)",
            (ConflictKind::NameConflict, Some(NameSubtype::Table)) => "name_conflict(table)",
            (ConflictKind::NameConflict, Some(NameSubtype::Enum)) => "name_conflict(enum)",
            (ConflictKind::NameConflict, Some(NameSubtype::Index)) => "name_conflict(index)",
            (ConflictKind::NameConflict, None) => "name_conflict",
            (ConflictKind::PermissionConflict, _) => "permission_conflict",
            (ConflictKind::RelationshipTargetMissing, _) => "relationship_target_missing",
        };
        write!(f, "[{kind}] {}", self.detail)
    }
}

/// The complete set of conflicts for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    conflicts: BTreeSet<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.insert(conflict);
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    pub fn of_kind(&self, kind: ConflictKind) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(move |c| c.kind == kind)
    }

    /// Name conflicts in one storage catalog.
    pub fn names(&self, subtype: NameSubtype) -> impl Iterator<Item = &Conflict> {
        self.conflicts
            .iter()
            .filter(move |c| c.kind == ConflictKind::NameConflict && c.subtype == Some(subtype))
    }
}

/// An active fragment as seen by the detector.
#[derive(Debug, Clone, Copy)]
pub struct ActiveFragment<'a> {
    pub extension: &'a str,
    pub namespace: &'a Namespace,
    pub fragment: &'a SchemaFragment,
}

/// Checks candidates against the host schema, active fragments, and
/// permission policy.
#[derive(Debug, Clone)]
pub struct ConflictDetector<'a> {
    host: &'a HostSchema,
    exclusive_pairs: &'a [(Permission, Permission)],
}

impl<'a> ConflictDetector<'a> {
    pub fn new(host: &'a HostSchema, exclusive_pairs: &'a [(Permission, Permission)]) -> Self {
        Self {
            host,
            exclusive_pairs,
        }
    }

    /// Detect every conflict the candidate would introduce.
    ///
    /// Active fragments owned by the candidate's own extension are ignored:
    /// a new version replaces them rather than competing with them.
    pub fn detect(
        &self,
        manifest: &ExtensionManifest,
        fragment: &SchemaFragment,
        active: &[ActiveFragment<'_>],
    ) -> ConflictReport {
        let own = &manifest.namespace;
        let others: Vec<&ActiveFragment<'_>> = active.iter().filter(|a| a.extension != manifest.id).collect();
        let mut report = ConflictReport::new();

        for other in &others {
            if other.namespace == own {
                report.push(Conflict {
                    kind: ConflictKind::NameConflict,
                    subtype: Some(NameSubtype::Namespace),
                    subject_namespace: own.clone(),
                    other_namespace: Some(other.namespace.clone()),
                    detail: format!("namespace '{own}' is already owned by extension '{}'", other.extension),
                });
            }
        }

        self.table_conflicts(own, fragment, &others, &mut report);
        index_conflicts(self.host, own, fragment, &others, &mut report);
        enum_conflicts(own, fragment, &others, &mut report);
        self.relationship_conflicts(manifest, fragment, &others, &mut report);

        for (a, b) in exclusive_violations(&manifest.permissions, self.exclusive_pairs) {
            report.push(Conflict {
                kind: ConflictKind::PermissionConflict,
                subtype: None,
                subject_namespace: own.clone(),
                other_namespace: None,
                detail: format!("'{}' requests mutually exclusive permissions '{a}' and '{b}'", manifest.id),
            });
        }

        tracing::debug!(
            extension = %manifest.id,
            namespace = %own,
            conflicts = report.len(),
            "conflict detection finished"
        );
        report
    }

    fn table_conflicts(
        &self,
        own: &Namespace,
        fragment: &SchemaFragment,
        others: &[&ActiveFragment<'_>],
        report: &mut ConflictReport,
    ) {
        // storage name -> (owning namespace, entity name)
        let mut claims: BTreeMap<String, (Namespace, String)> = BTreeMap::new();
        for (storage, entity) in self.host.storage_claims() {
            claims.insert(storage.to_string(), (Namespace::host(), entity.to_string()));
        }
        for other in others {
            for entity in other.fragment.entities.values() {
                claims
                    .entry(entity.storage_name(other.namespace))
                    .or_insert_with(|| (other.namespace.clone(), entity.name.clone()));
            }
        }

        for entity in fragment.entities.values() {
            let storage = entity.storage_name(own);
            if let Some((ns, claimed_by)) = claims.get(&storage) {
                report.push(Conflict {
                    kind: ConflictKind::NameConflict,
                    subtype: Some(NameSubtype::Table),
                    subject_namespace: own.clone(),
                    other_namespace: Some(ns.clone()),
                    detail: format!(
                        "entity '{}' maps to storage name '{storage}', already claimed by '{ns}.{claimed_by}'",
                        entity.name
                    ),
                });
            }
        }
    }

    fn relationship_conflicts(
        &self,
        manifest: &ExtensionManifest,
        fragment: &SchemaFragment,
        others: &[&ActiveFragment<'_>],
        report: &mut ConflictReport,
    ) {
        let own = &manifest.namespace;
        // Namespaces of declared dependencies that currently have an active fragment.
        let reachable: BTreeMap<&Namespace, &SchemaFragment> = others
            .iter()
            .filter(|a| manifest.depends_on(a.extension))
            .map(|a| (a.namespace, a.fragment))
            .collect();

        for rel in fragment.relationships.values() {
            let target_ns = rel.target.resolved_namespace(own);
            let missing = |reason: String| Conflict {
                kind: ConflictKind::RelationshipTargetMissing,
                subtype: None,
                subject_namespace: own.clone(),
                other_namespace: (target_ns != own).then(|| target_ns.clone()),
                detail: format!("relationship '{}' targets '{}': {reason}", rel.name, rel.target),
            };

            let found = if target_ns == own {
                fragment
                    .entity(&rel.target.entity)
                    .map(|e| e.has_column(&rel.target.field))
            } else if target_ns.is_host() {
                self.host
                    .entity(&rel.target.entity)
                    .map(|_| self.host.has_column(&rel.target.entity, &rel.target.field))
            } else {
                match reachable.get(target_ns) {
                    Some(target) => target
                        .entity(&rel.target.entity)
                        .map(|e| e.has_column(&rel.target.field)),
                    None => {
                        report.push(missing(format!(
                            "namespace '{target_ns}' is not owned by an active dependency of '{}'",
                            manifest.id
                        )));
                        continue;
                    }
                }
            };

            match found {
                None => report.push(missing("entity does not exist".to_string())),
                Some(false) => report.push(missing("field does not exist".to_string())),
                Some(true) => {}
            }
        }
    }
}

/// Storage names of the indexes created for `entity`: one per unique field
/// and one per declared index.
fn index_storage_names(entity: &EntityDef, namespace: &Namespace) -> Vec<String> {
    let table = entity.storage_name(namespace);
    entity
        .fields
        .values()
        .filter(|f| f.unique)
        .map(|f| ddl::unique_field_index(&table, &f.name))
        .chain(entity.indexes.values().map(|index| index.storage_name(&table)))
        .collect()
}

/// Tables and indexes share one schema namespace in the store, so an index
/// may not take a name the host or another namespace stores a table or index
/// under, and a table may not take another namespace's index name.
fn index_conflicts(
    host: &HostSchema,
    own: &Namespace,
    fragment: &SchemaFragment,
    others: &[&ActiveFragment<'_>],
    report: &mut ConflictReport,
) {
    let mut tables: BTreeMap<String, Namespace> = BTreeMap::new();
    let mut indexes: BTreeMap<String, Namespace> = BTreeMap::new();
    for (storage, _) in host.storage_claims() {
        tables.insert(storage.to_string(), Namespace::host());
    }
    for other in others {
        for entity in other.fragment.entities.values() {
            tables
                .entry(entity.storage_name(other.namespace))
                .or_insert_with(|| other.namespace.clone());
            for name in index_storage_names(entity, other.namespace) {
                indexes.entry(name).or_insert_with(|| other.namespace.clone());
            }
        }
    }

    for entity in fragment.entities.values() {
        let table = entity.storage_name(own);
        let mut claimed: Vec<(String, &Namespace)> = Vec::new();
        if let Some(ns) = indexes.get(&table) {
            claimed.push((table, ns));
        }
        for name in index_storage_names(entity, own) {
            if let Some(ns) = indexes.get(&name).or_else(|| tables.get(&name)) {
                claimed.push((name, ns));
            }
        }
        for (storage, ns) in claimed {
            report.push(Conflict {
                kind: ConflictKind::NameConflict,
                subtype: Some(NameSubtype::Index),
                subject_namespace: own.clone(),
                other_namespace: Some(ns.clone()),
                detail: format!(
                    "entity '{}' needs storage name '{storage}', already used by an index or table in '{ns}'",
                    entity.name
                ),
            });
        }
    }
}

fn enum_conflicts(
    own: &Namespace,
    fragment: &SchemaFragment,
    others: &[&ActiveFragment<'_>],
    report: &mut ConflictReport,
) {
    let mut claims: BTreeMap<String, &Namespace> = BTreeMap::new();
    for other in others {
        for name in other.fragment.enums.keys() {
            claims.entry(other.namespace.storage_name(name)).or_insert(other.namespace);
        }
    }
    for name in fragment.enums.keys() {
        let storage = own.storage_name(name);
        if let Some(ns) = claims.get(&storage) {
            report.push(Conflict {
                kind: ConflictKind::NameConflict,
                subtype: Some(NameSubtype::Enum),
                subject_namespace: own.clone(),
                other_namespace: Some((*ns).clone()),
                detail: format!("enumeration '{name}' maps to '{storage}', already claimed in namespace '{ns}'"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ext_manifest::ManifestPolicy;
    use ext_schema::{
        CascadePolicy, EntityDef, EnumDef, FieldDef, FieldRef, FieldType, HostEntity, RelationshipDef,
        TargetRef,
    };

    fn manifest(id: &str, namespace: &str, extra: &str) -> ExtensionManifest {
        let toml = format!("[extension]\nid = \"{id}\"\nversion = \"1.0.0\"\nnamespace = \"{namespace}\"\n{extra}");
        ExtensionManifest::from_toml(&toml, &ManifestPolicy::default()).unwrap()
    }

    fn reports() -> SchemaFragment {
        SchemaFragment::empty()
            .with_entity(EntityDef::new("reports").with_field(FieldDef::new("title", FieldType::String)))
    }

    fn host() -> HostSchema {
        HostSchema::new().with_entity(HostEntity::new("users", &["email"]))
    }

    fn pairs() -> Vec<(Permission, Permission)> {
        ext_manifest::DEFAULT_EXCLUSIVE_PAIRS.to_vec()
    }

    #[test]
    fn test_same_entity_name_in_different_namespaces() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns_a = Namespace::new("plugin_a").unwrap();
        let frag_a = reports();
        let active = [ActiveFragment {
            extension: "plugin-a",
            namespace: &ns_a,
            fragment: &frag_a,
        }];
        let report = detector.detect(&manifest("plugin-b", "plugin_b", ""), &reports(), &active);
        assert!(report.is_empty(), "{report:?}");
    }

    #[test]
    fn test_same_namespace_from_another_extension() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns = Namespace::new("shared").unwrap();
        let frag = reports();
        let active = [ActiveFragment {
            extension: "first",
            namespace: &ns,
            fragment: &frag,
        }];
        let report = detector.detect(&manifest("second", "shared", ""), &reports(), &active);
        assert_eq!(report.names(NameSubtype::Table).count(), 1);
        assert_eq!(report.names(NameSubtype::Namespace).count(), 1);
    }

    #[test]
    fn test_own_previous_version_is_not_a_conflict() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns = Namespace::new("analytics").unwrap();
        let frag = reports();
        let active = [ActiveFragment {
            extension: "analytics",
            namespace: &ns,
            fragment: &frag,
        }];
        let report = detector.detect(&manifest("analytics", "analytics", ""), &reports(), &active);
        assert!(report.is_empty());
    }

    #[test]
    fn test_table_override_colliding_with_host() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let fragment = SchemaFragment::empty().with_entity(EntityDef::new("people").with_table("users"));
        let report = detector.detect(&manifest("crm", "crm", ""), &fragment, &[]);
        let conflicts: Vec<_> = report.names(NameSubtype::Table).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].other_namespace, Some(Namespace::host()));
    }

    #[test]
    fn test_index_names_share_the_table_namespace() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns_a = Namespace::new("plugin_a").unwrap();
        let frag_a = SchemaFragment::empty().with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("title", FieldType::String).unique())
                .with_index(&["title"], false),
        );
        let active = [ActiveFragment {
            extension: "plugin-a",
            namespace: &ns_a,
            fragment: &frag_a,
        }];

        // A table override taking the unique-field index name.
        let squatter = SchemaFragment::empty()
            .with_entity(EntityDef::new("archive").with_table("plugin_a__reports__title_unique_key"));
        let report = detector.detect(&manifest("plugin-b", "plugin_b", ""), &squatter, &active);
        let conflicts: Vec<_> = report.names(NameSubtype::Index).collect();
        assert_eq!(conflicts.len(), 1, "{report:?}");
        assert_eq!(conflicts[0].other_namespace, Some(ns_a.clone()));
        assert_eq!(report.names(NameSubtype::Table).count(), 0);

        // An index whose storage name is another namespace's table.
        let frag_c = SchemaFragment::empty().with_entity(EntityDef::new("logs").with_table("plugin_b__logs__ix_level"));
        let active = [ActiveFragment {
            extension: "plugin-c",
            namespace: &ns_a,
            fragment: &frag_c,
        }];
        let indexed = SchemaFragment::empty().with_entity(
            EntityDef::new("logs")
                .with_field(FieldDef::new("level", FieldType::String))
                .with_index(&["level"], false),
        );
        let report = detector.detect(&manifest("plugin-b", "plugin_b", ""), &indexed, &active);
        assert_eq!(report.names(NameSubtype::Index).count(), 1, "{report:?}");

        // Distinct namespaces keep distinct index names.
        let report = detector.detect(&manifest("plugin-b", "plugin_b", ""), &frag_a, &[]);
        assert!(report.is_empty(), "{report:?}");
    }

    #[test]
    fn test_enum_collision_requires_same_namespace() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns = Namespace::new("shared").unwrap();
        let frag = SchemaFragment::empty().with_enum(EnumDef::new("status", &["a"]));
        let active = [ActiveFragment {
            extension: "first",
            namespace: &ns,
            fragment: &frag,
        }];
        let candidate = SchemaFragment::empty().with_enum(EnumDef::new("status", &["b"]));
        let clash = detector.detect(&manifest("second", "shared", ""), &candidate, &active);
        assert_eq!(clash.names(NameSubtype::Enum).count(), 1);
        let fine = detector.detect(&manifest("third", "third", ""), &candidate, &active);
        assert!(fine.is_empty());
    }

    fn relationship(target: TargetRef) -> SchemaFragment {
        reports()
            .with_entity(
                EntityDef::new("notes")
                    .with_field(FieldDef::new("owner_id", FieldType::String))
                    .with_field(FieldDef::new("report_id", FieldType::String)),
            )
            .with_relationship(
                RelationshipDef::new(
                    "link",
                    FieldRef {
                        entity: "notes".into(),
                        field: "owner_id".into(),
                    },
                    target,
                )
                .with_on_delete(CascadePolicy::Restrict),
            )
    }

    #[test]
    fn test_relationship_targets() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let metrics_ns = Namespace::new("base_metrics").unwrap();
        let metrics = SchemaFragment::empty().with_entity(EntityDef::new("series"));
        let active = [ActiveFragment {
            extension: "base-metrics",
            namespace: &metrics_ns,
            fragment: &metrics,
        }];
        let with_dep = manifest("analytics", "analytics", "[dependencies]\nbase-metrics = \"^1\"\n");
        let without_dep = manifest("analytics", "analytics", "");

        let host_target = TargetRef {
            namespace: Some(Namespace::host()),
            entity: "users".into(),
            field: "id".into(),
        };
        assert!(detector.detect(&without_dep, &relationship(host_target), &active).is_empty());

        let bad_host_field = TargetRef {
            namespace: Some(Namespace::host()),
            entity: "users".into(),
            field: "phone".into(),
        };
        let report = detector.detect(&without_dep, &relationship(bad_host_field), &active);
        assert_eq!(report.of_kind(ConflictKind::RelationshipTargetMissing).count(), 1);

        let dep_target = TargetRef {
            namespace: Some(metrics_ns.clone()),
            entity: "series".into(),
            field: "id".into(),
        };
        assert!(detector.detect(&with_dep, &relationship(dep_target.clone()), &active).is_empty());

        // Same target, but base-metrics is not a declared dependency.
        let report = detector.detect(&without_dep, &relationship(dep_target), &active);
        let conflict = report.iter().next().unwrap();
        assert_eq!(conflict.kind, ConflictKind::RelationshipTargetMissing);
        assert_eq!(conflict.other_namespace, Some(metrics_ns));
    }

    #[test]
    fn test_permission_conflicts() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let m = manifest(
            "sandbox",
            "sandbox",
            "permissions = [\"sandboxed\", \"network:outbound\", \"schema:extend\", \"schema:readonly\"]\n",
        );
        let report = detector.detect(&m, &SchemaFragment::empty(), &[]);
        assert_eq!(report.of_kind(ConflictKind::PermissionConflict).count(), 2);
    }

    #[test]
    fn test_collects_every_conflict() {
        let host = host();
        let pairs = pairs();
        let detector = ConflictDetector::new(&host, &pairs);
        let ns = Namespace::new("shared").unwrap();
        let frag = reports().with_enum(EnumDef::new("status", &["a"]));
        let active = [ActiveFragment {
            extension: "first",
            namespace: &ns,
            fragment: &frag,
        }];
        let candidate = relationship(TargetRef {
            namespace: None,
            entity: "reports".into(),
            field: "missing".into(),
        })
        .with_enum(EnumDef::new("status", &["b"]));
        let m = manifest(
            "second",
            "shared",
            "permissions = [\"schema:extend\", \"schema:readonly\"]\n",
        );
        let report = detector.detect(&m, &candidate, &active);
        // namespace, table, enum, relationship target, permission
        assert_eq!(report.len(), 5, "{report:#?}");
    }
}
