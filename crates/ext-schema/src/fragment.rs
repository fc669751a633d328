//! Typed schema fragments: entities, enumerations, and relationships.
//!
//! A [`SchemaFragment`] is namespace-agnostic: it is interpreted within the
//! namespace of the extension that registers it. Relationship targets without
//! an explicit namespace refer to the declaring namespace.
//!
//! Collections are keyed by name in `BTreeMap`s, so iteration order (and
//! therefore diffing, plan generation, and fingerprints) is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::field::FieldDef;
use crate::naming::Namespace;

/// Name of the implicit primary-key column every entity carries.
pub const PRIMARY_KEY: &str = "id";

/// A versioned set of entities, enumerations, and relationships.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaFragment {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDef>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDef>,
}

/// An entity (table) declared by a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    /// Explicit storage-name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexDef>,
}

/// A secondary index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A named enumeration with its allowed values, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
}

/// What happens to referencing rows when a target row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    #[default]
    Restrict,
    Cascade,
    SetNull,
    NoAction,
}

impl CascadePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "restrict" => Some(Self::Restrict),
            "cascade" => Some(Self::Cascade),
            "set_null" | "setnull" => Some(Self::SetNull),
            "no_action" | "noaction" => Some(Self::NoAction),
            _ => None,
        }
    }
}

impl fmt::Display for CascadePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restrict => write!(f, "restrict"),
            Self::Cascade => write!(f, "cascade"),
            Self::SetNull => write!(f, "set_null"),
            Self::NoAction => write!(f, "no_action"),
        }
    }
}

/// Source side of a relationship: a field on an entity of the declaring fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub entity: String,
    pub field: String,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// Target side of a relationship, possibly in another namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// `None` means the declaring namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    pub entity: String,
    pub field: String,
}

impl TargetRef {
    /// Namespace of the target, resolved against the declaring namespace.
    pub fn resolved_namespace<'a>(&'a self, own: &'a Namespace) -> &'a Namespace {
        self.namespace.as_ref().unwrap_or(own)
    }

    pub fn is_cross_namespace(&self, own: &Namespace) -> bool {
        self.resolved_namespace(own) != own
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}.{}", ns, self.entity, self.field),
            None => write!(f, "{}.{}", self.entity, self.field),
        }
    }
}

/// A declared (not necessarily store-enforced) reference between entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub source: FieldRef,
    pub target: TargetRef,
    #[serde(default)]
    pub on_delete: CascadePolicy,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn with_index(mut self, fields: &[&str], unique: bool) -> Self {
        let index = IndexDef::new(fields.iter().map(|f| f.to_string()).collect(), unique);
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Storage name of this entity within `namespace`.
    pub fn storage_name(&self, namespace: &Namespace) -> String {
        match &self.table {
            Some(table) => table.clone(),
            None => namespace.storage_name(&self.name),
        }
    }

    /// Whether `field` names a column of this entity, including the primary key.
    pub fn has_column(&self, field: &str) -> bool {
        field == PRIMARY_KEY || self.fields.contains_key(field)
    }
}

impl IndexDef {
    /// Build an index whose name is derived from its fields.
    pub fn new(fields: Vec<String>, unique: bool) -> Self {
        let prefix = if unique { "uq" } else { "ix" };
        Self {
            name: format!("{}_{}", prefix, fields.join("_")),
            fields,
            unique,
        }
    }

    /// Storage name of the index on `table`.
    pub fn storage_name(&self, table: &str) -> String {
        format!("{table}__{}", self.name)
    }
}

impl EnumDef {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl RelationshipDef {
    pub fn new(name: impl Into<String>, source: FieldRef, target: TargetRef) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            on_delete: CascadePolicy::default(),
        }
    }

    pub fn with_on_delete(mut self, policy: CascadePolicy) -> Self {
        self.on_delete = policy;
        self
    }
}

impl SchemaFragment {
    /// A fragment that declares nothing; the "from" side of a fresh install.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.enums.is_empty() && self.relationships.is_empty()
    }

    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn with_enum(mut self, def: EnumDef) -> Self {
        self.enums.insert(def.name.clone(), def);
        self
    }

    pub fn with_relationship(mut self, rel: RelationshipDef) -> Self {
        self.relationships.insert(rel.name.clone(), rel);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Allowed values of a local enumeration.
    pub fn enum_values(&self, name: &str) -> Option<&[String]> {
        self.enums.get(name).map(|e| e.values.as_slice())
    }

    /// Relationships whose source is `entity`.
    pub fn relationships_from<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a RelationshipDef> {
        self.relationships
            .values()
            .filter(move |r| r.source.entity == entity)
    }

    /// Canonical JSON encoding, used for fingerprints and persistence.
    pub fn to_canonical_json(&self) -> String {
        // Only non-finite bounds fail to encode; validation rejects those.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    fn sample() -> SchemaFragment {
        SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft", "published"]))
            .with_entity(
                EntityDef::new("reports")
                    .with_field(FieldDef::new("title", FieldType::String).required())
                    .with_field(FieldDef::new("status", FieldType::Enum("status".into())))
                    .with_index(&["title"], false),
            )
    }

    #[test]
    fn test_storage_name_default_and_override() {
        let ns = Namespace::new("plugin_a").unwrap();
        let entity = EntityDef::new("reports");
        assert_eq!(entity.storage_name(&ns), "plugin_a__reports");
        let overridden = EntityDef::new("reports").with_table("reports");
        assert_eq!(overridden.storage_name(&ns), "reports");
    }

    #[test]
    fn test_index_naming() {
        let idx = IndexDef::new(vec!["a".into(), "b".into()], true);
        assert_eq!(idx.name, "uq_a_b");
        assert_eq!(idx.storage_name("ns__t"), "ns__t__uq_a_b");
    }

    #[test]
    fn test_has_column_includes_primary_key() {
        let fragment = sample();
        let reports = fragment.entity("reports").unwrap();
        assert!(reports.has_column("id"));
        assert!(reports.has_column("title"));
        assert!(!reports.has_column("missing"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
        let changed = sample().with_enum(EnumDef::new("kind", &["a"]));
        assert_ne!(sample().fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_target_resolution() {
        let own = Namespace::new("analytics").unwrap();
        let local = TargetRef {
            namespace: None,
            entity: "reports".into(),
            field: "id".into(),
        };
        assert_eq!(local.resolved_namespace(&own), &own);
        assert!(!local.is_cross_namespace(&own));

        let remote = TargetRef {
            namespace: Some(Namespace::host()),
            entity: "users".into(),
            field: "id".into(),
        };
        assert!(remote.is_cross_namespace(&own));
        assert_eq!(remote.to_string(), "core.users.id");
    }

    #[test]
    fn test_json_round_trip() {
        let fragment = sample();
        let json = fragment.to_canonical_json();
        let back: SchemaFragment = serde_json::from_str(&json).unwrap();
        assert_eq!(fragment, back);
    }
}
