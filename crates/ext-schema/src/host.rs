//! The host (core) platform schema.
//!
//! Extensions may point relationships at core entities and may never claim a
//! storage name that a core entity already occupies. Only names matter here:
//! the host schema is owned and migrated outside this crate.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::fragment::PRIMARY_KEY;

/// A core entity as seen by extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntity {
    pub name: String,
    /// Storage name; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: BTreeSet<String>,
}

impl HostEntity {
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn storage_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// Names of all core entities and their fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostSchema {
    #[serde(default, with = "entity_list")]
    pub entities: BTreeMap<String, HostEntity>,
}

impl HostSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: HostEntity) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&HostEntity> {
        self.entities.get(name)
    }

    pub fn has_column(&self, entity: &str, field: &str) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|e| field == PRIMARY_KEY || e.fields.contains(field))
    }

    /// Storage names claimed by the host, mapped to the entity that claims them.
    pub fn storage_claims(&self) -> BTreeMap<&str, &str> {
        self.entities
            .values()
            .map(|e| (e.storage_name(), e.name.as_str()))
            .collect()
    }
}

/// The document form is a list (`[[host.entities]]`); the model is keyed by name.
mod entity_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::HostEntity;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, HostEntity>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.values().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, HostEntity>, D::Error> {
        let list = Vec::<HostEntity>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|e| (e.name.clone(), e)).collect())
    }
}
