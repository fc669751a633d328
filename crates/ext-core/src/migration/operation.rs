//! Atomic schema changes and their risk classes

use std::fmt;

use ext_schema::{EntityDef, EnumDef, FieldDef, IndexDef, RelationshipDef};
use serde::{Deserialize, Serialize};

/// How much a single operation can hurt existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Purely additive
    Safe,
    /// Narrowing; may fail on existing data
    Risky,
    /// Removes data or makes it unrecoverable
    Destructive,
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Risky => write!(f, "risky"),
            Self::Destructive => write!(f, "destructive"),
        }
    }
}

/// One atomic change between two fragment versions.
///
/// Entity-scoped variants name the entity by its local name; the storage
/// name is derived from the namespace at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOperation {
    AddEnum { def: EnumDef },
    ModifyEnum { from: EnumDef, to: EnumDef },
    AddEntity { entity: EntityDef },
    AddField { entity: String, field: FieldDef },
    ModifyField { entity: String, from: FieldDef, to: FieldDef },
    AddIndex { entity: String, index: IndexDef },
    ModifyIndex { entity: String, from: IndexDef, to: IndexDef },
    AddRelationship { relationship: RelationshipDef },
    ModifyRelationship { from: RelationshipDef, to: RelationshipDef },
    RemoveRelationship { relationship: RelationshipDef },
    RemoveIndex { entity: String, index: IndexDef },
    RemoveField { entity: String, field: FieldDef },
    RemoveEntity { entity: EntityDef },
    RemoveEnum { def: EnumDef },
}

impl MigrationOperation {
    /// Short verb naming the kind of change.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::AddEnum { .. } => "add_enum",
            Self::ModifyEnum { .. } => "modify_enum",
            Self::AddEntity { .. } => "add_entity",
            Self::AddField { .. } => "add_field",
            Self::ModifyField { .. } => "modify_field",
            Self::AddIndex { .. } => "add_index",
            Self::ModifyIndex { .. } => "modify_index",
            Self::AddRelationship { .. } => "add_relationship",
            Self::ModifyRelationship { .. } => "modify_relationship",
            Self::RemoveRelationship { .. } => "remove_relationship",
            Self::RemoveIndex { .. } => "remove_index",
            Self::RemoveField { .. } => "remove_field",
            Self::RemoveEntity { .. } => "remove_entity",
            Self::RemoveEnum { .. } => "remove_enum",
        }
    }

    /// What the operation touches, e.g. `reports.title`.
    pub fn subject(&self) -> String {
        match self {
            Self::AddEnum { def } | Self::RemoveEnum { def } => def.name.clone(),
            Self::ModifyEnum { to, .. } => to.name.clone(),
            Self::AddEntity { entity } | Self::RemoveEntity { entity } => entity.name.clone(),
            Self::AddField { entity, field } | Self::RemoveField { entity, field } => {
                format!("{entity}.{}", field.name)
            }
            Self::ModifyField { entity, to, .. } => format!("{entity}.{}", to.name),
            Self::AddIndex { entity, index } | Self::RemoveIndex { entity, index } => {
                format!("{entity}.{}", index.name)
            }
            Self::ModifyIndex { entity, to, .. } => format!("{entity}.{}", to.name),
            Self::AddRelationship { relationship } | Self::RemoveRelationship { relationship } => {
                relationship.name.clone()
            }
            Self::ModifyRelationship { to, .. } => to.name.clone(),
        }
    }

    /// Entity whose table the operation changes, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::AddEntity { entity } | Self::RemoveEntity { entity } => Some(&entity.name),
            Self::AddField { entity, .. }
            | Self::ModifyField { entity, .. }
            | Self::RemoveField { entity, .. }
            | Self::AddIndex { entity, .. }
            | Self::ModifyIndex { entity, .. }
            | Self::RemoveIndex { entity, .. } => Some(entity),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.subject())
    }
}

/// An operation with its risk class and the reasons behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOperation {
    pub operation: MigrationOperation,
    pub risk: RiskClass,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl fmt::Display for PlannedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.operation, self.risk)?;
        if !self.reasons.is_empty() {
            write!(f, ": {}", self.reasons.join("; "))?;
        }
        Ok(())
    }
}
