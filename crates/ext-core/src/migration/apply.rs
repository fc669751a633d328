//! Applying operations to an in-memory fragment
//!
//! The executor keeps a working model alongside the store so that every
//! DDL step can see the entity as it stands after the previous operations.

use ext_schema::SchemaFragment;

use super::operation::MigrationOperation;

/// Apply one operation to `fragment`.
pub fn apply(fragment: &mut SchemaFragment, operation: &MigrationOperation) {
    match operation {
        MigrationOperation::AddEnum { def } => {
            fragment.enums.insert(def.name.clone(), def.clone());
        }
        MigrationOperation::ModifyEnum { to, .. } => {
            fragment.enums.insert(to.name.clone(), to.clone());
        }
        MigrationOperation::RemoveEnum { def } => {
            fragment.enums.remove(&def.name);
        }
        MigrationOperation::AddEntity { entity } => {
            fragment.entities.insert(entity.name.clone(), entity.clone());
        }
        MigrationOperation::RemoveEntity { entity } => {
            // A recreated entity already replaced the old definition.
            if fragment
                .entities
                .get(&entity.name)
                .is_some_and(|current| current.table == entity.table)
            {
                fragment.entities.remove(&entity.name);
            }
        }
        MigrationOperation::AddField { entity, field } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.fields.insert(field.name.clone(), field.clone());
            }
        }
        MigrationOperation::ModifyField { entity, to, .. } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.fields.insert(to.name.clone(), to.clone());
            }
        }
        MigrationOperation::RemoveField { entity, field } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.fields.remove(&field.name);
            }
        }
        MigrationOperation::AddIndex { entity, index } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.indexes.insert(index.name.clone(), index.clone());
            }
        }
        MigrationOperation::ModifyIndex { entity, to, .. } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.indexes.insert(to.name.clone(), to.clone());
            }
        }
        MigrationOperation::RemoveIndex { entity, index } => {
            if let Some(e) = fragment.entities.get_mut(entity) {
                e.indexes.remove(&index.name);
            }
        }
        MigrationOperation::AddRelationship { relationship } => {
            fragment
                .relationships
                .insert(relationship.name.clone(), relationship.clone());
        }
        MigrationOperation::ModifyRelationship { to, .. } => {
            fragment.relationships.insert(to.name.clone(), to.clone());
        }
        MigrationOperation::RemoveRelationship { relationship } => {
            fragment.relationships.remove(&relationship.name);
        }
    }
}
