//! Structural diff between two fragment versions
//!
//! Emits one operation per atomic change, grouped so that every operation
//! only depends on operations before it: additions and modifications first
//! (enums, entities, fields, indexes, relationships), then removals in the
//! reverse order. Within a group operations follow name order.

use ext_schema::{EntityDef, SchemaFragment};

use super::operation::MigrationOperation;

/// Diff `from` against `to`.
pub fn diff(from: &SchemaFragment, to: &SchemaFragment) -> Vec<MigrationOperation> {
    let mut ops = Vec::new();

    for (name, def) in &to.enums {
        match from.enums.get(name) {
            None => ops.push(MigrationOperation::AddEnum { def: def.clone() }),
            Some(old) if old != def => ops.push(MigrationOperation::ModifyEnum {
                from: old.clone(),
                to: def.clone(),
            }),
            Some(_) => {}
        }
    }

    for (name, entity) in &to.entities {
        if retained(from, name, entity).is_none() {
            ops.push(MigrationOperation::AddEntity {
                entity: entity.clone(),
            });
        }
    }

    for (name, entity) in &to.entities {
        let Some(old) = retained(from, name, entity) else {
            continue;
        };
        for (field_name, field) in &entity.fields {
            match old.fields.get(field_name) {
                None => ops.push(MigrationOperation::AddField {
                    entity: name.clone(),
                    field: field.clone(),
                }),
                Some(prev) if prev != field => ops.push(MigrationOperation::ModifyField {
                    entity: name.clone(),
                    from: prev.clone(),
                    to: field.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    for (name, entity) in &to.entities {
        let Some(old) = retained(from, name, entity) else {
            continue;
        };
        for (index_name, index) in &entity.indexes {
            match old.indexes.get(index_name) {
                None => ops.push(MigrationOperation::AddIndex {
                    entity: name.clone(),
                    index: index.clone(),
                }),
                Some(prev) if prev != index => ops.push(MigrationOperation::ModifyIndex {
                    entity: name.clone(),
                    from: prev.clone(),
                    to: index.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    for (name, rel) in &to.relationships {
        match from.relationships.get(name) {
            None => ops.push(MigrationOperation::AddRelationship {
                relationship: rel.clone(),
            }),
            Some(old) if old != rel => ops.push(MigrationOperation::ModifyRelationship {
                from: old.clone(),
                to: rel.clone(),
            }),
            Some(_) => {}
        }
    }

    for (name, rel) in &from.relationships {
        if !to.relationships.contains_key(name) {
            ops.push(MigrationOperation::RemoveRelationship {
                relationship: rel.clone(),
            });
        }
    }

    for (name, old) in &from.entities {
        let Some(entity) = to.entities.get(name).filter(|e| e.table == old.table) else {
            continue;
        };
        for (index_name, index) in &old.indexes {
            if !entity.indexes.contains_key(index_name) {
                ops.push(MigrationOperation::RemoveIndex {
                    entity: name.clone(),
                    index: index.clone(),
                });
            }
        }
    }

    for (name, old) in &from.entities {
        let Some(entity) = to.entities.get(name).filter(|e| e.table == old.table) else {
            continue;
        };
        for (field_name, field) in &old.fields {
            if !entity.fields.contains_key(field_name) {
                ops.push(MigrationOperation::RemoveField {
                    entity: name.clone(),
                    field: field.clone(),
                });
            }
        }
    }

    for (name, old) in &from.entities {
        if retained(to, name, old).is_none() {
            ops.push(MigrationOperation::RemoveEntity { entity: old.clone() });
        }
    }

    for (name, def) in &from.enums {
        if !to.enums.contains_key(name) {
            ops.push(MigrationOperation::RemoveEnum { def: def.clone() });
        }
    }

    ops
}

/// The counterpart of `entity` in `other`, if it keeps the same storage name.
///
/// Changing a table override moves the entity to new storage, which is a
/// removal plus an addition rather than a modification.
fn retained<'a>(other: &'a SchemaFragment, name: &str, entity: &EntityDef) -> Option<&'a EntityDef> {
    other.entities.get(name).filter(|e| e.table == entity.table)
}
