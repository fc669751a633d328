//! Data safety validation and record writes
//!
//! Relationships between namespaces are declared, not enforced by the
//! store, so referential integrity is checked here on every write and
//! cascade policies are applied here on every delete.

use std::collections::{BTreeMap, BTreeSet};

use ext_schema::{CascadePolicy, EntityDef, FieldType, HostSchema, Namespace, PRIMARY_KEY};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::{RegistryState, SchemaEntry};
use crate::store::{self, ddl::quote};
use crate::validation::{DataViolation, ValidationResult, ViolationKind};

/// Validates records against the active schema of their namespace.
#[derive(Debug, Clone, Copy)]
pub struct DataValidator<'a> {
    state: &'a RegistryState,
    host: &'a HostSchema,
}

impl<'a> DataValidator<'a> {
    pub fn new(state: &'a RegistryState, host: &'a HostSchema) -> Self {
        Self { state, host }
    }

    /// The active entry and entity definition a record is written to.
    pub fn target(&self, namespace: &Namespace, entity: &str) -> Result<(&'a SchemaEntry, &'a EntityDef)> {
        let entry = self
            .state
            .active_in(namespace)
            .ok_or_else(|| Error::NamespaceNotActive(namespace.to_string()))?;
        let def = entry.fragment.entity(entity).ok_or_else(|| Error::UnknownEntity {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
        })?;
        Ok((entry, def))
    }

    /// Check `record` against every field and relationship of the entity.
    ///
    /// # Errors
    ///
    /// Fails only when the namespace has no active schema, the entity is not
    /// declared, or the store cannot be queried. Record problems are
    /// collected into the returned [`ValidationResult`].
    pub fn validate(
        &self,
        conn: &Connection,
        namespace: &Namespace,
        entity: &str,
        record: &Value,
    ) -> Result<ValidationResult> {
        let (entry, def) = self.target(namespace, entity)?;
        let Some(object) = record.as_object() else {
            return Ok(ValidationResult::from_errors(vec![DataViolation::new(
                ViolationKind::ConstraintViolation,
                entity,
                "record must be an object",
            )]));
        };
        let table = def.storage_name(namespace);
        let path = |field: &str| format!("{entity}.{field}");
        let mut errors = Vec::new();

        for key in object.keys() {
            if key != PRIMARY_KEY && !def.fields.contains_key(key) {
                errors.push(DataViolation::new(
                    ViolationKind::UnknownField,
                    path(key),
                    "field is not declared",
                ));
            }
        }

        match object.get(PRIMARY_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::String(id)) => {
                if store::row_exists(conn, &table, PRIMARY_KEY, &Value::from(id.as_str()))? {
                    errors.push(DataViolation::new(
                        ViolationKind::ConstraintViolation,
                        path(PRIMARY_KEY),
                        format!("a record with id '{id}' already exists"),
                    ));
                }
            }
            Some(_) => errors.push(DataViolation::new(
                ViolationKind::ConstraintViolation,
                path(PRIMARY_KEY),
                "id must be a string",
            )),
        }

        for field in def.fields.values() {
            let value = object.get(&field.name);
            let enum_values = match &field.field_type {
                FieldType::Enum(name) => entry.fragment.enum_values(name),
                _ => None,
            };
            let problems = field.check_value(value, enum_values);
            let clean = problems.is_empty();
            errors.extend(
                problems
                    .into_iter()
                    .map(|message| DataViolation::new(ViolationKind::ConstraintViolation, path(&field.name), message)),
            );

            if let Some(value) = value.filter(|v| clean && field.unique && !v.is_null()) {
                if store::row_exists(conn, &table, &field.name, value)? {
                    errors.push(DataViolation::new(
                        ViolationKind::ConstraintViolation,
                        path(&field.name),
                        format!("value {value} must be unique"),
                    ));
                }
            }
        }

        for rel in entry.fragment.relationships_from(entity) {
            let Some(value) = object.get(&rel.source.field).filter(|v| !v.is_null()) else {
                continue;
            };
            let target_ns = rel.target.resolved_namespace(namespace);
            let violation = |message: String| {
                DataViolation::new(ViolationKind::RelationshipIntegrity, path(&rel.source.field), message)
            };
            match self.target_table(entry, target_ns, &rel.target.entity) {
                None => errors.push(violation(format!(
                    "relationship '{}' targets '{}', which is not available",
                    rel.name, rel.target
                ))),
                Some(target_table) => {
                    if !store::table_exists(conn, &target_table)? {
                        errors.push(violation(format!("target table '{target_table}' does not exist")));
                    } else if !store::row_exists(conn, &target_table, &rel.target.field, value)? {
                        errors.push(violation(format!(
                            "no '{}' row with {} = {value}",
                            rel.target, rel.target.field
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            namespace = %namespace,
            entity,
            violations = errors.len(),
            "record validated"
        );
        Ok(ValidationResult::from_errors(errors))
    }

    /// Storage name of a relationship target, if the target is reachable.
    fn target_table(&self, own: &SchemaEntry, namespace: &Namespace, entity: &str) -> Option<String> {
        if namespace == &own.namespace {
            own.fragment.entity(entity).map(|e| e.storage_name(namespace))
        } else if namespace.is_host() {
            self.host.entity(entity).map(|e| e.storage_name().to_string())
        } else {
            self.state
                .active_in(namespace)
                .and_then(|e| e.fragment.entity(entity))
                .map(|e| e.storage_name(namespace))
        }
    }
}

/// Validate and insert a record, returning its id.
///
/// A record without an `id` receives a fresh UUID. Nothing is written when
/// validation fails.
pub fn insert_record(
    conn: &Connection,
    validator: &DataValidator<'_>,
    namespace: &Namespace,
    entity: &str,
    record: &Value,
) -> Result<String> {
    let result = validator.validate(conn, namespace, entity, record)?;
    if !result.valid {
        tracing::warn!(namespace = %namespace, entity, violations = result.errors.len(), "record rejected");
        return Err(Error::InvalidRecord {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
            violations: result.errors,
        });
    }

    let (_, def) = validator.target(namespace, entity)?;
    let mut values: BTreeMap<String, Value> = record
        .as_object()
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let id = match values.get(PRIMARY_KEY).and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    values.insert(PRIMARY_KEY.to_string(), Value::from(id.clone()));
    // Omitted columns take their store default.
    values.retain(|_, v| !v.is_null());

    store::insert_row(conn, &def.storage_name(namespace), &values)?;
    tracing::debug!(namespace = %namespace, entity, id = %id, "record inserted");
    Ok(id)
}

/// What a delete touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// `table:id` of every deleted row, the requested one first
    pub deleted: Vec<String>,
    /// Referencing columns set to null
    pub nullified: usize,
}

/// Delete a record, honouring the cascade policy of every active
/// relationship that targets its entity.
///
/// Must run inside a transaction: a restricted reference found after
/// cascading part of the graph aborts the whole delete.
pub fn delete_record(
    conn: &Connection,
    state: &RegistryState,
    namespace: &Namespace,
    entity: &str,
    id: &str,
) -> Result<DeleteOutcome> {
    let entry = state
        .active_in(namespace)
        .ok_or_else(|| Error::NamespaceNotActive(namespace.to_string()))?;
    let def = entry.fragment.entity(entity).ok_or_else(|| Error::UnknownEntity {
        namespace: namespace.to_string(),
        entity: entity.to_string(),
    })?;
    if !store::row_exists(conn, &def.storage_name(namespace), PRIMARY_KEY, &Value::from(id))? {
        return Err(Error::RecordNotFound {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
            id: id.to_string(),
        });
    }

    let mut outcome = DeleteOutcome::default();
    let mut visited = BTreeSet::new();
    delete_row(conn, state, namespace, def, id, &mut outcome, &mut visited)?;
    tracing::info!(
        namespace = %namespace,
        entity,
        id,
        deleted = outcome.deleted.len(),
        nullified = outcome.nullified,
        "record deleted"
    );
    Ok(outcome)
}

fn delete_row(
    conn: &Connection,
    state: &RegistryState,
    namespace: &Namespace,
    def: &EntityDef,
    id: &str,
    outcome: &mut DeleteOutcome,
    visited: &mut BTreeSet<String>,
) -> Result<()> {
    let table = def.storage_name(namespace);
    if !visited.insert(format!("{table}:{id}")) {
        return Ok(());
    }

    for referrer in state.active.keys().filter_map(|ns| state.active_in(ns)) {
        for rel in referrer.fragment.relationships.values() {
            if rel.target.resolved_namespace(&referrer.namespace) != namespace || rel.target.entity != def.name {
                continue;
            }
            let Some(source) = referrer.fragment.entity(&rel.source.entity) else {
                continue;
            };
            let key: Option<rusqlite::types::Value> = conn
                .query_row(
                    &format!("SELECT {} FROM {} WHERE {} = ?1", quote(&rel.target.field), quote(&table), quote(PRIMARY_KEY)),
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(key) = key.filter(|k| *k != rusqlite::types::Value::Null) else {
                continue;
            };

            let source_table = source.storage_name(&referrer.namespace);
            let referencing: Vec<String> = conn
                .prepare(&format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    quote(PRIMARY_KEY),
                    quote(&source_table),
                    quote(&rel.source.field)
                ))?
                .query_map([&key], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            if referencing.is_empty() {
                continue;
            }

            match rel.on_delete {
                CascadePolicy::Restrict => {
                    tracing::warn!(relationship = %rel.name, referencing = referencing.len(), "delete restricted");
                    return Err(Error::DeleteRestricted {
                        relationship: format!("{}.{}", referrer.namespace, rel.name),
                        referencing: referencing.len(),
                    });
                }
                CascadePolicy::Cascade => {
                    for child in &referencing {
                        delete_row(conn, state, &referrer.namespace, source, child, outcome, visited)?;
                    }
                }
                CascadePolicy::SetNull => {
                    outcome.nullified += conn.execute(
                        &format!(
                            "UPDATE {} SET {} = NULL WHERE {} = ?1",
                            quote(&source_table),
                            quote(&rel.source.field),
                            quote(&rel.source.field)
                        ),
                        [&key],
                    )?;
                }
                CascadePolicy::NoAction => {}
            }
        }
    }

    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", quote(&table), quote(PRIMARY_KEY)),
        [id],
    )?;
    if removed > 0 {
        // Children were pushed during recursion; keep the requested row first.
        outcome.deleted.insert(0, format!("{table}:{id}"));
    }
    Ok(())
}
