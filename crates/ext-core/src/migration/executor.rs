//! Applying a plan to the store
//!
//! Runs inside the caller's transaction. A working copy of the fragment is
//! advanced one operation at a time so table rebuilds always start from
//! the entity as the previous operation left it.

use ext_schema::{Namespace, SchemaFragment};
use rusqlite::Connection;

use super::apply::apply;
use super::operation::MigrationOperation;
use super::plan::MigrationPlan;
use crate::error::{Error, Result};
use crate::store::{self, ddl};

/// An operation that could not be applied.
#[derive(Debug)]
pub struct OperationFailure {
    pub operation: String,
    pub error: Error,
}

/// Apply every operation of `plan` starting from `from`.
///
/// Returns the labels of the applied operations, or the first failure.
/// Nothing is committed here; the caller owns the transaction.
pub fn apply_plan(
    conn: &Connection,
    from: &SchemaFragment,
    plan: &MigrationPlan,
) -> std::result::Result<Vec<String>, OperationFailure> {
    let mut working = from.clone();
    let mut executed = Vec::with_capacity(plan.operations.len());

    for planned in &plan.operations {
        let label = planned.operation.to_string();
        tracing::debug!(namespace = %plan.namespace, operation = %label, "applying");
        if let Err(error) = apply_operation(conn, &plan.namespace, &mut working, &planned.operation) {
            return Err(OperationFailure {
                operation: label,
                error,
            });
        }
        executed.push(label);
    }
    Ok(executed)
}

fn apply_operation(
    conn: &Connection,
    namespace: &Namespace,
    working: &mut SchemaFragment,
    operation: &MigrationOperation,
) -> Result<()> {
    match operation {
        MigrationOperation::AddEnum { def } | MigrationOperation::ModifyEnum { to: def, .. } => {
            store::write_enum(conn, namespace, def)?;
        }
        MigrationOperation::RemoveEnum { def } => {
            store::delete_enum(conn, namespace, &def.name)?;
        }
        MigrationOperation::AddEntity { entity } => {
            for sql in ddl::create_entity(&entity.storage_name(namespace), entity) {
                conn.execute_batch(&sql)?;
            }
        }
        MigrationOperation::RemoveEntity { entity } => {
            conn.execute_batch(&ddl::drop_table(&entity.storage_name(namespace)))?;
        }
        MigrationOperation::AddField { entity, .. }
        | MigrationOperation::ModifyField { entity, .. }
        | MigrationOperation::RemoveField { entity, .. } => {
            let before = working
                .entity(entity)
                .cloned()
                .ok_or_else(|| missing_entity(namespace, entity))?;
            apply(working, operation);
            let after = working
                .entity(entity)
                .ok_or_else(|| missing_entity(namespace, entity))?;
            for sql in ddl::rebuild_table(&before.storage_name(namespace), &before, after) {
                conn.execute_batch(&sql)?;
            }
            return Ok(());
        }
        MigrationOperation::AddIndex { entity, index } => {
            let table = table_of(working, namespace, entity)?;
            conn.execute_batch(&ddl::create_index(&table, index))?;
        }
        MigrationOperation::ModifyIndex { entity, from, to } => {
            let table = table_of(working, namespace, entity)?;
            conn.execute_batch(&ddl::drop_index(&from.storage_name(&table)))?;
            conn.execute_batch(&ddl::create_index(&table, to))?;
        }
        MigrationOperation::RemoveIndex { entity, index } => {
            let table = table_of(working, namespace, entity)?;
            conn.execute_batch(&ddl::drop_index(&index.storage_name(&table)))?;
        }
        MigrationOperation::AddRelationship { relationship }
        | MigrationOperation::ModifyRelationship { to: relationship, .. } => {
            store::write_relationship(conn, namespace, relationship)?;
        }
        MigrationOperation::RemoveRelationship { relationship } => {
            store::delete_relationship(conn, namespace, &relationship.name)?;
        }
    }
    apply(working, operation);
    Ok(())
}

fn table_of(working: &SchemaFragment, namespace: &Namespace, entity: &str) -> Result<String> {
    working
        .entity(entity)
        .map(|e| e.storage_name(namespace))
        .ok_or_else(|| missing_entity(namespace, entity))
}

fn missing_entity(namespace: &Namespace, entity: &str) -> Error {
    Error::UnknownEntity {
        namespace: namespace.to_string(),
        entity: entity.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::migration::plan::PlanTarget;
    use crate::store::SqliteStore;
    use ext_schema::{EntityDef, EnumDef, FieldDef, FieldType, HostSchema};
    use pretty_assertions::assert_eq;
    use semver::Version;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn plan(from: Option<&SchemaFragment>, to: &SchemaFragment) -> MigrationPlan {
        let ns = Namespace::new("analytics").unwrap();
        let (v1, v2) = (Version::new(1, 0, 0), Version::new(2, 0, 0));
        MigrationPlan::generate(
            PlanTarget {
                extension: "analytics",
                namespace: &ns,
                from: from.map(|f| (&v1, f)),
                to: (&v2, to),
                observed_active: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    fn v1() -> SchemaFragment {
        SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft"]))
            .with_entity(
                EntityDef::new("reports")
                    .with_field(FieldDef::new("title", FieldType::String))
                    .with_field(FieldDef::new("score", FieldType::Integer)),
            )
    }

    fn v2() -> SchemaFragment {
        SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft", "published"]))
            .with_entity(
                EntityDef::new("reports")
                    .with_field(FieldDef::new("title", FieldType::Text).required().with_default(json!("untitled")))
                    .with_field(FieldDef::new("score", FieldType::Float))
                    .with_field(FieldDef::new("status", FieldType::Enum("status".into())))
                    .with_index(&["status"], false),
            )
    }

    fn migrate(store: &SqliteStore, from: Option<&SchemaFragment>, to: &SchemaFragment) -> Vec<String> {
        let mut conn = store.connection().unwrap();
        let tx = conn.transaction().unwrap();
        let empty = SchemaFragment::empty();
        let executed = apply_plan(&tx, from.unwrap_or(&empty), &plan(from, to)).unwrap();
        tx.commit().unwrap();
        executed
    }

    #[test]
    fn test_migrated_store_matches_fresh_install() {
        let migrated = SqliteStore::open(&StoreConfig::default(), &HostSchema::new()).unwrap();
        migrate(&migrated, None, &v1());
        {
            let conn = migrated.connection().unwrap();
            conn.execute_batch(
                "INSERT INTO analytics__reports (id, title, score) VALUES ('r1', NULL, 3), ('r2', 'kept', 4)",
            )
            .unwrap();
        }
        let executed = migrate(&migrated, Some(&v1()), &v2());
        assert_eq!(executed.len(), 5);

        let fresh = SqliteStore::open(&StoreConfig::default(), &HostSchema::new()).unwrap();
        migrate(&fresh, None, &v2());

        assert_eq!(migrated.shape().unwrap(), fresh.shape().unwrap());

        let conn = migrated.connection().unwrap();
        let titles: Vec<(String, f64)> = conn
            .prepare("SELECT title, score FROM analytics__reports ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(titles, vec![("untitled".to_string(), 3.0), ("kept".to_string(), 4.0)]);
    }

    #[test]
    fn test_failure_names_the_operation() {
        let store = SqliteStore::open(&StoreConfig::default(), &HostSchema::new()).unwrap();
        migrate(&store, None, &v1());
        {
            let conn = store.connection().unwrap();
            conn.execute_batch("INSERT INTO analytics__reports (id, title) VALUES ('a', 'same'), ('b', 'same')")
                .unwrap();
        }
        let unique = SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft"]))
            .with_entity(
                EntityDef::new("reports")
                    .with_field(FieldDef::new("title", FieldType::String))
                    .with_field(FieldDef::new("score", FieldType::Integer))
                    .with_index(&["title"], true),
            );

        let mut conn = store.connection().unwrap();
        let tx = conn.transaction().unwrap();
        let failure = apply_plan(&tx, &v1(), &plan(Some(&v1()), &unique)).unwrap_err();
        assert_eq!(failure.operation, "add_index reports.uq_title");
        assert!(matches!(failure.error, Error::Sqlite(_)));
    }
}
