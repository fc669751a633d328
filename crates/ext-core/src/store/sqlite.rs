//! SQLite-backed store
//!
//! One connection, guarded by a mutex, holds both the extension tables and
//! the `_ext_*` catalog. The catalog is created on open and versioned with
//! `PRAGMA user_version`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ext_manifest::{ExtensionManifest, ManifestCatalog};
use ext_schema::{EnumDef, HostSchema, Namespace, RelationshipDef};
use rusqlite::{Connection, OptionalExtension, params};
use semver::Version;
use serde_json::Value;
use uuid::Uuid;

use super::ddl::quote;
use super::shape::StoreShape;
use crate::audit::{MigrationOutcome, MigrationRecord};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::migration::MigrationPlan;
use crate::registry::{ActivePointer, RegistryState, SchemaEntry, SchemaStatus};

const CATALOG_VERSION: u32 = 1;
const CATALOG_SQL: &str = include_str!("catalog.sql");

fn corrupt(table: &'static str) -> impl Fn(String) -> Error {
    move |reason| Error::CorruptCatalog { table, reason }
}

fn parse_version(table: &'static str, raw: &str) -> Result<Version> {
    Version::parse(raw).map_err(|e| corrupt(table)(format!("version '{raw}': {e}")))
}

fn parse_time(table: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(table)(format!("timestamp '{raw}': {e}")))
}

fn parse_uuid(table: &'static str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| corrupt(table)(format!("uuid '{raw}': {e}")))
}

fn parse_namespace(table: &'static str, raw: &str) -> Result<Namespace> {
    Namespace::new(raw).map_err(|e| corrupt(table)(e.to_string()))
}

/// Convert a JSON record value to a SQLite value.
pub fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

/// The relational store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store and make sure the catalog and host
    /// tables exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the catalog
    /// cannot be created.
    pub fn open(config: &StoreConfig, host: &HostSchema) -> Result<Self> {
        let mut conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        bootstrap(&mut conn, host)?;
        tracing::debug!(path = ?config.path, "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned("store connection"))
    }

    /// Rebuild registry state from the catalog.
    pub fn load_state(&self) -> Result<RegistryState> {
        let conn = self.connection()?;
        let mut state = RegistryState::default();

        let mut stmt = conn.prepare("SELECT body FROM _ext_manifests ORDER BY extension, version")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut manifests = ManifestCatalog::new();
        for body in bodies {
            let manifest: ExtensionManifest =
                serde_json::from_str(&body).map_err(|e| corrupt("_ext_manifests")(e.to_string()))?;
            manifests.insert(manifest)?;
        }
        state.manifests = manifests;

        let mut stmt = conn.prepare(
            "SELECT extension, version, schema_id, namespace, fingerprint, fragment, status, conflicts, \
             registered_at FROM _ext_schema_history",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok([
                    row.get::<_, String>(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ])
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        const HISTORY: &str = "_ext_schema_history";
        for [extension, version, schema_id, namespace, fingerprint, fragment, status, conflicts, registered_at] in rows {
            state.put_entry(SchemaEntry {
                version: parse_version(HISTORY, &version)?,
                namespace: parse_namespace(HISTORY, &namespace)?,
                fragment: serde_json::from_str(&fragment).map_err(|e| corrupt(HISTORY)(e.to_string()))?,
                status: SchemaStatus::from_str(&status).map_err(corrupt(HISTORY))?,
                conflicts: serde_json::from_str(&conflicts).map_err(|e| corrupt(HISTORY)(e.to_string()))?,
                registered_at: parse_time(HISTORY, &registered_at)?,
                extension,
                schema_id,
                fingerprint,
            });
        }

        let mut stmt = conn.prepare("SELECT namespace, extension, version, schema_id FROM _ext_active_schema")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (namespace, extension, version, schema_id) in rows {
            state.active.insert(
                parse_namespace("_ext_active_schema", &namespace)?,
                ActivePointer {
                    extension,
                    version: parse_version("_ext_active_schema", &version)?,
                    schema_id,
                },
            );
        }

        let mut stmt = conn.prepare("SELECT plan FROM _ext_latest_plan")?;
        let plans = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for body in plans {
            let plan: MigrationPlan =
                serde_json::from_str(&body).map_err(|e| corrupt("_ext_latest_plan")(e.to_string()))?;
            state.latest_plans.insert(plan.namespace.clone(), plan);
        }

        tracing::debug!(
            manifests = state.manifests.len(),
            extensions = state.history.len(),
            active = state.active.len(),
            "registry state loaded"
        );
        Ok(state)
    }

    pub fn save_manifest(&self, manifest: &ExtensionManifest) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO _ext_manifests (extension, version, namespace, body, submitted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                manifest.id,
                manifest.version.to_string(),
                manifest.namespace.as_str(),
                serde_json::to_string(manifest)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert or update a history entry.
    pub fn save_schema(&self, entry: &SchemaEntry) -> Result<()> {
        let conn = self.connection()?;
        write_schema(&conn, entry)
    }

    pub fn save_latest_plan(&self, plan: &MigrationPlan) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO _ext_latest_plan (namespace, plan_id, plan) VALUES (?1, ?2, ?3)",
            params![plan.namespace.as_str(), plan.id.to_string(), serde_json::to_string(plan)?],
        )?;
        Ok(())
    }

    /// Append a record outside any migration transaction.
    pub fn append_record(&self, record: &MigrationRecord) -> Result<()> {
        let conn = self.connection()?;
        append_record(&conn, record)
    }

    /// Audit records in append order, optionally for one extension.
    pub fn migration_log(&self, extension: Option<&str>) -> Result<Vec<MigrationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, plan_id, extension, namespace, from_version, to_version, executed_operations, outcome, \
             failed_operation, error, actor, started_at, finished_at FROM _ext_migration_log \
             WHERE ?1 IS NULL OR extension = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([extension], |row| {
                Ok((
                    [
                        row.get::<_, String>(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(10)?,
                        row.get(11)?,
                        row.get(12)?,
                    ],
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        const LOG: &str = "_ext_migration_log";
        let mut records = Vec::with_capacity(rows.len());
        for (
            [id, plan_id, extension, namespace, to_version, executed, outcome, actor, started_at, finished_at],
            from_version,
            failed_operation,
            error,
        ) in rows
        {
            records.push(MigrationRecord {
                id: parse_uuid(LOG, &id)?,
                plan_id: parse_uuid(LOG, &plan_id)?,
                extension,
                namespace: parse_namespace(LOG, &namespace)?,
                from_version: from_version.map(|v| parse_version(LOG, &v)).transpose()?,
                to_version: parse_version(LOG, &to_version)?,
                executed_operations: serde_json::from_str(&executed).map_err(|e| corrupt(LOG)(e.to_string()))?,
                outcome: MigrationOutcome::parse(&outcome)
                    .ok_or_else(|| corrupt(LOG)(format!("unknown outcome '{outcome}'")))?,
                failed_operation,
                error,
                actor,
                started_at: parse_time(LOG, &started_at)?,
                finished_at: parse_time(LOG, &finished_at)?,
            });
        }
        Ok(records)
    }

    /// Current observable shape.
    pub fn shape(&self) -> Result<StoreShape> {
        let conn = self.connection()?;
        StoreShape::read(&conn)
    }

    /// Number of rows in a table.
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn bootstrap(conn: &mut Connection, host: &HostSchema) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let tx = conn.transaction()?;
    if current < CATALOG_VERSION {
        tx.execute_batch(CATALOG_SQL)?;
        tx.execute_batch(&format!("PRAGMA user_version = {CATALOG_VERSION}"))?;
    }
    // Host tables belong to the platform; only make sure they exist.
    for entity in host.entities.values() {
        let mut columns = vec![format!("{} TEXT PRIMARY KEY", quote(ext_schema::PRIMARY_KEY))];
        columns.extend(
            entity
                .fields
                .iter()
                .filter(|f| f.as_str() != ext_schema::PRIMARY_KEY)
                .map(|f| quote(f)),
        );
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(entity.storage_name()),
            columns.join(", ")
        ))?;
    }
    tx.commit()?;
    Ok(())
}

fn write_schema(conn: &Connection, entry: &SchemaEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO _ext_schema_history (extension, version, schema_id, namespace, fingerprint, fragment, \
         status, conflicts, registered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT (extension, version) DO UPDATE SET status = excluded.status, conflicts = excluded.conflicts",
        params![
            entry.extension,
            entry.version.to_string(),
            entry.schema_id,
            entry.namespace.as_str(),
            entry.fingerprint,
            entry.fragment.to_canonical_json(),
            entry.status.as_str(),
            serde_json::to_string(&entry.conflicts)?,
            entry.registered_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn set_status(conn: &Connection, extension: &str, version: &Version, status: SchemaStatus) -> Result<()> {
    conn.execute(
        "UPDATE _ext_schema_history SET status = ?3 WHERE extension = ?1 AND version = ?2",
        params![extension, version.to_string(), status.as_str()],
    )?;
    Ok(())
}

pub(crate) fn set_active(conn: &Connection, namespace: &Namespace, pointer: &ActivePointer) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO _ext_active_schema (namespace, extension, version, schema_id, activated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            namespace.as_str(),
            pointer.extension,
            pointer.version.to_string(),
            pointer.schema_id,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn append_record(conn: &Connection, record: &MigrationRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO _ext_migration_log (id, plan_id, extension, namespace, from_version, to_version, \
         executed_operations, outcome, failed_operation, error, actor, started_at, finished_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.id.to_string(),
            record.plan_id.to_string(),
            record.extension,
            record.namespace.as_str(),
            record.from_version.as_ref().map(ToString::to_string),
            record.to_version.to_string(),
            serde_json::to_string(&record.executed_operations)?,
            record.outcome.as_str(),
            record.failed_operation,
            record.error,
            record.actor,
            record.started_at.to_rfc3339(),
            record.finished_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn write_enum(conn: &Connection, namespace: &Namespace, def: &EnumDef) -> Result<()> {
    delete_enum(conn, namespace, &def.name)?;
    let mut stmt =
        conn.prepare("INSERT INTO _ext_enum_values (namespace, enum_name, position, value) VALUES (?1, ?2, ?3, ?4)")?;
    for (position, value) in def.values.iter().enumerate() {
        stmt.execute(params![namespace.as_str(), def.name, position as i64, value])?;
    }
    Ok(())
}

pub(crate) fn delete_enum(conn: &Connection, namespace: &Namespace, name: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM _ext_enum_values WHERE namespace = ?1 AND enum_name = ?2",
        params![namespace.as_str(), name],
    )?;
    Ok(())
}

pub(crate) fn write_relationship(conn: &Connection, namespace: &Namespace, rel: &RelationshipDef) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO _ext_relationships (namespace, name, source_entity, source_field, \
         target_namespace, target_entity, target_field, on_delete) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            namespace.as_str(),
            rel.name,
            rel.source.entity,
            rel.source.field,
            rel.target.resolved_namespace(namespace).as_str(),
            rel.target.entity,
            rel.target.field,
            rel.on_delete.to_string(),
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_relationship(conn: &Connection, namespace: &Namespace, name: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM _ext_relationships WHERE namespace = ?1 AND name = ?2",
        params![namespace.as_str(), name],
    )?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Whether any row of `table` has `column = value`.
pub(crate) fn row_exists(conn: &Connection, table: &str, column: &str, value: &Value) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1", quote(table), quote(column));
    let found = conn
        .query_row(&sql, [to_sql_value(value)], |row| row.get::<_, i64>(0))
        .optional()?;
    Ok(found.is_some())
}

/// Insert a row from column/value pairs.
pub(crate) fn insert_row(conn: &Connection, table: &str, values: &BTreeMap<String, Value>) -> Result<()> {
    let columns: Vec<String> = values.keys().map(|c| quote(c)).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    let params: Vec<rusqlite::types::Value> = values.values().map(to_sql_value).collect();
    conn.execute(&sql, rusqlite::params_from_iter(params))?;
    Ok(())
}
