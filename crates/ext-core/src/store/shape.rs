//! Observable shape of the relational store
//!
//! Captures what a reader of the store can see: entity tables with their
//! columns and indexes, plus the enum and relationship catalogs. Internal
//! `_ext_*` bookkeeping tables and SQLite's own objects are excluded.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnShape {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShape {
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableShape {
    pub columns: Vec<ColumnShape>,
    /// Keyed by index name; primary-key autoindexes are excluded
    pub indexes: BTreeMap<String, IndexShape>,
}

impl TableShape {
    pub fn column(&self, name: &str) -> Option<&ColumnShape> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A row of the relationship catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipShape {
    pub source_entity: String,
    pub source_field: String,
    pub target_namespace: String,
    pub target_entity: String,
    pub target_field: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreShape {
    pub tables: BTreeMap<String, TableShape>,
    /// `namespace__enum` -> values in declaration order
    pub enums: BTreeMap<String, Vec<String>>,
    /// `namespace.relationship` -> catalog row
    pub relationships: BTreeMap<String, RelationshipShape>,
}

impl StoreShape {
    pub fn table(&self, name: &str) -> Option<&TableShape> {
        self.tables.get(name)
    }

    /// Read the shape from a connection.
    pub fn read(conn: &Connection) -> Result<Self> {
        let mut shape = StoreShape::default();

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             AND name NOT LIKE '\\_ext\\_%' ESCAPE '\\' ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for table in tables {
            let columns = conn
                .prepare("SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid")?
                .query_map([&table], |row| {
                    Ok(ColumnShape {
                        name: row.get(0)?,
                        decl_type: row.get(1)?,
                        not_null: row.get(2)?,
                        default: row.get(3)?,
                        primary_key: row.get::<_, i64>(4)? > 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let index_list = conn
                .prepare("SELECT name, \"unique\" FROM pragma_index_list(?1) WHERE origin <> 'pk'")?
                .query_map([&table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut indexes = BTreeMap::new();
            for (name, unique) in index_list {
                let columns = conn
                    .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?
                    .query_map([&name], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                indexes.insert(name, IndexShape { columns, unique });
            }

            shape.tables.insert(table, TableShape { columns, indexes });
        }

        let mut stmt =
            conn.prepare("SELECT namespace, enum_name, value FROM _ext_enum_values ORDER BY namespace, enum_name, position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (namespace, name, value) = row?;
            shape
                .enums
                .entry(format!("{namespace}__{name}"))
                .or_default()
                .push(value);
        }

        let mut stmt = conn.prepare(
            "SELECT namespace, name, source_entity, source_field, target_namespace, target_entity, \
             target_field, on_delete FROM _ext_relationships ORDER BY namespace, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                format!("{}.{}", row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                RelationshipShape {
                    source_entity: row.get(2)?,
                    source_field: row.get(3)?,
                    target_namespace: row.get(4)?,
                    target_entity: row.get(5)?,
                    target_field: row.get(6)?,
                    on_delete: row.get(7)?,
                },
            ))
        })?;
        for row in rows {
            let (key, rel) = row?;
            shape.relationships.insert(key, rel);
        }

        Ok(shape)
    }
}
