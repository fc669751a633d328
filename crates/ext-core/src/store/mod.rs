//! Relational store and catalog persistence

pub mod ddl;
mod shape;
mod sqlite;

pub use shape::{ColumnShape, IndexShape, RelationshipShape, StoreShape, TableShape};
pub use sqlite::{SqliteStore, to_sql_value};

pub(crate) use sqlite::{
    append_record, delete_enum, delete_relationship, insert_row, row_exists, set_active, set_status,
    table_exists, write_enum, write_relationship,
};
