//! SQL generation for entity tables
//!
//! Every entity table carries `id TEXT PRIMARY KEY` followed by its fields in
//! name order. Column changes rebuild the table (create, copy, drop, rename)
//! so a migrated table is indistinguishable from a freshly created one.

use ext_schema::{EntityDef, FieldDef, IndexDef, PRIMARY_KEY};
use serde_json::Value;

/// Prefix of the scratch table used while rebuilding.
const REBUILD_PREFIX: &str = "_ext_rebuild_";

/// Quote an identifier for SQLite.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Render a JSON value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn column(field: &FieldDef) -> String {
    let mut sql = format!("{} {}", quote(&field.name), field.field_type.column_affinity());
    if field.required {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &field.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&literal(default));
    }
    sql
}

fn create_table_as(name: &str, entity: &EntityDef) -> String {
    let mut columns = vec![format!("{} TEXT PRIMARY KEY", quote(PRIMARY_KEY))];
    columns.extend(entity.fields.values().map(column));
    format!("CREATE TABLE {} ({})", quote(name), columns.join(", "))
}

/// Storage name of the unique index backing a unique field.
pub fn unique_field_index(table: &str, field: &str) -> String {
    format!("{table}__{field}_unique_key")
}

/// `CREATE INDEX` for a declared index.
pub fn create_index(table: &str, index: &IndexDef) -> String {
    let columns: Vec<String> = index.fields.iter().map(|f| quote(f)).collect();
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.storage_name(table)),
        quote(table),
        columns.join(", ")
    )
}

/// `CREATE INDEX` statements for every unique field and declared index.
pub fn create_indexes(table: &str, entity: &EntityDef) -> Vec<String> {
    let mut statements: Vec<String> = entity
        .fields
        .values()
        .filter(|f| f.unique)
        .map(|f| {
            format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                quote(&unique_field_index(table, &f.name)),
                quote(table),
                quote(&f.name)
            )
        })
        .collect();
    statements.extend(entity.indexes.values().map(|index| create_index(table, index)));
    statements
}

/// Create the table and all of its indexes.
pub fn create_entity(table: &str, entity: &EntityDef) -> Vec<String> {
    let mut statements = vec![create_table_as(table, entity)];
    statements.extend(create_indexes(table, entity));
    statements
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote(table))
}

pub fn drop_index(name: &str) -> String {
    format!("DROP INDEX {}", quote(name))
}

/// Rebuild `table` from the `old` column set to the `new` one, copying rows.
///
/// Columns present in both keep their values, cast when the storage type
/// changes; new columns take their default. Required columns fall back to
/// their default when the copied value is null, and otherwise fail the
/// copy on `NOT NULL`.
pub fn rebuild_table(table: &str, old: &EntityDef, new: &EntityDef) -> Vec<String> {
    let scratch = format!("{REBUILD_PREFIX}{table}");
    let mut targets = vec![quote(PRIMARY_KEY)];
    let mut sources = vec![quote(PRIMARY_KEY)];
    for field in new.fields.values() {
        let copied = match old.fields.get(&field.name) {
            Some(prev) if prev.field_type.column_affinity() != field.field_type.column_affinity() => {
                format!(
                    "CAST({} AS {})",
                    quote(&field.name),
                    field.field_type.column_affinity()
                )
            }
            Some(_) => quote(&field.name),
            None => field.default.as_ref().map_or_else(|| "NULL".to_string(), literal),
        };
        let expr = match (&field.default, old.fields.contains_key(&field.name)) {
            (Some(default), true) if field.required => format!("COALESCE({copied}, {})", literal(default)),
            _ => copied,
        };
        targets.push(quote(&field.name));
        sources.push(expr);
    }

    let mut statements = vec![
        create_table_as(&scratch, new),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote(&scratch),
            targets.join(", "),
            sources.join(", "),
            quote(table)
        ),
        drop_table(table),
        format!("ALTER TABLE {} RENAME TO {}", quote(&scratch), quote(table)),
    ];
    statements.extend(create_indexes(table, new));
    statements
}
