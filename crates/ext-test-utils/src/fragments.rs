//! Canned fragments shared by the test suites.
//!
//! The reporting fragments form a version line:
//!
//! - V1: `reports` with a title, a status enum, and an owner pointing at `core.users`
//! - V2: adds `summary`, a `priority` with a default, an `archived` status,
//!   and an index on status; loosens the title length. Nothing destructive.
//! - V3: drops `owner_id` and the relationship on it. Destructive.

use ext_schema::{
    CascadePolicy, EntityDef, EnumDef, FieldDef, FieldRef, FieldType, HostEntity, HostSchema, Namespace,
    RelationshipDef, SchemaFragment, TargetRef,
};
use serde_json::json;

/// Host schema with `users` and `work_orders` (stored as `work_order`).
pub fn host() -> HostSchema {
    HostSchema::new()
        .with_entity(HostEntity::new("users", &["email", "name"]))
        .with_entity(HostEntity::new("work_orders", &["title"]).with_table("work_order"))
}

fn owner_relationship() -> RelationshipDef {
    RelationshipDef::new(
        "report_owner",
        FieldRef {
            entity: "reports".into(),
            field: "owner_id".into(),
        },
        TargetRef {
            namespace: Some(Namespace::host()),
            entity: "users".into(),
            field: "id".into(),
        },
    )
}

fn title() -> FieldDef {
    FieldDef::new("title", FieldType::String).required().with_max_length(200)
}

fn status() -> FieldDef {
    FieldDef::new("status", FieldType::Enum("status".into())).with_default(json!("draft"))
}

pub fn reporting_v1() -> SchemaFragment {
    SchemaFragment::empty()
        .with_enum(EnumDef::new("status", &["draft", "published"]))
        .with_entity(
            EntityDef::new("reports")
                .with_field(title())
                .with_field(status())
                .with_field(FieldDef::new("owner_id", FieldType::String)),
        )
        .with_relationship(owner_relationship())
}

pub fn reporting_v2() -> SchemaFragment {
    SchemaFragment::empty()
        .with_enum(EnumDef::new("status", &["draft", "published", "archived"]))
        .with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("title", FieldType::String).required().with_max_length(500))
                .with_field(status())
                .with_field(FieldDef::new("owner_id", FieldType::String))
                .with_field(FieldDef::new("summary", FieldType::Text))
                .with_field(
                    FieldDef::new("priority", FieldType::Integer)
                        .with_range(Some(0.0), Some(5.0))
                        .with_default(json!(3)),
                )
                .with_index(&["status"], false),
        )
        .with_relationship(owner_relationship())
}

pub fn reporting_v3() -> SchemaFragment {
    SchemaFragment::empty()
        .with_enum(EnumDef::new("status", &["draft", "published", "archived"]))
        .with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("title", FieldType::String).required().with_max_length(500))
                .with_field(status())
                .with_field(FieldDef::new("summary", FieldType::Text))
                .with_field(
                    FieldDef::new("priority", FieldType::Integer)
                        .with_range(Some(0.0), Some(5.0))
                        .with_default(json!(3)),
                )
                .with_index(&["status"], false),
        )
}

/// A `reports` entity with a single `body` field; installable in any namespace.
pub fn plain_reports() -> SchemaFragment {
    SchemaFragment::empty().with_entity(EntityDef::new("reports").with_field(FieldDef::new("body", FieldType::Text)))
}

/// `metrics` owned by the metrics extension.
pub fn base_metrics() -> SchemaFragment {
    SchemaFragment::empty().with_entity(
        EntityDef::new("metrics")
            .with_field(FieldDef::new("name", FieldType::String).required().unique())
            .with_field(FieldDef::new("value", FieldType::Float)),
    )
}

/// `dashboards` in the analytics namespace, each pointing at a `base_metrics.metrics` row.
pub fn analytics(on_delete: CascadePolicy) -> SchemaFragment {
    SchemaFragment::empty()
        .with_entity(
            EntityDef::new("dashboards")
                .with_field(FieldDef::new("label", FieldType::String).required())
                .with_field(FieldDef::new("metric_id", FieldType::String)),
        )
        .with_relationship(
            RelationshipDef::new(
                "dashboard_metric",
                FieldRef {
                    entity: "dashboards".into(),
                    field: "metric_id".into(),
                },
                TargetRef {
                    namespace: Some(Namespace::new("base_metrics").unwrap_or_else(|e| panic!("{e}"))),
                    entity: "metrics".into(),
                    field: "id".into(),
                },
            )
            .with_on_delete(on_delete),
        )
}

/// The reporting V1 fragment as a TOML document.
pub const REPORTING_V1_TOML: &str = r#"
[[enums]]
name = "status"
values = ["draft", "published"]

[[entities]]
name = "reports"

[[entities.fields]]
name = "title"
type = "string"
required = true
max_length = 200

[[entities.fields]]
name = "status"
type = "enum"
enum = "status"
default = "draft"

[[entities.fields]]
name = "owner_id"
type = "string"

[[relationships]]
name = "report_owner"
source = "reports.owner_id"
target = "core.users.id"
on_delete = "restrict"
"#;

/// The reporting V3 fragment as a TOML document.
pub const REPORTING_V3_TOML: &str = r#"
[[enums]]
name = "status"
values = ["draft", "published", "archived"]

[[entities]]
name = "reports"

[[entities.fields]]
name = "title"
type = "string"
required = true
max_length = 500

[[entities.fields]]
name = "status"
type = "enum"
enum = "status"
default = "draft"

[[entities.fields]]
name = "summary"
type = "text"

[[entities.fields]]
name = "priority"
type = "integer"
min = 0
max = 5
default = 3

[[entities.indexes]]
fields = ["status"]
"#;
