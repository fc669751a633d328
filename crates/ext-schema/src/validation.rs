//! Fragment-internal validation.
//!
//! Checks everything that can be decided from a single fragment in
//! isolation. Cross-namespace questions (name collisions, relationship
//! targets in other namespaces) belong to the conflict detector.

use std::collections::BTreeSet;

use crate::error::FragmentViolation;
use crate::field::{FieldDef, FieldType};
use crate::fragment::{CascadePolicy, EntityDef, PRIMARY_KEY, SchemaFragment};
use crate::naming::identifier_error;

/// Validate a fragment, returning every violation found.
pub fn validate_fragment(fragment: &SchemaFragment) -> Vec<FragmentViolation> {
    let mut violations = Vec::new();

    for (key, def) in &fragment.enums {
        let path = format!("enums.{key}");
        check_identifier(&path, &def.name, &mut violations);
        if def.values.is_empty() {
            violations.push(FragmentViolation::new(&path, "enumeration must declare at least one value"));
        }
        let mut seen = BTreeSet::new();
        for value in &def.values {
            if value.is_empty() {
                violations.push(FragmentViolation::new(&path, "enumeration values must not be empty"));
            } else if !seen.insert(value.as_str()) {
                violations.push(FragmentViolation::new(&path, format!("duplicate value '{value}'")));
            }
        }
    }

    let mut tables = BTreeSet::new();
    for (key, entity) in &fragment.entities {
        let path = format!("entities.{key}");
        check_identifier(&path, &entity.name, &mut violations);
        if let Some(table) = &entity.table {
            if let Some(reason) = identifier_error(table) {
                violations.push(FragmentViolation::new(&path, format!("invalid table '{table}': {reason}")));
            }
            if !tables.insert(table.clone()) {
                violations.push(FragmentViolation::new(
                    &path,
                    format!("table '{table}' is used by more than one entity"),
                ));
            }
        }
        validate_entity(&path, entity, fragment, &mut violations);
    }

    for (key, rel) in &fragment.relationships {
        let path = format!("relationships.{key}");
        check_identifier(&path, &rel.name, &mut violations);

        let source_field = match fragment.entity(&rel.source.entity) {
            None => {
                violations.push(FragmentViolation::new(
                    &path,
                    format!("source entity '{}' is not declared", rel.source.entity),
                ));
                None
            }
            Some(entity) => {
                if !entity.has_column(&rel.source.field) {
                    violations.push(FragmentViolation::new(
                        &path,
                        format!("source field '{}' is not declared", rel.source),
                    ));
                }
                entity.fields.get(&rel.source.field)
            }
        };

        if rel.target.namespace.is_none() {
            match fragment.entity(&rel.target.entity) {
                None => violations.push(FragmentViolation::new(
                    &path,
                    format!("target entity '{}' is not declared", rel.target.entity),
                )),
                Some(entity) if !entity.has_column(&rel.target.field) => {
                    violations.push(FragmentViolation::new(
                        &path,
                        format!("target field '{}' is not declared", rel.target),
                    ))
                }
                Some(_) => {}
            }
        }

        if rel.on_delete == CascadePolicy::SetNull && source_field.is_some_and(|f| f.required) {
            violations.push(FragmentViolation::new(
                &path,
                format!("on_delete = set_null requires '{}' to be optional", rel.source),
            ));
        }
    }

    violations
}

fn validate_entity(
    path: &str,
    entity: &EntityDef,
    fragment: &SchemaFragment,
    violations: &mut Vec<FragmentViolation>,
) {
    for (key, field) in &entity.fields {
        let field_path = format!("{path}.fields.{key}");
        check_identifier(&field_path, &field.name, violations);
        if field.name == PRIMARY_KEY {
            violations.push(FragmentViolation::new(
                &field_path,
                format!("'{PRIMARY_KEY}' is the implicit primary key and cannot be declared"),
            ));
        }
        validate_field(&field_path, field, fragment, violations);
    }

    for (key, index) in &entity.indexes {
        let index_path = format!("{path}.indexes.{key}");
        if index.fields.is_empty() {
            violations.push(FragmentViolation::new(&index_path, "index must cover at least one field"));
        }
        for field in &index.fields {
            if !entity.has_column(field) {
                violations.push(FragmentViolation::new(
                    &index_path,
                    format!("indexed field '{field}' is not declared"),
                ));
            }
        }
    }
}

fn validate_field(
    path: &str,
    field: &FieldDef,
    fragment: &SchemaFragment,
    violations: &mut Vec<FragmentViolation>,
) {
    if let FieldType::Enum(name) = &field.field_type {
        if !fragment.enums.contains_key(name) {
            violations.push(FragmentViolation::new(path, format!("unknown enumeration '{name}'")));
        }
    }
    if field.max_length.is_some() && !field.field_type.is_textual() {
        violations.push(FragmentViolation::new(
            path,
            format!("max_length is not allowed on {} fields", field.field_type),
        ));
    }
    if (field.min.is_some() || field.max.is_some()) && !field.field_type.is_numeric() {
        violations.push(FragmentViolation::new(
            path,
            format!("min/max are not allowed on {} fields", field.field_type),
        ));
    }
    for bound in [field.min, field.max].into_iter().flatten() {
        if !bound.is_finite() {
            violations.push(FragmentViolation::new(path, "bounds must be finite numbers"));
        }
    }
    if let (Some(min), Some(max)) = (field.min, field.max) {
        if min > max {
            violations.push(FragmentViolation::new(path, format!("min {min} is greater than max {max}")));
        }
    }
    if let Some(default) = &field.default {
        let enum_values = match &field.field_type {
            FieldType::Enum(name) => fragment.enum_values(name),
            _ => None,
        };
        for problem in field.check_value(Some(default), enum_values) {
            violations.push(FragmentViolation::new(path, format!("default value invalid: {problem}")));
        }
    }
}

fn check_identifier(path: &str, name: &str, violations: &mut Vec<FragmentViolation>) {
    if let Some(reason) = identifier_error(name) {
        violations.push(FragmentViolation::new(path, format!("invalid name '{name}': {reason}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{EnumDef, FieldRef, RelationshipDef, TargetRef};
    use crate::naming::Namespace;
    use serde_json::json;

    fn reports() -> EntityDef {
        EntityDef::new("reports")
            .with_field(FieldDef::new("title", FieldType::String).required())
            .with_field(FieldDef::new("owner_id", FieldType::String).required())
    }

    #[test]
    fn test_valid_fragment_has_no_violations() {
        let fragment = SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft", "done"]))
            .with_entity(
                reports()
                    .with_field(FieldDef::new("status", FieldType::Enum("status".into())))
                    .with_index(&["title"], true),
            );
        assert!(validate_fragment(&fragment).is_empty());
    }

    #[test]
    fn test_collects_all_violations() {
        let fragment = SchemaFragment::empty().with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("id", FieldType::String))
                .with_field(FieldDef::new("kind", FieldType::Enum("missing".into())))
                .with_field(FieldDef::new("flag", FieldType::Boolean).with_max_length(3))
                .with_index(&["nope"], false),
        );
        let violations = validate_fragment(&fragment);
        assert_eq!(violations.len(), 4, "{violations:?}");
    }

    #[test]
    fn test_bounds_checks() {
        let fragment = SchemaFragment::empty().with_entity(
            EntityDef::new("scores")
                .with_field(FieldDef::new("value", FieldType::Integer).with_range(Some(10.0), Some(1.0)))
                .with_field(FieldDef::new("label", FieldType::String).with_range(Some(0.0), None)),
        );
        let violations = validate_fragment(&fragment);
        assert_eq!(violations.len(), 2, "{violations:?}");
    }

    #[test]
    fn test_invalid_default() {
        let fragment = SchemaFragment::empty()
            .with_enum(EnumDef::new("status", &["draft"]))
            .with_entity(EntityDef::new("reports").with_field(
                FieldDef::new("status", FieldType::Enum("status".into())).with_default(json!("gone")),
            ));
        let violations = validate_fragment(&fragment);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("default value invalid"));
    }

    #[test]
    fn test_enum_checks() {
        let fragment = SchemaFragment::empty()
            .with_enum(EnumDef::new("empty", &[]))
            .with_enum(EnumDef::new("dup", &["a", "a"]));
        assert_eq!(validate_fragment(&fragment).len(), 2);
    }

    #[test]
    fn test_relationship_checks() {
        let fragment = SchemaFragment::empty()
            .with_entity(reports())
            .with_relationship(
                RelationshipDef::new(
                    "owner",
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
                .with_on_delete(CascadePolicy::SetNull),
            )
            .with_relationship(RelationshipDef::new(
                "dangling",
                FieldRef {
                    entity: "ghosts".into(),
                    field: "x".into(),
                },
                TargetRef {
                    namespace: None,
                    entity: "phantoms".into(),
                    field: "id".into(),
                },
            ));
        let violations = validate_fragment(&fragment);
        // set_null on required field, unknown source entity, unknown local target
        assert_eq!(violations.len(), 3, "{violations:?}");
    }

    #[test]
    fn test_duplicate_table_override() {
        let fragment = SchemaFragment::empty()
            .with_entity(EntityDef::new("a").with_table("shared_t"))
            .with_entity(EntityDef::new("b").with_table("shared_t"));
        let violations = validate_fragment(&fragment);
        assert_eq!(violations.len(), 1);
    }
}
