//! Fragment documents: the loosely-typed TOML/JSON form extensions submit.
//!
//! Documents are converted into a [`SchemaFragment`] exactly once, at the
//! boundary. Conversion collects every problem (duplicates, unknown types,
//! malformed references) and then runs [`validate_fragment`] so a caller
//! sees all violations in a single pass.
//!
//! # Example TOML
//!
//! ```toml
//! [[enums]]
//! name = "status"
//! values = ["draft", "published"]
//!
//! [[entities]]
//! name = "reports"
//!
//! [[entities.fields]]
//! name = "title"
//! type = "string"
//! required = true
//! max_length = 200
//!
//! [[entities.fields]]
//! name = "status"
//! type = "enum"
//! enum = "status"
//! default = "draft"
//!
//! [[relationships]]
//! name = "report_owner"
//! source = "reports.owner_id"
//! target = "core.users.id"
//! on_delete = "restrict"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, FragmentViolation, Result};
use crate::field::{FieldDef, FieldType};
use crate::fragment::{
    CascadePolicy, EntityDef, EnumDef, FieldRef, IndexDef, RelationshipDef, SchemaFragment,
    TargetRef,
};
use crate::naming::Namespace;
use crate::validation::validate_fragment;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentDocument {
    #[serde(default)]
    pub entities: Vec<EntityDocument>,
    #[serde(default)]
    pub enums: Vec<EnumDocument>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDocument {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
    #[serde(default)]
    pub indexes: Vec<IndexDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default, rename = "enum")]
    pub enum_name: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDocument {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipDocument {
    pub name: String,
    /// `entity.field`
    pub source: String,
    /// `[namespace.]entity.field`
    pub target: String,
    #[serde(default)]
    pub on_delete: Option<String>,
}

impl FragmentDocument {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Convert into a typed fragment, failing with every violation found.
    pub fn into_fragment(self) -> Result<SchemaFragment> {
        let mut violations = Vec::new();
        let mut fragment = SchemaFragment::empty();

        for doc in self.enums {
            let path = format!("enums.{}", doc.name);
            if fragment.enums.contains_key(&doc.name) {
                violations.push(FragmentViolation::new(&path, "duplicate enumeration name"));
                continue;
            }
            fragment.enums.insert(
                doc.name.clone(),
                EnumDef {
                    name: doc.name,
                    values: doc.values,
                },
            );
        }

        for doc in self.entities {
            let path = format!("entities.{}", doc.name);
            if fragment.entities.contains_key(&doc.name) {
                violations.push(FragmentViolation::new(&path, "duplicate entity name"));
                continue;
            }
            let entity = convert_entity(&path, doc, &mut violations);
            fragment.entities.insert(entity.name.clone(), entity);
        }

        for doc in self.relationships {
            let path = format!("relationships.{}", doc.name);
            if fragment.relationships.contains_key(&doc.name) {
                violations.push(FragmentViolation::new(&path, "duplicate relationship name"));
                continue;
            }
            if let Some(rel) = convert_relationship(&path, doc, &mut violations) {
                fragment.relationships.insert(rel.name.clone(), rel);
            }
        }

        violations.extend(validate_fragment(&fragment));
        if violations.is_empty() {
            Ok(fragment)
        } else {
            tracing::debug!(count = violations.len(), "fragment document rejected");
            Err(Error::InvalidFragment { violations })
        }
    }
}

fn convert_entity(path: &str, doc: EntityDocument, violations: &mut Vec<FragmentViolation>) -> EntityDef {
    let mut fields = BTreeMap::new();
    for field in doc.fields {
        let field_path = format!("{path}.fields.{}", field.name);
        if fields.contains_key(&field.name) {
            violations.push(FragmentViolation::new(&field_path, "duplicate field name"));
            continue;
        }
        let Some(field_type) = FieldType::parse(&field.kind, field.enum_name.as_deref()) else {
            let message = if field.kind == "enum" {
                "enum fields must name their enumeration with `enum = \"...\"`".to_string()
            } else {
                format!("unknown field type '{}'", field.kind)
            };
            violations.push(FragmentViolation::new(&field_path, message));
            continue;
        };
        if field.enum_name.is_some() && !matches!(field_type, FieldType::Enum(_)) {
            violations.push(FragmentViolation::new(&field_path, "`enum` is only allowed on enum fields"));
        }
        fields.insert(
            field.name.clone(),
            FieldDef {
                name: field.name,
                field_type,
                required: field.required,
                unique: field.unique,
                max_length: field.max_length,
                min: field.min,
                max: field.max,
                default: field.default,
            },
        );
    }

    let mut indexes = BTreeMap::new();
    for index in doc.indexes {
        let mut def = IndexDef::new(index.fields, index.unique);
        if let Some(name) = index.name {
            def.name = name;
        }
        if indexes.contains_key(&def.name) {
            violations.push(FragmentViolation::new(
                format!("{path}.indexes.{}", def.name),
                "duplicate index name",
            ));
            continue;
        }
        indexes.insert(def.name.clone(), def);
    }

    EntityDef {
        name: doc.name,
        table: doc.table,
        fields,
        indexes,
    }
}

fn convert_relationship(
    path: &str,
    doc: RelationshipDocument,
    violations: &mut Vec<FragmentViolation>,
) -> Option<RelationshipDef> {
    let source = parse_field_ref(&doc.source);
    if source.is_none() {
        violations.push(FragmentViolation::new(
            path,
            format!("source '{}' must have the form entity.field", doc.source),
        ));
    }
    let target = match parse_target_ref(&doc.target) {
        Ok(target) => Some(target),
        Err(reason) => {
            violations.push(FragmentViolation::new(path, reason));
            None
        }
    };
    let on_delete = match doc.on_delete.as_deref() {
        None => Some(CascadePolicy::default()),
        Some(s) => {
            let policy = CascadePolicy::parse(s);
            if policy.is_none() {
                violations.push(FragmentViolation::new(path, format!("unknown on_delete policy '{s}'")));
            }
            policy
        }
    };
    Some(RelationshipDef {
        name: doc.name,
        source: source?,
        target: target?,
        on_delete: on_delete?,
    })
}

/// Parse `entity.field`.
pub fn parse_field_ref(s: &str) -> Option<FieldRef> {
    let (entity, field) = s.split_once('.')?;
    if entity.is_empty() || field.is_empty() || field.contains('.') {
        return None;
    }
    Some(FieldRef {
        entity: entity.to_string(),
        field: field.to_string(),
    })
}

/// Parse `[namespace.]entity.field`.
pub fn parse_target_ref(s: &str) -> std::result::Result<TargetRef, String> {
    let parts: Vec<&str> = s.split('.').collect();
    let (namespace, entity, field) = match parts.as_slice() {
        [entity, field] => (None, *entity, *field),
        [ns, entity, field] => {
            let ns = Namespace::new(*ns).map_err(|e| format!("target '{s}': {e}"))?;
            (Some(ns), *entity, *field)
        }
        _ => return Err(format!("target '{s}' must have the form [namespace.]entity.field")),
    };
    if entity.is_empty() || field.is_empty() {
        return Err(format!("target '{s}' must have the form [namespace.]entity.field"));
    }
    Ok(TargetRef {
        namespace,
        entity: entity.to_string(),
        field: field.to_string(),
    })
}

impl SchemaFragment {
    /// Parse and validate a fragment from a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        FragmentDocument::from_toml(content)?.into_fragment()
    }

    /// Parse and validate a fragment from a JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        FragmentDocument::from_json(content)?.into_fragment()
    }

    /// Validate a fragment built in code, returning every violation.
    pub fn validate(&self) -> Result<()> {
        let violations = validate_fragment(self);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidFragment { violations })
        }
    }
}
