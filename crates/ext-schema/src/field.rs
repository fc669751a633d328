//! Field definitions and per-value constraint checks.

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of an entity field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "enum", rename_all = "lowercase")]
pub enum FieldType {
    /// Short text, optionally bounded by `max_length`.
    String,
    /// Unbounded text.
    Text,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp stored as text.
    DateTime,
    /// Arbitrary JSON stored as text.
    Json,
    /// Member of a declared enumeration (by local name).
    Enum(String),
}

impl FieldType {
    /// Parse the document spelling of a type. `enum_name` is consulted only
    /// for `"enum"`.
    pub fn parse(kind: &str, enum_name: Option<&str>) -> Option<Self> {
        let ty = match kind {
            "string" => Self::String,
            "text" => Self::Text,
            "integer" | "int" => Self::Integer,
            "float" | "number" => Self::Float,
            "boolean" | "bool" => Self::Boolean,
            "datetime" => Self::DateTime,
            "json" => Self::Json,
            "enum" => Self::Enum(enum_name?.to_string()),
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Text)
    }

    /// Affinity of the column that stores this type.
    pub fn column_affinity(&self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Float => "REAL",
            Self::String | Self::Text | Self::DateTime | Self::Json | Self::Enum(_) => "TEXT",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::DateTime => write!(f, "datetime"),
            Self::Json => write!(f, "json"),
            Self::Enum(name) => write!(f, "enum({name})"),
        }
    }
}

/// A typed field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// Create an optional, non-unique field with no bounds.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            max_length: None,
            min: None,
            max: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Check a single value against this field's type, bounds, and
    /// enumeration membership.
    ///
    /// `enum_values` must hold the allowed values when the field is an enum.
    /// A missing or null value is a violation only for required fields.
    /// All violations are returned, not just the first.
    pub fn check_value(&self, value: Option<&Value>, enum_values: Option<&[String]>) -> Vec<String> {
        let mut problems = Vec::new();
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    problems.push("value is required".to_string());
                }
                return problems;
            }
            Some(v) => v,
        };

        match &self.field_type {
            FieldType::String | FieldType::Text => match value.as_str() {
                Some(s) => {
                    if let Some(max) = self.max_length {
                        let len = s.chars().count();
                        if len > max as usize {
                            problems.push(format!("length {len} exceeds max_length {max}"));
                        }
                    }
                }
                None => problems.push(format!("expected {}, got {}", self.field_type, kind_of(value))),
            },
            FieldType::Integer => match value.as_i64() {
                Some(n) => check_bounds(n as f64, self.min, self.max, &mut problems),
                None => problems.push(format!("expected integer, got {}", kind_of(value))),
            },
            FieldType::Float => match value.as_f64() {
                Some(n) => check_bounds(n, self.min, self.max, &mut problems),
                None => problems.push(format!("expected float, got {}", kind_of(value))),
            },
            FieldType::Boolean => {
                if !value.is_boolean() {
                    problems.push(format!("expected boolean, got {}", kind_of(value)));
                }
            }
            FieldType::DateTime => match value.as_str() {
                Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => {}
                Some(s) => problems.push(format!("'{s}' is not an RFC 3339 timestamp")),
                None => problems.push(format!("expected datetime string, got {}", kind_of(value))),
            },
            FieldType::Json => {}
            FieldType::Enum(name) => match value.as_str() {
                Some(s) => {
                    let allowed = enum_values.unwrap_or(&[]);
                    if !allowed.iter().any(|v| v == s) {
                        problems.push(format!("'{s}' is not a member of enum '{name}'"));
                    }
                }
                None => problems.push(format!("expected enum string, got {}", kind_of(value))),
            },
        }

        problems
    }
}

fn check_bounds(n: f64, min: Option<f64>, max: Option<f64>, problems: &mut Vec<String>) {
    if min.is_some_and(|min| n < min) {
        problems.push(format!("{n} is below minimum {}", min.unwrap_or_default()));
    }
    if max.is_some_and(|max| n > max) {
        problems.push(format!("{n} is above maximum {}", max.unwrap_or_default()));
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
