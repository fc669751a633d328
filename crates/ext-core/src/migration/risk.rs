//! Risk classification of individual operations

use ext_schema::{CascadePolicy, FieldDef, FieldType};

use super::operation::{MigrationOperation, PlannedOperation, RiskClass};

/// Classify an operation, collecting every reason that contributes.
pub fn classify(operation: MigrationOperation) -> PlannedOperation {
    let mut reasons = Vec::new();
    let risk = match &operation {
        MigrationOperation::AddEnum { .. } | MigrationOperation::AddEntity { .. } => RiskClass::Safe,

        MigrationOperation::ModifyEnum { from, to } => {
            let removed: Vec<&str> = from
                .values
                .iter()
                .filter(|v| !to.values.contains(v))
                .map(String::as_str)
                .collect();
            if removed.is_empty() {
                RiskClass::Safe
            } else {
                reasons.push(format!("removes enum values: {}", removed.join(", ")));
                RiskClass::Destructive
            }
        }

        MigrationOperation::AddField { field, .. } => {
            let mut risk = RiskClass::Safe;
            if field.required && field.default.is_none() {
                reasons.push("required field without default fails on existing rows".to_string());
                risk = RiskClass::Risky;
            }
            if field.unique {
                reasons.push("introduces a uniqueness constraint".to_string());
                risk = RiskClass::Risky;
            }
            risk
        }

        MigrationOperation::ModifyField { from, to, .. } => field_change(from, to, &mut reasons),

        MigrationOperation::AddIndex { index, .. } => {
            if index.unique {
                reasons.push("introduces a uniqueness constraint".to_string());
                RiskClass::Risky
            } else {
                RiskClass::Safe
            }
        }

        MigrationOperation::ModifyIndex { from, to, .. } => {
            if to.unique && !from.unique {
                reasons.push("index becomes unique".to_string());
                RiskClass::Risky
            } else {
                RiskClass::Safe
            }
        }

        MigrationOperation::AddRelationship { relationship } => {
            if relationship.on_delete == CascadePolicy::Cascade {
                reasons.push("introduces cascade delete".to_string());
                RiskClass::Destructive
            } else {
                RiskClass::Safe
            }
        }

        MigrationOperation::ModifyRelationship { from, to } => {
            if to.on_delete == CascadePolicy::Cascade && from.on_delete != CascadePolicy::Cascade {
                reasons.push("introduces cascade delete".to_string());
                RiskClass::Destructive
            } else {
                reasons.push("changes an existing relationship".to_string());
                RiskClass::Risky
            }
        }

        MigrationOperation::RemoveIndex { .. } => RiskClass::Safe,

        MigrationOperation::RemoveRelationship { .. } => {
            reasons.push("drops a declared relationship".to_string());
            RiskClass::Destructive
        }
        MigrationOperation::RemoveField { .. } => {
            reasons.push("drops a column and its data".to_string());
            RiskClass::Destructive
        }
        MigrationOperation::RemoveEntity { .. } => {
            reasons.push("drops a table and its data".to_string());
            RiskClass::Destructive
        }
        MigrationOperation::RemoveEnum { .. } => {
            reasons.push("drops an enumeration".to_string());
            RiskClass::Destructive
        }
    };

    PlannedOperation {
        operation,
        risk,
        reasons,
    }
}

fn field_change(from: &FieldDef, to: &FieldDef, reasons: &mut Vec<String>) -> RiskClass {
    let mut risk = RiskClass::Safe;
    let mut raise = |class: RiskClass, reason: String, reasons: &mut Vec<String>| {
        reasons.push(reason);
        risk = risk.max(class);
    };

    if from.field_type != to.field_type {
        let class = type_change(&from.field_type, &to.field_type);
        raise(
            class,
            format!("type changes from {} to {}", from.field_type, to.field_type),
            reasons,
        );
    }
    if to.required && !from.required {
        raise(RiskClass::Risky, "nullable field becomes required".to_string(), reasons);
    }
    if to.unique && !from.unique {
        raise(RiskClass::Risky, "introduces a uniqueness constraint".to_string(), reasons);
    }
    if tightens_upper(from.max_length.map(f64::from), to.max_length.map(f64::from)) {
        raise(RiskClass::Risky, "max_length is reduced".to_string(), reasons);
    }
    if tightens_upper(from.max, to.max) {
        raise(RiskClass::Risky, "maximum is reduced".to_string(), reasons);
    }
    if tightens_lower(from.min, to.min) {
        raise(RiskClass::Risky, "minimum is raised".to_string(), reasons);
    }
    if from.default != to.default {
        raise(RiskClass::Safe, "default changes".to_string(), reasons);
    }
    risk
}

/// Risk of converting stored values from one type to another.
pub fn type_change(from: &FieldType, to: &FieldType) -> RiskClass {
    use FieldType::*;
    match (from, to) {
        (a, b) if a == b => RiskClass::Safe,
        (Integer, Float) | (String, Text) => RiskClass::Safe,
        (Text, String) | (Float, Integer) => RiskClass::Risky,
        (String | Text, Enum(_)) | (Enum(_), Enum(_)) => RiskClass::Risky,
        (_, String | Text) => RiskClass::Safe,
        _ => RiskClass::Destructive,
    }
}

fn tightens_upper(from: Option<f64>, to: Option<f64>) -> bool {
    match (from, to) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(a), Some(b)) => b < a,
    }
}

fn tightens_lower(from: Option<f64>, to: Option<f64>) -> bool {
    match (from, to) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(a), Some(b)) => b > a,
    }
}
