//! Immutable migration plans

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ext_manifest::VersionRange;
use ext_schema::{Namespace, SchemaFragment};
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diff::diff;
use super::operation::{PlannedOperation, RiskClass};
use super::risk::classify;

/// An ordered, risk-classified set of operations taking one fragment
/// version of an extension to another.
///
/// A plan is generated once and executed as-is; execution never re-diffs.
/// Everything the executor revalidates against is recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub id: Uuid,
    pub extension: String,
    pub namespace: Namespace,
    /// `None` for a fresh install
    pub from_version: Option<Version>,
    pub to_version: Version,
    /// Version active in the namespace when the plan was generated
    pub observed_active: Option<Version>,
    pub operations: Vec<PlannedOperation>,
    pub risk_classes: BTreeSet<RiskClass>,
    /// Ranges the target manifest places on its direct dependencies
    pub dependency_ranges: BTreeMap<String, VersionRange>,
    /// Versions selected by dependency resolution, root included
    pub resolution: BTreeMap<String, Version>,
    /// Active version of every dependency in the resolution when the plan
    /// was generated
    #[serde(default)]
    pub dependency_versions: BTreeMap<String, Version>,
    pub created_at: DateTime<Utc>,
}

/// Where a plan starts and ends.
#[derive(Debug, Clone)]
pub struct PlanTarget<'a> {
    pub extension: &'a str,
    pub namespace: &'a Namespace,
    pub from: Option<(&'a Version, &'a SchemaFragment)>,
    pub to: (&'a Version, &'a SchemaFragment),
    pub observed_active: Option<&'a Version>,
}

impl MigrationPlan {
    /// Diff and classify.
    pub fn generate(
        target: PlanTarget<'_>,
        dependency_ranges: BTreeMap<String, VersionRange>,
        resolution: BTreeMap<String, Version>,
    ) -> Self {
        let empty = SchemaFragment::empty();
        let from_fragment = target.from.map_or(&empty, |(_, f)| f);
        let (to_version, to_fragment) = target.to;

        let operations: Vec<PlannedOperation> = diff(from_fragment, to_fragment)
            .into_iter()
            .map(classify)
            .collect();
        let risk_classes = operations.iter().map(|op| op.risk).collect();

        Self {
            id: Uuid::new_v4(),
            extension: target.extension.to_string(),
            namespace: target.namespace.clone(),
            from_version: target.from.map(|(v, _)| v.clone()),
            to_version: to_version.clone(),
            observed_active: target.observed_active.cloned(),
            operations,
            risk_classes,
            dependency_ranges,
            resolution,
            dependency_versions: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_dependency_versions(mut self, versions: BTreeMap<String, Version>) -> Self {
        self.dependency_versions = versions;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Highest risk class in the plan; `Safe` for an empty plan.
    pub fn max_risk(&self) -> RiskClass {
        self.risk_classes.last().copied().unwrap_or(RiskClass::Safe)
    }

    pub fn operations_of(&self, risk: RiskClass) -> impl Iterator<Item = &PlannedOperation> {
        self.operations.iter().filter(move |op| op.risk == risk)
    }

    /// `extension from -> to`, for logs and confirmation prompts.
    pub fn summary(&self) -> String {
        match &self.from_version {
            Some(from) => format!("{} {} -> {}", self.extension, from, self.to_version),
            None => format!("{} (new) -> {}", self.extension, self.to_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ext_schema::{EntityDef, FieldDef, FieldType};

    #[test]
    fn test_generate_records_risk_classes() {
        let ns = Namespace::new("analytics").unwrap();
        let v1 = Version::new(1, 0, 0);
        let v2 = Version::new(2, 0, 0);
        let from = SchemaFragment::empty().with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("title", FieldType::String))
                .with_field(FieldDef::new("legacy", FieldType::String)),
        );
        let to = SchemaFragment::empty().with_entity(
            EntityDef::new("reports")
                .with_field(FieldDef::new("title", FieldType::String).required())
                .with_field(FieldDef::new("score", FieldType::Float)),
        );
        let plan = MigrationPlan::generate(
            PlanTarget {
                extension: "analytics",
                namespace: &ns,
                from: Some((&v1, &from)),
                to: (&v2, &to),
                observed_active: Some(&v1),
            },
            BTreeMap::new(),
            BTreeMap::new(),
        );

        assert_eq!(plan.operations.len(), 3);
        assert_eq!(
            plan.risk_classes,
            [RiskClass::Safe, RiskClass::Risky, RiskClass::Destructive].into_iter().collect()
        );
        assert_eq!(plan.max_risk(), RiskClass::Destructive);
        assert_eq!(plan.operations_of(RiskClass::Destructive).count(), 1);
        assert_eq!(plan.summary(), "analytics 1.0.0 -> 2.0.0");
    }

    #[test]
    fn test_fresh_install_diffs_against_empty() {
        let ns = Namespace::new("analytics").unwrap();
        let v1 = Version::new(1, 0, 0);
        let to = SchemaFragment::empty().with_entity(EntityDef::new("reports"));
        let plan = MigrationPlan::generate(
            PlanTarget {
                extension: "analytics",
                namespace: &ns,
                from: None,
                to: (&v1, &to),
                observed_active: None,
            },
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(plan.max_risk(), RiskClass::Safe);
        assert_eq!(plan.from_version, None);
        assert_eq!(plan.summary(), "analytics (new) -> 1.0.0");
    }
}
