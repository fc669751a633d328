//! Append-only migration audit records

use std::fmt;

use chrono::{DateTime, Utc};
use ext_schema::Namespace;
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::migration::MigrationPlan;

/// Actor recorded when the caller does not name one.
pub const DEFAULT_ACTOR: &str = "system";

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Applied,
    RolledBack,
}

impl MigrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed (or rolled back) migration. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub extension: String,
    pub namespace: Namespace,
    pub from_version: Option<Version>,
    pub to_version: Version,
    /// Operation labels in execution order; empty when rolled back
    pub executed_operations: Vec<String>,
    pub outcome: MigrationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actor: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn applied(plan: &MigrationPlan, actor: &str, started_at: DateTime<Utc>, executed: Vec<String>) -> Self {
        Self::new(plan, actor, started_at, executed, MigrationOutcome::Applied, None, None)
    }

    pub fn rolled_back(
        plan: &MigrationPlan,
        actor: &str,
        started_at: DateTime<Utc>,
        failed_operation: Option<String>,
        error: String,
    ) -> Self {
        Self::new(
            plan,
            actor,
            started_at,
            Vec::new(),
            MigrationOutcome::RolledBack,
            failed_operation,
            Some(error),
        )
    }

    fn new(
        plan: &MigrationPlan,
        actor: &str,
        started_at: DateTime<Utc>,
        executed_operations: Vec<String>,
        outcome: MigrationOutcome,
        failed_operation: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id: plan.id,
            extension: plan.extension.clone(),
            namespace: plan.namespace.clone(),
            from_version: plan.from_version.clone(),
            to_version: plan.to_version.clone(),
            executed_operations,
            outcome,
            failed_operation,
            error,
            actor: actor.to_string(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
