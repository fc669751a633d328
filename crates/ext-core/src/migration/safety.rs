//! Pre-execution safety report

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::RiskClass;
use super::plan::MigrationPlan;

/// Which operations of a plan need attention before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub plan_id: Uuid,
    pub destructive: Vec<String>,
    pub risky: Vec<String>,
    /// The plan contains destructive operations
    pub requires_confirmation: bool,
    /// Execution is refused unless confirmed; also set by risky
    /// operations when policy blocks them
    pub blocked_without_confirmation: bool,
}

impl SafetyReport {
    /// Build the report for `plan`. With `block_risky`, risky operations
    /// gate execution the same way destructive ones do.
    pub fn for_plan(plan: &MigrationPlan, block_risky: bool) -> Self {
        let describe = |risk| {
            plan.operations_of(risk)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        };
        let destructive = describe(RiskClass::Destructive);
        let risky = describe(RiskClass::Risky);
        let requires_confirmation = !destructive.is_empty();
        let blocked_without_confirmation = requires_confirmation || (block_risky && !risky.is_empty());
        Self {
            plan_id: plan.id,
            destructive,
            risky,
            requires_confirmation,
            blocked_without_confirmation,
        }
    }

    /// Operations that must be confirmed, in plan order.
    pub fn gated_operations(&self, block_risky: bool) -> Vec<String> {
        let mut gated = self.destructive.clone();
        if block_risky {
            gated.extend(self.risky.iter().cloned());
        }
        gated
    }
}
