//! Migration engine
//!
//! Diffs two fragment versions into risk-classified operations, reports
//! which of them need confirmation, and applies a plan to the store.

mod apply;
mod diff;
pub(crate) mod executor;
mod operation;
mod plan;
mod risk;
mod safety;

pub use apply::apply;
pub use diff::diff;
pub use operation::{MigrationOperation, PlannedOperation, RiskClass};
pub use plan::{MigrationPlan, PlanTarget};
pub use risk::{classify, type_change};
pub use safety::SafetyReport;
