//! Command implementations for ext-cli

pub mod data;
pub mod manifest;
pub mod migrate;
pub mod schema;
pub mod status;

pub use data::run_validate_data;
pub use manifest::{run_resolve, run_submit};
pub use migrate::{run_migrate, run_plan};
pub use schema::{run_conflicts, run_register};
pub use status::{run_log, run_status};

use serde::Serialize;

use crate::error::Result;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
