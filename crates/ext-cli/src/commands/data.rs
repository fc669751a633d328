//! Validate-data command

use colored::Colorize;
use ext_core::SchemaCore;
use ext_schema::Namespace;
use serde_json::Value;

use super::print_json;
use crate::error::{CliError, Result};

/// Read a record argument: inline JSON, or `@path` to a JSON file.
fn read_record(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

/// Run the validate-data command
pub fn run_validate_data(core: &SchemaCore, namespace: &str, entity: &str, record: &str, json: bool) -> Result<()> {
    let namespace = Namespace::new(namespace).map_err(|e| CliError::user(e.to_string()))?;
    let record = read_record(record)?;
    let result = core.validate_entity_data(&namespace, entity, &record)?;

    if json {
        print_json(&result)?;
    } else if result.valid {
        println!("{} record is valid for {}.{}", "OK".green().bold(), namespace, entity);
    } else {
        println!("{} record for {}.{}:", "INVALID".red().bold(), namespace, entity);
        for violation in &result.errors {
            println!("   {} {}", "-".red(), violation);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(CliError::user(format!("record has {} violation(s)", result.errors.len())))
    }
}
