//! Status and log commands

use colored::Colorize;
use ext_core::{MigrationOutcome, SchemaCore, SchemaStatus};

use super::print_json;
use crate::error::Result;

/// Run the status command
pub fn run_status(core: &SchemaCore, json: bool) -> Result<()> {
    let statuses = core.status()?;
    if json {
        return print_json(&statuses);
    }

    println!("{}", "Extensions".bold());
    println!();
    if statuses.is_empty() {
        println!("  {} (use {} to add one)", "None".dimmed(), "extschema submit".cyan());
        return Ok(());
    }

    for ext in &statuses {
        let active = ext
            .active
            .as_ref()
            .map_or_else(|| "not installed".dimmed(), |v| v.to_string().green());
        println!("  {} [{}] {}", ext.extension.cyan().bold(), ext.namespace, active);
        for version in &ext.versions {
            let status = match version.status {
                Some(SchemaStatus::Active) => "active".green(),
                Some(SchemaStatus::Candidate) => "candidate".cyan(),
                Some(SchemaStatus::Pending) => "pending".yellow(),
                Some(SchemaStatus::Superseded) => "superseded".dimmed(),
                None => "manifest only".dimmed(),
            };
            println!("      {} {}", version.version, status);
        }
    }
    Ok(())
}

/// Run the log command
pub fn run_log(core: &SchemaCore, extension: Option<&str>, json: bool) -> Result<()> {
    let records = core.migration_log(extension)?;
    if json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("{}", "No migrations recorded".dimmed());
        return Ok(());
    }
    for record in &records {
        let outcome = match record.outcome {
            MigrationOutcome::Applied => "applied".green(),
            MigrationOutcome::RolledBack => "rolled_back".red(),
        };
        let from = record
            .from_version
            .as_ref()
            .map_or_else(|| "(new)".to_string(), ToString::to_string);
        println!(
            "{} {} {} -> {} {} by {}",
            record.finished_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.extension.cyan(),
            from,
            record.to_version,
            outcome,
            record.actor
        );
        if let Some(error) = &record.error {
            let at = record.failed_operation.as_deref().unwrap_or("-");
            println!("      {} at {}: {}", "error".red(), at, error);
        }
    }
    Ok(())
}
