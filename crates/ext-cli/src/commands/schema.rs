//! Register and conflicts commands

use std::path::Path;

use colored::Colorize;
use ext_core::{ConflictReport, SchemaCore, SchemaStatus};
use ext_schema::SchemaFragment;

use super::print_json;
use crate::error::{Result, parse_version};

fn print_conflicts(report: &ConflictReport) {
    for conflict in report.iter() {
        println!("   {} {}", "-".yellow(), conflict);
    }
}

/// Run the register command
pub fn run_register(core: &SchemaCore, extension: &str, version: &str, file: &Path, json: bool) -> Result<()> {
    let version = parse_version(version)?;
    let document = std::fs::read_to_string(file)?;
    let registration = core.register_schema(extension, &version, &document)?;

    if json {
        return print_json(&registration);
    }

    match registration.status {
        SchemaStatus::Pending => {
            println!(
                "{} {} registered as {} with {} conflict(s):",
                "PENDING".yellow().bold(),
                registration.schema_id.cyan(),
                registration.status,
                registration.conflicts.len()
            );
            print_conflicts(&registration.conflicts);
        }
        status => {
            println!(
                "{} {} registered as {}",
                "OK".green().bold(),
                registration.schema_id.cyan(),
                status
            );
        }
    }
    Ok(())
}

/// Run the conflicts command
pub fn run_conflicts(core: &SchemaCore, extension: &str, version: &str, file: &Path, json: bool) -> Result<()> {
    let version = parse_version(version)?;
    let document = std::fs::read_to_string(file)?;
    let fragment = if document.trim_start().starts_with('{') {
        SchemaFragment::from_json(&document)
    } else {
        SchemaFragment::from_toml(&document)
    }
    .map_err(ext_core::Error::from)?;
    let report = core.detect_conflicts(extension, &version, &fragment)?;

    if json {
        return print_json(&report);
    }

    if report.is_empty() {
        println!("{} no conflicts", "OK".green().bold());
    } else {
        println!("{} {} conflict(s):", "CONFLICTS".yellow().bold(), report.len());
        print_conflicts(&report);
    }
    Ok(())
}
