//! Submit and resolve commands

use std::path::Path;

use colored::Colorize;
use ext_core::SchemaCore;

use super::print_json;
use crate::error::{CliError, Result, parse_version};

/// Run the submit command
///
/// Prints every violation; fails if the manifest was not accepted.
pub fn run_submit(core: &SchemaCore, extension: &str, file: &Path, json: bool) -> Result<()> {
    let document = std::fs::read_to_string(file)?;
    let result = core.submit_manifest(extension, &document)?;

    if json {
        print_json(&result)?;
    } else if result.valid {
        println!("{} manifest for {} accepted", "OK".green().bold(), extension.cyan());
    } else {
        println!("{} manifest for {} rejected:", "INVALID".red().bold(), extension.cyan());
        for violation in &result.errors {
            println!("   {} {}", "-".red(), violation);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(CliError::user(format!(
            "manifest has {} violation(s)",
            result.errors.len()
        )))
    }
}

/// Run the resolve command
pub fn run_resolve(core: &SchemaCore, extension: &str, version: &str, json: bool) -> Result<()> {
    let version = parse_version(version)?;
    let resolution = core.resolve_dependencies(extension, &version)?;

    if json {
        return print_json(&resolution);
    }

    println!("{} {}@{}", "Resolution for".bold(), extension.cyan(), version);
    println!();
    println!("{}:", "Install order".bold());
    for (i, node) in resolution.install_order.iter().enumerate() {
        println!("  {}. {}@{}", i + 1, node.id.cyan(), node.version);
        if let Some(constraints) = resolution.constraints.get(&node.id) {
            for constraint in constraints {
                println!("       {} {}", "<-".dimmed(), constraint);
            }
        }
    }
    Ok(())
}
