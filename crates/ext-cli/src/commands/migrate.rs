//! Plan and migrate commands

use colored::Colorize;
use ext_core::{MigrationPlan, RiskClass, SafetyReport, SchemaCore};
use serde::Serialize;

use super::print_json;
use crate::error::{CliError, Result, parse_version};

#[derive(Serialize)]
struct PlanOutput<'a> {
    plan: &'a MigrationPlan,
    safety: &'a SafetyReport,
}

fn print_plan(plan: &MigrationPlan, safety: &SafetyReport) {
    println!("{} {}", "Migration plan".bold(), plan.summary().cyan());
    println!("{}:   {}", "Plan".dimmed(), plan.id);
    println!("{}:   {}", "Namespace".dimmed(), plan.namespace);
    println!();

    if plan.is_empty() {
        println!("  {}", "No changes".dimmed());
    }
    for planned in &plan.operations {
        let marker = match planned.risk {
            RiskClass::Safe => "+".green(),
            RiskClass::Risky => "~".yellow(),
            RiskClass::Destructive => "!".red(),
        };
        println!("  {marker} {planned}");
    }

    if safety.requires_confirmation {
        println!();
        println!(
            "{} {} destructive operation(s); run migrate with {}",
            "CONFIRM".red().bold(),
            safety.destructive.len(),
            "--confirm".cyan()
        );
    }
}

/// Run the plan command
pub fn run_plan(core: &SchemaCore, extension: &str, version: &str, from: Option<&str>, json: bool) -> Result<()> {
    let to = parse_version(version)?;
    let from = from.map(parse_version).transpose()?;
    let plan = core.generate_migration_plan(extension, from.as_ref(), &to)?;
    let safety = core.validate_migration_safety(&plan);

    if json {
        return print_json(&PlanOutput {
            plan: &plan,
            safety: &safety,
        });
    }
    print_plan(&plan, &safety);
    Ok(())
}

/// Run the migrate command
///
/// Executes the latest plan generated for the extension.
pub fn run_migrate(
    core: &SchemaCore,
    extension: &str,
    confirm: bool,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let plan = core.latest_plan(extension)?.ok_or_else(|| {
        CliError::user(format!(
            "no plan for '{extension}'; run 'extschema plan {extension} <version>' first"
        ))
    })?;
    let record = core.execute_migration(&plan, confirm, actor)?;

    if json {
        return print_json(&record);
    }

    println!(
        "{} {} ({} operation(s), actor {})",
        "MIGRATED".green().bold(),
        plan.summary().cyan(),
        record.executed_operations.len(),
        record.actor
    );
    for operation in &record.executed_operations {
        println!("   {} {}", "+".green(), operation);
    }
    Ok(())
}
