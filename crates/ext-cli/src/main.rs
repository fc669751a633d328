//! Extension schema CLI
//!
//! Thin orchestration over `SchemaCore`: every command opens the engine on
//! the configured store, runs one operation, and prints the result.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use ext_core::SchemaCore;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // A second initialisation only happens in tests; keep the first.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        println!("{} extension schema engine", "extschema".green().bold());
        println!();
        println!("Run {} for available commands.", "extschema --help".cyan());
        return Ok(());
    };

    let cwd = std::env::current_dir()?;
    let core = context::open(&cwd, cli.config.as_ref(), cli.db.as_ref())?;
    execute_command(&core, command, cli.json)
}

fn execute_command(core: &SchemaCore, cmd: Commands, json: bool) -> Result<()> {
    match cmd {
        Commands::Submit { extension, file } => commands::run_submit(core, &extension, &file, json),
        Commands::Register {
            extension,
            version,
            file,
        } => commands::run_register(core, &extension, &version, &file, json),
        Commands::Conflicts {
            extension,
            version,
            file,
        } => commands::run_conflicts(core, &extension, &version, &file, json),
        Commands::Resolve { extension, version } => commands::run_resolve(core, &extension, &version, json),
        Commands::Plan {
            extension,
            version,
            from,
        } => commands::run_plan(core, &extension, &version, from.as_deref(), json),
        Commands::Migrate {
            extension,
            confirm,
            actor,
        } => commands::run_migrate(core, &extension, confirm, actor.as_deref(), json),
        Commands::Status => commands::run_status(core, json),
        Commands::Log { extension } => commands::run_log(core, extension.as_deref(), json),
        Commands::ValidateData {
            namespace,
            entity,
            record,
        } => commands::run_validate_data(core, &namespace, &entity, &record, json),
    }
}
