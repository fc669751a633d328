//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Extension schema engine - register, check, and migrate extension schemas
#[derive(Parser, Debug)]
#[command(name = "extschema")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (defaults to ./extschema.toml when present)
    #[arg(short, long, global = true, env = "EXTSCHEMA_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database, overriding the configured store path
    #[arg(long, global = true, env = "EXTSCHEMA_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Validate a manifest and add it to the catalog
    ///
    /// Examples:
    ///   extschema submit reporting reporting.toml
    ///   extschema submit reporting manifest.json --json
    Submit {
        /// Extension id the manifest is submitted for
        extension: String,

        /// Manifest document (TOML or JSON)
        file: PathBuf,
    },

    /// Register a schema fragment for a submitted manifest
    ///
    /// A fragment that conflicts with the active schema is stored as pending.
    Register {
        extension: String,

        version: String,

        /// Fragment document (TOML or JSON)
        file: PathBuf,
    },

    /// Report the conflicts a fragment would have, without registering it
    Conflicts {
        extension: String,

        version: String,

        /// Fragment document (TOML or JSON)
        file: PathBuf,
    },

    /// Resolve the dependency closure of an extension version
    Resolve { extension: String, version: String },

    /// Generate a migration plan; it becomes the namespace's latest plan
    ///
    /// Examples:
    ///   extschema plan reporting 1.0.0
    ///   extschema plan reporting 2.0.0 --from 1.0.0
    Plan {
        extension: String,

        /// Target version
        version: String,

        /// Version migrated from; omit for a fresh install
        #[arg(long)]
        from: Option<String>,
    },

    /// Execute the latest plan generated for an extension
    Migrate {
        extension: String,

        /// Confirm destructive operations
        #[arg(long)]
        confirm: bool,

        /// Recorded as the migration's actor
        #[arg(long)]
        actor: Option<String>,
    },

    /// Show every extension with its versions and active schema
    Status,

    /// Show the migration audit log
    Log {
        /// Only records for this extension
        extension: Option<String>,
    },

    /// Validate a record against a namespace's active schema
    ///
    /// Examples:
    ///   extschema validate-data reporting reports '{"title": "Q1"}'
    ///   extschema validate-data reporting reports @record.json
    ValidateData {
        namespace: String,

        entity: String,

        /// JSON record, or @path to read it from a file
        record: String,
    },
}
