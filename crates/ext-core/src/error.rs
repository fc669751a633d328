//! Error types for ext-core

use std::path::PathBuf;

use ext_manifest::Constraint;

use crate::conflict::ConflictReport;
use crate::validation::DataViolation;

/// Result type for ext-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ext-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manifest parsing, validation, or catalog error
    #[error(transparent)]
    Manifest(ext_manifest::Error),

    /// Fragment parsing or validation error
    #[error(transparent)]
    Schema(#[from] ext_schema::Error),

    /// The fragment is pending because it conflicts with the active schema
    #[error("{extension}@{version} has {} unresolved conflict(s)", .report.len())]
    Conflicts {
        extension: String,
        version: String,
        report: ConflictReport,
    },

    /// The dependency graph contains a cycle
    #[error("circular dependency: {}", .path.join(" → "))]
    CircularDependency { path: Vec<String> },

    /// No version satisfies the constraints placed on an extension
    #[error(
        "cannot resolve '{extension}': {reason} [{}]",
        .constraints.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    UnresolvableDependency {
        extension: String,
        reason: String,
        constraints: Vec<Constraint>,
    },

    /// Destructive (or policy-blocked) operations without confirmation
    #[error("migration requires confirmation for: {}", .operations.join("; "))]
    UnsafeMigration { operations: Vec<String> },

    /// Registry changed between planning and execution
    #[error("stale migration plan for namespace '{namespace}': {reason}")]
    StaleResolution { namespace: String, reason: String },

    /// The store rejected an operation; the transaction was rolled back
    #[error("migration of '{extension}' failed{}: {reason}", .operation.as_ref().map(|o| format!(" at '{o}'")).unwrap_or_default())]
    MigrationExecution {
        extension: String,
        operation: Option<String>,
        reason: String,
    },

    /// Extension has no manifest or no registered schema
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// No schema registered for the requested version
    #[error("no schema registered for {extension}@{version}")]
    SchemaNotFound { extension: String, version: String },

    /// A different fragment was submitted for a registered (id, version)
    #[error("schema for {extension}@{version} is already registered and cannot change")]
    SchemaImmutable { extension: String, version: String },

    /// Only candidate or active fragments can be migrated into
    #[error("{extension}@{version} is {status} and cannot be migrated into")]
    SchemaNotPlannable {
        extension: String,
        version: String,
        status: String,
    },

    /// Both versions of a migration must live in the same namespace
    #[error("{extension} moves from namespace '{from}' to '{to}'; namespaces cannot change")]
    NamespaceMismatch {
        extension: String,
        from: String,
        to: String,
    },

    /// A dependency the plan needs is not installed in a usable version
    #[error("{extension} cannot be planned: dependency '{dependency}' {reason}")]
    DependencyNotInstalled {
        extension: String,
        dependency: String,
        reason: String,
    },

    /// No active schema owns the namespace
    #[error("namespace '{0}' has no active schema")]
    NamespaceNotActive(String),

    /// Entity not declared by the namespace's active schema
    #[error("entity '{entity}' is not declared in namespace '{namespace}'")]
    UnknownEntity { namespace: String, entity: String },

    /// A record failed data validation and was not written
    #[error(
        "invalid {namespace}.{entity} record: {}",
        .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    InvalidRecord {
        namespace: String,
        entity: String,
        violations: Vec<DataViolation>,
    },

    /// No row with the given id
    #[error("no {namespace}.{entity} record with id '{id}'")]
    RecordNotFound {
        namespace: String,
        entity: String,
        id: String,
    },

    /// A restrict relationship still references the row being deleted
    #[error("delete restricted by '{relationship}': {referencing} referencing row(s)")]
    DeleteRestricted { relationship: String, referencing: usize },

    /// Configuration file not found at expected path
    #[error("configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// A lock was poisoned by a panicking thread
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// Persisted catalog row could not be decoded
    #[error("corrupt catalog row in {table}: {reason}")]
    CorruptCatalog { table: &'static str, reason: String },

    // Transparent wrappers for underlying crate errors
    /// SQLite error
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl From<ext_manifest::Error> for Error {
    fn from(err: ext_manifest::Error) -> Self {
        match err {
            ext_manifest::Error::CircularDependency { path } => Error::CircularDependency { path },
            ext_manifest::Error::UnresolvableDependency {
                extension,
                reason,
                constraints,
            } => Error::UnresolvableDependency {
                extension,
                reason,
                constraints,
            },
            other => Error::Manifest(other),
        }
    }
}
