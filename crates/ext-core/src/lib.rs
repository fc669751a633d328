//! Schema registry and migration engine for platform extensions
//!
//! This crate sits above `ext-schema` and `ext-manifest` and provides:
//!
//! - **Registry**: versioned fragment history per extension with
//!   `pending`/`candidate`/`active`/`superseded` lifecycle
//! - **Conflict detection**: name, permission, and relationship-target checks
//!   against every active fragment
//! - **Migration engine**: diff, risk classification, confirmation gating, and
//!   transactional execution with an append-only audit log
//! - **Data validation**: record checks against the active schema, including
//!   cross-namespace referential integrity
//!
//! # Architecture
//!
//! ```text
//!                   ext-cli
//!                      |
//!                  SchemaCore
//!                      |
//!     +--------+-------+--------+---------+
//!     |        |       |        |         |
//!  registry conflict migration data     store (SQLite)
//!     |
//! ext-manifest / ext-schema
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ext_core::{EngineConfig, SchemaCore};
//! use ext_schema::HostSchema;
//!
//! let core = SchemaCore::open(EngineConfig::in_memory(HostSchema::default()))?;
//! core.submit_manifest("reporting", manifest_toml)?;
//! let registration = core.register_schema("reporting", &"1.0.0".parse()?, fragment_toml)?;
//! let plan = core.generate_migration_plan("reporting", None, &"1.0.0".parse()?)?;
//! core.execute_migration(&plan, false, Some("ops"))?;
//! ```

pub mod audit;
pub mod config;
pub mod conflict;
pub mod core;
pub mod data;
pub mod error;
pub mod migration;
pub mod registry;
pub mod store;
pub mod validation;

pub use audit::{DEFAULT_ACTOR, MigrationOutcome, MigrationRecord};
pub use config::{EngineConfig, PolicyConfig, StoreConfig};
pub use conflict::{ActiveFragment, Conflict, ConflictDetector, ConflictKind, ConflictReport, NameSubtype};
pub use core::{ExtensionStatus, SchemaCore, VersionStatus};
pub use data::{DataValidator, DeleteOutcome};
pub use error::{Error, Result};
pub use migration::{MigrationOperation, MigrationPlan, PlannedOperation, RiskClass, SafetyReport};
pub use registry::{ActivePointer, Registration, RegistryState, SchemaEntry, SchemaRegistry, SchemaStatus};
pub use store::{StoreShape, TableShape};
pub use validation::{DataViolation, ValidationResult, ViolationKind};
