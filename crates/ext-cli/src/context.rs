//! Engine configuration for a CLI invocation
//!
//! The configuration comes from `--config`, else `./extschema.toml` when it
//! exists, else defaults. A CLI run must persist its work, so a store
//! without a path is placed in `./extschema.db`; `--db` overrides both.

use std::path::{Path, PathBuf};

use ext_core::{EngineConfig, SchemaCore};

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "extschema.toml";
pub const DEFAULT_DB_FILE: &str = "extschema.db";

/// Resolve the configuration relative to `cwd`.
pub fn load_config(cwd: &Path, config: Option<&Path>, db: Option<&Path>) -> Result<EngineConfig> {
    let mut engine = match config {
        Some(path) => EngineConfig::from_path(&cwd.join(path))?,
        None => {
            let default = cwd.join(DEFAULT_CONFIG_FILE);
            if default.exists() {
                EngineConfig::from_path(&default)?
            } else {
                EngineConfig::default()
            }
        }
    };

    engine.store.path = Some(match (db, engine.store.path.take()) {
        (Some(db), _) => cwd.join(db),
        (None, Some(path)) => cwd.join(path),
        (None, None) => cwd.join(DEFAULT_DB_FILE),
    });
    tracing::debug!(store = ?engine.store.path, "configuration loaded");
    Ok(engine)
}

/// Open the engine for this invocation.
pub fn open(cwd: &Path, config: Option<&PathBuf>, db: Option<&PathBuf>) -> Result<SchemaCore> {
    let config = load_config(cwd, config.map(PathBuf::as_path), db.map(PathBuf::as_path))?;
    Ok(SchemaCore::open(config)?)
}
