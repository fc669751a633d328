//! Engine configuration
//!
//! Loaded from a TOML file with three sections:
//!
//! ```toml
//! [store]
//! path = "extensions.db"        # omit for an in-memory store
//! busy_timeout_ms = 5000
//!
//! [policy]
//! reserved_namespaces = ["billing"]
//! exclusive_permissions = [["schema:extend", "schema:readonly"]]
//! block_risky = false
//!
//! [[host.entities]]
//! name = "users"
//! fields = ["email", "name"]
//! ```

use std::path::{Path, PathBuf};

use ext_manifest::{DEFAULT_EXCLUSIVE_PAIRS, ManifestPolicy, Permission};
use ext_schema::HostSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_exclusive_permissions() -> Vec<[Permission; 2]> {
    DEFAULT_EXCLUSIVE_PAIRS.iter().map(|(a, b)| [*a, *b]).collect()
}

/// Relational store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; `None` keeps everything in memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// How long a transaction waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Platform policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Namespaces reserved in addition to the built-in ones
    #[serde(default)]
    pub reserved_namespaces: Vec<String>,

    /// Permission pairs a single manifest may not request together
    #[serde(default = "default_exclusive_permissions")]
    pub exclusive_permissions: Vec<[Permission; 2]>,

    /// Require confirmation for risky operations as well as destructive ones
    #[serde(default)]
    pub block_risky: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reserved_namespaces: Vec::new(),
            exclusive_permissions: default_exclusive_permissions(),
            block_risky: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// Core platform entities extensions may reference
    #[serde(default)]
    pub host: HostSchema,
}

impl EngineConfig {
    /// Parse a configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if the file does not exist.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// In-memory store with the given host schema; used by tests and tools
    pub fn in_memory(host: HostSchema) -> Self {
        Self {
            host,
            ..Self::default()
        }
    }

    pub fn manifest_policy(&self) -> ManifestPolicy {
        ManifestPolicy {
            reserved_namespaces: self.policy.reserved_namespaces.clone(),
        }
    }

    pub fn exclusive_pairs(&self) -> Vec<(Permission, Permission)> {
        self.policy
            .exclusive_permissions
            .iter()
            .map(|[a, b]| (*a, *b))
            .collect()
    }
}
