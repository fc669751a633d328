//! The closed set of permissions an extension may request.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A capability requested by an extension manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    DataRead,
    DataWrite,
    DataDelete,
    SchemaExtend,
    SchemaReadonly,
    CoreRead,
    CoreWrite,
    NetworkOutbound,
    Sandboxed,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::DataRead,
        Permission::DataWrite,
        Permission::DataDelete,
        Permission::SchemaExtend,
        Permission::SchemaReadonly,
        Permission::CoreRead,
        Permission::CoreWrite,
        Permission::NetworkOutbound,
        Permission::Sandboxed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::DataRead => "data:read",
            Permission::DataWrite => "data:write",
            Permission::DataDelete => "data:delete",
            Permission::SchemaExtend => "schema:extend",
            Permission::SchemaReadonly => "schema:readonly",
            Permission::CoreRead => "core:read",
            Permission::CoreWrite => "core:write",
            Permission::NetworkOutbound => "network:outbound",
            Permission::Sandboxed => "sandboxed",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

impl TryFrom<String> for Permission {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.as_str().to_string()
    }
}

/// Pairs the platform forbids a single manifest from requesting together.
pub const DEFAULT_EXCLUSIVE_PAIRS: &[(Permission, Permission)] = &[
    (Permission::SchemaExtend, Permission::SchemaReadonly),
    (Permission::Sandboxed, Permission::NetworkOutbound),
    (Permission::Sandboxed, Permission::CoreWrite),
];

/// Return every exclusive pair fully contained in `requested`.
pub fn exclusive_violations(
    requested: &BTreeSet<Permission>,
    pairs: &[(Permission, Permission)],
) -> Vec<(Permission, Permission)> {
    pairs
        .iter()
        .filter(|(a, b)| requested.contains(a) && requested.contains(b))
        .copied()
        .collect()
}
