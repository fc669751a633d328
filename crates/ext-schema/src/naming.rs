//! Namespace and identifier grammar, and storage-name derivation.
//!
//! Every entity an extension declares lands in the shared relational store
//! under a storage name. Unless a fragment overrides it, the storage name is
//! `<namespace>__<name>`. Namespaces may not contain `__`, so the split back
//! into namespace and local name is unambiguous.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace of the host (core) platform schema.
pub const HOST_NAMESPACE: &str = "core";

/// Separator between namespace and local name in derived storage names.
pub const STORAGE_SEPARATOR: &str = "__";

/// Namespaces no extension may claim.
pub const RESERVED_NAMESPACES: &[&str] = &[HOST_NAMESPACE, "system", "public", "sqlite", "ext"];

const MAX_NAMESPACE_LEN: usize = 48;
const MAX_IDENTIFIER_LEN: usize = 63;

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"));

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"));

/// Check a namespace token against the grammar, ignoring reservation.
///
/// Returns the reason the token is illegal, if any.
pub fn namespace_syntax_error(token: &str) -> Option<String> {
    if token.is_empty() {
        return Some("namespace must not be empty".to_string());
    }
    if token.len() > MAX_NAMESPACE_LEN {
        return Some(format!("namespace must be at most {MAX_NAMESPACE_LEN} characters"));
    }
    if !NAMESPACE_RE.is_match(token) {
        return Some(
            "namespace must start with a lowercase letter and contain only lowercase letters, digits, or underscores"
                .to_string(),
        );
    }
    if token.contains(STORAGE_SEPARATOR) {
        return Some(format!("namespace must not contain '{STORAGE_SEPARATOR}'"));
    }
    if token.ends_with('_') {
        return Some("namespace must not end with an underscore".to_string());
    }
    None
}

/// Whether `token` is reserved for the platform itself.
pub fn is_reserved_namespace(token: &str, extra: &[String]) -> bool {
    RESERVED_NAMESPACES.contains(&token) || extra.iter().any(|r| r == token)
}

/// Check an entity, field, enum, relationship, or index name.
pub fn identifier_error(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("name must not be empty".to_string());
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Some(format!("name must be at most {MAX_IDENTIFIER_LEN} characters"));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Some(
            "name must start with a lowercase letter and contain only lowercase letters, digits, or underscores"
                .to_string(),
        );
    }
    None
}

/// A syntactically valid extension namespace.
///
/// Reservation is a policy question and is checked by the manifest
/// validator, not here: the host namespace itself is a valid `Namespace`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Parse and validate a namespace token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if let Some(reason) = namespace_syntax_error(&token) {
            return Err(Error::InvalidNamespace {
                name: token,
                reason,
            });
        }
        Ok(Self(token))
    }

    /// The host platform namespace.
    pub fn host() -> Self {
        Self(HOST_NAMESPACE.to_string())
    }

    /// Derive the default namespace for an extension id (`my-ext` -> `my_ext`).
    pub fn from_extension_id(id: &str) -> Result<Self> {
        Self::new(id.replace('-', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_host(&self) -> bool {
        self.0 == HOST_NAMESPACE
    }

    /// Storage name for a local name declared in this namespace.
    pub fn storage_name(&self, local: &str) -> String {
        if self.is_host() {
            local.to_string()
        } else {
            format!("{}{}{}", self.0, STORAGE_SEPARATOR, local)
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_namespaces() {
        for ns in ["analytics", "plugin_a", "qa2", "x"] {
            assert!(Namespace::new(ns).is_ok(), "{ns} should be valid");
        }
    }

    #[test]
    fn test_invalid_namespaces() {
        for ns in ["", "Analytics", "2fast", "has-dash", "double__under", "trailing_", "sp ace"] {
            assert!(Namespace::new(ns).is_err(), "{ns:?} should be invalid");
        }
    }

    #[test]
    fn test_namespace_too_long() {
        let long = "a".repeat(49);
        assert!(Namespace::new(long).is_err());
        assert!(Namespace::new("a".repeat(48)).is_ok());
    }

    #[test]
    fn test_reserved() {
        assert!(is_reserved_namespace("core", &[]));
        assert!(is_reserved_namespace("system", &[]));
        assert!(!is_reserved_namespace("analytics", &[]));
        assert!(is_reserved_namespace("billing", &["billing".to_string()]));
    }

    #[test]
    fn test_storage_name() {
        let ns = Namespace::new("plugin_a").unwrap();
        assert_eq!(ns.storage_name("reports"), "plugin_a__reports");
        assert_eq!(Namespace::host().storage_name("users"), "users");
    }

    #[test]
    fn test_from_extension_id() {
        let ns = Namespace::from_extension_id("base-metrics").unwrap();
        assert_eq!(ns.as_str(), "base_metrics");
    }

    #[test]
    fn test_identifier_rules() {
        assert!(identifier_error("reports").is_none());
        assert!(identifier_error("work_order_2").is_none());
        assert!(identifier_error("Reports").is_some());
        assert!(identifier_error("").is_some());
        assert!(identifier_error("a-b").is_some());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: std::result::Result<Namespace, _> = serde_json::from_str("\"plugin_b\"");
        assert!(ok.is_ok());
        let bad: std::result::Result<Namespace, _> = serde_json::from_str("\"Bad-Name\"");
        assert!(bad.is_err());
    }
}
