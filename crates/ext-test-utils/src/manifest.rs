//! [`ManifestBuilder`] for manifest documents.

use std::collections::BTreeMap;

/// Builds a TOML manifest document.
///
/// # Example
///
/// ```rust,no_run
/// use ext_test_utils::ManifestBuilder;
///
/// let toml = ManifestBuilder::new("reporting", "1.0.0")
///     .depends_on("base-metrics", "^1.0")
///     .permission("schema:extend")
///     .to_toml();
/// ```
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    id: String,
    version: String,
    namespace: Option<String>,
    permissions: Vec<String>,
    dependencies: BTreeMap<String, String>,
}

impl ManifestBuilder {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            namespace: None,
            permissions: Vec::new(),
            dependencies: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    pub fn depends_on(mut self, id: &str, range: &str) -> Self {
        self.dependencies.insert(id.to_string(), range.to_string());
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = format!("[extension]\nid = \"{}\"\nversion = \"{}\"\n", self.id, self.version);
        if let Some(ns) = &self.namespace {
            out.push_str(&format!("namespace = \"{ns}\"\n"));
        }
        if !self.permissions.is_empty() {
            let quoted: Vec<String> = self.permissions.iter().map(|p| format!("\"{p}\"")).collect();
            out.push_str(&format!("permissions = [{}]\n", quoted.join(", ")));
        }
        if !self.dependencies.is_empty() {
            out.push_str("\n[dependencies]\n");
            for (id, range) in &self.dependencies {
                out.push_str(&format!("\"{id}\" = \"{range}\"\n"));
            }
        }
        out
    }
}
