//! Dependency resolution over a manifest catalog.
//!
//! Resolution runs in four steps:
//!
//! 1. Explore every catalog version that could be pulled in transitively from
//!    the root, following each dependency range to all versions it matches.
//! 2. Detect cycles on the id-level graph of that exploration. Any cycle
//!    fails the whole resolution before a version is chosen.
//! 3. Visit ids dependents-first. For each id, the ranges placed on it by
//!    the already-selected dependents are sorted by [`VersionRange`]'s total
//!    order and intersected; the highest catalog version inside the
//!    intersection is selected.
//! 4. Order the selected set dependencies-first.
//!
//! The resolver only reads the catalog it is given, so resolving twice
//! against the same catalog yields the same result.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ManifestCatalog;
use crate::dependency::{DependencyGraph, DependencyNode};
use crate::error::{Constraint, Error, Result};
use crate::manifest::ExtensionManifest;
use crate::version::VersionRange;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub root: DependencyNode,
    /// Selected version for every extension in the closure, root included.
    pub selected: BTreeMap<String, Version>,
    /// Dependencies strictly before dependents; the root is last.
    pub install_order: Vec<DependencyNode>,
    /// The ranges each selected dependency had to satisfy.
    pub constraints: BTreeMap<String, Vec<Constraint>>,
}

impl ResolutionResult {
    pub fn version_of(&self, id: &str) -> Option<&Version> {
        self.selected.get(id)
    }
}

/// Resolve the dependency closure of `root_id@root_version`.
///
/// # Errors
///
/// - `UnknownExtension` / `UnknownVersion` if the root is not catalogued.
/// - `CircularDependency` if any explored version participates in a cycle.
/// - `UnresolvableDependency` if a dependency is not catalogued, its
///   constraints are disjoint, or no catalogued version satisfies them.
pub fn resolve(catalog: &ManifestCatalog, root_id: &str, root_version: &Version) -> Result<ResolutionResult> {
    let root = catalog.require(root_id, root_version)?;
    debug!(extension = %root_id, version = %root_version, "resolving dependencies");

    let explored = explore(catalog, root);
    if let Some(path) = explored.graph.find_cycle() {
        return Err(Error::CircularDependency { path });
    }

    let selected = select(catalog, root, &explored)?;

    let graph = DependencyGraph::from_manifests(selected.manifests.values().copied());
    let install_order = graph
        .topological_sort()?
        .into_iter()
        .filter_map(|id| {
            selected
                .manifests
                .get(id.as_str())
                .map(|m| DependencyNode::new(id.clone(), m.version.clone()))
        })
        .collect();

    Ok(ResolutionResult {
        root: DependencyNode::new(root_id, root_version.clone()),
        selected: selected
            .manifests
            .iter()
            .map(|(id, m)| (id.to_string(), m.version.clone()))
            .collect(),
        install_order,
        constraints: selected.constraints,
    })
}

struct Exploration {
    /// Id-level graph over every version reachable from the root.
    graph: DependencyGraph,
    /// Ids named by some dependency range but absent from the catalog.
    missing: BTreeSet<String>,
}

fn explore(catalog: &ManifestCatalog, root: &ExtensionManifest) -> Exploration {
    let mut graph = DependencyGraph::new();
    let mut missing = BTreeSet::new();
    let mut seen: BTreeSet<(String, Version)> = BTreeSet::new();
    let mut queue: VecDeque<&ExtensionManifest> = VecDeque::new();

    seen.insert((root.id.clone(), root.version.clone()));
    queue.push_back(root);
    graph.add_node(&root.id);

    while let Some(manifest) = queue.pop_front() {
        for (dep_id, range) in &manifest.dependencies {
            graph.add_edge(&manifest.id, dep_id);
            if !catalog.contains(dep_id) {
                missing.insert(dep_id.clone());
                continue;
            }
            for candidate in catalog.versions(dep_id).filter(|m| range.matches(&m.version)) {
                if seen.insert((candidate.id.clone(), candidate.version.clone())) {
                    queue.push_back(candidate);
                }
            }
        }
    }

    debug!(nodes = graph.node_count(), edges = graph.edge_count(), "explored candidate graph");
    Exploration { graph, missing }
}

struct Selection<'a> {
    manifests: BTreeMap<&'a str, &'a ExtensionManifest>,
    constraints: BTreeMap<String, Vec<Constraint>>,
}

fn select<'a>(
    catalog: &'a ManifestCatalog,
    root: &'a ExtensionManifest,
    explored: &Exploration,
) -> Result<Selection<'a>> {
    // The exploration graph is acyclic here, so this cannot fail; reversing
    // the dependency-first order visits every dependent before its
    // dependencies.
    let order = explored.graph.topological_sort()?;

    let mut manifests: BTreeMap<&'a str, &'a ExtensionManifest> = BTreeMap::new();
    let mut constraints: BTreeMap<String, Vec<Constraint>> = BTreeMap::new();
    manifests.insert(root.id.as_str(), root);
    record_constraints(root, &mut constraints);

    for id in order.iter().rev() {
        if id == &root.id {
            continue;
        }
        // Only reachable through versions that were not selected.
        let Some(placed) = constraints.get_mut(id) else {
            continue;
        };
        placed.sort();
        let placed = placed.clone();

        if explored.missing.contains(id) {
            return Err(Error::UnresolvableDependency {
                extension: id.clone(),
                reason: "extension is not in the catalog".to_string(),
                constraints: placed,
            });
        }

        let combined = intersect_all(&placed).ok_or_else(|| Error::UnresolvableDependency {
            extension: id.clone(),
            reason: "version constraints are disjoint".to_string(),
            constraints: placed.clone(),
        })?;

        let chosen = catalog
            .versions(id)
            .rev()
            .find(|m| combined.matches(&m.version))
            .ok_or_else(|| Error::UnresolvableDependency {
                extension: id.clone(),
                reason: format!("no available version satisfies {combined}"),
                constraints: placed.clone(),
            })?;

        debug!(extension = %id, version = %chosen.version, "selected version");
        manifests.insert(chosen.id.as_str(), chosen);
        record_constraints(chosen, &mut constraints);
    }

    constraints.retain(|id, _| manifests.contains_key(id.as_str()));
    constraints.remove(&root.id);
    Ok(Selection {
        manifests,
        constraints,
    })
}

fn record_constraints(manifest: &ExtensionManifest, constraints: &mut BTreeMap<String, Vec<Constraint>>) {
    for (dep_id, range) in &manifest.dependencies {
        constraints.entry(dep_id.clone()).or_default().push(Constraint {
            range: range.clone(),
            required_by: manifest.key(),
        });
    }
}

/// Fold the intersection of sorted constraints, highest precedence first.
fn intersect_all(constraints: &[Constraint]) -> Option<VersionRange> {
    let (first, rest) = constraints.split_first()?;
    rest.iter()
        .try_fold(first.range.clone(), |acc, c| acc.intersect(&c.range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestPolicy;
    use pretty_assertions::assert_eq;

    fn manifest(id: &str, version: &str, deps: &[(&str, &str)]) -> ExtensionManifest {
        let mut toml = format!("[extension]\nid = \"{id}\"\nversion = \"{version}\"\n\n[dependencies]\n");
        for (dep, range) in deps {
            toml.push_str(&format!("{dep} = \"{range}\"\n"));
        }
        ExtensionManifest::from_toml(&toml, &ManifestPolicy::default()).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_selects_highest_compatible() {
        let catalog = ManifestCatalog::new()
            .with(manifest("analytics", "1.0.0", &[("base-metrics", "^1.0.0")]))
            .with(manifest("base-metrics", "1.2.0", &[]))
            .with(manifest("base-metrics", "2.0.0", &[]));

        let result = resolve(&catalog, "analytics", &v("1.0.0")).unwrap();
        assert_eq!(result.version_of("base-metrics"), Some(&v("1.2.0")));
        assert_eq!(
            result.install_order,
            vec![
                DependencyNode::new("base-metrics", v("1.2.0")),
                DependencyNode::new("analytics", v("1.0.0")),
            ]
        );
        assert_eq!(result.constraints["base-metrics"][0].required_by, "analytics@1.0.0");
    }

    #[test]
    fn test_no_dependencies() {
        let catalog = ManifestCatalog::new().with(manifest("solo", "0.1.0", &[]));
        let result = resolve(&catalog, "solo", &v("0.1.0")).unwrap();
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.install_order, vec![DependencyNode::new("solo", v("0.1.0"))]);
    }

    #[test]
    fn test_intersects_shared_constraints() {
        let catalog = ManifestCatalog::new()
            .with(manifest("app", "1.0.0", &[("left", "^1"), ("right", "^1"), ("base", "^1.2.0")]))
            .with(manifest("left", "1.0.0", &[("base", "~1.3.0")]))
            .with(manifest("right", "1.0.0", &[("base", ">=1.0.0, <1.3.5")]))
            .with(manifest("base", "1.2.9", &[]))
            .with(manifest("base", "1.3.4", &[]))
            .with(manifest("base", "1.3.8", &[]))
            .with(manifest("base", "1.5.0", &[]));

        let result = resolve(&catalog, "app", &v("1.0.0")).unwrap();
        assert_eq!(result.version_of("base"), Some(&v("1.3.4")));
        let order: Vec<&str> = result.install_order.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["base", "left", "right", "app"]);
        // Constraints are listed in precedence order.
        let ranges: Vec<&str> = result.constraints["base"].iter().map(|c| c.range.as_str()).collect();
        assert_eq!(ranges, vec!["^1.2.0", "~1.3.0", ">=1.0.0, <1.3.5"]);
    }

    #[test]
    fn test_disjoint_constraints() {
        let catalog = ManifestCatalog::new()
            .with(manifest("app", "1.0.0", &[("left", "^1"), ("base", "^1.0.0")]))
            .with(manifest("left", "1.0.0", &[("base", "^2.0.0")]))
            .with(manifest("base", "1.0.0", &[]))
            .with(manifest("base", "2.0.0", &[]));

        match resolve(&catalog, "app", &v("1.0.0")).unwrap_err() {
            Error::UnresolvableDependency {
                extension,
                reason,
                constraints,
            } => {
                assert_eq!(extension, "base");
                assert!(reason.contains("disjoint"));
                assert_eq!(constraints.len(), 2);
            }
            other => panic!("expected UnresolvableDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_no_matching_version() {
        let catalog = ManifestCatalog::new()
            .with(manifest("app", "1.0.0", &[("base", "^3.0.0")]))
            .with(manifest("base", "1.0.0", &[]));
        let err = resolve(&catalog, "app", &v("1.0.0")).unwrap_err();
        assert!(matches!(err, Error::UnresolvableDependency { ref extension, .. } if extension == "base"));
        assert!(err.to_string().contains("app@1.0.0 requires ^3.0.0"), "{err}");
    }

    #[test]
    fn test_missing_dependency() {
        let catalog = ManifestCatalog::new().with(manifest("app", "1.0.0", &[("ghost", "^1")]));
        let err = resolve(&catalog, "app", &v("1.0.0")).unwrap_err();
        assert!(err.to_string().contains("not in the catalog"), "{err}");
    }

    #[test]
    fn test_cycle_detected_before_selection() {
        let catalog = ManifestCatalog::new()
            .with(manifest("a", "1.0.0", &[("b", "^1")]))
            .with(manifest("b", "1.0.0", &[("a", "^1")]));
        match resolve(&catalog, "a", &v("1.0.0")).unwrap_err() {
            Error::CircularDependency { path } => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_root() {
        let catalog = ManifestCatalog::new();
        assert!(matches!(
            resolve(&catalog, "nope", &v("1.0.0")),
            Err(Error::UnknownExtension(_))
        ));
    }

    #[test]
    fn test_unselected_versions_do_not_constrain() {
        // base 2.0.0 is explored and would pull in extra, but other caps base below 2.
        let catalog = ManifestCatalog::new()
            .with(manifest("app", "1.0.0", &[("base", ">=1.0.0"), ("other", "^1")]))
            .with(manifest("other", "1.0.0", &[("base", "<2.0.0")]))
            .with(manifest("base", "1.0.0", &[]))
            .with(manifest("base", "2.0.0", &[("extra", "^1")]))
            .with(manifest("extra", "1.0.0", &[]));
        let result = resolve(&catalog, "app", &v("1.0.0")).unwrap();
        assert_eq!(result.version_of("base"), Some(&v("1.0.0")));
        assert_eq!(result.selected.len(), 3);
        assert!(result.version_of("extra").is_none());
    }

    #[test]
    fn test_deterministic() {
        let catalog = ManifestCatalog::new()
            .with(manifest("app", "1.0.0", &[("x", "*"), ("y", "~1.1")]))
            .with(manifest("x", "1.0.0", &[("y", "^1")]))
            .with(manifest("x", "1.1.0", &[("y", "^1")]))
            .with(manifest("y", "1.1.0", &[]))
            .with(manifest("y", "1.1.3", &[]));
        let first = resolve(&catalog, "app", &v("1.0.0")).unwrap();
        let second = resolve(&catalog, "app", &v("1.0.0")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.version_of("y"), Some(&v("1.1.3")));
    }
}
