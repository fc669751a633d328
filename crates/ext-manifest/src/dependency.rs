//! Dependency graph, cycle detection, and topological ordering.
//!
//! Edges point from dependent to dependency: if A requires B, the edge is
//! `A -> B`. Topological sort returns dependency-first order (B before A).
//!
//! # Example
//!
//! ```
//! use ext_manifest::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_edge("analytics", "base-metrics");
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, vec!["base-metrics", "analytics"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::ExtensionManifest;

/// An (extension id, version) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: String,
    pub version: Version,
}

impl DependencyNode {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Directed graph of "requires" relations between extension ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Adjacency list: key requires each value.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no edges. Re-adding an existing node is a no-op.
    pub fn add_node(&mut self, id: &str) {
        self.edges.entry(id.to_string()).or_default();
    }

    /// Declare that `from` requires `to`, adding both nodes if needed.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Return the number of nodes.
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Return the number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Direct dependencies of a node (sorted).
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .get(id)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Find a cycle by depth-first search with an explicit recursion stack.
    ///
    /// Returns the cycle as a path that starts and ends on the same node
    /// (`["a", "b", "a"]`), or `None` if the graph is acyclic. Nodes are
    /// visited in sorted order, so the same graph always reports the same
    /// cycle.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: BTreeSet<&str> = BTreeSet::new();

        for root in self.edges.keys() {
            if done.contains(root.as_str()) {
                continue;
            }
            // Each frame holds a node and the iterator over its remaining
            // dependencies; `path` mirrors the frames for reconstruction.
            let mut stack: Vec<(&str, std::collections::btree_set::Iter<'_, String>)> = Vec::new();
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: BTreeSet<&str> = BTreeSet::new();

            stack.push((root.as_str(), self.successors(root)));
            path.push(root.as_str());
            on_path.insert(root.as_str());

            while let Some((node, iter)) = stack.last_mut() {
                match iter.next() {
                    Some(next) => {
                        let next = next.as_str();
                        if on_path.contains(next) {
                            let start = path.iter().position(|n| *n == next).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(next.to_string());
                            return Some(cycle);
                        }
                        if !done.contains(next) {
                            stack.push((next, self.successors(next)));
                            path.push(next);
                            on_path.insert(next);
                        }
                    }
                    None => {
                        let node = *node;
                        stack.pop();
                        path.pop();
                        on_path.remove(node);
                        done.insert(node);
                    }
                }
            }
        }
        None
    }

    fn successors(&self, id: &str) -> std::collections::btree_set::Iter<'_, String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.edges.get(id).unwrap_or(&EMPTY).iter()
    }

    /// Topological sort using Kahn's algorithm.
    ///
    /// Returns ids in dependency-first order. Among nodes that become ready
    /// at the same time, the lexicographically smallest is emitted first.
    ///
    /// # Errors
    ///
    /// Returns `Error::CircularDependency` if the graph contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        if let Some(path) = self.find_cycle() {
            return Err(Error::CircularDependency { path });
        }

        // Remaining unsatisfied dependencies per node.
        let mut pending: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();
        // Reverse adjacency: dependency -> dependents.
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (from, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(from.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(current) = ready.pop_first() {
            order.push(current.to_string());
            for &dependent in dependents.get(current).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Build the id-level graph of a set of manifests.
    ///
    /// Dependencies on ids outside the set still become nodes.
    pub fn from_manifests<'a>(manifests: impl IntoIterator<Item = &'a ExtensionManifest>) -> Self {
        let mut graph = Self::new();
        for manifest in manifests {
            graph.add_node(&manifest.id);
            for dep in manifest.dependencies.keys() {
                graph.add_edge(&manifest.id, dep);
            }
        }
        graph
    }
}
