//! Publish order over the released packages
//!
//! Edges point from dependent to dependency, so a topological sort yields
//! dependents first; the order is reversed to publish dependencies first.
//! Dependencies outside the release set do not affect the order.

use crate::cargo::manifest::PackageManifest;
use crate::core::error::{ConvoyError, ConvoyResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Dependency graph of the packages taking part in a release
pub struct PublishGraph {
  graph: DiGraph<String, ()>,
  node_map: HashMap<String, NodeIndex>,
}

impl PublishGraph {
  pub fn from_manifests(manifests: &[PackageManifest]) -> Self {
    let mut graph = DiGraph::new();
    let mut node_map = HashMap::new();

    for manifest in manifests {
      let idx = graph.add_node(manifest.name.clone());
      node_map.insert(manifest.name.clone(), idx);
    }

    for manifest in manifests {
      let dependent_idx = node_map[&manifest.name];
      for dep in &manifest.dependencies {
        if let Some(&dependency_idx) = node_map.get(dep) {
          graph.add_edge(dependent_idx, dependency_idx, ());
        }
      }
    }

    Self { graph, node_map }
  }

  /// Package names, dependencies before dependents
  pub fn publish_order(&self) -> ConvoyResult<Vec<String>> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| {
      let name = &self.graph[cycle.node_id()];
      ConvoyError::with_help(
        format!("Circular dependency involving package '{}'", name),
        "Packages in a dependency cycle cannot be published one after another.",
      )
    })?;

    Ok(sorted.into_iter().rev().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Internal (in-release) dependencies of a package
  pub fn dependencies_of(&self, name: &str) -> Option<Vec<String>> {
    let idx = self.node_map.get(name)?;
    let mut deps: Vec<String> = self.graph.neighbors(*idx).map(|d| self.graph[d].clone()).collect();
    deps.sort();
    deps.dedup();
    Some(deps)
  }
}
