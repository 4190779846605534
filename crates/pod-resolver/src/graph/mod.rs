//! Resolution graph using petgraph
//!
//! Records which unit pulled which into a closure and through which
//! requirement. The first edge that reaches a unit is its discovery edge;
//! following discovery edges back to a root gives the walkback used in
//! diagnostics.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use pod_core::types::{Requirement, UnitKey};

/// Directed graph of a resolved closure
#[derive(Debug, Clone, Default)]
pub struct ResolutionGraph {
    /// Underlying directed graph
    graph: DiGraph<UnitKey, Requirement>,
    /// Map from UnitKey to NodeIndex for fast lookups
    node_map: HashMap<UnitKey, NodeIndex>,
    /// Node that first reached each non-root node
    discovered_by: HashMap<NodeIndex, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl ResolutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, returning the existing node if it is already present
    pub fn add_unit(&mut self, key: UnitKey) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&key) {
            return index;
        }

        let index = self.graph.add_node(key.clone());
        self.node_map.insert(key, index);
        index
    }

    /// Add a resolution root
    pub fn add_root(&mut self, key: UnitKey) -> NodeIndex {
        let index = self.add_unit(key);
        if !self.roots.contains(&index) {
            self.roots.push(index);
        }
        index
    }

    /// Record that `from` selected `to` for `requirement`.
    ///
    /// Returns true if this edge discovered `to`.
    pub fn add_dependency(&mut self, from: &UnitKey, to: UnitKey, requirement: Requirement) -> bool {
        let from_index = self.add_unit(from.clone());
        let to_index = self.add_unit(to);
        self.graph.add_edge(from_index, to_index, requirement);

        if self.roots.contains(&to_index) || self.discovered_by.contains_key(&to_index) {
            return false;
        }
        self.discovered_by.insert(to_index, from_index);
        true
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.node_map.contains_key(key)
    }

    pub fn roots(&self) -> impl Iterator<Item = &UnitKey> {
        self.roots.iter().filter_map(|&index| self.graph.node_weight(index))
    }

    /// Units from a root down to `key`, following discovery edges
    pub fn walkback(&self, key: &UnitKey) -> Vec<UnitKey> {
        let Some(&start) = self.node_map.get(key) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut seen = HashSet::from([start]);
        let mut current = start;
        while let Some(&parent) = self.discovered_by.get(&current) {
            if !seen.insert(parent) {
                break;
            }
            path.push(parent);
            current = parent;
        }

        path.iter()
            .rev()
            .filter_map(|&index| self.graph.node_weight(index).cloned())
            .collect()
    }

    /// Units that selected `key`, in discovery order
    pub fn dependents_of(&self, key: &UnitKey) -> Vec<UnitKey> {
        self.neighbors(key, Direction::Incoming)
    }

    /// Units selected by `key`, in discovery order
    pub fn dependencies_of(&self, key: &UnitKey) -> Vec<UnitKey> {
        self.neighbors(key, Direction::Outgoing)
    }

    fn neighbors(&self, key: &UnitKey, direction: Direction) -> Vec<UnitKey> {
        let Some(&index) = self.node_map.get(key) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| (edge.id(), if direction == Direction::Incoming { edge.source() } else { edge.target() }))
            .collect();
        edges.sort_by_key(|(edge, _)| *edge);

        let mut seen = HashSet::new();
        edges
            .into_iter()
            .filter(|(_, node)| seen.insert(*node))
            .filter_map(|(_, node)| self.graph.node_weight(node).cloned())
            .collect()
    }

    /// Groups of units that require each other, directly or transitively
    pub fn cycles(&self) -> Vec<Vec<UnitKey>> {
        let mut cycles: Vec<Vec<UnitKey>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| self.graph.contains_edge(node, node))
            })
            .map(|mut component| {
                component.sort();
                component
                    .into_iter()
                    .filter_map(|node| self.graph.node_weight(node).cloned())
                    .collect()
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Format a walkback as "a -> b -> c"
    pub fn format_walkback(walkback: &[UnitKey]) -> String {
        walkback
            .iter()
            .map(|key| key.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Get number of units in the graph
    pub fn unit_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get number of selection edges in the graph
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::types::{Version, VersionRange};

    fn key(id: &str) -> UnitKey {
        UnitKey::new(id, Version::new(1, 0, 0))
    }

    fn req(id: &str) -> Requirement {
        Requirement::unit(id, VersionRange::UNCONSTRAINED)
    }

    #[test]
    fn test_graph_creation() {
        let graph = ResolutionGraph::new();
        assert_eq!(graph.unit_count(), 0);
        assert_eq!(graph.dependency_count(), 0);
    }

    #[test]
    fn test_add_unit_is_idempotent() {
        let mut graph = ResolutionGraph::new();
        let first = graph.add_unit(key("a"));
        let second = graph.add_unit(key("a"));
        assert_eq!(first, second);
        assert_eq!(graph.unit_count(), 1);
    }

    #[test]
    fn test_walkback_follows_discovery_edges() {
        let mut graph = ResolutionGraph::new();
        graph.add_root(key("app"));
        assert!(graph.add_dependency(&key("app"), key("lib"), req("lib")));
        assert!(graph.add_dependency(&key("lib"), key("util"), req("util")));
        // later edge into util does not change how it was discovered
        assert!(graph.add_dependency(&key("app"), key("other"), req("other")));
        assert!(!graph.add_dependency(&key("other"), key("util"), req("util")));

        let walkback = graph.walkback(&key("util"));
        assert_eq!(ResolutionGraph::format_walkback(&walkback), "app -> lib -> util");
        assert_eq!(graph.walkback(&key("app")), vec![key("app")]);
        assert!(graph.walkback(&key("missing")).is_empty());
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let mut graph = ResolutionGraph::new();
        graph.add_root(key("app"));
        graph.add_dependency(&key("app"), key("lib"), req("lib"));
        graph.add_dependency(&key("app"), key("other"), req("other"));
        graph.add_dependency(&key("other"), key("lib"), req("lib"));

        assert_eq!(graph.dependents_of(&key("lib")), vec![key("app"), key("other")]);
        assert_eq!(graph.dependencies_of(&key("app")), vec![key("lib"), key("other")]);
        assert_eq!(graph.dependency_count(), 3);
    }

    #[test]
    fn test_cycles() {
        let mut graph = ResolutionGraph::new();
        graph.add_root(key("a"));
        graph.add_dependency(&key("a"), key("b"), req("b"));
        assert!(graph.cycles().is_empty());

        // edge back to the root is recorded but discovers nothing
        assert!(!graph.add_dependency(&key("b"), key("a"), req("a")));
        assert_eq!(graph.cycles(), vec![vec![key("a"), key("b")]]);
        assert_eq!(graph.walkback(&key("b")), vec![key("a"), key("b")]);
    }
}
