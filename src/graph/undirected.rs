//! Defines an `UndirectedGraph` over named nodes.
//!
//! Used as the working structure for PC skeleton discovery and as the
//! result type of moralization. Iteration order over nodes, neighbors and
//! edges is lexicographic, which keeps every algorithm built on top of
//! this type deterministic.

use std::collections::{BTreeMap, BTreeSet};

/// An undirected graph over string-named nodes.
#[derive(Clone, Debug, Default)]
pub struct UndirectedGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl UndirectedGraph {
    /// Create a new empty undirected graph.
    pub fn new() -> Self {
        UndirectedGraph::default()
    }

    /// Add a node to the graph. Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: &str) {
        self.adjacency.entry(node.to_string()).or_default();
    }

    /// Add an undirected edge between two nodes, inserting the endpoints if
    /// they are not yet present. Duplicate insertions are idempotent.
    pub fn add_edge(&mut self, a: &str, b: &str) {
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    /// Remove the edge between two nodes, if present.
    pub fn remove_edge(&mut self, a: &str, b: &str) {
        if let Some(neighbors) = self.adjacency.get_mut(a) {
            neighbors.remove(b);
        }
        if let Some(neighbors) = self.adjacency.get_mut(b) {
            neighbors.remove(a);
        }
    }

    /// Check whether an edge exists between two nodes.
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.adjacency
            .get(a)
            .map_or(false, |neighbors| neighbors.contains(b))
    }

    /// All nodes, in lexicographic order.
    pub fn nodes(&self) -> Vec<String> {
        self.adjacency.keys().cloned().collect()
    }

    /// The neighbors of a node, in lexicographic order. Unknown nodes have
    /// no neighbors.
    pub fn neighbors(&self, node: &str) -> Vec<String> {
        self.adjacency
            .get(node)
            .map(|neighbors| neighbors.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All edges, each reported once with its endpoints in lexicographic
    /// order.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for (node, neighbors) in &self.adjacency {
            for neighbor in neighbors {
                if node < neighbor {
                    edges.push((node.clone(), neighbor.clone()));
                }
            }
        }
        edges
    }

    /// The number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_query_edges() {
        let mut g = UndirectedGraph::new();
        g.add_edge("A", "B");
        g.add_edge("B", "C");

        assert!(g.has_edge("A", "B"));
        assert!(g.has_edge("B", "A"));
        assert!(g.has_edge("B", "C"));
        assert!(!g.has_edge("A", "C"));
        assert_eq!(g.nodes(), vec!["A", "B", "C"]);
        assert_eq!(g.neighbors("B"), vec!["A", "C"]);
    }

    #[test]
    fn remove_edge() {
        let mut g = UndirectedGraph::new();
        g.add_edge("A", "B");
        g.remove_edge("B", "A");

        assert!(!g.has_edge("A", "B"));
        // nodes survive edge removal
        assert_eq!(g.nodes(), vec!["A", "B"]);
    }

    #[test]
    fn edges_reported_once() {
        let mut g = UndirectedGraph::new();
        g.add_edge("B", "A");
        g.add_edge("B", "C");
        g.add_edge("B", "A");

        assert_eq!(
            g.edges(),
            vec![
                ("A".to_string(), "B".to_string()),
                ("B".to_string(), "C".to_string())
            ]
        );
    }

    #[test]
    fn unknown_node_has_no_neighbors() {
        let g = UndirectedGraph::new();
        assert!(g.neighbors("X").is_empty());
        assert!(!g.has_edge("X", "Y"));
    }
}
