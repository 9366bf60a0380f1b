//! Defines a `Dag`, the directed acyclic graph underlying a Bayesian
//! network.
//!
//! Nodes are identified by name. Every node carries its own parent and
//! child adjacency sets, so parent and child lookups are symmetric and
//! cheap. Acyclicity is an invariant: [`Dag::add_edge`] refuses any edge
//! that would close a directed cycle, leaving the graph unchanged.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::graph::UndirectedGraph;

#[derive(Clone, Debug, Default)]
struct Adjacency {
    parents: BTreeSet<String>,
    children: BTreeSet<String>,
}

/// A directed acyclic graph over string-named nodes.
#[derive(Clone, Debug, Default)]
pub struct Dag {
    nodes: BTreeMap<String, Adjacency>,
}

impl Dag {
    /// Create a new empty DAG.
    pub fn new() -> Self {
        Dag::default()
    }

    /// Create a DAG from a list of `(parent, child)` edge pairs.
    ///
    /// # Errors
    /// `Error::Structural` if any edge would introduce a cycle.
    pub fn from_edges<S: AsRef<str>>(edges: &[(S, S)]) -> Result<Self> {
        let mut dag = Dag::new();
        for (parent, child) in edges {
            dag.add_edge(parent.as_ref(), child.as_ref())?;
        }
        Ok(dag)
    }

    /// Add a node to the DAG. Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: &str) {
        self.nodes.entry(node.to_string()).or_default();
    }

    /// Add a directed edge from `parent` to `child`, inserting the
    /// endpoints if they are not yet present. Duplicate insertions are
    /// idempotent.
    ///
    /// The cycle check asks whether `child` is already an ancestor of
    /// `parent`; if so the edge would close a directed cycle and the graph
    /// is left unchanged.
    ///
    /// # Errors
    /// `Error::Structural` if the edge would introduce a cycle.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(Error::Structural(format!(
                "adding edge {parent} -> {child} would create a cycle"
            )));
        }
        if self.ancestors(parent).iter().any(|a| a == child) {
            return Err(Error::Structural(format!(
                "adding edge {parent} -> {child} would create a cycle"
            )));
        }

        self.add_node(parent);
        self.add_node(child);
        self.nodes
            .get_mut(parent)
            .expect("parent was just inserted")
            .children
            .insert(child.to_string());
        self.nodes
            .get_mut(child)
            .expect("child was just inserted")
            .parents
            .insert(parent.to_string());
        Ok(())
    }

    /// Remove a node and every edge incident to it.
    pub fn remove_node(&mut self, node: &str) {
        if self.nodes.remove(node).is_none() {
            return;
        }
        for adj in self.nodes.values_mut() {
            adj.parents.remove(node);
            adj.children.remove(node);
        }
    }

    /// Remove the directed edge from `parent` to `child`, if present.
    pub fn remove_edge(&mut self, parent: &str, child: &str) {
        if let Some(adj) = self.nodes.get_mut(parent) {
            adj.children.remove(child);
        }
        if let Some(adj) = self.nodes.get_mut(child) {
            adj.parents.remove(parent);
        }
    }

    /// Check whether the directed edge `parent -> child` exists.
    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        self.nodes
            .get(parent)
            .map_or(false, |adj| adj.children.contains(child))
    }

    /// Check whether a node is present.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// All nodes, in lexicographic order.
    pub fn nodes(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// The number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All edges as `(parent, child)` pairs, ordered by parent then child.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for (node, adj) in &self.nodes {
            for child in &adj.children {
                edges.push((node.clone(), child.clone()));
            }
        }
        edges
    }

    /// The parents of a node, in lexicographic order. Unknown nodes have no
    /// parents.
    pub fn parents(&self, node: &str) -> Vec<String> {
        self.nodes
            .get(node)
            .map(|adj| adj.parents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The children of a node, in lexicographic order.
    pub fn children(&self, node: &str) -> Vec<String> {
        self.nodes
            .get(node)
            .map(|adj| adj.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All ancestors of a node, excluding the node itself, in lexicographic
    /// order. Computed by depth-first search over reverse edges.
    pub fn ancestors(&self, node: &str) -> Vec<String> {
        let mut visited = BTreeSet::new();
        self.walk(node, &mut visited, |adj| &adj.parents);
        visited.remove(node);
        visited.into_iter().collect()
    }

    /// All descendants of a node, excluding the node itself, in
    /// lexicographic order.
    pub fn descendants(&self, node: &str) -> Vec<String> {
        let mut visited = BTreeSet::new();
        self.walk(node, &mut visited, |adj| &adj.children);
        visited.remove(node);
        visited.into_iter().collect()
    }

    fn walk<'a, F>(&'a self, node: &str, visited: &mut BTreeSet<String>, next: F)
    where
        F: Fn(&'a Adjacency) -> &'a BTreeSet<String> + Copy,
    {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(adj) = self.nodes.get(node) {
            for neighbor in next(adj) {
                self.walk(neighbor, visited, next);
            }
        }
    }

    /// A topological ordering of the nodes.
    ///
    /// Kahn's algorithm with the ready queue kept sorted, so the returned
    /// order is fully deterministic: among nodes whose parents are all
    /// emitted, the lexicographically smallest comes first.
    ///
    /// # Errors
    /// `Error::Structural` if the graph contains a cycle. This cannot
    /// happen for a DAG built exclusively through [`Dag::add_edge`].
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(node, adj)| (node.as_str(), adj.parents.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for child in &self.nodes[node].children {
                let degree = in_degree
                    .get_mut(child.as_str())
                    .expect("child of a known node is a known node");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child.as_str());
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(Error::Structural(String::from(
                "cycle detected in graph",
            )));
        }
        Ok(order)
    }

    /// The moral graph: every directed edge made undirected, plus an edge
    /// between every pair of parents of each node.
    pub fn moral_graph(&self) -> UndirectedGraph {
        let mut moral = UndirectedGraph::new();
        for node in self.nodes.keys() {
            moral.add_node(node);
        }
        for (node, adj) in &self.nodes {
            for child in &adj.children {
                moral.add_edge(node, child);
            }
        }
        // marry the parents
        for adj in self.nodes.values() {
            let parents: Vec<&String> = adj.parents.iter().collect();
            for i in 0..parents.len() {
                for j in (i + 1)..parents.len() {
                    moral.add_edge(parents[i], parents[j]);
                }
            }
        }
        moral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag {
        // A -> B -> D, A -> C -> D
        Dag::from_edges(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]).unwrap()
    }

    #[test]
    fn add_edge_rejects_cycle() {
        let mut dag = Dag::from_edges(&[("A", "B"), ("B", "C")]).unwrap();

        let err = dag.add_edge("C", "A").unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
        // the failed insertion left the graph unchanged
        assert!(!dag.has_edge("C", "A"));
        assert_eq!(dag.edges().len(), 2);
    }

    #[test]
    fn add_edge_rejects_self_loop() {
        let mut dag = Dag::new();
        assert!(dag.add_edge("A", "A").is_err());
        assert_eq!(dag.node_count(), 0);
    }

    #[test]
    fn duplicate_edges_are_idempotent() {
        let mut dag = Dag::new();
        dag.add_edge("A", "B").unwrap();
        dag.add_edge("A", "B").unwrap();
        assert_eq!(dag.edges().len(), 1);
    }

    #[test]
    fn parents_and_children() {
        let dag = diamond();
        assert_eq!(dag.parents("D"), vec!["B", "C"]);
        assert_eq!(dag.children("A"), vec!["B", "C"]);
        assert!(dag.parents("A").is_empty());
    }

    #[test]
    fn ancestors_and_descendants_are_symmetric() {
        let dag = diamond();
        assert_eq!(dag.ancestors("D"), vec!["A", "B", "C"]);
        assert_eq!(dag.descendants("A"), vec!["B", "C", "D"]);

        for u in dag.nodes() {
            for v in dag.nodes() {
                let forward = dag.descendants(&u).contains(&v);
                let backward = dag.ancestors(&v).contains(&u);
                assert_eq!(forward, backward);
            }
        }
    }

    #[test]
    fn topological_sort_respects_edges() {
        let dag = diamond();
        let order = dag.topological_sort().unwrap();
        assert_eq!(order.len(), 4);

        for (parent, child) in dag.edges() {
            let pi = order.iter().position(|n| *n == parent).unwrap();
            let ci = order.iter().position(|n| *n == child).unwrap();
            assert!(pi < ci, "{parent} must precede {child}");
        }
    }

    #[test]
    fn topological_sort_breaks_ties_lexicographically() {
        let dag = Dag::from_edges(&[("B", "Z"), ("A", "Z"), ("C", "Z")]).unwrap();
        assert_eq!(dag.topological_sort().unwrap(), vec!["A", "B", "C", "Z"]);
    }

    #[test]
    fn removing_an_edge() {
        let mut dag = diamond();
        dag.remove_edge("B", "D");
        assert!(!dag.has_edge("B", "D"));
        assert_eq!(dag.parents("D"), vec!["C"]);
    }

    #[test]
    fn removing_a_node_drops_incident_edges() {
        let mut dag = diamond();
        dag.remove_node("B");

        assert!(!dag.contains("B"));
        assert_eq!(dag.children("A"), vec!["C"]);
        assert_eq!(dag.parents("D"), vec!["C"]);
    }

    #[test]
    fn moral_graph_marries_parents() {
        let dag = diamond();
        let moral = dag.moral_graph();

        // original edges survive undirected
        assert!(moral.has_edge("A", "B"));
        assert!(moral.has_edge("C", "D"));
        // B and C share the child D, so they are married
        assert!(moral.has_edge("B", "C"));
        assert!(!moral.has_edge("A", "D"));
    }

    #[test]
    fn deep_copy_is_independent() {
        let dag = diamond();
        let mut copy = dag.clone();
        copy.remove_edge("A", "B");

        assert!(dag.has_edge("A", "B"));
        assert!(!copy.has_edge("A", "B"));
    }
}
