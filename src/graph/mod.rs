//! Graph data structures underpinning Bayesian networks.
//!
//! A [`Dag`] holds the directed structure of a network; an
//! [`UndirectedGraph`] supports the PC skeleton and the moral graph.

pub mod dag;
pub mod undirected;

pub use dag::Dag;
pub use undirected::UndirectedGraph;
