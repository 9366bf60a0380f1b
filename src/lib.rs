//! # bayou
//!
//! A library for building, learning, and reasoning about Bayesian
//! networks over mixed discrete and continuous variables.
//!
//! A client declares a directed acyclic dependency structure among named
//! variables, attaches a conditional probability distribution to each,
//! and can then:
//!
//! * draw joint samples by ancestral sampling ([`model::BayesianNetwork::simulate`]);
//! * learn CPD parameters from observed data ([`model::BayesianNetwork::fit`]);
//! * answer conditional probability queries exactly
//!   ([`inference::VariableElimination`], [`inference::MixedVariableElimination`]);
//! * learn the structure itself from data with the PC algorithm
//!   ([`estimators::PcEstimator`]).
//!
//! ```
//! use bayou::factor::TabularCpd;
//! use bayou::inference::VariableElimination;
//! use bayou::model::{BayesianNetwork, Cpd};
//! use std::collections::{BTreeMap, HashMap};
//!
//! # fn main() -> bayou::Result<()> {
//! let mut bn = BayesianNetwork::new(&[("Rain", "WetGrass")])?;
//! bn.add_cpd(Cpd::Tabular(TabularCpd::new(
//!     "Rain", 2, vec![vec![0.8, 0.2]], Vec::new(), BTreeMap::new(),
//! )?))?;
//! bn.add_cpd(Cpd::Tabular(TabularCpd::new(
//!     "WetGrass", 2,
//!     vec![vec![0.9, 0.1], vec![0.2, 0.8]],
//!     vec!["Rain".to_string()],
//!     [("Rain".to_string(), 2)].into_iter().collect(),
//! )?))?;
//!
//! let engine = VariableElimination::new(&bn)?;
//! let posterior = engine.query(&["Rain"], &HashMap::new())?;
//! assert!((posterior.sum() - 1.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod data;
pub mod error;
pub mod estimators;
pub mod factor;
pub mod graph;
pub mod inference;
pub mod model;

pub use data::{DataFrame, DiscreteSample, Sample};
pub use error::{Error, Result};
pub use estimators::PcEstimator;
pub use factor::{DiscreteFactor, GaussianFactor, LinearGaussianCpd, TabularCpd};
pub use graph::{Dag, UndirectedGraph};
pub use inference::{MixedVariableElimination, QueryResult, VariableElimination};
pub use model::{BayesianNetwork, Cpd};
