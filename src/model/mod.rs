//! Defines a `BayesianNetwork`, a directed probabilistic graphical model
//! over mixed discrete and continuous variables.
//!
//! The network couples a [`Dag`] with one [`Cpd`] per node. A variable's
//! type (discrete or continuous) is the kind of its CPD, so a node can
//! never carry both parameterizations. The model validates itself before
//! sampling, fitting and querying.

mod fit;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::data::{DiscreteSample, Sample};
use crate::error::{Error, Result};
use crate::factor::{LinearGaussianCpd, TabularCpd};
use crate::graph::Dag;

/// The conditional probability distribution attached to one node.
///
/// Tabular CPDs describe discrete variables, linear-Gaussian CPDs
/// continuous ones.
#[derive(Clone, Debug)]
pub enum Cpd {
    Tabular(TabularCpd),
    LinearGaussian(LinearGaussianCpd),
}

impl Cpd {
    /// The variable this CPD describes.
    pub fn variable(&self) -> &str {
        match self {
            Cpd::Tabular(cpd) => cpd.variable(),
            Cpd::LinearGaussian(cpd) => cpd.variable(),
        }
    }

    /// The declared parents, in declared order.
    pub fn parents(&self) -> &[String] {
        match self {
            Cpd::Tabular(cpd) => cpd.parents(),
            Cpd::LinearGaussian(cpd) => cpd.parents(),
        }
    }

    /// `true` if this CPD describes a discrete variable.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Cpd::Tabular(_))
    }
}

/// A Bayesian network: a DAG plus one CPD per node.
#[derive(Clone, Debug, Default)]
pub struct BayesianNetwork {
    dag: Dag,
    cpds: IndexMap<String, Cpd>,
}

impl BayesianNetwork {
    /// Create a network from a list of `(parent, child)` edges.
    ///
    /// # Errors
    /// * `Error::Structural` if the edges contain a cycle.
    pub fn new<S: AsRef<str>>(edges: &[(S, S)]) -> Result<Self> {
        Ok(BayesianNetwork {
            dag: Dag::from_edges(edges)?,
            cpds: IndexMap::new(),
        })
    }

    /// Create a network over an existing DAG.
    pub fn from_dag(dag: Dag) -> Self {
        BayesianNetwork {
            dag,
            cpds: IndexMap::new(),
        }
    }

    /// The underlying DAG.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// All nodes, in lexicographic order.
    pub fn nodes(&self) -> Vec<String> {
        self.dag.nodes()
    }

    /// All edges as `(parent, child)` pairs.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.dag.edges()
    }

    /// Attach a CPD to its variable, replacing any previous CPD.
    ///
    /// # Errors
    /// * `Error::Structural` if the variable is not a node of the DAG or
    ///   the declared parents disagree with the DAG parents as sorted
    ///   sequences.
    pub fn add_cpd(&mut self, cpd: Cpd) -> Result<()> {
        let variable = cpd.variable().to_string();
        if !self.dag.contains(&variable) {
            return Err(Error::Structural(format!(
                "variable {variable} is not a node of the network"
            )));
        }

        let dag_parents = self.dag.parents(&variable);
        let mut declared = cpd.parents().to_vec();
        declared.sort();
        if declared != dag_parents {
            return Err(Error::Structural(format!(
                "CPD parents {declared:?} do not match network parents {dag_parents:?} for {variable}"
            )));
        }

        self.cpds.insert(variable, cpd);
        Ok(())
    }

    /// The CPD of a variable, if one is attached.
    pub fn cpd(&self, variable: &str) -> Option<&Cpd> {
        self.cpds.get(variable)
    }

    /// The tabular CPD of a discrete variable.
    pub fn tabular_cpd(&self, variable: &str) -> Option<&TabularCpd> {
        match self.cpds.get(variable) {
            Some(Cpd::Tabular(cpd)) => Some(cpd),
            _ => None,
        }
    }

    /// The linear-Gaussian CPD of a continuous variable.
    pub fn gaussian_cpd(&self, variable: &str) -> Option<&LinearGaussianCpd> {
        match self.cpds.get(variable) {
            Some(Cpd::LinearGaussian(cpd)) => Some(cpd),
            _ => None,
        }
    }

    /// All tabular CPDs, in insertion order.
    pub fn tabular_cpds(&self) -> impl Iterator<Item = &TabularCpd> {
        self.cpds.values().filter_map(|cpd| match cpd {
            Cpd::Tabular(t) => Some(t),
            _ => None,
        })
    }

    /// All linear-Gaussian CPDs, in insertion order.
    pub fn gaussian_cpds(&self) -> impl Iterator<Item = &LinearGaussianCpd> {
        self.cpds.values().filter_map(|cpd| match cpd {
            Cpd::LinearGaussian(g) => Some(g),
            _ => None,
        })
    }

    /// `true` if the variable carries a tabular CPD.
    pub fn is_discrete(&self, variable: &str) -> bool {
        self.cpds
            .get(variable)
            .map_or(false, |cpd| cpd.is_discrete())
    }

    /// `true` if the variable carries a linear-Gaussian CPD.
    pub fn is_continuous(&self, variable: &str) -> bool {
        self.cpds
            .get(variable)
            .map_or(false, |cpd| !cpd.is_discrete())
    }

    /// `true` if every node carries a tabular CPD.
    pub fn is_all_discrete(&self) -> bool {
        self.dag.nodes().iter().all(|n| self.is_discrete(n))
    }

    /// `true` if every node carries a linear-Gaussian CPD.
    pub fn is_all_continuous(&self) -> bool {
        self.dag.nodes().iter().all(|n| self.is_continuous(n))
    }

    /// The state count of a discrete variable, from its own CPD.
    pub fn cardinality(&self, variable: &str) -> Option<usize> {
        self.tabular_cpd(variable).map(|cpd| cpd.variable_card())
    }

    /// Validate that the network is fully and consistently specified.
    ///
    /// Checks that every node carries exactly one CPD whose declared
    /// parents equal the DAG parents as sorted sequences, and that the
    /// cardinality of every discrete variable agrees between its own CPD
    /// and every CPD that conditions on it.
    ///
    /// # Errors
    /// * `Error::Structural` describing the first violation found.
    pub fn check_model(&self) -> Result<()> {
        for node in self.dag.nodes() {
            let cpd = self.cpds.get(&node).ok_or_else(|| {
                Error::Structural(format!("node {node} has no CPD"))
            })?;

            let dag_parents = self.dag.parents(&node);
            let mut declared = cpd.parents().to_vec();
            declared.sort();
            if declared != dag_parents {
                return Err(Error::Structural(format!(
                    "CPD parents {declared:?} do not match network parents {dag_parents:?} for {node}"
                )));
            }
        }

        // cardinalities must agree wherever a discrete variable appears
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut record = |variable: &str, card: usize| -> Result<()> {
            match seen.get(variable) {
                Some(&existing) if existing != card => Err(Error::Structural(format!(
                    "inconsistent cardinality for {variable}: {existing} vs {card}"
                ))),
                _ => {
                    seen.insert(variable.to_string(), card);
                    Ok(())
                }
            }
        };
        for cpd in self.cpds.values() {
            match cpd {
                Cpd::Tabular(t) => {
                    record(t.variable(), t.variable_card())?;
                    for p in t.parents() {
                        record(p, t.parent_card(p).expect("validated parent"))?;
                    }
                }
                Cpd::LinearGaussian(g) => {
                    if let crate::factor::LinearGaussianKind::DiscreteIndexed {
                        parent_card,
                        ..
                    } = g.kind()
                    {
                        for (p, &card) in parent_card {
                            record(p, card)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Draw `n` joint samples from an all-discrete network by ancestral
    /// sampling.
    ///
    /// Nodes are visited in topological order; each state is drawn from
    /// the CPD row selected by the parent states sampled so far, by
    /// cumulative probability and a single uniform draw (Koller &
    /// Friedman, algorithm 12.1). The same seed yields the same samples
    /// on every platform.
    ///
    /// # Errors
    /// * `Error::Domain` if the network contains continuous variables.
    /// * `Error::Structural` if the model fails validation.
    pub fn simulate(&self, n: usize, seed: u64) -> Result<Vec<DiscreteSample>> {
        if !self.is_all_discrete() {
            return Err(Error::Domain(String::from(
                "network contains continuous variables, use simulate_mixed",
            )));
        }
        self.check_model()?;

        let order = self.dag.topological_sort()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        debug!(samples = n, "ancestral sampling over discrete network");

        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            let mut sample = DiscreteSample::new();
            for node in &order {
                let cpd = self.tabular_cpd(node).expect("all-discrete was checked");
                let row = cpd.row_index(&sample)?;
                let state = sample_categorical(&cpd.rows()[row], &mut rng);
                sample.insert(node.clone(), state);
            }
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Draw `n` joint samples from a mixed network by ancestral sampling.
    ///
    /// Discrete nodes sample categorically; continuous nodes draw from
    /// their conditional normal given the partial sample.
    pub fn simulate_mixed(&self, n: usize, seed: u64) -> Result<Vec<Sample>> {
        self.check_model()?;

        let order = self.dag.topological_sort()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        debug!(samples = n, "ancestral sampling over mixed network");

        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            let mut sample = Sample::new();
            for node in &order {
                match self.cpds.get(node).expect("check_model passed") {
                    Cpd::Tabular(cpd) => {
                        let row = cpd.row_index(&sample.discrete)?;
                        let state = sample_categorical(&cpd.rows()[row], &mut rng);
                        sample.discrete.insert(node.clone(), state);
                    }
                    Cpd::LinearGaussian(cpd) => {
                        let value = cpd.sample(&sample, &mut rng)?;
                        sample.continuous.insert(node.clone(), value);
                    }
                }
            }
            samples.push(sample);
        }
        Ok(samples)
    }
}

/// Draw a state from a categorical distribution with a single uniform
/// draw over the cumulative probabilities.
fn sample_categorical<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (state, &p) in probs.iter().enumerate() {
        cumulative += p;
        if u <= cumulative {
            return state;
        }
    }
    probs.len() - 1
}
