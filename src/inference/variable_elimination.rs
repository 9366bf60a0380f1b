//! Exact inference on discrete networks by variable elimination.
//!
//! Implementation of the sum-product and max-product elimination schemes
//! of Koller & Friedman, algorithms 9.1 and 13.1. The engine converts
//! every CPD into a factor, reduces by the evidence, then eliminates the
//! remaining hidden variables one at a time: the factors mentioning the
//! variable are multiplied into a single product and the variable is
//! summed (or maxed) out. Hidden variables are eliminated in lexicographic
//! order. The ordering is a deterministic heuristic, not an optimal one;
//! any other deterministic order would give the same answers.

use std::collections::HashMap;

use tracing::debug;

use crate::data::DiscreteSample;
use crate::error::{Error, Result};
use crate::factor::DiscreteFactor;
use crate::model::BayesianNetwork;

/// A variable-elimination engine borrowing an immutable network.
pub struct VariableElimination<'a> {
    model: &'a BayesianNetwork,
}

impl<'a> VariableElimination<'a> {
    /// Create an engine for the given network, validating the model.
    pub fn new(model: &'a BayesianNetwork) -> Result<Self> {
        model.check_model()?;
        Ok(VariableElimination { model })
    }

    /// Compute the conditional distribution `P(variables | evidence)`.
    ///
    /// # Args
    /// * `variables`: the query variables, which survive elimination.
    /// * `evidence`: observed states; the returned factor is conditioned
    ///   on them.
    ///
    /// # Returns
    /// A normalized factor over the query variables.
    ///
    /// # Errors
    /// * `Error::Query` if a query variable is unknown or not discrete, or
    ///   no factors remain after elimination.
    pub fn query(
        &self,
        variables: &[&str],
        evidence: &DiscreteSample,
    ) -> Result<DiscreteFactor> {
        let factors = self.reduced_factors(evidence)?;
        let factors = self.eliminate_hidden(
            factors,
            variables,
            evidence,
            |product, variable| product.marginalize(&[variable.to_string()]),
        )?;

        let mut result = multiply_all(factors)?;
        result.normalize()?;
        Ok(result)
    }

    /// Compute the most probable joint assignment of the query variables
    /// given the evidence, marginalizing nothing else away: hidden
    /// variables are maxed out, so the result is the MAP assignment.
    ///
    /// # Returns
    /// The maximizing state of every query variable.
    pub fn map(
        &self,
        variables: &[&str],
        evidence: &DiscreteSample,
    ) -> Result<DiscreteSample> {
        let factors = self.reduced_factors(evidence)?;
        let factors = self.eliminate_hidden(
            factors,
            variables,
            evidence,
            |product, variable| product.max_marginalize(&[variable.to_string()]),
        )?;

        let result = multiply_all(factors)?;

        // decode the argmax cell back into per-variable states
        let argmax = result
            .values()
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("factor values are finite"))
            .map(|(idx, _)| idx)
            .expect("factor tables are never empty");
        Ok(result.assignment_of(argmax))
    }

    /// Complete partially observed rows by maximum a posteriori
    /// prediction.
    ///
    /// Every variable absent from at least one observation is predicted
    /// for every row. When all parents of the variable are observed, the
    /// prediction is the argmax of the matching CPD row; otherwise the
    /// posterior of the variable given the row is computed by elimination
    /// and its argmax is taken. Observed values pass through unchanged.
    ///
    /// # Returns
    /// A map from predicted variable to its per-row values.
    pub fn predict(
        &self,
        observations: &[DiscreteSample],
    ) -> Result<HashMap<String, Vec<usize>>> {
        let nodes = self.model.nodes();
        let mut targets: Vec<String> = nodes
            .iter()
            .filter(|v| observations.iter().any(|obs| !obs.contains_key(*v)))
            .cloned()
            .collect();
        targets.sort();

        let mut predictions: HashMap<String, Vec<usize>> = targets
            .iter()
            .map(|v| (v.clone(), Vec::with_capacity(observations.len())))
            .collect();

        for obs in observations {
            for target in &targets {
                let value = match obs.get(target) {
                    Some(&observed) => observed,
                    None => self.predict_single(target, obs)?,
                };
                predictions
                    .get_mut(target)
                    .expect("prediction vector was preallocated")
                    .push(value);
            }
        }
        Ok(predictions)
    }

    fn predict_single(&self, variable: &str, evidence: &DiscreteSample) -> Result<usize> {
        let cpd = self.model.tabular_cpd(variable).ok_or_else(|| {
            Error::Query(format!("variable {variable} is not discrete"))
        })?;

        // fast path: every parent observed means the answer is a row argmax
        let parents_observed = !cpd.parents().is_empty()
            && cpd.parents().iter().all(|p| evidence.contains_key(p));
        if parents_observed {
            let row = &cpd.rows()[cpd.row_index(evidence)?];
            return Ok(argmax(row));
        }

        let posterior = self.query(&[variable], evidence)?;
        Ok(argmax(posterior.values()))
    }

    fn reduced_factors(&self, evidence: &DiscreteSample) -> Result<Vec<DiscreteFactor>> {
        let mut factors = Vec::new();
        for cpd in self.model.tabular_cpds() {
            factors.push(cpd.to_factor()?.reduce(evidence)?);
        }
        Ok(factors)
    }

    fn eliminate_hidden(
        &self,
        mut factors: Vec<DiscreteFactor>,
        variables: &[&str],
        evidence: &DiscreteSample,
        eliminate: impl Fn(&DiscreteFactor, &str) -> Result<DiscreteFactor>,
    ) -> Result<Vec<DiscreteFactor>> {
        let nodes = self.model.nodes();
        for &v in variables {
            if !nodes.iter().any(|n| n == v) {
                return Err(Error::Query(format!("unknown query variable {v}")));
            }
            if !self.model.is_discrete(v) {
                return Err(Error::Query(format!(
                    "query variable {v} is not discrete"
                )));
            }
        }

        // hidden variables, in lexicographic order since nodes() is sorted
        let hidden: Vec<String> = nodes
            .into_iter()
            .filter(|n| !variables.contains(&n.as_str()) && !evidence.contains_key(n))
            .collect();

        for variable in &hidden {
            let (relevant, kept): (Vec<_>, Vec<_>) = factors
                .into_iter()
                .partition(|phi| phi.contains(variable));

            factors = kept;
            if relevant.is_empty() {
                continue;
            }
            debug!(variable = %variable, factors = relevant.len(), "eliminating");

            let product = multiply_all(relevant)?;
            factors.push(eliminate(&product, variable)?);
        }

        if factors.is_empty() {
            return Err(Error::Query(String::from(
                "no factors remaining after elimination",
            )));
        }
        Ok(factors)
    }
}

fn multiply_all(factors: Vec<DiscreteFactor>) -> Result<DiscreteFactor> {
    let mut iter = factors.into_iter();
    let mut product = iter.next().ok_or_else(|| {
        Error::Query(String::from("no factors remaining after elimination"))
    })?;
    for phi in iter {
        product = product.multiply(&phi)?;
    }
    Ok(product)
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
