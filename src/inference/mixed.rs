//! Exact inference over networks that mix discrete and continuous
//! variables.
//!
//! The engine dispatches on the composition of the network and the shape
//! of the query. All-discrete networks delegate to
//! [`VariableElimination`]; all-continuous networks run a Gaussian
//! elimination path; conditional-linear-Gaussian networks answer either a
//! discrete or a continuous query over the matching slice of the model.
//! A query that targets discrete and continuous variables at once is
//! refused: an exact joint answer is a mixture of Gaussians indexed by
//! the discrete configurations, which this engine does not maintain.

use tracing::debug;

use crate::data::Sample;
use crate::error::{Error, Result};
use crate::factor::{DiscreteFactor, GaussianFactor};
use crate::inference::VariableElimination;
use crate::model::BayesianNetwork;

/// The result of a mixed query: a distribution over discrete query
/// variables or over continuous ones, never both.
#[derive(Clone, Debug)]
pub enum QueryResult {
    Discrete(DiscreteFactor),
    Gaussian(GaussianFactor),
}

impl QueryResult {
    /// The discrete factor, for queries known to target discrete
    /// variables.
    pub fn as_discrete(&self) -> Option<&DiscreteFactor> {
        match self {
            QueryResult::Discrete(phi) => Some(phi),
            QueryResult::Gaussian(_) => None,
        }
    }

    /// The Gaussian factor, for queries known to target continuous
    /// variables.
    pub fn as_gaussian(&self) -> Option<&GaussianFactor> {
        match self {
            QueryResult::Discrete(_) => None,
            QueryResult::Gaussian(phi) => Some(phi),
        }
    }
}

/// A mixed variable-elimination engine borrowing an immutable network.
pub struct MixedVariableElimination<'a> {
    model: &'a BayesianNetwork,
}

impl<'a> MixedVariableElimination<'a> {
    /// Create an engine for the given network, validating the model.
    pub fn new(model: &'a BayesianNetwork) -> Result<Self> {
        model.check_model()?;
        Ok(MixedVariableElimination { model })
    }

    /// Compute `P(query variables | evidence)`.
    ///
    /// # Args
    /// * `discrete_vars`: discrete query targets.
    /// * `continuous_vars`: continuous query targets.
    /// * `evidence`: observed discrete states and continuous values.
    ///
    /// # Errors
    /// * `Error::Query` for query shapes the engine does not support:
    ///   continuous targets on an all-discrete network and vice versa, or
    ///   discrete and continuous targets in one query.
    pub fn query(
        &self,
        discrete_vars: &[&str],
        continuous_vars: &[&str],
        evidence: &Sample,
    ) -> Result<QueryResult> {
        let all_discrete = self.model.is_all_discrete();
        let all_continuous = self.model.is_all_continuous();

        if all_discrete && !continuous_vars.is_empty() {
            return Err(Error::Query(String::from(
                "model is discrete only, cannot query continuous variables",
            )));
        }
        if all_continuous && !discrete_vars.is_empty() {
            return Err(Error::Query(String::from(
                "model is continuous only, cannot query discrete variables",
            )));
        }

        if all_discrete {
            debug!("dispatching to the discrete elimination path");
            let engine = VariableElimination::new(self.model)?;
            let posterior = engine.query(discrete_vars, &evidence.discrete)?;
            return Ok(QueryResult::Discrete(posterior));
        }

        if all_continuous {
            debug!("dispatching to the Gaussian elimination path");
            return self.query_continuous(continuous_vars, evidence, false);
        }

        match (discrete_vars.is_empty(), continuous_vars.is_empty()) {
            (false, true) => {
                debug!("CLG network, discrete query over the tabular slice");
                self.query_discrete_in_mixed(discrete_vars, evidence)
            }
            (true, false) => {
                debug!("CLG network, continuous query over the Gaussian slice");
                self.query_continuous(continuous_vars, evidence, true)
            }
            _ => Err(Error::Query(String::from(
                "joint discrete and continuous queries are not implemented",
            ))),
        }
    }

    /// Discrete query on a CLG network: eliminate over the tabular CPDs
    /// and the discrete evidence only.
    fn query_discrete_in_mixed(
        &self,
        variables: &[&str],
        evidence: &Sample,
    ) -> Result<QueryResult> {
        for &v in variables {
            if !self.model.is_discrete(v) {
                return Err(Error::Query(format!(
                    "query variable {v} is not discrete"
                )));
            }
        }

        let mut factors = Vec::new();
        for cpd in self.model.tabular_cpds() {
            factors.push(cpd.to_factor()?.reduce(&evidence.discrete)?);
        }
        if factors.is_empty() {
            return Err(Error::Query(String::from(
                "no discrete factors in the network",
            )));
        }

        let hidden: Vec<String> = self
            .model
            .nodes()
            .into_iter()
            .filter(|n| {
                self.model.is_discrete(n)
                    && !variables.contains(&n.as_str())
                    && !evidence.discrete.contains_key(n)
            })
            .collect();

        for variable in &hidden {
            let (relevant, kept): (Vec<_>, Vec<_>) =
                factors.into_iter().partition(|phi| phi.contains(variable));
            factors = kept;
            if relevant.is_empty() {
                continue;
            }
            let mut product = multiply_discrete(relevant)?;
            product = product.marginalize(&[variable.clone()])?;
            factors.push(product);
        }

        if factors.is_empty() {
            return Err(Error::Query(String::from(
                "no factors remaining after elimination",
            )));
        }
        let mut result = multiply_discrete(factors)?;
        result.normalize()?;
        Ok(QueryResult::Discrete(result))
    }

    /// Continuous query: run Gaussian elimination over the usable
    /// Gaussian factors.
    ///
    /// Only linear-Gaussian CPDs with all-continuous parents have a
    /// self-contained factor form, and of those only the parentless ones
    /// convert directly; the rest are skipped, which restricts this path
    /// to the dependencies elimination can compose. On a CLG network
    /// (`clg` set) CPDs with discrete parents are excluded up front.
    fn query_continuous(
        &self,
        variables: &[&str],
        evidence: &Sample,
        clg: bool,
    ) -> Result<QueryResult> {
        for &v in variables {
            if !self.model.is_continuous(v) {
                return Err(Error::Query(format!(
                    "query variable {v} is not continuous"
                )));
            }
        }

        let mut factors: Vec<GaussianFactor> = Vec::new();
        for cpd in self.model.gaussian_cpds() {
            if clg && cpd.has_discrete_parents() {
                continue;
            }
            match cpd.to_factor() {
                Ok(factor) => factors.push(factor),
                Err(_) => {
                    debug!(variable = cpd.variable(), "CPD has no standalone factor, skipping");
                }
            }
        }
        if factors.is_empty() {
            return Err(Error::Query(String::from(
                "no usable Gaussian factors in the network",
            )));
        }

        // condition on the continuous evidence; fully observed factors
        // only contribute a constant to the unnormalized density
        let mut conditioned = Vec::new();
        for factor in factors {
            let all_observed = factor
                .variables()
                .iter()
                .all(|v| evidence.continuous.contains_key(v));
            if all_observed {
                continue;
            }
            conditioned.push(factor.reduce(&evidence.continuous)?);
        }

        let hidden: Vec<String> = self
            .model
            .nodes()
            .into_iter()
            .filter(|n| {
                self.model.is_continuous(n)
                    && !variables.contains(&n.as_str())
                    && !evidence.continuous.contains_key(n)
            })
            .collect();

        let mut factors = conditioned;
        for variable in &hidden {
            let (relevant, kept): (Vec<_>, Vec<_>) =
                factors.into_iter().partition(|phi| phi.contains(variable));
            factors = kept;
            if relevant.is_empty() {
                continue;
            }

            let mut iter = relevant.into_iter();
            let mut product = iter.next().expect("relevant is non-empty");
            for phi in iter {
                product = product.multiply(&phi)?;
            }

            // a factor left over the eliminated variable alone integrates
            // to a constant and drops out
            if product.variables().len() == 1 && product.variables()[0] == *variable {
                continue;
            }
            factors.push(product.marginalize(&[variable.clone()])?);
        }

        if factors.is_empty() {
            return Err(Error::Query(String::from(
                "no factors remaining after elimination",
            )));
        }

        let mut iter = factors.into_iter();
        let mut result = iter.next().expect("checked non-empty");
        for phi in iter {
            result = result.multiply(&phi)?;
        }
        Ok(QueryResult::Gaussian(result))
    }
}

fn multiply_discrete(factors: Vec<DiscreteFactor>) -> Result<DiscreteFactor> {
    let mut iter = factors.into_iter();
    let mut product = iter.next().ok_or_else(|| {
        Error::Query(String::from("no factors remaining after elimination"))
    })?;
    for phi in iter {
        product = product.multiply(&phi)?;
    }
    Ok(product)
}
