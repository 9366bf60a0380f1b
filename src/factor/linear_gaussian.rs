//! Defines a `LinearGaussianCpd`, the conditional distribution of a
//! continuous variable given its parents.
//!
//! Two forms exist, and a single CPD is of exactly one of them:
//!
//! * the continuous-parent form
//!   `X = b0 + sum_i b_i * parent_i + eps`, `eps ~ N(0, sigma^2)`;
//! * the discrete-parent form, a separate `(mean, variance)` pair for
//!   every configuration of the discrete parents.
//!
//! Representing the two as one tagged union keeps a variable from ever
//! carrying both parameterizations at once.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::data::Sample;
use crate::error::{Error, Result};
use crate::factor::GaussianFactor;

/// Mean and variance of a single Gaussian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianParams {
    pub mean: f64,
    pub variance: f64,
}

/// The parameterization of a [`LinearGaussianCpd`].
#[derive(Clone, Debug)]
pub enum LinearGaussianKind {
    /// `X = intercept + sum_i coefficients[p_i] * p_i + N(0, variance)`
    /// over continuous parents.
    Continuous {
        intercept: f64,
        coefficients: HashMap<String, f64>,
        variance: f64,
    },
    /// A `(mean, variance)` pair per configuration of the discrete
    /// parents, keyed by the tuple of parent states in declared order.
    DiscreteIndexed {
        parent_card: BTreeMap<String, usize>,
        states: HashMap<Vec<usize>, GaussianParams>,
    },
}

/// The conditional Gaussian distribution of one continuous variable.
#[derive(Clone, Debug)]
pub struct LinearGaussianCpd {
    variable: String,
    parents: Vec<String>,
    kind: LinearGaussianKind,
}

impl LinearGaussianCpd {
    /// Create a linear-Gaussian CPD over continuous parents.
    ///
    /// # Errors
    /// * `Error::Domain` if the variance is not positive or a parent is
    ///   missing its coefficient.
    pub fn linear(
        variable: &str,
        parents: Vec<String>,
        intercept: f64,
        coefficients: HashMap<String, f64>,
        variance: f64,
    ) -> Result<Self> {
        if variance <= 0.0 {
            return Err(Error::Domain(format!(
                "variance of {variable} must be positive, got {variance}"
            )));
        }
        for p in &parents {
            if !coefficients.contains_key(p) {
                return Err(Error::Domain(format!(
                    "no coefficient given for parent {p} of {variable}"
                )));
            }
        }

        Ok(LinearGaussianCpd {
            variable: variable.to_string(),
            parents,
            kind: LinearGaussianKind::Continuous {
                intercept,
                coefficients,
                variance,
            },
        })
    }

    /// Create a Gaussian CPD indexed by discrete parent configurations.
    ///
    /// # Args
    /// * `states`: exactly one `(mean, variance)` entry per parent
    ///   configuration, keyed by the parent states in declared order.
    ///
    /// # Errors
    /// * `Error::Shape` if the number of entries does not match the number
    ///   of configurations or a key has the wrong arity.
    /// * `Error::Domain` if a key is out of range or a variance is not
    ///   positive.
    pub fn discrete_indexed(
        variable: &str,
        parents: Vec<String>,
        parent_card: BTreeMap<String, usize>,
        states: HashMap<Vec<usize>, GaussianParams>,
    ) -> Result<Self> {
        let mut expected = 1usize;
        for p in &parents {
            match parent_card.get(p) {
                Some(&card) if card > 0 => expected *= card,
                _ => {
                    return Err(Error::Shape(format!(
                        "no cardinality given for parent {p} of {variable}"
                    )))
                }
            }
        }
        if states.len() != expected {
            return Err(Error::Shape(format!(
                "expected {expected} parent configurations for {variable}, got {}",
                states.len()
            )));
        }
        for (key, params) in &states {
            if key.len() != parents.len() {
                return Err(Error::Shape(format!(
                    "configuration key {key:?} for {variable} has {} entries, expected {}",
                    key.len(),
                    parents.len()
                )));
            }
            for (state, p) in key.iter().zip(&parents) {
                if *state >= parent_card[p] {
                    return Err(Error::Domain(format!(
                        "state {state} out of range for parent {p} of {variable}"
                    )));
                }
            }
            if params.variance <= 0.0 {
                return Err(Error::Domain(format!(
                    "variance of {variable} given {key:?} must be positive, got {}",
                    params.variance
                )));
            }
        }

        Ok(LinearGaussianCpd {
            variable: variable.to_string(),
            parents,
            kind: LinearGaussianKind::DiscreteIndexed {
                parent_card,
                states,
            },
        })
    }

    /// The child variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// The parent variables, in declared order.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// The parameterization.
    pub fn kind(&self) -> &LinearGaussianKind {
        &self.kind
    }

    /// `true` for the discrete-parent form.
    pub fn has_discrete_parents(&self) -> bool {
        matches!(self.kind, LinearGaussianKind::DiscreteIndexed { .. })
    }

    /// The conditional mean `E[X | parents]`.
    ///
    /// # Errors
    /// * `Error::Domain` if a parent value is missing from the sample.
    pub fn mean(&self, parent_values: &Sample) -> Result<f64> {
        match &self.kind {
            LinearGaussianKind::Continuous {
                intercept,
                coefficients,
                ..
            } => {
                let mut mean = *intercept;
                for p in &self.parents {
                    let value = parent_values.continuous.get(p).ok_or_else(|| {
                        Error::Domain(format!(
                            "missing value for parent {p} of {}",
                            self.variable
                        ))
                    })?;
                    mean += coefficients[p] * value;
                }
                Ok(mean)
            }
            LinearGaussianKind::DiscreteIndexed { .. } => {
                Ok(self.lookup(parent_values)?.mean)
            }
        }
    }

    /// The conditional variance `Var[X | parents]`.
    pub fn variance(&self, parent_values: &Sample) -> Result<f64> {
        match &self.kind {
            LinearGaussianKind::Continuous { variance, .. } => Ok(*variance),
            LinearGaussianKind::DiscreteIndexed { .. } => {
                Ok(self.lookup(parent_values)?.variance)
            }
        }
    }

    fn lookup(&self, parent_values: &Sample) -> Result<GaussianParams> {
        let LinearGaussianKind::DiscreteIndexed { states, .. } = &self.kind else {
            unreachable!("lookup is only called on the discrete-parent form");
        };
        let mut key = Vec::with_capacity(self.parents.len());
        for p in &self.parents {
            let state = parent_values.discrete.get(p).ok_or_else(|| {
                Error::Domain(format!(
                    "missing state for parent {p} of {}",
                    self.variable
                ))
            })?;
            key.push(*state);
        }
        states.get(&key).copied().ok_or_else(|| {
            Error::Domain(format!(
                "no parameters for configuration {key:?} of {}",
                self.variable
            ))
        })
    }

    /// Draw a sample from `P(X | parents)`.
    pub fn sample<R: Rng + ?Sized>(&self, parent_values: &Sample, rng: &mut R) -> Result<f64> {
        let mean = self.mean(parent_values)?;
        let variance = self.variance(parent_values)?;
        let normal = Normal::new(mean, variance.sqrt())
            .map_err(|e| Error::Numerical(format!("invalid normal parameters: {e}")))?;
        Ok(normal.sample(rng))
    }

    /// Evaluate the conditional density `p(x | parents)`.
    pub fn pdf(&self, x: f64, parent_values: &Sample) -> Result<f64> {
        let mean = self.mean(parent_values)?;
        let variance = self.variance(parent_values)?;

        let norm = 1.0 / (variance * 2.0 * PI).sqrt();
        let diff = x - mean;
        Ok(norm * (-(diff * diff) / (2.0 * variance)).exp())
    }

    /// Convert to a standalone [`GaussianFactor`].
    ///
    /// Only the parentless continuous form has a self-contained joint,
    /// `N(intercept, variance)`. The inference engine uses this as an
    /// initialization step and composes conditional dependence through
    /// elimination.
    ///
    /// # Errors
    /// * `Error::Domain` if the CPD has parents of either form.
    pub fn to_factor(&self) -> Result<GaussianFactor> {
        match &self.kind {
            LinearGaussianKind::Continuous {
                intercept,
                variance,
                ..
            } if self.parents.is_empty() => {
                GaussianFactor::univariate(&self.variable, *intercept, *variance)
            }
            LinearGaussianKind::Continuous { .. } => Err(Error::Domain(format!(
                "converting the CPD of {} to a factor requires its parent distributions",
                self.variable
            ))),
            LinearGaussianKind::DiscreteIndexed { .. } => Err(Error::Domain(format!(
                "cannot convert the CPD of {} with discrete parents to a single Gaussian factor",
                self.variable
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn continuous_sample(entries: &[(&str, f64)]) -> Sample {
        let mut s = Sample::new();
        for (k, v) in entries {
            s.continuous.insert(k.to_string(), *v);
        }
        s
    }

    fn discrete_sample(entries: &[(&str, usize)]) -> Sample {
        let mut s = Sample::new();
        for (k, v) in entries {
            s.discrete.insert(k.to_string(), *v);
        }
        s
    }

    fn regression() -> LinearGaussianCpd {
        // X = 1 + 2 P, noise variance 0.25
        LinearGaussianCpd::linear(
            "X",
            vec!["P".to_string()],
            1.0,
            [("P".to_string(), 2.0)].into_iter().collect(),
            0.25,
        )
        .unwrap()
    }

    fn switched() -> LinearGaussianCpd {
        let states = [
            (vec![0], GaussianParams { mean: 0.0, variance: 1.0 }),
            (vec![1], GaussianParams { mean: 5.0, variance: 2.0 }),
        ]
        .into_iter()
        .collect();
        LinearGaussianCpd::discrete_indexed(
            "X",
            vec!["D".to_string()],
            [("D".to_string(), 2)].into_iter().collect(),
            states,
        )
        .unwrap()
    }

    #[test]
    fn linear_rejects_nonpositive_variance() {
        let result = LinearGaussianCpd::linear("X", Vec::new(), 0.0, HashMap::new(), 0.0);
        assert!(matches!(result, Err(Error::Domain(_))));
    }

    #[test]
    fn linear_requires_every_coefficient() {
        let result =
            LinearGaussianCpd::linear("X", vec!["P".to_string()], 0.0, HashMap::new(), 1.0);
        assert!(matches!(result, Err(Error::Domain(_))));
    }

    #[test]
    fn continuous_mean_and_variance() {
        let cpd = regression();
        let parents = continuous_sample(&[("P", 3.0)]);

        assert!((cpd.mean(&parents).unwrap() - 7.0).abs() < 1e-12);
        assert!((cpd.variance(&parents).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn continuous_mean_rejects_missing_parent() {
        let cpd = regression();
        assert!(cpd.mean(&Sample::new()).is_err());
    }

    #[test]
    fn discrete_indexed_lookup() {
        let cpd = switched();

        let low = discrete_sample(&[("D", 0)]);
        assert!((cpd.mean(&low).unwrap() - 0.0).abs() < 1e-12);
        assert!((cpd.variance(&low).unwrap() - 1.0).abs() < 1e-12);

        let high = discrete_sample(&[("D", 1)]);
        assert!((cpd.mean(&high).unwrap() - 5.0).abs() < 1e-12);
        assert!((cpd.variance(&high).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn discrete_indexed_requires_every_configuration() {
        let states = [(vec![0], GaussianParams { mean: 0.0, variance: 1.0 })]
            .into_iter()
            .collect();
        let result = LinearGaussianCpd::discrete_indexed(
            "X",
            vec!["D".to_string()],
            [("D".to_string(), 2)].into_iter().collect(),
            states,
        );
        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn pdf_matches_normal_density() {
        let cpd = regression();
        let parents = continuous_sample(&[("P", 3.0)]);

        // at the mean of N(7, 0.25): 1 / (0.5 sqrt(2 pi))
        let p = cpd.pdf(7.0, &parents).unwrap();
        assert!((p - 0.7978845608028654).abs() < 1e-12);
    }

    #[test]
    fn sampling_is_reproducible_and_centered() {
        let cpd = switched();
        let parents = discrete_sample(&[("D", 1)]);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let draws: Vec<f64> = (0..2000)
            .map(|_| cpd.sample(&parents, &mut rng).unwrap())
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let again: Vec<f64> = (0..2000)
            .map(|_| cpd.sample(&parents, &mut rng).unwrap())
            .collect();
        assert_eq!(draws, again);

        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 5.0).abs() < 0.2, "sample mean {mean} far from 5");
    }

    #[test]
    fn to_factor_only_for_parentless_form() {
        let root = LinearGaussianCpd::linear("X", Vec::new(), 2.0, HashMap::new(), 0.5).unwrap();
        let phi = root.to_factor().unwrap();
        assert_eq!(phi.variables(), &["X"]);
        assert!((phi.mean("X").unwrap() - 2.0).abs() < 1e-12);
        assert!((phi.covariance("X", "X").unwrap() - 0.5).abs() < 1e-12);

        assert!(regression().to_factor().is_err());
        assert!(switched().to_factor().is_err());
    }
}
