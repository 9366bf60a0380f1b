//! Defines a `GaussianFactor`, a joint multivariate normal over a set of
//! continuous variables.
//!
//! The factor is parameterized by its moments `(mu, sigma)`. Canonical
//! (precision) form is not needed here: the mixed inference engine only
//! ever multiplies factors with disjoint scopes, for which the joint is
//! block diagonal. Multiplication of overlapping Gaussian factors fails
//! explicitly rather than guessing.

use std::collections::HashMap;
use std::f64::consts::PI;

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

/// Tolerance for the symmetry check on covariance matrices.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Pivots below this threshold mean a singular matrix.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// A multivariate normal distribution over named continuous variables.
#[derive(Clone, Debug)]
pub struct GaussianFactor {
    variables: Vec<String>,
    mean: Array1<f64>,
    covariance: Array2<f64>,
}

impl GaussianFactor {
    /// Create a new Gaussian factor.
    ///
    /// # Args
    /// * `variables`: the scope; mean and covariance rows follow this
    ///   order.
    /// * `mean`: the mean vector.
    /// * `covariance`: the covariance matrix. Symmetry is enforced within
    ///   1e-9; positive definiteness is required for density evaluation
    ///   and conditioning but is not checked here, since intermediate
    ///   factors produced during elimination may drift.
    ///
    /// # Errors
    /// * `Error::Shape` on an empty or duplicated scope, or dimension
    ///   mismatches.
    /// * `Error::Numerical` if the covariance matrix is not symmetric.
    pub fn new(
        variables: Vec<String>,
        mean: Array1<f64>,
        covariance: Array2<f64>,
    ) -> Result<Self> {
        if variables.is_empty() {
            return Err(Error::Shape(String::from(
                "Gaussian factor scope may not be empty",
            )));
        }
        let n = variables.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if variables[i] == variables[j] {
                    return Err(Error::Shape(format!(
                        "Gaussian factor scope contains {} twice",
                        variables[i]
                    )));
                }
            }
        }
        if mean.len() != n {
            return Err(Error::Shape(format!(
                "mean has {} entries for {} variables",
                mean.len(),
                n
            )));
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(Error::Shape(format!(
                "covariance has shape {:?}, expected [{n}, {n}]",
                covariance.shape()
            )));
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if (covariance[[i, j]] - covariance[[j, i]]).abs() > SYMMETRY_TOLERANCE {
                    return Err(Error::Numerical(format!(
                        "covariance matrix not symmetric between {} and {}",
                        variables[i], variables[j]
                    )));
                }
            }
        }

        Ok(GaussianFactor {
            variables,
            mean,
            covariance,
        })
    }

    /// Create a univariate Gaussian factor.
    pub fn univariate(variable: &str, mean: f64, variance: f64) -> Result<Self> {
        GaussianFactor::new(
            vec![variable.to_string()],
            Array1::from_vec(vec![mean]),
            Array2::from_shape_vec((1, 1), vec![variance]).expect("1x1 shape"),
        )
    }

    /// The scope of the factor.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Check whether a variable is in scope.
    pub fn contains(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    /// The mean of a variable in scope.
    pub fn mean(&self, variable: &str) -> Option<f64> {
        self.position(variable).map(|i| self.mean[i])
    }

    /// The covariance between two variables in scope.
    pub fn covariance(&self, a: &str, b: &str) -> Option<f64> {
        match (self.position(a), self.position(b)) {
            (Some(i), Some(j)) => Some(self.covariance[[i, j]]),
            _ => None,
        }
    }

    fn position(&self, variable: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    /// Marginalize out the given variables. For a Gaussian this is pure
    /// submatrix extraction: drop the corresponding rows and columns.
    ///
    /// # Errors
    /// * `Error::Domain` if every variable would be removed.
    pub fn marginalize(&self, variables: &[String]) -> Result<GaussianFactor> {
        let kept: Vec<usize> = (0..self.variables.len())
            .filter(|&i| !variables.contains(&self.variables[i]))
            .collect();

        if kept.is_empty() {
            return Err(Error::Domain(String::from(
                "cannot marginalize out every variable of a Gaussian factor",
            )));
        }

        let new_variables: Vec<String> =
            kept.iter().map(|&i| self.variables[i].clone()).collect();
        let new_mean = Array1::from_iter(kept.iter().map(|&i| self.mean[i]));
        let mut new_covariance = Array2::zeros((kept.len(), kept.len()));
        for (a, &i) in kept.iter().enumerate() {
            for (b, &j) in kept.iter().enumerate() {
                new_covariance[[a, b]] = self.covariance[[i, j]];
            }
        }

        GaussianFactor::new(new_variables, new_mean, new_covariance)
    }

    /// Condition the factor on observed values.
    ///
    /// With the scope split into unobserved (1) and observed (2) blocks,
    /// the conditional is again Gaussian with
    /// `mu_{1|2} = mu_1 + S_12 S_22^-1 (y - mu_2)` and
    /// `Sigma_{1|2} = S_11 - S_12 S_22^-1 S_21`. Evidence for variables
    /// outside the scope is ignored.
    ///
    /// # Errors
    /// * `Error::Domain` if every variable in scope is observed.
    /// * `Error::Numerical` if the observed covariance block is singular.
    pub fn reduce(&self, evidence: &HashMap<String, f64>) -> Result<GaussianFactor> {
        let (observed, unobserved): (Vec<usize>, Vec<usize>) =
            (0..self.variables.len()).partition(|&i| evidence.contains_key(&self.variables[i]));

        if observed.is_empty() {
            return Ok(self.clone());
        }
        if unobserved.is_empty() {
            return Err(Error::Domain(String::from(
                "every variable of the Gaussian factor is observed",
            )));
        }

        let mut sigma22 = Array2::zeros((observed.len(), observed.len()));
        for (a, &i) in observed.iter().enumerate() {
            for (b, &j) in observed.iter().enumerate() {
                sigma22[[a, b]] = self.covariance[[i, j]];
            }
        }
        let sigma22_inv = invert(&sigma22)?;

        // residual of the observed block
        let residual = Array1::from_iter(
            observed
                .iter()
                .map(|&j| evidence[&self.variables[j]] - self.mean[j]),
        );

        let n1 = unobserved.len();
        let mut new_mean = Array1::zeros(n1);
        for (a, &i) in unobserved.iter().enumerate() {
            let mut adjustment = 0.0;
            for (b, &j) in observed.iter().enumerate() {
                for (c, _) in observed.iter().enumerate() {
                    adjustment +=
                        self.covariance[[i, j]] * sigma22_inv[[b, c]] * residual[c];
                }
            }
            new_mean[a] = self.mean[i] + adjustment;
        }

        let mut new_covariance = Array2::zeros((n1, n1));
        for (a, &i) in unobserved.iter().enumerate() {
            for (b, &j) in unobserved.iter().enumerate() {
                let mut value = self.covariance[[i, j]];
                for (c, &k) in observed.iter().enumerate() {
                    for (d, &l) in observed.iter().enumerate() {
                        value -=
                            self.covariance[[i, k]] * sigma22_inv[[c, d]] * self.covariance[[l, j]];
                    }
                }
                new_covariance[[a, b]] = value;
            }
        }

        let new_variables: Vec<String> = unobserved
            .iter()
            .map(|&i| self.variables[i].clone())
            .collect();
        GaussianFactor::new(new_variables, new_mean, new_covariance)
    }

    /// Multiply with another Gaussian factor.
    ///
    /// Only the disjoint case is supported: the product of independent
    /// Gaussians is the block-diagonal joint with zero cross-covariance,
    /// emitted with variables in lexicographic order. The elimination
    /// order used by the mixed engine keeps its factors disjoint.
    ///
    /// # Errors
    /// * `Error::Numerical` if the scopes overlap.
    pub fn multiply(&self, other: &GaussianFactor) -> Result<GaussianFactor> {
        let shared: Vec<&String> = self
            .variables
            .iter()
            .filter(|v| other.contains(v))
            .collect();
        if !shared.is_empty() {
            return Err(Error::Numerical(format!(
                "multiplication of dependent Gaussian factors is not supported (shared: {})",
                shared
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let mut variables: Vec<String> = self
            .variables
            .iter()
            .chain(other.variables.iter())
            .cloned()
            .collect();
        variables.sort();

        let n = variables.len();
        let mut mean = Array1::zeros(n);
        let mut covariance = Array2::zeros((n, n));
        for (a, v) in variables.iter().enumerate() {
            mean[a] = self.mean(v).or_else(|| other.mean(v)).expect("v is in the union");
            for (b, w) in variables.iter().enumerate() {
                covariance[[a, b]] = self
                    .covariance(v, w)
                    .or_else(|| other.covariance(v, w))
                    .unwrap_or(0.0);
            }
        }

        GaussianFactor::new(variables, mean, covariance)
    }

    /// Evaluate the probability density at a point.
    ///
    /// # Errors
    /// * `Error::Domain` if a scope variable is missing a value.
    /// * `Error::Numerical` if the covariance matrix is singular or not
    ///   positive definite.
    pub fn pdf(&self, values: &HashMap<String, f64>) -> Result<f64> {
        let n = self.variables.len();
        let mut diff = Array1::zeros(n);
        for (i, v) in self.variables.iter().enumerate() {
            let value = values.get(v).ok_or_else(|| {
                Error::Domain(format!("missing value for variable {v}"))
            })?;
            diff[i] = value - self.mean[i];
        }

        let inverse = invert(&self.covariance)?;
        let mut quad_form = 0.0;
        for i in 0..n {
            for j in 0..n {
                quad_form += diff[i] * inverse[[i, j]] * diff[j];
            }
        }

        let det = determinant(&self.covariance);
        if det <= 0.0 {
            return Err(Error::Numerical(String::from(
                "covariance matrix not positive definite",
            )));
        }

        let norm = (2.0 * PI).powf(-(n as f64) / 2.0) * det.powf(-0.5);
        Ok(norm * (-0.5 * quad_form).exp())
    }
}

/// Invert a matrix by Gauss-Jordan elimination with partial pivoting.
pub(crate) fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let mut work = matrix.clone();
    let mut inverse = Array2::eye(n);

    for i in 0..n {
        let mut pivot_row = i;
        for k in (i + 1)..n {
            if work[[k, i]].abs() > work[[pivot_row, i]].abs() {
                pivot_row = k;
            }
        }
        if pivot_row != i {
            swap_rows(&mut work, i, pivot_row);
            swap_rows(&mut inverse, i, pivot_row);
        }

        let pivot = work[[i, i]];
        if pivot.abs() < PIVOT_TOLERANCE {
            return Err(Error::Numerical(String::from(
                "matrix is singular or nearly singular",
            )));
        }

        for j in 0..n {
            work[[i, j]] /= pivot;
            inverse[[i, j]] /= pivot;
        }
        for k in 0..n {
            if k == i {
                continue;
            }
            let scale = work[[k, i]];
            for j in 0..n {
                work[[k, j]] -= scale * work[[i, j]];
                inverse[[k, j]] -= scale * inverse[[i, j]];
            }
        }
    }

    Ok(inverse)
}

/// The determinant, by LU decomposition with partial pivoting. A pivot
/// below the singularity threshold yields zero.
pub(crate) fn determinant(matrix: &Array2<f64>) -> f64 {
    let n = matrix.nrows();
    let mut work = matrix.clone();
    let mut det = 1.0;

    for i in 0..n {
        let mut pivot_row = i;
        for k in (i + 1)..n {
            if work[[k, i]].abs() > work[[pivot_row, i]].abs() {
                pivot_row = k;
            }
        }
        if pivot_row != i {
            swap_rows(&mut work, i, pivot_row);
            det = -det;
        }

        if work[[i, i]].abs() < PIVOT_TOLERANCE {
            return 0.0;
        }
        det *= work[[i, i]];

        for k in (i + 1)..n {
            let scale = work[[k, i]] / work[[i, i]];
            for j in i..n {
                work[[k, j]] -= scale * work[[i, j]];
            }
        }
    }

    det
}

fn swap_rows(matrix: &mut Array2<f64>, a: usize, b: usize) {
    if a == b {
        return;
    }
    let cols = matrix.ncols();
    for j in 0..cols {
        let tmp = matrix[[a, j]];
        matrix[[a, j]] = matrix[[b, j]];
        matrix[[b, j]] = tmp;
    }
}
