//! Parameter learning for Bayesian networks.
//!
//! Discrete CPDs are estimated by counting parent-configuration and state
//! co-occurrences with Laplace smoothing (Koller & Friedman, section
//! 17.2, plus the +1 prior). Continuous CPDs over continuous parents are
//! estimated by ordinary least squares through the normal equations.
//! Fitting replaces whatever CPDs the network carried; rows with missing
//! values are skipped for the CPDs they cannot inform.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::data::{DiscreteSample, Sample};
use crate::error::{Error, Result};
use crate::factor::{LinearGaussianCpd, TabularCpd};
use crate::model::{BayesianNetwork, Cpd};

/// Floor applied to learned residual variances.
const VARIANCE_FLOOR: f64 = 1e-6;

impl BayesianNetwork {
    /// Learn every CPD of an all-discrete network from data, replacing the
    /// current CPDs.
    ///
    /// Cardinalities are inferred from the data as the largest observed
    /// state plus one.
    ///
    /// # Errors
    /// * `Error::Domain` if the network carries continuous CPDs.
    /// * `Error::Data` if a node or one of its parents never appears in
    ///   the data.
    pub fn fit(&mut self, data: &[DiscreteSample]) -> Result<()> {
        if self.nodes().iter().any(|n| self.is_continuous(n)) {
            return Err(Error::Domain(String::from(
                "network contains continuous variables, use fit_mixed",
            )));
        }

        for node in self.nodes() {
            let cpd = self.learn_tabular_cpd(&node, |i| &data[i], data.len())?;
            debug!(node = %node, rows = cpd.rows().len(), "fitted tabular CPD");
            self.add_cpd(Cpd::Tabular(cpd))?;
        }
        Ok(())
    }

    /// Learn every CPD of a mixed network from data, replacing the current
    /// CPDs.
    ///
    /// A node is treated as discrete when its current CPD is tabular or,
    /// lacking a CPD, when the data holds integer observations for it;
    /// otherwise it is treated as continuous and fitted by least squares.
    ///
    /// # Errors
    /// * `Error::Data` if a node never appears in the data, a regression
    ///   has too few complete rows (`n <= p + 1`), or a continuous node
    ///   has discrete parents (not supported).
    /// * `Error::Numerical` if the normal equations are singular.
    pub fn fit_mixed(&mut self, data: &[Sample]) -> Result<()> {
        for node in self.nodes() {
            let has_discrete_data = data.iter().any(|s| s.discrete.contains_key(&node));
            let has_continuous_data = data.iter().any(|s| s.continuous.contains_key(&node));

            let discrete = if self.cpd(&node).is_some() {
                self.is_discrete(&node)
            } else if has_discrete_data {
                true
            } else if has_continuous_data {
                false
            } else {
                return Err(Error::Data(format!("no data for variable {node}")));
            };

            if discrete {
                let cpd =
                    self.learn_tabular_cpd(&node, |i| &data[i].discrete, data.len())?;
                debug!(node = %node, rows = cpd.rows().len(), "fitted tabular CPD");
                self.add_cpd(Cpd::Tabular(cpd))?;
            } else {
                let cpd = self.learn_gaussian_cpd(&node, data)?;
                debug!(node = %node, "fitted linear-Gaussian CPD");
                self.add_cpd(Cpd::LinearGaussian(cpd))?;
            }
        }
        Ok(())
    }

    fn learn_tabular_cpd<'a, F>(
        &self,
        node: &str,
        row_at: F,
        n_rows: usize,
    ) -> Result<TabularCpd>
    where
        F: Fn(usize) -> &'a DiscreteSample,
    {
        let parents = self.dag().parents(node);

        // cardinalities are the largest observed state plus one
        let mut node_card = 0usize;
        let mut parent_card: BTreeMap<String, usize> = BTreeMap::new();
        for i in 0..n_rows {
            let sample = row_at(i);
            if let Some(&state) = sample.get(node) {
                node_card = node_card.max(state + 1);
            }
            for p in &parents {
                if let Some(&state) = sample.get(p) {
                    let entry = parent_card.entry(p.clone()).or_insert(0);
                    *entry = (*entry).max(state + 1);
                }
            }
        }

        if node_card == 0 {
            return Err(Error::Data(format!("no data for variable {node}")));
        }
        for p in &parents {
            if !parent_card.contains_key(p) {
                return Err(Error::Data(format!(
                    "no data for parent {p} of {node}"
                )));
            }
        }

        let n_configs: usize = parents.iter().map(|p| parent_card[p]).product();
        let mut counts = vec![vec![0.0f64; node_card]; n_configs];

        for i in 0..n_rows {
            let sample = row_at(i);
            let Some(&state) = sample.get(node) else { continue };

            // rows with a missing parent value cannot inform this CPD
            let mut config = 0usize;
            let mut stride = 1usize;
            let mut complete = true;
            for p in parents.iter().rev() {
                match sample.get(p) {
                    Some(&s) => {
                        config += s * stride;
                        stride *= parent_card[p];
                    }
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                counts[config][state] += 1.0;
            }
        }

        // Laplace smoothing, then normalize each configuration row
        let rows: Vec<Vec<f64>> = counts
            .into_iter()
            .map(|mut row| {
                for cell in row.iter_mut() {
                    *cell += 1.0;
                }
                let total: f64 = row.iter().sum();
                row.into_iter().map(|c| c / total).collect()
            })
            .collect();

        TabularCpd::new(node, node_card, rows, parents, parent_card)
    }

    fn learn_gaussian_cpd(&self, node: &str, data: &[Sample]) -> Result<LinearGaussianCpd> {
        let parents = self.dag().parents(node);

        if parents.is_empty() {
            // empirical mean and variance
            let values: Vec<f64> = data
                .iter()
                .filter_map(|s| s.continuous.get(node).copied())
                .collect();
            if values.is_empty() {
                return Err(Error::Data(format!("no data for variable {node}")));
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = (values.iter().map(|v| v * v).sum::<f64>() / n - mean * mean)
                .max(VARIANCE_FLOOR);
            return LinearGaussianCpd::linear(
                node,
                Vec::new(),
                mean,
                Default::default(),
                variance,
            );
        }

        for p in &parents {
            let parent_is_discrete = self.is_discrete(p)
                || data.iter().any(|s| s.discrete.contains_key(p));
            if parent_is_discrete {
                return Err(Error::Data(format!(
                    "learning a Gaussian CPD for {node} with discrete parent {p} is not supported"
                )));
            }
        }

        // complete rows only: the response and every parent observed
        let mut responses: Vec<f64> = Vec::new();
        let mut design_rows: Vec<Vec<f64>> = Vec::new();
        for sample in data {
            let Some(&x) = sample.continuous.get(node) else { continue };
            let mut row = Vec::with_capacity(parents.len() + 1);
            row.push(1.0);
            let mut complete = true;
            for p in &parents {
                match sample.continuous.get(p) {
                    Some(&v) => row.push(v),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                responses.push(x);
                design_rows.push(row);
            }
        }

        let n = responses.len();
        let p = parents.len();
        if n <= p + 1 {
            return Err(Error::Data(format!(
                "insufficient data for the regression of {node}: {n} complete rows for {p} parents"
            )));
        }

        let beta = solve_normal_equations(&design_rows, &responses)?;
        let intercept = beta[0];
        let coefficients = parents
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), beta[i + 1]))
            .collect();

        let mut rss = 0.0;
        for (row, &x) in design_rows.iter().zip(&responses) {
            let predicted: f64 = row.iter().zip(beta.iter()).map(|(a, b)| a * b).sum();
            let residual = x - predicted;
            rss += residual * residual;
        }
        let variance = (rss / n as f64).max(VARIANCE_FLOOR);

        LinearGaussianCpd::linear(node, parents, intercept, coefficients, variance)
    }
}

/// Solve `(Y^T Y) beta = Y^T x` by Gaussian elimination with partial
/// pivoting on the augmented system.
fn solve_normal_equations(design: &[Vec<f64>], response: &[f64]) -> Result<Vec<f64>> {
    let n = design.len();
    let p = design[0].len();

    let mut yty = Array2::zeros((p, p));
    for i in 0..p {
        for j in 0..p {
            let mut sum = 0.0;
            for k in 0..n {
                sum += design[k][i] * design[k][j];
            }
            yty[[i, j]] = sum;
        }
    }

    let mut ytx = Array1::zeros(p);
    for i in 0..p {
        let mut sum = 0.0;
        for k in 0..n {
            sum += design[k][i] * response[k];
        }
        ytx[i] = sum;
    }

    // forward elimination on the augmented matrix
    for i in 0..p {
        let mut pivot_row = i;
        for k in (i + 1)..p {
            if yty[[k, i]].abs() > yty[[pivot_row, i]].abs() {
                pivot_row = k;
            }
        }
        if pivot_row != i {
            for j in 0..p {
                let tmp = yty[[i, j]];
                yty[[i, j]] = yty[[pivot_row, j]];
                yty[[pivot_row, j]] = tmp;
            }
            ytx.swap(i, pivot_row);
        }

        if yty[[i, i]].abs() < 1e-10 {
            return Err(Error::Numerical(String::from(
                "singular matrix in linear regression",
            )));
        }

        for k in (i + 1)..p {
            let scale = yty[[k, i]] / yty[[i, i]];
            for j in i..p {
                yty[[k, j]] -= scale * yty[[i, j]];
            }
            ytx[k] -= scale * ytx[i];
        }
    }

    // back substitution
    let mut beta = vec![0.0; p];
    for i in (0..p).rev() {
        let mut value = ytx[i];
        for j in (i + 1)..p {
            value -= yty[[i, j]] * beta[j];
        }
        beta[i] = value / yty[[i, i]];
    }
    Ok(beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::LinearGaussianKind;

    fn discrete_row(entries: &[(&str, usize)]) -> DiscreteSample {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn continuous_row(entries: &[(&str, f64)]) -> Sample {
        let mut s = Sample::new();
        for (k, v) in entries {
            s.continuous.insert(k.to_string(), *v);
        }
        s
    }

    #[test]
    fn fit_counts_with_laplace_smoothing() {
        let mut bn = BayesianNetwork::new(&[("A", "B")]).unwrap();

        // 30 rows of (A=0, B=0), 10 of (A=0, B=1), 60 of (A=1, B=1)
        let mut data = Vec::new();
        data.extend(std::iter::repeat(discrete_row(&[("A", 0), ("B", 0)])).take(30));
        data.extend(std::iter::repeat(discrete_row(&[("A", 0), ("B", 1)])).take(10));
        data.extend(std::iter::repeat(discrete_row(&[("A", 1), ("B", 1)])).take(60));

        bn.fit(&data).unwrap();

        let a = bn.tabular_cpd("A").unwrap();
        // (40 + 1) / 102 and (60 + 1) / 102
        assert!((a.rows()[0][0] - 41.0 / 102.0).abs() < 1e-9);
        assert!((a.rows()[0][1] - 61.0 / 102.0).abs() < 1e-9);

        let b = bn.tabular_cpd("B").unwrap();
        assert_eq!(b.parents(), &["A"]);
        // row A=0: (31, 11) / 42; row A=1: (1, 61) / 62
        assert!((b.rows()[0][0] - 31.0 / 42.0).abs() < 1e-9);
        assert!((b.rows()[1][1] - 61.0 / 62.0).abs() < 1e-9);
    }

    #[test]
    fn fit_skips_rows_with_holes() {
        let mut bn = BayesianNetwork::new(&[("A", "B")]).unwrap();

        let mut data = Vec::new();
        data.extend(std::iter::repeat(discrete_row(&[("A", 0), ("B", 0)])).take(10));
        data.extend(std::iter::repeat(discrete_row(&[("A", 1), ("B", 1)])).take(10));
        // rows missing A inform neither CPD row of B, but still count for B's card
        data.push(discrete_row(&[("B", 1)]));

        bn.fit(&data).unwrap();
        let b = bn.tabular_cpd("B").unwrap();
        // row A=0 saw 10 zeros: (11, 1) / 12
        assert!((b.rows()[0][0] - 11.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn fit_rejects_unseen_variables() {
        let mut bn = BayesianNetwork::new(&[("A", "B")]).unwrap();
        let data = vec![discrete_row(&[("A", 0)])];
        assert!(matches!(bn.fit(&data), Err(Error::Data(_))));
    }

    #[test]
    fn fit_mixed_learns_regression_coefficients() {
        let mut bn = BayesianNetwork::new(&[("X", "Y")]).unwrap();

        // Y = 2 X + 5, exactly
        let data: Vec<Sample> = (0..100)
            .map(|i| {
                let x = i as f64 / 10.0;
                continuous_row(&[("X", x), ("Y", 2.0 * x + 5.0)])
            })
            .collect();

        bn.fit_mixed(&data).unwrap();
        let cpd = bn.gaussian_cpd("Y").unwrap();
        let LinearGaussianKind::Continuous {
            intercept,
            coefficients,
            variance,
        } = cpd.kind()
        else {
            panic!("expected the continuous form");
        };

        assert!((intercept - 5.0).abs() < 1e-6, "intercept {intercept}");
        assert!((coefficients["X"] - 2.0).abs() < 1e-6);
        // noiseless fit bottoms out at the variance floor
        assert!((variance - VARIANCE_FLOOR).abs() < 1e-9);

        let x_cpd = bn.gaussian_cpd("X").unwrap();
        let LinearGaussianKind::Continuous { intercept, .. } = x_cpd.kind() else {
            panic!("expected the continuous form");
        };
        // empirical mean of 0, 0.1, ..., 9.9
        assert!((intercept - 4.95).abs() < 1e-9);
    }

    #[test]
    fn fit_mixed_requires_enough_rows() {
        let mut bn = BayesianNetwork::new(&[("X", "Y")]).unwrap();
        let data = vec![
            continuous_row(&[("X", 0.0), ("Y", 5.0)]),
            continuous_row(&[("X", 1.0), ("Y", 7.0)]),
        ];
        assert!(matches!(bn.fit_mixed(&data), Err(Error::Data(_))));
    }

    #[test]
    fn fit_mixed_rejects_discrete_parents_of_continuous_nodes() {
        let mut bn = BayesianNetwork::new(&[("D", "X")]).unwrap();
        let mut data = Vec::new();
        for i in 0..10 {
            let mut s = Sample::new();
            s.discrete.insert("D".to_string(), i % 2);
            s.continuous.insert("X".to_string(), i as f64);
            data.push(s);
        }
        assert!(matches!(bn.fit_mixed(&data), Err(Error::Data(_))));
    }

    #[test]
    fn solve_normal_equations_reports_singularity() {
        // two identical columns
        let design = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]];
        let response = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            solve_normal_equations(&design, &response),
            Err(Error::Numerical(_))
        ));
    }
}
