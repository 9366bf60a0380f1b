//! Defines a `TabularCpd`, a conditional probability distribution over a
//! discrete variable given discrete parents.
//!
//! The table holds one row per parent configuration; row `r` is the
//! distribution of the variable given the parent assignment whose stride
//! index over the declared parent order is `r`. This is the same stride
//! convention the factor tables use, which makes the conversion to a
//! [`DiscreteFactor`] the single bridge from the model to the inference
//! engine.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::factor::DiscreteFactor;

/// Tolerance on the sum of each CPD row.
const ROW_SUM_TOLERANCE: f64 = 1e-3;

/// A conditional probability distribution in tabular form.
#[derive(Clone, Debug, PartialEq)]
pub struct TabularCpd {
    variable: String,
    variable_card: usize,
    parents: Vec<String>,
    parent_card: BTreeMap<String, usize>,
    /// `rows[r][s] = P(variable = s | parent configuration r)`.
    rows: Vec<Vec<f64>>,
}

impl TabularCpd {
    /// Create a new tabular CPD.
    ///
    /// # Args
    /// * `variable`: the child variable.
    /// * `variable_card`: its state count.
    /// * `rows`: one row per parent configuration, indexed by the stride
    ///   over `parents` in declared order; each row has `variable_card`
    ///   probabilities.
    /// * `parents`: the parent variables, in declared order.
    /// * `parent_card`: the state count of every parent.
    ///
    /// # Errors
    /// * `Error::Shape` if the row count or a row length is wrong, a
    ///   parent cardinality is missing, or the parents are malformed.
    /// * `Error::Domain` if any row does not sum to one within 1e-3.
    pub fn new(
        variable: &str,
        variable_card: usize,
        rows: Vec<Vec<f64>>,
        parents: Vec<String>,
        parent_card: BTreeMap<String, usize>,
    ) -> Result<Self> {
        if variable_card == 0 {
            return Err(Error::Shape(format!(
                "variable {variable} must have at least one state"
            )));
        }
        if parents.iter().any(|p| p == variable) {
            return Err(Error::Shape(format!(
                "variable {variable} cannot be its own parent"
            )));
        }
        for i in 0..parents.len() {
            for j in (i + 1)..parents.len() {
                if parents[i] == parents[j] {
                    return Err(Error::Shape(format!(
                        "parent {} of {variable} declared twice",
                        parents[i]
                    )));
                }
            }
        }

        let mut expected_rows = 1usize;
        for p in &parents {
            match parent_card.get(p) {
                Some(&card) if card > 0 => expected_rows *= card,
                _ => {
                    return Err(Error::Shape(format!(
                        "no cardinality given for parent {p} of {variable}"
                    )))
                }
            }
        }

        if rows.len() != expected_rows {
            return Err(Error::Shape(format!(
                "CPD of {variable} has {} rows, expected {expected_rows}",
                rows.len()
            )));
        }

        for (r, row) in rows.iter().enumerate() {
            if row.len() != variable_card {
                return Err(Error::Shape(format!(
                    "row {r} of CPD of {variable} has {} entries, expected {variable_card}",
                    row.len()
                )));
            }
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(Error::Domain(format!(
                    "row {r} of CPD of {variable} sums to {sum}, expected 1"
                )));
            }
        }

        Ok(TabularCpd {
            variable: variable.to_string(),
            variable_card,
            parents,
            parent_card,
            rows,
        })
    }

    /// The child variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// The child variable's state count.
    pub fn variable_card(&self) -> usize {
        self.variable_card
    }

    /// The parent variables, in declared order.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// The state count of a parent.
    pub fn parent_card(&self, parent: &str) -> Option<usize> {
        self.parent_card.get(parent).copied()
    }

    /// The raw rows of the table.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// The row index for a parent assignment, using the stride over the
    /// declared parent order.
    ///
    /// # Errors
    /// * `Error::Domain` if a parent is missing from the assignment or its
    ///   state is out of range.
    pub fn row_index(&self, evidence: &HashMap<String, usize>) -> Result<usize> {
        let mut idx = 0;
        let mut stride = 1;
        for p in self.parents.iter().rev() {
            let card = self.parent_card[p];
            let state = *evidence.get(p).ok_or_else(|| {
                Error::Domain(format!(
                    "missing evidence for parent {p} of {}",
                    self.variable
                ))
            })?;
            if state >= card {
                return Err(Error::Domain(format!(
                    "state {state} out of range for parent {p} with cardinality {card}"
                )));
            }
            idx += state * stride;
            stride *= card;
        }
        Ok(idx)
    }

    /// `P(variable = var_state | evidence)` by direct lookup.
    pub fn value(&self, var_state: usize, evidence: &HashMap<String, usize>) -> Result<f64> {
        if var_state >= self.variable_card {
            return Err(Error::Domain(format!(
                "state {var_state} out of range for variable {} with cardinality {}",
                self.variable, self.variable_card
            )));
        }
        let row = self.row_index(evidence)?;
        Ok(self.rows[row][var_state])
    }

    /// Convert the CPD into a discrete factor over
    /// `sort(parents + variable)`, placing each table entry into the
    /// canonical stride layout.
    pub fn to_factor(&self) -> Result<DiscreteFactor> {
        let mut variables: Vec<String> = self.parents.clone();
        variables.push(self.variable.clone());
        variables.sort();

        let mut cardinality = self.parent_card.clone();
        cardinality.insert(self.variable.clone(), self.variable_card);

        let cards: Vec<usize> = variables.iter().map(|v| cardinality[v]).collect();
        let size = cards.iter().product();

        let mut values = vec![0.0; size];
        let mut assignment: HashMap<String, usize> =
            variables.iter().map(|v| (v.clone(), 0)).collect();
        let mut state = vec![0usize; variables.len()];
        for slot in values.iter_mut() {
            for (i, v) in variables.iter().enumerate() {
                assignment.insert(v.clone(), state[i]);
            }
            let row = self.row_index(&assignment)?;
            let col = assignment[&self.variable];
            *slot = self.rows[row][col];

            // odometer over the factor's scope, last variable fastest
            for i in (0..state.len()).rev() {
                state[i] += 1;
                if state[i] < cards[i] {
                    break;
                }
                state[i] = 0;
            }
        }

        DiscreteFactor::new(variables, cardinality, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(entries: &[(&str, usize)]) -> BTreeMap<String, usize> {
        entries.iter().map(|(v, c)| (v.to_string(), *c)).collect()
    }

    fn assignment(states: &[(&str, usize)]) -> HashMap<String, usize> {
        states.iter().map(|(v, s)| (v.to_string(), *s)).collect()
    }

    #[test]
    fn new_validates_row_count() {
        let result = TabularCpd::new(
            "S",
            2,
            vec![vec![0.5, 0.5]],
            vec!["C".to_string()],
            card(&[("C", 2)]),
        );
        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn new_validates_row_sum() {
        let result = TabularCpd::new(
            "S",
            2,
            vec![vec![0.5, 0.6], vec![0.9, 0.1]],
            vec!["C".to_string()],
            card(&[("C", 2)]),
        );
        assert!(matches!(result, Err(Error::Domain(_))));
    }

    #[test]
    fn new_accepts_row_sum_within_tolerance() {
        let cpd = TabularCpd::new(
            "S",
            2,
            vec![vec![0.5004, 0.5], vec![0.9, 0.1]],
            vec!["C".to_string()],
            card(&[("C", 2)]),
        );
        assert!(cpd.is_ok());
    }

    #[test]
    fn value_looks_up_row_by_stride() {
        // rows indexed by (C, D) with D fastest
        let cpd = TabularCpd::new(
            "X",
            2,
            vec![
                vec![0.9, 0.1],
                vec![0.8, 0.2],
                vec![0.3, 0.7],
                vec![0.4, 0.6],
            ],
            vec!["C".to_string(), "D".to_string()],
            card(&[("C", 2), ("D", 2)]),
        )
        .unwrap();

        let p = cpd.value(1, &assignment(&[("C", 1), ("D", 0)])).unwrap();
        assert!((p - 0.7).abs() < 1e-12);
        let p = cpd.value(0, &assignment(&[("C", 0), ("D", 1)])).unwrap();
        assert!((p - 0.8).abs() < 1e-12);
    }

    #[test]
    fn value_rejects_missing_evidence() {
        let cpd = TabularCpd::new(
            "S",
            2,
            vec![vec![0.5, 0.5], vec![0.9, 0.1]],
            vec!["C".to_string()],
            card(&[("C", 2)]),
        )
        .unwrap();

        assert!(cpd.value(0, &assignment(&[])).is_err());
        assert!(cpd.value(0, &assignment(&[("C", 5)])).is_err());
        assert!(cpd.value(7, &assignment(&[("C", 0)])).is_err());
    }

    #[test]
    fn to_factor_preserves_entries() {
        let cpd = TabularCpd::new(
            "S",
            2,
            vec![vec![0.5, 0.5], vec![0.9, 0.1]],
            vec!["C".to_string()],
            card(&[("C", 2)]),
        )
        .unwrap();

        let phi = cpd.to_factor().unwrap();
        assert_eq!(phi.variables(), &["C", "S"]);
        // (c, s) cell holds rows[c][s]
        assert_eq!(phi.values(), &[0.5, 0.5, 0.9, 0.1]);
    }

    #[test]
    fn to_factor_sorts_scope() {
        // the child sorts before its parent here, so the factor layout is
        // a transposition of the CPD rows
        let cpd = TabularCpd::new(
            "A",
            2,
            vec![vec![0.2, 0.8], vec![0.6, 0.4]],
            vec!["B".to_string()],
            card(&[("B", 2)]),
        )
        .unwrap();

        let phi = cpd.to_factor().unwrap();
        assert_eq!(phi.variables(), &["A", "B"]);
        // (a, b) cell holds rows[b][a]
        assert_eq!(phi.values(), &[0.2, 0.6, 0.8, 0.4]);
    }

    #[test]
    fn to_factor_without_parents() {
        let cpd =
            TabularCpd::new("A", 3, vec![vec![0.2, 0.3, 0.5]], Vec::new(), card(&[])).unwrap();

        let phi = cpd.to_factor().unwrap();
        assert_eq!(phi.variables(), &["A"]);
        assert_eq!(phi.values(), &[0.2, 0.3, 0.5]);
    }
}
