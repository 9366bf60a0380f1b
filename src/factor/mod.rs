//! Definition of the factor module.
//!
//! A [`DiscreteFactor`] is a nonnegative function over an ordered tuple of
//! discrete variables, stored as a dense table. Factors are closed under
//! multiplication, marginalization and reduction; those three operations
//! drive all exact inference in this crate (Koller & Friedman, chapter 4).
//!
//! # Table layout
//!
//! The table is a flat array indexed by the stride convention
//! `idx = sum_i a_i * prod_{j>i} card[v_j]`, so the *last* variable in the
//! tuple varies fastest. CPD rows are laid out the same way, which is what
//! makes [`TabularCpd::to_factor`](cpd::TabularCpd::to_factor) a plain
//! copy. This layout is part of the crate's contract and is pinned by the
//! tests below.

pub mod cpd;
pub mod gaussian;
pub mod linear_gaussian;

pub use cpd::TabularCpd;
pub use gaussian::GaussianFactor;
pub use linear_gaussian::{GaussianParams, LinearGaussianCpd, LinearGaussianKind};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};

/// A dense factor over a set of discrete variables.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteFactor {
    /// The scope of the factor, as an ordered tuple of variable names.
    variables: Vec<String>,
    /// The number of states of each variable in scope.
    cardinality: BTreeMap<String, usize>,
    /// The table, in the stride layout described at module level.
    values: Vec<f64>,
}

impl DiscreteFactor {
    /// Create a new factor.
    ///
    /// A factor with an empty scope is a scalar and holds exactly one
    /// value. Factors do not self-normalize; normalization is explicit.
    ///
    /// # Args
    /// * `variables`: the scope, in table order.
    /// * `cardinality`: the state count of every variable in scope.
    /// * `values`: the table, of length `prod(cardinality)`.
    ///
    /// # Errors
    /// * `Error::Shape` if the scope contains duplicates, a cardinality is
    ///   missing or zero, or the table length does not match.
    /// * `Error::Domain` if any value is negative or not finite.
    pub fn new(
        variables: Vec<String>,
        cardinality: BTreeMap<String, usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let distinct: BTreeSet<&String> = variables.iter().collect();
        if distinct.len() != variables.len() {
            return Err(Error::Shape(String::from(
                "factor scope contains a duplicate variable",
            )));
        }

        let mut size = 1usize;
        for v in &variables {
            match cardinality.get(v) {
                Some(&card) if card > 0 => size *= card,
                Some(_) => {
                    return Err(Error::Shape(format!(
                        "variable {v} has zero cardinality"
                    )))
                }
                None => {
                    return Err(Error::Shape(format!(
                        "no cardinality given for variable {v}"
                    )))
                }
            }
        }

        if values.len() != size {
            return Err(Error::Shape(format!(
                "values length {} does not match expected size {}",
                values.len(),
                size
            )));
        }

        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::Domain(format!(
                "factor values must be finite, found {bad}"
            )));
        }
        if values.iter().any(|&v| v < 0.0) {
            return Err(Error::Domain(String::from(
                "factor values must be nonnegative",
            )));
        }

        Ok(DiscreteFactor {
            variables,
            cardinality,
            values,
        })
    }

    /// Create a scalar factor with no variables.
    pub fn scalar(value: f64) -> Result<Self> {
        DiscreteFactor::new(Vec::new(), BTreeMap::new(), vec![value])
    }

    /// The scope of the factor.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The cardinality of a variable in scope.
    pub fn cardinality(&self, variable: &str) -> Option<usize> {
        self.cardinality.get(variable).copied()
    }

    /// The raw table, in the stride layout.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `true` if the factor has an empty scope.
    pub fn is_scalar(&self) -> bool {
        self.variables.is_empty()
    }

    /// Check whether a variable is in scope.
    pub fn contains(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    /// The sum of all table entries.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// The value for a complete assignment to the scope of this factor.
    /// The assignment may cover variables outside the scope; those are
    /// ignored.
    ///
    /// # Errors
    /// * `Error::Domain` if a scope variable is missing from the
    ///   assignment or its state is out of range.
    pub fn value(&self, assignment: &HashMap<String, usize>) -> Result<f64> {
        let idx = self.index_of(assignment)?;
        Ok(self.values[idx])
    }

    /// The linear table index of a complete assignment to the scope.
    pub fn index_of(&self, assignment: &HashMap<String, usize>) -> Result<usize> {
        index_of(&self.variables, &self.cardinality, |v| {
            assignment.get(v).copied()
        })
    }

    /// Decode a linear table index back into a per-variable assignment.
    pub fn assignment_of(&self, mut index: usize) -> HashMap<String, usize> {
        let mut assignment = HashMap::with_capacity(self.variables.len());
        for v in self.variables.iter().rev() {
            let card = self.cardinality[v];
            assignment.insert(v.clone(), index % card);
            index /= card;
        }
        assignment
    }

    /// The factor product of `self` and `other`.
    ///
    /// The result's scope is the union of both scopes in lexicographic
    /// order; each entry is the product of the two projected operand
    /// entries (Koller & Friedman, definition 4.2). The operation is
    /// commutative and associative up to variable ordering, and the scopes
    /// need not overlap.
    ///
    /// # Errors
    /// * `Error::Shape` if the operands disagree on the cardinality of a
    ///   shared variable.
    pub fn multiply(&self, other: &DiscreteFactor) -> Result<DiscreteFactor> {
        let union: BTreeSet<&String> =
            self.variables.iter().chain(other.variables.iter()).collect();
        let variables: Vec<String> = union.into_iter().cloned().collect();

        let mut cardinality = self.cardinality.clone();
        for (v, &card) in &other.cardinality {
            match cardinality.get(v) {
                Some(&existing) if existing != card => {
                    return Err(Error::Shape(format!(
                        "cardinality mismatch for variable {v}: {existing} vs {card}"
                    )));
                }
                _ => {
                    cardinality.insert(v.clone(), card);
                }
            }
        }

        let cards: Vec<usize> = variables.iter().map(|v| cardinality[v]).collect();
        let size = cards.iter().product();
        let self_strides = projection_strides(&variables, &self.variables, &self.cardinality);
        let other_strides = projection_strides(&variables, &other.variables, &other.cardinality);

        let mut values = vec![0.0; size];
        let mut state = vec![0usize; variables.len()];
        for slot in values.iter_mut() {
            let mut self_idx = 0;
            let mut other_idx = 0;
            for (i, &s) in state.iter().enumerate() {
                self_idx += s * self_strides[i];
                other_idx += s * other_strides[i];
            }
            *slot = self.values[self_idx] * other.values[other_idx];
            advance(&mut state, &cards);
        }

        DiscreteFactor::new(variables, cardinality, values)
    }

    /// Sum the given variables out of the factor.
    ///
    /// Variables not in scope are ignored. Summing out every variable
    /// yields a scalar factor holding the total mass; the remaining scope
    /// is emitted in lexicographic order.
    pub fn marginalize(&self, variables: &[String]) -> Result<DiscreteFactor> {
        self.eliminate(variables, 0.0, |acc, v| acc + v)
    }

    /// Max the given variables out of the factor. Same shape as
    /// [`DiscreteFactor::marginalize`] with max aggregation, used for MAP
    /// queries.
    pub fn max_marginalize(&self, variables: &[String]) -> Result<DiscreteFactor> {
        self.eliminate(variables, f64::NEG_INFINITY, f64::max)
    }

    fn eliminate(
        &self,
        variables: &[String],
        init: f64,
        combine: fn(f64, f64) -> f64,
    ) -> Result<DiscreteFactor> {
        let removed: BTreeSet<&String> = variables.iter().collect();
        let kept: BTreeSet<&String> = self
            .variables
            .iter()
            .filter(|v| !removed.contains(v))
            .collect();

        if kept.is_empty() {
            let total = self.values.iter().copied().fold(init, combine);
            return DiscreteFactor::scalar(total);
        }

        let new_variables: Vec<String> = kept.into_iter().cloned().collect();
        let new_cardinality: BTreeMap<String, usize> = new_variables
            .iter()
            .map(|v| (v.clone(), self.cardinality[v]))
            .collect();
        let size = new_variables.iter().map(|v| new_cardinality[v]).product();

        // stride of each of our variables inside the new table; removed
        // variables get stride zero and collapse onto the same cell
        let target_strides =
            projection_strides(&self.variables, &new_variables, &new_cardinality);
        let cards: Vec<usize> = self.variables.iter().map(|v| self.cardinality[v]).collect();

        let mut values = vec![init; size];
        let mut state = vec![0usize; self.variables.len()];
        for &value in &self.values {
            let mut new_idx = 0;
            for (i, &s) in state.iter().enumerate() {
                new_idx += s * target_strides[i];
            }
            values[new_idx] = combine(values[new_idx], value);
            advance(&mut state, &cards);
        }

        DiscreteFactor::new(new_variables, new_cardinality, values)
    }

    /// Reduce the factor by fixing evidence variables to observed states
    /// and dropping them from the scope. Evidence for variables outside the
    /// scope is ignored; the relative order of the remaining variables is
    /// preserved.
    ///
    /// # Errors
    /// * `Error::Domain` if an evidence state is out of range for a scope
    ///   variable.
    pub fn reduce(&self, evidence: &HashMap<String, usize>) -> Result<DiscreteFactor> {
        for (v, &state) in evidence {
            if let Some(&card) = self.cardinality.get(v) {
                if state >= card {
                    return Err(Error::Domain(format!(
                        "evidence state {state} out of range for variable {v} with cardinality {card}"
                    )));
                }
            }
        }

        let new_variables: Vec<String> = self
            .variables
            .iter()
            .filter(|v| !evidence.contains_key(*v))
            .cloned()
            .collect();

        // the offset contributed by the fixed evidence states
        let base = index_of(&self.variables, &self.cardinality, |v| {
            Some(evidence.get(v).copied().unwrap_or(0))
        })?;

        if new_variables.is_empty() {
            return DiscreteFactor::scalar(self.values[base]);
        }

        let new_cardinality: BTreeMap<String, usize> = new_variables
            .iter()
            .map(|v| (v.clone(), self.cardinality[v]))
            .collect();
        let cards: Vec<usize> = new_variables.iter().map(|v| new_cardinality[v]).collect();
        let size = cards.iter().product();

        let own_strides = strides(&self.variables, &self.cardinality);
        let kept_strides: Vec<usize> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| !evidence.contains_key(*v))
            .map(|(i, _)| own_strides[i])
            .collect();

        let mut values = vec![0.0; size];
        let mut state = vec![0usize; new_variables.len()];
        for slot in values.iter_mut() {
            let mut old_idx = base;
            for (i, &s) in state.iter().enumerate() {
                old_idx += s * kept_strides[i];
            }
            *slot = self.values[old_idx];
            advance(&mut state, &cards);
        }

        DiscreteFactor::new(new_variables, new_cardinality, values)
    }

    /// Rescale the table in place so it sums to one.
    ///
    /// # Errors
    /// * `Error::Domain` if the table sums to zero.
    pub fn normalize(&mut self) -> Result<()> {
        let total = self.sum();
        if total == 0.0 {
            return Err(Error::Domain(String::from(
                "cannot normalize a factor whose values sum to zero",
            )));
        }
        for v in self.values.iter_mut() {
            *v /= total;
        }
        Ok(())
    }
}

/// The table strides of `variables` under `cardinality`: the last variable
/// has stride one.
fn strides(variables: &[String], cardinality: &BTreeMap<String, usize>) -> Vec<usize> {
    let mut strides = vec![1usize; variables.len()];
    for i in (0..variables.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * cardinality[&variables[i + 1]];
    }
    strides
}

/// For each variable of `outer`, its stride inside the table of `inner`
/// (zero when the variable does not appear in `inner`). Lets a single pass
/// over `outer`'s assignment space project indices into `inner`.
fn projection_strides(
    outer: &[String],
    inner: &[String],
    inner_cardinality: &BTreeMap<String, usize>,
) -> Vec<usize> {
    let inner_strides = strides(inner, inner_cardinality);
    outer
        .iter()
        .map(|v| {
            inner
                .iter()
                .position(|w| w == v)
                .map_or(0, |p| inner_strides[p])
        })
        .collect()
}

/// Advance an odometer over the given cardinalities, last position fastest.
/// Returns `false` once the odometer wraps around.
fn advance(state: &mut [usize], cards: &[usize]) -> bool {
    for i in (0..state.len()).rev() {
        state[i] += 1;
        if state[i] < cards[i] {
            return true;
        }
        state[i] = 0;
    }
    false
}

fn index_of<F>(
    variables: &[String],
    cardinality: &BTreeMap<String, usize>,
    lookup: F,
) -> Result<usize>
where
    F: Fn(&str) -> Option<usize>,
{
    let mut idx = 0;
    let mut stride = 1;
    for v in variables.iter().rev() {
        let card = cardinality[v];
        let state = lookup(v).ok_or_else(|| {
            Error::Domain(format!("missing state for variable {v}"))
        })?;
        if state >= card {
            return Err(Error::Domain(format!(
                "state {state} out of range for variable {v} with cardinality {card}"
            )));
        }
        idx += state * stride;
        stride *= card;
    }
    Ok(idx)
}
