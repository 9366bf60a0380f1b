//! The PC algorithm for structure learning.
//!
//! Four phases over integer-valued data (Spirtes, Glymour & Scheines):
//!
//! 1. *Skeleton discovery.* Starting from the complete undirected graph,
//!    remove every edge whose endpoints test conditionally independent
//!    given some subset of the first endpoint's other neighbors, growing
//!    the conditioning-set size until a pass removes nothing.
//! 2. *V-structures.* Unshielded triples `x - z - y` whose separating set
//!    excludes `z` become colliders `x -> z <- y`.
//! 3. *Meek rules.* R1 through R4 applied to a fixed point propagate
//!    orientations that avoid new colliders and cycles.
//! 4. *Final orientation.* Whatever is still undirected is oriented from
//!    the lexicographically smaller endpoint, yielding a total DAG.
//!
//! Node iteration, subset generation and tie-breaking are all
//! deterministic, so the same data always yields the same graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;
use tracing::debug;

use crate::data::DiscreteSample;
use crate::error::Result;
use crate::estimators::independence::chi_square_test;
use crate::graph::{Dag, UndirectedGraph};

/// Default significance level for the independence tests.
const DEFAULT_ALPHA: f64 = 0.05;

/// Separating sets recorded per unordered node pair.
type SeparatingSets = HashMap<(String, String), Vec<String>>;

/// A constraint-based structure learner over discrete data.
pub struct PcEstimator<'a> {
    data: &'a [DiscreteSample],
    variables: Vec<String>,
    cardinality: HashMap<String, usize>,
    alpha: f64,
}

impl<'a> PcEstimator<'a> {
    /// Create an estimator over the given data.
    ///
    /// The variable universe and the cardinalities (largest observed
    /// state plus one) are inferred from the data.
    pub fn new(data: &'a [DiscreteSample]) -> Self {
        let mut cardinality: HashMap<String, usize> = HashMap::new();
        for sample in data {
            for (variable, &state) in sample {
                let entry = cardinality.entry(variable.clone()).or_insert(0);
                *entry = (*entry).max(state + 1);
            }
        }

        let mut variables: Vec<String> = cardinality.keys().cloned().collect();
        variables.sort();

        PcEstimator {
            data,
            variables,
            cardinality,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Override the significance level (default 0.05).
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Learn a DAG from the data.
    pub fn estimate(&self) -> Result<Dag> {
        let (skeleton, separating_sets) = self.learn_skeleton();
        debug!(edges = skeleton.edges().len(), "skeleton discovered");
        Ok(self.orient_edges(&skeleton, &separating_sets))
    }

    /// Phase 1: prune the complete graph by conditional independence
    /// tests of growing order.
    fn learn_skeleton(&self) -> (UndirectedGraph, SeparatingSets) {
        let mut skeleton = UndirectedGraph::new();
        for v in &self.variables {
            skeleton.add_node(v);
        }
        for i in 0..self.variables.len() {
            for j in (i + 1)..self.variables.len() {
                skeleton.add_edge(&self.variables[i], &self.variables[j]);
            }
        }

        let mut separating_sets = SeparatingSets::new();
        let max_order = self.variables.len().saturating_sub(2);

        for order in 0..=max_order {
            let mut removed = 0usize;

            for x in &self.variables {
                for y in skeleton.neighbors(x) {
                    if !skeleton.has_edge(x, &y) {
                        // removed earlier in this pass
                        continue;
                    }

                    let pool: Vec<String> = skeleton
                        .neighbors(x)
                        .into_iter()
                        .filter(|n| *n != y)
                        .collect();
                    if pool.len() < order {
                        continue;
                    }

                    for conditioning in pool.iter().cloned().combinations(order) {
                        let (_, p_value) = chi_square_test(
                            self.data,
                            x,
                            &y,
                            &conditioning,
                            &self.cardinality,
                        );

                        if p_value > self.alpha {
                            debug!(x = %x, y = %y, ?conditioning, p_value, "edge removed");
                            skeleton.remove_edge(x, &y);
                            separating_sets
                                .insert(unordered(x, &y), conditioning.clone());
                            removed += 1;
                            break;
                        }
                    }
                }
            }

            if order >= 1 && removed == 0 {
                break;
            }
        }

        (skeleton, separating_sets)
    }

    /// Phases 2 through 4: orient v-structures, propagate with the Meek
    /// rules, then orient the rest lexicographically.
    fn orient_edges(
        &self,
        skeleton: &UndirectedGraph,
        separating_sets: &SeparatingSets,
    ) -> Dag {
        let mut oriented: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut unoriented: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for v in &self.variables {
            oriented.insert(v.clone(), BTreeSet::new());
            unoriented.insert(v.clone(), BTreeSet::new());
        }
        for (a, b) in skeleton.edges() {
            unoriented.get_mut(&a).expect("known node").insert(b.clone());
            unoriented.get_mut(&b).expect("known node").insert(a.clone());
        }

        // v-structures: for every unshielded triple x - z - y, collide on
        // z unless z separated the pair
        for z in &self.variables {
            let neighbors = skeleton.neighbors(z);
            for (i, x) in neighbors.iter().enumerate() {
                for y in neighbors.iter().skip(i + 1) {
                    if skeleton.has_edge(x, y) {
                        continue;
                    }
                    let separated_by_z = separating_sets
                        .get(&unordered(x, y))
                        .map_or(false, |set| set.contains(z));
                    if !separated_by_z {
                        debug!(x = %x, z = %z, y = %y, "v-structure");
                        orient(x, z, &mut oriented, &mut unoriented);
                        orient(y, z, &mut oriented, &mut unoriented);
                    }
                }
            }
        }

        // Meek rules to a fixed point
        loop {
            let mut changed = false;
            changed |= self.meek_rule_1(skeleton, &mut oriented, &mut unoriented);
            changed |= self.meek_rule_2(&mut oriented, &mut unoriented);
            changed |= self.meek_rule_3(skeleton, &mut oriented, &mut unoriented);
            changed |= self.meek_rule_4(skeleton, &mut oriented, &mut unoriented);
            if !changed {
                break;
            }
        }

        let mut dag = Dag::new();
        for v in &self.variables {
            dag.add_node(v);
        }
        for (parent, children) in &oriented {
            for child in children {
                if dag.add_edge(parent, child).is_err() {
                    // conflicting orientations cannot all be honored in a
                    // DAG; keep the first and stay acyclic
                    debug!(parent = %parent, child = %child, "dropping cyclic orientation");
                }
            }
        }

        // whatever is left gets a deterministic direction
        for (a, neighbors) in &unoriented {
            for b in neighbors {
                if a < b && !dag.has_edge(a, b) && !dag.has_edge(b, a) {
                    let _ = dag.add_edge(a, b);
                }
            }
        }

        dag
    }

    /// R1: `k -> i` and `i - j` with `k`, `j` non-adjacent orients
    /// `i -> j`.
    fn meek_rule_1(
        &self,
        skeleton: &UndirectedGraph,
        oriented: &mut BTreeMap<String, BTreeSet<String>>,
        unoriented: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> bool {
        let mut changed = false;
        for (i, j) in undirected_pairs(unoriented) {
            if !is_unoriented(unoriented, &i, &j) {
                continue;
            }
            let trigger = oriented.iter().any(|(k, children)| {
                *k != j && children.contains(&i) && !skeleton.has_edge(k, &j)
            });
            if trigger {
                orient(&i, &j, oriented, unoriented);
                changed = true;
            }
        }
        changed
    }

    /// R2: a chain `i -> k -> j` with `i - j` orients `i -> j`.
    fn meek_rule_2(
        &self,
        oriented: &mut BTreeMap<String, BTreeSet<String>>,
        unoriented: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> bool {
        let mut changed = false;
        for (i, j) in undirected_pairs(unoriented) {
            if !is_unoriented(unoriented, &i, &j) {
                continue;
            }
            let trigger = oriented[&i]
                .iter()
                .any(|k| k != &j && oriented[k].contains(&j));
            if trigger {
                orient(&i, &j, oriented, unoriented);
                changed = true;
            }
        }
        changed
    }

    /// R3: `i - k -> j` and `i - l -> j` with `k`, `l` non-adjacent
    /// orients `i -> j`.
    fn meek_rule_3(
        &self,
        skeleton: &UndirectedGraph,
        oriented: &mut BTreeMap<String, BTreeSet<String>>,
        unoriented: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> bool {
        let mut changed = false;
        for (i, j) in undirected_pairs(unoriented) {
            if !is_unoriented(unoriented, &i, &j) {
                continue;
            }
            let candidates: Vec<String> = unoriented[&i]
                .iter()
                .filter(|k| *k != &j && oriented[*k].contains(&j))
                .cloned()
                .collect();

            let trigger = candidates.iter().enumerate().any(|(a, k)| {
                candidates
                    .iter()
                    .skip(a + 1)
                    .any(|l| !skeleton.has_edge(k, l))
            });
            if trigger {
                orient(&i, &j, oriented, unoriented);
                changed = true;
            }
        }
        changed
    }

    /// R4: `i - k` with `k -> l -> j` and `k`, `j` non-adjacent orients
    /// `i -> j`.
    fn meek_rule_4(
        &self,
        skeleton: &UndirectedGraph,
        oriented: &mut BTreeMap<String, BTreeSet<String>>,
        unoriented: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> bool {
        let mut changed = false;
        for (i, j) in undirected_pairs(unoriented) {
            if !is_unoriented(unoriented, &i, &j) {
                continue;
            }
            let trigger = unoriented[&i].iter().any(|k| {
                k != &j
                    && !skeleton.has_edge(k, &j)
                    && oriented[k]
                        .iter()
                        .any(|l| l != &j && oriented[l].contains(&j))
            });
            if trigger {
                orient(&i, &j, oriented, unoriented);
                changed = true;
            }
        }
        changed
    }
}

fn unordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn is_unoriented(
    unoriented: &BTreeMap<String, BTreeSet<String>>,
    a: &str,
    b: &str,
) -> bool {
    unoriented.get(a).map_or(false, |s| s.contains(b))
}

/// Snapshot of the currently undirected pairs, both directions, in
/// deterministic order.
fn undirected_pairs(
    unoriented: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (a, neighbors) in unoriented {
        for b in neighbors {
            pairs.push((a.clone(), b.clone()));
        }
    }
    pairs
}

/// Direct `parent -> child`, removing the undirected edge.
fn orient(
    parent: &str,
    child: &str,
    oriented: &mut BTreeMap<String, BTreeSet<String>>,
    unoriented: &mut BTreeMap<String, BTreeSet<String>>,
) {
    oriented
        .get_mut(parent)
        .expect("known node")
        .insert(child.to_string());
    if let Some(set) = unoriented.get_mut(parent) {
        set.remove(child);
    }
    if let Some(set) = unoriented.get_mut(child) {
        set.remove(parent);
    }
}
