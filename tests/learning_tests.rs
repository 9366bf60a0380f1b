//! End-to-end learning scenarios: parameter fitting from simulated data
//! and structure recovery with the PC algorithm.

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use bayou::factor::{LinearGaussianKind, TabularCpd};
use bayou::model::{BayesianNetwork, Cpd};
use bayou::{DiscreteSample, PcEstimator, Sample};

fn tabular(
    variable: &str,
    card: usize,
    rows: Vec<Vec<f64>>,
    parents: &[(&str, usize)],
) -> Cpd {
    Cpd::Tabular(
        TabularCpd::new(
            variable,
            card,
            rows,
            parents.iter().map(|(p, _)| p.to_string()).collect(),
            parents
                .iter()
                .map(|(p, c)| (p.to_string(), *c))
                .collect::<BTreeMap<_, _>>(),
        )
        .unwrap(),
    )
}

fn sample(entries: &[(&str, usize)]) -> DiscreteSample {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Pearl's sprinkler network.
fn sprinkler() -> BayesianNetwork {
    let mut bn = BayesianNetwork::new(&[
        ("Cloudy", "Sprinkler"),
        ("Cloudy", "Rain"),
        ("Sprinkler", "WetGrass"),
        ("Rain", "WetGrass"),
    ])
    .unwrap();

    bn.add_cpd(tabular("Cloudy", 2, vec![vec![0.5, 0.5]], &[])).unwrap();
    bn.add_cpd(tabular(
        "Sprinkler",
        2,
        vec![vec![0.5, 0.5], vec![0.9, 0.1]],
        &[("Cloudy", 2)],
    ))
    .unwrap();
    bn.add_cpd(tabular(
        "Rain",
        2,
        vec![vec![0.8, 0.2], vec![0.2, 0.8]],
        &[("Cloudy", 2)],
    ))
    .unwrap();
    // parents declared in sorted order so the rows line up with what
    // fitting produces; the table is symmetric in its two causes
    bn.add_cpd(tabular(
        "WetGrass",
        2,
        vec![
            vec![1.0, 0.0],
            vec![0.1, 0.9],
            vec![0.1, 0.9],
            vec![0.01, 0.99],
        ],
        &[("Rain", 2), ("Sprinkler", 2)],
    ))
    .unwrap();
    bn
}

#[test]
fn fit_recovers_simulated_cpds() {
    let truth = sprinkler();
    let data = truth.simulate(10000, 2024).unwrap();

    let mut learned = BayesianNetwork::new(&[
        ("Cloudy", "Sprinkler"),
        ("Cloudy", "Rain"),
        ("Sprinkler", "WetGrass"),
        ("Rain", "WetGrass"),
    ])
    .unwrap();
    learned.fit(&data).unwrap();

    // every learned cell within 0.05 of the truth; Laplace smoothing
    // biases the extreme rows slightly
    for node in truth.nodes() {
        let expected = truth.tabular_cpd(&node).unwrap();
        let actual = learned.tabular_cpd(&node).unwrap();
        assert_eq!(expected.parents(), actual.parents());

        for (row_e, row_a) in expected.rows().iter().zip(actual.rows()) {
            for (e, a) in row_e.iter().zip(row_a) {
                assert!(
                    (e - a).abs() < 0.05,
                    "{node}: learned {a} vs true {e}"
                );
            }
        }
    }
}

#[test]
fn fitted_model_answers_queries_like_the_truth() {
    let truth = sprinkler();
    let data = truth.simulate(10000, 7).unwrap();

    let mut learned = BayesianNetwork::new(&[
        ("Cloudy", "Sprinkler"),
        ("Cloudy", "Rain"),
        ("Sprinkler", "WetGrass"),
        ("Rain", "WetGrass"),
    ])
    .unwrap();
    learned.fit(&data).unwrap();

    let engine = bayou::VariableElimination::new(&learned).unwrap();
    let posterior = engine
        .query(&["WetGrass"], &DiscreteSample::new())
        .unwrap();
    assert!(
        (posterior.values()[1] - 0.6471).abs() < 0.02,
        "learned P(WetGrass = 1) = {}",
        posterior.values()[1]
    );
}

#[test]
fn linear_regression_fit_recovers_the_line() {
    // Y = 2 X + 5 + noise, sigma = 0.1
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    let data: Vec<Sample> = (0..100)
        .map(|i| {
            let x = i as f64 / 10.0;
            // Box-Muller from two uniforms keeps the test free of
            // distribution helpers
            let (u1, u2): (f64, f64) = (rng.gen(), rng.gen());
            let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            let mut s = Sample::new();
            s.continuous.insert("X".to_string(), x);
            s.continuous.insert("Y".to_string(), 2.0 * x + 5.0 + 0.1 * noise);
            s
        })
        .collect();

    let mut bn = BayesianNetwork::new(&[("X", "Y")]).unwrap();
    bn.fit_mixed(&data).unwrap();

    let cpd = bn.gaussian_cpd("Y").unwrap();
    let LinearGaussianKind::Continuous {
        intercept,
        coefficients,
        variance,
    } = cpd.kind()
    else {
        panic!("expected the continuous regression form");
    };

    assert!((intercept - 5.0).abs() < 0.5, "intercept {intercept}");
    assert!(
        (coefficients["X"] - 2.0).abs() < 0.5,
        "slope {}",
        coefficients["X"]
    );
    assert!(*variance < 0.1, "residual variance {variance}");
}

#[test]
fn pc_removes_independent_edges() {
    // a uniform joint over two independent binary variables
    let mut data = Vec::new();
    for a in 0..2 {
        for b in 0..2 {
            data.extend(std::iter::repeat(sample(&[("A", a), ("B", b)])).take(250));
        }
    }

    let dag = PcEstimator::new(&data).estimate().unwrap();
    assert!(dag.edges().is_empty(), "edges: {:?}", dag.edges());
}

#[test]
fn pc_orients_the_collider() {
    // A -> C <- B with C = A or B
    let data: Vec<DiscreteSample> = (0..1000)
        .map(|i| {
            let a = i % 2;
            let b = (i / 2) % 2;
            sample(&[("A", a), ("B", b), ("C", a | b)])
        })
        .collect();

    let dag = PcEstimator::new(&data).estimate().unwrap();
    assert!(dag.has_edge("A", "C"), "edges: {:?}", dag.edges());
    assert!(dag.has_edge("B", "C"), "edges: {:?}", dag.edges());
    assert_eq!(dag.edges().len(), 2);
}

#[test]
fn pc_then_fit_then_query_round_trip() {
    // learn structure and parameters of the collider from scratch, then
    // reason with the result
    let data: Vec<DiscreteSample> = (0..1000)
        .map(|i| {
            let a = i % 2;
            let b = (i / 2) % 2;
            sample(&[("A", a), ("B", b), ("C", a | b)])
        })
        .collect();

    let dag = PcEstimator::new(&data).estimate().unwrap();
    let mut bn = BayesianNetwork::from_dag(dag);
    bn.fit(&data).unwrap();
    bn.check_model().unwrap();

    let engine = bayou::VariableElimination::new(&bn).unwrap();
    let posterior = engine
        .query(&["C"], &sample(&[("A", 1)]))
        .unwrap();
    // with A = 1 the OR is certain up to smoothing
    assert!(posterior.values()[1] > 0.95);
}

#[test]
fn pc_on_sampled_sprinkler_data_keeps_wet_grass_downstream() {
    let truth = sprinkler();
    let data = truth.simulate(5000, 5150).unwrap();

    let dag = PcEstimator::new(&data).estimate().unwrap();

    // the two causes of WetGrass must stay adjacent to it, and WetGrass
    // must not come out as anyone's parent
    assert!(dag.has_edge("Sprinkler", "WetGrass") || dag.has_edge("Rain", "WetGrass"));
    assert!(dag.children("WetGrass").is_empty(), "edges: {:?}", dag.edges());
}
