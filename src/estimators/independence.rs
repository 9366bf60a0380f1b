//! Statistical independence tests.
//!
//! The workhorse is [`chi_square_test`], the conditional chi-square test
//! of independence the PC learner runs on every candidate edge. Its
//! p-value comes from the regularized lower incomplete gamma function,
//! computed by series expansion below `x = a + 1` and by Lentz's
//! continued fraction above it, with `ln Gamma` from the Lanczos
//! approximation (Numerical Recipes, section 6.2). Pearson and partial
//! correlation with Fisher's Z round out the module for continuous data.

use std::collections::HashMap;

use crate::data::DiscreteSample;

/// Strata with fewer observations than this are skipped, the usual
/// mitigation for sparse contingency tables.
const MIN_STRATUM_COUNT: f64 = 5.0;

/// Conditional chi-square test of `x` independent of `y` given `z`.
///
/// Builds a three-dimensional contingency table over the states of `x`,
/// the states of `y` and the joint state of `z`, accumulating the
/// statistic per stratum of `z`. Rows missing any of the tested variables
/// are skipped; strata with fewer than five observations are skipped. If
/// every stratum is skipped the statistic is zero and the p-value is one.
///
/// # Args
/// * `data`: the observations.
/// * `x`, `y`: the variables under test.
/// * `z`: the conditioning set; empty for a marginal test.
/// * `cardinality`: state counts of all involved variables.
///
/// # Returns
/// The chi-square statistic and its p-value under
/// `df = (|x| - 1)(|y| - 1) * prod |z_i|`.
pub fn chi_square_test(
    data: &[DiscreteSample],
    x: &str,
    y: &str,
    z: &[String],
    cardinality: &HashMap<String, usize>,
) -> (f64, f64) {
    let x_card = cardinality.get(x).copied().unwrap_or(0);
    let y_card = cardinality.get(y).copied().unwrap_or(0);
    let z_card: usize = z
        .iter()
        .map(|v| cardinality.get(v).copied().unwrap_or(0))
        .product();

    if x_card == 0 || y_card == 0 || z_card == 0 {
        return (0.0, 1.0);
    }

    // counts[x][y][z], flattened
    let mut counts = vec![0.0f64; x_card * y_card * z_card];
    let mut stratum_totals = vec![0.0f64; z_card];

    'rows: for sample in data {
        let (Some(&x_val), Some(&y_val)) = (sample.get(x), sample.get(y)) else {
            continue;
        };
        if x_val >= x_card || y_val >= y_card {
            continue;
        }

        let mut z_idx = 0usize;
        let mut stride = 1usize;
        for v in z.iter().rev() {
            let Some(&z_val) = sample.get(v) else {
                continue 'rows;
            };
            if z_val >= cardinality[v] {
                continue 'rows;
            }
            z_idx += z_val * stride;
            stride *= cardinality[v];
        }

        counts[(x_val * y_card + y_val) * z_card + z_idx] += 1.0;
        stratum_totals[z_idx] += 1.0;
    }

    let mut chi_square = 0.0;
    for k in 0..z_card {
        if stratum_totals[k] < MIN_STRATUM_COUNT {
            continue;
        }

        let mut x_marginal = vec![0.0f64; x_card];
        let mut y_marginal = vec![0.0f64; y_card];
        for i in 0..x_card {
            for j in 0..y_card {
                let c = counts[(i * y_card + j) * z_card + k];
                x_marginal[i] += c;
                y_marginal[j] += c;
            }
        }

        for i in 0..x_card {
            for j in 0..y_card {
                let expected = x_marginal[i] * y_marginal[j] / stratum_totals[k];
                if expected > 0.0 {
                    let observed = counts[(i * y_card + j) * z_card + k];
                    let diff = observed - expected;
                    chi_square += diff * diff / expected;
                }
            }
        }
    }

    let df = ((x_card - 1) * (y_card - 1) * z_card) as f64;
    (chi_square, chi_square_p_value(chi_square, df))
}

/// The upper-tail p-value of a chi-square statistic with `df` degrees of
/// freedom, `P(X > chi_square) = 1 - P(df/2, chi_square/2)`, clamped to
/// `[0, 1]` against float drift in the gamma routines.
pub fn chi_square_p_value(chi_square: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return 1.0;
    }
    if chi_square > 1000.0 {
        return 0.0;
    }
    if chi_square < 1e-3 {
        return 1.0;
    }

    let p = 1.0 - regularized_gamma_p(df / 2.0, chi_square / 2.0);
    p.clamp(0.0, 1.0)
}

/// The regularized lower incomplete gamma function `P(a, x)`.
fn regularized_gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_continued_fraction(a, x)
    }
}

/// `P(a, x)` by series expansion, for `x < a + 1`.
fn gamma_series(a: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 1e-10;

    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut term = sum;

    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }

    sum * (-x + a * x.ln() - log_gamma(a)).exp()
}

/// `Q(a, x) = 1 - P(a, x)` by Lentz's continued fraction, for
/// `x >= a + 1`.
fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 1e-10;
    const FPMIN: f64 = 1e-30;

    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;

    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    (-x + a * x.ln() - log_gamma(a)).exp() * h
}

/// `ln Gamma(x)` by the Lanczos approximation, with the reflection
/// formula below one half.
fn log_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Gamma(1 - x) Gamma(x) = pi / sin(pi x)
        return std::f64::consts::PI.ln() - (std::f64::consts::PI * x).sin().ln()
            - log_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let base = x + G + 0.5;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }

    sum.ln() + (2.0 * std::f64::consts::PI).sqrt().ln() - base + (x + 0.5) * base.ln()
}

/// Pearson correlation coefficient of two equally long series. Returns
/// zero for degenerate input.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        numerator += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    if denom_x == 0.0 || denom_y == 0.0 {
        return 0.0;
    }
    numerator / (denom_x * denom_y).sqrt()
}

/// Partial correlation of two columns given conditioning columns, by the
/// standard recursion on the conditioning set. The result is clamped to
/// `[-1, 1]`; degenerate denominators yield zero.
pub fn partial_correlation(
    data: &[Vec<f64>],
    x_idx: usize,
    y_idx: usize,
    z_idxs: &[usize],
) -> f64 {
    let column = |idx: usize| -> Vec<f64> { data.iter().map(|row| row[idx]).collect() };

    match z_idxs {
        [] => pearson_correlation(&column(x_idx), &column(y_idx)),
        [z_idx] => {
            let r_xy = pearson_correlation(&column(x_idx), &column(y_idx));
            let r_xz = pearson_correlation(&column(x_idx), &column(*z_idx));
            let r_yz = pearson_correlation(&column(y_idx), &column(*z_idx));

            let denominator = ((1.0 - r_xz * r_xz) * (1.0 - r_yz * r_yz)).sqrt();
            if denominator == 0.0 {
                return 0.0;
            }
            (r_xy - r_xz * r_yz) / denominator
        }
        [rest @ .., last] => {
            let r_xy = partial_correlation(data, x_idx, y_idx, rest);
            let r_xl = partial_correlation(data, x_idx, *last, rest);
            let r_yl = partial_correlation(data, y_idx, *last, rest);

            let denominator = ((1.0 - r_xl * r_xl) * (1.0 - r_yl * r_yl)).sqrt();
            if denominator == 0.0 || denominator.is_nan() {
                return 0.0;
            }
            let result = (r_xy - r_xl * r_yl) / denominator;
            if result.is_nan() || result.is_infinite() {
                return 0.0;
            }
            result.clamp(-1.0, 1.0)
        }
    }
}

/// Fisher's Z-test p-value for a (partial) correlation coefficient.
///
/// # Args
/// * `correlation`: the observed coefficient.
/// * `sample_size`: the number of rows it was computed from.
/// * `num_cond_vars`: the size of the conditioning set.
pub fn fisher_z(correlation: f64, sample_size: usize, num_cond_vars: usize) -> f64 {
    let adjusted_n = sample_size as f64 - num_cond_vars as f64 - 3.0;
    if adjusted_n <= 0.0 {
        return 1.0;
    }

    let r = correlation.clamp(-0.9999, 0.9999);
    let z = 0.5 * ((1.0 + r) / (1.0 - r)).ln();
    let statistic = z.abs() * adjusted_n.sqrt();

    2.0 * (1.0 - standard_normal_cdf(statistic))
}

/// The standard normal CDF through the error function.
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(entries: &[(&str, usize)]) -> DiscreteSample {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn card(entries: &[(&str, usize)]) -> HashMap<String, usize> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn log_gamma_matches_factorials() {
        // Gamma(5) = 24, Gamma(1) = 1
        assert!((log_gamma(5.0) - 24.0f64.ln()).abs() < 1e-10);
        assert!(log_gamma(1.0).abs() < 1e-10);
        // Gamma(1/2) = sqrt(pi)
        assert!((log_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn regularized_gamma_matches_erf_identity() {
        // P(1/2, x) = erf(sqrt(x))
        assert!((regularized_gamma_p(0.5, 1.0) - 0.8427007929497149).abs() < 1e-7);
        // P(1, x) = 1 - exp(-x)
        let x = 2.5f64;
        assert!((regularized_gamma_p(1.0, x) - (1.0 - (-x).exp())).abs() < 1e-9);
    }

    #[test]
    fn chi_square_p_value_pins_critical_values() {
        // the classic 0.05 critical value at one degree of freedom
        let p = chi_square_p_value(3.841458820694124, 1.0);
        assert!((p - 0.05).abs() < 1e-4, "p = {p}");

        assert_eq!(chi_square_p_value(0.0, 1.0), 1.0);
        assert_eq!(chi_square_p_value(2000.0, 1.0), 0.0);
        assert_eq!(chi_square_p_value(10.0, 0.0), 1.0);
    }

    #[test]
    fn chi_square_detects_independence() {
        // exactly balanced counts over two independent binary variables
        let mut data = Vec::new();
        for a in 0..2 {
            for b in 0..2 {
                data.extend(std::iter::repeat(sample(&[("A", a), ("B", b)])).take(250));
            }
        }

        let (statistic, p) =
            chi_square_test(&data, "A", "B", &[], &card(&[("A", 2), ("B", 2)]));
        assert!(statistic.abs() < 1e-9);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn chi_square_detects_dependence() {
        // B copies A
        let mut data = Vec::new();
        for a in 0..2 {
            data.extend(std::iter::repeat(sample(&[("A", a), ("B", a)])).take(500));
        }

        let (statistic, p) =
            chi_square_test(&data, "A", "B", &[], &card(&[("A", 2), ("B", 2)]));
        assert!(statistic > 500.0);
        assert!(p < 1e-6);
    }

    #[test]
    fn chi_square_conditional_blocks_common_cause() {
        // C drives A exactly and B three times out of four, so A and B
        // are dependent marginally but independent given C
        let mut data = Vec::new();
        for c in 0..2 {
            data.extend(std::iter::repeat(sample(&[("A", c), ("B", c), ("C", c)])).take(375));
            data.extend(
                std::iter::repeat(sample(&[("A", c), ("B", 1 - c), ("C", c)])).take(125),
            );
        }
        let cards = card(&[("A", 2), ("B", 2), ("C", 2)]);

        let (_, p_marginal) = chi_square_test(&data, "A", "B", &[], &cards);
        assert!(p_marginal < 1e-6);

        let (statistic, p_conditional) =
            chi_square_test(&data, "A", "B", &["C".to_string()], &cards);
        assert!(statistic.abs() < 1e-9);
        assert_eq!(p_conditional, 1.0);
    }

    #[test]
    fn chi_square_skips_sparse_strata() {
        // four observations total, all in one stratum
        let data = vec![
            sample(&[("A", 0), ("B", 0), ("C", 0)]),
            sample(&[("A", 1), ("B", 1), ("C", 0)]),
            sample(&[("A", 0), ("B", 1), ("C", 0)]),
            sample(&[("A", 1), ("B", 0), ("C", 0)]),
        ];

        let (statistic, p) = chi_square_test(
            &data,
            "A",
            "B",
            &["C".to_string()],
            &card(&[("A", 2), ("B", 2), ("C", 2)]),
        );
        assert_eq!(statistic, 0.0);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn pearson_correlation_on_linear_series() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
        let neg: Vec<f64> = x.iter().map(|v| -2.0 * v).collect();

        assert!((pearson_correlation(&x, &y) - 1.0).abs() < 1e-9);
        assert!((pearson_correlation(&x, &neg) + 1.0).abs() < 1e-9);

        let constant = vec![1.0; 50];
        assert_eq!(pearson_correlation(&x, &constant), 0.0);
    }

    #[test]
    fn partial_correlation_removes_the_common_driver() {
        // X and Y are both Z plus independent wiggles; conditioning on Z
        // should collapse the correlation
        let mut data = Vec::new();
        for i in 0..200 {
            let z = i as f64;
            let wiggle_x = ((i * 7) % 13) as f64;
            let wiggle_y = ((i * 11) % 17) as f64;
            data.push(vec![z + wiggle_x, z + wiggle_y, z]);
        }

        let marginal = partial_correlation(&data, 0, 1, &[]);
        assert!(marginal > 0.9);

        let conditional = partial_correlation(&data, 0, 1, &[2]);
        assert!(conditional.abs() < 0.2, "conditional = {conditional}");
    }

    #[test]
    fn fisher_z_separates_strong_from_null() {
        assert!(fisher_z(0.9, 100, 0) < 1e-6);
        assert!(fisher_z(0.01, 100, 0) > 0.5);
        // too few samples for the conditioning set
        assert_eq!(fisher_z(0.9, 4, 2), 1.0);
    }

    #[test]
    fn normal_cdf_matches_reference_values() {
        assert!((standard_normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((standard_normal_cdf(1.0) - 0.8413447460685429).abs() < 1e-12);
        assert!((standard_normal_cdf(-1.0) - 0.15865525393145707).abs() < 1e-12);
        assert!((standard_normal_cdf(1.959963984540054) - 0.975).abs() < 1e-12);
    }
}
