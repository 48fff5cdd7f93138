//! Two-sample Kolmogorov–Smirnov test.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Result of a two-sample KS test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample KS test, two-sided. NaN values are ignored.
///
/// The p-value uses the asymptotic Kolmogorov distribution evaluated at
/// `(en + 0.12 + 0.11 / en) * D` with `en = sqrt(n1 * n2 / (n1 + n2))`.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Result<KsResult, MlError> {
    let mut a: Vec<f64> = a.iter().copied().filter(|v| !v.is_nan()).collect();
    let mut b: Vec<f64> = b.iter().copied().filter(|v| !v.is_nan()).collect();
    if a.is_empty() || b.is_empty() {
        return Err(MlError::invalid_input(
            "KS test needs at least one value in each sample",
        ));
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let statistic = ks_statistic(&a, &b);
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let p_value = kolmogorov_sf((en + 0.12 + 0.11 / en) * statistic);

    Ok(KsResult { statistic, p_value })
}

/// Supremum distance between the empirical CDFs of two sorted samples.
/// Ties advance both samples together.
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }
    d
}

/// Survival function of the Kolmogorov distribution, `P(K > z)`.
pub fn kolmogorov_sf(z: f64) -> f64 {
    if z <= 0.0 {
        return 1.0;
    }
    let cdf = if z < 1.18 {
        // sqrt(2π)/z · Σ exp(-(2k-1)²π²/(8z²)), first four terms.
        let y = (-std::f64::consts::PI.powi(2) / (8.0 * z * z)).exp();
        (2.0 * std::f64::consts::PI).sqrt() / z * (y + y.powi(9) + y.powi(25) + y.powi(49))
    } else {
        let x = (-2.0 * z * z).exp();
        1.0 - 2.0 * (x - x.powi(4) + x.powi(9))
    };
    (1.0 - cdf).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_samples() {
        let a: Vec<f64> = (0..50).map(|i| (i % 5) as f64).collect();
        let r = ks_2samp(&a, &a).unwrap();
        assert_eq!(r.statistic, 0.0);
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_disjoint_samples() {
        let a: Vec<f64> = (0..100).map(f64::from).collect();
        let b: Vec<f64> = (1000..1100).map(f64::from).collect();
        let r = ks_2samp(&a, &b).unwrap();
        assert_eq!(r.statistic, 1.0);
        assert!(r.p_value < 1e-10);
    }

    #[test]
    fn test_statistic_with_ties() {
        let r = ks_2samp(&[1.0, 2.0, 2.0, 3.0], &[2.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((r.statistic - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_kolmogorov_sf_reference_points() {
        // P(K > 1.3581) ≈ 0.05, P(K > 1.2238) ≈ 0.10
        assert!((kolmogorov_sf(1.3581) - 0.05).abs() < 1e-3);
        assert!((kolmogorov_sf(1.2238) - 0.10).abs() < 1e-3);
        assert!(kolmogorov_sf(0.3) > 0.99);
    }

    #[test]
    fn test_empty_sample_is_error() {
        assert!(ks_2samp(&[], &[1.0]).is_err());
    }

    proptest! {
        #[test]
        fn prop_p_value_in_unit_interval(
            a in prop::collection::vec(-1e3f64..1e3, 1..60),
            b in prop::collection::vec(-1e3f64..1e3, 1..60),
        ) {
            let r = ks_2samp(&a, &b).unwrap();
            prop_assert!((0.0..=1.0).contains(&r.p_value));
            prop_assert!((0.0..=1.0).contains(&r.statistic));
        }
    }
}
