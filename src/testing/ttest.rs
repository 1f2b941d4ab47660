//! Welch two-sample t-test cross-check.
//!
//! Runs alongside the primary NB Wald test on the same normalized counts.
//! The result is for validation only and never enters the multiple-testing
//! correction. A gene needs at least two distinct values in each group for
//! the test to be defined; otherwise the result is `None`.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Two-sided Welch t-test p-value, or `None` when either group lacks two
/// distinct values.
pub fn welch_p_value(x: &[f64], y: &[f64]) -> Option<f64> {
    if !has_two_distinct(x) || !has_two_distinct(y) {
        return None;
    }

    let (mean_x, var_x) = mean_var(x);
    let (mean_y, var_y) = mean_var(y);
    let n_x = x.len() as f64;
    let n_y = y.len() as f64;

    let term_x = var_x / n_x;
    let term_y = var_y / n_y;
    let se2 = term_x + term_y;
    if se2 <= 0.0 || !se2.is_finite() {
        return None;
    }

    let t = (mean_x - mean_y) / se2.sqrt();
    // Welch-Satterthwaite degrees of freedom.
    let df = se2 * se2
        / (term_x * term_x / (n_x - 1.0) + term_y * term_y / (n_y - 1.0));
    if !t.is_finite() || !df.is_finite() || df <= 0.0 {
        return None;
    }

    // Normal approximation is indistinguishable at large df and avoids the
    // t-distribution construction cost per gene.
    let p = if df > 100.0 {
        let normal = Normal::new(0.0, 1.0).ok()?;
        2.0 * (1.0 - normal.cdf(t.abs()))
    } else {
        let dist = StudentsT::new(0.0, 1.0, df).ok()?;
        2.0 * (1.0 - dist.cdf(t.abs()))
    };
    Some(p.clamp(0.0, 1.0))
}

fn has_two_distinct(values: &[f64]) -> bool {
    values
        .first()
        .is_some_and(|first| values.iter().any(|v| v != first))
}

fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_groups_are_significant() {
        let p = welch_p_value(&[1.0, 2.0, 3.0], &[7.0, 8.0, 9.0]).unwrap();
        assert!(p < 0.05);
    }

    #[test]
    fn same_distribution_is_not_significant() {
        let p = welch_p_value(&[5.0, 6.0, 4.0, 5.0], &[5.0, 4.0, 6.0, 5.0]).unwrap();
        assert!(p > 0.5);
    }

    #[test]
    fn constant_group_yields_none() {
        assert!(welch_p_value(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(welch_p_value(&[1.0, 2.0, 3.0], &[4.0, 4.0]).is_none());
        assert!(welch_p_value(&[], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn p_value_is_symmetric_in_group_order() {
        let a = [1.0, 2.5, 2.0];
        let b = [4.0, 5.5, 5.0];
        let p_ab = welch_p_value(&a, &b).unwrap();
        let p_ba = welch_p_value(&b, &a).unwrap();
        assert!((p_ab - p_ba).abs() < 1e-12);
    }
}
