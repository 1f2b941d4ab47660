//! Benjamini-Hochberg false-discovery-rate correction.
//!
//! The step-up procedure runs over the defined p-values only; `None`
//! entries pass through unchanged so undefined genes never distort the
//! hypothesis count `m`.

use std::cmp::Ordering;

use crate::error::{PipelineError, Result};

/// Adjust p-values with the Benjamini-Hochberg step-up procedure.
///
/// Sorting ascending, `adjusted_i = min over j >= i of (p_j * m / j)`,
/// capped at 1, where `m` counts the defined p-values. This guarantees
/// `p_i <= adjusted_i <= 1` and monotonicity along the sorted order.
///
/// # Errors
///
/// `Data` if no p-value is defined or any defined value lies outside
/// `[0, 1]`.
pub fn benjamini_hochberg(p_values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    let mut indexed: Vec<(usize, f64)> = Vec::with_capacity(p_values.len());
    for (i, p) in p_values.iter().enumerate() {
        if let Some(p) = *p {
            if !(0.0..=1.0).contains(&p) {
                return Err(PipelineError::data(format!(
                    "invalid p-value at index {}: {}",
                    i, p
                )));
            }
            indexed.push((i, p));
        }
    }
    let m = indexed.len();
    if m == 0 {
        return Err(PipelineError::data(
            "no defined p-values to correct",
        ));
    }

    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let mut adjusted = vec![None; p_values.len()];
    let mut running_min = 1.0f64;
    for rank in (0..m).rev() {
        let (orig_idx, p) = indexed[rank];
        let candidate = (p * m as f64 / (rank + 1) as f64).min(1.0);
        running_min = running_min.min(candidate);
        adjusted[orig_idx] = Some(running_min);
    }

    Ok(adjusted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|&v| Some(v)).collect()
    }

    #[test]
    fn adjusted_dominates_raw_and_is_capped() {
        let p = some(&[0.01, 0.02, 0.03, 0.1, 0.9]);
        let adj = benjamini_hochberg(&p).unwrap();
        for (raw, adj) in p.iter().zip(&adj) {
            let (raw, adj) = (raw.unwrap(), adj.unwrap());
            assert!(adj >= raw);
            assert!(adj <= 1.0);
        }
    }

    #[test]
    fn matches_known_unordered_example() {
        let p = some(&[0.05, 0.01, 0.1, 0.04, 0.02]);
        let expected = [0.0625, 0.05, 0.1, 0.0625, 0.05];
        let adj = benjamini_hochberg(&p).unwrap();
        for (a, e) in adj.iter().zip(expected.iter()) {
            assert_relative_eq!(a.unwrap(), *e, epsilon = 1e-9);
        }
    }

    #[test]
    fn ordered_pvalues_share_the_propagated_minimum() {
        let p = some(&[0.01, 0.02, 0.03, 0.04, 0.05]);
        let adj = benjamini_hochberg(&p).unwrap();
        for a in &adj {
            assert_relative_eq!(a.unwrap(), 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn monotone_in_sorted_order() {
        let p = some(&[0.3, 0.001, 0.2, 0.04, 0.9, 0.5]);
        let adj = benjamini_hochberg(&p).unwrap();
        let mut pairs: Vec<(f64, f64)> = p
            .iter()
            .zip(&adj)
            .map(|(r, a)| (r.unwrap(), a.unwrap()))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
    }

    #[test]
    fn none_entries_pass_through_without_inflating_m() {
        let p = vec![Some(0.02), None, Some(0.04), None];
        let adj = benjamini_hochberg(&p).unwrap();
        assert!(adj[1].is_none());
        assert!(adj[3].is_none());
        // m = 2, not 4: adjusted = min-propagated {0.02*2/1, 0.04*2/2}.
        assert_relative_eq!(adj[0].unwrap(), 0.04, epsilon = 1e-9);
        assert_relative_eq!(adj[2].unwrap(), 0.04, epsilon = 1e-9);
    }

    #[test]
    fn rejects_invalid_and_all_na_input() {
        assert!(benjamini_hochberg(&[Some(1.5)]).is_err());
        assert!(benjamini_hochberg(&[Some(-0.1)]).is_err());
        assert!(benjamini_hochberg(&[None, None]).is_err());
    }

    #[test]
    fn single_pvalue_is_unchanged() {
        let adj = benjamini_hochberg(&[Some(0.025)]).unwrap();
        assert_relative_eq!(adj[0].unwrap(), 0.025, epsilon = 1e-12);
    }
}
