//! Distance metrics and parallel pairwise distance matrices.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// Supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
}

impl DistanceMetric {
    pub fn between(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => {
                a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
            }
        }
    }
}

/// Full symmetric pairwise distance matrix over the rows of `items`.
///
/// Rows are computed in parallel; the result has zeros on the diagonal.
///
/// # Errors
///
/// `Data` with fewer than 2 items, `Numeric` if any distance is non-finite.
pub fn pairwise(items: ArrayView2<f64>, metric: DistanceMetric) -> Result<Array2<f64>> {
    let n = items.nrows();
    if n < 2 {
        return Err(PipelineError::data(format!(
            "pairwise distances need at least 2 items, got {}",
            n
        )));
    }

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = items.index_axis(Axis(0), i);
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        metric.between(a, items.index_axis(Axis(0), j))
                    }
                })
                .collect()
        })
        .collect();

    let mut out = Array2::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, d) in row.into_iter().enumerate() {
            if !d.is_finite() {
                return Err(PipelineError::numeric(format!(
                    "non-finite distance between items {} and {}",
                    i, j
                )));
            }
            out[[i, j]] = d;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn euclidean_matches_hand_computation() {
        let items = array![[0.0, 0.0], [3.0, 4.0]];
        let d = pairwise(items.view(), DistanceMetric::Euclidean).unwrap();
        assert_relative_eq!(d[[0, 1]], 5.0, epsilon = 1e-12);
        assert_relative_eq!(d[[1, 0]], 5.0, epsilon = 1e-12);
        assert_eq!(d[[0, 0]], 0.0);
    }

    #[test]
    fn manhattan_matches_hand_computation() {
        let items = array![[1.0, 1.0], [4.0, -1.0]];
        let d = pairwise(items.view(), DistanceMetric::Manhattan).unwrap();
        assert_relative_eq!(d[[0, 1]], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn single_item_is_rejected() {
        let items = array![[1.0, 2.0]];
        assert!(pairwise(items.view(), DistanceMetric::Euclidean).is_err());
    }
}
