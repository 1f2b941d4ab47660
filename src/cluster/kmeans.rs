//! K-means partitioning with deterministic restarts.
//!
//! Lloyd's iteration runs once per restart from a fresh random
//! initialization; each restart draws from its own ChaCha stream derived
//! from the root seed, so restart results do not depend on execution order.
//! The restart with the lowest total within-cluster sum of squares wins.
//! No automatic k selection: [`wss_curve`] exposes the curve for an
//! externally driven elbow choice.

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::cluster::ClusterAssignment;
use crate::config::KMeansConfig;
use crate::error::{PipelineError, Result};
use crate::rng::{Stage, unit_rng};

/// Outcome of the best restart.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub assignment: ClusterAssignment,
    /// Centroids, k × features.
    pub centroids: Array2<f64>,
    /// Total within-cluster sum of squares of the winning restart.
    pub wss: f64,
    /// Restart index that produced the result.
    pub best_restart: usize,
    /// Iterations the winning restart took to converge (or the cap).
    pub n_iter: usize,
}

/// Run restarted k-means over the rows of `items`.
///
/// # Errors
///
/// `Configuration` for `k < 1`, `k > n`, or zero restarts; `Data` when item
/// IDs do not match the matrix.
pub fn kmeans(
    items: ArrayView2<f64>,
    item_ids: &[String],
    cfg: &KMeansConfig,
    seed: u64,
) -> Result<KMeansResult> {
    let n = items.nrows();
    if item_ids.len() != n {
        return Err(PipelineError::data(format!(
            "{} item IDs for {} rows",
            item_ids.len(),
            n
        )));
    }
    if cfg.k < 1 || cfg.k > n {
        return Err(PipelineError::configuration(format!(
            "k must be in 1..={}, got {}",
            n, cfg.k
        )));
    }
    if cfg.restarts == 0 {
        return Err(PipelineError::configuration("at least one restart required"));
    }

    let runs: Vec<(usize, SingleRun)> = (0..cfg.restarts)
        .into_par_iter()
        .map(|restart| {
            let mut rng = unit_rng(seed, Stage::KMeans, restart as u64);
            (restart, lloyd(items, cfg.k, cfg.max_iter, &mut rng))
        })
        .collect();

    // Lowest WSS wins; ties go to the earliest restart, which `min_by` with
    // strict comparison on the ordered restart index delivers.
    let (best_restart, best) = runs
        .into_iter()
        .min_by(|(ia, a), (ib, b)| {
            a.wss
                .partial_cmp(&b.wss)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ia.cmp(ib))
        })
        .expect("restarts > 0");

    debug!(
        "k-means k={} best restart {} wss={:.4} after {} iterations",
        cfg.k, best_restart, best.wss, best.n_iter
    );

    Ok(KMeansResult {
        assignment: ClusterAssignment {
            item_ids: item_ids.to_vec(),
            labels: best.labels,
        },
        centroids: best.centroids,
        wss: best.wss,
        best_restart,
        n_iter: best.n_iter,
    })
}

/// Best-restart WSS for each `k` in `k_range`, for elbow inspection.
pub fn wss_curve(
    items: ArrayView2<f64>,
    item_ids: &[String],
    k_range: std::ops::RangeInclusive<usize>,
    cfg: &KMeansConfig,
    seed: u64,
) -> Result<Vec<(usize, f64)>> {
    let mut curve = Vec::new();
    for k in k_range {
        let run_cfg = KMeansConfig { k, ..*cfg };
        let result = kmeans(items, item_ids, &run_cfg, seed)?;
        curve.push((k, result.wss));
    }
    Ok(curve)
}

struct SingleRun {
    labels: Vec<usize>,
    centroids: Array2<f64>,
    wss: f64,
    n_iter: usize,
}

fn lloyd(
    items: ArrayView2<f64>,
    k: usize,
    max_iter: usize,
    rng: &mut impl Rng,
) -> SingleRun {
    let n = items.nrows();
    let dim = items.ncols();

    // Fresh initialization: k distinct items as starting centroids.
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let mut centroids = Array2::zeros((k, dim));
    for (c, &i) in indices.iter().take(k).enumerate() {
        centroids.row_mut(c).assign(&items.index_axis(Axis(0), i));
    }

    let mut labels = vec![0usize; n];
    let mut n_iter = 0;
    for iter in 0..max_iter {
        n_iter = iter + 1;

        // Assignment step.
        let mut changed = false;
        for i in 0..n {
            let row = items.index_axis(Axis(0), i);
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for c in 0..k {
                let d: f64 = row
                    .iter()
                    .zip(centroids.row(c))
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed && iter > 0 {
            break;
        }

        // Update step; an emptied cluster is reseeded with the item
        // farthest from its centroid.
        let mut sums = Array2::<f64>::zeros((k, dim));
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            let mut target = sums.row_mut(label);
            target += &items.index_axis(Axis(0), i);
            counts[label] += 1;
        }
        for c in 0..k {
            if counts[c] == 0 {
                let (far, _) = (0..n)
                    .map(|i| {
                        let d: f64 = items
                            .index_axis(Axis(0), i)
                            .iter()
                            .zip(centroids.row(labels[i]))
                            .map(|(x, y)| (x - y) * (x - y))
                            .sum();
                        (i, d)
                    })
                    .max_by(|a, b| {
                        a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .expect("n >= k >= 1");
                centroids.row_mut(c).assign(&items.index_axis(Axis(0), far));
            } else {
                let inv = 1.0 / counts[c] as f64;
                let mut row = centroids.row_mut(c);
                row.assign(&sums.row(c));
                row *= inv;
            }
        }
    }

    let wss = (0..n)
        .map(|i| {
            items
                .index_axis(Axis(0), i)
                .iter()
                .zip(centroids.row(labels[i]))
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
        })
        .sum();

    SingleRun {
        labels,
        centroids,
        wss,
        n_iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item{}", i)).collect()
    }

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.2],
            [8.0, 8.0],
            [8.2, 8.1],
            [8.1, 8.2]
        ]
    }

    fn cfg(k: usize) -> KMeansConfig {
        KMeansConfig {
            k,
            restarts: 25,
            max_iter: 50,
        }
    }

    #[test]
    fn separates_two_blobs() {
        let items = blobs();
        let res = kmeans(items.view(), &ids(6), &cfg(2), 42).unwrap();
        let labels = &res.assignment.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert!(res.wss < 0.5);
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let items = blobs();
        let a = kmeans(items.view(), &ids(6), &cfg(2), 7).unwrap();
        let b = kmeans(items.view(), &ids(6), &cfg(2), 7).unwrap();
        assert_eq!(a.assignment.labels, b.assignment.labels);
        assert_eq!(a.wss, b.wss);
        assert_eq!(a.best_restart, b.best_restart);
    }

    #[test]
    fn wss_curve_is_weakly_decreasing_in_k() {
        let items = blobs();
        let curve = wss_curve(items.view(), &ids(6), 1..=5, &cfg(1), 42).unwrap();
        for w in curve.windows(2) {
            assert!(w[1].1 <= w[0].1 + 1e-9);
        }
    }

    #[test]
    fn invalid_k_is_a_configuration_error() {
        let items = blobs();
        assert!(matches!(
            kmeans(items.view(), &ids(6), &cfg(0), 42),
            Err(PipelineError::Configuration(_))
        ));
        assert!(kmeans(items.view(), &ids(6), &cfg(7), 42).is_err());
    }
}
