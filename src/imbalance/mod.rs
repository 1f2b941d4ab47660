//! Synthetic minority oversampling (SMOTE).
//!
//! Each synthetic item is a linear interpolation between a minority item
//! and one of its k same-class nearest neighbors, at a random fraction in
//! [0, 1]. Originals are never modified; synthetic rows are appended after
//! them, so every output feature lies within the bounding interval of its
//! generating pair.

use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

use crate::config::SmoteConfig;
use crate::error::{PipelineError, Result};
use crate::rng::{Stage, unit_rng};

/// Oversampled dataset: original rows first, synthetic rows appended.
#[derive(Debug, Clone)]
pub struct OversampledSet {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    /// Number of synthetic rows appended.
    pub n_synthetic: usize,
    /// The minority class label that was oversampled.
    pub minority_class: usize,
}

/// Oversample the minority class of a two-class dataset up to
/// `cfg.target_count` (default: the majority class size).
///
/// # Errors
///
/// `Configuration` if the labels are not two-class, the minority class has
/// at most `k_neighbors` members, or the target is below the current
/// minority size.
pub fn smote(
    features: ArrayView2<f64>,
    labels: &[usize],
    cfg: &SmoteConfig,
    seed: u64,
) -> Result<OversampledSet> {
    if labels.len() != features.nrows() {
        return Err(PipelineError::data(format!(
            "{} labels for {} rows",
            labels.len(),
            features.nrows()
        )));
    }
    let mut classes: Vec<usize> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() != 2 {
        return Err(PipelineError::configuration(format!(
            "SMOTE requires exactly two classes, found {}",
            classes.len()
        )));
    }

    let count = |c: usize| labels.iter().filter(|&&l| l == c).count();
    let (minority, majority) = if count(classes[0]) <= count(classes[1]) {
        (classes[0], classes[1])
    } else {
        (classes[1], classes[0])
    };
    let minority_idx: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == minority)
        .map(|(i, _)| i)
        .collect();
    let minority_size = minority_idx.len();

    if minority_size <= cfg.k_neighbors {
        return Err(PipelineError::configuration(format!(
            "minority class {} has {} members; needs more than k_neighbors={}",
            minority, minority_size, cfg.k_neighbors
        )));
    }

    let target = cfg.target_count.unwrap_or_else(|| count(majority));
    if target < minority_size {
        return Err(PipelineError::configuration(format!(
            "target count {} is below the current minority size {}",
            target, minority_size
        )));
    }
    let n_synthetic = target - minority_size;

    // k nearest same-class neighbors per minority item.
    let neighbors: Vec<Vec<usize>> = minority_idx
        .iter()
        .map(|&i| {
            let mut dists: Vec<(usize, f64)> = minority_idx
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| {
                    (
                        j,
                        cfg.metric.between(
                            features.index_axis(Axis(0), i),
                            features.index_axis(Axis(0), j),
                        ),
                    )
                })
                .collect();
            dists.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            dists.truncate(cfg.k_neighbors);
            dists.into_iter().map(|(j, _)| j).collect()
        })
        .collect();

    let dim = features.ncols();
    let mut out = Array2::zeros((features.nrows() + n_synthetic, dim));
    out.slice_mut(ndarray::s![..features.nrows(), ..])
        .assign(&features);
    let mut out_labels = labels.to_vec();

    // Round-robin over minority items; each draw has its own stream so the
    // result is independent of any batching.
    for s in 0..n_synthetic {
        let mut rng = unit_rng(seed, Stage::Smote, s as u64);
        let pick = s % minority_size;
        let base = minority_idx[pick];
        let neighbor = neighbors[pick][rng.gen_range(0..neighbors[pick].len())];
        let fraction: f64 = rng.gen_range(0.0..=1.0);

        let a = features.index_axis(Axis(0), base);
        let b = features.index_axis(Axis(0), neighbor);
        let synthetic: Array1<f64> = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| x + fraction * (y - x))
            .collect();
        out.row_mut(features.nrows() + s).assign(&synthetic);
        out_labels.push(minority);
    }

    debug!(
        "smote: appended {} synthetic items to minority class {} (now {})",
        n_synthetic, minority, target
    );

    Ok(OversampledSet {
        features: out,
        labels: out_labels,
        n_synthetic,
        minority_class: minority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::distance::DistanceMetric;
    use ndarray::array;

    fn cfg(k: usize) -> SmoteConfig {
        SmoteConfig {
            k_neighbors: k,
            metric: DistanceMetric::Euclidean,
            target_count: None,
        }
    }

    fn dataset() -> (Array2<f64>, Vec<usize>) {
        let features = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
            [11.0, 11.0],
            [10.5, 10.5],
            [11.5, 11.5]
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        (features, labels)
    }

    #[test]
    fn reaches_exact_target_count() {
        let (features, labels) = dataset();
        let out = smote(features.view(), &labels, &cfg(3), 42).unwrap();
        let minority_total = out.labels.iter().filter(|&&l| l == 0).count();
        assert_eq!(minority_total, 6);
        assert_eq!(out.n_synthetic, 2);
        assert_eq!(out.minority_class, 0);
        assert_eq!(out.features.nrows(), 12);
    }

    #[test]
    fn originals_are_untouched_and_synthetics_bounded() {
        let (features, labels) = dataset();
        let out = smote(features.view(), &labels, &cfg(3), 42).unwrap();

        for i in 0..features.nrows() {
            assert_eq!(out.features.row(i), features.row(i));
        }
        // Minority items all live in [0,1]^2, so any interpolation does too.
        for s in 0..out.n_synthetic {
            let row = out.features.row(features.nrows() + s);
            for &v in row.iter() {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let (features, labels) = dataset();
        let a = smote(features.view(), &labels, &cfg(3), 9).unwrap();
        let b = smote(features.view(), &labels, &cfg(3), 9).unwrap();
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn small_minority_is_a_configuration_error() {
        let (features, labels) = dataset();
        assert!(matches!(
            smote(features.view(), &labels, &cfg(5), 42),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn explicit_target_is_honored() {
        let (features, labels) = dataset();
        let mut config = cfg(3);
        config.target_count = Some(10);
        let out = smote(features.view(), &labels, &config, 42).unwrap();
        assert_eq!(out.labels.iter().filter(|&&l| l == 0).count(), 10);
    }
}
