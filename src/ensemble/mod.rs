//! Bootstrap forest ranking.
//!
//! Each tree trains on a bootstrap sample drawn from its own ChaCha stream,
//! so fitting is parallel yet reproducible. Feature importance is the
//! per-tree mean impurity decrease, normalized to sum to one across
//! features. The out-of-bag (OOB) error curve tracks ensemble error as
//! trees are added: after tree `t`, every sample left out of at least one
//! bootstrap so far is predicted by majority vote of the trees that did not
//! see it.

use log::info;
use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rayon::prelude::*;

use crate::config::ForestConfig;
use crate::error::{PipelineError, Result};
use crate::rng::{Stage, unit_rng};

pub mod tree;

use tree::DecisionTree;

/// A fitted forest with its importance scores and OOB diagnostics.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    /// IDs of the features, in matrix column order.
    pub feature_ids: Vec<String>,
    /// Normalized mean impurity decrease per feature; sums to 1 unless no
    /// split was ever made, in which case all entries are 0.
    pub importances: Vec<f64>,
    /// OOB error after each tree is added. `None` until at least one
    /// sample has received an OOB vote.
    pub oob_curve: Vec<Option<f64>>,
}

impl RandomForest {
    /// Final OOB error estimate (last point of the curve).
    pub fn oob_error(&self) -> Option<f64> {
        self.oob_curve.last().copied().flatten()
    }

    /// Majority-vote prediction, ties to the lowest class label.
    pub fn predict(&self, row: ArrayView1<f64>) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict(row)] += 1;
        }
        argmax_lowest(&votes)
    }

    /// Features ranked by importance, descending, ties broken by feature ID.
    pub fn ranked_features(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_ids
            .iter()
            .cloned()
            .zip(self.importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }
}

/// Fit a forest of `cfg.n_trees` Gini trees on `features` (items × features).
///
/// # Errors
///
/// `Configuration` for zero trees; `Data` for shape or label problems.
pub fn fit(
    features: ArrayView2<f64>,
    labels: &[usize],
    feature_ids: &[String],
    cfg: &ForestConfig,
    seed: u64,
) -> Result<RandomForest> {
    let n = features.nrows();
    if labels.len() != n {
        return Err(PipelineError::data(format!(
            "{} labels for {} rows",
            labels.len(),
            n
        )));
    }
    if feature_ids.len() != features.ncols() {
        return Err(PipelineError::data(format!(
            "{} feature IDs for {} columns",
            feature_ids.len(),
            features.ncols()
        )));
    }
    if cfg.n_trees == 0 {
        return Err(PipelineError::configuration("at least one tree required"));
    }
    let n_classes = match labels.iter().max() {
        Some(&max) => max + 1,
        None => return Err(PipelineError::data("empty training set")),
    };
    if n_classes < 2 {
        return Err(PipelineError::data(
            "forest training needs at least two classes",
        ));
    }
    let sample_size = cfg.sample_size.unwrap_or(n);
    if sample_size == 0 {
        return Err(PipelineError::configuration("bootstrap sample size is 0"));
    }

    // Bootstrap + fit, one derived stream per tree.
    let fitted: Vec<(DecisionTree, Vec<usize>)> = (0..cfg.n_trees)
        .into_par_iter()
        .map(|t| {
            let mut rng = unit_rng(seed, Stage::Forest, t as u64);
            let mut in_bag = vec![false; n];
            let sample: Vec<usize> = (0..sample_size)
                .map(|_| {
                    let i = rng.gen_range(0..n);
                    in_bag[i] = true;
                    i
                })
                .collect();
            let tree =
                DecisionTree::fit(features, labels, &sample, n_classes, cfg, &mut rng);
            let oob: Vec<usize> = (0..n).filter(|&i| !in_bag[i]).collect();
            (tree, oob)
        })
        .collect();

    // Running OOB vote tally; curve point t uses trees 0..=t.
    let mut votes = vec![vec![0usize; n_classes]; n];
    let mut oob_curve = Vec::with_capacity(cfg.n_trees);
    for (tree, oob) in &fitted {
        for &i in oob {
            let class = tree.predict(features.index_axis(ndarray::Axis(0), i));
            votes[i][class] += 1;
        }
        let mut wrong = 0usize;
        let mut voted = 0usize;
        for (i, tally) in votes.iter().enumerate() {
            if tally.iter().sum::<usize>() == 0 {
                continue;
            }
            voted += 1;
            if argmax_lowest(tally) != labels[i] {
                wrong += 1;
            }
        }
        oob_curve.push(if voted == 0 {
            None
        } else {
            Some(wrong as f64 / voted as f64)
        });
    }

    let n_features = features.ncols();
    let mut importances = vec![0.0; n_features];
    for (tree, _) in &fitted {
        for (j, &imp) in tree.importance.iter().enumerate() {
            importances[j] += imp;
        }
    }
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for imp in &mut importances {
            *imp /= total;
        }
    }

    let forest = RandomForest {
        trees: fitted.into_iter().map(|(t, _)| t).collect(),
        n_classes,
        feature_ids: feature_ids.to_vec(),
        importances,
        oob_curve,
    };
    info!(
        "forest: {} trees, {} classes, final OOB error {:?}",
        cfg.n_trees,
        n_classes,
        forest.oob_error()
    );
    Ok(forest)
}

fn argmax_lowest(tally: &[usize]) -> usize {
    tally
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then_with(|| ib.cmp(ia)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
