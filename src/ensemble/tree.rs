//! Gini-impurity decision trees for the forest.
//!
//! Trees are grown greedily: at each node a random subset of features is
//! scanned for the threshold with the largest impurity decrease, ties broken
//! by the lowest feature index and then the lowest threshold so tree growth
//! is fully determined by the node's generator.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::ForestConfig;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single fitted tree with its accumulated impurity decreases.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Raw (unnormalized) impurity decrease attributed to each feature.
    pub importance: Vec<f64>,
}

impl DecisionTree {
    pub fn fit(
        features: ArrayView2<f64>,
        labels: &[usize],
        sample_idx: &[usize],
        n_classes: usize,
        cfg: &ForestConfig,
        rng: &mut impl Rng,
    ) -> DecisionTree {
        let mtry = cfg
            .features_per_split
            .unwrap_or_else(|| (features.ncols() as f64).sqrt().ceil() as usize)
            .clamp(1, features.ncols());
        let mut tree = DecisionTree {
            nodes: Vec::new(),
            importance: vec![0.0; features.ncols()],
        };
        tree.grow(
            features,
            labels,
            sample_idx.to_vec(),
            n_classes,
            mtry,
            cfg,
            0,
            sample_idx.len() as f64,
            rng,
        );
        tree
    }

    /// Class prediction for one item.
    pub fn predict(&self, row: ArrayView1<f64>) -> usize {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        features: ArrayView2<f64>,
        labels: &[usize],
        idx: Vec<usize>,
        n_classes: usize,
        mtry: usize,
        cfg: &ForestConfig,
        depth: usize,
        n_total: f64,
        rng: &mut impl Rng,
    ) -> usize {
        let counts = class_counts(labels, &idx, n_classes);
        let node_gini = gini(&counts, idx.len());

        let stop = depth >= cfg.max_depth
            || idx.len() <= cfg.min_leaf_size
            || node_gini == 0.0;
        let split = if stop {
            None
        } else {
            best_split(features, labels, &idx, n_classes, mtry, cfg, rng)
        };

        match split {
            None => {
                let class = majority(&counts);
                self.nodes.push(Node::Leaf { class });
                self.nodes.len() - 1
            }
            Some(found) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                    .iter()
                    .copied()
                    .partition(|&i| features[[i, found.feature]] <= found.threshold);
                self.importance[found.feature] +=
                    idx.len() as f64 / n_total * found.decrease;

                // Reserve the slot so child indices are stable.
                let at = self.nodes.len();
                self.nodes.push(Node::Leaf { class: 0 });
                let left = self.grow(
                    features, labels, left_idx, n_classes, mtry, cfg, depth + 1,
                    n_total, rng,
                );
                let right = self.grow(
                    features, labels, right_idx, n_classes, mtry, cfg, depth + 1,
                    n_total, rng,
                );
                self.nodes[at] = Node::Split {
                    feature: found.feature,
                    threshold: found.threshold,
                    left,
                    right,
                };
                at
            }
        }
    }
}

struct FoundSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

fn best_split(
    features: ArrayView2<f64>,
    labels: &[usize],
    idx: &[usize],
    n_classes: usize,
    mtry: usize,
    cfg: &ForestConfig,
    rng: &mut impl Rng,
) -> Option<FoundSplit> {
    let mut candidates: Vec<usize> = (0..features.ncols()).collect();
    candidates.shuffle(rng);
    candidates.truncate(mtry);
    // Scan order must not depend on the shuffle for tie-breaking to hold.
    candidates.sort_unstable();

    let parent_counts = class_counts(labels, idx, n_classes);
    let parent_gini = gini(&parent_counts, idx.len());

    let mut best: Option<FoundSplit> = None;
    for &feature in &candidates {
        let mut ordered: Vec<usize> = idx.to_vec();
        ordered.sort_by(|&a, &b| {
            features[[a, feature]]
                .partial_cmp(&features[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_counts = vec![0usize; n_classes];
        for cut in 1..ordered.len() {
            left_counts[labels[ordered[cut - 1]]] += 1;
            let lo = features[[ordered[cut - 1], feature]];
            let hi = features[[ordered[cut], feature]];
            if lo == hi {
                continue;
            }
            let n_left = cut;
            let n_right = ordered.len() - cut;
            if n_left < cfg.min_leaf_size || n_right < cfg.min_leaf_size {
                continue;
            }

            let right_counts: Vec<usize> = parent_counts
                .iter()
                .zip(left_counts.iter())
                .map(|(&p, &l)| p - l)
                .collect();
            let weighted = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / ordered.len() as f64;
            let decrease = parent_gini - weighted;
            if decrease <= 0.0 {
                continue;
            }

            let threshold = lo + (hi - lo) / 2.0;
            let better = match &best {
                None => true,
                Some(b) => {
                    decrease > b.decrease
                        || (decrease == b.decrease
                            && (feature, threshold) < (b.feature, b.threshold))
                }
            };
            if better {
                best = Some(FoundSplit {
                    feature,
                    threshold,
                    decrease,
                });
            }
        }
    }
    best
}

fn class_counts(labels: &[usize], idx: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in idx {
        counts[labels[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / t;
            p * p
        })
        .sum::<f64>()
}

/// Majority class, lowest label on ties.
fn majority(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then_with(|| ib.cmp(ia)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
