//! Agglomerative hierarchical clustering.
//!
//! Repeatedly joins the two clusters at minimal linkage distance, ties
//! broken by the lowest original index pair, recording merge heights into a
//! [`Dendrogram`]. Cutting the dendrogram at `k` clusters replays the merge
//! history up to the threshold set by the `(k-1)`-th largest merge height.

use ndarray::{Array2, ArrayView2};

use crate::cluster::ClusterAssignment;
use crate::cluster::distance::{DistanceMetric, pairwise};
use crate::error::{PipelineError, Result};

/// Inter-cluster distance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Maximum pairwise item distance.
    Complete,
    /// Minimum pairwise item distance.
    Single,
    /// Unweighted average of pairwise item distances.
    Average,
}

/// One merge step: the two cluster ids joined and the linkage height.
/// Cluster ids follow the scipy convention: leaves are `0..n`, the merge
/// recorded at step `s` creates cluster `n + s`.
#[derive(Debug, Clone, Copy)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    /// Number of leaves under the merged cluster.
    pub size: usize,
}

/// Binary merge tree with ordered leaves. Merge heights are non-decreasing
/// along any leaf-to-root path for the supported linkages.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    pub item_ids: Vec<String>,
    pub merges: Vec<Merge>,
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.item_ids.len()
    }

    /// Cut into `k` clusters by replaying all merges below the `(k-1)`-th
    /// largest merge height.
    ///
    /// # Errors
    ///
    /// `Configuration` unless `1 <= k <= n_leaves`.
    pub fn cut(&self, k: usize) -> Result<ClusterAssignment> {
        let n = self.n_leaves();
        if k < 1 || k > n {
            return Err(PipelineError::configuration(format!(
                "cannot cut a {}-leaf dendrogram into {} clusters",
                n, k
            )));
        }

        // With non-decreasing merge heights, stopping before the last k-1
        // merges is exactly the height-threshold cut.
        let n_merges = n - k;
        let mut parent: Vec<usize> = (0..2 * n - 1).collect();
        for (s, merge) in self.merges.iter().take(n_merges).enumerate() {
            let cluster = n + s;
            let left = find(&mut parent, merge.left);
            parent[left] = cluster;
            let right = find(&mut parent, merge.right);
            parent[right] = cluster;
        }

        // Relabel roots to contiguous labels in leaf order.
        let mut labels = vec![0usize; n];
        let mut roots: Vec<usize> = Vec::new();
        for leaf in 0..n {
            let root = find(&mut parent, leaf);
            let label = match roots.iter().position(|&r| r == root) {
                Some(pos) => pos,
                None => {
                    roots.push(root);
                    roots.len() - 1
                }
            };
            labels[leaf] = label;
        }

        Ok(ClusterAssignment {
            item_ids: self.item_ids.clone(),
            labels,
        })
    }
}

fn ordered_pair(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Cluster the rows of `items` agglomeratively.
///
/// # Errors
///
/// `Data` with fewer than 2 items (via the distance computation).
pub fn cluster(
    items: ArrayView2<f64>,
    item_ids: &[String],
    metric: DistanceMetric,
    linkage: Linkage,
) -> Result<Dendrogram> {
    if item_ids.len() != items.nrows() {
        return Err(PipelineError::data(format!(
            "{} item IDs for {} rows",
            item_ids.len(),
            items.nrows()
        )));
    }
    let distances = pairwise(items, metric)?;
    cluster_from_distances(&distances, item_ids, linkage)
}

/// Agglomerative clustering over a precomputed distance matrix.
pub fn cluster_from_distances(
    distances: &Array2<f64>,
    item_ids: &[String],
    linkage: Linkage,
) -> Result<Dendrogram> {
    let n = distances.nrows();
    if n < 2 {
        return Err(PipelineError::data(format!(
            "hierarchical clustering needs at least 2 items, got {}",
            n
        )));
    }
    if distances.ncols() != n {
        return Err(PipelineError::data("distance matrix is not square"));
    }

    // Active clusters, indexed by their dendrogram cluster id.
    struct Active {
        id: usize,
        members: Vec<usize>,
        /// Lowest leaf index, for deterministic tie-breaking.
        min_leaf: usize,
    }

    let mut active: Vec<Active> = (0..n)
        .map(|i| Active {
            id: i,
            members: vec![i],
            min_leaf: i,
        })
        .collect();
    let mut merges = Vec::with_capacity(n - 1);

    while active.len() > 1 {
        // Find the minimal linkage pair; ties resolve to the lowest
        // (min_leaf_a, min_leaf_b) pair.
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..active.len() {
            for b in (a + 1)..active.len() {
                let d = linkage_distance(
                    distances,
                    &active[a].members,
                    &active[b].members,
                    linkage,
                );
                let pair = ordered_pair(active[a].min_leaf, active[b].min_leaf);
                let better = match best {
                    None => true,
                    Some((ba, bb, bd)) => {
                        d < bd
                            || (d == bd
                                && pair
                                    < ordered_pair(
                                        active[ba].min_leaf,
                                        active[bb].min_leaf,
                                    ))
                    }
                };
                if better {
                    best = Some((a, b, d));
                }
            }
        }
        let (a, b, height) = best.expect("at least two active clusters");

        let cluster_id = n + merges.len();
        let (left, right) = ordered_pair(active[a].id, active[b].id);
        merges.push(Merge {
            left,
            right,
            height,
            size: active[a].members.len() + active[b].members.len(),
        });

        // b > a, so remove b first.
        let removed = active.swap_remove(b);
        active[a].members.extend(removed.members);
        active[a].min_leaf = active[a].min_leaf.min(removed.min_leaf);
        active[a].id = cluster_id;
    }

    Ok(Dendrogram {
        item_ids: item_ids.to_vec(),
        merges,
    })
}

fn linkage_distance(
    distances: &Array2<f64>,
    a: &[usize],
    b: &[usize],
    linkage: Linkage,
) -> f64 {
    let mut acc = match linkage {
        Linkage::Complete => f64::NEG_INFINITY,
        Linkage::Single => f64::INFINITY,
        Linkage::Average => 0.0,
    };
    for &i in a {
        for &j in b {
            let d = distances[[i, j]];
            acc = match linkage {
                Linkage::Complete => acc.max(d),
                Linkage::Single => acc.min(d),
                Linkage::Average => acc + d,
            };
        }
    }
    match linkage {
        Linkage::Average => acc / (a.len() * b.len()) as f64,
        _ => acc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item{}", i)).collect()
    }

    fn two_blob_items() -> ndarray::Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1]
        ]
    }

    #[test]
    fn merge_heights_are_non_decreasing() {
        let items = two_blob_items();
        let d = cluster(
            items.view(),
            &ids(6),
            DistanceMetric::Euclidean,
            Linkage::Complete,
        )
        .unwrap();
        for w in d.merges.windows(2) {
            assert!(w[0].height <= w[1].height);
        }
        assert_eq!(d.merges.len(), 5);
    }

    #[test]
    fn cut_extremes() {
        let items = two_blob_items();
        let d = cluster(
            items.view(),
            &ids(6),
            DistanceMetric::Euclidean,
            Linkage::Complete,
        )
        .unwrap();

        let singletons = d.cut(6).unwrap();
        assert_eq!(singletons.n_clusters(), 6);

        let one = d.cut(1).unwrap();
        assert_eq!(one.n_clusters(), 1);

        assert!(d.cut(0).is_err());
        assert!(d.cut(7).is_err());
    }

    #[test]
    fn cut_recovers_the_two_blobs() {
        let items = two_blob_items();
        let d = cluster(
            items.view(),
            &ids(6),
            DistanceMetric::Euclidean,
            Linkage::Complete,
        )
        .unwrap();
        let two = d.cut(2).unwrap();
        assert_eq!(two.n_clusters(), 2);
        assert_eq!(two.labels[0], two.labels[1]);
        assert_eq!(two.labels[0], two.labels[2]);
        assert_eq!(two.labels[3], two.labels[4]);
        assert_eq!(two.labels[3], two.labels[5]);
        assert_ne!(two.labels[0], two.labels[3]);
    }

    #[test]
    fn ties_break_on_lowest_index_pair() {
        // Three equidistant-pair items: 0-1 and 2-3 both at distance 1.
        let items = array![[0.0], [1.0], [10.0], [11.0]];
        let d = cluster(
            items.view(),
            &ids(4),
            DistanceMetric::Euclidean,
            Linkage::Single,
        )
        .unwrap();
        assert_eq!((d.merges[0].left, d.merges[0].right), (0, 1));
        assert_eq!((d.merges[1].left, d.merges[1].right), (2, 3));
    }

    #[test]
    fn one_item_is_a_data_error() {
        let items = array![[1.0, 2.0]];
        assert!(matches!(
            cluster(
                items.view(),
                &ids(1),
                DistanceMetric::Euclidean,
                Linkage::Complete
            ),
            Err(PipelineError::Data(_))
        ));
    }
}
