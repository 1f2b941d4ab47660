//! Unsupervised structure discovery: pairwise distances, agglomerative
//! hierarchical clustering, and restarted k-means.
//!
//! Both clusterers operate on an item × feature matrix and emit
//! [`ClusterAssignment`]s whose labels are arbitrary integers, meaningful
//! only within a single run.

pub mod distance;
pub mod hierarchical;
pub mod kmeans;

/// Item-ID to cluster-label mapping. Labels are contiguous from 0 but carry
/// no meaning across runs or seeds.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub item_ids: Vec<String>,
    pub labels: Vec<usize>,
}

impl ClusterAssignment {
    /// Number of distinct cluster labels.
    pub fn n_clusters(&self) -> usize {
        let mut labels: Vec<usize> = self.labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    /// Item IDs assigned to `label`.
    pub fn members(&self, label: usize) -> Vec<&str> {
        self.item_ids
            .iter()
            .zip(&self.labels)
            .filter(|&(_, &l)| l == label)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
