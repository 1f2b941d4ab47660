//! Pipeline configuration.
//!
//! One explicit [`PipelineConfig`] object is threaded through the driver;
//! there is no ambient or global configuration state. Each stage owns a
//! small config struct with sensible defaults so callers can override only
//! what they need:
//!
//! ```
//! use biomarker_rank::config::PipelineConfig;
//!
//! let mut config = PipelineConfig::default();
//! config.seed = 7;
//! config.forest.n_trees = 500;
//! ```

use crate::cluster::distance::DistanceMetric;
use crate::cluster::hierarchical::Linkage;

/// How the primary Wald significance set is combined with the Welch t-test
/// cross-check when reporting significant genes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossCheckPolicy {
    /// Primary test only; the cross-check is reported but not combined.
    PrimaryOnly,
    /// Significant under the primary test or the cross-check.
    Union,
    /// Significant under both the primary test and the cross-check.
    Intersection,
}

/// Expression filter applied before size-factor estimation.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Minimum fraction of samples in which a gene must reach `min_count`.
    pub min_fraction: f64,
    /// Minimum raw count for a sample to count as expressing the gene.
    pub min_count: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_fraction: 0.3,
            min_count: 1,
        }
    }
}

/// Differential testing parameters.
#[derive(Debug, Clone, Copy)]
pub struct TestConfig {
    /// Adjusted p-value threshold used when extracting significant genes.
    pub alpha: f64,
    /// Combination rule between the primary test and the t-test cross-check.
    pub cross_check: CrossCheckPolicy,
    /// Pseudocount added when computing log2 fold changes.
    pub pseudocount: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            alpha: 0.05,
            cross_check: CrossCheckPolicy::PrimaryOnly,
            pseudocount: 0.5,
        }
    }
}

/// Hierarchical clustering parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClusterConfig {
    pub metric: DistanceMetric,
    pub linkage: Linkage,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            metric: DistanceMetric::Euclidean,
            linkage: Linkage::Complete,
        }
    }
}

/// K-means parameters. The seed is taken from [`PipelineConfig::seed`];
/// each restart draws from its own derived stream.
#[derive(Debug, Clone, Copy)]
pub struct KMeansConfig {
    pub k: usize,
    pub restarts: usize,
    pub max_iter: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        KMeansConfig {
            k: 2,
            restarts: 25,
            max_iter: 100,
        }
    }
}

/// Synthetic minority oversampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct SmoteConfig {
    /// Number of same-class nearest neighbors to interpolate against.
    pub k_neighbors: usize,
    pub metric: DistanceMetric,
    /// Target per-class size. `None` balances the minority up to the
    /// majority class size.
    pub target_count: Option<usize>,
}

impl Default for SmoteConfig {
    fn default() -> Self {
        SmoteConfig {
            k_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            target_count: None,
        }
    }
}

/// Random forest parameters.
#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Bootstrap sample size per tree. `None` uses the training set size.
    pub sample_size: Option<usize>,
    /// Features considered per split. `None` uses `sqrt(n_features)`.
    pub features_per_split: Option<usize>,
    pub min_leaf_size: usize,
    pub max_depth: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            n_trees: 200,
            sample_size: None,
            features_per_split: None,
            min_leaf_size: 1,
            max_depth: 16,
        }
    }
}

/// Gene-set enrichment parameters.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentConfig {
    pub n_permutations: usize,
    /// Sets overlapping the ranked list in fewer genes are reported as
    /// skipped rather than tested.
    pub min_overlap: usize,
    /// Exponent applied to the rank weights in the running sum.
    pub weight_exponent: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        EnrichmentConfig {
            n_permutations: 1000,
            min_overlap: 5,
            weight_exponent: 1.0,
        }
    }
}

/// Configuration for the full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root seed; every randomized stage derives its own streams from it.
    pub seed: u64,
    /// Number of candidate genes carried into clustering, PCA and the
    /// supervised ranking branch, and the per-source truncation used by the
    /// rank aggregator.
    pub top_n: usize,
    pub filter: FilterConfig,
    pub test: TestConfig,
    pub cluster: ClusterConfig,
    pub kmeans: KMeansConfig,
    pub smote: SmoteConfig,
    pub forest: ForestConfig,
    pub enrichment: EnrichmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            seed: 42,
            top_n: 200,
            filter: FilterConfig::default(),
            test: TestConfig::default(),
            cluster: ClusterConfig::default(),
            kmeans: KMeansConfig::default(),
            smote: SmoteConfig::default(),
            forest: ForestConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}
