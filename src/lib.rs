//! # biomarker-rank
//!
//! A Rust library that turns a raw gene-by-sample count matrix into a
//! statistically ranked list of candidate biomarker genes.
//!
//! The pipeline combines count normalization, dispersion-aware differential
//! testing with multiple-testing correction, unsupervised structure
//! discovery (hierarchical clustering, PCA, k-means), class-imbalance-aware
//! supervised ranking (synthetic oversampling plus a bootstrap forest), rank
//! aggregation, and permutation-based gene-set enrichment.
//!
//! ## Core Features
//!
//! - **Normalization**: median-of-ratios size factors with an expression
//!   filter
//! - **Differential Testing**: negative-binomial Wald test with trend-shrunk
//!   dispersions, a Welch t cross-check, and Benjamini-Hochberg correction
//! - **Structure Discovery**: agglomerative clustering, restarted k-means,
//!   and Jacobi-based PCA
//! - **Supervised Ranking**: SMOTE oversampling and Gini-forest importance
//!   with an out-of-bag error curve
//! - **Enrichment**: weighted running-sum scores with a permutation null
//!
//! Every randomized stage derives per-unit ChaCha streams from one root
//! seed, so results are reproducible regardless of thread scheduling.
//!
//! ## Quick Start
//!
//! Build a [`data::CountMatrix`] and [`data::SampleMetadata`], pick a
//! [`config::PipelineConfig`], and call [`pipeline::run`]. Individual stages
//! are exported for standalone use.
//!
//! ## Module Organization
//!
//! - **[`normalize`]**: expression filtering and size-factor normalization
//! - **[`testing`]**: dispersion shrinkage, Wald and t tests, BH correction
//! - **[`cluster`]**: distances, hierarchical clustering, k-means
//! - **[`reduce`]**: standardization and principal component analysis
//! - **[`imbalance`]**: synthetic minority oversampling
//! - **[`ensemble`]**: bootstrap forest ranking with OOB diagnostics
//! - **[`aggregate`]**: the final candidate table join
//! - **[`enrichment`]**: permutation gene-set enrichment
//! - **[`pipeline`]**: the end-to-end driver

pub mod aggregate;
pub mod cluster;
pub mod config;
pub mod data;
pub mod enrichment;
pub mod ensemble;
pub mod error;
pub mod imbalance;
pub mod normalize;
pub mod pipeline;
pub mod reduce;
pub mod rng;
pub mod testing;

pub use config::PipelineConfig;
pub use data::{CountMatrix, SampleMetadata};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineRun, run};
