//! End-to-end pipeline driver.
//!
//! Stages run in a fixed order: normalize → differential test → BH
//! correction → candidate truncation; the candidates feed clustering, PCA
//! and the oversample-then-rank branch, everything converges into the
//! candidate table, and enrichment runs on the full ranked list. A stage
//! error aborts the run with the offending identifiers in its message; there
//! are no retries.

use anyhow::Context;
use log::info;
use ndarray::{Array2, Axis};

use crate::aggregate::{CandidateTable, RankedSource, candidate_table};
use crate::cluster::hierarchical::{self, Dendrogram};
use crate::cluster::kmeans::{self, KMeansResult};
use crate::config::PipelineConfig;
use crate::data::{CountMatrix, RankedGeneList, SampleMetadata};
use crate::enrichment::{self, EnrichmentResults, GeneSet};
use crate::ensemble::{self, RandomForest};
use crate::imbalance;
use crate::normalize;
use crate::reduce::{self, PrincipalComponents};
use crate::testing::{self, DifferentialResults};

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub differential: DifferentialResults,
    /// Gene IDs significant under the configured cross-check policy.
    pub significant: Vec<String>,
    /// Candidate gene IDs carried into the downstream branches, ordered by
    /// ascending adjusted p-value.
    pub candidate_ids: Vec<String>,
    pub dendrogram: Dendrogram,
    pub kmeans: KMeansResult,
    pub components: PrincipalComponents,
    pub forest: RandomForest,
    pub candidates: CandidateTable,
    pub enrichment: EnrichmentResults,
}

/// Run the full pipeline.
pub fn run(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
    gene_sets: &[GeneSet],
    config: &PipelineConfig,
) -> anyhow::Result<PipelineRun> {
    let normalized = normalize::normalize(counts, metadata, &config.filter)
        .context("count normalization failed")?;

    let differential = testing::differential_test(&normalized, metadata, &config.test)
        .and_then(DifferentialResults::adjust)
        .context("differential testing failed")?;
    let significant: Vec<String> = differential
        .significant_genes(config.test.alpha, config.test.cross_check)
        .into_iter()
        .map(|i| differential.gene_ids[i].clone())
        .collect();
    info!(
        "{} significant genes at alpha {}",
        significant.len(),
        config.test.alpha
    );

    // Candidate truncation: top genes by adjusted p feed both branches.
    let candidate_rows = differential.top_genes(config.top_n);
    let candidate_ids: Vec<String> = candidate_rows
        .iter()
        .map(|&i| differential.gene_ids[i].clone())
        .collect();
    let candidate_values: Array2<f64> =
        normalized.values.select(Axis(0), &candidate_rows);

    // Unsupervised branch: genes are the items.
    let dendrogram = hierarchical::cluster(
        candidate_values.view(),
        &candidate_ids,
        config.cluster.metric,
        config.cluster.linkage,
    )
    .context("hierarchical clustering failed")?;
    let kmeans = kmeans::kmeans(
        candidate_values.view(),
        &candidate_ids,
        &config.kmeans,
        config.seed,
    )
    .context("k-means clustering failed")?;

    // PCA sees samples as items, candidate genes as features.
    let sample_by_gene = candidate_values.t().to_owned();
    let scaled = reduce::standardize(sample_by_gene.view(), &candidate_ids)
        .context("feature scaling for PCA failed")?;
    let components =
        reduce::pca(scaled.view(), &candidate_ids).context("PCA failed")?;

    // Supervised branch: oversample only when the groups are imbalanced,
    // then rank candidate genes by forest importance.
    let (group_a, idx_a, _group_b, idx_b) = metadata
        .two_group_split()
        .context("group split for supervised ranking failed")?;
    let labels: Vec<usize> = metadata
        .groups()
        .iter()
        .map(|g| usize::from(*g != group_a))
        .collect();
    let forest = if idx_a.len() == idx_b.len() {
        info!("groups are balanced; skipping oversampling");
        ensemble::fit(
            sample_by_gene.view(),
            &labels,
            &candidate_ids,
            &config.forest,
            config.seed,
        )
    } else {
        let oversampled = imbalance::smote(
            sample_by_gene.view(),
            &labels,
            &config.smote,
            config.seed,
        )
        .context("minority oversampling failed")?;
        ensemble::fit(
            oversampled.features.view(),
            &oversampled.labels,
            &candidate_ids,
            &config.forest,
            config.seed,
        )
    }
    .context("forest ranking failed")?;

    let candidates = candidate_table(
        &[
            RankedSource::new("differential", differential_source(&differential, &candidate_rows)?),
            RankedSource::new("pca", pca_source(&components, config.top_n)?),
            RankedSource::new(
                "forest",
                RankedGeneList::from_scores(forest.ranked_features())?,
            ),
        ],
        config.top_n,
    )
    .context("candidate table assembly failed")?;

    // Enrichment runs on the full ranked list, not the candidate cut.
    let full_ranking = differential
        .ranked_by_effect()
        .context("effect ranking for enrichment failed")?;
    let enrichment = enrichment::enrichment_test(
        &full_ranking,
        gene_sets,
        &config.enrichment,
        config.seed,
    )
    .context("enrichment testing failed")?;

    Ok(PipelineRun {
        differential,
        significant,
        candidate_ids,
        dendrogram,
        kmeans,
        components,
        forest,
        candidates,
        enrichment,
    })
}

/// Candidate genes with a defined adjusted p, scored by significance.
fn differential_source(
    differential: &DifferentialResults,
    candidate_rows: &[usize],
) -> crate::error::Result<RankedGeneList> {
    let pairs = candidate_rows
        .iter()
        .filter_map(|&i| {
            differential.adjusted_p_values[i]
                .map(|p| (differential.gene_ids[i].clone(), 1.0 - p))
        })
        .collect();
    RankedGeneList::from_scores(pairs)
}

/// Component-1 gene contributions by absolute loading.
fn pca_source(
    components: &PrincipalComponents,
    top_n: usize,
) -> crate::error::Result<RankedGeneList> {
    let pairs = components
        .top_loadings(0, top_n)?
        .into_iter()
        .map(|(gene, loading)| (gene, loading.abs()))
        .collect();
    RankedGeneList::from_scores(pairs)
}
