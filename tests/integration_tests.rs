// End-to-end tests over the public API: a small two-group count matrix with
// a known planted signal must come out of the full pipeline with exactly
// that signal flagged, ranked, and enriched.

use std::collections::HashSet;

use ndarray::Array2;

use biomarker_rank::config::PipelineConfig;
use biomarker_rank::data::{CountMatrix, SampleMetadata};
use biomarker_rank::enrichment::GeneSet;
use biomarker_rank::pipeline;

const N_GENES: usize = 20;
const N_SHIFTED: usize = 5;

/// 20 genes x 6 samples (3 vs 3). Genes g0..g4 carry a deterministic 4x
/// mean shift in group B; the rest repeat the same +-2 noise pattern in
/// both groups so they cannot separate the groups.
fn planted_dataset() -> (CountMatrix, SampleMetadata) {
    let mut counts = Array2::<u64>::zeros((N_GENES, 6));
    for i in 0..N_GENES {
        let base = 100 + i as u64;
        for j in 0..6 {
            let delta: i64 = [-2, 0, 2][j % 3];
            let mean = if i < N_SHIFTED && j >= 3 { 4 * base } else { base };
            counts[[i, j]] = (mean as i64 + delta) as u64;
        }
    }
    let gene_ids = (0..N_GENES).map(|i| format!("g{}", i)).collect();
    let sample_ids: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
    let matrix = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();

    let groups = (0..6)
        .map(|j| if j < 3 { "A" } else { "B" }.to_string())
        .collect();
    let metadata = SampleMetadata::new(sample_ids, groups).unwrap();
    (matrix, metadata)
}

fn shifted_ids() -> HashSet<String> {
    (0..N_SHIFTED).map(|i| format!("g{}", i)).collect()
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.enrichment.n_permutations = 200;
    config
}

#[test]
fn pipeline_discovers_the_planted_genes() {
    let (matrix, metadata) = planted_dataset();
    let sets = vec![GeneSet::new("planted", shifted_ids())];
    let run = pipeline::run(&matrix, &metadata, &sets, &test_config()).unwrap();

    // Exactly the five shifted genes pass BH at 0.05.
    let significant: HashSet<String> = run.significant.iter().cloned().collect();
    assert_eq!(significant, shifted_ids());

    // The forest ranks the same five genes highest by importance.
    let top5: HashSet<String> = run
        .forest
        .ranked_features()
        .into_iter()
        .take(N_SHIFTED)
        .map(|(gene, _)| gene)
        .collect();
    assert_eq!(top5, shifted_ids());

    // OOB diagnostics exist without any held-out split.
    assert_eq!(run.forest.oob_curve.len(), 200);
    assert!(run.forest.oob_error().is_some());
}

#[test]
fn pipeline_enriches_the_planted_set_and_skips_the_absent_one() {
    let (matrix, metadata) = planted_dataset();
    let sets = vec![
        GeneSet::new("planted", shifted_ids()),
        GeneSet::new(
            "absent",
            (0..6).map(|i| format!("zz{}", i)).collect::<Vec<_>>(),
        ),
    ];
    let run = pipeline::run(&matrix, &metadata, &sets, &test_config()).unwrap();

    let planted = run.enrichment.get("planted").unwrap();
    assert_eq!(planted.size, Some(N_SHIFTED));
    assert!(planted.enrichment_score.unwrap() > 0.9);
    assert!(planted.p_value.unwrap() < 0.05);

    let absent = run.enrichment.get("absent").unwrap();
    assert_eq!(absent.size, None);
    assert_eq!(absent.p_value, None);
}

#[test]
fn pipeline_output_is_internally_consistent() {
    let (matrix, metadata) = planted_dataset();
    let sets = vec![GeneSet::new("planted", shifted_ids())];
    let run = pipeline::run(&matrix, &metadata, &sets, &test_config()).unwrap();

    // Candidates cover every surviving gene here (top_n exceeds 20).
    assert_eq!(run.candidate_ids.len(), N_GENES);
    assert_eq!(run.dendrogram.n_leaves(), N_GENES);
    assert_eq!(run.kmeans.assignment.item_ids.len(), N_GENES);
    assert_eq!(run.components.feature_ids.len(), N_GENES);

    // Every candidate table gene appears in at least one source column.
    for row in &run.candidates.ranks {
        assert!(row.iter().any(Option::is_some));
    }

    // Cutting the dendrogram at 2 isolates the shifted genes from the rest.
    let cut = run.dendrogram.cut(2).unwrap();
    let shifted_label = cut.labels[0];
    let members: HashSet<String> = cut
        .members(shifted_label)
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(members, shifted_ids());
}

#[test]
fn pipeline_is_deterministic_for_a_fixed_seed() {
    let (matrix, metadata) = planted_dataset();
    let sets = vec![GeneSet::new("planted", shifted_ids())];
    let config = test_config();

    let a = pipeline::run(&matrix, &metadata, &sets, &config).unwrap();
    let b = pipeline::run(&matrix, &metadata, &sets, &config).unwrap();

    assert_eq!(a.significant, b.significant);
    assert_eq!(a.forest.importances, b.forest.importances);
    assert_eq!(a.kmeans.assignment.labels, b.kmeans.assignment.labels);
    assert_eq!(
        a.enrichment.get("planted").unwrap().p_value,
        b.enrichment.get("planted").unwrap().p_value
    );
}

#[test]
fn three_groups_abort_the_run() {
    let (matrix, _) = planted_dataset();
    let groups = vec!["A", "B", "C", "A", "B", "C"]
        .into_iter()
        .map(String::from)
        .collect();
    let metadata =
        SampleMetadata::new(matrix.sample_ids().to_vec(), groups).unwrap();
    let err = pipeline::run(&matrix, &metadata, &[], &test_config()).unwrap_err();
    assert!(err.to_string().contains("differential testing"));
}
