//! Permutation gene-set enrichment over a full ranked list.
//!
//! For each set the running-sum statistic rises (rank-weighted) on member
//! genes and falls otherwise; the enrichment score is the maximal signed
//! deviation. Significance comes from permuting the gene/rank association:
//! member positions are redrawn uniformly over the list, each permutation
//! on its own ChaCha stream so the rayon batch order is irrelevant. Sets
//! overlapping the list in fewer than `min_overlap` genes are reported as
//! skipped (all-`None`), never silently omitted.

use std::collections::HashSet;

use log::{info, warn};
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::config::EnrichmentConfig;
use crate::data::RankedGeneList;
use crate::error::{PipelineError, Result};
use crate::rng::{Stage, unit_rng};
use crate::testing::correction::benjamini_hochberg;

/// A named gene set.
#[derive(Debug, Clone)]
pub struct GeneSet {
    pub name: String,
    pub genes: HashSet<String>,
}

impl GeneSet {
    pub fn new(name: impl Into<String>, genes: impl IntoIterator<Item = String>) -> GeneSet {
        GeneSet {
            name: name.into(),
            genes: genes.into_iter().collect(),
        }
    }
}

/// Per-set outcome. A skipped set keeps its name and leaves every statistic
/// `None`.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub set_name: String,
    /// Overlap with the ranked list; `None` when below the minimum.
    pub size: Option<usize>,
    pub enrichment_score: Option<f64>,
    /// Score divided by the mean magnitude of same-signed null scores.
    pub normalized_score: Option<f64>,
    pub p_value: Option<f64>,
    pub adjusted_p_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EnrichmentResults {
    pub results: Vec<EnrichmentResult>,
}

impl EnrichmentResults {
    pub fn get(&self, set_name: &str) -> Option<&EnrichmentResult> {
        self.results.iter().find(|r| r.set_name == set_name)
    }
}

/// Test every set in `sets` against the full `ranked` list.
///
/// # Errors
///
/// `Configuration` for zero permutations; `Data` for an empty ranked list.
pub fn enrichment_test(
    ranked: &RankedGeneList,
    sets: &[GeneSet],
    cfg: &EnrichmentConfig,
    seed: u64,
) -> Result<EnrichmentResults> {
    if ranked.is_empty() {
        return Err(PipelineError::data("enrichment needs a non-empty ranked list"));
    }
    if cfg.n_permutations == 0 {
        return Err(PipelineError::configuration(
            "at least one permutation required",
        ));
    }

    let weights: Vec<f64> = ranked
        .scores()
        .iter()
        .map(|s| s.abs().powf(cfg.weight_exponent))
        .collect();
    let n = ranked.len();

    let mut results: Vec<EnrichmentResult> = Vec::with_capacity(sets.len());
    for (set_idx, set) in sets.iter().enumerate() {
        let hits: Vec<bool> = ranked.genes().iter().map(|g| set.genes.contains(g)).collect();
        let n_hits = hits.iter().filter(|&&h| h).count();

        if n_hits < cfg.min_overlap || n_hits == n {
            if n_hits == n {
                warn!(
                    "enrichment: set '{}' covers the entire ranked list; skipped",
                    set.name
                );
            }
            results.push(skipped(&set.name));
            continue;
        }
        let es = match running_sum_score(&weights, &hits) {
            Some(es) => es,
            None => {
                warn!(
                    "enrichment: set '{}' has zero total hit weight; skipped",
                    set.name
                );
                results.push(skipped(&set.name));
                continue;
            }
        };

        // Null distribution: same hit count, positions redrawn.
        let nulls: Vec<f64> = (0..cfg.n_permutations)
            .into_par_iter()
            .filter_map(|perm| {
                let unit = ((set_idx as u64) << 32) | perm as u64;
                let mut rng = unit_rng(seed, Stage::Enrichment, unit);
                let mut positions: Vec<usize> = (0..n).collect();
                positions.shuffle(&mut rng);
                let mut null_hits = vec![false; n];
                for &p in positions.iter().take(n_hits) {
                    null_hits[p] = true;
                }
                running_sum_score(&weights, &null_hits)
            })
            .collect();

        let same_signed: Vec<f64> = nulls
            .iter()
            .copied()
            .filter(|v| v.signum() == es.signum())
            .collect();
        let (p_value, normalized_score) = if same_signed.is_empty() {
            (None, None)
        } else {
            let extreme = same_signed.iter().filter(|v| v.abs() >= es.abs()).count();
            let p = (extreme + 1) as f64 / (same_signed.len() + 1) as f64;
            let mean_abs =
                same_signed.iter().map(|v| v.abs()).sum::<f64>() / same_signed.len() as f64;
            (Some(p), Some(es / mean_abs))
        };

        results.push(EnrichmentResult {
            set_name: set.name.clone(),
            size: Some(n_hits),
            enrichment_score: Some(es),
            normalized_score,
            p_value,
            adjusted_p_value: None,
        });
    }

    // BH across the tested sets only; skipped sets stay None.
    let raw: Vec<Option<f64>> = results.iter().map(|r| r.p_value).collect();
    if raw.iter().any(Option::is_some) {
        let adjusted = benjamini_hochberg(&raw)?;
        for (result, adj) in results.iter_mut().zip(adjusted) {
            result.adjusted_p_value = adj;
        }
    }

    info!(
        "enrichment: tested {} of {} sets over {} genes",
        results.iter().filter(|r| r.size.is_some()).count(),
        sets.len(),
        n
    );
    Ok(EnrichmentResults { results })
}

fn skipped(name: &str) -> EnrichmentResult {
    EnrichmentResult {
        set_name: name.to_string(),
        size: None,
        enrichment_score: None,
        normalized_score: None,
        p_value: None,
        adjusted_p_value: None,
    }
}

/// Maximal signed deviation of the running sum; `None` when the hit weights
/// sum to zero.
fn running_sum_score(weights: &[f64], hits: &[bool]) -> Option<f64> {
    let hit_total: f64 = weights
        .iter()
        .zip(hits)
        .filter(|&(_, &h)| h)
        .map(|(w, _)| w)
        .sum();
    if hit_total <= 0.0 {
        return None;
    }
    let n_hits = hits.iter().filter(|&&h| h).count();
    let miss_step = 1.0 / (weights.len() - n_hits) as f64;

    let mut running = 0.0;
    let mut extreme = 0.0f64;
    for (w, &hit) in weights.iter().zip(hits) {
        if hit {
            running += w / hit_total;
        } else {
            running -= miss_step;
        }
        if running.abs() > extreme.abs() {
            extreme = running;
        }
    }
    Some(extreme)
}
