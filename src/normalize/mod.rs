//! Count normalization via the median-of-ratios method.
//!
//! Each sample gets a size factor: the median over genes of the ratio
//! between the sample's count and the gene's geometric mean across samples,
//! restricted to genes whose geometric mean is non-zero. Size factors are
//! then re-centered so their geometric mean is exactly 1, and normalized
//! counts are `raw / size factor`, which preserves within-sample gene
//! ranking.

use log::{debug, info};
use ndarray::{Array1, Array2, Axis};

use crate::config::FilterConfig;
use crate::data::{CountMatrix, NormalizedMatrix, SampleMetadata};
use crate::error::{PipelineError, Result};

/// Row indices of genes expressed (count ≥ `min_count`) in at least
/// `min_fraction` of samples.
///
/// # Errors
///
/// `Configuration` if the filter removes every gene.
pub fn filter_genes(matrix: &CountMatrix, cfg: &FilterConfig) -> Result<Vec<usize>> {
    let n_samples = matrix.n_samples() as f64;
    let kept: Vec<usize> = matrix
        .counts()
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| {
            let expressed = row.iter().filter(|&&c| c >= cfg.min_count).count() as f64;
            expressed / n_samples >= cfg.min_fraction
        })
        .map(|(i, _)| i)
        .collect();

    if kept.is_empty() {
        return Err(PipelineError::configuration(format!(
            "expression filter (min_count={}, min_fraction={}) removed all {} genes",
            cfg.min_count,
            cfg.min_fraction,
            matrix.n_genes()
        )));
    }
    debug!(
        "expression filter kept {}/{} genes",
        kept.len(),
        matrix.n_genes()
    );
    Ok(kept)
}

/// Median-of-ratios size factors, re-centered to geometric mean 1.
///
/// # Errors
///
/// `Data` if any sample has a zero total count (named in the message), or if
/// no gene has a non-zero geometric mean across samples.
pub fn size_factors(matrix: &CountMatrix) -> Result<Array1<f64>> {
    let counts = matrix.counts();
    let (n_genes, n_samples) = counts.dim();

    for (j, col) in counts.axis_iter(Axis(1)).enumerate() {
        if col.iter().all(|&c| c == 0) {
            return Err(PipelineError::data(format!(
                "sample '{}' has zero total count",
                matrix.sample_ids()[j]
            )));
        }
    }

    // Log-scale geometric means; genes with any zero count drop out, which
    // is exactly the "non-zero geometric mean" restriction.
    let mut log_means = Vec::with_capacity(n_genes);
    let mut usable = Vec::new();
    for (i, row) in counts.axis_iter(Axis(0)).enumerate() {
        if row.iter().all(|&c| c > 0) {
            let log_mean =
                row.iter().map(|&c| (c as f64).ln()).sum::<f64>() / n_samples as f64;
            log_means.push(log_mean);
            usable.push(i);
        }
    }
    if usable.is_empty() {
        return Err(PipelineError::data(
            "no gene has a non-zero geometric mean across samples; size factors are undefined",
        ));
    }

    let mut factors = Array1::zeros(n_samples);
    for j in 0..n_samples {
        let mut ratios: Vec<f64> = usable
            .iter()
            .zip(&log_means)
            .map(|(&i, &log_mean)| ((counts[[i, j]] as f64).ln() - log_mean).exp())
            .collect();
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        factors[j] = median_sorted(&ratios);
    }

    if factors.iter().any(|&f| f <= 0.0 || !f.is_finite()) {
        return Err(PipelineError::numeric(
            "size factor estimation produced a non-positive or non-finite factor",
        ));
    }

    // Re-center so the geometric mean of the factors is 1.
    let center =
        (factors.iter().map(|&f| f.ln()).sum::<f64>() / n_samples as f64).exp();
    factors.mapv_inplace(|f| f / center);

    Ok(factors)
}

/// Filter, estimate size factors, and normalize a count matrix.
///
/// The metadata is only consulted for ID validation here; the group labels
/// themselves are consumed by the differential tester.
pub fn normalize(
    matrix: &CountMatrix,
    metadata: &SampleMetadata,
    cfg: &FilterConfig,
) -> Result<NormalizedMatrix> {
    metadata.validate_against(matrix)?;

    let kept = filter_genes(matrix, cfg)?;
    let filtered = matrix.select_genes(&kept)?;
    let factors = size_factors(&filtered)?;

    let (n_genes, n_samples) = filtered.counts().dim();
    let mut values = Array2::zeros((n_genes, n_samples));
    for ((i, j), v) in values.indexed_iter_mut() {
        *v = filtered.counts()[[i, j]] as f64 / factors[j];
    }

    info!(
        "normalized {} genes x {} samples (filtered from {})",
        n_genes,
        n_samples,
        matrix.n_genes()
    );

    Ok(NormalizedMatrix {
        gene_ids: filtered.gene_ids().to_vec(),
        sample_ids: filtered.sample_ids().to_vec(),
        values,
        size_factors: factors,
    })
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}
