//! Per-gene dispersion estimation with trend shrinkage.
//!
//! Raw dispersions come from a method-of-moments estimate on the normalized
//! counts. With few replicates those estimates are noisy, so they are shrunk
//! toward a mean-dispersion trend `alpha(mu) = a0 + a1 / mu` fit across all
//! genes, with a shrinkage weight derived from the ratio of between-gene
//! spread to spread around the trend. Genes with zero variance get a zero
//! dispersion and are flagged unusable; the Wald test reports them as NA.

use ndarray::Axis;

use crate::data::NormalizedMatrix;
use crate::error::{PipelineError, Result};

const DISPERSION_FLOOR: f64 = 1e-8;

/// Dispersion fit over all genes of a normalized matrix.
#[derive(Debug, Clone)]
pub struct DispersionEstimates {
    /// Method-of-moments estimate per gene (0 when variance ≤ Poisson).
    pub raw: Vec<f64>,
    /// Trend value at each gene's mean.
    pub fitted: Vec<f64>,
    /// Shrunk estimate handed to the Wald test.
    pub shrunk: Vec<f64>,
    /// False for genes whose variance across samples is zero.
    pub usable: Vec<bool>,
    /// Shrinkage weight toward the trend, in [0, 1].
    pub delta: f64,
    /// Per-gene mean of normalized counts.
    pub means: Vec<f64>,
}

/// Estimate shrunk per-gene dispersions for `matrix`.
///
/// # Errors
///
/// `Data` if the matrix has no genes, `Numeric` if a mean or variance comes
/// out non-finite.
pub fn estimate(matrix: &NormalizedMatrix) -> Result<DispersionEstimates> {
    let n_genes = matrix.n_genes();
    let n_samples = matrix.n_samples() as f64;
    if n_genes == 0 {
        return Err(PipelineError::data("cannot estimate dispersions: no genes"));
    }
    if n_samples < 2.0 {
        return Err(PipelineError::data(format!(
            "cannot estimate dispersions with {} sample(s); at least 2 required",
            matrix.n_samples()
        )));
    }

    // Sampling term: counts were divided by size factors, so the Poisson
    // part of the variance on the normalized scale is mu * mean(1/sf).
    let xi = matrix.size_factors.iter().map(|&s| 1.0 / s).sum::<f64>() / n_samples;

    let mut means = Vec::with_capacity(n_genes);
    let mut raw = Vec::with_capacity(n_genes);
    let mut usable = Vec::with_capacity(n_genes);

    for row in matrix.values.axis_iter(Axis(0)) {
        let mean = row.sum() / n_samples;
        let var = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>()
            / (n_samples - 1.0);
        if !mean.is_finite() || !var.is_finite() {
            return Err(PipelineError::numeric(
                "non-finite mean or variance during dispersion estimation",
            ));
        }
        means.push(mean);
        usable.push(var > 0.0);
        if var > 0.0 && mean > 0.0 {
            raw.push(((var - mean * xi) / (mean * mean)).max(0.0));
        } else {
            raw.push(0.0);
        }
    }

    let (a0, a1) = fit_trend(&means, &raw, &usable);
    let fitted: Vec<f64> = means
        .iter()
        .map(|&mu| {
            if mu > 0.0 {
                (a0 + a1 / mu).max(DISPERSION_FLOOR)
            } else {
                DISPERSION_FLOOR
            }
        })
        .collect();

    let delta = shrinkage_weight(&raw, &fitted, &usable);
    let shrunk: Vec<f64> = raw
        .iter()
        .zip(&fitted)
        .zip(&usable)
        .map(|((&r, &f), &ok)| {
            if ok {
                ((1.0 - delta) * r + delta * f).max(DISPERSION_FLOOR)
            } else {
                0.0
            }
        })
        .collect();

    Ok(DispersionEstimates {
        raw,
        fitted,
        shrunk,
        usable,
        delta,
        means,
    })
}

/// Least-squares fit of `alpha = a0 + a1 / mu` over usable genes with a
/// positive raw dispersion. Falls back to a flat trend at the mean raw
/// dispersion when there are too few points to regress.
fn fit_trend(means: &[f64], raw: &[f64], usable: &[bool]) -> (f64, f64) {
    let points: Vec<(f64, f64)> = means
        .iter()
        .zip(raw)
        .zip(usable)
        .filter(|&((&mu, &r), &ok)| ok && mu > 0.0 && r > 0.0)
        .map(|((&mu, &r), _)| (1.0 / mu, r))
        .collect();

    if points.len() < 3 {
        let fallback = if points.is_empty() {
            DISPERSION_FLOOR
        } else {
            points.iter().map(|&(_, r)| r).sum::<f64>() / points.len() as f64
        };
        return (fallback, 0.0);
    }

    let n = points.len() as f64;
    let sx: f64 = points.iter().map(|&(x, _)| x).sum();
    let sy: f64 = points.iter().map(|&(_, y)| y).sum();
    let sxx: f64 = points.iter().map(|&(x, _)| x * x).sum();
    let sxy: f64 = points.iter().map(|&(x, y)| x * y).sum();

    let det = n * sxx - sx * sx;
    if det.abs() < f64::EPSILON {
        return (sy / n, 0.0);
    }
    let a1 = ((n * sxy - sx * sy) / det).max(0.0);
    let a0 = ((sy - a1 * sx) / n).max(0.0);
    (a0, a1)
}

/// Shrinkage weight: between-gene variance of the raw estimates relative to
/// their squared deviation from the trend. Near 1 when raw estimates are
/// noise around the trend, near 0 when genes genuinely differ.
fn shrinkage_weight(raw: &[f64], fitted: &[f64], usable: &[bool]) -> f64 {
    let values: Vec<(f64, f64)> = raw
        .iter()
        .zip(fitted)
        .zip(usable)
        .filter(|&(_, &ok)| ok)
        .map(|((&r, &f), _)| (r, f))
        .collect();
    let g = values.len() as f64;
    if g < 3.0 {
        return 1.0;
    }

    let mean_raw = values.iter().map(|&(r, _)| r).sum::<f64>() / g;
    let var_raw = values
        .iter()
        .map(|&(r, _)| (r - mean_raw) * (r - mean_raw))
        .sum::<f64>()
        / (g - 1.0);
    let dev_trend = values
        .iter()
        .map(|&(r, f)| (r - f) * (r - f))
        .sum::<f64>()
        / (g - 2.0);

    if dev_trend <= 0.0 {
        return 1.0;
    }
    (var_raw / dev_trend).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn normalized(values: Array2<f64>) -> NormalizedMatrix {
        let n_samples = values.ncols();
        NormalizedMatrix {
            gene_ids: (0..values.nrows()).map(|i| format!("g{}", i)).collect(),
            sample_ids: (0..n_samples).map(|j| format!("s{}", j)).collect(),
            values,
            size_factors: Array1::ones(n_samples),
        }
    }

    #[test]
    fn zero_variance_genes_are_flagged() {
        let m = normalized(ndarray::array![
            [5.0, 5.0, 5.0, 5.0],
            [1.0, 9.0, 2.0, 8.0]
        ]);
        let fit = estimate(&m).unwrap();
        assert!(!fit.usable[0]);
        assert!(fit.usable[1]);
        assert_eq!(fit.shrunk[0], 0.0);
        assert!(fit.shrunk[1] > 0.0);
    }

    #[test]
    fn overdispersed_gene_gets_positive_raw_estimate() {
        // Variance far above the mean: clearly more than Poisson noise.
        let m = normalized(ndarray::array![
            [10.0, 200.0, 15.0, 180.0],
            [100.0, 101.0, 99.0, 100.0]
        ]);
        let fit = estimate(&m).unwrap();
        assert!(fit.raw[0] > fit.raw[1]);
    }

    #[test]
    fn delta_stays_in_unit_interval() {
        let m = normalized(ndarray::array![
            [10.0, 20.0, 15.0, 18.0],
            [100.0, 140.0, 99.0, 120.0],
            [3.0, 9.0, 4.0, 7.0],
            [55.0, 42.0, 60.0, 48.0]
        ]);
        let fit = estimate(&m).unwrap();
        assert!((0.0..=1.0).contains(&fit.delta));
        assert!(fit.shrunk.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn single_sample_is_rejected() {
        let m = normalized(ndarray::array![[5.0], [2.0]]);
        assert!(estimate(&m).is_err());
    }
}
