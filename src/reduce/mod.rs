//! Principal component analysis on a standardized sample × gene matrix.
//!
//! The covariance matrix of the (zero-mean, unit-variance) input is
//! eigendecomposed with a cyclic Jacobi sweep; components come out ordered
//! by descending eigenvalue with a fixed sign convention (the
//! largest-magnitude loading of each component is positive) so repeated
//! runs agree bit-for-bit. The eigendecomposition is a single blocking
//! call, deliberately not parallelized.

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{PipelineError, Result};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-12;

/// Ordered principal components with loadings and per-sample projections.
#[derive(Debug, Clone)]
pub struct PrincipalComponents {
    /// IDs of the features (genes) the loadings refer to.
    pub feature_ids: Vec<String>,
    /// Eigenvalues in descending order; their sum is the total variance.
    pub eigenvalues: Vec<f64>,
    /// Loadings, features × components, column `c` belongs to component `c`.
    pub loadings: Array2<f64>,
    /// Projections, samples × components.
    pub projections: Array2<f64>,
    /// Total variance of the input (sum of per-feature variances).
    pub total_variance: f64,
}

impl PrincipalComponents {
    pub fn n_components(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Fraction of total variance explained by component `c`.
    pub fn explained_ratio(&self, c: usize) -> f64 {
        self.eigenvalues[c] / self.total_variance
    }

    /// Top-`n` features of component `c` by absolute loading, descending.
    ///
    /// # Errors
    ///
    /// `Configuration` if `c` is out of range.
    pub fn top_loadings(&self, c: usize, n: usize) -> Result<Vec<(String, f64)>> {
        if c >= self.n_components() {
            return Err(PipelineError::configuration(format!(
                "component {} out of range ({} components)",
                c,
                self.n_components()
            )));
        }
        let mut ranked: Vec<(String, f64)> = self
            .feature_ids
            .iter()
            .cloned()
            .zip(self.loadings.column(c).iter().copied())
            .collect();
        ranked.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(n);
        Ok(ranked)
    }
}

/// Center and scale each column (feature) to zero mean and unit variance.
///
/// # Errors
///
/// `Configuration` naming the first zero-variance feature encountered.
pub fn standardize(matrix: ArrayView2<f64>, feature_ids: &[String]) -> Result<Array2<f64>> {
    let n = matrix.nrows() as f64;
    if n < 2.0 {
        return Err(PipelineError::data(
            "standardization needs at least 2 samples",
        ));
    }
    let mut out = matrix.to_owned();
    for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
        let mean = col.sum() / n;
        let var = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
        if var <= 0.0 {
            return Err(PipelineError::configuration(format!(
                "feature '{}' has zero variance; remove it before scaling",
                feature_ids[j]
            )));
        }
        let sd = var.sqrt();
        col.mapv_inplace(|v| (v - mean) / sd);
    }
    Ok(out)
}

/// Principal components of a pre-standardized sample × feature matrix.
///
/// # Errors
///
/// `Configuration` if any feature still has zero variance; `Numeric` if the
/// Jacobi iteration fails to converge.
pub fn pca(scaled: ArrayView2<f64>, feature_ids: &[String]) -> Result<PrincipalComponents> {
    let (n_samples, n_features) = scaled.dim();
    if feature_ids.len() != n_features {
        return Err(PipelineError::data(format!(
            "{} feature IDs for {} columns",
            feature_ids.len(),
            n_features
        )));
    }
    if n_samples < 2 {
        return Err(PipelineError::data("PCA needs at least 2 samples"));
    }
    for (j, col) in scaled.axis_iter(Axis(1)).enumerate() {
        let mean = col.sum() / n_samples as f64;
        let var = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>()
            / (n_samples as f64 - 1.0);
        if var <= 0.0 {
            return Err(PipelineError::configuration(format!(
                "feature '{}' has zero variance",
                feature_ids[j]
            )));
        }
    }

    // Covariance of the standardized input.
    let cov = scaled.t().dot(&scaled) / (n_samples as f64 - 1.0);
    let total_variance = cov.diag().sum();

    let (mut eigenvalues, mut vectors) = jacobi_eigen(cov)?;

    // Order by descending eigenvalue.
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    eigenvalues = order.iter().map(|&i| eigenvalues[i]).collect();
    vectors = vectors.select(Axis(1), &order);

    // Sign convention: largest-magnitude loading positive.
    for mut col in vectors.axis_iter_mut(Axis(1)) {
        let extreme = col
            .iter()
            .cloned()
            .max_by(|a, b| {
                a.abs()
                    .partial_cmp(&b.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0.0);
        if extreme < 0.0 {
            col.mapv_inplace(|v| -v);
        }
    }

    let projections = scaled.dot(&vectors);
    debug!(
        "pca: {} components, leading eigenvalue {:.4} of total {:.4}",
        eigenvalues.len(),
        eigenvalues.first().copied().unwrap_or(0.0),
        total_variance
    );

    Ok(PrincipalComponents {
        feature_ids: feature_ids.to_vec(),
        eigenvalues,
        loadings: vectors,
        projections,
        total_variance,
    })
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix. Returns
/// (eigenvalues, eigenvectors-as-columns), unordered.
fn jacobi_eigen(mut a: Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = a.nrows();
    let mut v = Array2::eye(n);

    for _sweep in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]] * a[[i, j]])
            .sum();
        if off < JACOBI_TOLERANCE {
            let eigenvalues = (0..n).map(|i| a[[i, i]]).collect();
            return Ok((eigenvalues, v));
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]].abs() < JACOBI_TOLERANCE / (n * n) as f64 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    Err(PipelineError::numeric(format!(
        "Jacobi eigendecomposition did not converge in {} sweeps",
        JACOBI_MAX_SWEEPS
    )))
}
