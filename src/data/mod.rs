//! Core data model for the pipeline.
//!
//! [`CountMatrix`] and [`SampleMetadata`] are the immutable pipeline inputs;
//! every stage borrows them read-only and returns newly owned outputs.
//! Identifier invariants (uniqueness, column/metadata bijection) are checked
//! at construction so downstream stages can assume them.

use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2};

use crate::error::{PipelineError, Result};

/// Raw gene-by-sample count matrix: genes are rows, samples are columns,
/// entries are non-negative integer counts.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
    counts: Array2<u64>,
}

impl CountMatrix {
    /// Build a count matrix, validating ID uniqueness on both axes and the
    /// matrix shape.
    pub fn new(
        counts: Array2<u64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if counts.nrows() != gene_ids.len() {
            return Err(PipelineError::data(format!(
                "matrix has {} rows but {} gene IDs",
                counts.nrows(),
                gene_ids.len()
            )));
        }
        if counts.ncols() != sample_ids.len() {
            return Err(PipelineError::data(format!(
                "matrix has {} columns but {} sample IDs",
                counts.ncols(),
                sample_ids.len()
            )));
        }
        check_unique(&gene_ids, "gene")?;
        check_unique(&sample_ids, "sample")?;

        Ok(CountMatrix {
            gene_ids,
            sample_ids,
            counts,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// New matrix restricted to the given gene rows, in the given order.
    pub fn select_genes(&self, rows: &[usize]) -> Result<CountMatrix> {
        for &r in rows {
            if r >= self.n_genes() {
                return Err(PipelineError::data(format!(
                    "gene row index {} out of range ({} genes)",
                    r,
                    self.n_genes()
                )));
            }
        }
        let counts = self.counts.select(ndarray::Axis(0), rows);
        let gene_ids = rows.iter().map(|&r| self.gene_ids[r].clone()).collect();
        CountMatrix::new(counts, gene_ids, self.sample_ids.clone())
    }
}

/// Per-sample group labels and optional covariates. Sample IDs must biject
/// with the columns of the count matrix they describe.
#[derive(Debug, Clone)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    groups: Vec<String>,
    covariates: HashMap<String, Vec<String>>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>, groups: Vec<String>) -> Result<Self> {
        if sample_ids.len() != groups.len() {
            return Err(PipelineError::data(format!(
                "{} sample IDs but {} group labels",
                sample_ids.len(),
                groups.len()
            )));
        }
        check_unique(&sample_ids, "sample")?;
        Ok(SampleMetadata {
            sample_ids,
            groups,
            covariates: HashMap::new(),
        })
    }

    /// Attach a named covariate column (one value per sample).
    pub fn with_covariate(mut self, name: &str, values: Vec<String>) -> Result<Self> {
        if values.len() != self.sample_ids.len() {
            return Err(PipelineError::data(format!(
                "covariate '{}' has {} values for {} samples",
                name,
                values.len(),
                self.sample_ids.len()
            )));
        }
        self.covariates.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn covariate(&self, name: &str) -> Option<&[String]> {
        self.covariates.get(name).map(Vec::as_slice)
    }

    /// Check that the metadata describes exactly the columns of `matrix`,
    /// in matching order. Reports the offending identifiers on mismatch.
    pub fn validate_against(&self, matrix: &CountMatrix) -> Result<()> {
        let meta: HashSet<&String> = self.sample_ids.iter().collect();
        let cols: HashSet<&String> = matrix.sample_ids().iter().collect();

        let missing: Vec<&str> = cols
            .difference(&meta)
            .map(|s| s.as_str())
            .collect();
        let extra: Vec<&str> = meta.difference(&cols).map(|s| s.as_str()).collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(PipelineError::data(format!(
                "sample IDs do not biject with matrix columns; missing from metadata: [{}], absent from matrix: [{}]",
                missing.join(", "),
                extra.join(", ")
            )));
        }
        for (a, b) in self.sample_ids.iter().zip(matrix.sample_ids()) {
            if a != b {
                return Err(PipelineError::data(format!(
                    "sample order mismatch: metadata '{}' vs matrix column '{}'",
                    a, b
                )));
            }
        }
        Ok(())
    }

    /// Split the samples into exactly two groups, returning
    /// `(label_a, indices_a, label_b, indices_b)` with labels ordered
    /// lexicographically for reproducibility.
    pub fn two_group_split(&self) -> Result<(String, Vec<usize>, String, Vec<usize>)> {
        let mut labels: Vec<&String> = self.groups.iter().collect::<HashSet<_>>().into_iter().collect();
        labels.sort();
        if labels.len() != 2 {
            return Err(PipelineError::configuration(format!(
                "exactly two groups required, found {}: [{}]",
                labels.len(),
                labels
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        let (a, b) = (labels[0].clone(), labels[1].clone());
        let idx_a = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| **g == a)
            .map(|(i, _)| i)
            .collect();
        let idx_b = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| **g == b)
            .map(|(i, _)| i)
            .collect();
        Ok((a, idx_a, b, idx_b))
    }
}

/// Normalized expression matrix produced by the normalizer, together with
/// the size factors that produced it.
#[derive(Debug, Clone)]
pub struct NormalizedMatrix {
    pub gene_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Genes × samples, `raw count / size factor`.
    pub values: Array2<f64>,
    /// One positive scalar per sample, geometric mean ≈ 1.
    pub size_factors: Array1<f64>,
}

impl NormalizedMatrix {
    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }
}

/// Gene list ordered by strictly descending score, unique genes.
#[derive(Debug, Clone)]
pub struct RankedGeneList {
    genes: Vec<String>,
    scores: Vec<f64>,
}

impl RankedGeneList {
    /// Build from unordered `(gene, score)` pairs; sorts by descending score
    /// with the gene ID as tie-break so equal scores still produce one
    /// canonical order.
    pub fn from_scores(pairs: Vec<(String, f64)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (g, s) in &pairs {
            if !seen.insert(g.clone()) {
                return Err(PipelineError::data(format!("duplicate gene ID '{}'", g)));
            }
            if s.is_nan() {
                return Err(PipelineError::numeric(format!(
                    "NaN score for gene '{}'",
                    g
                )));
            }
        }
        let mut pairs = pairs;
        pairs.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let (genes, scores) = pairs.into_iter().unzip();
        Ok(RankedGeneList { genes, scores })
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Gene IDs of the top `n` entries.
    pub fn top(&self, n: usize) -> Vec<String> {
        self.genes.iter().take(n).cloned().collect()
    }
}

fn check_unique(ids: &[String], kind: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut dups = Vec::new();
    for id in ids {
        if !seen.insert(id) && !dups.contains(&id.as_str()) {
            dups.push(id.as_str());
        }
    }
    if !dups.is_empty() {
        return Err(PipelineError::data(format!(
            "duplicate {} IDs: [{}]",
            kind,
            dups.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn rejects_duplicate_gene_ids() {
        let counts = array![[1u64, 2], [3, 4]];
        let genes = vec!["g0".to_string(), "g0".to_string()];
        let err = CountMatrix::new(counts, genes, ids("s", 2)).unwrap_err();
        assert!(err.to_string().contains("g0"));
    }

    #[test]
    fn rejects_shape_mismatch() {
        let counts = array![[1u64, 2], [3, 4]];
        assert!(CountMatrix::new(counts, ids("g", 3), ids("s", 2)).is_err());
    }

    #[test]
    fn metadata_bijection_reports_offenders() {
        let counts = array![[1u64, 2], [3, 4]];
        let matrix = CountMatrix::new(counts, ids("g", 2), ids("s", 2)).unwrap();
        let meta = SampleMetadata::new(
            vec!["s0".to_string(), "sX".to_string()],
            vec!["A".to_string(), "B".to_string()],
        )
        .unwrap();
        let err = meta.validate_against(&matrix).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s1"));
        assert!(msg.contains("sX"));
    }

    #[test]
    fn two_group_split_is_ordered() {
        let meta = SampleMetadata::new(
            ids("s", 4),
            vec![
                "B".to_string(),
                "A".to_string(),
                "B".to_string(),
                "A".to_string(),
            ],
        )
        .unwrap();
        let (a, idx_a, b, idx_b) = meta.two_group_split().unwrap();
        assert_eq!(a, "A");
        assert_eq!(b, "B");
        assert_eq!(idx_a, vec![1, 3]);
        assert_eq!(idx_b, vec![0, 2]);
    }

    #[test]
    fn two_group_split_rejects_three_groups() {
        let meta = SampleMetadata::new(
            ids("s", 3),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        )
        .unwrap();
        assert!(meta.two_group_split().is_err());
    }

    #[test]
    fn ranked_list_is_strictly_ordered_and_unique() {
        let list = RankedGeneList::from_scores(vec![
            ("g1".to_string(), 0.5),
            ("g2".to_string(), 2.0),
            ("g3".to_string(), -1.0),
        ])
        .unwrap();
        assert_eq!(list.genes(), &["g2", "g1", "g3"]);
        assert!(RankedGeneList::from_scores(vec![
            ("g1".to_string(), 0.5),
            ("g1".to_string(), 1.5),
        ])
        .is_err());
    }
}
