//! Candidate table assembly.
//!
//! Joins several ranked gene lists into one table without inventing a
//! combined score: each source contributes a rank column, genes absent from
//! a source get a `None` entry, and row order follows first appearance
//! across the sources. This is a curation join, not a meta-analysis.

use std::collections::{HashMap, HashSet};

use crate::data::RankedGeneList;
use crate::error::{PipelineError, Result};

/// One named ranked source feeding the table.
#[derive(Debug, Clone)]
pub struct RankedSource {
    pub name: String,
    pub list: RankedGeneList,
}

impl RankedSource {
    pub fn new(name: impl Into<String>, list: RankedGeneList) -> RankedSource {
        RankedSource {
            name: name.into(),
            list,
        }
    }
}

/// The assembled candidate table.
#[derive(Debug, Clone)]
pub struct CandidateTable {
    /// Source names, in the order given.
    pub sources: Vec<String>,
    /// Genes in first-appearance order across the truncated sources.
    pub gene_ids: Vec<String>,
    /// `ranks[row][col]` is the 1-based rank of gene `row` in source `col`,
    /// `None` when the source did not rank it within the cutoff.
    pub ranks: Vec<Vec<Option<usize>>>,
}

impl CandidateTable {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Rank of `gene` in `source`, if both exist and the gene was ranked.
    pub fn rank_of(&self, gene: &str, source: &str) -> Option<usize> {
        let row = self.gene_ids.iter().position(|g| g == gene)?;
        let col = self.sources.iter().position(|s| s == source)?;
        self.ranks[row][col]
    }

    /// Genes ranked by every source.
    pub fn consensus_genes(&self) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.ranks.iter())
            .filter(|(_, row)| row.iter().all(Option::is_some))
            .map(|(g, _)| g.as_str())
            .collect()
    }
}

/// Build the candidate table from `sources`, truncating each to its top
/// `cutoff` genes first.
///
/// # Errors
///
/// `Configuration` for an empty source list, a zero cutoff, or duplicate
/// source names.
pub fn candidate_table(sources: &[RankedSource], cutoff: usize) -> Result<CandidateTable> {
    if sources.is_empty() {
        return Err(PipelineError::configuration(
            "candidate table needs at least one ranked source",
        ));
    }
    if cutoff == 0 {
        return Err(PipelineError::configuration("rank cutoff must be positive"));
    }
    for (i, source) in sources.iter().enumerate() {
        if sources[..i].iter().any(|s| s.name == source.name) {
            return Err(PipelineError::configuration(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
    }

    // Per-source gene -> 1-based rank, after truncation.
    let rank_maps: Vec<HashMap<String, usize>> = sources
        .iter()
        .map(|source| {
            source
                .list
                .top(cutoff)
                .into_iter()
                .enumerate()
                .map(|(i, gene)| (gene, i + 1))
                .collect()
        })
        .collect();

    let mut gene_ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for source in sources {
        for gene in source.list.top(cutoff) {
            if seen.insert(gene.clone()) {
                gene_ids.push(gene);
            }
        }
    }

    let ranks = gene_ids
        .iter()
        .map(|gene| {
            rank_maps
                .iter()
                .map(|map| map.get(gene).copied())
                .collect()
        })
        .collect();

    Ok(CandidateTable {
        sources: sources.iter().map(|s| s.name.clone()).collect(),
        gene_ids,
        ranks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, f64)]) -> RankedGeneList {
        RankedGeneList::from_scores(
            pairs.iter().map(|(g, s)| (g.to_string(), *s)).collect(),
        )
        .unwrap()
    }

    fn sources() -> Vec<RankedSource> {
        vec![
            RankedSource::new(
                "effect",
                list(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]),
            ),
            RankedSource::new(
                "importance",
                list(&[("b", 0.5), ("d", 0.3), ("a", 0.2)]),
            ),
        ]
    }

    #[test]
    fn union_in_first_appearance_order() {
        let table = candidate_table(&sources(), 3).unwrap();
        assert_eq!(table.gene_ids, vec!["a", "b", "c", "d"]);
        assert_eq!(table.sources, vec!["effect", "importance"]);
    }

    #[test]
    fn missing_genes_get_none_not_a_fabricated_rank() {
        let table = candidate_table(&sources(), 3).unwrap();
        assert_eq!(table.rank_of("c", "effect"), Some(3));
        assert_eq!(table.rank_of("c", "importance"), None);
        assert_eq!(table.rank_of("d", "effect"), None);
        assert_eq!(table.rank_of("d", "importance"), Some(2));
    }

    #[test]
    fn cutoff_truncates_each_source() {
        let table = candidate_table(&sources(), 2).unwrap();
        // "c" and "a"-in-importance fall outside the top 2.
        assert_eq!(table.gene_ids, vec!["a", "b", "d"]);
        assert_eq!(table.rank_of("a", "importance"), None);
    }

    #[test]
    fn consensus_requires_every_source() {
        let table = candidate_table(&sources(), 3).unwrap();
        assert_eq!(table.consensus_genes(), vec!["a", "b"]);
    }

    #[test]
    fn empty_sources_and_zero_cutoff_are_rejected() {
        assert!(candidate_table(&[], 3).is_err());
        assert!(candidate_table(&sources(), 0).is_err());
        let dup = vec![
            RankedSource::new("x", list(&[("a", 1.0)])),
            RankedSource::new("x", list(&[("b", 1.0)])),
        ];
        assert!(matches!(
            candidate_table(&dup, 1),
            Err(PipelineError::Configuration(_))
        ));
    }
}
