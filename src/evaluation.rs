//! Retrieval quality metrics for ranked similarity lists.
//!
//! Ground truth comes from the document ids themselves: an id-grouping
//! function maps every id to the group it belongs to, and two documents
//! are relevant to each other when they share a group.

use std::{collections::HashMap, path::Path};

use serde::Serialize;

use crate::ranking::{Match, RankRow, sort_descending};

/// Mean and sample standard deviation of a set of scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreStats {
    pub mean: f64,
    pub stdev: f64,
}

impl ScoreStats {
    /// `None` for an empty slice; a single value has a deviation of 0.
    fn from_values(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let stdev = if values.len() < 2 {
            0.0
        } else {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (values.len() - 1) as f64;
            var.sqrt()
        };
        Some(Self { mean, stdev })
    }
}

/// Aggregated metrics over a rank matrix.
///
/// The means cover only queries with at least one relevant document;
/// they are `None` when there is no such query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub k: usize,
    pub queries: usize,
    pub queries_with_relevant: usize,
    pub precision_at_k: Option<f64>,
    pub recall_at_k: Option<f64>,
    pub mean_reciprocal_rank: Option<f64>,
    /// Similarity of the best-ranked relevant document.
    pub first_match: Option<ScoreStats>,
    /// Similarity of the best-ranked irrelevant document.
    pub first_non_match: Option<ScoreStats>,
}

pub struct Evaluator<F> {
    group_of: F,
}

impl<F> Evaluator<F>
where
    F: Fn(&str) -> String,
{
    pub fn new(group_of: F) -> Self {
        Self { group_of }
    }

    /// Relevance of each match to `query`, skipping the query itself.
    fn relevance(
        &self,
        query: &str,
        matches: &[Match],
    ) -> (Vec<bool>, Vec<f64>) {
        let group = (self.group_of)(query);
        matches
            .iter()
            .filter(|m| m.id != query)
            .map(|m| ((self.group_of)(&m.id) == group, m.similarity))
            .unzip()
    }

    pub fn summarise(&self, matrix: &[RankRow], k: usize) -> EvaluationSummary {
        let mut precision = Vec::new();
        let mut recall = Vec::new();
        let mut reciprocal = Vec::new();
        let mut first_matches = Vec::new();
        let mut first_non_matches = Vec::new();

        for (query, matches) in matrix {
            let mut matches = matches.clone();
            sort_descending(&mut matches);
            let (relevant, scores) = self.relevance(query, &matches);

            if relevant.contains(&true) {
                precision.push(precision_at_k(&relevant, k));
                recall.push(recall_at_k(&relevant, k));
                reciprocal.push(reciprocal_rank(&relevant));
                first_matches.extend(first_match(&relevant, &scores));
            }
            first_non_matches.extend(first_non_match(&relevant, &scores));
        }

        EvaluationSummary {
            k,
            queries: matrix.len(),
            queries_with_relevant: precision.len(),
            precision_at_k: mean(&precision),
            recall_at_k: mean(&recall),
            mean_reciprocal_rank: mean(&reciprocal),
            first_match: ScoreStats::from_values(&first_matches),
            first_non_match: ScoreStats::from_values(&first_non_matches),
        }
    }
}

/// Fraction of the first `k` positions holding a relevant document.
pub fn precision_at_k(relevant: &[bool], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits(relevant, k) as f64 / k as f64
}

/// Fraction of all relevant documents found in the first `k` positions.
pub fn recall_at_k(relevant: &[bool], k: usize) -> f64 {
    let total = relevant.iter().filter(|&&r| r).count();
    if total == 0 {
        return 0.0;
    }
    hits(relevant, k) as f64 / total as f64
}

fn hits(relevant: &[bool], k: usize) -> usize {
    relevant.iter().take(k).filter(|&&r| r).count()
}

/// `1 / rank` of the first relevant document, or 0 when there is none.
pub fn reciprocal_rank(relevant: &[bool]) -> f64 {
    relevant
        .iter()
        .position(|&r| r)
        .map_or(0.0, |pos| 1.0 / (pos + 1) as f64)
}

pub fn first_match(relevant: &[bool], scores: &[f64]) -> Option<f64> {
    relevant.iter().position(|&r| r).map(|pos| scores[pos])
}

pub fn first_non_match(relevant: &[bool], scores: &[f64]) -> Option<f64> {
    relevant.iter().position(|&r| !r).map(|pos| scores[pos])
}

/// Mean absolute difference between estimated and exact similarities,
/// pairing rows by query id and entries by document id.
pub fn jaccard_estimation_error(
    estimated: &[RankRow],
    exact: &[RankRow],
) -> Option<f64> {
    let exact: HashMap<&str, HashMap<&str, f64>> = exact
        .iter()
        .map(|(query, row)| {
            let row = row
                .iter()
                .map(|m| (m.id.as_str(), m.similarity))
                .collect();
            (query.as_str(), row)
        })
        .collect();

    let errors: Vec<f64> = estimated
        .iter()
        .filter_map(|(query, row)| {
            exact.get(query.as_str()).map(|truth| (row, truth))
        })
        .flat_map(|(row, truth)| {
            row.iter().filter_map(|m| {
                truth
                    .get(m.id.as_str())
                    .map(|exact| (m.similarity - exact).abs())
            })
        })
        .collect();

    mean(&errors)
}

/// Group by the first run of digits in the file name.
///
/// ```
/// use neardup::evaluation::group_by_file_number;
///
/// assert_eq!(group_by_file_number("corpus/12-copy.txt"), "12");
/// assert_eq!(group_by_file_number("corpus/12-copy/3.txt"), "3");
/// ```
pub fn group_by_file_number(id: &str) -> String {
    let name = Path::new(id)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(id);
    name.chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect()
}

/// Group `source_entry_version` ids by `source_entry`.
pub fn group_by_uid_prefix(id: &str) -> String {
    let mut parts = id.splitn(3, '_');
    match (parts.next(), parts.next()) {
        (Some(source), Some(entry)) => format!("{source}_{entry}"),
        _ => id.to_string(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
