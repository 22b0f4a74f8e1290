use std::{cmp::Ordering, collections::HashSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::{error::Result, signature::Signature};

/// A candidate document and its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub similarity: f64,
}

/// A query id with its ranked matches.
pub type RankRow = (String, Vec<Match>);

/// Similarity of `query` to every candidate, in candidate order, keeping
/// only those at or above `threshold` (no filtering when `None`).
pub fn score<'a, I, S>(
    candidates: I,
    query: &Signature,
    threshold: Option<f64>,
) -> Result<Vec<Match>>
where
    I: IntoIterator<Item = (S, &'a Signature)>,
    S: AsRef<str>,
{
    let threshold = threshold.unwrap_or(0.0);
    let mut matches = Vec::new();
    for (id, signature) in candidates {
        let similarity = query.jaccard(signature)?;
        if similarity >= threshold {
            matches.push(Match {
                id: id.as_ref().to_string(),
                similarity,
            });
        }
    }
    Ok(matches)
}

/// [`score`], sorted by descending similarity. The sort is stable: equal
/// similarities keep candidate order.
///
/// # Examples
///
/// ```
/// use neardup::ranking::rank;
/// use neardup::signature::Signature;
///
/// let query = Signature::from_values(vec![1, 2, 3, 4]);
/// let half = Signature::from_values(vec![1, 2, 0, 0]);
/// let same = query.clone();
///
/// let ranked = rank([("half", &half), ("same", &same)], &query, None).unwrap();
/// assert_eq!(ranked[0].id, "same");
/// assert_eq!(ranked[1].similarity, 0.5);
///
/// let strict = rank([("half", &half), ("same", &same)], &query, Some(0.9)).unwrap();
/// assert_eq!(strict.len(), 1);
/// ```
pub fn rank<'a, I, S>(
    candidates: I,
    query: &Signature,
    threshold: Option<f64>,
) -> Result<Vec<Match>>
where
    I: IntoIterator<Item = (S, &'a Signature)>,
    S: AsRef<str>,
{
    let mut matches = score(candidates, query, threshold)?;
    sort_descending(&mut matches);
    Ok(matches)
}

pub(crate) fn sort_descending(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

/// Rank every document against the whole corpus, itself included.
///
/// This is the brute-force reference the index is measured against; its
/// cost is quadratic in the corpus size.
pub fn rank_matrix(corpus: &[(String, Signature)]) -> Result<Vec<RankRow>> {
    corpus
        .par_iter()
        .map(|(id, query)| {
            let ranked = rank(
                corpus.iter().map(|(other, sig)| (other.as_str(), sig)),
                query,
                None,
            )?;
            Ok((id.clone(), ranked))
        })
        .collect()
}

/// Exact Jaccard similarity of two token sets. Two empty sets score 0.
pub fn exact_jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    let union = left.union(right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(right).count() as f64 / union as f64
}

/// Exact Jaccard similarity of every pair of documents, in corpus order.
pub fn exact_jaccard_matrix(
    corpus: &[(String, HashSet<String>)],
) -> Vec<RankRow> {
    corpus
        .par_iter()
        .map(|(id, tokens)| {
            let row = corpus
                .iter()
                .map(|(other, other_tokens)| Match {
                    id: other.clone(),
                    similarity: exact_jaccard(tokens, other_tokens),
                })
                .collect();
            (id.clone(), row)
        })
        .collect()
}
