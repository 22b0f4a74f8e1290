//! Build and match orchestration.
//!
//! The build phase materialises signatures for labeled documents and
//! inserts them into an [`LshIndex`]. The match phase queries the index
//! with every unlabeled document and ranks the candidates it returns.
//! Signatures are cached in a [`SignatureStore`] and only computed for
//! documents that have none yet.

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    condenser::Condenser,
    error::{Error, Result},
    lsh::LshIndex,
    ranking::{Match, rank},
    signature::Signature,
    store::{DocumentRecord, SignatureStore},
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Consider at most this many records.
    pub limit: Option<usize>,
}

impl RunOptions {
    fn bound<'r>(
        &self,
        records: &'r [DocumentRecord],
    ) -> &'r [DocumentRecord] {
        match self.limit {
            Some(limit) => &records[..limit.min(records.len())],
            None => records,
        }
    }
}

/// Counts from materialising signatures, and from indexing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub processed: usize,
    /// Signatures found in the store.
    pub cached: usize,
    /// Signatures computed and written back.
    pub computed: usize,
    /// Documents without a signature because their content could not be
    /// read or decoded.
    pub skipped: usize,
    pub indexed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub processed: usize,
    pub skipped: usize,
    /// Queries with at least one match above the threshold.
    pub matched: usize,
}

/// Ranked matches for one query document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub query: String,
    pub matches: Vec<Match>,
}

impl MatchResult {
    /// Similarity of the best match.
    pub fn max_similarity(&self) -> f64 {
        self.matches.first().map_or(0.0, |m| m.similarity)
    }
}

enum Outcome {
    Cached(Signature),
    Computed(Signature),
    Skipped,
}

pub struct Pipeline<'a, S> {
    condenser: &'a Condenser,
    store: &'a S,
}

impl<'a, S: SignatureStore> Pipeline<'a, S> {
    pub fn new(condenser: &'a Condenser, store: &'a S) -> Self {
        Self { condenser, store }
    }

    /// The signature of `record`, computing and caching it when the store
    /// has none. `None` when the content cannot be read or decoded.
    pub fn signature_for(
        &self,
        record: &DocumentRecord,
    ) -> Result<Option<Signature>> {
        match self.lookup(record)? {
            Outcome::Cached(sig) => Ok(Some(sig)),
            Outcome::Computed(sig) => {
                self.store.put_signature(&record.id, &sig)?;
                Ok(Some(sig))
            }
            Outcome::Skipped => Ok(None),
        }
    }

    fn lookup(&self, record: &DocumentRecord) -> Result<Outcome> {
        if let Some(sig) = self.store.get_signature(&record.id)? {
            if sig.len() != self.condenser.permutations() {
                return Err(Error::DimensionMismatch {
                    left: self.condenser.permutations(),
                    right: sig.len(),
                });
            }
            return Ok(Outcome::Cached(sig));
        }

        let bytes = match std::fs::read(&record.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    error = %e,
                    "Skipping unreadable document"
                );
                return Ok(Outcome::Skipped);
            }
        };
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Outcome::Computed(self.condenser.signature(&text))),
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    error = %e,
                    "Skipping undecodable document"
                );
                Ok(Outcome::Skipped)
            }
        }
    }

    /// Signatures of `records`, in record order, leaving out skipped
    /// documents.
    ///
    /// Cache misses are computed in parallel and written back to the store
    /// in one batch.
    pub fn signatures(
        &self,
        records: &[DocumentRecord],
        options: &RunOptions,
    ) -> Result<(Vec<(String, Signature)>, BuildReport)> {
        let records = options.bound(records);
        let outcomes = records
            .par_iter()
            .map(|record| Ok((record.id.clone(), self.lookup(record)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut report = BuildReport {
            processed: records.len(),
            ..Default::default()
        };
        let mut fresh = Vec::new();
        let mut signatures = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            match outcome {
                Outcome::Cached(sig) => {
                    report.cached += 1;
                    signatures.push((id, sig));
                }
                Outcome::Computed(sig) => {
                    report.computed += 1;
                    fresh.push((id.clone(), sig.clone()));
                    signatures.push((id, sig));
                }
                Outcome::Skipped => report.skipped += 1,
            }
        }

        self.store.put_signatures(&fresh)?;
        Ok((signatures, report))
    }

    /// Insert the signatures of `records` into `index`.
    pub fn build(
        &self,
        index: &mut LshIndex,
        records: &[DocumentRecord],
        options: &RunOptions,
    ) -> Result<BuildReport> {
        let (signatures, mut report) = self.signatures(records, options)?;
        for (id, sig) in &signatures {
            index.insert(id, sig)?;
            report.indexed += 1;
        }

        tracing::info!(
            processed = report.processed,
            cached = report.cached,
            computed = report.computed,
            skipped = report.skipped,
            indexed = report.indexed,
            "Built index"
        );
        Ok(report)
    }

    /// Query `index` with every record and rank the candidates, other than
    /// the record itself, by similarity.
    ///
    /// Only queries with at least one candidate at or above `threshold`
    /// produce a [`MatchResult`]. Candidate signatures are read from the
    /// store; a candidate without one is a [`Error::NotFound`].
    pub fn match_documents(
        &self,
        index: &LshIndex,
        records: &[DocumentRecord],
        threshold: f64,
        options: &RunOptions,
    ) -> Result<(Vec<MatchResult>, MatchReport)> {
        let (queries, built) = self.signatures(records, options)?;

        let results = queries
            .par_iter()
            .map(|(query, sig)| self.match_one(index, query, sig, threshold))
            .collect::<Result<Vec<_>>>()?;
        let results: Vec<MatchResult> =
            results.into_iter().flatten().collect();

        let report = MatchReport {
            processed: built.processed,
            skipped: built.skipped,
            matched: results.len(),
        };
        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            matched = report.matched,
            "Matched documents"
        );
        Ok((results, report))
    }

    fn match_one(
        &self,
        index: &LshIndex,
        query: &str,
        signature: &Signature,
        threshold: f64,
    ) -> Result<Option<MatchResult>> {
        let peers = index
            .query(signature)?
            .into_iter()
            .filter(|id| id != query)
            .map(|id| {
                let sig = self.store.get_signature(&id)?.ok_or_else(|| {
                    Error::NotFound {
                        kind: "signature",
                        name: id.clone(),
                    }
                })?;
                Ok((id, sig))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::trace!(query, candidates = peers.len(), "Queried index");
        let matches = rank(
            peers.iter().map(|(id, sig)| (id.as_str(), sig)),
            signature,
            Some(threshold),
        )?;

        Ok((!matches.is_empty()).then(|| MatchResult {
            query: query.to_string(),
            matches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        lsh::LshConfig,
        store::{MemoryStore, RAW_STREAM},
    };

    fn condenser() -> Condenser {
        Condenser::from_spec("ws:norm::128").unwrap()
    }

    fn write_record(
        dir: &Path,
        id: &str,
        bytes: &[u8],
        label: Option<&str>,
    ) -> DocumentRecord {
        let path = dir.join(id);
        std::fs::write(&path, bytes).unwrap();
        DocumentRecord {
            id: id.to_string(),
            path,
            stream: RAW_STREAM.to_string(),
            size: bytes.len() as u64,
            digest: String::new(),
            tags: Vec::new(),
            label: label.map(str::to_string),
        }
    }

    fn index() -> LshIndex {
        LshIndex::new(&LshConfig::new(0.5, 128)).unwrap()
    }

    #[test]
    fn quick_fox_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let labeled = vec![
            write_record(tmp.path(), "B", b"the quick fox", Some("seen")),
            write_record(
                tmp.path(),
                "C",
                b"totally different text",
                Some("seen"),
            ),
        ];
        let queries =
            vec![write_record(tmp.path(), "A", b"the quick fox", None)];

        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);
        let mut idx = index();

        let built = pipeline
            .build(&mut idx, &labeled, &RunOptions::default())
            .unwrap();
        assert_eq!(built.indexed, 2);
        assert_eq!(built.computed, 2);

        let (results, report) = pipeline
            .match_documents(&idx, &queries, 0.5, &RunOptions::default())
            .unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].query, "A");
        assert_eq!(
            results[0].matches,
            [Match {
                id: "B".to_string(),
                similarity: 1.0
            }]
        );
    }

    #[test]
    fn signatures_are_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let records =
            vec![write_record(tmp.path(), "a", b"some words to hash", None)];
        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);

        let (_, first) =
            pipeline.signatures(&records, &RunOptions::default()).unwrap();
        assert_eq!(first.computed, 1);
        assert_eq!(store.signature_count(), 1);

        // The cache wins over the file contents from now on.
        std::fs::remove_file(&records[0].path).unwrap();
        let (sigs, second) =
            pipeline.signatures(&records, &RunOptions::default()).unwrap();
        assert_eq!(second.cached, 1);
        assert_eq!(sigs[0].1, c.signature("some words to hash"));
    }

    #[test]
    fn signature_for_writes_back() {
        let tmp = tempfile::tempdir().unwrap();
        let record = write_record(tmp.path(), "a", b"one two three", None);
        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);

        let sig = pipeline.signature_for(&record).unwrap().unwrap();
        assert_eq!(store.get_signature("a").unwrap(), Some(sig));
    }

    #[test]
    fn undecodable_documents_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            write_record(
                tmp.path(),
                "bad",
                &[0xff, 0xfe, 0x00, 0x80],
                Some("x"),
            ),
            write_record(tmp.path(), "good", b"plain text", Some("x")),
        ];
        let mut missing = records[1].clone();
        missing.id = "missing".to_string();
        missing.path = tmp.path().join("does-not-exist");

        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);
        let mut idx = index();

        let all = [records[0].clone(), records[1].clone(), missing];
        let report = pipeline
            .build(&mut idx, &all, &RunOptions::default())
            .unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.indexed, 1);
        assert!(idx.contains("good"));
        assert!(!idx.contains("bad"));
        assert_eq!(store.get_signature("bad").unwrap(), None);
    }

    #[test]
    fn cached_signature_of_wrong_width() {
        let tmp = tempfile::tempdir().unwrap();
        let record = write_record(tmp.path(), "a", b"text text", None);
        let store = MemoryStore::new();
        store
            .put_signature("a", &Signature::from_values(vec![1, 2, 3]))
            .unwrap();

        let c = condenser();
        let pipeline = Pipeline::new(&c, &store);
        assert!(matches!(
            pipeline.signature_for(&record),
            Err(Error::DimensionMismatch { left: 128, right: 3 })
        ));
    }

    #[test]
    fn limit_bounds_records() {
        let tmp = tempfile::tempdir().unwrap();
        let records: Vec<_> = (0..5)
            .map(|i| {
                let text = format!("doc {i}");
                write_record(
                    tmp.path(),
                    &format!("d{i}"),
                    text.as_bytes(),
                    Some("x"),
                )
            })
            .collect();
        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);
        let mut idx = index();

        let report = pipeline
            .build(&mut idx, &records, &RunOptions { limit: Some(2) })
            .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn self_is_not_a_match() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            write_record(tmp.path(), "a", b"alpha beta gamma", Some("x")),
            write_record(tmp.path(), "b", b"alpha beta gamma", Some("x")),
        ];
        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);
        let mut idx = index();
        pipeline.build(&mut idx, &records, &RunOptions::default()).unwrap();

        let (results, _) = pipeline
            .match_documents(&idx, &records[..1], 0.5, &RunOptions::default())
            .unwrap();
        let ids: Vec<_> =
            results[0].matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
        assert_eq!(results[0].max_similarity(), 1.0);
    }

    #[test]
    fn unmatched_queries_produce_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let labeled =
            vec![write_record(tmp.path(), "a", b"alpha beta gamma", Some("x"))];
        let queries =
            vec![write_record(tmp.path(), "q", b"one two three four", None)];
        let c = condenser();
        let store = MemoryStore::new();
        let pipeline = Pipeline::new(&c, &store);
        let mut idx = index();
        pipeline.build(&mut idx, &labeled, &RunOptions::default()).unwrap();

        let (results, report) = pipeline
            .match_documents(&idx, &queries, 0.5, &RunOptions::default())
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(report.processed, 1);
        assert_eq!(report.matched, 0);
    }
}
