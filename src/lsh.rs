//! Banded locality-sensitive hashing over MinHash signatures.
//!
//! A signature of `P` values is cut into `b` bands of `r` rows. Two
//! documents become candidates when any band hashes to the same bucket,
//! which happens with probability `1 - (1 - s^r)^b` for Jaccard
//! similarity `s`. The `(b, r)` split is chosen to put the steep part of
//! that curve at the configured threshold.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use parking_lot::{RwLock, RwLockReadGuard};
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    error::{Error, Result},
    signature::Signature,
};

/// Step of the midpoint rule used to integrate the candidate curve.
const INTEGRATION_STEP: f64 = 0.001;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Fewest bands an index may have.
pub const MIN_BANDS: usize = 2;

/// Relative cost of false positives and false negatives when choosing the
/// band split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub false_positive: f64,
    pub false_negative: f64,
}

impl Weights {
    pub fn new(false_positive: f64, false_negative: f64) -> Result<Self> {
        let in_range = |w: f64| (0.0..=1.0).contains(&w);
        if !in_range(false_positive) || !in_range(false_negative) {
            return Err(Error::Config(format!(
                "weights must lie in [0, 1], got ({false_positive}, {false_negative})"
            )));
        }
        if (false_positive + false_negative - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(Error::Config(format!(
                "weights must sum to 1.0, got ({false_positive}, {false_negative})"
            )));
        }
        Ok(Self {
            false_positive,
            false_negative,
        })
    }

    /// Weights from the false-negative side alone; the false-positive
    /// weight is its complement.
    pub fn from_false_negative(false_negative: f64) -> Result<Self> {
        Self::new(1.0 - false_negative, false_negative)
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            false_positive: 0.5,
            false_negative: 0.5,
        }
    }
}

/// A band split: `bands` bands of `rows` signature values each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    pub bands: usize,
    pub rows: usize,
}

impl LshParams {
    /// Search every split with at least [`MIN_BANDS`] bands and
    /// `bands * rows <= num_perm` for the one that minimises the weighted
    /// false-positive and false-negative areas.
    ///
    /// Splits are visited by increasing `bands`, then increasing `rows`;
    /// only a strictly better cost replaces the current best, so ties go
    /// to the first split visited. Signature values beyond
    /// `bands * rows` are ignored by the index. A single band of every
    /// value is never chosen: it only finds exact duplicates.
    ///
    /// # Examples
    ///
    /// ```
    /// use neardup::lsh::{LshParams, Weights};
    ///
    /// let params = LshParams::optimal(0.5, 128, Weights::default()).unwrap();
    /// assert!(params.bands * params.rows <= 128);
    /// assert!(LshParams::optimal(0.5, 1, Weights::default()).is_err());
    /// assert!(LshParams::optimal(1.0, 128, Weights::default()).is_err());
    /// ```
    pub fn optimal(
        threshold: f64,
        num_perm: usize,
        weights: Weights,
    ) -> Result<Self> {
        validate_threshold(threshold)?;

        let mut best: Option<(f64, Self)> = None;
        for bands in MIN_BANDS..=num_perm {
            for rows in 1..=num_perm / bands {
                let fp = false_positive_area(threshold, bands, rows);
                let fn_ = false_negative_area(threshold, bands, rows);
                let cost =
                    weights.false_positive * fp + weights.false_negative * fn_;
                if best.is_none_or(|(lowest, _)| cost < lowest) {
                    best = Some((cost, Self { bands, rows }));
                }
            }
        }

        best.map(|(_, params)| params).ok_or_else(|| {
            Error::Config(format!(
                "no band split of at least {MIN_BANDS} bands fits \
                 {num_perm} permutations"
            ))
        })
    }

    fn validate(self, num_perm: usize) -> Result<Self> {
        if self.bands < MIN_BANDS
            || self.rows == 0
            || self.bands.saturating_mul(self.rows) > num_perm
        {
            return Err(Error::Config(format!(
                "{} bands of {} rows is not a valid split of {num_perm} \
                 permutations (at least {MIN_BANDS} bands needed)",
                self.bands, self.rows
            )));
        }
        Ok(self)
    }

    /// Number of signature values that take part in banding.
    pub fn used_permutations(self) -> usize {
        self.bands * self.rows
    }

    /// Probability that two documents with Jaccard similarity `s` share
    /// at least one bucket.
    pub fn candidate_probability(self, s: f64) -> f64 {
        collision_probability(s, self.bands, self.rows)
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "threshold must lie in (0, 1), got {threshold}"
        )))
    }
}

fn collision_probability(s: f64, bands: usize, rows: usize) -> f64 {
    1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32)
}

/// Midpoint rule over `[from, to]` with slices as close to
/// [`INTEGRATION_STEP`] as divides the interval evenly.
fn integrate(f: impl Fn(f64) -> f64, from: f64, to: f64) -> f64 {
    if to <= from {
        return 0.0;
    }
    let slices = ((to - from) / INTEGRATION_STEP).round().max(1.0) as usize;
    let width = (to - from) / slices as f64;
    (0..slices)
        .map(|i| f(from + (i as f64 + 0.5) * width))
        .sum::<f64>()
        * width
}

fn false_positive_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| collision_probability(s, bands, rows), 0.0, threshold)
}

fn false_negative_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(|s| 1.0 - collision_probability(s, bands, rows), threshold, 1.0)
}

/// Construction parameters for an [`LshIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct LshConfig {
    pub threshold: f64,
    pub num_perm: usize,
    pub weights: Weights,
    /// Explicit band split; computed from the other fields when absent.
    pub params: Option<LshParams>,
}

impl LshConfig {
    pub fn new(threshold: f64, num_perm: usize) -> Self {
        Self {
            threshold,
            num_perm,
            weights: Weights::default(),
            params: None,
        }
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_params(mut self, bands: usize, rows: usize) -> Self {
        self.params = Some(LshParams { bands, rows });
        self
    }

    fn resolve(&self) -> Result<LshParams> {
        match self.params {
            Some(params) => {
                validate_threshold(self.threshold)?;
                params.validate(self.num_perm)
            }
            None => {
                LshParams::optimal(self.threshold, self.num_perm, self.weights)
            }
        }
    }
}

/// In-memory banded index from signatures to document ids.
///
/// # Examples
///
/// ```
/// use neardup::lsh::{LshConfig, LshIndex};
/// use neardup::signature::SignatureBuilder;
/// use neardup::hashing::HashFunction;
///
/// let builder = SignatureBuilder::new(128, HashFunction::Sha1).unwrap();
/// let mut index = LshIndex::new(&LshConfig::new(0.5, 128)).unwrap();
///
/// let sig = builder.build(["the", "quick", "fox"]);
/// index.insert("B", &sig).unwrap();
/// assert!(index.query(&sig).unwrap().contains("B"));
/// ```
pub struct LshIndex {
    params: LshParams,
    threshold: f64,
    num_perm: usize,
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    /// One bucket table per band; buckets hold positions into `ids`.
    bands: Vec<HashMap<u64, Vec<usize>>>,
}

impl fmt::Debug for LshIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LshIndex")
            .field("params", &self.params)
            .field("threshold", &self.threshold)
            .field("len", &self.ids.len())
            .finish_non_exhaustive()
    }
}

impl LshIndex {
    pub fn new(config: &LshConfig) -> Result<Self> {
        let params = config.resolve()?;
        tracing::debug!(
            threshold = config.threshold,
            num_perm = config.num_perm,
            bands = params.bands,
            rows = params.rows,
            "Chose band split"
        );
        Ok(Self {
            params,
            threshold: config.threshold,
            num_perm: config.num_perm,
            ids: Vec::new(),
            positions: HashMap::new(),
            bands: vec![HashMap::new(); params.bands],
        })
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Add `id` to the bucket of every band of `signature`.
    ///
    /// Inserting an id that is already indexed is a no-op. The signature
    /// length is checked before anything is touched, so a failed insert
    /// leaves the index unchanged.
    pub fn insert(&mut self, id: &str, signature: &Signature) -> Result<()> {
        self.check_width(signature)?;
        if self.contains(id) {
            return Ok(());
        }

        let position = self.ids.len();
        self.ids.push(id.to_string());
        self.positions.insert(id.to_string(), position);

        let keys = band_keys(signature, self.params);
        for (table, key) in self.bands.iter_mut().zip(keys) {
            table.entry(key).or_default().push(position);
        }
        Ok(())
    }

    /// Ids sharing at least one band bucket with `signature`.
    pub fn query(&self, signature: &Signature) -> Result<BTreeSet<String>> {
        self.check_width(signature)?;

        let keys = band_keys(signature, self.params);
        let candidates = self
            .bands
            .iter()
            .zip(keys)
            .filter_map(|(table, key)| table.get(&key))
            .flatten()
            .map(|&position| self.ids[position].clone())
            .collect();
        Ok(candidates)
    }

    fn check_width(&self, signature: &Signature) -> Result<()> {
        if signature.len() != self.num_perm {
            return Err(Error::DimensionMismatch {
                left: self.num_perm,
                right: signature.len(),
            });
        }
        Ok(())
    }
}

fn band_keys(
    signature: &Signature,
    params: LshParams,
) -> impl Iterator<Item = u64> + '_ {
    signature
        .values()
        .chunks_exact(params.rows)
        .take(params.bands)
        .map(|band| {
            let bytes: Vec<u8> =
                band.iter().flat_map(|v| v.to_be_bytes()).collect();
            xxh3_64(&bytes)
        })
}

/// An [`LshIndex`] that can be shared between threads.
///
/// Each insert takes the write lock for all of its bands, so a concurrent
/// query sees a document either in every band or in none.
#[derive(Debug, Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<LshIndex>>,
}

impl SharedIndex {
    pub fn new(index: LshIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn insert(&self, id: &str, signature: &Signature) -> Result<()> {
        self.inner.write().insert(id, signature)
    }

    pub fn query(&self, signature: &Signature) -> Result<BTreeSet<String>> {
        self.inner.read().query(signature)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Hold the read lock for a batch of queries.
    pub fn read(&self) -> RwLockReadGuard<'_, LshIndex> {
        self.inner.read()
    }
}
