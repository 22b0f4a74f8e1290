//! MinHash signatures.
//!
//! A signature holds, for each of `P` random permutations, the minimum
//! permuted token hash over a document's token set. The fraction of
//! positions where two signatures agree estimates the Jaccard similarity
//! of the underlying token sets.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    error::{Error, Result},
    hashing::HashFunction,
};

/// Mersenne prime `2^61 - 1` used as the permutation modulus.
pub const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Largest value a signature element can take; also the value of every
/// element of a signature built from an empty token set.
pub const EMPTY_SENTINEL: u32 = u32::MAX;

/// Seed for the permutation coefficients. Changing it makes previously
/// stored signatures incomparable with new ones.
const PERMUTATION_SEED: u64 = 1;

/// A fixed-length MinHash signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u32>);

impl Signature {
    pub fn from_values(values: Vec<u32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    /// Number of permutations this signature was built with.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is the signature of an empty token set.
    pub fn is_empty_set(&self) -> bool {
        self.0.iter().all(|&v| v == EMPTY_SENTINEL)
    }

    /// Estimated Jaccard similarity: the fraction of positions where both
    /// signatures hold the same value.
    ///
    /// # Examples
    ///
    /// ```
    /// use neardup::signature::Signature;
    ///
    /// let a = Signature::from_values(vec![1, 2, 3, 4]);
    /// let b = Signature::from_values(vec![1, 2, 0, 0]);
    /// assert_eq!(a.jaccard(&b).unwrap(), 0.5);
    ///
    /// let short = Signature::from_values(vec![1, 2]);
    /// assert!(a.jaccard(&short).is_err());
    /// ```
    pub fn jaccard(&self, other: &Self) -> Result<f64> {
        if self.len() != other.len() {
            return Err(Error::DimensionMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        if self.is_empty() {
            return Ok(0.0);
        }

        let agree = self
            .0
            .iter()
            .zip(&other.0)
            .filter(|(a, b)| a == b)
            .count();
        Ok(agree as f64 / self.len() as f64)
    }

    /// Encode as `P` big-endian `u32` values.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// Decode a buffer written by [`Signature::to_bytes`]. Returns `None`
    /// for empty buffers or lengths that are not a multiple of four.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self(values))
    }
}

/// The `(a, b)` coefficients of `P` universal-hash permutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutations {
    coefficients: Vec<(u64, u64)>,
}

impl Permutations {
    /// Generate `num_perm` coefficient pairs from the fixed seed, so that
    /// signatures built at different times with the same `P` compare.
    pub fn new(num_perm: usize) -> Result<Self> {
        if num_perm == 0 {
            return Err(Error::InvalidPermutations(0));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(PERMUTATION_SEED);
        let coefficients = (0..num_perm)
            .map(|_| {
                let a = rng.gen_range(1..MERSENNE_PRIME);
                let b = rng.gen_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();

        Ok(Self { coefficients })
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    #[inline]
    fn permute(&self, index: usize, hash: u32) -> u32 {
        let (a, b) = self.coefficients[index];
        let permuted = (u128::from(hash) * u128::from(a) + u128::from(b))
            % u128::from(MERSENNE_PRIME);
        // Truncation to the low 32 bits is the intended projection.
        permuted as u32
    }
}

/// Builds signatures of a fixed width with a fixed hash function.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    permutations: Permutations,
    hash_function: HashFunction,
}

impl SignatureBuilder {
    pub fn new(num_perm: usize, hash_function: HashFunction) -> Result<Self> {
        Ok(Self {
            permutations: Permutations::new(num_perm)?,
            hash_function,
        })
    }

    pub fn num_perm(&self) -> usize {
        self.permutations.len()
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// Build the signature of a token sequence. Duplicate tokens do not
    /// affect the result; an empty sequence yields all
    /// [`EMPTY_SENTINEL`] values.
    ///
    /// # Examples
    ///
    /// ```
    /// use neardup::hashing::HashFunction;
    /// use neardup::signature::SignatureBuilder;
    ///
    /// let builder = SignatureBuilder::new(64, HashFunction::Sha1).unwrap();
    /// let a = builder.build(["the", "quick", "fox"]);
    /// let b = builder.build(["fox", "quick", "the", "the"]);
    /// assert_eq!(a, b);
    /// assert!(builder.build(Vec::<String>::new()).is_empty_set());
    /// ```
    pub fn build<I, T>(&self, tokens: I) -> Signature
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut mins = vec![EMPTY_SENTINEL; self.permutations.len()];
        for token in tokens {
            let hash = self.hash_function.hash(token.as_ref().as_bytes());
            for (i, min) in mins.iter_mut().enumerate() {
                let value = self.permutations.permute(i, hash);
                if value < *min {
                    *min = value;
                }
            }
        }
        Signature(mins)
    }
}
