use std::{collections::HashSet, fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    hashing::HashFunction,
    normalizer::Normalizer,
    signature::{Signature, SignatureBuilder},
    tokenizer::Tokenizer,
};

/// Number of permutations used when a spec leaves the field empty.
pub const DEFAULT_PERMUTATIONS: usize = 128;

/// Everything needed to turn text into a signature: normalizer, tokenizer,
/// hash function and number of permutations.
///
/// Parsed from and rendered to a spec string of the form
/// `tokenizer:normalizer:hash_function:permutations`, where every field may
/// be left empty to select its default.
///
/// # Examples
///
/// ```
/// use neardup::condenser::Condenser;
/// use neardup::tokenizer::Tokenizer;
///
/// let condenser = Condenser::from_spec("6-grams:norm::256").unwrap();
/// assert_eq!(condenser.tokenizer(), Tokenizer::CharNGrams(6));
/// assert_eq!(condenser.permutations(), 256);
/// assert_eq!(condenser.to_spec(), "6-grams:norm:sha1:256");
/// ```
#[derive(Debug, Clone)]
pub struct Condenser {
    tokenizer: Tokenizer,
    normalizer: Normalizer,
    builder: SignatureBuilder,
}

impl Condenser {
    pub fn new(
        tokenizer: Tokenizer,
        normalizer: Normalizer,
        hash_function: HashFunction,
        permutations: usize,
    ) -> Result<Self> {
        Ok(Self {
            tokenizer,
            normalizer,
            builder: SignatureBuilder::new(permutations, hash_function)?,
        })
    }

    pub fn from_spec(spec: &str) -> Result<Self> {
        let fields: Vec<&str> = spec.split(':').collect();
        let [tokenizer, normalizer, hash, permutations] = fields.as_slice()
        else {
            return Err(Error::InvalidSpec {
                spec: spec.to_string(),
                reason: format!(
                    "expected 4 colon-separated fields, found {}",
                    fields.len()
                ),
            });
        };

        let permutations = if permutations.is_empty() {
            DEFAULT_PERMUTATIONS
        } else {
            let parsed: i64 =
                permutations.trim().parse().map_err(|_| Error::InvalidSpec {
                    spec: spec.to_string(),
                    reason: format!(
                        "number of permutations is not an integer: '{permutations}'"
                    ),
                })?;
            usize::try_from(parsed)
                .ok()
                .filter(|&p| p > 0)
                .ok_or(Error::InvalidPermutations(parsed))?
        };

        Self::new(
            Tokenizer::from_name(tokenizer)?,
            Normalizer::from_name(normalizer)?,
            HashFunction::from_name(hash)?,
            permutations,
        )
    }

    /// Canonical spec string; parsing it yields an equivalent condenser.
    pub fn to_spec(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.tokenizer.name(),
            self.normalizer.name(),
            self.builder.hash_function().name(),
            self.builder.num_perm()
        )
    }

    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    pub fn normalizer(&self) -> Normalizer {
        self.normalizer
    }

    pub fn hash_function(&self) -> HashFunction {
        self.builder.hash_function()
    }

    pub fn permutations(&self) -> usize {
        self.builder.num_perm()
    }

    pub fn tokens(&self, text: &str) -> Vec<String> {
        self.tokenizer.tokenize(&self.normalizer.normalize(text))
    }

    /// Exact token set of `text`, for ground-truth comparisons.
    pub fn token_set(&self, text: &str) -> HashSet<String> {
        self.tokens(text).into_iter().collect()
    }

    pub fn signature(&self, text: &str) -> Signature {
        self.builder.build(self.tokens(text))
    }
}

impl Default for Condenser {
    fn default() -> Self {
        Self {
            tokenizer: Tokenizer::default(),
            normalizer: Normalizer::default(),
            builder: SignatureBuilder::new(
                DEFAULT_PERMUTATIONS,
                HashFunction::default(),
            )
            .expect("default permutation count is positive"),
        }
    }
}

impl FromStr for Condenser {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_spec(s)
    }
}

impl fmt::Display for Condenser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}
