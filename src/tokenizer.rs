use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

/// Largest n accepted by the named n-gram tokenizers.
pub const MAX_NGRAM: usize = 6;

/// Strategy for turning (normalized) text into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tokenizer {
    /// Split on whitespace.
    #[default]
    Whitespace,
    /// Sliding windows of `n` whitespace-separated words.
    WhitespaceNGrams(usize),
    /// Sliding windows of `n` characters.
    CharNGrams(usize),
    /// Unicode word segmentation, punctuation kept as separate tokens.
    Words,
    /// Unicode sentence segmentation.
    Sentences,
    /// The whole text is a single token.
    Whole,
}

impl Tokenizer {
    /// Resolve a tokenizer by name. The empty name selects the default.
    ///
    /// # Examples
    ///
    /// ```
    /// use neardup::tokenizer::Tokenizer;
    ///
    /// assert_eq!(Tokenizer::from_name("ws").unwrap(), Tokenizer::Whitespace);
    /// assert_eq!(
    ///     Tokenizer::from_name("3-grams").unwrap(),
    ///     Tokenizer::CharNGrams(3)
    /// );
    /// assert_eq!(
    ///     Tokenizer::from_name("white-space-2-grams").unwrap(),
    ///     Tokenizer::WhitespaceNGrams(2)
    /// );
    /// ```
    pub fn from_name(name: &str) -> Result<Self> {
        let tokenizer = match name {
            "" | "ws" | "white-space" => Some(Self::Whitespace),
            "words" | "split-words" => Some(Self::Words),
            "sents" | "split-sents" => Some(Self::Sentences),
            "none" => Some(Self::Whole),
            _ => {
                if let Some(n) = name
                    .strip_prefix("white-space-")
                    .and_then(|rest| rest.strip_suffix("-grams"))
                {
                    parse_n(n, 2).map(Self::WhitespaceNGrams)
                } else {
                    name.strip_suffix("-grams")
                        .and_then(|n| parse_n(n, 1))
                        .map(Self::CharNGrams)
                }
            }
        };

        tokenizer.ok_or_else(|| Error::UnknownComponent {
            kind: "tokenizer",
            name: name.to_string(),
        })
    }

    /// Canonical name, accepted by [`Tokenizer::from_name`].
    pub fn name(self) -> String {
        match self {
            Self::Whitespace => "ws".to_string(),
            Self::WhitespaceNGrams(n) => format!("white-space-{n}-grams"),
            Self::CharNGrams(n) => format!("{n}-grams"),
            Self::Words => "words".to_string(),
            Self::Sentences => "sents".to_string(),
            Self::Whole => "none".to_string(),
        }
    }

    pub fn tokenize(self, text: &str) -> Vec<String> {
        match self {
            Self::Whitespace => {
                text.split_whitespace().map(str::to_string).collect()
            }
            Self::WhitespaceNGrams(n) => whitespace_ngrams(text, n),
            Self::CharNGrams(n) => char_ngrams(text, n),
            Self::Words => text
                .split_word_bounds()
                .filter(|w| !w.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Self::Sentences => text
                .unicode_sentences()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Whole => vec![text.to_string()],
        }
    }
}

fn parse_n(s: &str, min: usize) -> Option<usize> {
    s.parse::<usize>()
        .ok()
        .filter(|n| (min..=MAX_NGRAM).contains(n))
}

/// Windows of `n` words. Text with fewer than `n` words yields a single
/// token made of all of them.
fn whitespace_ngrams(text: &str, n: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || n == 0 {
        return Vec::new();
    }
    if words.len() < n {
        return vec![words.join(" ")];
    }
    words.windows(n).map(|w| w.join(" ")).collect()
}

fn char_ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if n == 0 || chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}
