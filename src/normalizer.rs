use std::sync::LazyLock;

use regex::{Captures, Regex};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::error::{Error, Result};

static EMBEDDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
        .expect("embedded block pattern is valid")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")
        .expect("entity pattern is valid")
});

/// Text normalization applied before tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalizer {
    /// Fold to lowercase ASCII-ish text without punctuation, symbols or
    /// line breaks.
    Plain,
    /// Strip HTML markup, then apply [`Normalizer::Plain`].
    #[default]
    Html,
    /// Leave the text untouched.
    Identity,
}

impl Normalizer {
    /// Resolve a normalizer by name. The empty name selects the default
    /// (`norm-html`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "norm" => Ok(Self::Plain),
            "" | "norm-html" => Ok(Self::Html),
            "none" => Ok(Self::Identity),
            _ => Err(Error::UnknownComponent {
                kind: "normalizer",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "norm",
            Self::Html => "norm-html",
            Self::Identity => "none",
        }
    }

    /// # Examples
    ///
    /// ```
    /// use neardup::normalizer::Normalizer;
    ///
    /// assert_eq!(
    ///     Normalizer::Html.normalize("<b>Café</b> au   LAIT!"),
    ///     "cafe au lait"
    /// );
    /// ```
    pub fn normalize(self, text: &str) -> String {
        match self {
            Self::Plain => normalize_plain(text),
            Self::Html => normalize_plain(&strip_html(text)),
            Self::Identity => text.to_string(),
        }
    }
}

fn normalize_plain(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove markup and decode character references, keeping only the text
/// content of the document.
pub fn strip_html(text: &str) -> String {
    let without_blocks = EMBEDDED.replace_all(text, "");
    let without_tags = TAG.replace_all(&without_blocks, "");
    ENTITY
        .replace_all(&without_tags, |caps: &Captures| {
            decode_entity(&caps[1])
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }

    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_normalization() {
        let data = "
            Some $TEXT

            wIth       CAPITALS !

            - SpAces, CharacTers& and punctuation?
        ";
        assert_eq!(
            Normalizer::Plain.normalize(data),
            "some text with capitals spaces characters and punctuation"
        );
    }

    #[test]
    fn html_normalization() {
        let data = "
                <p>Some $TEXT</p><br>

                wIth       <h1>CAPITALS !</h1>

                - SpAces, CharacTers& and punctuation?
            ";
        assert_eq!(
            Normalizer::Html.normalize(data),
            "some text with capitals spaces characters and punctuation"
        );
    }

    #[test]
    fn strips_script_and_style() {
        let data = "<style>p { color: red }</style><p>visible</p>\
                    <script>var hidden = 1;</script><!-- note -->";
        assert_eq!(strip_html(data), "visible");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(
            strip_html("fish &amp; chips &#233; &#x41; &bogus;"),
            "fish & chips é A &bogus;"
        );
    }

    #[test]
    fn folds_accents() {
        assert_eq!(Normalizer::Plain.normalize("Crème Brûlée"), "creme brulee");
    }

    #[test]
    fn identity_keeps_text() {
        assert_eq!(Normalizer::Identity.normalize(" A, b "), " A, b ");
    }

    #[test]
    fn registry() {
        assert_eq!(Normalizer::from_name("").unwrap(), Normalizer::Html);
        assert_eq!(Normalizer::from_name("norm").unwrap(), Normalizer::Plain);
        assert_eq!(Normalizer::from_name("norm-html").unwrap(), Normalizer::Html);
        assert!(matches!(
            Normalizer::from_name("lower"),
            Err(Error::UnknownComponent { kind: "normalizer", .. })
        ));
    }
}
