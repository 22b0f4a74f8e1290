use std::io::Write;

use serde::Serialize;

use crate::{error::Result, pipeline::MatchResult, ranking::Match};

/// How match results are rendered, one line per query document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `<query>  # similar to <id>, <id>`
    #[default]
    Plain,
    /// `<query>  # max <score> matches <id>, <id>`
    Verbose,
    /// `{"query": ..., "matches": [{"id": ..., "similarity": ...}]}`
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    query: &'a str,
    matches: &'a [Match],
}

/// Render one result without a trailing newline.
///
/// # Examples
///
/// ```
/// use neardup::output::{Format, format_result};
/// use neardup::pipeline::MatchResult;
/// use neardup::ranking::Match;
///
/// let result = MatchResult {
///     query: "q".to_string(),
///     matches: vec![
///         Match { id: "a".to_string(), similarity: 0.875 },
///         Match { id: "b".to_string(), similarity: 0.5 },
///     ],
/// };
/// assert_eq!(
///     format_result(&result, Format::Plain).unwrap(),
///     "q  # similar to a, b"
/// );
/// assert_eq!(
///     format_result(&result, Format::Verbose).unwrap(),
///     "q  # max 0.875 matches a, b"
/// );
/// ```
pub fn format_result(result: &MatchResult, format: Format) -> Result<String> {
    let ids = || {
        result
            .matches
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let line = match format {
        Format::Plain => format!("{}  # similar to {}", result.query, ids()),
        Format::Verbose => format!(
            "{}  # max {:.3} matches {}",
            result.query,
            result.max_similarity(),
            ids()
        ),
        Format::Json => serde_json::to_string(&JsonLine {
            query: &result.query,
            matches: &result.matches,
        })?,
    };
    Ok(line)
}

/// Write every result as its own line.
pub fn write_results(
    out: &mut impl Write,
    results: &[MatchResult],
    format: Format,
) -> Result<()> {
    for result in results {
        writeln!(out, "{}", format_result(result, format)?)?;
    }
    out.flush()?;
    Ok(())
}
