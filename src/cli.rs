use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "neardup",
    version,
    about = "Find near-duplicate documents with MinHash and LSH"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register the files under a directory as documents
    Ingest(IngestArgs),
    /// Match unlabeled documents against an index of labeled ones
    Match(MatchArgs),
    /// Rank every stored document against a single file (brute force)
    Compare(CompareArgs),
    /// Show database statistics
    Status(StatusArgs),
    /// Unregister documents and drop their signatures
    Remove(RemoveArgs),
    /// Drop every signature and the recorded condenser spec
    Reset,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// Parse a value in [0, 1].
fn unit_interval(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in [0.0, 1.0]"))
    }
}

/// Parse a value strictly between 0 and 1.
fn open_unit_interval(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not in (0.0, 1.0)"))
    }
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Directory to walk
    pub dir: PathBuf,

    /// Label every ingested document (labeled documents form the index)
    #[arg(short, long)]
    pub label: Option<String>,

    /// Tag to attach (can be repeated)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Prefix for document ids, which default to the relative path
    #[arg(long)]
    pub prefix: Option<String>,

    /// Only ingest files whose relative path matches this glob
    #[arg(short, long)]
    pub glob: Option<String>,

    /// Condenser spec tokenizer:normalizer:hash:permutations
    /// (e.g. "ws:norm-html:sha1:128"); fixed by the first run
    #[arg(long)]
    pub spec: Option<String>,

    /// Compute signatures now instead of on first match
    #[arg(long)]
    pub signatures: bool,

    /// Ingest at most this many files
    #[arg(long)]
    pub limit: Option<usize>,

    /// Number of parallel jobs (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// -- Match --

#[derive(Debug, Parser)]
pub struct MatchArgs {
    /// Minimum similarity for documents to count as similar
    #[arg(long, default_value = "0.5", value_parser = open_unit_interval)]
    pub threshold: f64,

    /// Relative weight of false negatives when tuning the index
    #[arg(long, default_value = "0.75", value_parser = unit_interval)]
    pub false_negative_weight: f64,

    /// Include the best similarity score in each line
    #[arg(long, conflicts_with = "json")]
    pub verbose_scores: bool,

    /// Output one JSON object per matched document
    #[arg(long)]
    pub json: bool,

    /// Match at most this many unlabeled documents
    #[arg(long)]
    pub limit: Option<usize>,

    /// Condenser spec; must agree with the stored one
    #[arg(long)]
    pub spec: Option<String>,

    /// Number of parallel jobs (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// -- Compare --

#[derive(Debug, Parser)]
pub struct CompareArgs {
    /// File to compare against every stored document
    pub file: PathBuf,

    /// Minimum similarity to report
    #[arg(long, default_value = "0.0", value_parser = unit_interval)]
    pub threshold: f64,

    /// Number of results to show
    #[arg(short = 'n', long, default_value = "10")]
    pub top: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Remove --

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Document ids to remove
    #[arg(required = true)]
    pub ids: Vec<String>,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "neardup",
            &mut std::io::stdout(),
        );
    }
}
