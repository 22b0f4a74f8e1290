use std::io::Write;

use clap::Parser;
use neardup::{
    DataDir,
    DocumentDb,
    cli::{self, Cli, Command},
    document_db::CONDENSER_SPEC,
    error::{self, Error},
    ingestion::{IngestOptions, ingest_files},
    lsh::{LshConfig, LshIndex, Weights},
    output::{self, Format},
    pipeline::{Pipeline, RunOptions},
    ranking,
    store::DocumentRecord,
    walker::{Filter, discover_files},
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("NEARDUP_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn init_thread_pool(jobs: Option<usize>) -> error::Result<()> {
    if let Some(jobs) = jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .map_err(|e| Error::Config(format!("thread pool: {e}")))?;
    }
    Ok(())
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let db = DocumentDb::open(&data_dir.documents_db())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&db, &args)?,
        Command::Match(args) => cmd_match(&db, &args)?,
        Command::Compare(args) => cmd_compare(&db, &args)?,
        Command::Status(args) => cmd_status(&db, &data_dir, args.json)?,
        Command::Remove(args) => cmd_remove(&db, &args)?,
        Command::Reset => cmd_reset(&db)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_ingest(db: &DocumentDb, args: &cli::IngestArgs) -> error::Result<()> {
    if !args.dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            args.dir.display()
        )));
    }
    init_thread_pool(args.jobs)?;
    let condenser = db.condenser(args.spec.as_deref())?;

    let mut filter = Filter::default();
    if let Some(ref pattern) = args.glob {
        filter = filter.with_glob(pattern)?;
    }

    let files = discover_files(&args.dir, &filter)?;
    eprintln!("Found {} files in {}", files.len(), args.dir.display());

    let options = IngestOptions {
        label: args.label.clone(),
        tags: args.tags.clone(),
        prefix: args.prefix.clone(),
        limit: args.limit,
    };
    let (records, report) = ingest_files(db, &files, &options)?;
    eprintln!(
        "Registered {} documents ({} skipped, {} changed)",
        report.registered, report.skipped, report.changed
    );

    if args.signatures {
        let pipeline = Pipeline::new(&condenser, db);
        let (_, built) = pipeline.signatures(&records, &RunOptions::default())?;
        eprintln!(
            "Signatures: {} computed, {} cached, {} skipped",
            built.computed, built.cached, built.skipped
        );
    }

    Ok(())
}

fn cmd_match(db: &DocumentDb, args: &cli::MatchArgs) -> error::Result<()> {
    init_thread_pool(args.jobs)?;
    let condenser = db.condenser(args.spec.as_deref())?;
    let weights = Weights::from_false_negative(args.false_negative_weight)?;
    let config = LshConfig::new(args.threshold, condenser.permutations())
        .with_weights(weights);
    let mut index = LshIndex::new(&config)?;

    let (labeled, unlabeled): (Vec<DocumentRecord>, Vec<DocumentRecord>) = db
        .list_documents()?
        .into_iter()
        .partition(DocumentRecord::is_labeled);

    let pipeline = Pipeline::new(&condenser, db);

    eprintln!("Indexing {} labeled documents...", labeled.len());
    let built = pipeline.build(&mut index, &labeled, &RunOptions::default())?;

    eprintln!("Matching {} unlabeled documents...", unlabeled.len());
    let (results, report) = pipeline.match_documents(
        &index,
        &unlabeled,
        args.threshold,
        &RunOptions { limit: args.limit },
    )?;

    let format = if args.json {
        Format::Json
    } else if args.verbose_scores {
        Format::Verbose
    } else {
        Format::Plain
    };
    output::write_results(&mut std::io::stdout().lock(), &results, format)?;

    eprintln!(
        "Indexed {} documents ({} skipped); matched {} out of {} documents ({} skipped)",
        built.indexed,
        built.skipped,
        report.matched,
        report.processed,
        report.skipped
    );
    Ok(())
}

fn cmd_compare(db: &DocumentDb, args: &cli::CompareArgs) -> error::Result<()> {
    let condenser = db.condenser(None)?;
    let text = std::fs::read_to_string(&args.file)?;
    let query = condenser.signature(&text);

    let records = db.list_documents()?;
    let pipeline = Pipeline::new(&condenser, db);
    let (signatures, built) =
        pipeline.signatures(&records, &RunOptions::default())?;

    let mut ranked = ranking::rank(
        signatures.iter().map(|(id, sig)| (id.as_str(), sig)),
        &query,
        Some(args.threshold),
    )?;
    ranked.truncate(args.top);

    let mut out = std::io::stdout().lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string(&ranked)?)?;
    } else if ranked.is_empty() {
        writeln!(out, "No documents above {:.3}", args.threshold)?;
    } else {
        for m in &ranked {
            writeln!(out, "{:.3}  {}", m.similarity, m.id)?;
        }
    }

    eprintln!(
        "Compared against {} documents ({} skipped)",
        signatures.len(),
        built.skipped
    );
    Ok(())
}

fn cmd_remove(db: &DocumentDb, args: &cli::RemoveArgs) -> error::Result<()> {
    let mut removed = 0;
    for id in &args.ids {
        if db.remove_document(id)? {
            removed += 1;
        } else {
            tracing::warn!(id = %id, "No such document");
        }
    }
    eprintln!("Removed {removed} of {} documents", args.ids.len());
    Ok(())
}

fn cmd_reset(db: &DocumentDb) -> error::Result<()> {
    let dropped = db.clear_signatures()?;
    eprintln!("Dropped {dropped} signatures; the next run records a new spec");
    Ok(())
}

fn cmd_status(
    db: &DocumentDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let documents = db.list_documents()?;
    let labeled = documents.iter().filter(|d| d.is_labeled()).count();
    let signatures = db.signature_count()?;
    let spec = db.get_setting(CONDENSER_SPEC)?;

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "condenser": spec,
            "documents": documents.len(),
            "labeled": labeled,
            "signatures": signatures,
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Condenser: {}", spec.as_deref().unwrap_or("(not set)"));
        println!("Documents: {} ({labeled} labeled)", documents.len());
        println!("Signatures: {signatures}");
    }
    Ok(())
}
