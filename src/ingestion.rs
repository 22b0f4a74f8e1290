use std::path::Path;

use rayon::prelude::*;
use sha1::{Digest, Sha1};

use crate::{
    error::{Error, Result},
    store::{DocumentRecord, RAW_STREAM, SignatureStore},
    walker::DiscoveredFile,
};

/// How discovered files are registered.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Label attached to every registered document.
    pub label: Option<String>,
    pub tags: Vec<String>,
    /// Prepended to relative paths to form document ids.
    pub prefix: Option<String>,
    /// Register at most this many files.
    pub limit: Option<usize>,
}

/// Counts from one [`ingest_files`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub registered: usize,
    /// Files that could not be read.
    pub skipped: usize,
    /// Previously registered documents whose content changed; their cached
    /// signatures were dropped.
    pub changed: usize,
}

/// Document id for a file: its relative path with `/` separators,
/// optionally under `prefix`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use neardup::ingestion::document_id;
///
/// assert_eq!(document_id(None, Path::new("a/b.txt")), "a/b.txt");
/// assert_eq!(document_id(Some("case-7"), Path::new("b.txt")), "case-7/b.txt");
/// ```
pub fn document_id(prefix: Option<&str>, relative_path: &Path) -> String {
    let relative = relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match prefix {
        Some(prefix) => format!("{}/{relative}", prefix.trim_end_matches('/')),
        None => relative,
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha1::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Register discovered files as documents in `store`.
///
/// Files are read and hashed in parallel, then written to the store in a
/// single batch. Re-registering a document whose bytes changed drops its
/// cached signature so that it is recomputed on next use; its label and
/// tags are kept unless `options` sets new ones.
///
/// An id that is already registered for a different path is an
/// [`Error::DuplicateId`], and nothing is written.
pub fn ingest_files(
    store: &impl SignatureStore,
    files: &[DiscoveredFile],
    options: &IngestOptions,
) -> Result<(Vec<DocumentRecord>, IngestReport)> {
    let bound = options.limit.map_or(files.len(), |n| n.min(files.len()));
    let files = &files[..bound];

    let loaded: Vec<_> = files
        .par_iter()
        .map(|file| match std::fs::read(&file.absolute_path) {
            Ok(bytes) => Some(DocumentRecord {
                id: document_id(
                    options.prefix.as_deref(),
                    &file.relative_path,
                ),
                path: file.absolute_path.clone(),
                stream: RAW_STREAM.to_string(),
                size: bytes.len() as u64,
                digest: hex_digest(&bytes),
                tags: options.tags.clone(),
                label: options.label.clone(),
            }),
            Err(e) => {
                tracing::warn!(
                    path = %file.absolute_path.display(),
                    error = %e,
                    "Skipping unreadable file"
                );
                None
            }
        })
        .collect();

    let mut report = IngestReport {
        skipped: loaded.iter().filter(|r| r.is_none()).count(),
        ..Default::default()
    };
    let mut records: Vec<DocumentRecord> =
        loaded.into_iter().flatten().collect();

    let mut previous = Vec::with_capacity(records.len());
    for record in &records {
        match store.get_document(&record.id) {
            Ok(existing) if existing.path != record.path => {
                return Err(Error::DuplicateId {
                    id: record.id.clone(),
                    existing: existing.path,
                    incoming: record.path.clone(),
                });
            }
            Ok(existing) => previous.push(Some(existing)),
            Err(Error::NotFound { .. }) => previous.push(None),
            Err(e) => return Err(e),
        }
    }

    for (record, previous) in records.iter_mut().zip(previous) {
        let Some(previous) = previous else {
            continue;
        };
        if options.label.is_none() {
            record.label = previous.label;
        }
        if options.tags.is_empty() {
            record.tags = previous.tags;
        }
        if previous.digest != record.digest
            && store.remove_signature(&record.id)?
        {
            tracing::debug!(
                id = %record.id,
                "Content changed, dropped signature"
            );
            report.changed += 1;
        }
    }

    store.put_documents(&records)?;
    report.registered = records.len();

    tracing::info!(
        registered = report.registered,
        skipped = report.skipped,
        changed = report.changed,
        "Registered documents"
    );
    Ok((records, report))
}
