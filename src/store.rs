use std::{collections::HashMap, path::PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    signature::Signature,
};

/// Name of the content stream for documents read straight from disk.
pub const RAW_STREAM: &str = "raw";

/// Metadata kept for every registered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier, used as the key everywhere.
    pub id: String,
    /// Where the document's bytes can be read from.
    pub path: PathBuf,
    /// Which content stream of the source the bytes came from.
    pub stream: String,
    pub size: u64,
    /// Hex SHA-1 of the document's bytes.
    pub digest: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Triage label; labeled documents make up the index, unlabeled ones
    /// are matched against it.
    #[serde(default)]
    pub label: Option<String>,
}

impl DocumentRecord {
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Persistent map from document id to record and signature.
///
/// Implementations must make every write atomic: a reader sees either
/// the previous value or the new one, never a partial signature.
pub trait SignatureStore: Sync {
    fn get_signature(&self, id: &str) -> Result<Option<Signature>>;

    /// Store a signature, replacing any previous one for `id`.
    fn put_signature(&self, id: &str, signature: &Signature) -> Result<()>;

    /// Store many signatures at once.
    fn put_signatures(&self, entries: &[(String, Signature)]) -> Result<()>;

    /// The record for `id`, or [`Error::NotFound`].
    fn get_document(&self, id: &str) -> Result<DocumentRecord>;

    fn put_document(&self, record: &DocumentRecord) -> Result<()>;

    /// Insert or replace many records at once.
    fn put_documents(&self, records: &[DocumentRecord]) -> Result<()> {
        for record in records {
            self.put_document(record)?;
        }
        Ok(())
    }

    /// Drop the signature of `id`, if any. Returns whether one existed.
    fn remove_signature(&self, id: &str) -> Result<bool>;
}

pub(crate) fn decode_signature(id: &str, bytes: &[u8]) -> Result<Signature> {
    Signature::from_bytes(bytes).ok_or_else(|| Error::CorruptSignature {
        id: id.to_string(),
        len: bytes.len(),
    })
}

pub(crate) fn missing_document(id: &str) -> Error {
    Error::NotFound {
        kind: "document",
        name: id.to_string(),
    }
}

/// A [`SignatureStore`] that lives in memory.
///
/// Signatures are kept in their encoded form so that they go through the
/// same decoding as persisted ones.
///
/// # Examples
///
/// ```
/// use neardup::signature::Signature;
/// use neardup::store::{MemoryStore, SignatureStore};
///
/// let store = MemoryStore::new();
/// let sig = Signature::from_values(vec![1, 2, 3]);
/// store.put_signature("a", &sig).unwrap();
/// assert_eq!(store.get_signature("a").unwrap(), Some(sig));
/// assert!(store.get_document("a").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, DocumentRecord>>,
    signatures: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<_> =
            self.documents.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.read().len()
    }
}

impl SignatureStore for MemoryStore {
    fn get_signature(&self, id: &str) -> Result<Option<Signature>> {
        self.signatures
            .read()
            .get(id)
            .map(|bytes| decode_signature(id, bytes))
            .transpose()
    }

    fn put_signature(&self, id: &str, signature: &Signature) -> Result<()> {
        self.signatures
            .write()
            .insert(id.to_string(), signature.to_bytes());
        Ok(())
    }

    fn put_signatures(&self, entries: &[(String, Signature)]) -> Result<()> {
        let mut signatures = self.signatures.write();
        for (id, signature) in entries {
            signatures.insert(id.clone(), signature.to_bytes());
        }
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<DocumentRecord> {
        self.documents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| missing_document(id))
    }

    fn put_document(&self, record: &DocumentRecord) -> Result<()> {
        self.documents
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn remove_signature(&self, id: &str) -> Result<bool> {
        Ok(self.signatures.write().remove(id).is_some())
    }
}
