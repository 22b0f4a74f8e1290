use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("malformed document record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid condenser spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("unknown {kind}: '{name}'")]
    UnknownComponent { kind: &'static str, name: String },

    #[error("number of permutations must be positive, got {0}")]
    InvalidPermutations(i64),

    #[error(
        "cannot compare signatures of different length ({left} vs {right})"
    )]
    DimensionMismatch { left: usize, right: usize },

    #[error("stored signature for '{id}' is corrupt ({len} bytes)")]
    CorruptSignature { id: String, len: usize },

    #[error(
        "document id '{id}' already belongs to {}, refusing {}",
        existing.display(),
        incoming.display()
    )]
    DuplicateId {
        id: String,
        existing: PathBuf,
        incoming: PathBuf,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
