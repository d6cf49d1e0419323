use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid source: {0} is not an existing directory")]
    InvalidSource(PathBuf),

    #[error("Index store error: {0}")]
    Store(#[from] StoreError),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider '{0}' is not registered")]
    UnknownProvider(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the index store.
///
/// Every mutating store call maps its failure into one of these; callers
/// treat them as fatal for that one operation only.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index database is locked. Another mediadex process may be running.")]
    Locked,

    #[error("Failed to open index database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("Failed to begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Failed to open table: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage failure: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Failed to commit transaction: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Failed to encode or decode row: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unknown source id {0}")]
    UnknownSource(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
