use thiserror::Error;
use trendwatch_common::Period;

pub type Result<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No scrapes for the language {0}")]
    NoScrapesForLanguage(String),

    #[error("No scrapes for the period {period} of language {language}")]
    NoScrapesForPeriod { language: String, period: Period },

    #[error("No snapshot of {language} taken at {taken_at}")]
    SnapshotNotFound { language: String, taken_at: String },

    #[error("Snapshot of {language} taken at {taken_at} has no {period} results")]
    PeriodNotRecorded { language: String, taken_at: String, period: Period },

    #[error("Snapshot of {language} taken at {taken_at} already exists")]
    SnapshotExists { language: String, taken_at: String },

    #[error("Corrupt snapshot key: {0:?}")]
    CorruptKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl StoreError {
    /// "Nothing stored yet" conditions that callers render as empty states.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            StoreError::NoScrapesForLanguage(_) | StoreError::NoScrapesForPeriod { .. }
        )
    }
}
