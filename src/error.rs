//! Error types for the indexer.
//!
//! All fallible operations in this crate return [`Result`], whose error type
//! is [`IndexerError`]. Variants mirror the failure classes of the write path:
//! a record that cannot be made durable, a record the index engine rejects,
//! a compaction that does not finish, and a content repository that cannot
//! be read.

use thiserror::Error;

/// The main error type for indexer operations.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// I/O errors from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation log could not persist a record.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// The index engine rejected a record.
    #[error("Apply failure: {0}")]
    ApplyFailure(String),

    /// Index compaction could not complete.
    #[error("Optimization failure: {0}")]
    OptimizationFailure(String),

    /// The content repository was unavailable or returned bad data.
    #[error("Data source failure: {0}")]
    DataSource(String),

    /// Storage-level errors that are not plain I/O.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal invariant violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

impl IndexerError {
    pub fn write_failure<S: Into<String>>(msg: S) -> Self {
        IndexerError::WriteFailure(msg.into())
    }

    pub fn apply_failure<S: Into<String>>(msg: S) -> Self {
        IndexerError::ApplyFailure(msg.into())
    }

    pub fn optimization_failure<S: Into<String>>(msg: S) -> Self {
        IndexerError::OptimizationFailure(msg.into())
    }

    pub fn data_source<S: Into<String>>(msg: S) -> Self {
        IndexerError::DataSource(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        IndexerError::Storage(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        IndexerError::InvalidArgument(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IndexerError::InvalidConfig(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        IndexerError::NotFound(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        IndexerError::Internal(msg.into())
    }

    /// Returns true if this error means a producer's record was not made durable.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, IndexerError::WriteFailure(_))
    }
}
