//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! A duplicate verdict is never an error: [`crate::Verdict`] carries those as
//! ordinary values. Errors here mean the operation itself could not complete.

use derive_more::{Display, Error};

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying SQLite store could not be read or written. The caller
    /// must not treat this as "no match"; abort or retry the check instead.
    #[display("storage unavailable")]
    StorageUnavailable,
    #[display("database migration error")]
    Migration,
    /// Insert is not upsert: resolve first.
    #[display("remote id already indexed: {_0}")]
    DuplicateKey(#[error(not(source))] String),
    #[display("remote id not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Derived group state has drifted from the file records. Reported, never
    /// auto-corrected; run a rebuild.
    #[display("{_0} duplicate group discrepancies found")]
    Inconsistent(#[error(not(source))] usize),
    /// The duplicate link template failed to compile or render.
    #[display("invalid link template")]
    Template,
    /// Serialization/deserialization error, or a value out of range for storage.
    #[display("invalid index data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable)
    }
}

/// Map a failed write, keeping unique-key violations on `remote_id` apart
/// from genuine storage failures.
pub(crate) fn classify_write(err: &sqlx::Error, remote_id: &str) -> ErrorKind {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ErrorKind::DuplicateKey(remote_id.to_string()),
        _ => ErrorKind::StorageUnavailable,
    }
}
