//! Storage error types.

use std::time::Duration;

use derive_more::{Display, Error};
use tracing::instrument;

/// Broad category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StoreErrorKind {
    /// The database could not be reached or was locked by another writer.
    #[display("unavailable")]
    Unavailable,
    /// The operation did not finish within the configured bound.
    #[display("timeout")]
    Timeout,
    /// The database rejected the statement.
    #[display("query")]
    Query,
    /// Schema migrations could not be applied.
    #[display("migration")]
    Migration,
}

/// Storage error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error ({}): {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// Failure category.
    pub kind: StoreErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for an [`StoreErrorKind::Unavailable`] error.
    #[track_caller]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    /// Shorthand for a [`StoreErrorKind::Timeout`] error.
    #[track_caller]
    pub fn timeout(operation: &str, bound: Duration) -> Self {
        Self::new(
            StoreErrorKind::Timeout,
            format!("{operation} did not complete within {}ms", bound.as_millis()),
        )
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Unavailable | StoreErrorKind::Timeout
        )
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::Error as DieselError;

        // SQLite reports contention as a generic database error.
        let kind = match &err {
            DieselError::DatabaseError(_, info)
                if info.message().contains("locked") || info.message().contains("busy") =>
            {
                StoreErrorKind::Unavailable
            }
            DieselError::BrokenTransactionManager => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Query,
        };
        Self::new(kind, format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::unavailable(format!("Connection error: {}", err))
    }
}
