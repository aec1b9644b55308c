//! Repository error types.

use crate::TableId;
use derive_more::{Display, Error};
use tracing::instrument;

/// Storage failure with location tracking.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Storage error: {} at {}:{}", message, file, line)]
pub struct StorageError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StorageError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Error returned by a [`Tables`](crate::Tables) implementation.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum RepositoryError {
    /// No table with this id.
    #[display("Table {_0} not found")]
    NotFound(TableId),
    /// The stored version moved on since the table was loaded.
    #[display("Table {table_id} changed concurrently, expected version {expected}")]
    Conflict {
        /// Table.
        table_id: TableId,
        /// Version the caller loaded.
        expected: u64,
    },
    /// Stored table refers to a game missing from the catalog.
    #[display("Unknown game: {_0}")]
    UnknownGame(String),
    /// Underlying store failed.
    #[display("{_0}")]
    Storage(StorageError),
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepositoryError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        RepositoryError::Storage(err)
    }
}
