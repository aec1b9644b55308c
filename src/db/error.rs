//! Conversions from database and encoding failures.

use crate::{RepositoryError, StorageError};

impl From<diesel::result::Error> for StorageError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::new(format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for StorageError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Connection error: {}", err))
    }
}

impl From<serde_json::Error> for StorageError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Encoding error: {}", err))
    }
}

impl From<diesel::result::Error> for RepositoryError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        RepositoryError::Storage(err.into())
    }
}

impl From<serde_json::Error> for RepositoryError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Storage(err.into())
    }
}
