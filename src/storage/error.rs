//! Storage layer error types
//!
//! All errors that can occur during store operations are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use thiserror::Error;

use crate::storage::types::{InvalidKeyError, RecordKey};

/// the main error type for store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// the store refused a write (the injected persistence failure)
    #[error("store failure: store={store}, key={key}")]
    StoreFailure { store: String, key: RecordKey },

    /// a write was attempted inside a read-only transaction
    #[error("store {store} cannot be written inside a read-only transaction")]
    ReadOnlyTransaction { store: String },

    /// invalid record key
    #[error("invalid key: {0}")]
    InvalidKey(#[from] InvalidKeyError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (snapshot files)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this is the injected persistence failure
    pub fn is_store_failure(&self) -> bool {
        matches!(self, StorageError::StoreFailure { .. })
    }
}

/// result type alias for store operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let failure = StorageError::StoreFailure {
            store: "log".to_string(),
            key: RecordKey::new("u2").unwrap(),
        };
        assert!(failure.is_store_failure());
        assert_eq!(failure.to_string(), "store failure: store=log, key=u2");

        let read_only = StorageError::ReadOnlyTransaction {
            store: "member".to_string(),
        };
        assert!(!read_only.is_store_failure());
    }
}
