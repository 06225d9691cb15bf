//! Service layer errors.

use thiserror::Error;

use crate::storage::StorageError;
use crate::transaction::TransactionError;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by business operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl ServiceError {
    /// Check if a store refused a write.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ServiceError::Storage(e) if e.is_store_failure())
    }

    /// Check if a commit was turned into a rollback.
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(self, ServiceError::Transaction(e) if e.is_unexpected_rollback())
    }
}
