//! Transaction error types.

use thiserror::Error;

use crate::storage::StorageError;
use crate::transaction::context::TransactionId;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A participant needed an existing transaction but none was active.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// `begin` was called while a transaction was already active.
    #[error("transaction {tx_id} is already active on this context")]
    AlreadyActive { tx_id: TransactionId },

    /// A participant that must run without a transaction found one.
    #[error("existing transaction {tx_id} found for a participant that forbids one")]
    ExistingTransaction { tx_id: TransactionId },

    /// Commit was requested but a participant had marked the transaction
    /// rollback-only, so it was rolled back instead.
    #[error("transaction {tx_id} silently rolled back because it has been marked as rollback-only")]
    UnexpectedRollback { tx_id: TransactionId },

    /// Invalid operation for current transaction state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An enlisted resource failed to commit.
    #[error("resource error: {0}")]
    Resource(#[from] StorageError),
}

impl TransactionError {
    /// Check if this error is the commit-turned-rollback signal.
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(self, TransactionError::UnexpectedRollback { .. })
    }

    /// Check if this error is retryable.
    ///
    /// Nothing here is: an unexpected rollback means the caller's intent and
    /// the outcome disagree, which a retry would repeat.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let tx_id = TransactionId::generate();
        let unexpected = TransactionError::UnexpectedRollback { tx_id };
        assert!(unexpected.is_unexpected_rollback());
        assert!(!unexpected.is_retryable());
        assert!(unexpected.to_string().contains("rollback-only"));

        assert!(!TransactionError::NoActiveTransaction.is_unexpected_rollback());
    }
}
