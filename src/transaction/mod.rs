//! Transaction coordination for txcoord.
//!
//! This module implements flat, joined transactions over shared resources.
//! The first participant on a call chain begins a physical transaction; every
//! participant after it joins the same one. A failing joined participant
//! marks the transaction rollback-only, and the owner's later commit turns
//! into a rollback reported as `UnexpectedRollback`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │  (Propagation decisions, rollback marking, tx registry)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Transaction │       │ Propagation │       │Transactional│
//!  │   Context   │       │ Definition  │       │  Resource   │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use txcoord::transaction::{TransactionContext, TransactionError, TransactionManager};
//!
//! let manager = TransactionManager::new();
//! let ctx = TransactionContext::new();
//!
//! let result: Result<(), TransactionError> = manager.with_transaction(&ctx, |ctx| {
//!     // A nested participant fails and the error is swallowed...
//!     let _ = manager.with_transaction(ctx, |_| -> Result<(), TransactionError> {
//!         Err(TransactionError::InvalidOperation("inner".into()))
//!     });
//!     Ok(())
//! });
//!
//! // ...but the transaction was already doomed.
//! assert!(result.unwrap_err().is_unexpected_rollback());
//! ```

mod context;
mod error;
mod manager;
mod propagation;
mod resource;

pub use context::{
    EndResult, Outcome, Participant, TransactionContext, TransactionId, TransactionStatus,
};
pub use error::{TransactionError, TransactionResult};
pub use manager::{TransactionManager, TransactionMetadata, TransactionStats};
pub use propagation::{Propagation, TransactionDefinition};
pub use resource::TransactionalResource;
