//! txcoord - a nested-transaction coordinator
//!
//! This crate coordinates flat, joined transactions over in-memory record
//! stores. Every participant on a call chain shares one physical
//! transaction; a participant that fails marks it rollback-only, and a
//! commit requested on a rollback-only transaction is rolled back and
//! reported as an unexpected rollback instead of silently succeeding.
//!
//! # Example
//!
//! ```
//! use txcoord::service::{MemberService, ServiceConfig};
//! use txcoord::storage::{FailureTrigger, RecordStore};
//! use txcoord::transaction::{TransactionContext, TransactionManager};
//!
//! let logs = RecordStore::new("log")
//!     .with_failure(FailureTrigger::Contains("log-exception".to_string()));
//! let service = MemberService::new(
//!     TransactionManager::new(),
//!     RecordStore::new("member"),
//!     logs,
//!     ServiceConfig::outer_tx_on(),
//! );
//!
//! let ctx = TransactionContext::new();
//! service.join_v1(&ctx, "alice").unwrap();
//!
//! let err = service.join_v2(&ctx, "log-exception_bob").unwrap_err();
//! assert!(err.is_unexpected_rollback());
//! ```

pub mod service;
pub mod storage;
pub mod transaction;
