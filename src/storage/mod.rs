//! storage layer for txcoord
//!
//! Two independent stores sit under the coordinator: one for members and one
//! for log messages. Each store stages writes per physical transaction and
//! applies them when the transaction's owner commits, so the upper layers
//! (transaction manager, services) never juggle write sets themselves.
//!
//! # Usage
//!
//! ```
//! use txcoord::storage::{Member, RecordKey, RecordStore};
//! use txcoord::transaction::{Outcome, TransactionContext};
//!
//! let members = RecordStore::<Member>::new("member");
//! let ctx = TransactionContext::new();
//! let key = RecordKey::new("alice").unwrap();
//!
//! let owner = ctx.begin(false).unwrap();
//! members.save(&ctx, Member::new(key.clone())).unwrap();
//! assert!(members.find_committed(&key).is_none());
//!
//! ctx.end(owner, Outcome::Commit).unwrap();
//! assert!(members.find_committed(&key).is_some());
//! ```

mod error;
mod record;
mod store;
mod types;

// Re-export public API
pub use error::{StorageError, StorageResult};
pub use record::{LogMessage, Member, Record};
pub use store::{FailureTrigger, RecordStore};
pub use types::{InvalidKeyError, RecordId, RecordKey};
