//! The seam between the transaction context and the stores it coordinates.

use crate::storage::StorageResult;
use crate::transaction::context::TransactionId;

/// A resource whose writes are staged per physical transaction.
///
/// Stores enlist themselves with the active context on their first write.
/// The owning participant's end then commits or rolls back every enlisted
/// resource exactly once.
pub trait TransactionalResource: Send + Sync {
    /// Name used to deduplicate enlistment.
    fn name(&self) -> &str;

    /// Make the writes staged under `tx_id` visible to everyone.
    fn commit(&self, tx_id: TransactionId) -> StorageResult<()>;

    /// Discard the writes staged under `tx_id`.
    fn rollback(&self, tx_id: TransactionId);
}
