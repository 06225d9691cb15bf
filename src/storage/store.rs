//! In-memory record store with per-transaction write sets.
//!
//! Writes made under an active transaction go to a write set keyed by the
//! transaction id and only become visible to other call chains when the
//! owning participant commits. Writes made with no active transaction are
//! applied immediately.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::record::Record;
use crate::storage::types::{RecordId, RecordKey};
use crate::transaction::{TransactionContext, TransactionId, TransactionalResource};

/// Makes `save` fail for matching keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureTrigger {
    /// Fail when the key equals this one.
    Key(RecordKey),
    /// Fail when the key contains this marker.
    Contains(String),
}

impl FailureTrigger {
    /// Check if a save of `key` should fail.
    pub fn matches(&self, key: &RecordKey) -> bool {
        match self {
            FailureTrigger::Key(k) => k == key,
            FailureTrigger::Contains(marker) => key.as_str().contains(marker.as_str()),
        }
    }
}

/// A named store of records, shareable across threads via Clone.
pub struct RecordStore<R: Record> {
    inner: Arc<StoreInner<R>>,
}

impl<R: Record> Clone for RecordStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<R> {
    name: String,
    committed: RwLock<BTreeMap<RecordKey, R>>,
    pending: Mutex<HashMap<TransactionId, BTreeMap<RecordKey, R>>>,
    next_id: AtomicU64,
    failure: RwLock<Option<FailureTrigger>>,
}

impl<R: Record> RecordStore<R> {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_records(name.into(), BTreeMap::new())
    }

    fn with_records(name: String, committed: BTreeMap<RecordKey, R>) -> Self {
        let next_id = committed
            .values()
            .filter_map(|r| r.id())
            .map(|id| id.get())
            .max()
            .unwrap_or(0)
            + 1;

        Self {
            inner: Arc::new(StoreInner {
                name,
                committed: RwLock::new(committed),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(next_id),
                failure: RwLock::new(None),
            }),
        }
    }

    /// Builder form of [`set_failure`](Self::set_failure).
    pub fn with_failure(self, trigger: FailureTrigger) -> Self {
        self.set_failure(Some(trigger));
        self
    }

    /// Install or clear the failure trigger.
    pub fn set_failure(&self, trigger: Option<FailureTrigger>) {
        *self.inner.failure.write() = trigger;
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Save a record and return it with its assigned id.
    ///
    /// Under an active transaction the write is staged and the store enlists
    /// itself; otherwise the write is applied immediately.
    pub fn save(&self, ctx: &TransactionContext, record: R) -> StorageResult<R> {
        let key = record.key().clone();
        let status = ctx.status();

        if status.as_ref().is_some_and(|s| s.read_only) {
            return Err(StorageError::ReadOnlyTransaction {
                store: self.inner.name.clone(),
            });
        }

        if let Some(trigger) = self.inner.failure.read().as_ref() {
            if trigger.matches(&key) {
                warn!(store = %self.inner.name, %key, "save failed");
                return Err(StorageError::StoreFailure {
                    store: self.inner.name.clone(),
                    key,
                });
            }
        }

        let id = RecordId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let saved = record.with_id(id);

        match status {
            Some(status) => {
                let resource: Arc<dyn TransactionalResource> = self.inner.clone();
                if !ctx.enlist(resource) {
                    return Err(StorageError::Internal(format!(
                        "transaction {} ended while saving",
                        status.tx_id
                    )));
                }
                self.inner
                    .pending
                    .lock()
                    .entry(status.tx_id)
                    .or_default()
                    .insert(key.clone(), saved.clone());
                debug!(store = %self.inner.name, %key, %id, tx_id = %status.tx_id, "staged record");
            }
            None => {
                self.inner.committed.write().insert(key.clone(), saved.clone());
                debug!(store = %self.inner.name, %key, %id, "saved record without a transaction");
            }
        }

        Ok(saved)
    }

    /// Find a record as seen from `ctx`: its own staged writes first, then
    /// committed data.
    pub fn find(&self, ctx: &TransactionContext, key: &RecordKey) -> Option<R> {
        if let Some(tx_id) = ctx.transaction_id() {
            let pending = self.inner.pending.lock();
            if let Some(record) = pending.get(&tx_id).and_then(|writes| writes.get(key)) {
                return Some(record.clone());
            }
        }
        self.find_committed(key)
    }

    /// Find a committed record.
    pub fn find_committed(&self, key: &RecordKey) -> Option<R> {
        self.inner.committed.read().get(key).cloned()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.inner.committed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All committed records, ordered by key.
    pub fn records(&self) -> Vec<R> {
        self.inner.committed.read().values().cloned().collect()
    }

    /// Number of transactions holding staged writes here.
    pub fn pending_transactions(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Committed records as a JSON array.
    pub fn snapshot(&self) -> StorageResult<Value> {
        Ok(serde_json::to_value(self.records())?)
    }

    /// Write committed records to a JSON file.
    pub fn write_snapshot(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, &self.records())?;
        Ok(())
    }

    /// Open a store whose committed data comes from a snapshot file.
    pub fn load_snapshot(name: impl Into<String>, path: impl AsRef<Path>) -> StorageResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let records: Vec<R> = serde_json::from_reader(reader)?;
        let committed = records
            .into_iter()
            .map(|r| (r.key().clone(), r))
            .collect();
        Ok(Self::with_records(name.into(), committed))
    }
}

impl<R: Record> TransactionalResource for StoreInner<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&self, tx_id: TransactionId) -> StorageResult<()> {
        let writes = self.pending.lock().remove(&tx_id).unwrap_or_default();
        let count = writes.len();
        self.committed.write().extend(writes);
        debug!(store = %self.name, %tx_id, count, "committed staged records");
        Ok(())
    }

    fn rollback(&self, tx_id: TransactionId) {
        let discarded = self.pending.lock().remove(&tx_id).map_or(0, |w| w.len());
        debug!(store = %self.name, %tx_id, discarded, "discarded staged records");
    }
}

impl<R: Record> std::fmt::Debug for RecordStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("pending_transactions", &self.pending_transactions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::storage::record::Member;
    use crate::transaction::Outcome;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).unwrap()
    }

    #[test]
    fn test_save_without_transaction_is_immediate() {
        let store = RecordStore::<Member>::new("member");
        let ctx = TransactionContext::new();

        let saved = store.save(&ctx, Member::new(key("alice"))).unwrap();
        assert_eq!(saved.id, Some(RecordId::new(1)));
        assert_eq!(store.find_committed(&key("alice")), Some(saved));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_staged_write_visible_only_to_own_transaction() {
        let store = RecordStore::<Member>::new("member");
        let ctx = TransactionContext::new();
        let other = TransactionContext::new();

        let owner = ctx.begin(false).unwrap();
        store.save(&ctx, Member::new(key("alice"))).unwrap();

        assert!(store.find(&ctx, &key("alice")).is_some());
        assert!(store.find(&other, &key("alice")).is_none());
        assert!(store.find_committed(&key("alice")).is_none());
        assert_eq!(store.pending_transactions(), 1);

        ctx.end(owner, Outcome::Commit).unwrap();
        assert!(store.find(&other, &key("alice")).is_some());
        assert_eq!(store.pending_transactions(), 0);
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let store = RecordStore::<Member>::new("member");
        let ctx = TransactionContext::new();

        let owner = ctx.begin(false).unwrap();
        store.save(&ctx, Member::new(key("alice"))).unwrap();
        ctx.end(owner, Outcome::Rollback).unwrap();

        assert!(store.find(&ctx, &key("alice")).is_none());
        assert!(store.is_empty());
        assert_eq!(store.pending_transactions(), 0);
    }

    #[test]
    fn test_failure_triggers() {
        let store = RecordStore::<Member>::new("log").with_failure(FailureTrigger::Key(key("u2")));
        let ctx = TransactionContext::new();

        let err = store.save(&ctx, Member::new(key("u2"))).unwrap_err();
        assert!(err.is_store_failure());
        assert!(store.save(&ctx, Member::new(key("u22"))).is_ok());

        store.set_failure(Some(FailureTrigger::Contains("log-exception".to_string())));
        assert!(store
            .save(&ctx, Member::new(key("log-exception_fail")))
            .unwrap_err()
            .is_store_failure());

        store.set_failure(None);
        assert!(store.save(&ctx, Member::new(key("u2"))).is_ok());
    }

    #[test]
    fn test_read_only_transaction_rejects_writes() {
        let store = RecordStore::<Member>::new("member");
        let ctx = TransactionContext::new();

        let owner = ctx.begin(true).unwrap();
        let err = store.save(&ctx, Member::new(key("alice"))).unwrap_err();
        assert!(matches!(err, StorageError::ReadOnlyTransaction { .. }));
        ctx.end(owner, Outcome::Commit).unwrap();
    }

    #[test]
    fn test_snapshot_round_trip_keeps_id_sequence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("members.json");
        let ctx = TransactionContext::new();

        let store = RecordStore::<Member>::new("member");
        store.save(&ctx, Member::new(key("alice"))).unwrap();
        store.save(&ctx, Member::new(key("bob"))).unwrap();
        store.write_snapshot(&path).unwrap();

        let reopened = RecordStore::<Member>::load_snapshot("member", &path).unwrap();
        assert_eq!(reopened.records(), store.records());
        assert_eq!(reopened.snapshot().unwrap(), store.snapshot().unwrap());

        let carol = reopened.save(&ctx, Member::new(key("carol"))).unwrap();
        assert_eq!(carol.id, Some(RecordId::new(3)));
    }
}
