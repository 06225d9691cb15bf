//! Repositories: a store plus an optional transactional boundary.

use crate::service::error::ServiceResult;
use crate::storage::{LogMessage, Member, Record, RecordKey, RecordStore};
use crate::transaction::{TransactionContext, TransactionDefinition, TransactionManager};

/// Saves through a store, optionally as a `Required` participant.
pub struct Repository<R: Record> {
    store: RecordStore<R>,
    manager: TransactionManager,
    definition: Option<TransactionDefinition>,
}

/// Repository over the member store.
pub type MemberRepository = Repository<Member>;

/// Repository over the log store.
pub type LogRepository = Repository<LogMessage>;

impl<R: Record> Repository<R> {
    /// A repository whose `save` runs as a participant named `name`.
    pub fn transactional(
        store: RecordStore<R>,
        manager: TransactionManager,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            manager,
            definition: Some(TransactionDefinition::required().named(name)),
        }
    }

    /// A repository that writes straight to the store, inside whatever
    /// transaction the caller has open.
    pub fn plain(store: RecordStore<R>, manager: TransactionManager) -> Self {
        Self {
            store,
            manager,
            definition: None,
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.definition.is_some()
    }

    pub fn save(&self, ctx: &TransactionContext, record: R) -> ServiceResult<R> {
        match &self.definition {
            Some(definition) => self
                .manager
                .execute(ctx, definition, |ctx| Ok(self.store.save(ctx, record)?)),
            None => Ok(self.store.save(ctx, record)?),
        }
    }

    /// Committed record for `key`.
    pub fn find(&self, key: &RecordKey) -> Option<R> {
        self.store.find_committed(key)
    }

    /// Record for `key` as seen from inside `ctx`'s transaction.
    pub fn find_in(&self, ctx: &TransactionContext, key: &RecordKey) -> Option<R> {
        self.store.find(ctx, key)
    }

    pub fn store(&self) -> &RecordStore<R> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FailureTrigger;
    use crate::transaction::TransactionStats;

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).unwrap()
    }

    #[test]
    fn test_transactional_save_commits_on_its_own() {
        let manager = TransactionManager::new();
        let repo = MemberRepository::transactional(
            RecordStore::new("member"),
            manager.clone(),
            "MemberRepository.save",
        );
        let ctx = TransactionContext::new();

        repo.save(&ctx, Member::new(key("alice"))).unwrap();
        assert!(repo.find(&key("alice")).is_some());
        assert_eq!(manager.stats().committed, 1);
    }

    #[test]
    fn test_transactional_save_failure_rolls_back_own_transaction() {
        let manager = TransactionManager::new();
        let store = RecordStore::new("log").with_failure(FailureTrigger::Key(key("bad")));
        let repo = LogRepository::transactional(store, manager.clone(), "LogRepository.save");
        let ctx = TransactionContext::new();

        let err = repo.save(&ctx, LogMessage::new(key("bad"))).unwrap_err();
        assert!(err.is_store_failure());
        assert!(repo.find(&key("bad")).is_none());
        assert_eq!(manager.stats().rolled_back, 1);
    }

    #[test]
    fn test_plain_save_joins_nothing() {
        let manager = TransactionManager::new();
        let repo = MemberRepository::plain(RecordStore::new("member"), manager.clone());
        let ctx = TransactionContext::new();
        assert!(!repo.is_transactional());

        repo.save(&ctx, Member::new(key("alice"))).unwrap();
        assert!(repo.find(&key("alice")).is_some());
        assert_eq!(manager.stats(), TransactionStats::default());
    }
}
