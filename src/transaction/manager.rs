//! Transaction manager - applies propagation and drives participants.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Propagation decisions (begin, join, or run without a transaction)
//! - Rollback-only marking when an error leaves a joined participant
//! - Turning a doomed commit into an `UnexpectedRollback` error
//! - Tracking active physical transactions and their outcomes

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::transaction::context::{
    EndResult, Outcome, Participant, TransactionContext, TransactionId,
};
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::propagation::{Propagation, TransactionDefinition};

/// Registry entry for an active physical transaction.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    /// Physical transaction id.
    pub tx_id: TransactionId,
    /// Name of the definition that began it.
    pub name: Option<String>,
    /// Read-only flag it was begun with.
    pub read_only: bool,
    /// When it began.
    pub started_at: DateTime<Utc>,
}

/// Counters over everything this manager coordinated.
///
/// `committed + rolled_back + unexpected_rollbacks` counts physical ends,
/// which happen once per begun transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub joined: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub unexpected_rollbacks: u64,
}

impl TransactionStats {
    /// Number of physical transactions that reached a terminal state.
    pub fn physical_ends(&self) -> u64 {
        self.committed + self.rolled_back + self.unexpected_rollbacks
    }
}

/// Transaction manager - coordinates participants over per-chain contexts.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
/// Contexts are not; each call chain brings its own.
#[derive(Clone, Default)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

#[derive(Default)]
struct TransactionManagerInner {
    /// Active physical transactions tracked by ID.
    active: RwLock<HashMap<TransactionId, TransactionMetadata>>,
    stats: Mutex<TransactionStats>,
}

impl TransactionManager {
    /// Create a new transaction manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a participant according to the definition's propagation.
    ///
    /// Returns `None` when the participant runs without a transaction.
    pub fn begin(
        &self,
        ctx: &TransactionContext,
        definition: &TransactionDefinition,
    ) -> TransactionResult<Option<Participant>> {
        let tx_name = definition.name.as_deref().unwrap_or("<unnamed>");

        match (definition.propagation, ctx.transaction_id()) {
            (Propagation::Never, Some(tx_id)) => {
                Err(TransactionError::ExistingTransaction { tx_id })
            }
            (Propagation::Never, None) | (Propagation::Supports, None) => {
                debug!(tx_name, propagation = %definition.propagation, "running without a transaction");
                Ok(None)
            }
            (Propagation::Mandatory, None) => Err(TransactionError::NoActiveTransaction),
            (Propagation::Required, None) => {
                let participant = ctx.begin(definition.read_only)?;
                let tx_id = participant.transaction_id();
                let started_at = ctx.status().map_or_else(Utc::now, |s| s.started_at);
                debug!(tx_name, %tx_id, "creating new transaction");

                self.inner.active.write().insert(
                    tx_id,
                    TransactionMetadata {
                        tx_id,
                        name: definition.name.clone(),
                        read_only: definition.read_only,
                        started_at,
                    },
                );
                self.inner.stats.lock().begun += 1;
                Ok(Some(participant))
            }
            (_, Some(tx_id)) => {
                let participant = ctx.join()?;
                debug!(tx_name, %tx_id, depth = participant.depth(), "participating in existing transaction");
                self.inner.stats.lock().joined += 1;
                Ok(Some(participant))
            }
        }
    }

    /// End a participant and record the result.
    pub fn end(
        &self,
        ctx: &TransactionContext,
        participant: Participant,
        outcome: Outcome,
    ) -> TransactionResult<EndResult> {
        let tx_id = participant.transaction_id();
        let owner = participant.is_owner();
        let result = ctx.end(participant, outcome);

        let finished = ctx.transaction_id() != Some(tx_id);
        if finished {
            self.mark_completed(tx_id);
        }

        let end = match result {
            Ok(end) => end,
            Err(e) => {
                // A failed owner end still rolled the transaction back.
                if owner && finished {
                    self.inner.stats.lock().rolled_back += 1;
                }
                return Err(e);
            }
        };
        let mut stats = self.inner.stats.lock();
        match end {
            EndResult::Committed => stats.committed += 1,
            EndResult::RolledBack => stats.rolled_back += 1,
            EndResult::UnexpectedRollback => stats.unexpected_rollbacks += 1,
            EndResult::Released => {}
        }
        Ok(end)
    }

    /// Execute a function as a transactional participant.
    ///
    /// If the function returns Ok, the participant ends with a commit; when
    /// it owns a transaction that an inner participant marked rollback-only,
    /// the commit becomes a rollback and `UnexpectedRollback` is returned.
    /// If the function returns Err or panics, the participant marks the
    /// transaction rollback-only (when joined) and ends with a rollback.
    /// The function's own error is returned unchanged.
    pub fn execute<F, T, E>(
        &self,
        ctx: &TransactionContext,
        definition: &TransactionDefinition,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let Some(participant) = self.begin(ctx, definition)? else {
            return f(ctx);
        };
        let tx_id = participant.transaction_id();
        let mut guard = ParticipantGuard {
            manager: self,
            ctx,
            participant: Some(participant),
        };

        let result = f(ctx);
        let participant = guard.disarm()?;

        match result {
            Ok(value) => match self.end(ctx, participant, Outcome::Commit)? {
                EndResult::UnexpectedRollback => {
                    Err(TransactionError::UnexpectedRollback { tx_id }.into())
                }
                _ => Ok(value),
            },
            Err(e) => {
                if !participant.is_owner() {
                    if let Err(mark_err) = ctx.mark_rollback_only() {
                        warn!(%tx_id, error = %mark_err, "failed to mark transaction rollback-only");
                    }
                }
                if let Err(end_err) = self.end(ctx, participant, Outcome::Rollback) {
                    warn!(%tx_id, error = %end_err, "failed to end participant after error");
                }
                Err(e)
            }
        }
    }

    /// Execute a function under the default `Required` definition.
    pub fn with_transaction<F, T, E>(&self, ctx: &TransactionContext, f: F) -> Result<T, E>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
        E: From<TransactionError>,
    {
        self.execute(ctx, &TransactionDefinition::required(), f)
    }

    /// Get the number of active physical transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// List all active transaction IDs.
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.inner.active.read().keys().copied().collect()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: TransactionId) -> bool {
        self.inner.active.read().contains_key(&tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn get_transaction_info(&self, tx_id: TransactionId) -> Option<TransactionMetadata> {
        self.inner.active.read().get(&tx_id).cloned()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> TransactionStats {
        *self.inner.stats.lock()
    }

    fn mark_completed(&self, tx_id: TransactionId) {
        self.inner.active.write().remove(&tx_id);
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Rolls a participant back if its closure unwinds.
struct ParticipantGuard<'a> {
    manager: &'a TransactionManager,
    ctx: &'a TransactionContext,
    participant: Option<Participant>,
}

impl ParticipantGuard<'_> {
    fn disarm(&mut self) -> TransactionResult<Participant> {
        self.participant.take().ok_or_else(|| {
            TransactionError::InvalidOperation("participant already ended".to_string())
        })
    }
}

impl Drop for ParticipantGuard<'_> {
    fn drop(&mut self) {
        if let Some(participant) = self.participant.take() {
            let tx_id = participant.transaction_id();
            if let Err(e) = self.manager.end(self.ctx, participant, Outcome::Rollback) {
                warn!(%tx_id, error = %e, "failed to end participant while unwinding");
            }
        }
    }
}
