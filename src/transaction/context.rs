//! Call-chain scoped transaction context.
//!
//! A [`TransactionContext`] is created once per logical call chain and passed
//! by reference to every participant. It holds at most one physical
//! transaction at a time. Participants take a [`Participant`] handle from
//! `begin` or `join` and give it back to `end`:
//! - handles are not clonable and `end` consumes them, so a participant can
//!   not end twice
//! - handles must be ended in reverse order of acquisition; an owner that
//!   ends while joined handles are still out rolls the transaction back
//! - only the handle from `begin` (depth 1) commits or rolls back physically
//!
//! The context is `!Sync`; it never crosses threads, so its state lives in a
//! `RefCell` rather than behind a lock.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::resource::TransactionalResource;

/// Identifier of a physical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Ulid);

impl TransactionId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

/// What the ending participant asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

/// What actually happened when a participant ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndResult {
    /// The physical transaction committed.
    Committed,
    /// The physical transaction rolled back as requested.
    RolledBack,
    /// Commit was requested, but the transaction was rollback-only and was
    /// rolled back instead.
    UnexpectedRollback,
    /// A nested participant left; nothing physical happened.
    Released,
}

impl EndResult {
    /// Check if this end terminated the physical transaction.
    pub fn is_physical(&self) -> bool {
        !matches!(self, EndResult::Released)
    }
}

/// A participant's claim on the active transaction.
#[derive(Debug)]
#[must_use = "a participant must be passed back to `end`"]
pub struct Participant {
    tx_id: TransactionId,
    depth: usize,
}

impl Participant {
    /// The physical transaction this participant belongs to.
    pub fn transaction_id(&self) -> TransactionId {
        self.tx_id
    }

    /// Nesting depth at which this participant entered (1 for the owner).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Check if this participant began the physical transaction.
    pub fn is_owner(&self) -> bool {
        self.depth == 1
    }
}

/// Observable state of the active transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
    pub tx_id: TransactionId,
    pub read_only: bool,
    pub rollback_only: bool,
    pub depth: usize,
    pub started_at: DateTime<Utc>,
}

struct ActiveTransaction {
    tx_id: TransactionId,
    read_only: bool,
    rollback_only: bool,
    depth: usize,
    started_at: DateTime<Utc>,
    resources: Vec<Arc<dyn TransactionalResource>>,
}

impl ActiveTransaction {
    fn commit_resources(&self) -> TransactionResult<()> {
        for (i, resource) in self.resources.iter().enumerate() {
            if let Err(e) = resource.commit(self.tx_id) {
                warn!(
                    tx_id = %self.tx_id,
                    resource = resource.name(),
                    error = %e,
                    "resource failed to commit, rolling back the rest"
                );
                for rest in &self.resources[i + 1..] {
                    rest.rollback(self.tx_id);
                }
                return Err(TransactionError::Resource(e));
            }
        }
        Ok(())
    }

    fn rollback_resources(&self) {
        for resource in &self.resources {
            resource.rollback(self.tx_id);
        }
    }
}

/// Transaction state for one call chain.
#[derive(Default)]
pub struct TransactionContext {
    current: RefCell<Option<ActiveTransaction>>,
}

impl TransactionContext {
    /// Create a context with no active transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a physical transaction. The returned participant owns it.
    pub fn begin(&self, read_only: bool) -> TransactionResult<Participant> {
        let mut current = self.current.borrow_mut();
        if let Some(active) = current.as_ref() {
            return Err(TransactionError::AlreadyActive {
                tx_id: active.tx_id,
            });
        }

        let tx_id = TransactionId::generate();
        *current = Some(ActiveTransaction {
            tx_id,
            read_only,
            rollback_only: false,
            depth: 1,
            started_at: Utc::now(),
            resources: Vec::new(),
        });
        debug!(%tx_id, read_only, "began physical transaction");

        Ok(Participant { tx_id, depth: 1 })
    }

    /// Join the active transaction one level deeper.
    pub fn join(&self) -> TransactionResult<Participant> {
        let mut current = self.current.borrow_mut();
        let active = current
            .as_mut()
            .ok_or(TransactionError::NoActiveTransaction)?;

        active.depth += 1;
        debug!(tx_id = %active.tx_id, depth = active.depth, "joined transaction");

        Ok(Participant {
            tx_id: active.tx_id,
            depth: active.depth,
        })
    }

    /// Doom the active transaction. Every participant sharing it sees the mark.
    pub fn mark_rollback_only(&self) -> TransactionResult<()> {
        let mut current = self.current.borrow_mut();
        let active = current
            .as_mut()
            .ok_or(TransactionError::NoActiveTransaction)?;

        if !active.rollback_only {
            debug!(tx_id = %active.tx_id, depth = active.depth, "marked rollback-only");
        }
        active.rollback_only = true;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.current.borrow().as_ref().is_some_and(|a| a.read_only)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.current.borrow().as_ref().is_some_and(|a| a.rollback_only)
    }

    /// Current nesting depth, 0 when nothing is active.
    pub fn depth(&self) -> usize {
        self.current.borrow().as_ref().map_or(0, |a| a.depth)
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.current.borrow().as_ref().map(|a| a.tx_id)
    }

    /// Snapshot of the active transaction, if any.
    pub fn status(&self) -> Option<TransactionStatus> {
        self.current.borrow().as_ref().map(|a| TransactionStatus {
            tx_id: a.tx_id,
            read_only: a.read_only,
            rollback_only: a.rollback_only,
            depth: a.depth,
            started_at: a.started_at,
        })
    }

    /// Register a resource with the active transaction.
    ///
    /// Returns `false` when nothing is active. Enlisting the same resource
    /// name twice is a no-op.
    pub fn enlist(&self, resource: Arc<dyn TransactionalResource>) -> bool {
        let mut current = self.current.borrow_mut();
        let Some(active) = current.as_mut() else {
            return false;
        };

        if !active.resources.iter().any(|r| r.name() == resource.name()) {
            debug!(tx_id = %active.tx_id, resource = resource.name(), "enlisted resource");
            active.resources.push(resource);
        }
        true
    }

    /// End a participant.
    ///
    /// A nested participant only decrements the depth (marking the
    /// transaction rollback-only first when asked to roll back). The owner
    /// terminates the physical transaction: a commit of a rollback-only
    /// transaction rolls back and reports [`EndResult::UnexpectedRollback`].
    pub fn end(&self, participant: Participant, outcome: Outcome) -> TransactionResult<EndResult> {
        let finished = {
            let mut current = self.current.borrow_mut();
            let active = current
                .as_mut()
                .ok_or(TransactionError::NoActiveTransaction)?;

            if active.tx_id != participant.tx_id {
                return Err(TransactionError::InvalidOperation(format!(
                    "participant of transaction {} ended while {} is active",
                    participant.tx_id, active.tx_id
                )));
            }
            if active.depth != participant.depth {
                let err = TransactionError::InvalidOperation(format!(
                    "participant at depth {} ended while depth is {}",
                    participant.depth, active.depth
                ));
                // The owner is leaving with joined participants never ended:
                // nothing can end this transaction after it.
                if participant.is_owner() {
                    if let Some(abandoned) = current.take() {
                        warn!(
                            tx_id = %abandoned.tx_id,
                            depth = abandoned.depth,
                            "owner ended with unended participants, rolling back"
                        );
                        abandoned.rollback_resources();
                    }
                }
                return Err(err);
            }

            if outcome == Outcome::Rollback {
                active.rollback_only = true;
            }

            if active.depth > 1 {
                active.depth -= 1;
                debug!(
                    tx_id = %active.tx_id,
                    depth = active.depth,
                    ?outcome,
                    "released nested participant"
                );
                return Ok(EndResult::Released);
            }

            match current.take() {
                Some(finished) => finished,
                None => return Err(TransactionError::NoActiveTransaction),
            }
        };

        let tx_id = finished.tx_id;
        match (outcome, finished.rollback_only) {
            (Outcome::Commit, false) => {
                finished.commit_resources()?;
                debug!(%tx_id, "committed physical transaction");
                Ok(EndResult::Committed)
            }
            (Outcome::Commit, true) => {
                finished.rollback_resources();
                warn!(%tx_id, "commit requested on a rollback-only transaction, rolled back");
                Ok(EndResult::UnexpectedRollback)
            }
            (Outcome::Rollback, _) => {
                finished.rollback_resources();
                debug!(%tx_id, "rolled back physical transaction");
                Ok(EndResult::RolledBack)
            }
        }
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if let Some(abandoned) = self.current.get_mut().take() {
            warn!(
                tx_id = %abandoned.tx_id,
                depth = abandoned.depth,
                "context dropped with an active transaction, rolling back"
            );
            abandoned.rollback_resources();
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("status", &self.status())
            .finish()
    }
}
