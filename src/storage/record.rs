//! Record types kept by the stores.
//!
//! A record carries an optional store-assigned id and a natural key used for
//! lookups. The store fills the id in on save.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::types::{RecordId, RecordKey};

/// Something a [`RecordStore`](crate::storage::RecordStore) can persist.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// natural key used by `find`
    fn key(&self) -> &RecordKey;

    /// id assigned by the store, `None` until saved
    fn id(&self) -> Option<RecordId>;

    /// copy of this record carrying the given id
    fn with_id(self, id: RecordId) -> Self;
}

/// A registered member, keyed by username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<RecordId>,
    pub username: RecordKey,
}

impl Member {
    pub fn new(username: RecordKey) -> Self {
        Self { id: None, username }
    }
}

impl Record for Member {
    fn key(&self) -> &RecordKey {
        &self.username
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn with_id(self, id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }
}

/// An audit log line written alongside a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub id: Option<RecordId>,
    pub message: RecordKey,
}

impl LogMessage {
    pub fn new(message: RecordKey) -> Self {
        Self { id: None, message }
    }
}

impl Record for LogMessage {
    fn key(&self) -> &RecordKey {
        &self.message
    }

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn with_id(self, id: RecordId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }
}
