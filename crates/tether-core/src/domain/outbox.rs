//! Outbox items - pending mutations not yet confirmed by the server
//!
//! An item is created by [`NewOutboxItem`] and receives its queue id and
//! enqueue time from the outbox store. Items are processed strictly in id
//! order and are only removed after the server accepts them (2xx) or a
//! human discards them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;
use super::newtypes::{CollectionName, OutboxId, RecordId, Timestamp};

/// Kind of mutation carried by an outbox item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    /// Storage / display form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl Display for OpType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(DomainError::InvalidOpType(other.to_string())),
        }
    }
}

/// A mutation about to be appended to the outbox
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxItem {
    pub op_type: OpType,
    pub collection: CollectionName,
    /// Record the mutation applies to
    ///
    /// For creates this is the locally generated id, used to re-key the
    /// local copy once the server assigns a permanent one. `None` for a
    /// create whose local copy is not tracked.
    pub target_record_id: Option<RecordId>,
    pub payload: Value,
}

impl NewOutboxItem {
    pub fn create(collection: CollectionName, local_id: RecordId, payload: Value) -> Self {
        Self {
            op_type: OpType::Create,
            collection,
            target_record_id: Some(local_id),
            payload,
        }
    }

    pub fn update(collection: CollectionName, id: RecordId, payload: Value) -> Self {
        Self {
            op_type: OpType::Update,
            collection,
            target_record_id: Some(id),
            payload,
        }
    }

    pub fn delete(collection: CollectionName, id: RecordId) -> Self {
        Self {
            op_type: OpType::Delete,
            collection,
            target_record_id: Some(id),
            payload: Value::Null,
        }
    }

    /// Validate the combination of operation and target
    ///
    /// # Errors
    /// Updates and deletes need a target id.
    pub fn validate(&self) -> Result<(), DomainError> {
        match (self.op_type, &self.target_record_id) {
            (OpType::Update | OpType::Delete, None) => Err(DomainError::ValidationFailed(
                format!("{} requires a target record id", self.op_type),
            )),
            _ => Ok(()),
        }
    }
}

/// A persisted outbox entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxItem {
    pub id: OutboxId,
    pub op_type: OpType,
    pub collection: CollectionName,
    pub target_record_id: Option<RecordId>,
    pub payload: Value,
    pub enqueued_at: Timestamp,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<Timestamp>,
    /// Set when the server refused the mutation as invalid; the item stays
    /// queued but is skipped until a user retries or discards it.
    pub rejected: bool,
}

impl OutboxItem {
    /// True once at least one attempt has failed
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        self.retry_count > 0
    }
}
