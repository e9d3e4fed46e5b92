//! Record entity
//!
//! A `Record` is a server-owned domain entity with an open field set.
//! The engine only interprets `id`, `ownerId`, `updatedAt` and the
//! tombstone flag; every other key travels untouched in `fields`.
//!
//! ## Last-write-wins
//!
//! Two versions of the same record are ordered by `updatedAt`. An incoming
//! version replaces the local one when `incoming.updated_at >= local.updated_at`,
//! so ties favor the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::newtypes::{RecordId, Timestamp};

/// Wire keys owned by the engine; stripped from `fields` on construction.
const RESERVED_KEYS: &[&str] = &["id", "ownerId", "updatedAt", "deleted"];

/// A domain record as stored locally and exchanged with the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub updated_at: Timestamp,
    /// True once the record has been deleted
    #[serde(default, rename = "deleted", alias = "tombstone")]
    pub tombstone: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Build a record from an id, a timestamp and a field map
    ///
    /// Engine-owned keys present in `fields` are dropped.
    pub fn new(id: RecordId, updated_at: Timestamp, mut fields: Map<String, Value>) -> Self {
        for key in RESERVED_KEYS {
            fields.remove(*key);
        }
        Self {
            id,
            owner_id: None,
            updated_at,
            tombstone: false,
            fields,
        }
    }

    /// Returns true if `self` wins over `existing` under last-write-wins
    #[must_use]
    pub fn supersedes(&self, existing: &Record) -> bool {
        self.updated_at >= existing.updated_at
    }

    /// Body sent to the server for create/update requests
    ///
    /// Contains the domain fields plus `updatedAt` (and `ownerId` when
    /// known). The id travels in the URL, never in the body.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut body = self.fields.clone();
        body.insert(
            "updatedAt".to_string(),
            Value::from(self.updated_at.as_millis()),
        );
        if let Some(owner) = &self.owner_id {
            body.insert("ownerId".to_string(), Value::from(owner.clone()));
        }
        Value::Object(body)
    }

    /// Update body carrying only the `changed` fields
    ///
    /// The server merges it over its copy, so edits queued one after the
    /// other never resend (and overwrite) each other's values.
    #[must_use]
    pub fn to_partial_payload<'a>(&self, changed: impl IntoIterator<Item = &'a String>) -> Value {
        let Value::Object(full) = self.to_payload() else {
            return Value::Null;
        };
        let mut body: Map<String, Value> = changed
            .into_iter()
            .filter_map(|key| full.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        for key in ["updatedAt", "ownerId"] {
            if let Some(value) = full.get(key) {
                body.insert(key.to_string(), value.clone());
            }
        }
        Value::Object(body)
    }

    /// Return a tombstoned copy stamped with `at`
    #[must_use]
    pub fn into_tombstone(mut self, at: Timestamp) -> Self {
        self.tombstone = true;
        self.updated_at = at;
        self
    }
}
