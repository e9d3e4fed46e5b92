//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for record identifiers, collection names,
//! outbox sequence numbers and millisecond timestamps. Each newtype
//! validates its input at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Prefix carried by identifiers generated on the client before the
/// server has assigned a permanent one.
pub const LOCAL_ID_PREFIX: &str = "local-";

// ============================================================================
// RecordId
// ============================================================================

/// Globally unique record identifier
///
/// Either server-assigned, or generated client-side as `local-<uuid>` for
/// records created while the server has not yet acknowledged them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a RecordId from an existing identifier
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace or `/`
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidId(
                "Record ID cannot be empty".to_string(),
            ));
        }
        if id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(DomainError::InvalidId(format!(
                "Record ID contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh client-side identifier (`local-<uuid>`)
    #[must_use]
    pub fn generate_local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// True while the id has not been replaced by a server-assigned one
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// CollectionName
// ============================================================================

/// Name of a server collection (`flowers`, `cars`, ...)
///
/// Used both as a URL path segment and inside canonical cache keys, so
/// `/`, `:`, `?` and whitespace are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    /// Create a new CollectionName
    ///
    /// # Errors
    /// Returns error if the name is empty or contains reserved characters
    pub fn new(name: String) -> Result<Self, DomainError> {
        if name.is_empty() {
            return Err(DomainError::InvalidCollection(
                "Collection name cannot be empty".to_string(),
            ));
        }
        if name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | ':' | '?' | '#' | '&'))
        {
            return Err(DomainError::InvalidCollection(name));
        }
        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CollectionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for CollectionName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CollectionName> for String {
    fn from(name: CollectionName) -> Self {
        name.0
    }
}

// ============================================================================
// OutboxId
// ============================================================================

/// Queue-local identifier of an outbox item
///
/// Assigned by the outbox store from a monotonically increasing sequence,
/// so ordering by id is ordering by enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(i64);

impl OutboxId {
    #[must_use]
    pub const fn new(seq: i64) -> Self {
        Self(seq)
    }

    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for OutboxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutboxId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid outbox id '{s}': {e}")))
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// Milliseconds since the Unix epoch
///
/// Serialized as a plain integer, matching the `updatedAt` wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch, used as the cursor value before the first pull
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Add a duration, saturating at `i64::MAX`
    #[must_use]
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(ms))
    }

    /// Elapsed time from `self` to `later`, zero if `later` is earlier
    #[must_use]
    pub fn elapsed_until(&self, later: Timestamp) -> Duration {
        let delta = later.0.saturating_sub(self.0);
        Duration::from_millis(u64::try_from(delta).unwrap_or(0))
    }

    /// Next timestamp for a local write to a record last stamped `previous`
    ///
    /// Keeps `updatedAt` strictly increasing for a given record even when
    /// the wall clock is behind the stored value.
    #[must_use]
    pub fn next_after(previous: Option<Timestamp>) -> Self {
        let now = Self::now();
        match previous {
            Some(prev) if prev.0 >= now.0 => Self(prev.0.saturating_add(1)),
            _ => now,
        }
    }

    /// Convert to a chrono UTC datetime for display
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}
