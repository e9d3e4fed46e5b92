//! Tether Sync - offline-first synchronization engine
//!
//! Provides:
//! - Pull/push reconciliation with last-write-wins conflict resolution
//! - A durable outbox drained in enqueue order
//! - Connectivity-driven and periodic sync triggers
//! - A live push channel feeding the local cache
//!
//! ## Modules
//!
//! - [`orchestrator`] - single-flight pull/push state machine
//! - [`records`] - read/write API used by UI code (cache-first reads, outbox fallback)
//! - [`api`] - typed server calls over the transport port, with error classification
//! - [`connectivity`] - deduplicating reachability monitor
//! - [`push_channel`] - out-of-band record updates
//! - [`scheduler`] - background trigger loop
//! - [`context`] - explicitly owned facade wiring everything together

pub mod api;
pub mod connectivity;
pub mod context;
pub mod observers;
pub mod orchestrator;
pub mod push_channel;
pub mod records;
pub mod retry;
pub mod scheduler;

pub use api::{RecordPage, RemoteRecords};
pub use connectivity::ConnectivityMonitor;
pub use context::SyncContext;
pub use observers::{Observers, Subscription};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport, SyncSettings, SyncStores};
pub use push_channel::PushChannel;
pub use records::{PageSource, RecordDraft, RecordRepository, RecordsPage, SaveOutcome};
pub use retry::RetryPolicy;
pub use scheduler::{SchedulerHandle, SyncScheduler};

use thiserror::Error;

use tether_core::domain::DomainError;
use tether_core::ports::TransportError;

/// Longest server message kept in an error
const MAX_MESSAGE_LEN: usize = 200;

/// Errors produced while talking to the server or the local stores
///
/// The variants follow the retry taxonomy: `Validation` is the only
/// server-side failure that will not succeed on retry, and `Transport` and
/// `Offline` stop the rest of a push batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No attempt was made (no connectivity or no credentials)
    #[error("Offline: {0}")]
    Offline(String),

    /// The server refused the credentials (401)
    #[error("Authentication required (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// The server rejected the request content (4xx other than 401)
    #[error("Rejected by server (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    /// Network-level failure or timeout
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server failed to process the request (5xx)
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body could not be understood
    #[error("Malformed server response: {0}")]
    Malformed(String),

    /// A local store operation failed
    #[error("Local storage error: {0}")]
    Storage(String),

    /// Invalid input
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SyncError {
    /// Classify a non-2xx response
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body);
        match status {
            401 => SyncError::Auth { status, message },
            400..=499 => SyncError::Validation { status, message },
            _ => SyncError::Server { status, message },
        }
    }

    /// True if retrying the same request later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Validation { .. } | SyncError::Domain(_))
    }

    /// True for a 404 answer
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Validation { status: 404, .. })
    }

    /// True if the rest of the push batch should be left for a later sync
    #[must_use]
    pub fn aborts_batch(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Offline(_))
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Storage(format!("{e:#}"))
    }
}

/// Extract a readable message from an error body (`{"error": "..."}` or text)
fn server_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = message.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        message
    }
}
