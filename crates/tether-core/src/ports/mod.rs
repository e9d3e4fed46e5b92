//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ITransport`] - request/response exchange with the server
//! - [`ICredentialProvider`] - current bearer token, read per request
//! - [`IEntityStore`] - durable record snapshots with last-write-wins upserts
//! - [`IQueryCache`] - short-lived listing caches keyed by canonical query
//! - [`IOutboxStore`] - durable ordered queue of pending mutations
//! - [`ICursorStore`] - per-collection pull cursors
//! - [`IPushConnector`] - live server-to-client event feed
//! - [`IConnectivityProbe`] - server reachability check

pub mod connectivity_probe;
pub mod credentials;
pub mod cursor_store;
pub mod entity_store;
pub mod outbox_store;
pub mod push;
pub mod query_cache;
pub mod transport;

pub use connectivity_probe::IConnectivityProbe;
pub use credentials::{ICredentialProvider, StaticCredentials};
pub use cursor_store::ICursorStore;
pub use entity_store::{ApplyOutcome, IEntityStore};
pub use outbox_store::IOutboxStore;
pub use push::{IPushConnection, IPushConnector, PushEvent, PushEventKind};
pub use query_cache::IQueryCache;
pub use transport::{ITransport, Method, TransportError, TransportRequest, TransportResponse};
