//! Tether Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core of the sync engine:
//! - **Domain types** - `Record`, `OutboxItem`, `SyncCursor`, `CacheEntry`, `CollectionQuery`
//! - **Port definitions** - Traits for adapters: `ITransport`, `ICredentialProvider`,
//!   `IEntityStore`, `IQueryCache`, `IOutboxStore`, `ICursorStore`, `IPushConnector`,
//!   `IConnectivityProbe`
//! - **Configuration** - YAML-backed settings shared by every binary
//!
//! # Architecture
//!
//! The domain module holds pure data types and their invariants with no I/O.
//! Ports define the trait interfaces that adapter crates (`tether-cache`,
//! `tether-http`) implement and that `tether-sync` orchestrates.

pub mod config;
pub mod domain;
pub mod ports;
