//! Integration tests for tether-sync
//!
//! Runs the engine against in-memory SQLite stores and a scripted fake
//! server, covering pull, push, the record repository, the push channel and
//! the scheduler.

mod common;

mod test_pull;
mod test_push_channel;
mod test_records;
