//! CLI subcommands

pub mod config;
pub mod outbox;
pub mod records;
pub mod run;
pub mod status;
pub mod sync;
