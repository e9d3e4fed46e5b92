//! Status command - Display local sync state
//!
//! Provides the `tether status` CLI command which shows:
//! 1. Server reachability and whether a token is available
//! 2. Pending outbox changes, including rejected ones
//! 3. Cached record count and the pull cursor of each collection

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use tether_core::domain::{CollectionName, SyncCursor};
use tether_core::ports::ICredentialProvider;

use crate::engine::{load_config, Engine};
use crate::output::{format_timestamp, get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Skip the reachability probe
    #[arg(long)]
    pub no_probe: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let engine = Engine::open(load_config(config_path)?).await?;

        let connectivity = if self.no_probe {
            None
        } else {
            Some(engine.probe().await)
        };
        let has_token = engine.credentials.current_token().is_some();

        let items = engine.context.outbox_items().await?;
        let rejected = items.iter().filter(|i| i.rejected).count() as u64;
        let records = engine
            .stores
            .entities
            .count()
            .await
            .context("Failed to count cached records")?;
        let stored = engine
            .stores
            .cursors
            .list()
            .await
            .context("Failed to read sync cursors")?;
        let cursors = tracked_cursors(&engine.config.collections(), &stored);

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "server": engine.config.server.base_url,
                "connectivity": connectivity,
                "token": has_token,
                "pending": items.len(),
                "rejected": rejected,
                "cached_records": records,
                "cursors": cursors,
            }));
        } else {
            formatter.success(&format!("Server: {}", engine.config.server.base_url));
            match connectivity {
                Some(status) => formatter.info(&format!("Connectivity: {status}")),
                None => formatter.info("Connectivity: not probed"),
            }
            if has_token {
                formatter.info(&format!("Token: present ({})", engine.credentials.source()));
            } else {
                formatter.warn(&format!(
                    "No token available from {}",
                    engine.credentials.source()
                ));
            }

            formatter.info("");
            formatter.info(&format!(
                "Pending: {}",
                plural(items.len() as u64, "change")
            ));
            if rejected > 0 {
                formatter.warn(&format!(
                    "{} rejected by the server; see 'tether outbox list'",
                    plural(rejected, "change")
                ));
            }
            formatter.info(&format!("Cached:  {}", plural(records, "record")));

            formatter.info("");
            formatter.info("Last pulled:");
            for cursor in &cursors {
                formatter.info(&format!(
                    "  {:<20} {}",
                    cursor.collection,
                    format_timestamp(cursor.last_sync_at)
                ));
            }
        }

        engine.close().await;
        Ok(())
    }
}

/// One cursor per configured collection; collections never pulled show the
/// epoch
fn tracked_cursors(collections: &[CollectionName], stored: &[SyncCursor]) -> Vec<SyncCursor> {
    collections
        .iter()
        .map(|collection| {
            stored
                .iter()
                .find(|c| &c.collection == collection)
                .cloned()
                .unwrap_or_else(|| SyncCursor::initial(collection.clone()))
        })
        .collect()
}
