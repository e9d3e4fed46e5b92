//! Outbox command - Inspect and manage queued changes
//!
//! Provides the `tether outbox` CLI command with subcommands:
//! - `list`: show queued changes in the order they will be sent
//! - `discard <id>`: drop a change without sending it
//! - `retry <id>`: clear the backoff or rejection of a change

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use tether_core::domain::{OutboxId, OutboxItem};

use crate::engine::{load_config, Engine};
use crate::output::{format_timestamp, get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum OutboxCommand {
    /// List queued changes
    List,
    /// Drop a queued change without sending it
    Discard {
        /// Outbox item id (from `tether outbox list`)
        id: i64,
    },
    /// Make a rejected or backing-off change eligible on the next sync
    Retry {
        /// Outbox item id (from `tether outbox list`)
        id: i64,
    },
}

impl OutboxCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let engine = Engine::open(load_config(config_path)?).await?;
        let result = match self {
            OutboxCommand::List => self.execute_list(&engine, format).await,
            OutboxCommand::Discard { id } => {
                let found = engine.context.discard_item(OutboxId::new(*id)).await?;
                report_action("discarded", *id, found, format);
                Ok(())
            }
            OutboxCommand::Retry { id } => {
                let found = engine.context.retry_item(OutboxId::new(*id)).await?;
                report_action("queued for retry", *id, found, format);
                Ok(())
            }
        };
        engine.close().await;
        result
    }

    async fn execute_list(&self, engine: &Engine, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let items = engine.context.outbox_items().await?;
        info!(count = items.len(), "Listing outbox");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "items": items }));
            return Ok(());
        }

        if items.is_empty() {
            formatter.success("Outbox is empty");
            return Ok(());
        }

        formatter.success(&format!("{} queued", plural(items.len() as u64, "change")));
        for item in &items {
            formatter.info(&describe(item));
            if let Some(err) = &item.last_error {
                formatter.info(&format!("      last error: {err}"));
            }
        }
        Ok(())
    }
}

fn report_action(action: &str, id: i64, found: bool, format: OutputFormat) {
    let formatter = get_formatter(format);
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "id": id,
            "success": found,
        }));
    } else if found {
        formatter.success(&format!("Outbox item {id} {action}"));
    } else {
        formatter.error(&format!("No outbox item with id {id}"));
    }
}

/// One summary line per item
fn describe(item: &OutboxItem) -> String {
    let target = item
        .target_record_id
        .as_ref()
        .map(|id| id.as_str())
        .unwrap_or("-");
    let state = if item.rejected {
        "rejected".to_string()
    } else if item.retry_count > 0 {
        format!("{} failed", plural(u64::from(item.retry_count), "attempt"))
    } else {
        "waiting".to_string()
    };
    format!(
        "[{}] {} {}/{} queued {} ({})",
        item.id,
        item.op_type,
        item.collection,
        target,
        format_timestamp(item.enqueued_at),
        state
    )
}
