//! Sync command - Run one sync round against the server
//!
//! Provides the `tether sync` CLI command which:
//! 1. Opens local state and probes the server
//! 2. Optionally resets pull cursors (`--full`)
//! 3. Runs one pull/push round and prints its report

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tether_sync::{SyncOutcome, SyncReport};

use crate::engine::{load_config, Engine};
use crate::output::{format_duration_ms, get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Pull every collection from the beginning instead of from its cursor
    #[arg(long)]
    pub full: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let engine = Engine::open(load_config(config_path)?).await?;

        if self.full {
            for collection in &engine.config.collections() {
                engine
                    .stores
                    .cursors
                    .reset(collection)
                    .await
                    .with_context(|| format!("Failed to reset cursor for {collection}"))?;
            }
            info!("Pull cursors reset for a full sync");
            formatter.info("Full sync requested, cursors reset");
        }

        let status = engine.probe().await;
        info!(status = %status, "Connectivity before sync");

        let outcome = engine.context.sync_now().await;
        let pending = engine.context.pending_count().await?;

        match outcome {
            SyncOutcome::Completed(report) => {
                if format.is_json() {
                    let json = serde_json::json!({
                        "outcome": "completed",
                        "report": report,
                        "pending": pending,
                    });
                    formatter.print_json(&json);
                } else {
                    let headline = headline(&report);
                    if report.errors.is_empty() {
                        formatter.success(&headline);
                    } else {
                        formatter.warn(&headline);
                    }
                    for line in report_lines(&report, pending) {
                        formatter.info(&line);
                    }
                    if report.auth_required {
                        formatter.error(&format!(
                            "The server refused the token from {}",
                            engine.credentials.source()
                        ));
                    }
                }
            }
            SyncOutcome::SkippedOffline => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "outcome": "offline",
                        "pending": pending,
                    }));
                } else {
                    formatter.warn(&format!(
                        "Server {} is unreachable; nothing was synced",
                        engine.config.server.base_url
                    ));
                    formatter.info(&format!("{} waiting", plural(pending, "change")));
                }
            }
            SyncOutcome::AlreadyRunning => {
                formatter.warn("Another sync round is already running");
            }
        }

        engine.close().await;
        Ok(())
    }
}

fn headline(report: &SyncReport) -> String {
    let duration = format_duration_ms(report.duration_ms);
    if report.pulled == 0 && report.pushed == 0 && report.errors.is_empty() {
        format!("Already up to date ({duration})")
    } else if report.errors.is_empty() {
        format!("Sync completed in {duration}")
    } else {
        format!(
            "Sync completed in {duration} with {}",
            plural(report.errors.len() as u64, "error")
        )
    }
}

/// Human-readable breakdown of a report; zero counters are left out
fn report_lines(report: &SyncReport, pending: u64) -> Vec<String> {
    let mut lines = Vec::new();
    if report.pulled > 0 {
        lines.push(format!(
            "Pulled:   {} ({} applied, {} stale, {} deleted)",
            plural(report.pulled, "record"),
            report.applied,
            report.skipped_stale,
            report.deleted
        ));
    }
    if report.pushed > 0 {
        lines.push(format!("Pushed:   {}", plural(report.pushed, "change")));
    }
    if report.failed > 0 {
        lines.push(format!("Failed:   {} (will retry)", report.failed));
    }
    if report.rejected > 0 {
        lines.push(format!(
            "Rejected: {} (see 'tether outbox list')",
            report.rejected
        ));
    }
    if report.deferred > 0 {
        lines.push(format!("Deferred: {}", report.deferred));
    }
    if report.aborted {
        lines.push("Push stopped early; remaining changes stay queued".to_string());
    }
    for err in &report.errors {
        lines.push(format!("  - {err}"));
    }
    if pending > 0 {
        lines.push(format!("{} still pending", plural(pending, "change")));
    }
    lines
}
