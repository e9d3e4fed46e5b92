//! Records command - Read and write records through the offline-first API
//!
//! Provides the `tether records` CLI command with subcommands:
//! - `list`: one page of a collection (cache first, server when stale)
//! - `get`: a single record
//! - `save`: create or update a record; queued when the server is unreachable
//! - `delete`: delete a record; queued when the server is unreachable
//!
//! Every subcommand probes the server first unless `--offline` is given,
//! in which case only local state is used and writes go to the outbox.

use std::path::Path;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde_json::{Map, Value};

use tether_core::domain::{CollectionName, CollectionQuery, Record, RecordId};
use tether_sync::{PageSource, RecordDraft, SaveOutcome};

use crate::engine::{load_config, Engine};
use crate::output::{format_timestamp, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum RecordsCommand {
    /// List one page of a collection
    List {
        #[command(flatten)]
        target: Target,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Records per page (defaults to `sync.page_size`)
        #[arg(long)]
        page_size: Option<u32>,
        /// Case-insensitive text search
        #[arg(long)]
        search: Option<String>,
        /// Exact field match, e.g. `--filter color=red` (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Show one record
    Get {
        #[command(flatten)]
        target: Target,
        id: String,
    },
    /// Create a record, or update one with `--id`
    Save {
        #[command(flatten)]
        target: Target,
        /// Existing record id; omit to create
        #[arg(long)]
        id: Option<String>,
        /// Owning user id
        #[arg(long)]
        owner: Option<String>,
        /// Field assignment, e.g. `--field name=Rose --field petals=5` (repeatable)
        #[arg(long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, Value)>,
    },
    /// Delete a record
    Delete {
        #[command(flatten)]
        target: Target,
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct Target {
    /// Collection name
    pub collection: String,
    /// Use local state only; writes are queued
    #[arg(long)]
    pub offline: bool,
}

impl Target {
    fn collection(&self) -> Result<CollectionName> {
        Ok(CollectionName::new(self.collection.clone())?)
    }
}

/// `key=value` with the value kept as text
fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// `key=value` where the value is JSON when it parses as JSON, text otherwise
fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = parse_filter(raw)?;
    let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
    Ok((key, value))
}

fn parse_id(raw: &str) -> Result<RecordId> {
    Ok(RecordId::new(raw.to_string())?)
}

impl RecordsCommand {
    fn target(&self) -> &Target {
        match self {
            RecordsCommand::List { target, .. }
            | RecordsCommand::Get { target, .. }
            | RecordsCommand::Save { target, .. }
            | RecordsCommand::Delete { target, .. } => target,
        }
    }

    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let engine = Engine::open(load_config(config_path)?).await?;
        if !self.target().offline {
            engine.probe().await;
        }
        let result = self.run(&engine, format).await;
        engine.close().await;
        result
    }

    async fn run(&self, engine: &Engine, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let collection = self.target().collection()?;

        match self {
            RecordsCommand::List {
                page,
                page_size,
                search,
                filters,
                ..
            } => {
                let mut query = CollectionQuery::new(
                    collection,
                    page_size.unwrap_or(engine.config.sync.page_size),
                )
                .page(*page);
                if let Some(text) = search {
                    query = query.search(text.clone());
                }
                for (field, value) in filters {
                    query = query.filter(field.clone(), value.clone());
                }

                let result = engine.context.get_records(&query).await?;
                if format.is_json() {
                    formatter.print_json(&serde_json::to_value(&result)?);
                } else {
                    formatter.success(&format!(
                        "{} on page {} (from {})",
                        plural(result.records.len() as u64, "record"),
                        page,
                        source_label(result.source)
                    ));
                    for record in &result.records {
                        formatter.info(&describe(record));
                    }
                    if result.has_more {
                        formatter.info(&format!("More on page {}", page + 1));
                    }
                }
            }
            RecordsCommand::Get { id, .. } => {
                let id = parse_id(id)?;
                match engine.context.get_record(&collection, &id).await? {
                    Some(record) if format.is_json() => {
                        formatter.print_json(&serde_json::to_value(&record)?)
                    }
                    Some(record) => {
                        formatter.success(&describe(&record));
                        formatter.info(&serde_json::to_string_pretty(&record.fields)?);
                    }
                    None => formatter.error(&format!("No record {id} in {collection}")),
                }
            }
            RecordsCommand::Save {
                id, owner, fields, ..
            } => {
                let fields: Map<String, Value> = fields.iter().cloned().collect();
                let mut draft = match id {
                    Some(id) => RecordDraft::existing(parse_id(id)?, fields),
                    None => RecordDraft::new(fields),
                };
                if let Some(owner) = owner {
                    draft = draft.owner(owner.clone());
                }
                let outcome = engine.context.save_record(&collection, draft).await;
                report_outcome(&outcome, "Saved", &*formatter, format)?;
            }
            RecordsCommand::Delete { id, .. } => {
                let id = parse_id(id)?;
                let outcome = engine.context.delete_record(&collection, &id).await;
                report_outcome(&outcome, "Deleted", &*formatter, format)?;
            }
        }
        Ok(())
    }
}

fn source_label(source: PageSource) -> &'static str {
    match source {
        PageSource::Cache => "cache",
        PageSource::Remote => "server",
        PageSource::Stale => "stale cache",
        PageSource::Local => "local store",
    }
}

fn describe(record: &Record) -> String {
    let label = record
        .fields
        .get("name")
        .or_else(|| record.fields.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let suffix = if record.id.is_local() { " (not yet synced)" } else { "" };
    format!(
        "{:<38} {:<24} updated {}{}",
        record.id,
        label,
        format_timestamp(record.updated_at),
        suffix
    )
}

fn report_outcome(
    outcome: &SaveOutcome,
    verb: &str,
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
) -> Result<()> {
    if format.is_json() {
        let json = match outcome {
            SaveOutcome::Saved(record) => serde_json::json!({
                "outcome": "saved",
                "record": record,
            }),
            SaveOutcome::Queued(item) => serde_json::json!({
                "outcome": "queued",
                "item": item,
            }),
            SaveOutcome::Failed(err) => serde_json::json!({
                "outcome": "failed",
                "error": err.to_string(),
            }),
        };
        formatter.print_json(&json);
        return Ok(());
    }

    match outcome {
        SaveOutcome::Saved(record) => formatter.success(&format!("{verb} {}", record.id)),
        SaveOutcome::Queued(item) => {
            let target = item
                .target_record_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default();
            if item.rejected {
                formatter.warn(&format!(
                    "{target} was rejected by the server and kept as outbox item {}",
                    item.id
                ));
            } else {
                formatter.success(&format!(
                    "{verb} {target} locally; queued as outbox item {}",
                    item.id
                ));
            }
            if let Some(err) = &item.last_error {
                formatter.info(&format!("Server said: {err}"));
            }
        }
        SaveOutcome::Failed(err) => {
            return Err(anyhow!("{verb} failed: {err}"));
        }
    }
    Ok(())
}
