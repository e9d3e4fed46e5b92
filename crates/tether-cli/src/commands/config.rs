//! Config command - View and validate tether configuration
//!
//! Provides the `tether config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports every error

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use tether_core::config::Config;

use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        if config_path.exists() {
            formatter.success(&format!("Configuration ({})", config_path.display()));
        } else {
            formatter.success("Configuration (defaults, no file found)");
        }
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        println!();
        print!("{yaml}");
    }

    Ok(())
}

/// Outcome of validating one file
#[derive(Debug, PartialEq)]
enum Validation {
    Missing,
    Unparseable(String),
    Checked(Vec<String>),
}

fn validate_file(config_path: &Path) -> Validation {
    if !config_path.exists() {
        return Validation::Missing;
    }
    match Config::load(config_path) {
        Ok(config) => Validation::Checked(config.validate().iter().map(|e| e.to_string()).collect()),
        Err(e) => Validation::Unparseable(format!("{e:#}")),
    }
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let validation = validate_file(config_path);

    info!(config_path = %config_path.display(), "Validating configuration");

    if format.is_json() {
        let (valid, errors) = match &validation {
            Validation::Missing => (
                true,
                vec!["Configuration file not found. Using defaults.".to_string()],
            ),
            Validation::Unparseable(e) => (false, vec![format!("Failed to parse configuration: {e}")]),
            Validation::Checked(errors) => (errors.is_empty(), errors.clone()),
        };
        formatter.print_json(&serde_json::json!({
            "valid": valid,
            "config_path": config_path.display().to_string(),
            "errors": errors,
        }));
        return Ok(());
    }

    match validation {
        Validation::Missing => {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info("Using default configuration.");
        }
        Validation::Unparseable(e) => {
            formatter.error(&format!("Failed to parse configuration: {e}"));
            formatter.info(&format!("File: {}", config_path.display()));
        }
        Validation::Checked(errors) if errors.is_empty() => {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        }
        Validation::Checked(errors) => {
            formatter.error(&format!(
                "Configuration has {}:",
                plural(errors.len() as u64, "error")
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {error}"));
            }
        }
    }

    Ok(())
}
