//! Configuration module for tether.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::CollectionName;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for tether.
///
/// Every section falls back to its defaults when omitted from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub connectivity: ConnectivityConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the REST API, e.g. `https://api.example.com`.
    pub base_url: String,
    /// WebSocket URL of the push channel.
    pub push_url: String,
    /// Timeout applied to every outbound request, in seconds.
    pub request_timeout_secs: u64,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Collections pulled on every sync round.
    pub collections: Vec<String>,
    /// Records requested per page during pulls and listings.
    pub page_size: u32,
    /// Seconds between periodic background sync rounds.
    pub poll_interval: u64,
}

/// Local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite database file.
    pub database: PathBuf,
    /// Seconds a single-record snapshot stays fresh.
    pub entity_ttl_secs: u64,
    /// Seconds a listing/query result stays fresh.
    pub query_ttl_secs: u64,
}

/// Outbox retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// `immediate` (retry every pending item on every sync) or `exponential`.
    pub strategy: String,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

/// Connectivity monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Seconds between reachability probes.
    pub probe_interval_secs: u64,
    /// Path probed on the server (relative to `server.base_url`).
    pub probe_path: String,
}

/// Credential lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File holding the current bearer token; re-read on every request.
    pub token_file: Option<PathBuf>,
    /// Environment variable consulted when no token file is configured.
    pub token_env: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tether/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tether")
            .join("config.yaml")
    }

    /// Tracked collections as validated names; invalid entries are skipped
    /// (they are reported by [`Config::validate`]).
    pub fn collections(&self) -> Vec<CollectionName> {
        self.sync
            .collections
            .iter()
            .filter_map(|name| CollectionName::new(name.clone()).ok())
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.entity_ttl_secs)
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.query_ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            push_url: "ws://localhost:3000/ws".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collections: vec!["records".to_string()],
            page_size: 50,
            poll_interval: 900,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("tether");
        Self {
            database: data_dir.join("tether.db"),
            entity_ttl_secs: 30 * 60,
            query_ttl_secs: 5 * 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: "immediate".to_string(),
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 15,
            probe_path: "/health".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: None,
            token_env: "TETHER_TOKEN".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `retry.strategy`.
const VALID_RETRY_STRATEGIES: &[&str] = &["immediate", "exponential"];

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.starts_with(&format!("{scheme}://")))
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- server ---
        if !has_scheme(&self.server.base_url, &["http", "https"]) {
            errors.push(ValidationError {
                field: "server.base_url".into(),
                message: format!("must be an http(s) URL: '{}'", self.server.base_url),
            });
        }
        if !has_scheme(&self.server.push_url, &["ws", "wss"]) {
            errors.push(ValidationError {
                field: "server.push_url".into(),
                message: format!("must be a ws(s) URL: '{}'", self.server.push_url),
            });
        }
        if self.server.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "server.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- sync ---
        if self.sync.collections.is_empty() {
            errors.push(ValidationError {
                field: "sync.collections".into(),
                message: "at least one collection is required".into(),
            });
        }
        for name in &self.sync.collections {
            if let Err(e) = CollectionName::new(name.clone()) {
                errors.push(ValidationError {
                    field: "sync.collections".into(),
                    message: e.to_string(),
                });
            }
        }
        if self.sync.page_size == 0 || self.sync.page_size > crate::domain::query::MAX_PAGE_SIZE
        {
            errors.push(ValidationError {
                field: "sync.page_size".into(),
                message: format!(
                    "must be in range 1..={}",
                    crate::domain::query::MAX_PAGE_SIZE
                ),
            });
        }
        if self.sync.poll_interval == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- cache ---
        if self.cache.entity_ttl_secs == 0 {
            errors.push(ValidationError {
                field: "cache.entity_ttl_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.cache.query_ttl_secs == 0 {
            errors.push(ValidationError {
                field: "cache.query_ttl_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- retry ---
        if !VALID_RETRY_STRATEGIES.contains(&self.retry.strategy.as_str()) {
            errors.push(ValidationError {
                field: "retry.strategy".into(),
                message: format!(
                    "invalid strategy '{}'; valid options: {}",
                    self.retry.strategy,
                    VALID_RETRY_STRATEGIES.join(", ")
                ),
            });
        }
        if self.retry.strategy == "exponential" {
            if self.retry.base_delay_ms == 0 {
                errors.push(ValidationError {
                    field: "retry.base_delay_ms".into(),
                    message: "must be greater than 0".into(),
                });
            }
            if self.retry.max_delay_ms < self.retry.base_delay_ms {
                errors.push(ValidationError {
                    field: "retry.max_delay_ms".into(),
                    message: format!(
                        "max_delay_ms ({}) must not be below base_delay_ms ({})",
                        self.retry.max_delay_ms, self.retry.base_delay_ms
                    ),
                });
            }
        }

        // --- connectivity ---
        if self.connectivity.probe_interval_secs == 0 {
            errors.push(ValidationError {
                field: "connectivity.probe_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !self.connectivity.probe_path.starts_with('/') {
            errors.push(ValidationError {
                field: "connectivity.probe_path".into(),
                message: "must start with '/'".into(),
            });
        }

        // --- auth ---
        if self.auth.token_file.is_none() && self.auth.token_env.is_empty() {
            errors.push(ValidationError {
                field: "auth.token_env".into(),
                message: "required when auth.token_file is not set".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use tether_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .server_base_url("https://api.example.com")
///     .sync_collections(vec!["flowers".into()])
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- server ---

    pub fn server_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.base_url = url.into();
        self
    }

    pub fn server_push_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.push_url = url.into();
        self
    }

    pub fn server_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.server.request_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_collections(mut self, collections: Vec<String>) -> Self {
        self.config.sync.collections = collections;
        self
    }

    pub fn sync_page_size(mut self, size: u32) -> Self {
        self.config.sync.page_size = size;
        self
    }

    pub fn sync_poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    // --- cache ---

    pub fn cache_database(mut self, path: PathBuf) -> Self {
        self.config.cache.database = path;
        self
    }

    pub fn cache_entity_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.cache.entity_ttl_secs = seconds;
        self
    }

    pub fn cache_query_ttl_secs(mut self, seconds: u64) -> Self {
        self.config.cache.query_ttl_secs = seconds;
        self
    }

    // --- retry ---

    pub fn retry_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.config.retry.strategy = strategy.into();
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms;
        self
    }

    // --- connectivity ---

    pub fn connectivity_probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_interval_secs = seconds;
        self
    }

    pub fn connectivity_probe_path(mut self, path: impl Into<String>) -> Self {
        self.config.connectivity.probe_path = path.into();
        self
    }

    // --- auth ---

    pub fn auth_token_file(mut self, path: PathBuf) -> Self {
        self.config.auth.token_file = Some(path);
        self
    }

    pub fn auth_token_env(mut self, var: impl Into<String>) -> Self {
        self.config.auth.token_env = var.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
