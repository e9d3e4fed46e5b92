//! Wiring shared by every command that touches local state
//!
//! Opens the database, builds the HTTP adapters from configuration and
//! assembles a [`SyncContext`]. The context starts Offline; commands that
//! talk to the server call [`Engine::probe`] first.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use tether_cache::{
    DatabasePool, SqliteCursorStore, SqliteEntityStore, SqliteOutboxStore, SqliteQueryCache,
};
use tether_core::config::Config;
use tether_core::domain::ConnectivityStatus;
use tether_core::ports::IConnectivityProbe;
use tether_http::{HttpReachabilityProbe, HttpTransport, WebSocketPushConnector};
use tether_sync::{SyncContext, SyncSettings, SyncStores};

use crate::credentials::TokenFileCredentials;

/// Load the config file, or defaults when it does not exist
///
/// A file that exists but does not parse is an error rather than a silent
/// fallback.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(config_path = %path.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(config_path = %path.display(), "Loaded configuration");
    Ok(config)
}

pub struct Engine {
    pub config: Config,
    pub stores: SyncStores,
    pub credentials: Arc<TokenFileCredentials>,
    pub context: SyncContext,
    probe: Arc<dyn IConnectivityProbe>,
    pool: DatabasePool,
}

impl Engine {
    /// Open local state and build the sync context for `config`
    pub async fn open(config: Config) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Invalid configuration: {}", messages.join("; "));
        }

        let pool = DatabasePool::new(&config.cache.database)
            .await
            .context("Failed to open database")?;
        let db = pool.pool().clone();
        let stores = SyncStores {
            entities: Arc::new(SqliteEntityStore::new(db.clone(), config.entity_ttl())),
            query_cache: Arc::new(SqliteQueryCache::new(db.clone())),
            outbox: Arc::new(SqliteOutboxStore::new(db.clone())),
            cursors: Arc::new(SqliteCursorStore::new(db)),
        };

        let timeout = config.request_timeout();
        let transport = HttpTransport::new(&config.server.base_url, timeout)
            .context("Failed to create HTTP transport")?;
        let probe = HttpReachabilityProbe::new(
            &config.server.base_url,
            &config.connectivity.probe_path,
            timeout,
        )
        .context("Failed to create reachability probe")?;
        let push = WebSocketPushConnector::new(&config.server.push_url, timeout)
            .context("Failed to create push connector")?;
        let credentials = Arc::new(TokenFileCredentials::from_config(&config.auth));

        let context = SyncContext::new(
            Arc::new(transport),
            credentials.clone(),
            stores.clone(),
            SyncSettings::from_config(&config),
            ConnectivityStatus::Offline,
        )
        .with_push(Arc::new(push));

        debug!(
            base_url = %config.server.base_url,
            collections = config.sync.collections.len(),
            "Sync engine ready"
        );

        Ok(Self {
            config,
            stores,
            credentials,
            context,
            probe: Arc::new(probe),
            pool,
        })
    }

    /// Probe the server once and feed the result to the connectivity monitor
    pub async fn probe(&self) -> ConnectivityStatus {
        let status = self.probe.probe().await;
        self.context.set_connectivity(status);
        status
    }

    pub fn probe_handle(&self) -> Arc<dyn IConnectivityProbe> {
        Arc::clone(&self.probe)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
