//! Push channel
//!
//! Keeps a live connection to the server's event feed. Every `created` or
//! `updated` event is applied to the entity store under last-write-wins,
//! the collection's cached queries are invalidated, and listeners
//! registered with [`PushChannel::on`] are notified.
//!
//! The channel does not reconnect by itself: callers wait on
//! [`PushChannel::wait_disconnected`] and decide when to try again (the
//! `run` command reconnects with a delay and requests a sync, since the
//! feed has no backlog).

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::domain::CollectionQuery;
use tether_core::ports::{
    IEntityStore, IPushConnection, IPushConnector, IQueryCache, PushEvent, PushEventKind,
    TransportError,
};

use crate::observers::{Observers, Subscription};
use crate::SyncError;

/// State shared with the reader task
struct Shared {
    entities: Arc<dyn IEntityStore>,
    query_cache: Arc<dyn IQueryCache>,
    created: Observers<PushEvent>,
    updated: Observers<PushEvent>,
}

impl Shared {
    fn observers(&self, kind: PushEventKind) -> &Observers<PushEvent> {
        match kind {
            PushEventKind::Created => &self.created,
            PushEventKind::Updated => &self.updated,
        }
    }

    async fn handle_event(&self, event: &PushEvent) -> anyhow::Result<()> {
        let outcome = self.entities.apply(&event.collection, &event.record).await?;
        if outcome.changed() {
            self.query_cache
                .invalidate(&CollectionQuery::cache_prefix(&event.collection))
                .await?;
        }
        debug!(
            kind = %event.kind,
            collection = %event.collection,
            id = %event.record.id,
            outcome = ?outcome,
            "Push event applied"
        );
        self.observers(event.kind).notify(event);
        Ok(())
    }
}

struct Session {
    cancel: CancellationToken,
    ended: CancellationToken,
    task: JoinHandle<()>,
}

/// Live event feed feeding the local cache
pub struct PushChannel {
    connector: Arc<dyn IPushConnector>,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl PushChannel {
    pub fn new(
        connector: Arc<dyn IPushConnector>,
        entities: Arc<dyn IEntityStore>,
        query_cache: Arc<dyn IQueryCache>,
    ) -> Self {
        Self {
            connector,
            shared: Arc::new(Shared {
                entities,
                query_cache,
                created: Observers::new(),
                updated: Observers::new(),
            }),
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: PushEventKind, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.shared.observers(kind).subscribe(handler)
    }

    /// True while the reader task is running
    pub fn is_connected(&self) -> bool {
        self.session()
            .as_ref()
            .is_some_and(|s| !s.ended.is_cancelled())
    }

    /// Open the feed, replacing any previous connection
    pub async fn connect(&self, token: &str) -> Result<(), SyncError> {
        if token.is_empty() {
            return Err(SyncError::Offline("no credentials available".to_string()));
        }
        self.disconnect().await;

        let connection = self
            .connector
            .connect(token)
            .await
            .map_err(|e| SyncError::Transport(TransportError::Connect(format!("{e:#}"))))?;

        let cancel = CancellationToken::new();
        let ended = CancellationToken::new();
        let task = tokio::spawn(read_loop(
            connection,
            Arc::clone(&self.shared),
            cancel.clone(),
            ended.clone(),
        ));

        info!("Push channel connected");
        *self.session() = Some(Session {
            cancel,
            ended,
            task,
        });
        Ok(())
    }

    /// Close the feed; a no-op when not connected
    pub async fn disconnect(&self) {
        let session = self.session().take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(err) = session.task.await {
                warn!(error = %err, "Push reader task failed");
            }
            info!("Push channel disconnected");
        }
    }

    /// Resolves once the current connection ended (immediately if none)
    pub async fn wait_disconnected(&self) {
        let ended = self.session().as_ref().map(|s| s.ended.clone());
        if let Some(ended) = ended {
            ended.cancelled().await;
        }
    }

    /// Apply one event as if it arrived on the feed
    pub async fn handle_event(&self, event: &PushEvent) -> Result<(), SyncError> {
        self.shared.handle_event(event).await?;
        Ok(())
    }
}

async fn read_loop(
    mut connection: Box<dyn IPushConnection>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    ended: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(err) = connection.close().await {
                    debug!(error = %err, "Error closing push connection");
                }
                break;
            }
            next = connection.next_event() => match next {
                Ok(Some(event)) => {
                    if let Err(err) = shared.handle_event(&event).await {
                        warn!(error = %err, id = %event.record.id, "Failed to apply push event");
                    }
                }
                Ok(None) => {
                    info!("Push feed closed by server");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Push connection failed");
                    break;
                }
            }
        }
    }
    ended.cancel();
}
