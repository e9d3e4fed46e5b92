//! Sync context - the facade UI code talks to
//!
//! A [`SyncContext`] is created once at startup and passed explicitly to
//! whoever needs it; there is no global instance. It wires the record
//! repository, the orchestrator, the connectivity monitor and (optionally)
//! the push channel around one set of stores.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use tether_core::domain::{
    CollectionName, CollectionQuery, ConnectivityStatus, OutboxId, OutboxItem, Record, RecordId,
};
use tether_core::ports::{ICredentialProvider, IPushConnector, ITransport, PushEvent, PushEventKind};

use crate::api::RemoteRecords;
use crate::connectivity::ConnectivityMonitor;
use crate::observers::Subscription;
use crate::orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport, SyncSettings, SyncStores};
use crate::push_channel::PushChannel;
use crate::records::{RecordDraft, RecordRepository, RecordsPage, SaveOutcome};
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::SyncError;

/// Explicitly owned sync engine
pub struct SyncContext {
    stores: SyncStores,
    credentials: Arc<dyn ICredentialProvider>,
    connectivity: Arc<ConnectivityMonitor>,
    orchestrator: Arc<SyncOrchestrator>,
    records: RecordRepository,
    push: Option<PushChannel>,
}

impl SyncContext {
    pub fn new(
        transport: Arc<dyn ITransport>,
        credentials: Arc<dyn ICredentialProvider>,
        stores: SyncStores,
        settings: SyncSettings,
        initial: ConnectivityStatus,
    ) -> Self {
        let api = RemoteRecords::new(transport, Arc::clone(&credentials));
        let connectivity = Arc::new(ConnectivityMonitor::new(initial));
        let query_ttl = settings.query_ttl;

        let orchestrator = Arc::new(SyncOrchestrator::new(
            api.clone(),
            stores.clone(),
            Arc::clone(&connectivity),
            settings,
        ));
        let records = RecordRepository::new(
            api,
            stores.clone(),
            Arc::clone(&connectivity),
            query_ttl,
            orchestrator.item_rejected_observers().clone(),
        );

        Self {
            stores,
            credentials,
            connectivity,
            orchestrator,
            records,
            push: None,
        }
    }

    /// Attach a push channel built on `connector`
    pub fn with_push(mut self, connector: Arc<dyn IPushConnector>) -> Self {
        self.push = Some(PushChannel::new(
            connector,
            Arc::clone(&self.stores.entities),
            Arc::clone(&self.stores.query_cache),
        ));
        self
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn push_channel(&self) -> Option<&PushChannel> {
        self.push.as_ref()
    }

    // ------------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------------

    pub async fn get_records(&self, query: &CollectionQuery) -> Result<RecordsPage, SyncError> {
        self.records.get_records(query).await
    }

    pub async fn get_record(
        &self,
        collection: &CollectionName,
        id: &RecordId,
    ) -> Result<Option<Record>, SyncError> {
        self.records.get_record(collection, id).await
    }

    pub async fn save_record(&self, collection: &CollectionName, draft: RecordDraft) -> SaveOutcome {
        self.records.save_record(collection, draft).await
    }

    pub async fn delete_record(&self, collection: &CollectionName, id: &RecordId) -> SaveOutcome {
        self.records.delete_record(collection, id).await
    }

    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        self.records.pending_count().await
    }

    // ------------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------------

    pub async fn sync_now(&self) -> SyncOutcome {
        self.orchestrator.sync().await
    }

    /// Report a platform connectivity change; returns true on a transition
    ///
    /// A running [`SyncScheduler`] reacts to the transition to Online.
    pub fn set_connectivity(&self, status: ConnectivityStatus) -> bool {
        self.connectivity.set_status(status)
    }

    /// Build the background scheduler for this context
    pub fn scheduler(&self, poll_interval: Duration) -> (SyncScheduler, SchedulerHandle) {
        SyncScheduler::new(
            Arc::clone(&self.orchestrator),
            &self.connectivity,
            poll_interval,
        )
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub fn on_sync_completed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncReport) + Send + Sync + 'static,
    {
        self.orchestrator.on_completed(listener)
    }

    pub fn on_connectivity_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectivityStatus) + Send + Sync + 'static,
    {
        self.connectivity.subscribe(listener)
    }

    pub fn on_auth_required<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.orchestrator.on_auth_required(listener)
    }

    pub fn on_item_rejected<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&OutboxItem) + Send + Sync + 'static,
    {
        self.orchestrator.on_item_rejected(listener)
    }

    // ------------------------------------------------------------------------
    // Push channel
    // ------------------------------------------------------------------------

    /// Open the push feed with the current token
    pub async fn connect_push(&self) -> Result<(), SyncError> {
        let push = self.require_push()?;
        let token = self
            .credentials
            .current_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Offline("no credentials available".to_string()))?;
        push.connect(&token).await
    }

    pub async fn disconnect_push(&self) {
        if let Some(push) = &self.push {
            push.disconnect().await;
        }
    }

    pub fn on_push<F>(&self, kind: PushEventKind, handler: F) -> Result<Subscription, SyncError>
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        Ok(self.require_push()?.on(kind, handler))
    }

    fn require_push(&self) -> Result<&PushChannel, SyncError> {
        self.push
            .as_ref()
            .ok_or_else(|| SyncError::Offline("push channel not configured".to_string()))
    }

    // ------------------------------------------------------------------------
    // Outbox management
    // ------------------------------------------------------------------------

    /// Queued items in the order they will be sent
    pub async fn outbox_items(&self) -> Result<Vec<OutboxItem>, SyncError> {
        Ok(self.stores.outbox.peek_all().await?)
    }

    /// Drop a queued item without sending it
    pub async fn discard_item(&self, id: OutboxId) -> Result<bool, SyncError> {
        let removed = self.stores.outbox.remove(id).await?;
        if removed {
            info!(item = %id, "Outbox item discarded");
        }
        Ok(removed)
    }

    /// Make a rejected or backing-off item eligible on the next sync
    pub async fn retry_item(&self, id: OutboxId) -> Result<bool, SyncError> {
        let reset = self.stores.outbox.reset(id).await?;
        if reset {
            info!(item = %id, "Outbox item queued for retry");
        }
        Ok(reset)
    }
}
