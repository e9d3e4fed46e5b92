//! Push channel: live events feeding the cache

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use tether_core::domain::{CollectionQuery, Record};
use tether_core::ports::{
    IEntityStore, IPushConnection, IPushConnector, IQueryCache, PushEvent, PushEventKind,
};
use tether_sync::SyncError;

use crate::common::*;

// ============================================================================
// Channel-backed connector
// ============================================================================

/// `None` on the channel simulates the server closing the feed
type Feed = mpsc::UnboundedSender<Option<PushEvent>>;

struct ChannelConnector {
    pending: Mutex<Option<mpsc::UnboundedReceiver<Option<PushEvent>>>>,
    tokens: Mutex<Vec<String>>,
}

struct ChannelConnection {
    rx: mpsc::UnboundedReceiver<Option<PushEvent>>,
}

#[async_trait::async_trait]
impl IPushConnector for ChannelConnector {
    async fn connect(&self, token: &str) -> anyhow::Result<Box<dyn IPushConnection>> {
        self.tokens.lock().unwrap().push(token.to_string());
        let rx = self
            .pending
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("connection refused"))?;
        Ok(Box::new(ChannelConnection { rx }))
    }
}

#[async_trait::async_trait]
impl IPushConnection for ChannelConnection {
    async fn next_event(&mut self) -> anyhow::Result<Option<PushEvent>> {
        Ok(self.rx.recv().await.flatten())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.rx.close();
        Ok(())
    }
}

async fn push_harness() -> (Harness, Feed, Arc<ChannelConnector>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ChannelConnector {
        pending: Mutex::new(Some(rx)),
        tokens: Mutex::new(Vec::new()),
    });
    let h = harness_with(HarnessOptions {
        push: Some(connector.clone()),
        ..HarnessOptions::default()
    })
    .await;
    (h, tx, connector)
}

fn event(kind: PushEventKind, record: Record) -> PushEvent {
    PushEvent {
        kind,
        collection: flowers(),
        record,
    }
}

/// Listener that forwards every event id to a channel the test can await
fn forward(h: &Harness, kind: PushEventKind) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _sub = h
        .ctx
        .on_push(kind, move |e| {
            let _ = tx.send(e.record.id.as_str().to_string());
        })
        .unwrap();
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("push event not delivered")
        .expect("listener dropped")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn update_event_upserts_record_and_invalidates_queries() {
    let (h, feed, connector) = push_harness().await;
    h.server.seed("flowers", record("a", 10, "Rose"));
    let query = CollectionQuery::new(flowers(), 10);
    h.ctx.get_records(&query).await.unwrap();
    assert!(h.stores.query_cache.get(&query.cache_key()).await.unwrap().is_fresh());

    let mut updates = forward(&h, PushEventKind::Updated);
    h.ctx.connect_push().await.unwrap();
    assert_eq!(*connector.tokens.lock().unwrap(), vec!["test-token".to_string()]);

    feed.send(Some(event(PushEventKind::Updated, record("a", 20, "Rose v2"))))
        .unwrap();
    assert_eq!(next(&mut updates).await, "a");

    let a = h.stores.entities.get(&id("a")).await.unwrap().any().unwrap();
    assert_eq!(a.fields["name"], "Rose v2");
    assert!(!h.stores.query_cache.get(&query.cache_key()).await.unwrap().is_fresh());

    h.ctx.disconnect_push().await;
}

#[tokio::test]
async fn older_event_does_not_overwrite_newer_local_copy() {
    let (h, feed, _) = push_harness().await;
    h.stores
        .entities
        .apply(&flowers(), &record("a", 50, "Local"))
        .await
        .unwrap();

    let mut updates = forward(&h, PushEventKind::Updated);
    h.ctx.connect_push().await.unwrap();
    feed.send(Some(event(PushEventKind::Updated, record("a", 40, "Old"))))
        .unwrap();
    next(&mut updates).await;

    let a = h.stores.entities.get(&id("a")).await.unwrap().any().unwrap();
    assert_eq!(a.fields["name"], "Local");
}

#[tokio::test]
async fn unsubscribed_handler_stops_receiving() {
    let (h, feed, _) = push_harness().await;
    let removed = Arc::new(AtomicUsize::new(0));
    let counter = removed.clone();
    let sub = h
        .ctx
        .on_push(PushEventKind::Created, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let mut created = forward(&h, PushEventKind::Created);

    h.ctx.connect_push().await.unwrap();
    feed.send(Some(event(PushEventKind::Created, record("a", 1, "A"))))
        .unwrap();
    next(&mut created).await;

    sub.unsubscribe();
    feed.send(Some(event(PushEventKind::Created, record("b", 1, "B"))))
        .unwrap();
    assert_eq!(next(&mut created).await, "b");
    assert_eq!(removed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_only_reach_listeners_of_their_kind() {
    let (h, feed, _) = push_harness().await;
    let mut created = forward(&h, PushEventKind::Created);
    let mut updated = forward(&h, PushEventKind::Updated);

    h.ctx.connect_push().await.unwrap();
    feed.send(Some(event(PushEventKind::Updated, record("u", 1, "U"))))
        .unwrap();
    feed.send(Some(event(PushEventKind::Created, record("c", 1, "C"))))
        .unwrap();

    assert_eq!(next(&mut updated).await, "u");
    assert_eq!(next(&mut created).await, "c");
    assert!(created.try_recv().is_err());
    assert!(updated.try_recv().is_err());
}

#[tokio::test]
async fn connect_requires_a_token() {
    let (h, _feed, connector) = push_harness().await;
    h.credentials.set_token(None);

    let err = h.ctx.connect_push().await.unwrap_err();
    assert!(matches!(err, SyncError::Offline(_)));
    assert!(connector.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn connector_failure_is_a_transport_error() {
    let (h, _feed, _) = push_harness().await;
    h.ctx.connect_push().await.unwrap();
    h.ctx.disconnect_push().await;

    // The fake connector only hands out one connection.
    let err = h.ctx.connect_push().await.unwrap_err();
    assert!(err.aborts_batch());
}

#[tokio::test]
async fn server_close_ends_the_session() {
    let (h, feed, _) = push_harness().await;
    h.ctx.connect_push().await.unwrap();
    let channel = h.ctx.push_channel().unwrap();
    assert!(channel.is_connected());

    feed.send(None).unwrap();
    tokio::time::timeout(Duration::from_secs(5), channel.wait_disconnected())
        .await
        .expect("session did not end");
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn disconnect_stops_the_reader() {
    let (h, _feed, _) = push_harness().await;
    h.ctx.connect_push().await.unwrap();
    h.ctx.disconnect_push().await;
    assert!(!h.ctx.push_channel().unwrap().is_connected());

    // Idempotent.
    h.ctx.disconnect_push().await;
}

#[tokio::test]
async fn push_requires_a_configured_channel() {
    let h = harness().await;
    assert!(h.ctx.connect_push().await.is_err());
    assert!(h.ctx.on_push(PushEventKind::Created, |_| {}).is_err());
}
