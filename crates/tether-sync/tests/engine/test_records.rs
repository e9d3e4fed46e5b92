//! Record repository: cache-first reads and local writes

use std::time::Duration;

use serde_json::json;

use tether_core::domain::{CollectionQuery, ConnectivityStatus, OpType};
use tether_core::ports::{IEntityStore, Method};
use tether_sync::{PageSource, RecordDraft, SaveOutcome};

use crate::common::*;

fn listing(page_size: u32) -> CollectionQuery {
    CollectionQuery::new(flowers(), page_size)
}

fn list_requests(h: &Harness) -> usize {
    h.server
        .requests()
        .iter()
        .filter(|r| r.method == Method::Get && r.path == "/flowers")
        .count()
}

#[tokio::test]
async fn listing_is_fetched_once_then_served_from_cache() {
    let h = harness().await;
    h.server.seed("flowers", record("a", 10, "Rose"));
    h.server.seed("flowers", record("b", 20, "Tulip"));

    let first = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(first.source, PageSource::Remote);
    assert_eq!(first.records.len(), 2);

    let second = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(second.source, PageSource::Cache);
    assert_eq!(second.records, first.records);
    assert_eq!(list_requests(&h), 1);
}

#[tokio::test]
async fn local_write_invalidates_cached_listing() {
    let h = harness().await;
    h.server.seed("flowers", record("a", 10, "Rose"));
    h.ctx.get_records(&listing(10)).await.unwrap();

    h.ctx
        .save_record(
            &flowers(),
            RecordDraft::existing(id("a"), fields(json!({"name": "Rose v2"}))),
        )
        .await;

    let page = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(page.source, PageSource::Remote);
    assert_eq!(page.records[0].fields["name"], "Rose v2");
}

#[tokio::test]
async fn expired_listing_is_served_stale_when_fetch_fails() {
    let h = harness_with(HarnessOptions {
        query_ttl: Duration::ZERO,
        ..HarnessOptions::default()
    })
    .await;
    h.server.seed("flowers", record("a", 10, "Rose"));

    let first = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(first.source, PageSource::Remote);

    h.server.fail_with_status(Method::Get, "/flowers", 502);
    let stale = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(stale.source, PageSource::Stale);
    assert_eq!(stale.records, first.records);
}

#[tokio::test]
async fn offline_listing_without_cache_comes_from_entity_store() {
    let h = offline_harness().await;
    for (rid, at, name) in [("a", 1, "Red Rose"), ("b", 2, "Tulip"), ("c", 3, "White Rose")] {
        h.stores
            .entities
            .apply(&flowers(), &record(rid, at, name))
            .await
            .unwrap();
    }

    let page = h.ctx.get_records(&listing(2)).await.unwrap();
    assert_eq!(page.source, PageSource::Local);
    assert!(page.has_more);
    let ids: Vec<_> = page.records.iter().map(|r| r.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["c", "b"]);

    let roses = h
        .ctx
        .get_records(&listing(10).search("rose"))
        .await
        .unwrap();
    assert_eq!(roses.records.len(), 2);
    assert!(!roses.has_more);
}

#[tokio::test]
async fn pending_creates_are_listed_on_the_first_page() {
    let h = harness().await;
    h.server.seed("flowers", record("a", 10, "Rose"));

    h.ctx.set_connectivity(ConnectivityStatus::Offline);
    let SaveOutcome::Queued(item) = h
        .ctx
        .save_record(&flowers(), RecordDraft::new(fields(json!({"name": "Draft"}))))
        .await
    else {
        panic!("offline save should be queued");
    };
    h.ctx.set_connectivity(ConnectivityStatus::Online);

    let page = h.ctx.get_records(&listing(10)).await.unwrap();
    assert_eq!(page.source, PageSource::Remote);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].id, item.target_record_id.unwrap());

    let second = h.ctx.get_records(&listing(10).page(2)).await.unwrap();
    assert!(second.records.is_empty());
}

#[tokio::test]
async fn local_timestamps_are_monotonic() {
    let h = offline_harness().await;
    let SaveOutcome::Queued(first) = h
        .ctx
        .save_record(&flowers(), RecordDraft::new(fields(json!({"name": "A"}))))
        .await
    else {
        panic!("expected queued");
    };
    let rid = first.target_record_id.unwrap();

    let mut last = h.stores.entities.get(&rid).await.unwrap().any().unwrap().updated_at;
    for n in 0..5 {
        h.ctx
            .save_record(
                &flowers(),
                RecordDraft::existing(rid.clone(), fields(json!({ "n": n }))),
            )
            .await;
        let now = h.stores.entities.get(&rid).await.unwrap().any().unwrap().updated_at;
        assert!(now > last);
        last = now;
    }

    // Drafts merge over the previous snapshot.
    let merged = h.stores.entities.get(&rid).await.unwrap().any().unwrap();
    assert_eq!(merged.fields["name"], "A");
    assert_eq!(merged.fields["n"], 4);
}

#[tokio::test]
async fn offline_delete_hides_record_and_queues_delete() {
    let h = offline_harness().await;
    h.stores
        .entities
        .apply(&flowers(), &record("srv-7", 5, "Rose"))
        .await
        .unwrap();

    let outcome = h.ctx.delete_record(&flowers(), &id("srv-7")).await;
    let SaveOutcome::Queued(item) = outcome else {
        panic!("expected queued delete, got {outcome:?}");
    };
    assert_eq!(item.op_type, OpType::Delete);

    assert!(h.ctx.get_record(&flowers(), &id("srv-7")).await.unwrap().is_none());
    let page = h.ctx.get_records(&listing(10)).await.unwrap();
    assert!(page.records.is_empty());
}

#[tokio::test]
async fn online_delete_is_sent_directly() {
    let h = harness().await;
    h.server.seed("flowers", record("srv-7", 5, "Rose"));
    h.ctx.sync_now().await;

    let outcome = h.ctx.delete_record(&flowers(), &id("srv-7")).await;
    let SaveOutcome::Saved(tombstone) = outcome else {
        panic!("expected direct delete, got {outcome:?}");
    };
    assert!(tombstone.tombstone);
    assert!(h.server.stored("flowers", "srv-7").is_none());
    assert!(h.stores.entities.get(&id("srv-7")).await.unwrap().is_missing());
    assert_eq!(h.ctx.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_record_is_fetched_from_server() {
    let h = harness().await;
    h.server.seed("flowers", record("srv-3", 5, "Lily"));

    let fetched = h.ctx.get_record(&flowers(), &id("srv-3")).await.unwrap().unwrap();
    assert_eq!(fetched.fields["name"], "Lily");
    assert!(h.ctx.get_record(&flowers(), &id("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_page_is_rejected() {
    let h = harness().await;
    assert!(h.ctx.get_records(&listing(0)).await.is_err());
    assert!(h.ctx.get_records(&listing(10).page(0)).await.is_err());
}

#[tokio::test]
async fn direct_saves_keep_server_stamps_and_send_only_changes() {
    let h = harness_with(HarnessOptions {
        server_clock: Some(Duration::from_secs(5)),
        ..HarnessOptions::default()
    })
    .await;
    h.server.seed("flowers", record("a", 10, "Rose"));
    h.ctx.sync_now().await;

    let SaveOutcome::Saved(first) = h
        .ctx
        .save_record(&flowers(), RecordDraft::existing(id("a"), fields(json!({"price": 4}))))
        .await
    else {
        panic!("online save should be sent directly");
    };
    assert_eq!(first.fields["name"], "Rose");

    // The next local stamp still moves past the server's.
    let SaveOutcome::Saved(second) = h
        .ctx
        .save_record(&flowers(), RecordDraft::existing(id("a"), fields(json!({"color": "red"}))))
        .await
    else {
        panic!("online save should be sent directly");
    };
    assert!(second.updated_at > first.updated_at);

    let last_put = h
        .server
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Put)
        .last()
        .unwrap();
    let body = last_put.body.unwrap();
    assert_eq!(body["color"], "red");
    assert!(body.get("name").is_none());
    assert!(body.get("price").is_none());

    let cached = h.ctx.get_record(&flowers(), &id("a")).await.unwrap().unwrap();
    assert_eq!(cached.updated_at, second.updated_at);
    assert_eq!(cached.fields, fields(json!({"name": "Rose", "price": 4, "color": "red"})));
}
