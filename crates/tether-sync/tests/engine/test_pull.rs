//! Pull phase: delta fetch, last-write-wins and cursor handling

use tether_core::domain::{CacheLookup, Timestamp};
use tether_core::ports::{ICursorStore, IEntityStore, Method};
use tether_sync::SyncOutcome;

use crate::common::*;

const T0: i64 = 1_700_000_000_000;

fn completed(outcome: SyncOutcome) -> tether_sync::SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("expected completed sync, got {other:?}"),
    }
}

#[tokio::test]
async fn cursor_is_max_updated_at_across_all_pages() {
    let h = harness().await;
    h.stores
        .cursors
        .advance(&flowers(), Timestamp::from_millis(T0))
        .await
        .unwrap();

    h.server.script(
        Method::Get,
        "/flowers",
        Ok(page_response(
            vec![record("a", T0 + 1, "Rose"), record("b", T0 + 3, "Tulip")],
            true,
        )),
    );
    h.server.script(
        Method::Get,
        "/flowers",
        Ok(page_response(vec![record("c", T0 + 2, "Lily")], false)),
    );

    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.pulled, 3);
    assert_eq!(report.applied, 3);

    let cursor = h.stores.cursors.get(&flowers()).await.unwrap().unwrap();
    assert_eq!(cursor.last_sync_at, Timestamp::from_millis(T0 + 3));

    let gets: Vec<_> = h
        .server
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Get)
        .collect();
    assert_eq!(gets.len(), 2);
    for get in &gets {
        assert!(get.query.contains(&("since".to_string(), T0.to_string())));
    }
    assert!(gets[1].query.contains(&("page".to_string(), "2".to_string())));
}

#[tokio::test]
async fn cursor_stays_put_when_pagination_fails() {
    let h = harness().await;
    h.server.script(
        Method::Get,
        "/flowers",
        Ok(page_response(vec![record("a", T0 + 5, "Rose")], true)),
    );
    h.server.fail_with_status(Method::Get, "/flowers", 503);

    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.errors.len(), 1);
    assert!(h.stores.cursors.get(&flowers()).await.unwrap().is_none());

    // Records from the first page are kept; the next round refetches them.
    assert!(h.stores.entities.get(&id("a")).await.unwrap().any().is_some());
}

#[tokio::test]
async fn first_pull_fetches_everything_and_second_pull_is_a_delta() {
    let h = harness().await;
    h.server.seed("flowers", record("a", T0 + 1, "Rose"));
    h.server.seed("flowers", record("b", T0 + 2, "Tulip"));
    h.server.seed("flowers", record("c", T0 + 3, "Lily"));

    let first = completed(h.ctx.sync_now().await);
    assert_eq!(first.pulled, 3);
    assert!(!h.server.requests()[0]
        .query
        .iter()
        .any(|(k, _)| k == "since"));

    h.server.seed("flowers", record("b", T0 + 10, "Tulip v2"));
    let second = completed(h.ctx.sync_now().await);
    assert_eq!(second.pulled, 1);

    let b = h.stores.entities.get(&id("b")).await.unwrap().any().unwrap();
    assert_eq!(b.fields["name"], "Tulip v2");
    let cursor = h.stores.cursors.get(&flowers()).await.unwrap().unwrap();
    assert_eq!(cursor.last_sync_at, Timestamp::from_millis(T0 + 10));
}

#[tokio::test]
async fn older_incoming_record_does_not_overwrite_local() {
    let h = harness().await;
    h.stores
        .entities
        .apply(&flowers(), &record("a", T0 + 10, "Local edit"))
        .await
        .unwrap();

    h.server.seed("flowers", record("a", T0 + 5, "Server copy"));
    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.skipped_stale, 1);

    let a = h.stores.entities.get(&id("a")).await.unwrap().any().unwrap();
    assert_eq!(a.fields["name"], "Local edit");
}

#[tokio::test]
async fn equal_timestamps_favor_the_server() {
    let h = harness().await;
    h.stores
        .entities
        .apply(&flowers(), &record("a", T0, "Local"))
        .await
        .unwrap();
    h.server.seed("flowers", record("a", T0, "Server"));

    completed(h.ctx.sync_now().await);
    let a = h.stores.entities.get(&id("a")).await.unwrap().any().unwrap();
    assert_eq!(a.fields["name"], "Server");
}

#[tokio::test]
async fn tombstone_removes_local_copy() {
    let h = harness().await;
    h.stores
        .entities
        .apply(&flowers(), &record("a", T0, "Rose"))
        .await
        .unwrap();
    h.server.seed("flowers", tombstone("a", T0 + 1));

    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.deleted, 1);
    assert!(matches!(
        h.stores.entities.get(&id("a")).await.unwrap(),
        CacheLookup::Missing
    ));
}

#[tokio::test]
async fn failing_collection_does_not_block_others() {
    let h = harness_with(HarnessOptions {
        collections: vec!["flowers", "trees"],
        ..HarnessOptions::default()
    })
    .await;
    h.server.fail_with_status(Method::Get, "/flowers", 500);
    h.server.seed("trees", record("oak", T0, "Oak"));

    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("flowers"));
    assert_eq!(report.pulled, 1);
    assert!(h
        .stores
        .cursors
        .get(&collection("trees"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn pull_without_token_fails_offline_per_collection() {
    let h = harness_with(HarnessOptions {
        token: None,
        ..HarnessOptions::default()
    })
    .await;

    let report = completed(h.ctx.sync_now().await);
    assert_eq!(report.pulled, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(h.server.requests().is_empty());
}
