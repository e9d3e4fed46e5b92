//! RemoteRecords over a real HTTP transport

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use tether_core::domain::{CollectionName, RecordId, Timestamp};
use tether_sync::SyncError;

use crate::common;

fn flowers() -> CollectionName {
    CollectionName::new("flowers".to_string()).unwrap()
}

#[tokio::test]
async fn delta_fetch_parses_page() {
    let (server, api) = common::setup_api().await;

    Mock::given(method("GET"))
        .and(path("/flowers"))
        .and(query_param("since", "1000"))
        .and(query_param("pageSize", "50"))
        .and(header("authorization", format!("Bearer {}", common::TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "srv-1", "ownerId": "u1", "updatedAt": 1001, "name": "Rose"},
                {"id": "srv-2", "updatedAt": 1002, "deleted": true}
            ],
            "page": 1,
            "pageSize": 50,
            "total": 2,
            "hasMore": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = api
        .fetch_changes(&flowers(), Timestamp::from_millis(1000), 1, 50)
        .await
        .expect("delta fetch failed");

    assert_eq!(page.items.len(), 2);
    assert!(!page.has_more);
    assert_eq!(page.items[0].owner_id.as_deref(), Some("u1"));
    assert_eq!(page.items[0].fields["name"], "Rose");
    assert!(page.items[1].tombstone);
}

#[tokio::test]
async fn create_returns_server_record() {
    let (server, api) = common::setup_api().await;

    Mock::given(method("POST"))
        .and(path("/flowers"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "srv-9", "updatedAt": 77, "name": "Lily"})),
        )
        .mount(&server)
        .await;

    let record = api
        .create(&flowers(), &json!({"name": "Lily", "updatedAt": 77}))
        .await
        .unwrap();
    assert_eq!(record.id.as_str(), "srv-9");
    assert_eq!(record.updated_at, Timestamp::from_millis(77));
}

#[tokio::test]
async fn statuses_map_to_error_taxonomy() {
    let (server, api) = common::setup_api().await;
    let cases = [
        ("a", 401u16, "token expired"),
        ("b", 422, "name is required"),
        ("c", 503, "try later"),
    ];
    for (rid, status, message) in cases {
        Mock::given(method("PUT"))
            .and(path(format!("/flowers/{rid}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"error": message})))
            .mount(&server)
            .await;
    }

    let put = |rid: &str| {
        let api = api.clone();
        let rid = RecordId::new(rid.to_string()).unwrap();
        async move { api.update(&flowers(), &rid, &json!({})).await.unwrap_err() }
    };

    assert_eq!(
        put("a").await,
        SyncError::Auth {
            status: 401,
            message: "token expired".into()
        }
    );
    assert_eq!(
        put("b").await,
        SyncError::Validation {
            status: 422,
            message: "name is required".into()
        }
    );
    let server_err = put("c").await;
    assert!(matches!(server_err, SyncError::Server { status: 503, .. }));
    assert!(server_err.is_retryable());
}

#[tokio::test]
async fn delete_accepts_no_content() {
    let (server, api) = common::setup_api().await;

    Mock::given(method("DELETE"))
        .and(path("/flowers/srv-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = api
        .delete(&flowers(), &RecordId::new("srv-1".to_string()).unwrap())
        .await
        .unwrap();
    assert!(result.is_none());
}
