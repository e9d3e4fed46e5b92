//! HttpTransport: request construction and failure classification

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tether_core::ports::{ITransport, Method, TransportError, TransportRequest};
use tether_http::{HttpError, HttpTransport};

use crate::common;

#[tokio::test]
async fn get_sends_query_and_bearer() {
    let (server, transport) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/flowers"))
        .and(query_param("page", "1"))
        .and(query_param("since", "42"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let request = TransportRequest::new(Method::Get, "/flowers")
        .query(vec![
            ("page".to_string(), "1".to_string()),
            ("since".to_string(), "42".to_string()),
        ])
        .bearer("tok");
    let response = transport.request(request).await.expect("request failed");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"items":[]}"#);
}

#[tokio::test]
async fn post_sends_json_body() {
    let (server, transport) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/flowers"))
        .and(body_json(json!({"name": "Rose", "updatedAt": 5})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "srv-1", "updatedAt": 5})))
        .expect(1)
        .mount(&server)
        .await;

    let request = TransportRequest::new(Method::Post, "/flowers")
        .body(json!({"name": "Rose", "updatedAt": 5}));
    let response = transport.request(request).await.unwrap();
    assert_eq!(response.status, 201);
    assert!(response.is_success());
}

#[tokio::test]
async fn error_statuses_are_responses_not_transport_errors() {
    let (server, transport) = common::setup().await;

    Mock::given(method("DELETE"))
        .and(path("/flowers/a"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let response = transport
        .request(TransportRequest::new(Method::Delete, "/flowers/a"))
        .await
        .unwrap();
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
    assert_eq!(response.body, "maintenance");
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    let transport = HttpTransport::new(&server.uri(), Duration::from_millis(200)).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = transport
        .request(TransportRequest::new(Method::Get, "/flowers"))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    // Bind and drop a listener to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport =
        HttpTransport::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

    let err = transport
        .request(TransportRequest::new(Method::Get, "/flowers"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    let transport =
        HttpTransport::new(&format!("{}/api/", server.uri()), Duration::from_secs(2)).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/flowers/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport
        .request(TransportRequest::new(Method::Get, "/flowers/a"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[test]
fn rejects_non_http_base_url() {
    let err = HttpTransport::new("ftp://example.com", Duration::from_secs(1))
        .err()
        .expect("ftp must be rejected");
    assert!(matches!(err, HttpError::InvalidUrl { .. }));
}
