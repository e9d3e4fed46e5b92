//! WebSocket push connector against a local tungstenite server

use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use tether_core::ports::{IPushConnector, PushEventKind};
use tether_http::{HttpError, WebSocketPushConnector};

use crate::common::TOKEN;

/// Accept one connection, send `frames`, close; returns the Authorization
/// header seen during the handshake
async fn serve_frames(frames: Vec<String>) -> (String, JoinHandle<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut auth = None;
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(resp)
        })
        .await
        .unwrap();

        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        let _ = ws.close(None).await;
        auth
    });

    (format!("ws://{addr}/ws"), handle)
}

#[tokio::test]
async fn receives_events_and_skips_unknown_frames() {
    let frames = vec![
        r#"{"type":"hello"}"#.to_string(),
        r#"{"type":"created","collection":"flowers","record":{"id":"srv-1","updatedAt":5,"name":"Rose"}}"#
            .to_string(),
    ];
    let (url, server) = serve_frames(frames).await;

    let connector = WebSocketPushConnector::new(&url, Duration::from_secs(5)).unwrap();
    let mut connection = connector.connect(TOKEN).await.expect("connect failed");

    let event = connection.next_event().await.unwrap().expect("event expected");
    assert_eq!(event.kind, PushEventKind::Created);
    assert_eq!(event.collection.as_str(), "flowers");
    assert_eq!(event.record.id.as_str(), "srv-1");

    assert!(connection.next_event().await.unwrap().is_none());

    let auth = server.await.unwrap();
    assert_eq!(auth.as_deref(), Some(format!("Bearer {TOKEN}").as_str()));
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let connector =
        WebSocketPushConnector::new(&format!("ws://127.0.0.1:{port}/ws"), Duration::from_secs(2))
            .unwrap();
    assert!(connector.connect(TOKEN).await.is_err());
}

#[test]
fn requires_websocket_scheme() {
    let err = WebSocketPushConnector::new("http://localhost:3000", Duration::from_secs(1))
        .err()
        .expect("http must be rejected");
    assert!(matches!(err, HttpError::InvalidUrl { .. }));
}
