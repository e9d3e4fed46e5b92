//! Shared helpers for HTTP adapter tests

use std::sync::Arc;
use std::time::Duration;

use wiremock::MockServer;

use tether_core::ports::StaticCredentials;
use tether_http::HttpTransport;
use tether_sync::RemoteRecords;

pub const TOKEN: &str = "test-access-token";

/// Start a mock server and a transport pointing at it
pub async fn setup() -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;
    let transport =
        HttpTransport::new(&server.uri(), Duration::from_secs(2)).expect("valid mock server URL");
    (server, transport)
}

/// Typed records API over a real HTTP transport
pub async fn setup_api() -> (MockServer, RemoteRecords) {
    let (server, transport) = setup().await;
    let credentials = Arc::new(StaticCredentials::new(Some(TOKEN.to_string())));
    (server, RemoteRecords::new(Arc::new(transport), credentials))
}
