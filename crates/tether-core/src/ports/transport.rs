//! Transport port (driven/secondary port)
//!
//! A minimal request/response contract. The engine never sees HTTP client
//! types: it builds a [`TransportRequest`], gets back a status code and a
//! raw body, and classifies the outcome itself.
//!
//! ## Error contract
//!
//! - Any response, whatever its status, is `Ok(TransportResponse)`.
//! - `Err(TransportError)` means no response was obtained (DNS, connect,
//!   reset, timeout). The orchestrator treats it as a whole-batch abort.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde_json::Value;

/// HTTP-like request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// An outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the server base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Bearer token attached as `Authorization: Bearer <token>`
    pub bearer: Option<String>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn query(mut self, params: Vec<(String, String)>) -> Self {
        self.query = params;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// A response received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Raw response body (possibly empty)
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// DNS resolution or TCP/TLS connection failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other network-level failure (reset, broken body stream)
    #[error("Network error: {0}")]
    Network(String),
}

/// Port trait for talking to the server
#[async_trait::async_trait]
pub trait ITransport: Send + Sync {
    /// Send `request` and return the server's response
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
