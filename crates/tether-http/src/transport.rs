//! reqwest-backed implementation of the transport port
//!
//! Every request gets the configured timeout (10 seconds by default). The
//! adapter does not interpret status codes: any HTTP response, 2xx or not,
//! is returned as a [`TransportResponse`]. Only failures that produced no
//! response at all become a [`TransportError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, trace};

use tether_core::ports::{ITransport, Method, TransportError, TransportRequest, TransportResponse};

use crate::{parse_url, HttpError};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport for the records API
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url` (e.g. `http://localhost:3000`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpError> {
        let parsed = parse_url(base_url, &["http", "https"])?;
        let client = Client::builder().timeout(timeout).build()?;

        debug!(base_url = %parsed, timeout_ms = timeout.as_millis() as u64, "Created HTTP transport");
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ITransport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        trace!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(to_reqwest(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        Ok(TransportResponse::new(status, body))
    }
}
