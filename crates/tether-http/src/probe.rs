//! HTTP reachability probe
//!
//! The server counts as reachable when the probe path answers with any
//! HTTP status. Only a failure to get a response (refused, DNS, timeout)
//! reports offline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

use tether_core::domain::ConnectivityStatus;
use tether_core::ports::IConnectivityProbe;

use crate::{parse_url, HttpError};

pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
}

impl HttpReachabilityProbe {
    /// Probe `base_url` + `path` with the given timeout
    pub fn new(base_url: &str, path: &str, timeout: Duration) -> Result<Self, HttpError> {
        let base = parse_url(base_url, &["http", "https"])?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base.as_str().trim_end_matches('/'), path),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IConnectivityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> ConnectivityStatus {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                trace!(url = %self.url, status = response.status().as_u16(), "Probe answered");
                ConnectivityStatus::Online
            }
            Err(err) => {
                trace!(url = %self.url, error = %err, "Probe failed");
                ConnectivityStatus::Offline
            }
        }
    }
}
