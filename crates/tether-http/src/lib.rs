//! Tether HTTP - network adapters for the sync engine
//!
//! Provides:
//! - [`HttpTransport`]: the transport port over reqwest, with a request timeout
//! - [`WebSocketPushConnector`]: the push connector port over tokio-tungstenite
//! - [`HttpReachabilityProbe`]: the connectivity probe port, hitting a health path
//!
//! ## Modules
//!
//! - [`transport`] - request/response adapter
//! - [`push`] - live event feed
//! - [`probe`] - reachability checks

pub mod probe;
pub mod push;
pub mod transport;

pub use probe::HttpReachabilityProbe;
pub use push::WebSocketPushConnector;
pub use transport::HttpTransport;

use thiserror::Error;

/// Errors raised while building the network adapters
#[derive(Debug, Error)]
pub enum HttpError {
    /// A configured URL could not be parsed or has the wrong scheme
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parse `raw`, requiring one of `schemes`
pub(crate) fn parse_url(raw: &str, schemes: &[&str]) -> Result<url::Url, HttpError> {
    let url = url::Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(HttpError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("expected scheme {}", schemes.join(" or ")),
        });
    }
    Ok(url)
}
