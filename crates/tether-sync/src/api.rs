//! Typed server calls over the transport port
//!
//! [`RemoteRecords`] turns collection operations into transport requests,
//! attaches the bearer token and classifies every outcome into a
//! [`SyncError`]. The token is read from the credential provider on every
//! call; when none is available the call fails with `SyncError::Offline`
//! without touching the network.
//!
//! ## Endpoints
//!
//! | Operation      | Request                                             |
//! |----------------|-----------------------------------------------------|
//! | delta / list   | `GET /{collection}?page=&pageSize=[&since=][&q=]..` |
//! | fetch one      | `GET /{collection}/{id}`                            |
//! | create         | `POST /{collection}`                                |
//! | update         | `PUT /{collection}/{id}`                            |
//! | delete         | `DELETE /{collection}/{id}`                         |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use tether_core::domain::{CollectionName, CollectionQuery, Record, RecordId, Timestamp};
use tether_core::ports::{
    ICredentialProvider, ITransport, Method, TransportRequest, TransportResponse,
};

use crate::SyncError;

/// One page of a listing or delta response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub items: Vec<Record>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

/// Server API client for record collections
#[derive(Clone)]
pub struct RemoteRecords {
    transport: Arc<dyn ITransport>,
    credentials: Arc<dyn ICredentialProvider>,
}

impl RemoteRecords {
    pub fn new(transport: Arc<dyn ITransport>, credentials: Arc<dyn ICredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// True if a non-empty token is currently available
    pub fn has_credentials(&self) -> bool {
        self.token().is_ok()
    }

    fn token(&self) -> Result<String, SyncError> {
        self.credentials
            .current_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::Offline("no credentials available".to_string()))
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, SyncError> {
        let token = self.token()?;
        let method = request.method;
        let path = request.path.clone();

        let response = self.transport.request(request.bearer(token)).await?;
        debug!(%method, path = %path, status = response.status, "Server responded");

        if response.is_success() {
            Ok(response)
        } else {
            Err(SyncError::from_status(response.status, &response.body))
        }
    }

    /// Records of `collection` changed after `since`, one page at a time
    pub async fn fetch_changes(
        &self,
        collection: &CollectionName,
        since: Timestamp,
        page: u32,
        page_size: u32,
    ) -> Result<RecordPage, SyncError> {
        let mut query = vec![
            ("page".to_string(), page.to_string()),
            ("pageSize".to_string(), page_size.to_string()),
        ];
        if since > Timestamp::EPOCH {
            query.push(("since".to_string(), since.as_millis().to_string()));
        }

        let request = TransportRequest::new(Method::Get, collection_path(collection)).query(query);
        let response = self.send(request).await?;
        parse(&response.body)
    }

    /// A listing page (search and filters applied server-side)
    pub async fn list(&self, query: &CollectionQuery) -> Result<RecordPage, SyncError> {
        let request = TransportRequest::new(Method::Get, collection_path(&query.collection))
            .query(query.to_query_params());
        let response = self.send(request).await?;
        parse(&response.body)
    }

    pub async fn fetch_one(
        &self,
        collection: &CollectionName,
        id: &RecordId,
    ) -> Result<Record, SyncError> {
        let request = TransportRequest::new(Method::Get, record_path(collection, id));
        let response = self.send(request).await?;
        parse(&response.body)
    }

    /// Create a record; the response carries the server-assigned id
    pub async fn create(
        &self,
        collection: &CollectionName,
        payload: &Value,
    ) -> Result<Record, SyncError> {
        let request =
            TransportRequest::new(Method::Post, collection_path(collection)).body(payload.clone());
        let response = self.send(request).await?;
        parse(&response.body)
    }

    pub async fn update(
        &self,
        collection: &CollectionName,
        id: &RecordId,
        payload: &Value,
    ) -> Result<Record, SyncError> {
        let request =
            TransportRequest::new(Method::Put, record_path(collection, id)).body(payload.clone());
        let response = self.send(request).await?;
        parse(&response.body)
    }

    /// Delete a record; returns the server's tombstone when it sends one
    ///
    /// A record the server no longer knows (404) counts as deleted.
    pub async fn delete(
        &self,
        collection: &CollectionName,
        id: &RecordId,
    ) -> Result<Option<Record>, SyncError> {
        let request = TransportRequest::new(Method::Delete, record_path(collection, id));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => {
                debug!(collection = %collection, id = %id, "Record already gone on server");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str(&response.body).ok())
    }
}

fn collection_path(collection: &CollectionName) -> String {
    format!("/{}", collection.as_str())
}

fn record_path(collection: &CollectionName, id: &RecordId) -> String {
    format!("/{}/{}", collection.as_str(), id.as_str())
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|e| SyncError::Malformed(e.to_string()))
}
