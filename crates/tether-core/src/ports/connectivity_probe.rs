//! Connectivity probe port

use crate::domain::ConnectivityStatus;

/// Checks whether the server is reachable right now
#[async_trait::async_trait]
pub trait IConnectivityProbe: Send + Sync {
    async fn probe(&self) -> ConnectivityStatus;
}
