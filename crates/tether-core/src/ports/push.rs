//! Push connector port
//!
//! A live, best-effort feed of `created`/`updated` events from the server,
//! scoped by the server to the authenticated owner. The feed carries no
//! backlog: a reconnecting client still has to pull.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{CollectionName, DomainError, Record};

/// Kind of push event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushEventKind {
    Created,
    Updated,
}

impl Display for PushEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PushEventKind::Created => "created",
            PushEventKind::Updated => "updated",
        })
    }
}

impl FromStr for PushEventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PushEventKind::Created),
            "updated" => Ok(PushEventKind::Updated),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown push event type: {other}"
            ))),
        }
    }
}

/// A single server-sent event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: PushEventKind,
    pub collection: CollectionName,
    pub record: Record,
}

/// An open push connection
#[async_trait::async_trait]
pub trait IPushConnection: Send {
    /// Wait for the next event; `Ok(None)` once the server closed the feed
    async fn next_event(&mut self) -> anyhow::Result<Option<PushEvent>>;

    /// Close the connection
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Opens push connections
#[async_trait::async_trait]
pub trait IPushConnector: Send + Sync {
    /// Connect using `token` for authentication
    async fn connect(&self, token: &str) -> anyhow::Result<Box<dyn IPushConnection>>;
}
