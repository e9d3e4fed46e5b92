//! WebSocket implementation of the push connector port
//!
//! The server sends one JSON text frame per event:
//!
//! ```json
//! {"type": "updated", "collection": "flowers", "record": {"id": "srv-1", "updatedAt": 1700000000000}}
//! ```
//!
//! The token travels in the `Authorization: Bearer` header of the upgrade
//! request. Frames that do not parse as an event (greetings, pings from
//! other tooling) are skipped.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use tether_core::ports::{IPushConnection, IPushConnector, PushEvent};

use crate::{parse_url, HttpError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens authenticated WebSocket connections to the event feed
pub struct WebSocketPushConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketPushConnector {
    /// Create a connector for `url` (`ws://` or `wss://`)
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, HttpError> {
        let parsed = parse_url(url, &["ws", "wss"])?;
        Ok(Self {
            url: parsed.to_string(),
            connect_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IPushConnector for WebSocketPushConnector {
    async fn connect(&self, token: &str) -> anyhow::Result<Box<dyn IPushConnection>> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {token}").parse()?);

        debug!(url = %self.url, "Connecting push channel");
        let (socket, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| anyhow::anyhow!("push connection timed out after {:?}", self.connect_timeout))??;
        info!(url = %self.url, status = response.status().as_u16(), "Push channel open");

        let (write, read) = socket.split();
        Ok(Box::new(WebSocketConnection { write, read }))
    }
}

/// One open WebSocket feed
pub struct WebSocketConnection {
    write: SplitSink<Socket, Message>,
    read: SplitStream<Socket>,
}

#[async_trait]
impl IPushConnection for WebSocketConnection {
    async fn next_event(&mut self) -> anyhow::Result<Option<PushEvent>> {
        while let Some(frame) = self.read.next().await {
            match frame? {
                Message::Text(text) => match serde_json::from_str::<PushEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(err) => trace!(error = %err, "Skipping non-event frame"),
                },
                Message::Close(frame) => {
                    debug!(frame = ?frame, "Server closed push channel");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
