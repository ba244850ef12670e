//! Client-side transport abstraction
//!
//! A [`Connector`] dials an endpoint URL and yields a [`Channel`]: one
//! bidirectional text-frame stream to the server. The session controller
//! only ever talks to these traits, so tests drive it with an in-memory
//! connector instead of a real socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Transport-level failures
///
/// Never fatal to the session: a failed connect or send feeds the
/// reconnect policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a connection to the endpoint
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The channel is no longer usable for sending
    #[error("Send failed: {0}")]
    Send(String),
}

/// One live bidirectional message stream to the server
#[async_trait]
pub trait Channel: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame; `None` means the channel is closed
    ///
    /// Non-text frames (pings, binary) are consumed internally.
    async fn recv(&mut self) -> Option<String>;

    /// Close the channel deliberately
    async fn close(&mut self);
}

/// Dials endpoints on behalf of the session controller
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError>;
}

/// WebSocket channel over tokio-tungstenite
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<String> {
        while let Some(result) = self.stream.next().await {
            match result {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) => return None,
                // Pong replies to server pings are queued by tungstenite
                Ok(_) => continue,
                Err(e) => {
                    debug!("WebSocket receive error: {}", e);
                    return None;
                }
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Production connector: `tokio_tungstenite::connect_async`
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Channel>, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsChannel { stream }))
    }
}
