//! WebSocket transport seam.
//!
//! [`Connector`] opens sockets and [`Transport`] moves text frames over them.
//! The connection supervisor only sees these traits, so tests swap in
//! scripted in-memory sockets instead of the network.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Handshake or TCP connect failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer went away without a close frame
    #[error("connection closed")]
    ConnectionClosed,

    /// Write failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Read failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connect did not finish in time
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Frame could not be read as text
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// An open socket carrying text frames
#[async_trait]
pub trait Transport: Send {
    /// Send a text frame
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next text frame
    ///
    /// Returns `Ok(None)` when the peer closed the socket gracefully.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the socket
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sockets for the connection supervisor
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// [`Connector`] backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the given handshake timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self))]
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Connecting to WebSocket");

        let (stream, _response) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected");
        Ok(Box::new(WsTransport { stream }))
    }
}

/// Live WebSocket socket
pub struct WsTransport {
    stream: WsStream,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        trace!(len = message.len(), "Sending frame");
        self.stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Close frame received");
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
