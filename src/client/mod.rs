//! Feed plumbing between BTSE and the book.
//!
//! This module contains:
//!
//! - [`transport`] - socket traits and the tokio-tungstenite implementation
//! - [`connection`] - one subscription with bounded reconnection
//! - [`manager`] - lifecycle of the book and trade connections
//! - [`handlers`] - application callbacks and per-topic dispatch

pub mod connection;
pub mod handlers;
pub mod manager;
pub mod transport;

pub use connection::{ReconnectConfig, StreamKind};
pub use handlers::{BookHandler, Directive, FeedHandlers, MessageHandler, TradeHandler};
pub use manager::TransportManager;
pub use transport::{Connector, Transport, TransportError, WsConnector, WsTransport};
