//! Transport manager for the book and trade subscriptions.
//!
//! [`TransportManager`] owns both logical connections and is the only code
//! that writes their retry counters and manual-disconnect flags. Each
//! connection retries on its own; exhausting one leaves the other running.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use super::connection::{Connection, ConnectionParams, StreamKind};
use super::handlers::{BookHandler, FeedHandlers, MessageHandler, TradeHandler};
use super::transport::Connector;
use crate::config::Config;
use crate::error::Error;
use crate::orderbook::BookManager;
use crate::Result;

/// Lifecycle owner of the book and trade connections
pub struct TransportManager {
    config: Config,
    connector: Arc<dyn Connector>,
    book: Arc<Mutex<BookManager>>,
    handlers: Arc<FeedHandlers>,
    book_conn: Option<Connection>,
    trade_conn: Option<Connection>,
}

impl TransportManager {
    /// Create a manager; nothing is opened until [`connect`](Self::connect)
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        book: Arc<Mutex<BookManager>>,
        handlers: Arc<FeedHandlers>,
    ) -> Self {
        Self {
            config,
            connector,
            book,
            handlers,
            book_conn: None,
            trade_conn: None,
        }
    }

    /// Open both subscriptions with fresh retry counters
    ///
    /// Running connections are closed first, so calling this again restarts
    /// the feed. Must be called from within a tokio runtime.
    pub fn connect(&mut self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::Config(
                "connect() requires a running tokio runtime".to_string(),
            ));
        }

        self.release();

        let book_handler = BookHandler::new(self.book.clone(), self.handlers.clone());
        let trade_handler = TradeHandler::new(self.book.clone(), self.handlers.clone());

        self.book_conn = Some(self.spawn(
            StreamKind::OrderBook,
            self.config.book_url().to_string(),
            self.config.book_topic(),
            Box::new(book_handler),
        ));
        self.trade_conn = Some(self.spawn(
            StreamKind::Trade,
            self.config.trade_url().to_string(),
            self.config.trade_topic(),
            Box::new(trade_handler),
        ));

        info!(symbol = %self.config.symbol(), "Feed connecting");
        Ok(())
    }

    fn spawn(
        &self,
        stream: StreamKind,
        url: String,
        topic: String,
        handler: Box<dyn MessageHandler>,
    ) -> Connection {
        Connection::spawn(ConnectionParams {
            stream,
            url,
            topic,
            reconnect: self.config.reconnect().clone(),
            connector: self.connector.clone(),
            handler,
            handlers: self.handlers.clone(),
        })
    }

    /// Close both sockets and suppress any pending retry
    pub fn disconnect(&mut self) {
        if self.release() {
            info!(symbol = %self.config.symbol(), "Feed disconnected");
        }
    }

    fn release(&mut self) -> bool {
        let mut released = false;
        for conn in [self.book_conn.take(), self.trade_conn.take()]
            .into_iter()
            .flatten()
        {
            conn.close();
            released = true;
        }
        released
    }

    /// Request a fresh book snapshot on the open book socket
    ///
    /// Returns `false` without doing anything when the socket is not open.
    pub fn resubscribe(&self) -> bool {
        self.book_conn
            .as_ref()
            .map_or(false, |conn| conn.resubscribe())
    }

    fn connection(&self, stream: StreamKind) -> Option<&Connection> {
        match stream {
            StreamKind::OrderBook => self.book_conn.as_ref(),
            StreamKind::Trade => self.trade_conn.as_ref(),
        }
    }

    /// Check if the socket for `stream` is currently open
    pub fn is_open(&self, stream: StreamKind) -> bool {
        self.connection(stream).map_or(false, |conn| conn.is_open())
    }

    /// Retries made since the last successful open of `stream`
    pub fn retry_count(&self, stream: StreamKind) -> u32 {
        self.connection(stream).map_or(0, |conn| conn.retry_count())
    }

    /// Check if `stream` is connected or still retrying
    ///
    /// `false` after `disconnect()` and after the retry budget ran out.
    pub fn is_running(&self, stream: StreamKind) -> bool {
        self.connection(stream)
            .map_or(false, |conn| !conn.is_finished())
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportManager")
            .field("symbol", &self.config.symbol())
            .field("book", &self.book_conn)
            .field("trade", &self.trade_conn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WsConnector;

    fn manager() -> TransportManager {
        let handlers = FeedHandlers::new(|_, _| {}, |_| {});
        TransportManager::new(
            Config::default(),
            Arc::new(WsConnector::default()),
            Arc::new(Mutex::new(BookManager::new("BTCPFC"))),
            Arc::new(handlers),
        )
    }

    #[test]
    fn test_connect_without_runtime_fails() {
        let mut manager = manager();
        assert!(matches!(manager.connect(), Err(Error::Config(_))));
        assert!(!manager.is_running(StreamKind::OrderBook));
    }

    #[test]
    fn test_connect_inside_runtime_spawns_both() {
        let mut manager = manager();
        tokio_test::block_on(async {
            manager.connect().unwrap();
            assert!(manager.is_running(StreamKind::OrderBook));
            assert!(manager.is_running(StreamKind::Trade));

            manager.disconnect();
            assert!(!manager.is_running(StreamKind::Trade));
        });
    }

    #[test]
    fn test_idle_manager() {
        let mut manager = manager();
        assert!(!manager.resubscribe());
        assert!(!manager.is_open(StreamKind::Trade));
        assert_eq!(manager.retry_count(StreamKind::OrderBook), 0);
        manager.disconnect();
    }
}
