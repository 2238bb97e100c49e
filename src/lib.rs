//! # btse-orderbook
//!
//! A self-healing local order book for [BTSE](https://www.btse.com) futures,
//! rebuilt from the exchange's snapshot/delta WebSocket stream.
//!
//! ## Features
//!
//! - **Book reconstruction** - sorted sides with cumulative totals and depth ratios
//! - **Sequence checking** - gaps and crossed books trigger a resubscribe
//! - **Change hints** - per-price appeared/increased/decreased/removed markers
//! - **Bounded reconnection** - each subscription retries on its own
//! - **Async/Await** - built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use btse_orderbook::{Config, FeedHandlers, OrderbookClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), btse_orderbook::Error> {
//!     let handlers = FeedHandlers::new(
//!         |_update, state| {
//!             if let (Some(bid), Some(ask)) = (state.best_bid(), state.best_ask()) {
//!                 println!("{} / {}", bid.price, ask.price);
//!             }
//!         },
//!         |price| println!("trade {}", price),
//!     )
//!     .with_error_handler(|err| eprintln!("feed error: {}", err));
//!
//!     let mut client = OrderbookClient::new(Config::new("BTCPFC"), handlers)?;
//!     client.connect()?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`client`] - sockets, reconnection and per-topic dispatch
//! - [`decoder`] - raw frames to typed messages
//! - [`orderbook`] - book state, change tracking and the reconciliation engine
//! - [`types`] - wire and domain types
//! - [`config`] - endpoints, symbol and retry policy
//! - [`error`] - error types for the crate
//!
//! ## Recovery
//!
//! Nothing in the pipeline panics or halts on bad input. A malformed frame is
//! reported and dropped. A sequence gap or crossed book is reported and
//! answered with an unsubscribe/subscribe pair on the open socket, after which
//! the server sends a fresh snapshot. A socket that closes unexpectedly is
//! reopened up to `max_retries` times; after that the error handler receives
//! [`Error::RetriesExhausted`] and the caller must call `connect()` again.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;

use parking_lot::Mutex;

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use client::{Connector, FeedHandlers, ReconnectConfig, StreamKind, TransportManager};
pub use config::Config;
pub use error::Error;
pub use orderbook::{BookState, PriceLevel};

use client::WsConnector;
use orderbook::{BookManager, PriceChange, PriceDirection, SizeChange, SizeTrend};
use types::{Price, Side, Size};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Order book client for one instrument
///
/// Owns the reconstructed book and the two feed connections. All book
/// accessors take the book lock briefly and return copies.
///
/// # Example
///
/// ```rust,no_run
/// use btse_orderbook::{Config, FeedHandlers, OrderbookClient};
/// use btse_orderbook::types::Side;
///
/// # async fn example() -> btse_orderbook::Result<()> {
/// let handlers = FeedHandlers::new(|_, _| {}, |_| {});
/// let mut client = OrderbookClient::new(Config::new("BTCPFC"), handlers)?;
/// client.connect()?;
///
/// // Later, from a render loop
/// let state = client.state();
/// for level in state.asks.iter().take(10) {
///     let trend = client.classify(level.price, Side::Ask);
///     println!("{:>10} {:>8} {:?}", level.price, level.size, trend);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OrderbookClient {
    config: Config,
    book: Arc<Mutex<BookManager>>,
    transport: TransportManager,
}

impl OrderbookClient {
    /// Create a client that connects to the configured endpoints
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn new(config: Config, handlers: FeedHandlers) -> Result<Self> {
        let connector = Arc::new(WsConnector::new(config.connect_timeout()));
        Self::with_connector(config, handlers, connector)
    }

    /// Create a client that opens sockets through `connector`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn with_connector(
        config: Config,
        handlers: FeedHandlers,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let book = Arc::new(Mutex::new(BookManager::new(config.symbol())));
        let transport = TransportManager::new(
            config.clone(),
            connector,
            book.clone(),
            Arc::new(handlers),
        );

        Ok(Self {
            config,
            book,
            transport,
        })
    }

    /// Open the book and trade subscriptions
    ///
    /// Restarts the feed if it is already running. Must be called from
    /// within a tokio runtime.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()
    }

    /// Close both subscriptions; pending retries become no-ops
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Ask the server for a fresh book snapshot
    ///
    /// Returns `false` if the book socket is not open.
    pub fn resubscribe(&self) -> bool {
        self.transport.resubscribe()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the transport manager
    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    /// Copy of the current book
    pub fn state(&self) -> BookState {
        self.book.lock().snapshot_state()
    }

    /// Check if a snapshot has been applied
    pub fn is_synchronized(&self) -> bool {
        self.book.lock().is_synchronized()
    }

    /// Latest price change per tracked price
    pub fn price_changes(&self) -> Vec<PriceChange> {
        self.book.lock().tracker().price_changes().copied().collect()
    }

    /// Latest size change per tracked price
    pub fn size_changes(&self) -> Vec<SizeChange> {
        self.book.lock().tracker().size_changes().copied().collect()
    }

    /// Changes made by the most recent reconciliation pass, removals included
    pub fn last_changes(&self) -> Vec<PriceChange> {
        self.book.lock().tracker().last_pass().to_vec()
    }

    /// Compare a level's size against its size before the last change
    pub fn classify(&self, price: Price, side: Side) -> SizeTrend {
        self.book.lock().classify(price, side)
    }

    /// Best bid as `(price, size)`
    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.book.lock().book().best_bid()
    }

    /// Best ask as `(price, size)`
    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.book.lock().book().best_ask()
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Option<Price> {
        self.book.lock().book().spread()
    }

    /// Midpoint of best bid and best ask
    pub fn mid_price(&self) -> Option<Price> {
        self.book.lock().book().mid_price()
    }

    /// Direction of the last trade relative to the one before it
    pub fn price_direction(&self) -> PriceDirection {
        self.book.lock().book().price_direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handlers() -> FeedHandlers {
        FeedHandlers::new(|_, _| {}, |_| {})
    }

    #[test]
    fn test_client_creation() {
        let client = OrderbookClient::new(Config::new("BTCPFC"), handlers()).unwrap();
        assert_eq!(client.config().symbol(), "BTCPFC");
        assert!(!client.is_synchronized());
        assert!(client.state().asks.is_empty());
        assert_eq!(client.best_bid(), None);
        assert!(!client.resubscribe());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config::new("BTCPFC").with_trade_url("http://example.com");
        assert!(matches!(
            OrderbookClient::new(config, handlers()),
            Err(Error::Config(_))
        ));
    }
}
