//! Caller callbacks and per-topic message dispatch.
//!
//! [`FeedHandlers`] holds the callbacks supplied by the application. The
//! connection supervisor hands every text frame to a [`MessageHandler`]:
//! [`BookHandler`] for the book topic and [`TradeHandler`] for trades.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::decoder::{decode_book, decode_trade};
use crate::error::Error;
use crate::orderbook::{BookManager, BookState};
use crate::types::messages::BookUpdate;
use crate::types::Price;

/// Called with each applied book update and the book after it
pub type BookCallback = Box<dyn Fn(&BookUpdate, &BookState) + Send + Sync>;
/// Called with the price of each trade print
pub type TradeCallback = Box<dyn Fn(Price) + Send + Sync>;
/// Called with every reported error or anomaly
pub type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

/// Application callbacks
///
/// # Example
///
/// ```rust
/// use btse_orderbook::FeedHandlers;
///
/// let handlers = FeedHandlers::new(
///     |_update, state| println!("{} asks", state.asks.len()),
///     |price| println!("trade at {}", price),
/// )
/// .with_error_handler(|err| eprintln!("feed error: {}", err));
/// ```
pub struct FeedHandlers {
    on_book: BookCallback,
    on_trade: TradeCallback,
    on_error: Option<ErrorCallback>,
}

impl FeedHandlers {
    /// Create handlers from the book and trade callbacks
    pub fn new<B, T>(on_book: B, on_trade: T) -> Self
    where
        B: Fn(&BookUpdate, &BookState) + Send + Sync + 'static,
        T: Fn(Price) + Send + Sync + 'static,
    {
        Self {
            on_book: Box::new(on_book),
            on_trade: Box::new(on_trade),
            on_error: None,
        }
    }

    /// Set the error sink
    pub fn with_error_handler<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Deliver an error to the error sink, or log it when none is set
    pub(crate) fn report(&self, err: &Error) {
        match &self.on_error {
            Some(on_error) => on_error(err),
            None => warn!(error = %err, "Unhandled feed error"),
        }
    }

    pub(crate) fn book(&self, update: &BookUpdate, state: &BookState) {
        (self.on_book)(update, state)
    }

    pub(crate) fn trade(&self, price: Price) {
        (self.on_trade)(price)
    }
}

impl fmt::Debug for FeedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandlers")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// What the connection should do after a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading
    Continue,
    /// Send unsubscribe then subscribe on the current socket
    Resubscribe,
}

/// Consumes the text frames of one subscription
pub trait MessageHandler: Send {
    /// Handle one frame
    fn on_message(&mut self, raw: &str) -> Directive;
}

/// Book topic: decode, reconcile, notify
pub struct BookHandler {
    manager: Arc<Mutex<BookManager>>,
    handlers: Arc<FeedHandlers>,
}

impl BookHandler {
    /// Create a handler writing into `manager`
    pub fn new(manager: Arc<Mutex<BookManager>>, handlers: Arc<FeedHandlers>) -> Self {
        Self { manager, handlers }
    }
}

impl MessageHandler for BookHandler {
    fn on_message(&mut self, raw: &str) -> Directive {
        let update = match decode_book(raw) {
            Ok(Some(update)) => update,
            Ok(None) => return Directive::Continue,
            Err(e) => {
                debug!(error = %e, "Dropping undecodable book frame");
                self.handlers.report(&Error::Decode(e));
                return Directive::Continue;
            }
        };

        // Merge under one lock, notify outside it.
        let (status, state) = {
            let mut manager = self.manager.lock();
            let status = manager.apply_update(&update);
            let state = status.is_applied().then(|| manager.snapshot_state());
            (status, state)
        };

        if let Some(state) = state {
            self.handlers.book(&update, &state);
        }
        if let Some(err) = status.to_error() {
            self.handlers.report(&err);
        }

        if status.requires_resubscribe() {
            Directive::Resubscribe
        } else {
            Directive::Continue
        }
    }
}

/// Trade topic: decode, record last price, notify
pub struct TradeHandler {
    manager: Arc<Mutex<BookManager>>,
    handlers: Arc<FeedHandlers>,
}

impl TradeHandler {
    /// Create a handler recording prints into `manager`
    pub fn new(manager: Arc<Mutex<BookManager>>, handlers: Arc<FeedHandlers>) -> Self {
        Self { manager, handlers }
    }
}

impl MessageHandler for TradeHandler {
    fn on_message(&mut self, raw: &str) -> Directive {
        match decode_trade(raw) {
            Ok(Some(trade)) => {
                self.manager.lock().update_last_price(trade.price);
                self.handlers.trade(trade.price);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, "Dropping undecodable trade frame");
                self.handlers.report(&Error::Decode(e));
            }
        }
        Directive::Continue
    }
}
