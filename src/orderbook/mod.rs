//! Local order book reconstruction.
//!
//! This module rebuilds a single instrument's book from BTSE snapshot and
//! delta messages:
//!
//! - [`book`] - sorted price levels with cumulative totals and depth ratios
//! - [`change_tracker`] - per-price "what just changed" hints for renderers
//! - [`manager`] - the reconciliation engine (sequence and crossing checks)
//!
//! # Example
//!
//! ```rust
//! use btse_orderbook::orderbook::BookManager;
//! use btse_orderbook::types::BookUpdate;
//!
//! let mut manager = BookManager::new("BTCPFC");
//!
//! let snapshot = BookUpdate::snapshot(100, &[(100.0, 10.0)], &[(99.0, 20.0)]);
//! let status = manager.apply_update(&snapshot);
//! assert!(!status.requires_resubscribe());
//!
//! let best_ask = manager.book().best_ask_level().unwrap();
//! assert_eq!(best_ask.total, 10.0);
//! ```

pub mod book;
pub mod change_tracker;
pub mod manager;

pub use book::{Crossing, LevelEvent, Orderbook};
pub use change_tracker::{ChangeKind, ChangeTracker, PriceChange, SizeChange, SizeTrend};
pub use manager::{AnomalyStatus, BookManager, OrderbookState};

use serde::Serialize;

use crate::types::{Price, SeqNum, Size};

/// One row of a book side as exposed to readers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Resting size at this price
    pub size: Size,
    /// Cumulative size from the best price out to this level
    pub total: Size,
    /// `total` divided by the largest total on either side, in `[0, 1]`
    pub percentage_of_max_total: f64,
}

/// Readable copy of the book
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookState {
    /// Asks, best (lowest) first
    pub asks: Vec<PriceLevel>,
    /// Bids, best (highest) first
    pub bids: Vec<PriceLevel>,
    /// Last accepted sequence number (0 before the first snapshot)
    pub seq_num: SeqNum,
    /// Most recent trade price
    pub last_price: Price,
    /// Trade price before `last_price`
    pub previous_price: Price,
}

impl BookState {
    /// Best ask level
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Best bid level
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }
}

/// Direction of the last trade relative to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    /// Last trade printed above the previous one
    Up,
    /// Last trade printed below the previous one
    Down,
    /// Same price, or no previous trade
    Unchanged,
}
