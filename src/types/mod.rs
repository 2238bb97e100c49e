//! Wire and domain types for the BTSE order book feed.
//!
//! - [`messages`] - WebSocket payloads (book envelopes, trade prints, control frames)
//!
//! Prices and sizes arrive as decimal strings on the book topic and as JSON
//! numbers on the trade topic. Both are carried as `f64` past the decoder.

pub mod messages;

use serde::{Deserialize, Serialize};

pub use messages::{BookUpdate, LevelUpdate, Trade, UpdateKind, WsCommand};

/// Price of a level, parsed from the wire as an IEEE-754 double
pub type Price = f64;

/// Resting size at a price level
pub type Size = f64;

/// Server-assigned sequence number of a book update
pub type SeqNum = u64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sell side, best (lowest) price first
    Ask,
    /// Buy side, best (highest) price first
    Bid,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Ask => write!(f, "ask"),
            Side::Bid => write!(f, "bid"),
        }
    }
}
