//! Error types for the btse-orderbook crate.
//!
//! Every failure the feed can hit is one variant of [`Error`]: malformed
//! payloads, book anomalies that force a resubscribe, socket failures and
//! exhausted reconnect budgets. None of them abort the process; they are
//! delivered to the error handler registered on the client.

use std::fmt;

use crate::client::{StreamKind, TransportError};
use crate::decoder::DecodeError;

/// The main error type for this crate
#[derive(Debug)]
pub enum Error {
    /// JSON serialization error
    Json(serde_json::Error),

    /// Payload could not be decoded into a typed message
    Decode(DecodeError),

    /// Invalid configuration (bad URL, missing symbol)
    Config(String),

    /// Delta does not chain onto the local sequence number
    SequenceGap {
        /// Sequence number held locally
        expected: u64,
        /// `prevSeqNum` carried by the delta
        got: u64,
    },

    /// Best bid is not strictly below best ask
    CrossedBook {
        /// Best bid price
        best_bid: f64,
        /// Best ask price
        best_ask: f64,
    },

    /// A logical connection gave up after its retry budget
    RetriesExhausted {
        /// Which subscription failed
        stream: StreamKind,
        /// Retries made before giving up
        attempts: u32,
    },

    /// Socket-level failure
    Transport(TransportError),
}

impl Error {
    /// Whether this error means the book must be re-synced from a snapshot
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Error::SequenceGap { .. } | Error::CrossedBook { .. })
    }

    /// Whether recovery requires an explicit `connect()` from the caller
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::SequenceGap { expected, got } => {
                write!(f, "Sequence gap: expected prevSeqNum {}, got {}", expected, got)
            }
            Error::CrossedBook { best_bid, best_ask } => {
                write!(f, "Crossed book: best bid {} >= best ask {}", best_bid, best_ask)
            }
            Error::RetriesExhausted { stream, attempts } => {
                write!(f, "Max retries reached for {} WebSocket ({} attempts)", stream, attempts)
            }
            Error::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {}", err))
    }
}
