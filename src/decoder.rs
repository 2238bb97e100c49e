//! Message decoder for the book and trade topics.
//!
//! Turns raw WebSocket text into typed messages. A payload that is not JSON,
//! not an object, or does not match the expected shape becomes a
//! [`DecodeError`]; callers report it and drop the frame. Subscription
//! acknowledgements (`{"event": ...}` without `data`) decode to `None`.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::types::messages::{BookMessage, BookUpdate, Trade, TradeMessage};

/// Reasons a payload is rejected
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Valid JSON but not an object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// Object does not match the topic schema
    #[error("schema mismatch: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Decode a book topic payload
///
/// Returns `Ok(None)` for control acknowledgements.
pub fn decode_book(raw: &str) -> Result<Option<BookUpdate>, DecodeError> {
    let Some(value) = parse_object(raw)? else {
        return Ok(None);
    };
    let message: BookMessage = serde_json::from_value(value).map_err(DecodeError::Schema)?;
    Ok(Some(message.data))
}

/// Decode a trade topic payload, keeping only the first print
///
/// Returns `Ok(None)` for control acknowledgements and empty batches.
pub fn decode_trade(raw: &str) -> Result<Option<Trade>, DecodeError> {
    let Some(value) = parse_object(raw)? else {
        return Ok(None);
    };
    let message: TradeMessage = serde_json::from_value(value).map_err(DecodeError::Schema)?;
    let Some(first) = message.data.into_iter().next() else {
        return Ok(None);
    };
    let trade: Trade = serde_json::from_value(first).map_err(DecodeError::Schema)?;
    Ok(Some(trade))
}

fn parse_object(raw: &str) -> Result<Option<Value>, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotAnObject);
    };

    if !object.contains_key("data") {
        if let Some(event) = object.get("event") {
            debug!(event = %event, "Control acknowledgement");
            return Ok(None);
        }
    }

    Ok(Some(value))
}
