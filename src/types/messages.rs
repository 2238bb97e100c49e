//! WebSocket message types.
//!
//! This module contains the control frames sent to BTSE and the payloads
//! received on the book (`update:<SYMBOL>`) and trade
//! (`tradeHistoryApi:<SYMBOL>`) topics.

use serde::{Deserialize, Deserializer, Serialize};

use super::{Price, SeqNum, Size, TimestampMs};

/// Control frame sent to the server
///
/// Serializes as `{"op":"subscribe","args":["update:BTCPFC"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WsCommand {
    /// Start receiving a topic
    Subscribe {
        /// Topic names
        args: Vec<String>,
    },
    /// Stop receiving a topic
    Unsubscribe {
        /// Topic names
        args: Vec<String>,
    },
}

impl WsCommand {
    /// Subscribe to a single topic
    pub fn subscribe(topic: impl Into<String>) -> Self {
        WsCommand::Subscribe {
            args: vec![topic.into()],
        }
    }

    /// Unsubscribe from a single topic
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        WsCommand::Unsubscribe {
            args: vec![topic.into()],
        }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outer envelope of a book topic message
#[derive(Debug, Clone, Deserialize)]
pub struct BookMessage {
    /// Topic the update belongs to
    pub topic: String,
    /// Update payload
    pub data: BookUpdate,
}

/// Kind of book update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Full replacement of both sides
    Snapshot,
    /// Incremental update chained to the previous sequence number
    Delta,
}

/// Snapshot or delta for one instrument
///
/// Price levels are decoded eagerly from `[priceStr, sizeStr]` pairs, so a
/// `BookUpdate` never carries raw strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    /// Snapshot or delta
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Sequence number of this update
    pub seq_num: SeqNum,
    /// Sequence number this delta builds on (ignored for snapshots)
    #[serde(default)]
    pub prev_seq_num: SeqNum,
    /// Ask levels to set
    #[serde(deserialize_with = "deserialize_levels")]
    pub asks: Vec<LevelUpdate>,
    /// Bid levels to set
    #[serde(deserialize_with = "deserialize_levels")]
    pub bids: Vec<LevelUpdate>,
    /// Instrument symbol
    pub symbol: String,
    /// Server timestamp
    pub timestamp: TimestampMs,
}

impl BookUpdate {
    /// Build a snapshot from `(price, size)` pairs
    pub fn snapshot(seq_num: SeqNum, asks: &[(Price, Size)], bids: &[(Price, Size)]) -> Self {
        Self {
            kind: UpdateKind::Snapshot,
            seq_num,
            prev_seq_num: 0,
            asks: LevelUpdate::from_pairs(asks),
            bids: LevelUpdate::from_pairs(bids),
            symbol: String::new(),
            timestamp: 0,
        }
    }

    /// Build a delta from `(price, size)` pairs
    pub fn delta(
        seq_num: SeqNum,
        prev_seq_num: SeqNum,
        asks: &[(Price, Size)],
        bids: &[(Price, Size)],
    ) -> Self {
        Self {
            kind: UpdateKind::Delta,
            seq_num,
            prev_seq_num,
            asks: LevelUpdate::from_pairs(asks),
            bids: LevelUpdate::from_pairs(bids),
            symbol: String::new(),
            timestamp: 0,
        }
    }

    /// Whether this update replaces the whole book
    pub fn is_snapshot(&self) -> bool {
        self.kind == UpdateKind::Snapshot
    }
}

/// A `(price, size)` pair; size zero removes the level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelUpdate {
    /// Level price
    pub price: Price,
    /// New resting size
    pub size: Size,
}

impl LevelUpdate {
    /// Create a level update
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }

    fn from_pairs(pairs: &[(Price, Size)]) -> Vec<Self> {
        pairs.iter().map(|&(price, size)| Self { price, size }).collect()
    }
}

/// Trade topic envelope; only the first print is consumed
///
/// Prints stay untyped here so a malformed print later in the batch does not
/// reject the first one.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeMessage {
    /// Trade prints, most recent first
    pub data: Vec<serde_json::Value>,
}

/// A single trade print
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Trade {
    /// Execution price
    pub price: Price,
    /// Executed size
    pub size: Size,
    /// Execution time; integral floats are accepted
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: TimestampMs,
}

fn parse_number<E: serde::de::Error>(raw: &str, field: &str) -> Result<f64, E> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| E::custom(format!("invalid {} '{}'", field, raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(E::custom(format!("{} out of range '{}'", field, raw)));
    }
    Ok(value)
}

/// Deserialize a millisecond timestamp sent either as an integer or a float
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampMs, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Int(u64),
        Float(f64),
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Int(ms) => Ok(ms),
        RawTimestamp::Float(ms) if ms.is_finite() && ms >= 0.0 => Ok(ms as TimestampMs),
        RawTimestamp::Float(ms) => Err(serde::de::Error::custom(format!(
            "timestamp out of range '{}'",
            ms
        ))),
    }
}

/// Deserialize `[[priceStr, sizeStr], ...]` into numeric levels
fn deserialize_levels<'de, D>(deserializer: D) -> Result<Vec<LevelUpdate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<(String, String)> = Deserialize::deserialize(deserializer)?;
    raw.iter()
        .map(|(price, size)| {
            Ok(LevelUpdate {
                price: parse_number(price, "price")?,
                size: parse_number(size, "size")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_command_serialization() {
        let json = WsCommand::subscribe("update:BTCPFC").to_json().unwrap();
        assert_eq!(json, r#"{"op":"subscribe","args":["update:BTCPFC"]}"#);
    }

    #[test]
    fn test_unsubscribe_command_serialization() {
        let json = WsCommand::unsubscribe("update:BTCPFC").to_json().unwrap();
        assert_eq!(json, r#"{"op":"unsubscribe","args":["update:BTCPFC"]}"#);
    }

    #[test]
    fn test_book_message_deserialization() {
        let json = r#"{
            "topic": "update:BTCPFC",
            "data": {
                "bids": [["64999.5", "1.25"]],
                "asks": [["65000.0", "0.5"], ["65000.5", "0"]],
                "seqNum": 42,
                "prevSeqNum": 41,
                "type": "delta",
                "symbol": "BTCPFC",
                "timestamp": 1718000000000
            }
        }"#;

        let msg: BookMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.topic, "update:BTCPFC");
        assert_eq!(msg.data.kind, UpdateKind::Delta);
        assert_eq!(msg.data.seq_num, 42);
        assert_eq!(msg.data.prev_seq_num, 41);
        assert_eq!(msg.data.bids, vec![LevelUpdate::new(64999.5, 1.25)]);
        assert_eq!(msg.data.asks[1], LevelUpdate::new(65000.5, 0.0));
    }

    #[test]
    fn test_level_with_garbage_price_is_rejected() {
        let json = r#"{
            "type": "snapshot", "seqNum": 1, "prevSeqNum": 0,
            "asks": [["abc", "1"]], "bids": [],
            "symbol": "BTCPFC", "timestamp": 0
        }"#;
        let err = serde_json::from_str::<BookUpdate>(json).unwrap_err();
        assert!(err.to_string().contains("invalid price"));
    }

    #[test]
    fn test_negative_size_is_rejected() {
        let json = r#"{
            "type": "delta", "seqNum": 2, "prevSeqNum": 1,
            "asks": [], "bids": [["100", "-3"]],
            "symbol": "BTCPFC", "timestamp": 0
        }"#;
        assert!(serde_json::from_str::<BookUpdate>(json).is_err());
    }

    #[test]
    fn test_trade_message_ignores_extra_fields() {
        let json = r#"{
            "topic": "tradeHistoryApi:BTCPFC",
            "data": [{"price": 65010.5, "size": 2, "timestamp": 1718000000001, "side": "BUY"}]
        }"#;
        let msg: TradeMessage = serde_json::from_str(json).unwrap();
        let trade: Trade = serde_json::from_value(msg.data[0].clone()).unwrap();
        assert_eq!(trade.price, 65010.5);
        assert_eq!(trade.size, 2.0);
    }

    #[test]
    fn test_trade_timestamp_accepts_float() {
        let json = r#"{"price": 65010.5, "size": 2, "timestamp": 1718000000000.0}"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.timestamp, 1_718_000_000_000);

        let json = r#"{"price": 65010.5, "size": 2, "timestamp": -5.0}"#;
        assert!(serde_json::from_str::<Trade>(json).is_err());
    }
}
