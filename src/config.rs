//! Configuration for the BTSE order book feed.
//!
//! This module provides the [`Config`] struct holding the instrument, the
//! two WebSocket endpoints and the reconnection policy.

use std::env;
use std::time::Duration;

use url::Url;

use crate::client::ReconnectConfig;
use crate::error::Error;

/// Default instrument
pub const DEFAULT_SYMBOL: &str = "BTCPFC";

/// Default endpoint for the book topic
pub const DEFAULT_BOOK_URL: &str = "wss://ws.btse.com/ws/oss/futures";

/// Default endpoint for the trade topic
pub const DEFAULT_TRADE_URL: &str = "wss://ws.btse.com/ws/futures";

/// Configuration for the order book client
///
/// # Example
///
/// ```rust
/// use btse_orderbook::Config;
/// use btse_orderbook::client::ReconnectConfig;
///
/// let config = Config::new("ETHPFC");
/// assert_eq!(config.book_topic(), "update:ETHPFC");
///
/// // Point at a local gateway and retry more often
/// let config = Config::new("BTCPFC")
///     .with_book_url("ws://127.0.0.1:9000/book")
///     .with_reconnect(ReconnectConfig::new().max_retries(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Instrument symbol, e.g. `BTCPFC`
    symbol: String,

    /// Endpoint serving `update:<SYMBOL>`
    book_url: String,

    /// Endpoint serving `tradeHistoryApi:<SYMBOL>`
    trade_url: String,

    /// Retry policy applied to each connection independently
    reconnect: ReconnectConfig,

    /// WebSocket handshake timeout
    connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOL)
    }
}

impl Config {
    /// Create a configuration for `symbol` with the public BTSE endpoints
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            book_url: DEFAULT_BOOK_URL.to_string(),
            trade_url: DEFAULT_TRADE_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Reads `BTSE_SYMBOL`, `BTSE_BOOK_WS_URL`, `BTSE_TRADE_WS_URL`,
    /// `BTSE_MAX_RETRIES` and `BTSE_RETRY_DELAY_MS`; unset variables keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is unparseable or the result
    /// fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let symbol = lookup("BTSE_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
        let mut config = Self::new(symbol);

        if let Some(url) = lookup("BTSE_BOOK_WS_URL") {
            config.book_url = url;
        }
        if let Some(url) = lookup("BTSE_TRADE_WS_URL") {
            config.trade_url = url;
        }
        if let Some(raw) = lookup("BTSE_MAX_RETRIES") {
            config.reconnect.max_retries = parse_var("BTSE_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("BTSE_RETRY_DELAY_MS") {
            config.reconnect.initial_delay_ms = parse_var("BTSE_RETRY_DELAY_MS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the book endpoint
    #[must_use]
    pub fn with_book_url(mut self, url: impl Into<String>) -> Self {
        self.book_url = url.into();
        self
    }

    /// Set the trade endpoint
    #[must_use]
    pub fn with_trade_url(mut self, url: impl Into<String>) -> Self {
        self.trade_url = url.into();
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the WebSocket handshake timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Check the symbol and both endpoints
    pub fn validate(&self) -> Result<(), Error> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config("symbol must not be empty".to_string()));
        }
        for url in [&self.book_url, &self.trade_url] {
            let parsed = Url::parse(url)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(Error::Config(format!(
                    "expected a ws:// or wss:// URL, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }

    /// Get the instrument symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the book endpoint
    pub fn book_url(&self) -> &str {
        &self.book_url
    }

    /// Get the trade endpoint
    pub fn trade_url(&self) -> &str {
        &self.trade_url
    }

    /// Get the retry policy
    pub fn reconnect(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    /// Get the handshake timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Book topic name, `update:<SYMBOL>`
    pub fn book_topic(&self) -> String {
        format!("update:{}", self.symbol)
    }

    /// Trade topic name, `tradeHistoryApi:<SYMBOL>`
    pub fn trade_topic(&self) -> String {
        format!("tradeHistoryApi:{}", self.symbol)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: '{}'", key, raw)))
}
