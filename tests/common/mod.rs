//! Shared fixtures for integration tests
//!
//! [`MockConnector`] hands out scripted in-memory sockets per URL and records
//! every frame the client sends. [`Recorder`] collects callback output.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btse_orderbook::client::{Connector, Transport, TransportError};
use btse_orderbook::{BookState, Config, Error, FeedHandlers, ReconnectConfig, StreamKind};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const BOOK_URL: &str = "ws://mock/book";
pub const TRADE_URL: &str = "ws://mock/trade";

/// Config pointing at the mock endpoints with the default retry policy
pub fn mock_config() -> Config {
    Config::new("BTCPFC")
        .with_book_url(BOOK_URL)
        .with_trade_url(TRADE_URL)
        .with_reconnect(ReconnectConfig::default())
}

/// Book topic frame
pub fn book_frame(kind: &str, seq: u64, prev: u64, asks: &str, bids: &str) -> String {
    format!(
        r#"{{"topic":"update:BTCPFC","data":{{"bids":{bids},"asks":{asks},"seqNum":{seq},"prevSeqNum":{prev},"type":"{kind}","symbol":"BTCPFC","timestamp":1718000000000}}}}"#
    )
}

/// Trade topic frame with a single print
pub fn trade_frame(price: f64) -> String {
    format!(
        r#"{{"topic":"tradeHistoryApi:BTCPFC","data":[{{"price":{price},"size":1,"timestamp":1718000000000}}]}}"#
    )
}

/// Poll `cond` on virtual time until it holds or ten seconds pass
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..2_000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

enum Script {
    Fail,
    Open(mpsc::UnboundedReceiver<Option<String>>),
}

#[derive(Default)]
struct Endpoint {
    scripts: VecDeque<Script>,
    attempts: u32,
    closes: u32,
    sent: Vec<String>,
}

/// Scripted connector; an endpoint with no script left refuses connections
#[derive(Default)]
pub struct MockConnector {
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
}

/// Server side of a scripted socket
pub struct SocketControl {
    frames: mpsc::UnboundedSender<Option<String>>,
}

impl SocketControl {
    /// Deliver a text frame to the client
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.frames.send(Some(frame.into()));
    }

    /// Close the socket from the server side
    pub fn close(&self) {
        let _ = self.frames.send(None);
    }
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a refused connection for `url`
    pub fn fail(&self, url: &str) {
        self.endpoints
            .lock()
            .entry(url.to_string())
            .or_default()
            .scripts
            .push_back(Script::Fail);
    }

    /// Queue a successful connection for `url`
    pub fn open(&self, url: &str) -> SocketControl {
        let (frames, incoming) = mpsc::unbounded_channel();
        self.endpoints
            .lock()
            .entry(url.to_string())
            .or_default()
            .scripts
            .push_back(Script::Open(incoming));
        SocketControl { frames }
    }

    /// Connection attempts made to `url`
    pub fn attempts(&self, url: &str) -> u32 {
        self.endpoints.lock().get(url).map_or(0, |e| e.attempts)
    }

    /// Client-initiated closes on `url`
    pub fn closes(&self, url: &str) -> u32 {
        self.endpoints.lock().get(url).map_or(0, |e| e.closes)
    }

    /// Frames the client sent to `url`, across all sockets
    pub fn sent(&self, url: &str) -> Vec<String> {
        self.endpoints
            .lock()
            .get(url)
            .map_or_else(Vec::new, |e| e.sent.clone())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let script = {
            let mut endpoints = self.endpoints.lock();
            let endpoint = endpoints.entry(url.to_string()).or_default();
            endpoint.attempts += 1;
            endpoint.scripts.pop_front().unwrap_or(Script::Fail)
        };

        match script {
            Script::Fail => Err(TransportError::ConnectionFailed(format!(
                "mock refused {}",
                url
            ))),
            Script::Open(incoming) => Ok(Box::new(MockTransport {
                url: url.to_string(),
                incoming,
                endpoints: self.endpoints.clone(),
            })),
        }
    }
}

struct MockTransport {
    url: String,
    incoming: mpsc::UnboundedReceiver<Option<String>>,
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.endpoints
            .lock()
            .entry(self.url.clone())
            .or_default()
            .sent
            .push(message.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.incoming.recv().await {
            Some(frame) => Ok(frame),
            // Control dropped: the socket just stays quiet.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.endpoints
            .lock()
            .entry(self.url.clone())
            .or_default()
            .closes += 1;
        Ok(())
    }
}

/// Collects everything the client reports through its callbacks
#[derive(Default)]
pub struct Recorder {
    pub books: Mutex<Vec<BookState>>,
    pub trades: Mutex<Vec<f64>>,
    pub errors: Mutex<Vec<String>>,
    pub exhausted: Mutex<Vec<(StreamKind, u32)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handlers(self: &Arc<Self>) -> FeedHandlers {
        let (books, trades, errors) = (self.clone(), self.clone(), self.clone());
        FeedHandlers::new(
            move |_, state| books.books.lock().push(state.clone()),
            move |price| trades.trades.lock().push(price),
        )
        .with_error_handler(move |err| {
            if let Error::RetriesExhausted { stream, attempts } = err {
                errors.exhausted.lock().push((*stream, *attempts));
            }
            errors.errors.lock().push(err.to_string());
        })
    }

    pub fn book_count(&self) -> usize {
        self.books.lock().len()
    }

    pub fn errors_containing(&self, needle: &str) -> usize {
        self.errors
            .lock()
            .iter()
            .filter(|e| e.contains(needle))
            .count()
    }
}
