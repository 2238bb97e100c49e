//! One logical subscription with bounded reconnection.
//!
//! Each connection is a spawned supervisor task that opens a socket,
//! subscribes its topic and feeds every frame to a [`MessageHandler`]. When
//! the socket ends without a manual disconnect, the supervisor waits
//! [`ReconnectConfig::delay_for_attempt`] and opens a new socket, up to
//! `max_retries` times. The retry counter resets once a socket opens.
//!
//! The retry delay is a `tokio::time::sleep` inside the task, so it never
//! blocks the other connection. The manual-disconnect flag is checked at the
//! top of every attempt; a retry that wakes up after `disconnect()` does
//! nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handlers::{Directive, FeedHandlers, MessageHandler};
use super::transport::{Connector, Transport, TransportError};
use crate::error::Error;
use crate::types::messages::WsCommand;

/// Which subscription a connection carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// `update:<SYMBOL>` snapshots and deltas
    OrderBook,
    /// `tradeHistoryApi:<SYMBOL>` prints
    Trade,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::OrderBook => write!(f, "OrderBook"),
            StreamKind::Trade => write!(f, "Trade"),
        }
    }
}

/// Configuration for reconnection behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up (0 = never retry)
    pub max_retries: u32,
    /// Delay before the first reconnection attempt
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt (1.0 = fixed delay)
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay in milliseconds
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given retry attempt (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Flags shared between a running connection and the transport manager
#[derive(Debug, Default)]
pub(crate) struct ConnectionShared {
    retry_count: AtomicU32,
    manual_disconnect: AtomicBool,
    open: AtomicBool,
}

impl ConnectionShared {
    fn is_manual(&self) -> bool {
        self.manual_disconnect.load(Ordering::SeqCst)
    }
}

/// Requests sent to a running connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Unsubscribe then subscribe on the open socket
    Resubscribe,
    /// Close the socket and stop
    Close,
}

/// Everything a supervisor needs to run one subscription
pub(crate) struct ConnectionParams {
    pub(crate) stream: StreamKind,
    pub(crate) url: String,
    pub(crate) topic: String,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) handler: Box<dyn MessageHandler>,
    pub(crate) handlers: Arc<FeedHandlers>,
}

/// Manager-side handle to a running connection
pub(crate) struct Connection {
    stream: StreamKind,
    shared: Arc<ConnectionShared>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawn the supervisor task on the current tokio runtime
    pub(crate) fn spawn(params: ConnectionParams) -> Self {
        let shared = Arc::new(ConnectionShared::default());
        let (commands, receiver) = mpsc::unbounded_channel();
        let stream = params.stream;

        let supervisor = Supervisor {
            params,
            shared: shared.clone(),
            commands: receiver,
        };
        let task = tokio::spawn(supervisor.run());

        Self {
            stream,
            shared,
            commands,
            task,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.shared.retry_count.load(Ordering::SeqCst)
    }

    /// Whether the supervisor has stopped for good
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask for a resubscribe; `false` when no socket is open
    pub(crate) fn resubscribe(&self) -> bool {
        if !self.is_open() {
            debug!(stream = %self.stream, "Resubscribe skipped, socket not open");
            return false;
        }
        self.commands.send(Command::Resubscribe).is_ok()
    }

    /// Suppress retries and close the socket
    pub(crate) fn close(self) {
        self.shared.manual_disconnect.store(true, Ordering::SeqCst);
        self.shared.open.store(false, Ordering::SeqCst);
        // The supervisor may already be gone; the flag is enough then.
        let _ = self.commands.send(Command::Close);
        debug!(stream = %self.stream, "Connection released");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("open", &self.is_open())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

/// How a socket session ended
enum SessionEnd {
    Manual,
    Unexpected,
}

enum SessionEvent {
    Command(Option<Command>),
    Frame(Result<Option<String>, TransportError>),
}

struct Supervisor {
    params: ConnectionParams,
    shared: Arc<ConnectionShared>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Supervisor {
    async fn run(mut self) {
        let stream = self.params.stream;

        loop {
            if self.shared.is_manual() {
                debug!(%stream, "Manual disconnect, supervisor stopping");
                return;
            }

            let connected = self.params.connector.connect(&self.params.url).await;
            match connected {
                Ok(transport) => {
                    if let SessionEnd::Manual = self.session(transport).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(%stream, error = %e, "Failed to open socket");
                    self.params.handlers.report(&Error::Transport(e));
                }
            }
            self.shared.open.store(false, Ordering::SeqCst);

            if self.shared.is_manual() {
                return;
            }

            let attempts = self.shared.retry_count.load(Ordering::SeqCst);
            if attempts >= self.params.reconnect.max_retries {
                error!(%stream, attempts, "Max retries reached, giving up");
                self.params
                    .handlers
                    .report(&Error::RetriesExhausted { stream, attempts });
                return;
            }

            let delay = self.params.reconnect.delay_for_attempt(attempts);
            self.shared.retry_count.store(attempts + 1, Ordering::SeqCst);
            warn!(
                %stream,
                attempt = attempts + 1,
                max_retries = self.params.reconnect.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Socket closed unexpectedly, scheduling reconnect"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn session(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        let stream = self.params.stream;

        // Commands queued for a previous socket do not apply to this one.
        while let Ok(command) = self.commands.try_recv() {
            if command == Command::Close {
                self.shared.manual_disconnect.store(true, Ordering::SeqCst);
            }
        }
        if self.shared.is_manual() {
            let _ = transport.close().await;
            return SessionEnd::Manual;
        }

        self.shared.retry_count.store(0, Ordering::SeqCst);
        self.shared.open.store(true, Ordering::SeqCst);

        let subscribe = WsCommand::subscribe(self.params.topic.as_str());
        if let Err(e) = send_command(transport.as_mut(), &subscribe).await {
            warn!(%stream, error = %e, "Subscribe failed");
            self.params.handlers.report(&e);
            return SessionEnd::Unexpected;
        }
        info!(%stream, topic = %self.params.topic, "Subscribed");

        loop {
            let event = tokio::select! {
                command = self.commands.recv() => SessionEvent::Command(command),
                frame = transport.recv() => SessionEvent::Frame(frame),
            };

            let resubscribe = match event {
                SessionEvent::Command(Some(Command::Resubscribe)) => true,
                SessionEvent::Command(Some(Command::Close)) | SessionEvent::Command(None) => {
                    if let Err(e) = transport.close().await {
                        debug!(%stream, error = %e, "Close handshake failed");
                    }
                    info!(%stream, "Disconnected");
                    return SessionEnd::Manual;
                }
                SessionEvent::Frame(Ok(Some(text))) => {
                    self.params.handler.on_message(&text) == Directive::Resubscribe
                }
                SessionEvent::Frame(Ok(None)) => {
                    if self.shared.is_manual() {
                        return SessionEnd::Manual;
                    }
                    warn!(%stream, "Socket closed by peer");
                    return SessionEnd::Unexpected;
                }
                SessionEvent::Frame(Err(e)) => {
                    if self.shared.is_manual() {
                        return SessionEnd::Manual;
                    }
                    warn!(%stream, error = %e, "Socket error");
                    self.params.handlers.report(&Error::Transport(e));
                    return SessionEnd::Unexpected;
                }
            };

            if resubscribe {
                if let Err(e) = resubscribe_topic(transport.as_mut(), &self.params.topic).await {
                    warn!(%stream, error = %e, "Resubscribe failed");
                    self.params.handlers.report(&e);
                    return SessionEnd::Unexpected;
                }
                info!(%stream, topic = %self.params.topic, "Resubscribed");
            }
        }
    }
}

/// Unsubscribe then subscribe on the same socket so the server resends a snapshot
async fn resubscribe_topic(transport: &mut dyn Transport, topic: &str) -> Result<(), Error> {
    send_command(transport, &WsCommand::unsubscribe(topic)).await?;
    send_command(transport, &WsCommand::subscribe(topic)).await
}

async fn send_command(transport: &mut dyn Transport, command: &WsCommand) -> Result<(), Error> {
    let json = command.to_json()?;
    transport.send(&json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reconnect_config_builder() {
        let config = ReconnectConfig::new()
            .max_retries(5)
            .initial_delay_ms(50)
            .max_delay_ms(10_000)
            .backoff_multiplier(1.5);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 50);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!((config.backoff_multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_delay_is_fixed() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_calculation() {
        let config = ReconnectConfig::new()
            .initial_delay_ms(100)
            .backoff_multiplier(2.0)
            .max_delay_ms(1000);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        // Should cap at max_delay_ms
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_stream_kind_display() {
        assert_eq!(StreamKind::OrderBook.to_string(), "OrderBook");
        assert_eq!(StreamKind::Trade.to_string(), "Trade");
    }
}
