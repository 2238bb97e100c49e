//! Reconnection behavior of the book and trade connections.
//!
//! All tests run on paused tokio time, so the one-second retry delay
//! elapses instantly.

mod common;

use std::time::Duration;

use btse_orderbook::{OrderbookClient, StreamKind};
use common::{mock_config, trade_frame, wait_until, MockConnector, Recorder, BOOK_URL, TRADE_URL};

#[tokio::test(start_paused = true)]
async fn test_retries_stop_after_three_attempts() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    let _trade = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();

    assert!(wait_until(|| !client.transport().is_running(StreamKind::OrderBook)).await);

    // One initial open plus three retries; the fourth close is terminal.
    assert_eq!(connector.attempts(BOOK_URL), 4);
    assert_eq!(
        *recorder.exhausted.lock(),
        vec![(StreamKind::OrderBook, 3)]
    );
    assert_eq!(recorder.errors_containing("Max retries reached for OrderBook"), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(BOOK_URL), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_is_fixed() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempts(BOOK_URL), 1);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(connector.attempts(BOOK_URL), 2);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(connector.attempts(BOOK_URL), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_book_leaves_trades_running() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    let trade = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();

    assert!(wait_until(|| !client.transport().is_running(StreamKind::OrderBook)).await);
    assert!(client.transport().is_open(StreamKind::Trade));
    assert_eq!(connector.attempts(TRADE_URL), 1);

    trade.push(trade_frame(65000.5));
    assert!(wait_until(|| recorder.trades.lock().len() == 1).await);
    assert_eq!(recorder.trades.lock()[0], 65000.5);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    let book = connector.open(BOOK_URL);
    let _trade = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();
    assert!(wait_until(|| client.transport().is_open(StreamKind::OrderBook)).await);

    book.close();
    assert!(wait_until(|| client.transport().retry_count(StreamKind::OrderBook) == 1).await);
    assert!(!client.transport().is_open(StreamKind::OrderBook));

    client.disconnect();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(connector.attempts(BOOK_URL), 1);
    assert!(recorder.exhausted.lock().is_empty());
    assert_eq!(connector.closes(TRADE_URL), 1);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_retry_count() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    connector.fail(BOOK_URL);
    connector.fail(BOOK_URL);
    let book = connector.open(BOOK_URL);
    let _trade = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();

    assert!(wait_until(|| client.transport().is_open(StreamKind::OrderBook)).await);
    assert_eq!(connector.attempts(BOOK_URL), 3);
    assert_eq!(client.transport().retry_count(StreamKind::OrderBook), 0);

    // The budget is whole again: three more failures before giving up.
    book.close();
    assert!(wait_until(|| !client.transport().is_running(StreamKind::OrderBook)).await);
    assert_eq!(connector.attempts(BOOK_URL), 6);
    assert_eq!(*recorder.exhausted.lock(), vec![(StreamKind::OrderBook, 3)]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_subscribes_again() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    let first = connector.open(BOOK_URL);
    let _second = connector.open(BOOK_URL);
    let _trade = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();
    assert!(wait_until(|| connector.sent(BOOK_URL).len() == 1).await);

    first.close();
    assert!(wait_until(|| connector.sent(BOOK_URL).len() == 2).await);

    let subscribe = r#"{"op":"subscribe","args":["update:BTCPFC"]}"#;
    assert_eq!(connector.sent(BOOK_URL), vec![subscribe, subscribe]);
    assert_eq!(connector.attempts(BOOK_URL), 2);
    assert_eq!(client.transport().retry_count(StreamKind::OrderBook), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_again_restarts_both_connections() {
    let connector = MockConnector::new();
    let recorder = Recorder::new();
    let _book_a = connector.open(BOOK_URL);
    let _book_b = connector.open(BOOK_URL);
    let _trade_a = connector.open(TRADE_URL);
    let _trade_b = connector.open(TRADE_URL);

    let mut client =
        OrderbookClient::with_connector(mock_config(), recorder.handlers(), connector.clone())
            .unwrap();
    client.connect().unwrap();
    assert!(wait_until(|| client.transport().is_open(StreamKind::OrderBook)).await);
    assert!(wait_until(|| client.transport().is_open(StreamKind::Trade)).await);

    client.connect().unwrap();
    assert!(
        wait_until(|| connector.closes(BOOK_URL) == 1 && connector.attempts(BOOK_URL) == 2).await
    );
    assert!(wait_until(|| client.transport().is_open(StreamKind::Trade)).await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(BOOK_URL), 2);
    assert_eq!(connector.attempts(TRADE_URL), 2);
    assert!(recorder.errors.lock().is_empty());
}
