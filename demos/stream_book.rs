//! Live order book stream - prints the top of book as it changes
//!
//! Usage:
//!   cargo run --example stream_book
//!
//! Optional:
//!   BTSE_SYMBOL=ETHPFC          # Instrument (default: BTCPFC)
//!   BTSE_BOOK_WS_URL=wss://...  # Book endpoint override
//!   BTSE_TRADE_WS_URL=wss://... # Trade endpoint override
//!   RUST_LOG=btse_orderbook=debug

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btse_orderbook::orderbook::BookState;
use btse_orderbook::{Config, FeedHandlers, OrderbookClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("btse_orderbook=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    println!("=== BTSE Order Book: {} ===\n", config.symbol());

    let updates = Arc::new(AtomicU64::new(0));
    let counter = updates.clone();

    let handlers = FeedHandlers::new(
        move |update, state| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if update.is_snapshot() || n % 25 == 0 {
                print_book_summary(state);
            }
        },
        |price| println!("[TRADE] {}", price),
    )
    .with_error_handler(|err| {
        if err.is_terminal() {
            eprintln!("[FATAL] {} - restart required", err);
        } else {
            eprintln!("[ERROR] {}", err);
        }
    });

    let mut client = OrderbookClient::new(config, handlers)?;
    client.connect()?;

    println!("(Press Ctrl+C to stop)\n");
    let start_time = std::time::Instant::now();
    let mut stats = tokio::time::interval(Duration::from_secs(15));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats.tick() => {
                let elapsed = start_time.elapsed().as_secs_f64();
                let count = updates.load(Ordering::Relaxed);
                println!(
                    "\n--- {} book updates in {:.1}s ({:.1}/s), synchronized: {} ---\n",
                    count,
                    elapsed,
                    count as f64 / elapsed.max(1.0),
                    client.is_synchronized()
                );
            }
        }
    }

    client.disconnect();
    println!("Disconnected.");
    Ok(())
}

fn print_book_summary(state: &BookState) {
    println!("seq {} | last {}", state.seq_num, state.last_price);
    for level in state.asks.iter().take(5).rev() {
        println!(
            "  ask {:>12.2} {:>10.4} {:>10.4} {:>5.1}%",
            level.price,
            level.size,
            level.total,
            level.percentage_of_max_total * 100.0
        );
    }
    for level in state.bids.iter().take(5) {
        println!(
            "  bid {:>12.2} {:>10.4} {:>10.4} {:>5.1}%",
            level.price,
            level.size,
            level.total,
            level.percentage_of_max_total * 100.0
        );
    }
    println!();
}
