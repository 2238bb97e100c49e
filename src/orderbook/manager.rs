//! Book reconciliation engine.
//!
//! This module provides [`BookManager`], which owns the local [`Orderbook`]
//! and its [`ChangeTracker`] and applies decoded snapshot/delta messages.
//!
//! # Sequence Tracking
//!
//! A delta must carry `prevSeqNum` equal to the locally held `seqNum`. If it
//! does not, the delta is discarded and the caller is told to resubscribe;
//! the server answers a resubscribe with a fresh snapshot. There is no
//! persisted "desynchronized" state: every later delta is simply checked
//! again against the unchanged `seqNum`.
//!
//! # Crossing
//!
//! After a delta is merged the book is checked for `best bid >= best ask`.
//! The merge is kept, but the caller is told to resubscribe. A snapshot that
//! is crossed on arrival is not applied at all.

use tracing::{debug, warn};

use super::{BookState, ChangeKind, ChangeTracker, Orderbook, SizeTrend};
use crate::error::Error;
use crate::types::messages::{BookUpdate, UpdateKind};
use crate::types::{Price, SeqNum, Side};

/// Synchronization state of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderbookState {
    /// Orderbook has not received its first snapshot
    WaitingForSnapshot,
    /// Orderbook holds a valid sequence number and accepts deltas
    Synchronized,
}

/// Outcome of [`BookManager::apply_update`]
///
/// At most one anomaly is reported per call, so a caller that resubscribes
/// on [`AnomalyStatus::requires_resubscribe`] issues at most one
/// resubscribe per update.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyStatus {
    /// Update merged, book consistent
    Applied,
    /// Delta arrived before any snapshot and was ignored
    AwaitingSnapshot,
    /// Delta did not chain onto the local sequence number and was discarded
    SequenceGap {
        /// Locally held sequence number
        expected: SeqNum,
        /// `prevSeqNum` carried by the delta
        got: SeqNum,
    },
    /// Best bid reached or passed best ask
    CrossedBook {
        /// Best bid price
        best_bid: Price,
        /// Best ask price
        best_ask: Price,
        /// Whether the update was kept (deltas) or rejected (snapshots)
        committed: bool,
    },
}

impl AnomalyStatus {
    /// Whether the feed must be resubscribed to get a fresh snapshot
    pub fn requires_resubscribe(&self) -> bool {
        matches!(
            self,
            AnomalyStatus::SequenceGap { .. } | AnomalyStatus::CrossedBook { .. }
        )
    }

    /// Whether the book changed as a result of the update
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            AnomalyStatus::Applied | AnomalyStatus::CrossedBook { committed: true, .. }
        )
    }

    /// The anomaly as an [`Error`] for the error handler
    pub fn to_error(&self) -> Option<Error> {
        match *self {
            AnomalyStatus::SequenceGap { expected, got } => {
                Some(Error::SequenceGap { expected, got })
            }
            AnomalyStatus::CrossedBook {
                best_bid, best_ask, ..
            } => Some(Error::CrossedBook { best_bid, best_ask }),
            AnomalyStatus::Applied | AnomalyStatus::AwaitingSnapshot => None,
        }
    }
}

/// Reconciliation engine for a single instrument.
///
/// # Thread Safety
///
/// Not internally synchronized. The client keeps it behind one
/// `parking_lot::Mutex` so a whole merge runs under a single lock.
///
/// # Example
///
/// ```rust
/// use btse_orderbook::orderbook::{AnomalyStatus, BookManager};
/// use btse_orderbook::types::BookUpdate;
///
/// let mut manager = BookManager::new("BTCPFC");
/// let _ = manager.apply_update(&BookUpdate::snapshot(100, &[(100.0, 10.0)], &[(99.0, 20.0)]));
///
/// // prevSeqNum 101 does not match the held seqNum 100
/// let status = manager.apply_update(&BookUpdate::delta(102, 101, &[(101.0, 15.0)], &[]));
/// assert_eq!(status, AnomalyStatus::SequenceGap { expected: 100, got: 101 });
/// assert_eq!(manager.book().sequence(), Some(100));
/// ```
#[derive(Debug, Clone)]
pub struct BookManager {
    book: Orderbook,
    tracker: ChangeTracker,
    state: OrderbookState,
}

impl BookManager {
    /// Create a manager with an empty book in `WaitingForSnapshot` state
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            book: Orderbook::new(symbol),
            tracker: ChangeTracker::new(),
            state: OrderbookState::WaitingForSnapshot,
        }
    }

    /// Get the synchronization state
    pub fn state(&self) -> OrderbookState {
        self.state
    }

    /// Check if a snapshot has been applied
    pub fn is_synchronized(&self) -> bool {
        self.state == OrderbookState::Synchronized
    }

    /// The reconstructed book
    pub fn book(&self) -> &Orderbook {
        &self.book
    }

    /// The change hints from the latest passes
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Readable copy of the book
    pub fn snapshot_state(&self) -> BookState {
        self.book.state()
    }

    /// Apply a snapshot or delta
    pub fn apply_update(&mut self, update: &BookUpdate) -> AnomalyStatus {
        match update.kind {
            UpdateKind::Snapshot => self.apply_snapshot(update),
            UpdateKind::Delta => self.apply_delta(update),
        }
    }

    fn apply_snapshot(&mut self, update: &BookUpdate) -> AnomalyStatus {
        if let Err(crossing) = self
            .book
            .apply_snapshot(update.seq_num, &update.asks, &update.bids)
        {
            warn!(
                seq_num = update.seq_num,
                best_bid = crossing.best_bid,
                best_ask = crossing.best_ask,
                "Crossed snapshot rejected"
            );
            return AnomalyStatus::CrossedBook {
                best_bid: crossing.best_bid,
                best_ask: crossing.best_ask,
                committed: false,
            };
        }

        self.tracker.reset();
        for level in self.book.asks() {
            self.tracker
                .record_price_change(level.price, Side::Ask, ChangeKind::Appeared);
        }
        for level in self.book.bids() {
            self.tracker
                .record_price_change(level.price, Side::Bid, ChangeKind::Appeared);
        }
        self.state = OrderbookState::Synchronized;

        let (asks, bids) = self.book.num_levels();
        debug!(seq_num = update.seq_num, asks, bids, "Snapshot applied");
        AnomalyStatus::Applied
    }

    fn apply_delta(&mut self, update: &BookUpdate) -> AnomalyStatus {
        let current = match (self.state, self.book.sequence()) {
            (OrderbookState::Synchronized, Some(seq)) => seq,
            _ => {
                debug!(seq_num = update.seq_num, "Delta before first snapshot ignored");
                return AnomalyStatus::AwaitingSnapshot;
            }
        };

        if update.prev_seq_num != current {
            warn!(
                expected = current,
                got = update.prev_seq_num,
                seq_num = update.seq_num,
                "Sequence gap, delta discarded"
            );
            return AnomalyStatus::SequenceGap {
                expected: current,
                got: update.prev_seq_num,
            };
        }

        self.tracker.begin_pass();
        for event in self.book.merge(&update.asks, &update.bids) {
            self.tracker.record_event(&event);
        }
        self.book.set_sequence(update.seq_num);
        self.evict_stale();

        if let Some(crossing) = self.book.crossing() {
            warn!(
                seq_num = update.seq_num,
                best_bid = crossing.best_bid,
                best_ask = crossing.best_ask,
                "Book crossed after delta"
            );
            return AnomalyStatus::CrossedBook {
                best_bid: crossing.best_bid,
                best_ask: crossing.best_ask,
                committed: true,
            };
        }

        AnomalyStatus::Applied
    }

    /// Evict tracker entries for prices no longer on either side
    fn evict_stale(&mut self) {
        let book = &self.book;
        let stale: Vec<Price> = self
            .tracker
            .tracked_prices()
            .into_iter()
            .filter(|&p| !book.contains(Side::Ask, p) && !book.contains(Side::Bid, p))
            .collect();
        self.tracker.evict(stale);
    }

    /// Compare a level's current size with the size recorded before its last change
    pub fn classify(&self, price: Price, side: Side) -> SizeTrend {
        self.tracker
            .classify(price, side, self.book.size_at(side, price))
    }

    /// Record a trade print
    pub fn update_last_price(&mut self, price: Price) {
        self.book.update_last_price(price);
    }

    /// Drop the book and wait for a new snapshot
    pub fn reset(&mut self) {
        self.book.clear();
        self.tracker.reset();
        self.state = OrderbookState::WaitingForSnapshot;
    }
}
