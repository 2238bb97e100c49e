//! Core orderbook data structure.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(1) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered iteration for the cumulative-total walk
//!
//! Derived rows ([`PriceLevel`]) are rebuilt once per merge rather than per
//! level, so a delta touching many prices costs one walk of each side.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use super::{BookState, PriceDirection, PriceLevel};
use crate::types::messages::LevelUpdate;
use crate::types::{Price, SeqNum, Side, Size};

pub(crate) type PriceKey = OrderedFloat<Price>;

/// What a single level update did to the book
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelChange {
    /// Price was not on the book before
    Appeared,
    /// Size went up from `prev`
    Increased {
        /// Size before the update
        prev: Size,
    },
    /// Size went down from `prev`
    Decreased {
        /// Size before the update
        prev: Size,
    },
    /// Level was deleted; it held `prev`
    Removed {
        /// Size before the update
        prev: Size,
    },
}

/// A level change tagged with where it happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEvent {
    /// Side of the book
    pub side: Side,
    /// Price of the level
    pub price: Price,
    /// What happened
    pub change: LevelChange,
}

/// Best bid and ask of a crossed book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Best bid price
    pub best_bid: Price,
    /// Best ask price
    pub best_ask: Price,
}

/// Price-level book for a single BTSE instrument.
///
/// # Design Decisions
///
/// 1. **`OrderedFloat` keys**: prices are parsed `f64` values. Wrapping them
///    gives a total order so they can key a `BTreeMap`; comparisons stay exact.
///
/// 2. **Zero means absent**: a level is never stored with size zero. Both the
///    snapshot loader and the delta merge prune on write.
///
/// 3. **Cached rows**: `ask_levels` / `bid_levels` hold totals and depth
///    ratios as of the last [`Orderbook::merge`] or snapshot.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The
/// [`BookManager`](super::BookManager) is meant to sit behind a single
/// `parking_lot::Mutex`.
#[derive(Debug, Clone)]
pub struct Orderbook {
    /// Instrument symbol
    symbol: String,

    /// Ask levels: price -> size
    /// Sorted ascending by price (best ask = lowest = first)
    asks: BTreeMap<PriceKey, Size>,

    /// Bid levels: price -> size
    /// Sorted ascending by price (best bid = highest = last)
    bids: BTreeMap<PriceKey, Size>,

    ask_levels: Vec<PriceLevel>,
    bid_levels: Vec<PriceLevel>,

    /// Last accepted sequence number, `None` until the first snapshot
    sequence: Option<SeqNum>,

    last_price: Price,
    previous_price: Price,
}

impl Orderbook {
    /// Create a new empty orderbook for the given instrument
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            ask_levels: Vec::new(),
            bid_levels: Vec::new(),
            sequence: None,
            last_price: 0.0,
            previous_price: 0.0,
        }
    }

    /// Get the instrument symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the last accepted sequence number
    #[must_use]
    pub const fn sequence(&self) -> Option<SeqNum> {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: SeqNum) {
        self.sequence = Some(sequence);
    }

    /// Replace both sides from a snapshot
    ///
    /// Zero-size entries are dropped. If the resulting book would be crossed
    /// nothing is changed and the crossing is returned.
    pub fn apply_snapshot(
        &mut self,
        sequence: SeqNum,
        asks: &[LevelUpdate],
        bids: &[LevelUpdate],
    ) -> Result<(), Crossing> {
        let asks = collect_side(asks);
        let bids = collect_side(bids);

        if let Some(crossing) = crossing_of(&bids, &asks) {
            return Err(crossing);
        }

        self.asks = asks;
        self.bids = bids;
        self.sequence = Some(sequence);
        self.recompute_depth();
        Ok(())
    }

    /// Merge delta levels into both sides
    ///
    /// Returns one event per level that actually changed. Removing a price
    /// that is not on the book is a no-op and yields no event.
    pub fn merge(&mut self, asks: &[LevelUpdate], bids: &[LevelUpdate]) -> Vec<LevelEvent> {
        let mut events = Vec::with_capacity(asks.len() + bids.len());

        for (side, levels) in [(Side::Ask, asks), (Side::Bid, bids)] {
            for level in levels {
                if let Some(change) = self.set_level(side, level.price, level.size) {
                    events.push(LevelEvent {
                        side,
                        price: level.price,
                        change,
                    });
                }
            }
        }

        self.recompute_depth();
        events
    }

    /// Set a price level directly. Size 0 removes the level.
    fn set_level(&mut self, side: Side, price: Price, size: Size) -> Option<LevelChange> {
        let book = match side {
            Side::Ask => &mut self.asks,
            Side::Bid => &mut self.bids,
        };
        let key = OrderedFloat(price);

        if size == 0.0 {
            return book.remove(&key).map(|prev| LevelChange::Removed { prev });
        }

        match book.insert(key, size) {
            None => Some(LevelChange::Appeared),
            Some(prev) if size > prev => Some(LevelChange::Increased { prev }),
            Some(prev) if size < prev => Some(LevelChange::Decreased { prev }),
            Some(_) => None,
        }
    }

    /// Rebuild cumulative totals and depth ratios for both sides
    fn recompute_depth(&mut self) {
        self.ask_levels = accumulate(self.asks.iter());
        self.bid_levels = accumulate(self.bids.iter().rev());

        let max_total = self.max_total();
        for level in self.ask_levels.iter_mut().chain(self.bid_levels.iter_mut()) {
            level.percentage_of_max_total = if max_total > 0.0 {
                level.total / max_total
            } else {
                0.0
            };
        }
    }

    /// Largest cumulative total across both sides
    #[must_use]
    pub fn max_total(&self) -> Size {
        let ask = self.ask_levels.last().map_or(0.0, |l| l.total);
        let bid = self.bid_levels.last().map_or(0.0, |l| l.total);
        ask.max(bid)
    }

    /// Get the best bid (highest bid)
    ///
    /// Returns `(price, size)` or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.bids.last_key_value().map(|(p, &s)| (p.0, s))
    }

    /// Get the best ask (lowest ask)
    ///
    /// Returns `(price, size)` or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.asks.first_key_value().map(|(p, &s)| (p.0, s))
    }

    /// Best bid row, including its total
    #[must_use]
    pub fn best_bid_level(&self) -> Option<&PriceLevel> {
        self.bid_levels.first()
    }

    /// Best ask row, including its total
    #[must_use]
    pub fn best_ask_level(&self) -> Option<&PriceLevel> {
        self.ask_levels.first()
    }

    /// Get the mid price
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Get the spread (best ask minus best bid)
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.crossing().is_some()
    }

    /// Best bid and ask if the book is crossed
    #[must_use]
    pub fn crossing(&self) -> Option<Crossing> {
        crossing_of(&self.bids, &self.asks)
    }

    /// Ask rows, best first
    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.ask_levels
    }

    /// Bid rows, best first
    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bid_levels
    }

    /// Get the top N ask rows
    #[must_use]
    pub fn top_asks(&self, n: usize) -> &[PriceLevel] {
        &self.ask_levels[..n.min(self.ask_levels.len())]
    }

    /// Get the top N bid rows
    #[must_use]
    pub fn top_bids(&self, n: usize) -> &[PriceLevel] {
        &self.bid_levels[..n.min(self.bid_levels.len())]
    }

    /// Resting size at a price
    #[must_use]
    pub fn size_at(&self, side: Side, price: Price) -> Option<Size> {
        let book = match side {
            Side::Ask => &self.asks,
            Side::Bid => &self.bids,
        };
        book.get(&OrderedFloat(price)).copied()
    }

    /// Whether a price is resting on the given side
    #[must_use]
    pub fn contains(&self, side: Side, price: Price) -> bool {
        self.size_at(side, price).is_some()
    }

    /// Record a new trade price
    pub fn update_last_price(&mut self, price: Price) {
        self.previous_price = self.last_price;
        self.last_price = price;
    }

    /// Most recent trade price (0 before any trade)
    #[must_use]
    pub fn last_price(&self) -> Price {
        self.last_price
    }

    /// Trade price before the most recent one
    #[must_use]
    pub fn previous_price(&self) -> Price {
        self.previous_price
    }

    /// Direction of the last trade
    #[must_use]
    pub fn price_direction(&self) -> PriceDirection {
        if self.previous_price == 0.0 || self.last_price == self.previous_price {
            PriceDirection::Unchanged
        } else if self.last_price > self.previous_price {
            PriceDirection::Up
        } else {
            PriceDirection::Down
        }
    }

    /// Copy the readable state
    #[must_use]
    pub fn state(&self) -> BookState {
        BookState {
            asks: self.ask_levels.clone(),
            bids: self.bid_levels.clone(),
            seq_num: self.sequence.unwrap_or(0),
            last_price: self.last_price,
            previous_price: self.previous_price,
        }
    }

    /// Clear both sides and forget the sequence number
    pub fn clear(&mut self) {
        self.asks.clear();
        self.bids.clear();
        self.ask_levels.clear();
        self.bid_levels.clear();
        self.sequence = None;
    }

    /// Check if the orderbook is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Get the number of price levels as `(asks, bids)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.asks.len(), self.bids.len())
    }
}

impl Default for Orderbook {
    fn default() -> Self {
        Self::new("")
    }
}

fn collect_side(levels: &[LevelUpdate]) -> BTreeMap<PriceKey, Size> {
    let mut side = BTreeMap::new();
    for level in levels {
        if level.size > 0.0 {
            side.insert(OrderedFloat(level.price), level.size);
        } else {
            side.remove(&OrderedFloat(level.price));
        }
    }
    side
}

fn crossing_of(
    bids: &BTreeMap<PriceKey, Size>,
    asks: &BTreeMap<PriceKey, Size>,
) -> Option<Crossing> {
    let (best_bid, _) = bids.last_key_value()?;
    let (best_ask, _) = asks.first_key_value()?;
    (best_bid >= best_ask).then_some(Crossing {
        best_bid: best_bid.0,
        best_ask: best_ask.0,
    })
}

fn accumulate<'a>(levels: impl Iterator<Item = (&'a PriceKey, &'a Size)>) -> Vec<PriceLevel> {
    let mut total = 0.0;
    levels
        .map(|(price, &size)| {
            total += size;
            PriceLevel {
                price: price.0,
                size,
                total,
                percentage_of_max_total: 0.0,
            }
        })
        .collect()
}
