//! Per-price change hints.
//!
//! After each reconciliation pass the tracker knows, for every price it has
//! seen change, whether the level appeared, grew, shrank or vanished and what
//! its size was before. Renderers poll it to pick an animation. Entries are a
//! one-pass lookahead: the engine evicts any price that is no longer on the
//! book at the end of every pass, so the maps never outgrow the book.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::book::{LevelChange, LevelEvent, PriceKey};
use crate::types::{Price, Side, Size};

/// Kind of price-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// New price on the book
    Appeared,
    /// Size went up
    Increased,
    /// Size went down
    Decreased,
    /// Level removed
    Removed,
}

/// Latest change recorded for a price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChange {
    /// Level price
    pub price: Price,
    /// Side the change happened on
    pub side: Side,
    /// What happened
    pub kind: ChangeKind,
}

/// Size a level had before its latest change
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeChange {
    /// Level price
    pub price: Price,
    /// Size before the change (0 for new levels)
    pub prev_size: Size,
    /// Side the change happened on
    pub side: Side,
}

/// Result of comparing a level's current size to its recorded previous size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTrend {
    /// Current size is above the recorded previous size
    Increase,
    /// Current size is below the recorded previous size
    Decrease,
    /// No record for this price and side, or no difference
    Unchanged,
}

/// Price and size change maps, keyed by price
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    price_changes: FxHashMap<PriceKey, PriceChange>,
    size_changes: FxHashMap<PriceKey, SizeChange>,
    /// Changes recorded since the last `begin_pass`, in merge order
    last_pass: Vec<PriceChange>,
}

impl ChangeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what happened to a price
    pub fn record_price_change(&mut self, price: Price, side: Side, kind: ChangeKind) {
        let change = PriceChange { price, side, kind };
        self.price_changes.insert(OrderedFloat(price), change);
        self.last_pass.push(change);
    }

    /// Record the size a price held before changing
    pub fn record_size_change(&mut self, price: Price, side: Side, prev_size: Size) {
        self.size_changes.insert(
            OrderedFloat(price),
            SizeChange {
                price,
                prev_size,
                side,
            },
        );
    }

    /// Record both maps from a merge event
    pub fn record_event(&mut self, event: &LevelEvent) {
        let (kind, prev) = match event.change {
            LevelChange::Appeared => (ChangeKind::Appeared, 0.0),
            LevelChange::Increased { prev } => (ChangeKind::Increased, prev),
            LevelChange::Decreased { prev } => (ChangeKind::Decreased, prev),
            LevelChange::Removed { prev } => (ChangeKind::Removed, prev),
        };
        self.record_price_change(event.price, event.side, kind);
        self.record_size_change(event.price, event.side, prev);
    }

    /// Compare `current_size` against the recorded previous size
    ///
    /// A missing level counts as size 0.
    pub fn classify(&self, price: Price, side: Side, current_size: Option<Size>) -> SizeTrend {
        let Some(recorded) = self.size_changes.get(&OrderedFloat(price)) else {
            return SizeTrend::Unchanged;
        };
        if recorded.side != side {
            return SizeTrend::Unchanged;
        }

        let current = current_size.unwrap_or(0.0);
        if current > recorded.prev_size {
            SizeTrend::Increase
        } else if current < recorded.prev_size {
            SizeTrend::Decrease
        } else {
            SizeTrend::Unchanged
        }
    }

    /// Drop entries for prices that left the book
    pub fn evict(&mut self, prices: impl IntoIterator<Item = Price>) {
        for price in prices {
            let key = OrderedFloat(price);
            self.price_changes.remove(&key);
            self.size_changes.remove(&key);
        }
    }

    /// Every price with an entry in either map
    pub fn tracked_prices(&self) -> Vec<Price> {
        let mut prices: Vec<Price> = self
            .price_changes
            .keys()
            .chain(self.size_changes.keys())
            .map(|p| p.0)
            .collect();
        prices.sort_by(|a, b| a.total_cmp(b));
        prices.dedup();
        prices
    }

    /// Start a new pass; the per-pass log is cleared, the maps are kept
    pub fn begin_pass(&mut self) {
        self.last_pass.clear();
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.price_changes.clear();
        self.size_changes.clear();
        self.last_pass.clear();
    }

    /// Latest price change for a price
    pub fn price_change(&self, price: Price) -> Option<&PriceChange> {
        self.price_changes.get(&OrderedFloat(price))
    }

    /// Latest size change for a price
    pub fn size_change(&self, price: Price) -> Option<&SizeChange> {
        self.size_changes.get(&OrderedFloat(price))
    }

    /// All price changes, unordered
    pub fn price_changes(&self) -> impl Iterator<Item = &PriceChange> + '_ {
        self.price_changes.values()
    }

    /// All size changes, unordered
    pub fn size_changes(&self) -> impl Iterator<Item = &SizeChange> + '_ {
        self.size_changes.values()
    }

    /// Changes produced by the most recent pass, including removals
    pub fn last_pass(&self) -> &[PriceChange] {
        &self.last_pass
    }

    /// Check if both maps are empty
    pub fn is_empty(&self) -> bool {
        self.price_changes.is_empty() && self.size_changes.is_empty()
    }
}
