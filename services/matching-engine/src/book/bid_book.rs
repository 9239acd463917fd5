//! Bid (buy-side) order book
//!
//! Buy orders sorted by price descending (best bid first). BTreeMap keeps
//! iteration deterministic.

use std::collections::BTreeMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};

use super::price_level::{LevelEntry, LevelSnapshot, PriceLevel};

/// Bid (buy) side order book
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    /// Ascending in the map; best bid is the last key
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order_id: OrderId, owner_id: AccountId, price: Price, quantity: Quantity) {
        self.levels
            .entry(price)
            .or_default()
            .insert(order_id, owner_id, quantity);
    }

    /// Remove an order, dropping its level once empty
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Best bid (highest price) with its aggregate quantity
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Oldest order at the best bid
    pub fn best_front(&self) -> Option<(Price, LevelEntry)> {
        let (price, level) = self.levels.iter().next_back()?;
        level.front().map(|entry| (*price, entry))
    }

    /// Fill the oldest order at the best bid; drops the level once empty
    pub fn fill_best(&mut self, quantity: Quantity) -> Option<Quantity> {
        let mut entry = self.levels.last_entry()?;
        let remaining = entry.get_mut().fill_front(quantity)?;
        if entry.get().is_empty() {
            entry.remove();
        }
        Some(remaining)
    }

    /// Levels from best to worst
    pub fn levels(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> + '_ {
        self.levels.iter().rev()
    }

    /// Top `depth` levels, best first
    pub fn depth_snapshot(&self, depth: usize) -> Vec<LevelSnapshot> {
        self.levels()
            .take(depth)
            .map(|(price, level)| level.snapshot(*price))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
