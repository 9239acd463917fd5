//! Ask (sell-side) order book
//!
//! Sell orders sorted by price ascending (best ask first).

use std::collections::BTreeMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};

use super::price_level::{LevelEntry, LevelSnapshot, PriceLevel};

/// Ask (sell) side order book
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    /// Best ask is the first key
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
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

    /// Best ask (lowest price) with its aggregate quantity
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Oldest order at the best ask
    pub fn best_front(&self) -> Option<(Price, LevelEntry)> {
        let (price, level) = self.levels.iter().next()?;
        level.front().map(|entry| (*price, entry))
    }

    /// Fill the oldest order at the best ask; drops the level once empty
    pub fn fill_best(&mut self, quantity: Quantity) -> Option<Quantity> {
        let mut entry = self.levels.first_entry()?;
        let remaining = entry.get_mut().fill_front(quantity)?;
        if entry.get().is_empty() {
            entry.remove();
        }
        Some(remaining)
    }

    /// Levels from best to worst
    pub fn levels(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> + '_ {
        self.levels.iter()
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
