//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at one price. Orders are kept
//! first-in-first-out so the earliest arrival at a price fills first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};

/// Aggregate view of one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Entry in the price level queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub owner_id: AccountId,
    pub remaining_quantity: Quantity,
}

/// Resting orders at a single price, in arrival order
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<LevelEntry>,
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order at the back of the queue (time priority)
    pub fn insert(&mut self, order_id: OrderId, owner_id: AccountId, quantity: Quantity) {
        self.orders.push_back(LevelEntry {
            order_id,
            owner_id,
            remaining_quantity: quantity,
        });
        self.total_quantity += quantity;
    }

    /// Remove an order by id, returning its remaining quantity
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total_quantity = self.total_quantity.saturating_sub(entry.remaining_quantity);
        Some(entry.remaining_quantity)
    }

    /// Oldest order at this price
    pub fn front(&self) -> Option<LevelEntry> {
        self.orders.front().copied()
    }

    /// Take `quantity` off the front order, dropping it once exhausted
    ///
    /// Returns the front order's remaining quantity after the fill, or None
    /// if the level is empty or the fill exceeds what the front order holds.
    pub fn fill_front(&mut self, quantity: Quantity) -> Option<Quantity> {
        let entry = self.orders.front_mut()?;
        let remaining = entry.remaining_quantity.checked_sub(quantity)?;
        if remaining.is_zero() {
            self.orders.pop_front();
        } else {
            entry.remaining_quantity = remaining;
        }
        self.total_quantity = self.total_quantity.saturating_sub(quantity);
        Some(remaining)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LevelEntry> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn snapshot(&self, price: Price) -> LevelSnapshot {
        LevelSnapshot {
            price,
            quantity: self.total_quantity,
            order_count: self.orders.len(),
        }
    }

    /// Quantity at this level not owned by `owner`
    pub fn quantity_excluding(&self, owner: AccountId) -> Quantity {
        self.orders
            .iter()
            .filter(|entry| entry.owner_id != owner)
            .fold(Quantity::zero(), |acc, entry| acc + entry.remaining_quantity)
    }

    /// Sum of entries equals the cached total and no entry is empty
    pub fn is_consistent(&self) -> bool {
        let sum = self
            .orders
            .iter()
            .fold(Quantity::zero(), |acc, entry| acc + entry.remaining_quantity);
        sum == self.total_quantity && self.orders.iter().all(|e| !e.remaining_quantity.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn qty(s: &str) -> Quantity {
        Quantity::from_str(s).unwrap()
    }

    #[test]
    fn test_price_level_fifo_order() {
        let mut level = PriceLevel::new();
        let account_id = AccountId::new();
        let order1 = OrderId::new();
        let order2 = OrderId::new();

        level.insert(order1, account_id, qty("1.0"));
        level.insert(order2, account_id, qty("2.0"));

        let front = level.front().unwrap();
        assert_eq!(front.order_id, order1);
        assert_eq!(level.total_quantity(), qty("3.0"));
        assert_eq!(level.order_count(), 2);
    }

    #[test]
    fn test_price_level_remove() {
        let mut level = PriceLevel::new();
        let account_id = AccountId::new();
        let order1 = OrderId::new();
        let order2 = OrderId::new();

        level.insert(order1, account_id, qty("1.0"));
        level.insert(order2, account_id, qty("2.0"));

        assert_eq!(level.remove(&order1), Some(qty("1.0")));
        assert_eq!(level.remove(&order1), None);
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), qty("2.0"));
        assert!(level.is_consistent());
    }

    #[test]
    fn test_fill_front_partial_then_complete() {
        let mut level = PriceLevel::new();
        let order_id = OrderId::new();
        level.insert(order_id, AccountId::new(), qty("5.0"));

        assert_eq!(level.fill_front(qty("3.0")), Some(qty("2.0")));
        assert_eq!(level.total_quantity(), qty("2.0"));
        assert_eq!(level.order_count(), 1);

        assert_eq!(level.fill_front(qty("2.0")), Some(Quantity::zero()));
        assert!(level.is_empty());
        assert_eq!(level.total_quantity(), Quantity::zero());
    }

    #[test]
    fn test_fill_front_rejects_overfill() {
        let mut level = PriceLevel::new();
        level.insert(OrderId::new(), AccountId::new(), qty("1.0"));
        assert_eq!(level.fill_front(qty("1.5")), None);
        assert_eq!(level.total_quantity(), qty("1.0"));
    }

    #[test]
    fn test_quantity_excluding_owner() {
        let mut level = PriceLevel::new();
        let me = AccountId::new();
        level.insert(OrderId::new(), me, qty("4"));
        level.insert(OrderId::new(), AccountId::new(), qty("1.5"));
        assert_eq!(level.quantity_excluding(me), qty("1.5"));

        let snap = level.snapshot(Price::from_u64(10));
        assert_eq!(snap.quantity, qty("5.5"));
        assert_eq!(snap.order_count, 2);
    }
}
