//! Untriggered stop orders
//!
//! Buy stops trigger once the last trade is at or above the stop price,
//! sell stops once it is at or below. Stops are not part of visible depth.

use std::collections::{BTreeMap, VecDeque};
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Side;

#[derive(Debug, Clone, Default)]
pub struct StopBook {
    buy_stops: BTreeMap<Price, VecDeque<OrderId>>,
    sell_stops: BTreeMap<Price, VecDeque<OrderId>>,
    len: usize,
}

/// Whether a stop on `side` at `stop` fires at `last`
pub fn is_triggered(side: Side, stop: Price, last: Price) -> bool {
    match side {
        Side::Buy => last >= stop,
        Side::Sell => last <= stop,
    }
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, side: Side, stop: Price, order_id: OrderId) {
        self.side_mut(side).entry(stop).or_default().push_back(order_id);
        self.len += 1;
    }

    pub fn remove(&mut self, side: Side, stop: Price, order_id: &OrderId) -> bool {
        let stops = self.side_mut(side);
        let Some(queue) = stops.get_mut(&stop) else {
            return false;
        };
        let Some(position) = queue.iter().position(|id| id == order_id) else {
            return false;
        };
        queue.remove(position);
        if queue.is_empty() {
            stops.remove(&stop);
        }
        self.len -= 1;
        true
    }

    /// Remove and return every stop triggered by `last`
    ///
    /// Buys come out lowest stop first, sells highest stop first, and
    /// arrival order is kept within a stop price.
    pub fn take_triggered(&mut self, last: Price) -> Vec<OrderId> {
        let mut fired = Vec::new();

        let buy_prices: Vec<Price> = self.buy_stops.range(..=last).map(|(p, _)| *p).collect();
        for price in buy_prices {
            if let Some(queue) = self.buy_stops.remove(&price) {
                fired.extend(queue);
            }
        }

        let sell_prices: Vec<Price> = self.sell_stops.range(last..).rev().map(|(p, _)| *p).collect();
        for price in sell_prices {
            if let Some(queue) = self.sell_stops.remove(&price) {
                fired.extend(queue);
            }
        }

        self.len -= fired.len();
        fired
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, VecDeque<OrderId>> {
        match side {
            Side::Buy => &mut self.buy_stops,
            Side::Sell => &mut self.sell_stops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_direction() {
        assert!(is_triggered(Side::Buy, Price::from_u64(100), Price::from_u64(100)));
        assert!(!is_triggered(Side::Buy, Price::from_u64(100), Price::from_u64(99)));
        assert!(is_triggered(Side::Sell, Price::from_u64(100), Price::from_u64(95)));
        assert!(!is_triggered(Side::Sell, Price::from_u64(100), Price::from_u64(101)));
    }

    #[test]
    fn test_take_triggered() {
        let mut stops = StopBook::new();
        let buy_low = OrderId::new();
        let buy_high = OrderId::new();
        let sell = OrderId::new();
        stops.insert(Side::Buy, Price::from_u64(105), buy_low);
        stops.insert(Side::Buy, Price::from_u64(110), buy_high);
        stops.insert(Side::Sell, Price::from_u64(90), sell);

        assert_eq!(stops.take_triggered(Price::from_u64(106)), vec![buy_low]);
        assert_eq!(stops.len(), 2);

        assert_eq!(stops.take_triggered(Price::from_u64(89)), vec![sell]);
        assert_eq!(stops.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut stops = StopBook::new();
        let id = OrderId::new();
        stops.insert(Side::Sell, Price::from_u64(90), id);
        assert!(!stops.remove(Side::Buy, Price::from_u64(90), &id));
        assert!(stops.remove(Side::Sell, Price::from_u64(90), &id));
        assert!(stops.is_empty());
    }
}
