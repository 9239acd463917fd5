//! Order book infrastructure
//!
//! `OrderBook` is the single-writer arena for one instrument: it owns the
//! bid and ask ladders, the stop book, and every live order record. All
//! mutation goes through it while the engine holds the book's lock.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;
pub mod stop_book;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::{LevelEntry, LevelSnapshot, PriceLevel};
pub use stop_book::StopBook;

use crate::error::MatchingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::ids::{AccountId, InstrumentId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, Side};

/// Depth view of one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: InstrumentId,
    /// Best (highest) first
    pub bids: Vec<LevelSnapshot>,
    /// Best (lowest) first
    pub asks: Vec<LevelSnapshot>,
    pub last_price: Option<Price>,
    pub stop_orders: usize,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_bid()?.as_decimal() + self.best_ask()?.as_decimal()) / Decimal::TWO)
    }
}

/// Book and order arena for a single instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: InstrumentId,
    bids: BidBook,
    asks: AskBook,
    stops: StopBook,
    /// Resting limit orders and parked stop orders
    orders: BTreeMap<OrderId, Order>,
    last_price: Option<Price>,
}

impl OrderBook {
    pub fn new(symbol: InstrumentId) -> Self {
        Self {
            symbol,
            bids: BidBook::new(),
            asks: AskBook::new(),
            stops: StopBook::new(),
            orders: BTreeMap::new(),
            last_price: None,
        }
    }

    pub fn symbol(&self) -> &InstrumentId {
        &self.symbol
    }

    pub fn last_price(&self) -> Option<Price> {
        self.last_price
    }

    pub fn set_last_price(&mut self, price: Price) {
        self.last_price = Some(price);
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_bid_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_ask_price()
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders.values()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Put an open limit order on its side of the book
    pub fn rest(&mut self, order: Order) -> Result<(), MatchingError> {
        let price = order.limit_price.ok_or_else(|| {
            MatchingError::invariant(&self.symbol, format!("resting order {} has no limit price", order.order_id))
        })?;
        match order.side {
            Side::Buy => self.bids.insert(order.order_id, order.owner_id, price, order.remaining_quantity),
            Side::Sell => self.asks.insert(order.order_id, order.owner_id, price, order.remaining_quantity),
        }
        self.orders.insert(order.order_id, order);
        Ok(())
    }

    /// Park an open stop order until its trigger trades
    pub fn park_stop(&mut self, order: Order) -> Result<(), MatchingError> {
        let stop = order.stop_price.ok_or_else(|| {
            MatchingError::invariant(&self.symbol, format!("stop order {} has no stop price", order.order_id))
        })?;
        self.stops.insert(order.side, stop, order.order_id);
        self.orders.insert(order.order_id, order);
        Ok(())
    }

    /// Take an order off the book (resting or parked), returning its record
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        let removed = if order.order_type.requires_stop_price() {
            order
                .stop_price
                .map(|stop| self.stops.remove(order.side, stop, order_id))
                .unwrap_or(false)
        } else {
            order
                .limit_price
                .and_then(|price| match order.side {
                    Side::Buy => self.bids.remove(order_id, price),
                    Side::Sell => self.asks.remove(order_id, price),
                })
                .is_some()
        };
        if !removed {
            tracing::error!(symbol = %self.symbol, %order_id, "order record had no book entry");
        }
        Some(order)
    }

    /// Oldest resting order at the best price facing an incoming `side`
    pub fn best_opposite(&self, side: Side) -> Option<(Price, LevelEntry)> {
        match side {
            Side::Buy => self.asks.best_front(),
            Side::Sell => self.bids.best_front(),
        }
    }

    /// Fill the front resting order facing `taker_side` and update its record
    ///
    /// Returns the maker's updated record; filled makers leave the arena.
    pub fn fill_resting(
        &mut self,
        taker_side: Side,
        maker_id: OrderId,
        quantity: Quantity,
        price: Price,
        fee: Decimal,
        timestamp: i64,
    ) -> Result<Order, MatchingError> {
        let level_remaining = match taker_side {
            Side::Buy => self.asks.fill_best(quantity),
            Side::Sell => self.bids.fill_best(quantity),
        }
        .ok_or_else(|| MatchingError::invariant(&self.symbol, format!("level front cannot absorb fill of {quantity}")))?;

        let maker = self.orders.get_mut(&maker_id).ok_or_else(|| {
            MatchingError::invariant(&self.symbol, format!("orphaned book entry {maker_id}"))
        })?;
        maker.add_fill(quantity, price, fee, timestamp)?;
        if maker.remaining_quantity != level_remaining {
            return Err(MatchingError::invariant(
                &self.symbol,
                format!(
                    "order {maker_id} remaining {} disagrees with level entry {level_remaining}",
                    maker.remaining_quantity
                ),
            ));
        }

        let updated = maker.clone();
        if updated.status == OrderStatus::Filled {
            self.orders.remove(&maker_id);
        }
        Ok(updated)
    }

    /// Opposite-side quantity an incoming order could trade right now
    ///
    /// Orders owned by `owner` are left out, since they would be cancelled
    /// rather than matched.
    pub fn available_against(&self, side: Side, limit: Option<Price>, owner: AccountId) -> Quantity {
        let crosses = |price: &Price| match (side, limit) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => *price <= limit,
            (Side::Sell, Some(limit)) => *price >= limit,
        };
        let sum = |acc: Quantity, (_, level): (&Price, &PriceLevel)| acc + level.quantity_excluding(owner);
        match side {
            Side::Buy => self.asks.levels().take_while(|(p, _)| crosses(*p)).fold(Quantity::zero(), sum),
            Side::Sell => self.bids.levels().take_while(|(p, _)| crosses(*p)).fold(Quantity::zero(), sum),
        }
    }

    /// Pull every stop triggered by the last trade out of the book
    pub fn take_triggered_stops(&mut self) -> Vec<Order> {
        let Some(last) = self.last_price else {
            return Vec::new();
        };
        self.stops
            .take_triggered(last)
            .into_iter()
            .filter_map(|id| self.orders.remove(&id))
            .collect()
    }

    /// Ids of orders whose good-till-date deadline has passed
    pub fn expired(&self, now: i64) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.time_in_force.is_expired(now))
            .map(|o| o.order_id)
            .collect()
    }

    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.bids.depth_snapshot(depth),
            asks: self.asks.depth_snapshot(depth),
            last_price: self.last_price,
            stop_orders: self.stops.len(),
        }
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    /// Full consistency sweep between ladders, stop book and arena
    pub fn check_invariants(&self) -> Result<(), MatchingError> {
        let fail = |detail: String| -> Result<(), MatchingError> {
            Err(MatchingError::invariant(&self.symbol, detail))
        };

        if self.is_crossed() {
            return fail(format!("book crossed: bid {:?} >= ask {:?}", self.best_bid(), self.best_ask()));
        }

        let mut entries = 0usize;
        let ladders = self
            .bids
            .levels()
            .map(|(p, l)| (Side::Buy, p, l))
            .chain(self.asks.levels().map(|(p, l)| (Side::Sell, p, l)));
        for (side, price, level) in ladders {
            if level.is_empty() || !level.is_consistent() {
                return fail(format!("{side:?} level {price} is empty or inconsistent"));
            }
            for entry in level.entries() {
                entries += 1;
                let Some(order) = self.orders.get(&entry.order_id) else {
                    return fail(format!("orphaned book entry {}", entry.order_id));
                };
                if order.side != side
                    || order.limit_price != Some(*price)
                    || order.remaining_quantity != entry.remaining_quantity
                    || order.status != OrderStatus::Open
                {
                    return fail(format!("book entry {} disagrees with its order record", entry.order_id));
                }
            }
        }

        if entries + self.stops.len() != self.orders.len() {
            return fail(format!(
                "arena holds {} orders but book has {} entries and {} stops",
                self.orders.len(),
                entries,
                self.stops.len()
            ));
        }
        if let Some(order) = self.orders.values().find(|o| !o.check_invariant()) {
            return fail(format!("order {} violates filled + remaining = quantity", order.order_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::{OrderRequest, OrderType, TimeInForce};

    const TS: i64 = 1708123456789000000;

    fn open_limit(owner: AccountId, side: Side, price: u64, qty: u64) -> Order {
        let mut order = Order::from_request(
            OrderRequest::limit(owner, InstrumentId::new("ACME"), side, Price::from_u64(price), Quantity::from_u64(qty)),
            TS,
        );
        order.open(TS).unwrap();
        order
    }

    #[test]
    fn test_rest_and_remove() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let order = open_limit(AccountId::new(), Side::Buy, 100, 5);
        let id = order.order_id;
        book.rest(order).unwrap();
        assert_eq!(book.best_bid(), Some(Price::from_u64(100)));
        book.check_invariants().unwrap();

        let removed = book.remove(&id).unwrap();
        assert_eq!(removed.order_id, id);
        assert!(book.best_bid().is_none());
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_available_against_skips_own_orders() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let me = AccountId::new();
        book.rest(open_limit(me, Side::Sell, 100, 5)).unwrap();
        book.rest(open_limit(AccountId::new(), Side::Sell, 101, 3)).unwrap();
        book.rest(open_limit(AccountId::new(), Side::Sell, 105, 7)).unwrap();

        assert_eq!(
            book.available_against(Side::Buy, Some(Price::from_u64(101)), me),
            Quantity::from_u64(3)
        );
        assert_eq!(book.available_against(Side::Buy, None, AccountId::new()), Quantity::from_u64(15));
    }

    #[test]
    fn test_stop_parking_and_trigger() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let mut stop = Order::from_request(
            OrderRequest {
                symbol: InstrumentId::new("ACME"),
                side: Side::Sell,
                order_type: OrderType::Stop,
                quantity: Quantity::from_u64(2),
                limit_price: None,
                stop_price: Some(Price::from_u64(95)),
                time_in_force: TimeInForce::GTC,
                owner_id: AccountId::new(),
            },
            TS,
        );
        stop.open(TS).unwrap();
        book.park_stop(stop).unwrap();
        book.check_invariants().unwrap();

        book.set_last_price(Price::from_u64(96));
        assert!(book.take_triggered_stops().is_empty());
        book.set_last_price(Price::from_u64(95));
        assert_eq!(book.take_triggered_stops().len(), 1);
        assert_eq!(book.order_count(), 0);
        assert_eq!(book.snapshot(5).stop_orders, 0);
    }

    #[test]
    fn test_snapshot_mid_price() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        book.rest(open_limit(AccountId::new(), Side::Buy, 99, 1)).unwrap();
        book.rest(open_limit(AccountId::new(), Side::Sell, 101, 1)).unwrap();
        assert_eq!(book.snapshot(10).mid_price(), Some(Decimal::from(100)));
    }
}
