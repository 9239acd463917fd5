//! Price-time priority matching
//!
//! `match_incoming` walks the opposite side of one book from the best
//! price outward, filling the oldest order at each level first.

pub mod crossing;
pub mod executor;

pub use crossing::{can_match, incoming_can_match};
pub use executor::{Maker, MatchExecutor, Taker};

use crate::book::OrderBook;
use crate::error::MatchingError;
use tracing::debug;
use types::order::{CancelReason, Order};
use types::trade::Trade;

/// Everything one incoming order did to the book
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub trades: Vec<Trade>,
    /// Maker records after their fills or self-trade cancellations
    pub updated_makers: Vec<Order>,
}

/// Match `taker` against `book` until it is filled or stops crossing
///
/// The caller decides what happens to any remainder. A resting order owned
/// by the taker is cancelled instead of traded against.
pub fn match_incoming(
    book: &mut OrderBook,
    executor: &MatchExecutor,
    taker: &mut Order,
    timestamp: i64,
) -> Result<MatchOutcome, MatchingError> {
    let mut outcome = MatchOutcome::default();

    while !taker.remaining_quantity.is_zero() {
        let Some((level_price, front)) = book.best_opposite(taker.side) else {
            break;
        };
        if !incoming_can_match(taker.side, taker.limit_price, level_price) {
            break;
        }

        if front.owner_id == taker.owner_id {
            let mut resting = book
                .remove(&front.order_id)
                .ok_or_else(|| MatchingError::invariant(book.symbol(), format!("orphaned book entry {}", front.order_id)))?;
            resting.cancel(CancelReason::SelfTrade, timestamp)?;
            debug!(symbol = %book.symbol(), order_id = %resting.order_id, "self-trade prevented, resting order cancelled");
            outcome.updated_makers.push(resting);
            continue;
        }

        let quantity = taker.remaining_quantity.min(front.remaining_quantity);
        let trade = executor.execute_trade(
            book.symbol(),
            Maker {
                order_id: front.order_id,
                owner_id: front.owner_id,
                price: level_price,
            },
            Taker {
                order_id: taker.order_id,
                owner_id: taker.owner_id,
                side: taker.side,
            },
            quantity,
            timestamp,
        );

        taker.add_fill(quantity, level_price, trade.taker_fee(), timestamp)?;
        let maker = book.fill_resting(taker.side, front.order_id, quantity, level_price, trade.maker_fee(), timestamp)?;
        book.set_last_price(level_price);

        debug!(
            symbol = %book.symbol(),
            sequence = trade.sequence(),
            price = %level_price,
            quantity = %quantity,
            "trade executed"
        );
        outcome.updated_makers.push(maker);
        outcome.trades.push(trade);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use types::fee::FeeSchedule;
    use types::ids::{AccountId, InstrumentId};
    use types::numeric::{Price, Quantity};
    use types::order::{OrderRequest, OrderStatus, Side};

    const TS: i64 = 1708123456789000000;

    fn order(owner: AccountId, side: Side, price: u64, qty: u64) -> Order {
        Order::from_request(
            OrderRequest::limit(owner, InstrumentId::new("ACME"), side, Price::from_u64(price), Quantity::from_u64(qty)),
            TS,
        )
    }

    fn rest(book: &mut OrderBook, mut o: Order) -> Order {
        o.open(TS).unwrap();
        book.rest(o.clone()).unwrap();
        o
    }

    #[test]
    fn test_sweeps_levels_best_first() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let executor = MatchExecutor::new(1, FeeSchedule::default());
        rest(&mut book, order(AccountId::new(), Side::Sell, 101, 2));
        rest(&mut book, order(AccountId::new(), Side::Sell, 100, 2));
        rest(&mut book, order(AccountId::new(), Side::Sell, 102, 2));

        let mut taker = order(AccountId::new(), Side::Buy, 101, 3);
        let outcome = match_incoming(&mut book, &executor, &mut taker, TS).unwrap();

        let prices: Vec<_> = outcome.trades.iter().map(|t| t.price()).collect();
        assert_eq!(prices, vec![Price::from_u64(100), Price::from_u64(101)]);
        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(book.best_ask(), Some(Price::from_u64(101)));
        assert_eq!(book.last_price(), Some(Price::from_u64(101)));
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_time_priority_within_level() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let executor = MatchExecutor::new(1, FeeSchedule::default());
        let first = rest(&mut book, order(AccountId::new(), Side::Buy, 100, 1));
        let second = rest(&mut book, order(AccountId::new(), Side::Buy, 100, 1));

        let mut taker = order(AccountId::new(), Side::Sell, 100, 1);
        let outcome = match_incoming(&mut book, &executor, &mut taker, TS).unwrap();
        assert_eq!(outcome.trades[0].maker_order_id(), first.order_id);
        assert!(book.order(&second.order_id).is_some());
    }

    #[test]
    fn test_self_trade_cancels_resting() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let executor = MatchExecutor::new(1, FeeSchedule::default());
        let me = AccountId::new();
        let mine = rest(&mut book, order(me, Side::Sell, 100, 1));
        rest(&mut book, order(AccountId::new(), Side::Sell, 100, 1));

        let mut taker = order(me, Side::Buy, 100, 1);
        let outcome = match_incoming(&mut book, &executor, &mut taker, TS).unwrap();
        assert_eq!(outcome.trades.len(), 1);
        assert!(outcome.trades[0].validate_no_self_trade());
        assert_eq!(outcome.updated_makers[0].order_id, mine.order_id);
        assert_eq!(
            outcome.updated_makers[0].status,
            OrderStatus::Cancelled(CancelReason::SelfTrade)
        );
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_partial_maker_fill_keeps_remainder() {
        let mut book = OrderBook::new(InstrumentId::new("ACME"));
        let executor = MatchExecutor::new(1, FeeSchedule::default());
        let maker = rest(&mut book, order(AccountId::new(), Side::Sell, 50, 10));

        let mut taker = order(AccountId::new(), Side::Buy, 50, 4);
        match_incoming(&mut book, &executor, &mut taker, TS).unwrap();
        let resting = book.order(&maker.order_id).unwrap();
        assert_eq!(resting.remaining_quantity, Quantity::from_str("6").unwrap());
        assert!(resting.check_invariant());
    }
}
