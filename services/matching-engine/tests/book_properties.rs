//! Property tests over random order flow on one instrument

use matching_engine::{EngineEvent, MatchingEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use scheduler::ManualClock;
use std::collections::HashMap;
use std::sync::Arc;
use types::fee::FeeSchedule;
use types::ids::{AccountId, InstrumentId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderRequest, OrderStatus, Side, TimeInForce};

#[derive(Debug, Clone)]
enum Flow {
    Limit { side: Side, price: u64, qty: u64, tif: TimeInForce },
    Market { side: Side, qty: u64 },
    CancelOldest,
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn tif() -> impl Strategy<Value = TimeInForce> {
    prop_oneof![
        4 => Just(TimeInForce::GTC),
        1 => Just(TimeInForce::IOC),
        1 => Just(TimeInForce::FOK),
    ]
}

fn flow() -> impl Strategy<Value = Flow> {
    prop_oneof![
        6 => (side(), 95u64..106, 1u64..20, tif()).prop_map(|(side, price, qty, tif)| Flow::Limit { side, price, qty, tif }),
        2 => (side(), 1u64..30).prop_map(|(side, qty)| Flow::Market { side, qty }),
        1 => Just(Flow::CancelOldest),
    ]
}

fn to_order(owners: &[AccountId], i: usize, flow: &Flow) -> Option<Order> {
    let owner = owners[i % owners.len()];
    let symbol = InstrumentId::new("ACME");
    let request = match flow {
        Flow::Limit { side, price, qty, tif } => {
            OrderRequest::limit(owner, symbol, *side, Price::from_u64(*price), Quantity::from_u64(*qty))
                .with_time_in_force(*tif)
        }
        Flow::Market { side, qty } => OrderRequest::market(owner, symbol, *side, Quantity::from_u64(*qty)),
        Flow::CancelOldest => return None,
    };
    Some(Order::from_request(request, 0))
}

proptest! {
    #[test]
    fn book_stays_ordered_positive_and_conserved(flows in prop::collection::vec(flow(), 1..80)) {
        let engine = MatchingEngine::new(FeeSchedule::default(), Arc::new(ManualClock::new(0)));
        let mut events = engine.subscribe();
        let owners = [AccountId::new(), AccountId::new(), AccountId::new()];
        let symbol = InstrumentId::new("ACME");
        let mut live = Vec::new();

        for (i, flow) in flows.iter().enumerate() {
            match to_order(&owners, i, flow) {
                Some(order) => {
                    let result = engine.submit(order).expect("matching must not violate invariants");
                    prop_assert!(result.order.check_invariant());
                    if result.is_resting() {
                        live.push(result.order.order_id);
                    }
                }
                None => {
                    if !live.is_empty() {
                        let id = live.remove(0);
                        engine.cancel(id);
                    }
                }
            }
            prop_assert!(engine.check_invariants(&symbol).is_ok());

            let snapshot = engine.snapshot(&symbol, usize::MAX).expect("book exists");
            prop_assert!(snapshot.bids.windows(2).all(|w| w[0].price > w[1].price));
            prop_assert!(snapshot.asks.windows(2).all(|w| w[0].price < w[1].price));
            prop_assert!(snapshot.bids.iter().chain(&snapshot.asks).all(|l| !l.quantity.is_zero() && l.order_count > 0));
            if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
                prop_assert!(bid < ask);
            }
        }

        // Latest state per order, and every traded unit counted once per side
        let mut latest: HashMap<_, Order> = HashMap::new();
        let mut traded = Decimal::ZERO;
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::TradeExecuted(trade) => {
                    prop_assert!(trade.validate_no_self_trade());
                    traded += trade.quantity().as_decimal();
                }
                EngineEvent::OrderUpdated(order) => {
                    prop_assert!(order.check_invariant());
                    latest.insert(order.order_id, order);
                }
            }
        }
        let filled: Decimal = latest.values().map(|o| o.filled_quantity.as_decimal()).sum();
        prop_assert_eq!(filled, traded * Decimal::TWO);

        let resting: Decimal = latest
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .map(|o| o.remaining_quantity.as_decimal())
            .sum();
        let snapshot = engine.snapshot(&symbol, usize::MAX).expect("book exists");
        let depth: Decimal = snapshot
            .bids
            .iter()
            .chain(&snapshot.asks)
            .map(|l| l.quantity.as_decimal())
            .sum();
        prop_assert_eq!(resting, depth);
    }
}
