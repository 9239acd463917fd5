//! Matching engine core
//!
//! Books are sharded by instrument: a `DashMap` hands out one
//! `Arc<Mutex<OrderBook>>` per symbol, so submissions on one instrument are
//! serialized while different instruments proceed in parallel. Events are
//! published only after the book lock is released.

use dashmap::DashMap;
use parking_lot::Mutex;
use scheduler::SharedClock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};
use types::fee::FeeSchedule;
use types::ids::{InstrumentId, OrderId};
use types::numeric::Price;
use types::order::{CancelReason, Order, OrderStatus, OrderType, TimeInForce};
use types::trade::Trade;

use crate::book::{stop_book, BookSnapshot, OrderBook};
use crate::error::MatchingError;
use crate::events::{EngineEvent, EventBus};
use crate::matching::{match_incoming, MatchExecutor};

/// Result of submitting an order
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResult {
    /// The submitted order in its state after matching
    pub order: Order,
    /// Trades in execution order, including any from triggered stops
    pub trades: Vec<Trade>,
}

impl SubmitResult {
    pub fn is_resting(&self) -> bool {
        self.order.status == OrderStatus::Open
    }
}

pub struct MatchingEngine {
    books: DashMap<InstrumentId, Arc<Mutex<OrderBook>>>,
    /// Live (resting or parked) order → instrument
    order_index: DashMap<OrderId, InstrumentId>,
    executor: MatchExecutor,
    events: EventBus,
    clock: SharedClock,
}

impl MatchingEngine {
    pub fn new(fees: FeeSchedule, clock: SharedClock) -> Self {
        info!(maker_rate = %fees.maker_rate, taker_rate = %fees.taker_rate, "matching engine created");
        Self {
            books: DashMap::new(),
            order_index: DashMap::new(),
            executor: MatchExecutor::new(1, fees),
            events: EventBus::new(),
            clock,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        self.executor.fees()
    }

    /// Receive every subsequent trade and order update
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    fn book(&self, symbol: &InstrumentId) -> Arc<Mutex<OrderBook>> {
        self.books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(symbol.clone()))))
            .clone()
    }

    fn existing_book(&self, symbol: &InstrumentId) -> Option<Arc<Mutex<OrderBook>>> {
        self.books.get(symbol).map(|b| b.clone())
    }

    /// Match a validated pending order and rest or cancel any remainder
    pub fn submit(&self, order: Order) -> Result<SubmitResult, MatchingError> {
        if order.status != OrderStatus::Pending {
            return Err(MatchingError::NotPending {
                order_id: order.order_id.to_string(),
            });
        }
        let now = self.clock.now_nanos();
        let book = self.book(&order.symbol);

        let mut events = Vec::new();
        let result = {
            let mut book = book.lock();
            self.process(&mut book, order, now, &mut events)
                .and_then(|result| book.check_invariants().map(|()| result))
        };

        match result {
            Ok(result) => {
                debug!(
                    order_id = %result.order.order_id,
                    symbol = %result.order.symbol,
                    status = ?result.order.status,
                    trades = result.trades.len(),
                    "order processed"
                );
                self.events.publish(events);
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "matching invariant violated");
                self.events.publish(events);
                Err(e)
            }
        }
    }

    fn process(
        &self,
        book: &mut OrderBook,
        mut order: Order,
        now: i64,
        events: &mut Vec<EngineEvent>,
    ) -> Result<SubmitResult, MatchingError> {
        if order.time_in_force.is_expired(now) {
            order.cancel(CancelReason::Expired, now)?;
            events.push(EngineEvent::OrderUpdated(order.clone()));
            return Ok(SubmitResult { order, trades: Vec::new() });
        }

        if order.order_type.requires_stop_price() {
            let stop = order
                .stop_price
                .ok_or_else(|| MatchingError::invariant(&order.symbol, "stop order without stop price"))?;
            let fired = book
                .last_price()
                .map(|last| stop_book::is_triggered(order.side, stop, last))
                .unwrap_or(false);
            if !fired {
                order.open(now)?;
                self.order_index.insert(order.order_id, order.symbol.clone());
                book.park_stop(order.clone())?;
                events.push(EngineEvent::OrderUpdated(order.clone()));
                return Ok(SubmitResult { order, trades: Vec::new() });
            }
            order.order_type = order.order_type.triggered();
        }

        let mut trades = Vec::new();
        let order = self.execute(book, order, now, &mut trades, events)?;

        // Trades move the last price, which may fire parked stops, whose
        // trades may fire more.
        loop {
            let triggered = book.take_triggered_stops();
            if triggered.is_empty() {
                break;
            }
            for mut stop in triggered {
                self.order_index.remove(&stop.order_id);
                stop.order_type = stop.order_type.triggered();
                debug!(order_id = %stop.order_id, symbol = %stop.symbol, "stop triggered");
                self.execute(book, stop, now, &mut trades, events)?;
            }
        }

        Ok(SubmitResult { order, trades })
    }

    /// Match one executable (market or limit) order and settle its remainder
    fn execute(
        &self,
        book: &mut OrderBook,
        mut order: Order,
        now: i64,
        trades: &mut Vec<Trade>,
        events: &mut Vec<EngineEvent>,
    ) -> Result<Order, MatchingError> {
        if order.time_in_force == TimeInForce::FOK {
            let available = book.available_against(order.side, order.limit_price, order.owner_id);
            if available < order.remaining_quantity {
                order.cancel(CancelReason::FillOrKill, now)?;
                events.push(EngineEvent::OrderUpdated(order.clone()));
                return Ok(order);
            }
        }

        let outcome = match_incoming(book, &self.executor, &mut order, now)?;
        for maker in outcome.updated_makers {
            if maker.status.is_terminal() {
                self.order_index.remove(&maker.order_id);
            }
            events.push(EngineEvent::OrderUpdated(maker));
        }
        for trade in outcome.trades {
            events.push(EngineEvent::TradeExecuted(trade.clone()));
            trades.push(trade);
        }

        if !order.status.is_terminal() {
            match order.order_type {
                OrderType::Limit if order.time_in_force.allows_resting() => {
                    if order.status == OrderStatus::Pending {
                        order.open(now)?;
                    }
                    self.order_index.insert(order.order_id, order.symbol.clone());
                    book.rest(order.clone())?;
                }
                OrderType::Limit => {
                    let reason = match order.time_in_force {
                        TimeInForce::FOK => CancelReason::FillOrKill,
                        _ => CancelReason::ImmediateOrCancel,
                    };
                    order.cancel(reason, now)?;
                }
                _ => order.cancel(CancelReason::NoLiquidity, now)?,
            }
        }

        events.push(EngineEvent::OrderUpdated(order.clone()));
        Ok(order)
    }

    /// Cancel a live order; false if unknown, filled or already cancelled
    pub fn cancel(&self, order_id: OrderId) -> bool {
        self.cancel_with_reason(order_id, CancelReason::UserRequested).is_some()
    }

    pub fn cancel_with_reason(&self, order_id: OrderId, reason: CancelReason) -> Option<Order> {
        let symbol = self.order_index.get(&order_id).map(|e| e.value().clone())?;
        let book = self.existing_book(&symbol)?;
        let now = self.clock.now_nanos();

        let cancelled = {
            let mut book = book.lock();
            let mut order = book.remove(&order_id)?;
            if let Err(e) = order.cancel(reason, now) {
                error!(%order_id, error = %e, "live order could not be cancelled");
                return None;
            }
            order
        };
        self.order_index.remove(&order_id);
        debug!(%order_id, symbol = %symbol, ?reason, "order cancelled");
        self.events.publish(vec![EngineEvent::OrderUpdated(cancelled.clone())]);
        Some(cancelled)
    }

    /// Cancel every good-till-date order whose deadline has passed
    pub fn expire(&self, now: i64) -> Vec<Order> {
        let books: Vec<_> = self.books.iter().map(|e| e.value().clone()).collect();
        let mut expired = Vec::new();
        for book in books {
            let mut book = book.lock();
            for order_id in book.expired(now) {
                if let Some(mut order) = book.remove(&order_id) {
                    if order.cancel(CancelReason::Expired, now).is_ok() {
                        self.order_index.remove(&order_id);
                        expired.push(order);
                    }
                }
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired good-till-date orders");
            self.events
                .publish(expired.iter().cloned().map(EngineEvent::OrderUpdated).collect());
        }
        expired
    }

    /// Live order record (resting or parked stop)
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        let symbol = self.order_index.get(&order_id).map(|e| e.value().clone())?;
        let book = self.existing_book(&symbol)?;
        let order = book.lock().order(&order_id).cloned();
        order
    }

    pub fn snapshot(&self, symbol: &InstrumentId, depth: usize) -> Option<BookSnapshot> {
        let book = self.existing_book(symbol)?;
        let snapshot = book.lock().snapshot(depth);
        Some(snapshot)
    }

    pub fn last_price(&self, symbol: &InstrumentId) -> Option<Price> {
        let book = self.existing_book(symbol)?;
        let last = book.lock().last_price();
        last
    }

    pub fn symbols(&self) -> Vec<InstrumentId> {
        let mut symbols: Vec<_> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Full consistency check of one book
    pub fn check_invariants(&self, symbol: &InstrumentId) -> Result<(), MatchingError> {
        match self.existing_book(symbol) {
            Some(book) => book.lock().check_invariants(),
            None => Ok(()),
        }
    }
}
