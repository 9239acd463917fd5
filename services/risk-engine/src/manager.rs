//! Margin manager
//!
//! Watches leveraged positions on a fixed check interval. A position
//! that falls into the call band gets one margin call with a deadline; an
//! overdue call, or a fall straight into the liquidation band, starts a
//! chunked liquidation whose due chunks are sold as IOC market orders
//! through the order gateway.
//!
//! The manager's lock is never held across a gateway call.

use matching_engine::{MarketDataStore, OrderGateway};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use types::ids::{AccountId, InstrumentId, MarginCallId, PositionId};
use types::numeric::{Price, Quantity};
use types::order::{OrderRequest, Side};
use types::position::LeveragedPosition;

use crate::events::{MarginEvent, MarginEventBus, MarginEventKind};
use crate::liquidation::LiquidationPlan;
use crate::margin::{classify, required_top_up, MarginCall, MarginCallStatus, MarginStatus, MarginThresholds};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarginError {
    #[error("Position {position_id} is not tracked")]
    UnknownPosition { position_id: String },

    #[error("Margin call {call_id} not found")]
    UnknownCall { call_id: String },

    #[error("Margin call {call_id} is no longer open")]
    CallNotOpen { call_id: String },

    #[error("Top-up of {paid} is below the required {required}")]
    InsufficientTopUp { required: String, paid: String },
}

/// Margin monitoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    pub thresholds: MarginThresholds,
    pub call_deadline_secs: u64,
    /// Largest quantity sold per liquidation chunk
    pub max_chunk: Decimal,
    pub chunk_interval_secs: u64,
    pub check_interval_ms: u64,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            thresholds: MarginThresholds::default(),
            call_deadline_secs: 3_600,
            max_chunk: Decimal::from(100),
            chunk_interval_secs: 60,
            check_interval_ms: 1_000,
        }
    }
}

impl MarginConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    fn call_deadline_nanos(&self) -> i64 {
        scheduler::duration_nanos(Duration::from_secs(self.call_deadline_secs))
    }

    fn chunk_interval_nanos(&self) -> i64 {
        scheduler::duration_nanos(Duration::from_secs(self.chunk_interval_secs))
    }
}

/// Where mark prices come from
pub trait MarkPriceSource: Send + Sync {
    fn mark_price(&self, symbol: &InstrumentId) -> Option<Price>;
}

impl MarkPriceSource for MarketDataStore {
    fn mark_price(&self, symbol: &InstrumentId) -> Option<Price> {
        self.last_price(symbol)
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    position: LeveragedPosition,
    status: MarginStatus,
    open_call: Option<MarginCallId>,
    plan: Option<LiquidationPlan>,
}

#[derive(Debug, Default)]
struct MarginBook {
    positions: BTreeMap<PositionId, Tracked>,
    calls: BTreeMap<MarginCallId, MarginCall>,
}

/// A liquidation chunk picked for execution this check
struct DueChunk {
    position_id: PositionId,
    owner_id: AccountId,
    symbol: InstrumentId,
    index: usize,
    quantity: Quantity,
}

struct ChunkFill {
    chunk: DueChunk,
    outcome: Result<(Quantity, Option<Price>), String>,
}

pub struct MarginManager {
    config: MarginConfig,
    marks: Arc<dyn MarkPriceSource>,
    gateway: Arc<dyn OrderGateway>,
    book: Mutex<MarginBook>,
    events: MarginEventBus,
}

impl MarginManager {
    pub fn new(config: MarginConfig, marks: Arc<dyn MarkPriceSource>, gateway: Arc<dyn OrderGateway>) -> Self {
        info!(
            warning = %config.thresholds.warning,
            call = %config.thresholds.call,
            liquidation = %config.thresholds.liquidation,
            "margin manager created"
        );
        Self {
            config,
            marks,
            gateway,
            book: Mutex::new(MarginBook::default()),
            events: MarginEventBus::default(),
        }
    }

    pub fn config(&self) -> &MarginConfig {
        &self.config
    }

    pub fn subscribe(&self) -> UnboundedReceiver<MarginEvent> {
        self.events.subscribe()
    }

    /// Start monitoring a position
    pub fn open_position(&self, position: LeveragedPosition) -> PositionId {
        let position_id = position.position_id;
        let status = classify(position.margin_ratio(), &self.config.thresholds);
        debug!(%position_id, symbol = %position.symbol, ?status, "tracking leveraged position");
        self.book.lock().positions.insert(
            position_id,
            Tracked {
                position,
                status,
                open_call: None,
                plan: None,
            },
        );
        position_id
    }

    pub fn position(&self, position_id: PositionId) -> Option<LeveragedPosition> {
        self.book.lock().positions.get(&position_id).map(|t| t.position.clone())
    }

    pub fn status(&self, position_id: PositionId) -> Option<MarginStatus> {
        self.book.lock().positions.get(&position_id).map(|t| t.status)
    }

    pub fn call(&self, call_id: MarginCallId) -> Option<MarginCall> {
        self.book.lock().calls.get(&call_id).cloned()
    }

    /// Open call on a position, if any
    pub fn open_call(&self, position_id: PositionId) -> Option<MarginCall> {
        let book = self.book.lock();
        let call_id = book.positions.get(&position_id)?.open_call?;
        book.calls.get(&call_id).cloned()
    }

    pub fn liquidation_plan(&self, position_id: PositionId) -> Option<LiquidationPlan> {
        self.book.lock().positions.get(&position_id)?.plan.clone()
    }

    /// Re-mark, reclassify and act on every open position
    pub fn check(&self, now: i64) -> Vec<MarginEvent> {
        let mut events = Vec::new();
        let due = {
            let mut book = self.book.lock();
            let MarginBook { positions, calls } = &mut *book;
            let mut due = Vec::new();
            for tracked in positions.values_mut().filter(|t| !t.position.is_closed()) {
                self.review(tracked, calls, now, &mut events);
                if let Some(plan) = &tracked.plan {
                    for index in plan.due_chunks(now) {
                        due.push(DueChunk {
                            position_id: plan.position_id,
                            owner_id: plan.owner_id,
                            symbol: plan.symbol.clone(),
                            index,
                            quantity: plan.chunks[index].quantity,
                        });
                    }
                }
            }
            due
        };

        let fills: Vec<ChunkFill> = due.into_iter().map(|chunk| self.sell_chunk(chunk)).collect();

        if !fills.is_empty() {
            let mut book = self.book.lock();
            for fill in fills {
                self.apply_fill(&mut book, fill, now, &mut events);
            }
        }

        self.events.publish(&events);
        events
    }

    fn review(
        &self,
        tracked: &mut Tracked,
        calls: &mut BTreeMap<MarginCallId, MarginCall>,
        now: i64,
        events: &mut Vec<MarginEvent>,
    ) {
        let thresholds = &self.config.thresholds;
        let position = &mut tracked.position;
        if let Some(mark) = self.marks.mark_price(&position.symbol) {
            if mark != position.mark_price {
                position.update_mark_price(mark, now);
            }
        }
        let (position_id, owner_id) = (position.position_id, position.owner_id);
        let event = |kind| MarginEvent::new(position_id, owner_id, kind, now);

        let ratio = position.margin_ratio();
        let mut status = classify(ratio, thresholds);

        // An overdue call escalates to liquidation
        if let Some(call) = tracked.open_call.and_then(|id| calls.get_mut(&id)) {
            if call.is_overdue(now) {
                call.status = MarginCallStatus::Expired;
                warn!(%position_id, call_id = %call.call_id, "margin call expired unresolved");
                events.push(event(MarginEventKind::CallExpired { call_id: call.call_id }));
                tracked.open_call = None;
                status = MarginStatus::Liquidation;
            }
        }

        let previous = tracked.status;
        if status != previous {
            debug!(%position_id, ?previous, ?status, %ratio, "margin status changed");
            events.push(event(MarginEventKind::StatusChanged {
                from: previous,
                to: status,
                margin_ratio: ratio,
            }));
        }

        if status == MarginStatus::Call && previous < MarginStatus::Call && tracked.open_call.is_none() && tracked.plan.is_none() {
            let call = MarginCall::issue(position, thresholds, now, self.config.call_deadline_nanos());
            info!(%position_id, call_id = %call.call_id, top_up = %call.required_top_up, "margin call issued");
            tracked.open_call = Some(call.call_id);
            events.push(event(MarginEventKind::CallIssued { call: call.clone() }));
            calls.insert(call.call_id, call);
        }

        if status == MarginStatus::Liquidation && tracked.plan.is_none() {
            let max_chunk = Quantity::try_new(self.config.max_chunk).unwrap_or_else(Quantity::zero);
            let plan = LiquidationPlan::build(position, max_chunk, self.config.chunk_interval_nanos(), now);
            warn!(%position_id, chunks = plan.chunks.len(), quantity = %position.quantity, "liquidation started");
            events.push(event(MarginEventKind::LiquidationStarted {
                chunks: plan.chunks.len(),
                quantity: position.quantity,
            }));
            tracked.plan = Some(plan);
        }

        tracked.status = status;
    }

    fn sell_chunk(&self, chunk: DueChunk) -> ChunkFill {
        let request = OrderRequest::market(chunk.owner_id, chunk.symbol.clone(), Side::Sell, chunk.quantity);
        let outcome = match self.gateway.submit(request) {
            Ok(result) => Ok((result.order.filled_quantity, result.order.average_fill_price())),
            Err(e) => Err(e.to_string()),
        };
        ChunkFill { chunk, outcome }
    }

    fn apply_fill(&self, book: &mut MarginBook, fill: ChunkFill, now: i64, events: &mut Vec<MarginEvent>) {
        let ChunkFill { chunk, outcome } = fill;
        let Some(tracked) = book.positions.get_mut(&chunk.position_id) else {
            return;
        };
        let event = |kind| MarginEvent::new(chunk.position_id, chunk.owner_id, kind, now);

        match outcome {
            Ok((filled, Some(average_price))) if !filled.is_zero() => {
                if let Some(plan) = tracked.plan.as_mut() {
                    plan.record_fill(chunk.index, filled);
                }
                let surplus = tracked.position.reduce(filled, average_price, now);
                info!(position_id = %chunk.position_id, %filled, price = %average_price, "liquidation chunk sold");
                events.push(event(MarginEventKind::LiquidationChunkExecuted {
                    quantity: filled,
                    average_price,
                    surplus,
                }));
            }
            Ok(_) => {
                if let Some(plan) = tracked.plan.as_mut() {
                    plan.record_fill(chunk.index, Quantity::zero());
                }
                warn!(position_id = %chunk.position_id, "liquidation chunk found no liquidity, retrying next check");
                events.push(event(MarginEventKind::LiquidationChunkFailed {
                    reason: "no liquidity".to_string(),
                }));
            }
            Err(reason) => {
                warn!(position_id = %chunk.position_id, %reason, "liquidation chunk rejected, retrying next check");
                events.push(event(MarginEventKind::LiquidationChunkFailed { reason }));
            }
        }

        if tracked.position.is_closed() {
            if let Some(plan) = tracked.plan.as_mut() {
                plan.cancel();
            }
            if let Some(call) = tracked.open_call.take().and_then(|id| book.calls.get_mut(&id)) {
                call.status = MarginCallStatus::Expired;
            }
            info!(position_id = %chunk.position_id, debt = %tracked.position.debt, "position fully liquidated");
            events.push(event(MarginEventKind::PositionClosed {
                remaining_debt: tracked.position.debt,
            }));
        } else if tracked.plan.as_ref().is_some_and(LiquidationPlan::is_complete) {
            tracked.plan = None;
        }
    }

    /// Meet a margin call by paying `payment` off the position's debt
    ///
    /// The payment must cover the current top-up requirement. Resolution
    /// closes the call and stops any liquidation of the position.
    pub fn resolve_call(&self, call_id: MarginCallId, payment: Decimal, now: i64) -> Result<Decimal, MarginError> {
        let mut events = Vec::new();
        let applied = {
            let mut book = self.book.lock();
            let MarginBook { positions, calls } = &mut *book;
            let call = calls.get_mut(&call_id).ok_or_else(|| MarginError::UnknownCall {
                call_id: call_id.to_string(),
            })?;
            if !call.is_open() {
                return Err(MarginError::CallNotOpen {
                    call_id: call_id.to_string(),
                });
            }
            let tracked = positions.get_mut(&call.position_id).ok_or_else(|| MarginError::UnknownPosition {
                position_id: call.position_id.to_string(),
            })?;

            let required = required_top_up(&tracked.position, &self.config.thresholds);
            if payment < required {
                return Err(MarginError::InsufficientTopUp {
                    required: required.to_string(),
                    paid: payment.to_string(),
                });
            }

            let applied = tracked.position.add_collateral(payment, now);
            call.status = MarginCallStatus::Resolved;
            tracked.open_call = None;
            let (position_id, owner_id) = (tracked.position.position_id, tracked.position.owner_id);
            events.push(MarginEvent::new(
                position_id,
                owner_id,
                MarginEventKind::CallResolved { call_id, payment: applied },
                now,
            ));
            if let Some(mut plan) = tracked.plan.take() {
                let cancelled_chunks = plan.cancel();
                events.push(MarginEvent::new(
                    position_id,
                    owner_id,
                    MarginEventKind::LiquidationStopped { cancelled_chunks },
                    now,
                ));
            }
            tracked.status = classify(tracked.position.margin_ratio(), &self.config.thresholds);
            info!(%call_id, %position_id, %applied, "margin call resolved");
            applied
        };
        self.events.publish(&events);
        Ok(applied)
    }
}

/// Periodic driver for `MarginManager::check`
pub struct MarginTask {
    manager: Arc<MarginManager>,
}

impl MarginTask {
    pub fn new(manager: Arc<MarginManager>) -> Self {
        Self { manager }
    }
}

impl scheduler::PeriodicTask for MarginTask {
    fn name(&self) -> &str {
        "margin"
    }

    fn tick(&mut self, now: i64) -> scheduler::TickOutcome {
        self.manager.check(now);
        scheduler::TickOutcome::Continue
    }
}
