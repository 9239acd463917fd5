//! Market maker orchestrator
//!
//! Every refresh, per instrument:
//! 1. own fills delivered by the engine since the last refresh are booked
//! 2. signals are recomputed from the latest samples
//! 3. the previous quotes are cancelled
//! 4. an IOC rebalance closes any inventory gap beyond the threshold
//! 5. fresh bid/ask quotes rest on the book
//! 6. the external hedge is brought back to its target ratio
//!
//! A failure on one instrument is logged and retried next refresh; it never
//! stops the others. The state lock is released around every gateway call.

use crate::config::MarketMakerConfig;
use crate::hedging::{HedgeBook, HedgeMetrics, HedgePosition, HedgeVenue};
use crate::inventory::MarketMakerPosition;
use crate::quoting::{build_quote, Quote};
use crate::signals::Signals;
use matching_engine::{EngineEvent, MarketDataStore, OrderGateway, SubmitResult};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use scheduler::{PeriodicTask, TickOutcome};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use types::ids::{AccountId, InstrumentId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::{CancelReason, OrderRequest, Side};
use types::trade::Trade;

/// What one refresh did across all instruments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub quotes_placed: usize,
    pub quotes_cancelled: usize,
    pub rebalances: usize,
    pub hedge_adjustments: usize,
    pub failures: usize,
    pub next_interval: Duration,
}

#[derive(Debug)]
struct InstrumentState {
    position: MarketMakerPosition,
    live_quotes: Vec<OrderId>,
    last_quote: Option<Quote>,
    signals: Signals,
}

impl InstrumentState {
    fn new(symbol: InstrumentId) -> Self {
        Self {
            position: MarketMakerPosition::new(symbol),
            live_quotes: Vec::new(),
            last_quote: None,
            signals: Signals::default(),
        }
    }
}

struct MakerState {
    instruments: BTreeMap<InstrumentId, InstrumentState>,
    hedges: HedgeBook,
    fills: UnboundedReceiver<EngineEvent>,
}

pub struct MarketMaker {
    config: MarketMakerConfig,
    account_id: AccountId,
    market_data: Arc<MarketDataStore>,
    gateway: Arc<dyn OrderGateway>,
    hedge_venue: Arc<dyn HedgeVenue>,
    state: Mutex<MakerState>,
}

impl MarketMaker {
    /// `fills` is an engine event subscription; only trades where
    /// `account_id` is the maker are taken from it
    pub fn new(
        config: MarketMakerConfig,
        account_id: AccountId,
        market_data: Arc<MarketDataStore>,
        gateway: Arc<dyn OrderGateway>,
        hedge_venue: Arc<dyn HedgeVenue>,
        fills: UnboundedReceiver<EngineEvent>,
    ) -> Self {
        let instruments = config
            .instruments
            .iter()
            .map(|s| (s.clone(), InstrumentState::new(s.clone())))
            .collect();
        Self {
            config,
            account_id,
            market_data,
            gateway,
            hedge_venue,
            state: Mutex::new(MakerState {
                instruments,
                hedges: HedgeBook::default(),
                fills,
            }),
        }
    }

    pub fn config(&self) -> &MarketMakerConfig {
        &self.config
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn add_instrument(&self, symbol: InstrumentId) {
        let mut state = self.state.lock();
        if !state.instruments.contains_key(&symbol) {
            info!(symbol = %symbol, "market maker quoting new instrument");
            state.instruments.insert(symbol.clone(), InstrumentState::new(symbol));
        }
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.state.lock().instruments.keys().cloned().collect()
    }

    pub fn position(&self, symbol: &InstrumentId) -> Option<MarketMakerPosition> {
        self.state.lock().instruments.get(symbol).map(|s| s.position.clone())
    }

    pub fn positions(&self) -> Vec<MarketMakerPosition> {
        self.state.lock().instruments.values().map(|s| s.position.clone()).collect()
    }

    pub fn last_quote(&self, symbol: &InstrumentId) -> Option<Quote> {
        self.state.lock().instruments.get(symbol).and_then(|s| s.last_quote.clone())
    }

    pub fn live_quotes(&self, symbol: &InstrumentId) -> Vec<OrderId> {
        self.state
            .lock()
            .instruments
            .get(symbol)
            .map(|s| s.live_quotes.clone())
            .unwrap_or_default()
    }

    /// Signals behind the latest quote
    pub fn signals(&self, symbol: &InstrumentId) -> Option<Signals> {
        self.state.lock().instruments.get(symbol).map(|s| s.signals)
    }

    pub fn hedge(&self, symbol: &InstrumentId) -> Option<HedgePosition> {
        self.state.lock().hedges.position(symbol).cloned()
    }

    pub fn hedge_metrics(&self) -> HedgeMetrics {
        self.state.lock().hedges.metrics().clone()
    }

    /// Run one quoting cycle over every instrument
    pub fn refresh(&self, now: i64) -> RefreshSummary {
        let symbols = {
            let mut state = self.state.lock();
            self.book_maker_fills(&mut state);
            state.instruments.keys().cloned().collect::<Vec<_>>()
        };

        let mut summary = RefreshSummary::default();
        let mut max_volatility: f64 = 0.0;
        for symbol in symbols {
            if let Some(volatility) = self.refresh_instrument(&symbol, now, &mut summary) {
                max_volatility = max_volatility.max(volatility);
            }
        }
        summary.next_interval = self.config.interval_for(max_volatility);
        debug!(
            placed = summary.quotes_placed,
            cancelled = summary.quotes_cancelled,
            failures = summary.failures,
            next_ms = summary.next_interval.as_millis() as u64,
            "market maker refresh"
        );
        summary
    }

    /// Cancel every resting quote
    pub fn withdraw_quotes(&self) -> usize {
        let ids: Vec<OrderId> = {
            let mut state = self.state.lock();
            state
                .instruments
                .values_mut()
                .flat_map(|s| std::mem::take(&mut s.live_quotes))
                .collect()
        };
        ids.into_iter()
            .filter(|id| self.gateway.cancel(*id, CancelReason::QuoteRefresh))
            .count()
    }

    /// Returns the instrument's volatility when it had data to quote from
    fn refresh_instrument(&self, symbol: &InstrumentId, now: i64, summary: &mut RefreshSummary) -> Option<f64> {
        let samples = self.market_data.recent(symbol, self.config.signal_window);
        let Some(mid) = samples.last().map(|s| s.price) else {
            debug!(symbol = %symbol, "no market data, not quoting");
            return None;
        };
        let signals = Signals::compute(&samples, self.config.reference_volume);

        let (stale, rebalance) = {
            let mut state = self.state.lock();
            let MakerState { instruments, hedges, .. } = &mut *state;
            let entry = instruments.get_mut(symbol)?;
            entry.signals = signals;
            entry.position.mark(mid);
            hedges.mark(symbol, entry.position.net_size, mid.as_decimal());
            let rebalance = entry
                .position
                .rebalance_order(self.config.target_inventory, self.config.rebalance_threshold);
            (std::mem::take(&mut entry.live_quotes), rebalance)
        };

        for order_id in stale {
            if self.gateway.cancel(order_id, CancelReason::QuoteRefresh) {
                summary.quotes_cancelled += 1;
            }
        }

        if let Some((side, quantity)) = rebalance {
            let request = OrderRequest::market(self.account_id, symbol.clone(), side, quantity);
            match self.gateway.submit(request) {
                Ok(result) => {
                    summary.rebalances += 1;
                    info!(
                        symbol = %symbol,
                        side = ?side,
                        quantity = %quantity,
                        filled = %result.order.filled_quantity,
                        "inventory rebalance"
                    );
                    self.book_taker_fills(symbol, &result);
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(symbol = %symbol, error = %e, "rebalance order failed, retrying next refresh");
                }
            }
        }

        let quote = {
            let mut state = self.state.lock();
            let entry = state.instruments.get_mut(symbol)?;
            let quote = build_quote(mid, &signals, entry.position.net_size, &self.config);
            entry.last_quote = Some(quote.clone());
            quote
        };

        let mut placed = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            let Some(level) = quote.level(side) else {
                continue;
            };
            match self.place_quote(symbol, side, level.price, level.size) {
                Ok(result) => {
                    summary.quotes_placed += 1;
                    self.book_taker_fills(symbol, &result);
                    if result.is_resting() {
                        placed.push(result.order.order_id);
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(symbol = %symbol, side = ?side, error = %e, "quote submission failed, retrying next refresh");
                }
            }
        }

        let mut state = self.state.lock();
        let MakerState { instruments, hedges, .. } = &mut *state;
        let entry = instruments.get_mut(symbol)?;
        entry.live_quotes.extend(placed);

        let net = entry.position.net_size;
        match hedges.rebalance(symbol, net, mid.as_decimal(), self.hedge_venue.as_ref(), &self.config, now) {
            Ok(Some(adjustment)) => {
                summary.hedge_adjustments += 1;
                debug!(symbol = %symbol, adjustment = %adjustment, "hedge adjusted");
            }
            Ok(None) => {}
            Err(e) => {
                summary.failures += 1;
                warn!(symbol = %symbol, error = %e, "hedge adjustment failed, retrying next refresh");
            }
        }
        entry.position.hedge_ratio = hedges.hedge_ratio(symbol, net);

        Some(signals.volatility)
    }

    fn place_quote(
        &self,
        symbol: &InstrumentId,
        side: Side,
        price: Price,
        size: Quantity,
    ) -> Result<SubmitResult, matching_engine::SubmitError> {
        let request = OrderRequest::limit(self.account_id, symbol.clone(), side, price, size);
        self.gateway.submit(request)
    }

    /// Book resting-side fills from the engine event stream
    fn book_maker_fills(&self, state: &mut MakerState) {
        while let Ok(event) = state.fills.try_recv() {
            let EngineEvent::TradeExecuted(trade) = event else {
                continue;
            };
            if trade.maker_owner_id() != self.account_id {
                continue;
            }
            if let Some(entry) = state.instruments.get_mut(trade.symbol()) {
                apply(&mut entry.position, &trade, trade.side().opposite(), trade.maker_fee());
            }
        }
    }

    /// Book fills where our own submission was the aggressor
    fn book_taker_fills(&self, symbol: &InstrumentId, result: &SubmitResult) {
        let mut state = self.state.lock();
        let Some(entry) = state.instruments.get_mut(symbol) else {
            return;
        };
        for trade in result
            .trades
            .iter()
            .filter(|t| t.taker_order_id() == result.order.order_id)
        {
            apply(&mut entry.position, trade, trade.side(), trade.taker_fee());
        }
    }
}

fn apply(position: &mut MarketMakerPosition, trade: &Trade, side: Side, fee: Decimal) {
    let realized = position.apply_fill(side, trade.quantity(), trade.price(), fee);
    debug!(
        symbol = %trade.symbol(),
        side = ?side,
        quantity = %trade.quantity(),
        price = %trade.price(),
        realized = %realized,
        net = %position.net_size,
        "market maker fill"
    );
}

/// Drives a shared `MarketMaker` on its adaptive refresh interval
pub struct MarketMakerTask {
    maker: Arc<MarketMaker>,
}

impl MarketMakerTask {
    pub fn new(maker: Arc<MarketMaker>) -> Self {
        Self { maker }
    }
}

impl PeriodicTask for MarketMakerTask {
    fn name(&self) -> &str {
        "market-maker"
    }

    fn tick(&mut self, now: i64) -> TickOutcome {
        let summary = self.maker.refresh(now);
        TickOutcome::Reschedule(summary.next_interval)
    }
}
