//! Composition root
//!
//! Builds every component from one `ExchangeConfig`, routes executed
//! trades to the ledger, settlement and market data, and runs the
//! periodic work on a `Scheduler`.

use crate::config::{AccountSeed, ConfigError, ExchangeConfig};
use crate::ledger::{AccountPortfolio, Ledger};
use market_maker::{MarketMaker, MarketMakerTask, PaperHedgeVenue};
use matching_engine::{
    EngineEvent, MarketDataStore, MatchingEngine, OrderGateway, OrderValidator, SubmitError, SubmitResult,
    ValidatingGateway,
};
use parking_lot::Mutex;
use risk_engine::{MarginManager, MarginTask, RiskEngine, RiskTask};
use scheduler::{PeriodicTask, Scheduler, SchedulerError, SharedClock, TickOutcome};
use settlement::{SettlementEngine, SettlementTask};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use types::ids::{AccountId, OrderId};
use types::market_data::MarketSample;
use types::order::{CancelReason, OrderRequest};
use types::trade::Trade;

const ROUTER_PERIOD: Duration = Duration::from_millis(10);

/// Delivers executed trades to everything downstream of matching
///
/// Order updates go to the ledger too, so finished orders free their
/// reservations.
pub struct TradeRouter {
    events: UnboundedReceiver<EngineEvent>,
    ledger: Arc<Ledger>,
    settlement: Arc<SettlementEngine>,
    market_data: Arc<MarketDataStore>,
    routed: u64,
}

impl TradeRouter {
    pub fn new(
        events: UnboundedReceiver<EngineEvent>,
        ledger: Arc<Ledger>,
        settlement: Arc<SettlementEngine>,
        market_data: Arc<MarketDataStore>,
    ) -> Self {
        Self {
            events,
            ledger,
            settlement,
            market_data,
            routed: 0,
        }
    }

    /// Trades routed so far
    pub fn routed(&self) -> u64 {
        self.routed
    }

    /// Route everything queued; returns the number of trades handled
    pub fn drain(&mut self) -> usize {
        let mut trades = 0;
        loop {
            match self.events.try_recv() {
                Ok(EngineEvent::TradeExecuted(trade)) => {
                    self.route(&trade);
                    trades += 1;
                }
                Ok(EngineEvent::OrderUpdated(order)) => self.ledger.apply_order_update(&order),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.routed += trades as u64;
        trades
    }

    fn route(&self, trade: &Trade) {
        self.ledger.apply_trade(trade);
        self.settlement.record_trade(trade);

        // A print older than the newest sample would be dropped by the store
        let stale = self
            .market_data
            .last_sample(trade.symbol())
            .is_some_and(|last| last.timestamp > trade.executed_at());
        if stale {
            debug!(trade_id = %trade.trade_id(), "print behind market data, not recorded");
            return;
        }
        self.market_data.push(
            MarketSample::new(trade.symbol().clone(), trade.executed_at(), trade.price(), trade.quantity())
                .with_aggressor(trade.side()),
        );
    }
}

struct RouterTask {
    router: Arc<Mutex<TradeRouter>>,
}

impl PeriodicTask for RouterTask {
    fn name(&self) -> &str {
        "trade-router"
    }

    fn tick(&mut self, _now: i64) -> TickOutcome {
        self.router.lock().drain();
        TickOutcome::Continue
    }
}

struct ExpiryTask {
    engine: Arc<MatchingEngine>,
}

impl PeriodicTask for ExpiryTask {
    fn name(&self) -> &str {
        "order-expiry"
    }

    fn tick(&mut self, now: i64) -> TickOutcome {
        let expired = self.engine.expire(now);
        if !expired.is_empty() {
            debug!(count = expired.len(), "orders expired");
        }
        TickOutcome::Continue
    }
}

pub struct Exchange {
    config: ExchangeConfig,
    clock: SharedClock,
    market_data: Arc<MarketDataStore>,
    engine: Arc<MatchingEngine>,
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<Ledger>,
    router: Arc<Mutex<TradeRouter>>,
    maker: Option<Arc<MarketMaker>>,
    risk: Arc<RiskEngine>,
    margin: Arc<MarginManager>,
    settlement: Arc<SettlementEngine>,
}

impl Exchange {
    pub fn build(config: ExchangeConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now_nanos();

        let ledger = Arc::new(Ledger::new());
        for seed in &config.accounts {
            ledger.open(seed, now);
        }
        let market_data = Arc::new(MarketDataStore::new(config.matching.history_capacity));
        let engine = Arc::new(MatchingEngine::new(config.matching.fees.clone(), clock.clone()));
        let validator = OrderValidator::new(
            config.matching.validator.clone(),
            market_data.clone(),
            ledger.clone(),
            config.matching.fees.taker_rate,
        );
        let gateway: Arc<dyn OrderGateway> = Arc::new(ValidatingGateway::new(validator, engine.clone(), clock.clone()));

        let settlement = Arc::new(SettlementEngine::new(config.settlement.clone(), ledger.clone()));
        let router = Arc::new(Mutex::new(TradeRouter::new(
            engine.subscribe(),
            ledger.clone(),
            settlement.clone(),
            market_data.clone(),
        )));

        let maker = if config.market_maker.enabled {
            let account_id = ledger
                .account_id(&config.market_maker.account)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown account '{}'", config.market_maker.account)))?;
            Some(Arc::new(MarketMaker::new(
                config.market_maker.quoting.clone(),
                account_id,
                market_data.clone(),
                gateway.clone(),
                Arc::new(PaperHedgeVenue),
                engine.subscribe(),
            )))
        } else {
            None
        };

        let risk_account = match ledger.account_id(&config.risk.account) {
            Some(id) => id,
            None => ledger.open(
                &AccountSeed {
                    name: config.risk.account.clone(),
                    cash: Default::default(),
                    holdings: Default::default(),
                    allow_short: false,
                },
                now,
            ),
        };
        let portfolio = AccountPortfolio::new(
            ledger.clone(),
            risk_account,
            market_data.clone(),
            config.market_maker.quoting.signal_window,
            config.market_maker.quoting.reference_volume,
        );
        let risk = Arc::new(RiskEngine::new(config.risk.engine.clone(), Arc::new(portfolio)));
        let margin = Arc::new(MarginManager::new(config.margin.clone(), market_data.clone(), gateway.clone()));

        info!(
            accounts = config.accounts.len(),
            market_maker = config.market_maker.enabled,
            "exchange assembled"
        );
        Ok(Self {
            config,
            clock,
            market_data,
            engine,
            gateway,
            ledger,
            router,
            maker,
            risk,
            margin,
            settlement,
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn market_data(&self) -> &Arc<MarketDataStore> {
        &self.market_data
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }

    pub fn gateway(&self) -> &Arc<dyn OrderGateway> {
        &self.gateway
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn market_maker(&self) -> Option<&Arc<MarketMaker>> {
        self.maker.as_ref()
    }

    pub fn risk(&self) -> &Arc<RiskEngine> {
        &self.risk
    }

    pub fn margin(&self) -> &Arc<MarginManager> {
        &self.margin
    }

    pub fn settlement(&self) -> &Arc<SettlementEngine> {
        &self.settlement
    }

    pub fn account_id(&self, name: &str) -> Option<AccountId> {
        self.ledger.account_id(name)
    }

    /// Submit through validation and route the resulting trades at once
    pub fn submit(&self, request: OrderRequest) -> Result<SubmitResult, SubmitError> {
        let result = self.gateway.submit(request);
        self.route_trades();
        result
    }

    /// Cancel a live order and release what it reserved
    pub fn cancel(&self, order_id: OrderId) -> bool {
        let cancelled = self.gateway.cancel(order_id, CancelReason::UserRequested);
        self.route_trades();
        cancelled
    }

    /// Accept one normalized market-data sample
    pub fn publish(&self, sample: MarketSample) -> bool {
        self.market_data.push(sample)
    }

    /// Route trades produced since the last call
    pub fn route_trades(&self) -> usize {
        self.router.lock().drain()
    }

    pub fn trades_routed(&self) -> u64 {
        self.router.lock().routed()
    }

    /// Spawn the periodic work on the current runtime
    pub fn start(&self) -> Result<Scheduler, SchedulerError> {
        let mut scheduler = Scheduler::new(self.clock.clone());
        scheduler.spawn(
            RouterTask {
                router: self.router.clone(),
            },
            ROUTER_PERIOD,
        )?;
        scheduler.spawn(
            ExpiryTask {
                engine: self.engine.clone(),
            },
            Duration::from_millis(self.config.matching.expiry_interval_ms),
        )?;
        if let Some(maker) = &self.maker {
            scheduler.spawn(
                MarketMakerTask::new(maker.clone()),
                Duration::from_millis(self.config.market_maker.quoting.base_interval_ms),
            )?;
        }
        scheduler.spawn(RiskTask::new(self.risk.clone()), Duration::from_millis(self.config.risk.interval_ms))?;
        scheduler.spawn(MarginTask::new(self.margin.clone()), self.config.margin.check_interval())?;
        scheduler.spawn(
            SettlementTask::new(self.settlement.clone()),
            self.config.settlement.batch_interval(),
        )?;
        info!(tasks = scheduler.task_count(), "exchange started");
        Ok(scheduler)
    }
}
