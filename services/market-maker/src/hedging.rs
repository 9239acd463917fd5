//! External hedging of quoted inventory
//!
//! Each underlying with exposure may carry one hedge position on an
//! external venue, sized to offset a target fraction of the net position.
//! The hedge is only touched when the realized ratio drifts from the
//! target by more than the configured threshold, and is removed once the
//! underlying exposure is flat.

use crate::config::MarketMakerConfig;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use types::ids::InstrumentId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HedgeError {
    #[error("Hedge venue unavailable: {0}")]
    Unavailable(String),

    #[error("Hedge order for {instrument} rejected: {reason}")]
    Rejected { instrument: InstrumentId, reason: String },
}

/// Execution report from the hedge venue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgeFill {
    pub price: Decimal,
    /// Fees and slippage paid for this adjustment
    pub cost: Decimal,
}

/// External venue for hedge instruments
pub trait HedgeVenue: Send + Sync {
    /// Trade `size` (signed, positive buys) of `instrument` near `reference_price`
    fn execute(&self, instrument: &InstrumentId, size: Decimal, reference_price: Decimal) -> Result<HedgeFill, HedgeError>;
}

/// Venue that fills every adjustment at the reference price for free
#[derive(Debug, Default, Clone, Copy)]
pub struct PaperHedgeVenue;

impl HedgeVenue for PaperHedgeVenue {
    fn execute(&self, _instrument: &InstrumentId, _size: Decimal, reference_price: Decimal) -> Result<HedgeFill, HedgeError> {
        Ok(HedgeFill {
            price: reference_price,
            cost: Decimal::ZERO,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgePosition {
    pub instrument: InstrumentId,
    /// Signed; opposite in sign to the underlying exposure
    pub size: Decimal,
    /// Average entry price
    pub price: Decimal,
    pub delta: f64,
    /// Accumulated cost of every adjustment
    pub cost: Decimal,
    /// Unix nanos of the last adjustment
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HedgeMetrics {
    pub cumulative_cost: Decimal,
    pub adjustments: u64,
    pub failures: u64,
    /// Mark-to-market PnL of the hedged inventory
    pub underlying_pnl: f64,
    pub hedge_pnl: f64,
}

impl HedgeMetrics {
    /// Dollar-offset ratio: hedge PnL against underlying PnL
    ///
    /// 1.0 is a perfect offset; None until the underlying has moved.
    pub fn effectiveness(&self) -> Option<f64> {
        (self.underlying_pnl.abs() > f64::EPSILON).then(|| -self.hedge_pnl / self.underlying_pnl)
    }
}

#[derive(Debug, Default)]
pub struct HedgeBook {
    positions: BTreeMap<InstrumentId, HedgePosition>,
    last_marks: BTreeMap<InstrumentId, Decimal>,
    metrics: HedgeMetrics,
}

impl HedgeBook {
    pub fn position(&self, underlying: &InstrumentId) -> Option<&HedgePosition> {
        self.positions.get(underlying)
    }

    pub fn metrics(&self) -> &HedgeMetrics {
        &self.metrics
    }

    /// Share of `net` offset by the hedge; zero when flat
    pub fn hedge_ratio(&self, underlying: &InstrumentId, net: Decimal) -> f64 {
        let Some(hedge) = self.positions.get(underlying) else {
            return 0.0;
        };
        if net.is_zero() {
            return 0.0;
        }
        let offset = hedge.size.to_f64().unwrap_or(0.0) * hedge.delta;
        -offset / net.to_f64().unwrap_or(f64::INFINITY)
    }

    /// Accumulate mark-to-market moves of the underlying and its hedge
    pub fn mark(&mut self, underlying: &InstrumentId, net: Decimal, price: Decimal) {
        if let Some(prev) = self.last_marks.insert(underlying.clone(), price) {
            let moved = (price - prev).to_f64().unwrap_or(0.0);
            self.metrics.underlying_pnl += net.to_f64().unwrap_or(0.0) * moved;
            if let Some(hedge) = self.positions.get(underlying) {
                self.metrics.hedge_pnl += hedge.size.to_f64().unwrap_or(0.0) * hedge.delta * moved;
            }
        }
    }

    /// Signed hedge trade needed for `net`, if the ratio has drifted
    pub fn required_adjustment(&self, underlying: &InstrumentId, net: Decimal, config: &MarketMakerConfig) -> Option<Decimal> {
        let current = self.positions.get(underlying).map(|h| h.size).unwrap_or(Decimal::ZERO);
        if net.is_zero() {
            return (!current.is_zero()).then_some(-current);
        }
        let ratio = self.hedge_ratio(underlying, net);
        if (ratio - config.hedge_target_ratio).abs() <= config.hedge_threshold {
            return None;
        }
        let per_unit = Decimal::from_f64(config.hedge_target_ratio / config.hedge_delta)?.round_dp(8);
        let desired = (-net * per_unit).round_dp_with_strategy(config.lot_decimals, RoundingStrategy::ToZero);
        let adjustment = desired - current;
        (!adjustment.is_zero()).then_some(adjustment)
    }

    /// Bring the hedge for `underlying` back to target through `venue`
    ///
    /// Returns the executed adjustment, or None when within tolerance.
    pub fn rebalance(
        &mut self,
        underlying: &InstrumentId,
        net: Decimal,
        reference_price: Decimal,
        venue: &dyn HedgeVenue,
        config: &MarketMakerConfig,
        now: i64,
    ) -> Result<Option<Decimal>, HedgeError> {
        let Some(adjustment) = self.required_adjustment(underlying, net, config) else {
            return Ok(None);
        };
        let instrument = config.hedge_instrument(underlying);
        let fill = match venue.execute(&instrument, adjustment, reference_price) {
            Ok(fill) => fill,
            Err(e) => {
                self.metrics.failures += 1;
                return Err(e);
            }
        };
        self.apply(underlying, instrument, adjustment, fill, config.hedge_delta, now);
        Ok(Some(adjustment))
    }

    fn apply(&mut self, underlying: &InstrumentId, instrument: InstrumentId, size: Decimal, fill: HedgeFill, delta: f64, now: i64) {
        self.metrics.cumulative_cost += fill.cost;
        self.metrics.adjustments += 1;

        let hedge = self.positions.entry(underlying.clone()).or_insert_with(|| HedgePosition {
            instrument,
            size: Decimal::ZERO,
            price: fill.price,
            delta,
            cost: Decimal::ZERO,
            timestamp: now,
        });
        let adding = hedge.size.is_zero() || (hedge.size > Decimal::ZERO) == (size > Decimal::ZERO);
        if adding {
            let held = hedge.size.abs();
            hedge.price = (held * hedge.price + size.abs() * fill.price) / (held + size.abs());
        } else if size.abs() > hedge.size.abs() {
            hedge.price = fill.price;
        }
        hedge.size += size;
        hedge.cost += fill.cost;
        hedge.timestamp = now;

        if hedge.size.is_zero() {
            self.positions.remove(underlying);
        }
    }
}
