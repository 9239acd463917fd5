//! Market maker configuration
//!
//! Spread terms and skew are fractions of the mid price. Sizes and
//! inventory limits are in instrument units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use types::ids::InstrumentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketMakerConfig {
    /// Instruments quoted from startup
    pub instruments: Vec<InstrumentId>,
    /// Samples used for each signal computation
    pub signal_window: usize,
    /// Average print volume that earns a full liquidity score
    pub reference_volume: Decimal,

    pub base_spread: f64,
    pub min_spread: f64,
    pub max_spread: f64,
    /// Spread added per unit of per-sample volatility
    pub volatility_coefficient: f64,
    /// Spread added at zero liquidity score
    pub illiquidity_coefficient: f64,
    pub momentum_coefficient: f64,
    /// Mid shift at full one-sided order flow
    pub imbalance_coefficient: f64,

    /// Largest mid shift from inventory
    pub max_skew: f64,
    /// Steepness of the skew curve
    pub skew_sensitivity: f64,
    pub max_inventory: Decimal,
    pub target_inventory: Decimal,
    /// Gap to target that triggers an explicit IOC rebalance
    pub rebalance_threshold: Decimal,

    pub base_size: Decimal,
    /// Size fraction kept at zero liquidity score
    pub min_size_factor: f64,
    pub tick_size: Decimal,
    pub lot_decimals: u32,

    /// Fraction of net exposure to offset externally
    pub hedge_target_ratio: f64,
    /// Ratio drift tolerated before adjusting
    pub hedge_threshold: f64,
    /// Exposure offset by one unit of the hedge instrument
    pub hedge_delta: f64,
    /// Underlying to external hedge instrument; unmapped ones hedge in kind
    pub hedge_instruments: BTreeMap<InstrumentId, InstrumentId>,

    pub base_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// How strongly volatility shortens the refresh interval
    pub volatility_sensitivity: f64,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            signal_window: 50,
            reference_volume: Decimal::from(100),
            base_spread: 0.002,
            min_spread: 0.0005,
            max_spread: 0.05,
            volatility_coefficient: 2.0,
            illiquidity_coefficient: 0.002,
            momentum_coefficient: 0.5,
            imbalance_coefficient: 0.0005,
            max_skew: 0.005,
            skew_sensitivity: 2.0,
            max_inventory: Decimal::from(100),
            target_inventory: Decimal::ZERO,
            rebalance_threshold: Decimal::from(60),
            base_size: Decimal::from(5),
            min_size_factor: 0.2,
            tick_size: Decimal::new(1, 2),
            lot_decimals: 4,
            hedge_target_ratio: 0.5,
            hedge_threshold: 0.1,
            hedge_delta: 1.0,
            hedge_instruments: BTreeMap::new(),
            base_interval_ms: 1_000,
            min_interval_ms: 100,
            max_interval_ms: 5_000,
            volatility_sensitivity: 100.0,
        }
    }
}

impl MarketMakerConfig {
    pub fn is_valid(&self) -> bool {
        self.min_spread > 0.0
            && self.base_spread >= 0.0
            && self.min_spread <= self.max_spread
            && self.max_inventory > Decimal::ZERO
            && self.target_inventory.abs() < self.max_inventory
            && self.base_size > Decimal::ZERO
            && (0.0..=1.0).contains(&self.min_size_factor)
            && (0.0..=1.0).contains(&self.hedge_target_ratio)
            && self.hedge_delta > 0.0
            && self.min_interval_ms > 0
            && self.min_interval_ms <= self.base_interval_ms
            && self.base_interval_ms <= self.max_interval_ms
    }

    pub fn hedge_instrument(&self, underlying: &InstrumentId) -> InstrumentId {
        self.hedge_instruments
            .get(underlying)
            .cloned()
            .unwrap_or_else(|| underlying.clone())
    }

    /// Refresh interval for the observed volatility
    ///
    /// The base interval shrinks as volatility rises and is clamped to
    /// `[min_interval_ms, max_interval_ms]`.
    pub fn interval_for(&self, volatility: f64) -> Duration {
        let vol = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
        let scaled = self.base_interval_ms as f64 / (1.0 + self.volatility_sensitivity * vol);
        let ms = scaled.clamp(self.min_interval_ms as f64, self.max_interval_ms as f64);
        Duration::from_millis(ms.round() as u64)
    }
}
