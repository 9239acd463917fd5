//! Seeded synthetic market
//!
//! A random-walk reference price per instrument, published as market-data
//! samples, plus retail order flow around it. The same seed always yields
//! the same samples and orders.

use crate::config::FeedConfig;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use types::ids::{AccountId, InstrumentId};
use types::market_data::MarketSample;
use types::numeric::{Price, Quantity};
use types::order::{OrderRequest, Side};

/// Share of trader orders sent as market orders
const MARKET_ORDER_RATIO: f64 = 0.3;
/// Widest limit distance from the reference, in basis points
const MAX_LIMIT_DISTANCE_BPS: u32 = 50;

/// What one feed step produced
#[derive(Debug, Clone, Default)]
pub struct FeedStep {
    pub samples: Vec<MarketSample>,
    pub orders: Vec<OrderRequest>,
}

pub struct SyntheticFeed {
    config: FeedConfig,
    trader: AccountId,
    prices: BTreeMap<InstrumentId, f64>,
    rng: ChaCha8Rng,
}

impl SyntheticFeed {
    pub fn new(config: FeedConfig, trader: AccountId) -> Self {
        let prices = config
            .instruments
            .iter()
            .map(|(symbol, start)| (symbol.clone(), start.to_f64().unwrap_or(1.0)))
            .collect();
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            trader,
            prices,
            rng,
        }
    }

    pub fn reference_price(&self, symbol: &InstrumentId) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    /// Advance every instrument by one tick at time `now`
    pub fn step(&mut self, now: i64) -> FeedStep {
        let mut step = FeedStep::default();
        let symbols: Vec<InstrumentId> = self.prices.keys().cloned().collect();
        for symbol in symbols {
            let Some(price) = self.advance(&symbol) else {
                continue;
            };
            let volume = Quantity::from_u64(self.rng.gen_range(1..=200));
            let aggressor = if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            step.samples
                .push(MarketSample::new(symbol.clone(), now, price, volume).with_aggressor(aggressor));

            if self.rng.gen_bool(self.config.order_probability.clamp(0.0, 1.0)) {
                if let Some(order) = self.retail_order(&symbol, price) {
                    step.orders.push(order);
                }
            }
        }
        step
    }

    /// Log-price step with unit-variance uniform noise
    fn advance(&mut self, symbol: &InstrumentId) -> Option<Price> {
        let noise: f64 = self.rng.gen_range(-1.0..1.0) * 3f64.sqrt();
        let price = self.prices.get_mut(symbol)?;
        *price *= (self.config.volatility * noise).exp();
        let rounded = Decimal::from_f64(*price)?.round_dp(2);
        Price::try_new(rounded)
    }

    fn retail_order(&mut self, symbol: &InstrumentId, reference: Price) -> Option<OrderRequest> {
        let side = if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let max = self.config.max_order_size.to_f64().unwrap_or(1.0).max(0.0001);
        let size = Decimal::from_f64(self.rng.gen_range(0.0001..=max))?.round_dp(4);
        let quantity = Quantity::try_new(size).filter(|q| !q.is_zero())?;

        if self.rng.gen_bool(MARKET_ORDER_RATIO) {
            return Some(OrderRequest::market(self.trader, symbol.clone(), side, quantity));
        }
        let bps = self.rng.gen_range(1..=MAX_LIMIT_DISTANCE_BPS);
        let distance = reference.as_decimal() * Decimal::from(bps) / Decimal::from(10_000);
        let limit = match side {
            Side::Buy => reference.as_decimal() - distance,
            Side::Sell => reference.as_decimal() + distance,
        };
        let price = Price::try_new(limit.round_dp(2))?;
        Some(OrderRequest::limit(self.trader, symbol.clone(), side, price, quantity))
    }
}
