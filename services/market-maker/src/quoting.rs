//! Two-sided quote construction
//!
//! spread = base + volatility term + illiquidity term + |momentum| term,
//! clamped to the configured bounds. The quote center moves away from the
//! current exposure by a tanh-bounded inventory skew and toward recent
//! order flow. Sizes scale with the liquidity score and shrink on the
//! side that would grow the position.

use crate::config::MarketMakerConfig;
use crate::signals::Signals;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};
use types::order::Side;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteLevel {
    pub price: Price,
    pub size: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub mid: Price,
    /// Full spread as a fraction of the mid
    pub spread: f64,
    /// Inventory skew as a fraction of the mid; positive when long
    pub skew: f64,
    pub bid: Option<QuoteLevel>,
    pub ask: Option<QuoteLevel>,
}

impl Quote {
    pub fn level(&self, side: Side) -> Option<&QuoteLevel> {
        match side {
            Side::Buy => self.bid.as_ref(),
            Side::Sell => self.ask.as_ref(),
        }
    }
}

pub fn spread(signals: &Signals, config: &MarketMakerConfig) -> f64 {
    let raw = config.base_spread
        + config.volatility_coefficient * signals.volatility
        + config.illiquidity_coefficient * (1.0 - signals.liquidity.clamp(0.0, 1.0))
        + config.momentum_coefficient * signals.momentum.abs();
    if raw.is_finite() {
        raw.clamp(config.min_spread, config.max_spread)
    } else {
        config.max_spread
    }
}

/// maxSkew × tanh(k × (net − target) / maxInventory)
pub fn inventory_skew(net: Decimal, config: &MarketMakerConfig) -> f64 {
    let gap = ((net - config.target_inventory) / config.max_inventory)
        .to_f64()
        .unwrap_or(0.0);
    config.max_skew * (config.skew_sensitivity * gap).tanh()
}

/// Fraction of the base size to show on `side`; None when that side is full
pub fn size_factor(side: Side, net: Decimal, liquidity: f64, config: &MarketMakerConfig) -> Option<f64> {
    let exposure = match side {
        Side::Buy => net,
        Side::Sell => -net,
    };
    if exposure >= config.max_inventory {
        return None;
    }
    let usage = (exposure.max(Decimal::ZERO) / config.max_inventory)
        .to_f64()
        .unwrap_or(1.0);
    let liquidity = config.min_size_factor + (1.0 - config.min_size_factor) * liquidity.clamp(0.0, 1.0);
    Some(liquidity * (1.0 - usage))
}

pub fn build_quote(mid: Price, signals: &Signals, net: Decimal, config: &MarketMakerConfig) -> Quote {
    let spread = spread(signals, config);
    let skew = inventory_skew(net, config);
    let nudge = config.imbalance_coefficient * signals.imbalance.clamp(-1.0, 1.0);
    let center = mid.to_f64() * (1.0 - skew + nudge);

    let tick = config.tick_size;
    let bid_price = to_decimal(center * (1.0 - spread / 2.0))
        .map(|p| round_to(p, tick, RoundingStrategy::ToNegativeInfinity));
    let ask_price = to_decimal(center * (1.0 + spread / 2.0))
        .map(|p| round_to(p, tick, RoundingStrategy::ToPositiveInfinity));
    let (bid_price, ask_price) = match (bid_price, ask_price) {
        (Some(bid), Some(ask)) if ask <= bid => (Some(bid), Some(bid + tick.max(Decimal::new(1, 8)))),
        other => other,
    };

    let level = |side: Side, price: Option<Decimal>| -> Option<QuoteLevel> {
        let price = Price::try_new(price?)?;
        let factor = Decimal::from_f64(size_factor(side, net, signals.liquidity, config)?)?.round_dp(8);
        let size = (config.base_size * factor).round_dp_with_strategy(config.lot_decimals, RoundingStrategy::ToZero);
        let size = Quantity::try_new(size).filter(|q| !q.is_zero())?;
        Some(QuoteLevel { price, size })
    };

    Quote {
        mid,
        spread,
        skew,
        bid: level(Side::Buy, bid_price),
        ask: level(Side::Sell, ask_price),
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(8))
}

fn round_to(value: Decimal, tick: Decimal, strategy: RoundingStrategy) -> Decimal {
    if tick <= Decimal::ZERO {
        return value;
    }
    (value / tick).round_dp_with_strategy(0, strategy) * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> Signals {
        Signals {
            volatility: 0.0,
            liquidity: 1.0,
            momentum: 0.0,
            imbalance: 0.0,
        }
    }

    fn quote(net: i64, signals: Signals) -> Quote {
        build_quote(Price::from_u64(100), &signals, Decimal::from(net), &MarketMakerConfig::default())
    }

    #[test]
    fn test_flat_inventory_quotes_symmetrically() {
        let q = quote(0, calm());
        let bid = q.bid.unwrap();
        let ask = q.ask.unwrap();
        // 0.2% spread around 100
        assert_eq!(bid.price, Price::new(Decimal::new(9990, 2)));
        assert_eq!(ask.price, Price::new(Decimal::new(10010, 2)));
        assert_eq!(bid.size, ask.size);
        assert_eq!(bid.size, Quantity::from_u64(5));
    }

    #[test]
    fn test_spread_widens_with_risk_and_is_clamped() {
        let config = MarketMakerConfig::default();
        let base = spread(&calm(), &config);
        let volatile = Signals {
            volatility: 0.005,
            ..calm()
        };
        let illiquid = Signals {
            liquidity: 0.0,
            ..calm()
        };
        let trending = Signals {
            momentum: -0.004,
            ..calm()
        };
        assert!(spread(&volatile, &config) > base);
        assert!(spread(&illiquid, &config) > base);
        assert!(spread(&trending, &config) > base);

        let extreme = Signals {
            volatility: 10.0,
            ..calm()
        };
        assert_eq!(spread(&extreme, &config), config.max_spread);
        let tight = MarketMakerConfig {
            base_spread: 0.0,
            ..MarketMakerConfig::default()
        };
        assert_eq!(spread(&calm(), &tight), tight.min_spread);
    }

    #[test]
    fn test_long_inventory_shifts_quotes_down() {
        let flat = quote(0, calm());
        let long = quote(50, calm());
        assert!(long.skew > 0.0);
        assert!(long.bid.unwrap().price < flat.bid.unwrap().price);
        assert!(long.ask.unwrap().price < flat.ask.unwrap().price);
        // buying side shrinks, selling side keeps full size
        assert!(long.bid.unwrap().size < flat.bid.unwrap().size);
        assert_eq!(long.ask.unwrap().size, flat.ask.unwrap().size);
    }

    #[test]
    fn test_skew_is_bounded() {
        let config = MarketMakerConfig::default();
        assert!(inventory_skew(Decimal::from(1_000_000), &config) <= config.max_skew);
        assert!(inventory_skew(Decimal::from(-1_000_000), &config) >= -config.max_skew);
        assert_eq!(inventory_skew(config.target_inventory, &config), 0.0);
    }

    #[test]
    fn test_full_side_is_not_quoted() {
        let long = quote(100, calm());
        assert!(long.bid.is_none());
        assert!(long.ask.is_some());
        let short = quote(-120, calm());
        assert!(short.ask.is_none());
        assert!(short.bid.is_some());
    }

    #[test]
    fn test_buy_flow_nudges_mid_up() {
        let flow = Signals {
            imbalance: 1.0,
            ..calm()
        };
        assert!(quote(0, flow).bid.unwrap().price > quote(0, calm()).bid.unwrap().price);
    }

    #[test]
    fn test_thin_market_quotes_smaller() {
        let thin = Signals {
            liquidity: 0.0,
            ..calm()
        };
        // min_size_factor 0.2 of 5
        assert_eq!(quote(0, thin).bid.unwrap().size, Quantity::from_u64(1));
    }
}
