//! Quote signals from recent market samples
//!
//! All four signals are computed over the same window of time-ordered
//! samples:
//! - volatility: standard deviation of per-sample log returns
//! - liquidity: average print volume against a reference, in [0, 1]
//! - momentum: summed log returns over the window
//! - imbalance: signed aggressor volume share, in [-1, 1]

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::market_data::MarketSample;
use types::order::Side;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signals {
    pub volatility: f64,
    pub liquidity: f64,
    pub momentum: f64,
    /// Positive when buyers are lifting offers
    pub imbalance: f64,
}

impl Signals {
    pub fn compute(samples: &[MarketSample], reference_volume: Decimal) -> Self {
        let returns = log_returns(samples);
        Self {
            volatility: volatility(&returns),
            liquidity: liquidity_score(samples, reference_volume),
            momentum: returns.iter().sum(),
            imbalance: imbalance(samples),
        }
    }
}

fn log_returns(samples: &[MarketSample]) -> Vec<f64> {
    samples
        .windows(2)
        .filter_map(|w| {
            let (prev, next) = (w[0].price.to_f64(), w[1].price.to_f64());
            (prev > 0.0 && next > 0.0).then(|| (next / prev).ln())
        })
        .collect()
}

/// Sample standard deviation; zero below two returns
pub fn volatility(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}

pub fn liquidity_score(samples: &[MarketSample], reference_volume: Decimal) -> f64 {
    if samples.is_empty() || reference_volume <= Decimal::ZERO {
        return 0.0;
    }
    let total: Decimal = samples.iter().map(|s| s.volume.as_decimal()).sum();
    let average = total / Decimal::from(samples.len());
    (average / reference_volume).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

/// Signed volume share by aggressor
///
/// Samples without an aggressor are classified by the tick rule: an
/// uptick counts as buying, a downtick as selling, an unchanged print
/// is ignored.
pub fn imbalance(samples: &[MarketSample]) -> f64 {
    let mut buy = Decimal::ZERO;
    let mut sell = Decimal::ZERO;
    for (i, sample) in samples.iter().enumerate() {
        let side = sample.aggressor.or_else(|| {
            let prev = samples.get(i.checked_sub(1)?)?;
            match sample.price.cmp(&prev.price) {
                std::cmp::Ordering::Greater => Some(Side::Buy),
                std::cmp::Ordering::Less => Some(Side::Sell),
                std::cmp::Ordering::Equal => None,
            }
        });
        match side {
            Some(Side::Buy) => buy += sample.volume.as_decimal(),
            Some(Side::Sell) => sell += sample.volume.as_decimal(),
            None => {}
        }
    }
    let total = buy + sell;
    if total.is_zero() {
        return 0.0;
    }
    ((buy - sell) / total).to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::InstrumentId;
    use types::numeric::{Price, Quantity};

    fn sample(t: i64, price: u64, volume: u64) -> MarketSample {
        MarketSample::new(InstrumentId::new("ACME"), t, Price::from_u64(price), Quantity::from_u64(volume))
    }

    #[test]
    fn test_flat_prices_have_no_volatility_or_momentum() {
        let samples: Vec<_> = (0..10).map(|t| sample(t, 100, 50)).collect();
        let signals = Signals::compute(&samples, Decimal::from(100));
        assert_eq!(signals.volatility, 0.0);
        assert_eq!(signals.momentum, 0.0);
        assert_eq!(signals.imbalance, 0.0);
        assert!((signals.liquidity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_follows_trend() {
        let up: Vec<_> = (0..10).map(|t| sample(t, 100 + t as u64, 10)).collect();
        let signals = Signals::compute(&up, Decimal::from(100));
        assert!((signals.momentum - (109.0f64 / 100.0).ln()).abs() < 1e-12);
        assert!(signals.imbalance > 0.99);
    }

    #[test]
    fn test_choppy_prices_raise_volatility() {
        let calm: Vec<_> = (0..20).map(|t| sample(t, 100 + (t % 2) as u64, 10)).collect();
        let wild: Vec<_> = (0..20).map(|t| sample(t, 100 + 10 * (t % 2) as u64, 10)).collect();
        let reference = Decimal::from(100);
        assert!(Signals::compute(&wild, reference).volatility > Signals::compute(&calm, reference).volatility);
    }

    #[test]
    fn test_liquidity_is_capped() {
        let samples = vec![sample(0, 100, 1_000)];
        assert_eq!(liquidity_score(&samples, Decimal::from(100)), 1.0);
        assert_eq!(liquidity_score(&[], Decimal::from(100)), 0.0);
    }

    #[test]
    fn test_aggressor_overrides_tick_rule() {
        let samples = vec![
            sample(0, 100, 10),
            sample(1, 101, 30).with_aggressor(Side::Sell),
            sample(2, 102, 10),
        ];
        // sell 30, buy 10
        assert!((imbalance(&samples) + 0.5).abs() < 1e-12);
    }
}
