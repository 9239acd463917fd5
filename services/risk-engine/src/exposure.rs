//! Exposure and position value calculations
//!
//! A `PortfolioSnapshot` is the consistent view of cash and marked
//! positions that one risk cycle works from.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::InstrumentId;
use types::numeric::Price;

/// Supplies a consistent portfolio view to the risk engine
pub trait PortfolioSource: Send + Sync {
    fn portfolio(&self) -> PortfolioSnapshot;
}

/// One marked holding; `quantity` is signed (negative = short)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionExposure {
    pub symbol: InstrumentId,
    pub quantity: Decimal,
    pub mark_price: Price,
    /// Annualized volatility of the instrument, when known
    pub volatility: Option<f64>,
    /// 0 (illiquid) to 1 (deep book)
    pub liquidity_score: f64,
}

impl PositionExposure {
    pub fn new(symbol: InstrumentId, quantity: Decimal, mark_price: Price) -> Self {
        Self {
            symbol,
            quantity,
            mark_price,
            volatility: None,
            liquidity_score: 1.0,
        }
    }

    /// Signed market value
    ///
    /// `value = quantity × mark_price`
    pub fn value(&self) -> Decimal {
        self.quantity * self.mark_price.as_decimal()
    }

    pub fn gross_value(&self) -> Decimal {
        self.value().abs()
    }
}

/// Cash and positions at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: i64,
    pub cash: Decimal,
    pub positions: Vec<PositionExposure>,
    /// Level of the reference index used for beta, when available
    pub benchmark: Option<f64>,
}

impl PortfolioSnapshot {
    pub fn new(timestamp: i64, cash: Decimal, positions: Vec<PositionExposure>) -> Self {
        Self {
            timestamp,
            cash,
            positions,
            benchmark: None,
        }
    }

    pub fn with_benchmark(mut self, level: f64) -> Self {
        self.benchmark = Some(level);
        self
    }

    /// `equity = cash + Σ signed position value`
    pub fn equity(&self) -> Decimal {
        self.cash + self.positions.iter().map(PositionExposure::value).sum::<Decimal>()
    }

    /// `gross = Σ |position value|`
    pub fn gross_exposure(&self) -> Decimal {
        self.positions.iter().map(PositionExposure::gross_value).sum()
    }

    pub fn net_exposure(&self) -> Decimal {
        self.positions.iter().map(PositionExposure::value).sum()
    }
}

/// Gross exposure over equity; infinite when equity is gone but exposure is not
pub fn leverage(gross_exposure: Decimal, equity: Decimal) -> f64 {
    if gross_exposure.is_zero() {
        return 0.0;
    }
    if equity <= Decimal::ZERO {
        return f64::INFINITY;
    }
    (gross_exposure / equity).to_f64().unwrap_or(f64::INFINITY)
}

/// Largest single-position weight of gross exposure
pub fn concentration(positions: &[PositionExposure]) -> f64 {
    let gross: Decimal = positions.iter().map(PositionExposure::gross_value).sum();
    if gross.is_zero() {
        return 0.0;
    }
    positions
        .iter()
        .map(|p| (p.gross_value() / gross).to_f64().unwrap_or(0.0))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(symbol: &str, qty: i64, price: u64) -> PositionExposure {
        PositionExposure::new(InstrumentId::new(symbol), Decimal::from(qty), Price::from_u64(price))
    }

    #[test]
    fn test_equity_and_gross() {
        let snapshot = PortfolioSnapshot::new(0, Decimal::from(1_000), vec![position("AAA", 10, 50), position("BBB", -5, 20)]);
        assert_eq!(snapshot.equity(), Decimal::from(1_400));
        assert_eq!(snapshot.gross_exposure(), Decimal::from(600));
        assert_eq!(snapshot.net_exposure(), Decimal::from(400));
    }

    #[test]
    fn test_leverage() {
        assert_eq!(leverage(Decimal::from(300), Decimal::from(100)), 3.0);
        assert_eq!(leverage(Decimal::ZERO, Decimal::ZERO), 0.0);
        assert!(leverage(Decimal::from(10), Decimal::from(-1)).is_infinite());
    }

    #[test]
    fn test_concentration() {
        let positions = [position("AAA", 3, 100), position("BBB", -1, 100)];
        assert_eq!(concentration(&positions), 0.75);
        assert_eq!(concentration(&[]), 0.0);
    }
}
