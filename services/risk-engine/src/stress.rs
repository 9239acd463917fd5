//! Stress scenarios
//!
//! Each scenario applies a fixed shock to the marked portfolio and reports
//! the resulting loss. Per-position losses (positive = loss):
//!
//! | scenario              | loss for position with signed value `v`            |
//! |-----------------------|----------------------------------------------------|
//! | market crash          | `v × crash_shock`                                   |
//! | liquidity crisis      | `v × liquidity_shock + |v| × haircut × (1 − L)`     |
//! | correlation breakdown | `|v| × correlation_shock`                           |
//! | volatility spike      | `|v| × z × σ × vol_multiplier × √(horizon / P)`     |
//!
//! `L` is the position's liquidity score and `σ` its annualized volatility
//! (portfolio volatility when unknown). A scenario's loss is floored at
//! zero, so a net short book shows no crash loss.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::risk::{StressScenario, StressTestResult};

use crate::exposure::{PortfolioSnapshot, PositionExposure};

/// Scenario shock sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub crash_shock: Decimal,
    pub liquidity_shock: Decimal,
    pub liquidity_haircut: Decimal,
    pub correlation_shock: Decimal,
    pub vol_multiplier: f64,
    /// One-sided normal quantile for the spike (2.326 ≈ 99%)
    pub z_score: f64,
    pub horizon_days: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            crash_shock: Decimal::new(30, 2),
            liquidity_shock: Decimal::new(10, 2),
            liquidity_haircut: Decimal::new(5, 2),
            correlation_shock: Decimal::new(15, 2),
            vol_multiplier: 3.0,
            z_score: 2.326,
            horizon_days: 10.0,
        }
    }
}

fn to_decimal(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO)
}

fn position_loss(
    scenario: StressScenario,
    position: &PositionExposure,
    config: &StressConfig,
    fallback_volatility: f64,
    periods_per_year: f64,
) -> Decimal {
    let value = position.value();
    let gross = value.abs();
    match scenario {
        StressScenario::MarketCrash => value * config.crash_shock,
        StressScenario::LiquidityCrisis => {
            let illiquidity = to_decimal((1.0 - position.liquidity_score).clamp(0.0, 1.0));
            value * config.liquidity_shock + gross * config.liquidity_haircut * illiquidity
        }
        StressScenario::CorrelationBreakdown => gross * config.correlation_shock,
        StressScenario::VolatilitySpike => {
            let sigma = position.volatility.unwrap_or(fallback_volatility).max(0.0);
            let horizon = if periods_per_year > 0.0 {
                (config.horizon_days / periods_per_year).sqrt()
            } else {
                0.0
            };
            gross * to_decimal(config.z_score * sigma * config.vol_multiplier * horizon)
        }
    }
}

/// Run one scenario over a snapshot
pub fn run_scenario(
    scenario: StressScenario,
    snapshot: &PortfolioSnapshot,
    config: &StressConfig,
    portfolio_volatility: f64,
    periods_per_year: f64,
) -> StressTestResult {
    let mut total = Decimal::ZERO;
    let mut impacted = Vec::new();
    for position in &snapshot.positions {
        let loss = position_loss(scenario, position, config, portfolio_volatility, periods_per_year);
        if loss > Decimal::ZERO {
            impacted.push(position.symbol.clone());
        }
        total += loss;
    }
    let potential_loss = total.max(Decimal::ZERO);
    let equity = snapshot.equity();
    let loss_fraction = if potential_loss.is_zero() {
        0.0
    } else if equity <= Decimal::ZERO {
        f64::INFINITY
    } else {
        (potential_loss / equity).to_f64().unwrap_or(f64::INFINITY)
    };

    StressTestResult {
        scenario,
        potential_loss,
        loss_fraction,
        impacted_positions: impacted,
    }
}

/// Every named scenario, in `StressScenario::ALL` order
pub fn run_all(
    snapshot: &PortfolioSnapshot,
    config: &StressConfig,
    portfolio_volatility: f64,
    periods_per_year: f64,
) -> Vec<StressTestResult> {
    StressScenario::ALL
        .iter()
        .map(|s| run_scenario(*s, snapshot, config, portfolio_volatility, periods_per_year))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::InstrumentId;
    use types::numeric::Price;

    fn snapshot() -> PortfolioSnapshot {
        let mut thin = PositionExposure::new(InstrumentId::new("THIN"), Decimal::from(10), Price::from_u64(100));
        thin.liquidity_score = 0.0;
        let short = PositionExposure::new(InstrumentId::new("SHRT"), Decimal::from(-5), Price::from_u64(40));
        PortfolioSnapshot::new(0, Decimal::from(2_000), vec![thin, short])
    }

    #[test]
    fn test_market_crash_nets_longs_and_shorts() {
        let result = run_scenario(StressScenario::MarketCrash, &snapshot(), &StressConfig::default(), 0.0, 252.0);
        // long 1000 loses 300, short 200 gains 60
        assert_eq!(result.potential_loss, Decimal::from(240));
        assert_eq!(result.impacted_positions, vec![InstrumentId::new("THIN")]);
        // equity = 2000 + 1000 - 200
        assert!((result.loss_fraction - 240.0 / 2_800.0).abs() < 1e-12);
    }

    #[test]
    fn test_liquidity_crisis_charges_illiquid_exits() {
        let result = run_scenario(StressScenario::LiquidityCrisis, &snapshot(), &StressConfig::default(), 0.0, 252.0);
        // 1000×0.10 + 1000×0.05 − 200×0.10
        assert_eq!(result.potential_loss, Decimal::from(130));
    }

    #[test]
    fn test_correlation_breakdown_hits_every_position() {
        let result = run_scenario(
            StressScenario::CorrelationBreakdown,
            &snapshot(),
            &StressConfig::default(),
            0.0,
            252.0,
        );
        assert_eq!(result.potential_loss, Decimal::from(180));
        assert_eq!(result.impacted_positions.len(), 2);
    }

    #[test]
    fn test_volatility_spike_scales_with_vol() {
        let calm = run_scenario(StressScenario::VolatilitySpike, &snapshot(), &StressConfig::default(), 0.1, 252.0);
        let wild = run_scenario(StressScenario::VolatilitySpike, &snapshot(), &StressConfig::default(), 0.4, 252.0);
        assert!(wild.potential_loss > calm.potential_loss);
        assert!(calm.potential_loss > Decimal::ZERO);
    }

    #[test]
    fn test_empty_portfolio_has_no_loss() {
        let empty = PortfolioSnapshot::new(0, Decimal::from(100), vec![]);
        for result in run_all(&empty, &StressConfig::default(), 0.2, 252.0) {
            assert_eq!(result.potential_loss, Decimal::ZERO);
            assert_eq!(result.loss_fraction, 0.0);
        }
    }
}
