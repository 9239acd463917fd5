//! Identical histories must give identical risk output

use proptest::prelude::*;
use risk_engine::{PortfolioSnapshot, PortfolioSource, PositionExposure, RiskConfig, RiskEngine};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use types::ids::InstrumentId;
use types::numeric::Price;

struct Unused;

impl PortfolioSource for Unused {
    fn portfolio(&self) -> PortfolioSnapshot {
        PortfolioSnapshot::new(0, Decimal::ZERO, vec![])
    }
}

/// Price path from per-period returns, starting at 100
fn snapshots(returns: &[f64]) -> Vec<PortfolioSnapshot> {
    let mut price = 100.0;
    let mut out = Vec::new();
    for (t, r) in returns.iter().enumerate() {
        price *= 1.0 + r;
        let mark = Decimal::from_f64(price)
            .map(|d| d.round_dp(4))
            .and_then(Price::try_new)
            .unwrap_or_else(|| Price::from_u64(1));
        let position = PositionExposure::new(InstrumentId::new("ACME"), Decimal::from(50), mark);
        out.push(
            PortfolioSnapshot::new(t as i64, Decimal::from(1_000), vec![position]).with_benchmark(price * 0.5 + 50.0),
        );
    }
    out
}

fn run(snapshots: &[PortfolioSnapshot]) -> Vec<(types::risk::RiskMetrics, Vec<types::risk::StressTestResult>, Vec<String>)> {
    let engine = RiskEngine::new(RiskConfig::default(), Arc::new(Unused));
    snapshots
        .iter()
        .map(|s| {
            let report = engine.evaluate(s, s.timestamp);
            (report.metrics.clone(), report.stress_results.clone(), report.recommendations.clone())
        })
        .collect()
}

proptest! {
    #[test]
    fn risk_reports_are_deterministic(returns in prop::collection::vec(-0.2f64..0.2, 2..60)) {
        let path = snapshots(&returns);
        let first = run(&path);
        let second = run(&path);
        prop_assert_eq!(&first, &second);

        let (last, _, _) = first.last().expect("non-empty path");
        prop_assert!(last.conditional_var >= last.value_at_risk);
        prop_assert!(last.max_drawdown >= last.current_drawdown);
    }
}

#[test]
fn test_crash_shows_up_in_var_and_drawdown() {
    let mut returns = vec![0.01; 30];
    returns.push(-0.15);
    let reports = run(&snapshots(&returns));
    let (metrics, _, recommendations) = reports.last().unwrap();
    assert!(metrics.value_at_risk > 0.0);
    assert!(metrics.current_drawdown > 0.0);
    assert!(metrics.sharpe_ratio.is_finite());
    assert!(!recommendations.is_empty());
}
