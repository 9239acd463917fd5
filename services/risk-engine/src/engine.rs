//! Risk Engine — orchestrator
//!
//! Each cycle reads one portfolio snapshot, extends the equity history,
//! computes metrics and stress results, raises alerts and publishes a new
//! `Arc<RiskReport>` that replaces the previous one whole.

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use types::risk::{Alert, AlertKind, RiskMetrics, RiskReport, StressTestResult};
use uuid::Uuid;

use crate::alerts::{self, AlertLog, AlertThresholds, DEFAULT_RETENTION_NANOS};
use crate::exposure::{self, PortfolioSnapshot, PortfolioSource};
use crate::metrics;
use crate::stress::{self, StressConfig};

/// Risk engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// VaR / CVaR confidence level
    pub confidence: f64,
    /// Equity observations kept for the statistics
    pub lookback: usize,
    /// Cycles per year, for annualization
    pub periods_per_year: f64,
    /// Annual risk-free rate for Sharpe / Sortino
    pub risk_free_rate: f64,
    pub alert_retention_nanos: i64,
    pub thresholds: AlertThresholds,
    pub stress: StressConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            lookback: 250,
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            alert_retention_nanos: DEFAULT_RETENTION_NANOS,
            thresholds: AlertThresholds::default(),
            stress: StressConfig::default(),
        }
    }
}

/// Metrics for one snapshot given the equity and benchmark histories
///
/// The histories must already include the snapshot's own observation.
pub fn compute_metrics(
    equity_curve: &[f64],
    benchmark_curve: &[f64],
    snapshot: &PortfolioSnapshot,
    config: &RiskConfig,
) -> RiskMetrics {
    let returns = metrics::simple_returns(equity_curve);
    let benchmark_returns = metrics::simple_returns(benchmark_curve);
    let (max_drawdown, current_drawdown) = metrics::drawdowns(equity_curve);
    let equity = snapshot.equity();
    let gross_exposure = snapshot.gross_exposure();

    RiskMetrics {
        volatility: metrics::annualized_volatility(&returns, config.periods_per_year),
        value_at_risk: metrics::historical_var(&returns, config.confidence),
        conditional_var: metrics::conditional_var(&returns, config.confidence),
        max_drawdown,
        current_drawdown,
        beta: metrics::beta(&returns, &benchmark_returns),
        sharpe_ratio: metrics::sharpe_ratio(&returns, config.risk_free_rate, config.periods_per_year),
        sortino_ratio: metrics::sortino_ratio(&returns, config.risk_free_rate, config.periods_per_year),
        leverage: exposure::leverage(gross_exposure, equity),
        concentration: exposure::concentration(&snapshot.positions),
        equity,
        gross_exposure,
        observations: returns.len(),
    }
}

/// Plain-language actions for the cycle's breaches
pub fn recommendations(alerts: &[Alert], stress: &[StressTestResult]) -> Vec<String> {
    let mut out: Vec<String> = alerts
        .iter()
        .map(|a| match a.kind {
            AlertKind::ValueAtRisk => format!(
                "Reduce position sizes: VaR of {:.2}% exceeds the {:.2}% limit",
                a.value * 100.0,
                a.threshold * 100.0
            ),
            AlertKind::Drawdown => format!(
                "Cut losing positions: drawdown of {:.2}% exceeds the {:.2}% limit",
                a.value * 100.0,
                a.threshold * 100.0
            ),
            AlertKind::Leverage => format!(
                "Reduce gross exposure: leverage {:.2}x exceeds {:.2}x",
                a.value, a.threshold
            ),
            AlertKind::Concentration => format!(
                "Diversify: largest position is {:.1}% of gross exposure",
                a.value * 100.0
            ),
            AlertKind::Volatility => format!(
                "Lower position sizes while annualized volatility is {:.1}%",
                a.value * 100.0
            ),
            AlertKind::StressLoss => {
                let worst = stress
                    .iter()
                    .max_by(|x, y| x.loss_fraction.total_cmp(&y.loss_fraction))
                    .map(|s| s.scenario.name())
                    .unwrap_or("stress");
                format!(
                    "Add hedges: a {} would cost {:.1}% of equity",
                    worst,
                    a.value * 100.0
                )
            }
        })
        .collect();
    if out.is_empty() {
        out.push("Portfolio within all risk limits".to_string());
    }
    out
}

#[derive(Debug, Default)]
struct RiskState {
    equity_curve: VecDeque<f64>,
    benchmark_curve: VecDeque<f64>,
    alerts: AlertLog,
}

/// Risk engine service
pub struct RiskEngine {
    config: RiskConfig,
    source: Arc<dyn PortfolioSource>,
    state: Mutex<RiskState>,
    reports: watch::Sender<Option<Arc<RiskReport>>>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig, source: Arc<dyn PortfolioSource>) -> Self {
        let (reports, _) = watch::channel(None);
        let state = RiskState {
            alerts: AlertLog::new(config.alert_retention_nanos),
            ..RiskState::default()
        };
        Self {
            config,
            source,
            state: Mutex::new(state),
            reports,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Snapshot the portfolio and evaluate it
    pub fn run_cycle(&self, now: i64) -> Arc<RiskReport> {
        let snapshot = self.source.portfolio();
        self.evaluate(&snapshot, now)
    }

    /// Fold one snapshot into the history and publish the resulting report
    pub fn evaluate(&self, snapshot: &PortfolioSnapshot, now: i64) -> Arc<RiskReport> {
        let report = {
            let mut state = self.state.lock();
            push_bounded(
                &mut state.equity_curve,
                snapshot.equity().to_f64().unwrap_or(0.0),
                self.config.lookback,
            );
            if let Some(level) = snapshot.benchmark {
                push_bounded(&mut state.benchmark_curve, level, self.config.lookback);
            }

            let equity: Vec<f64> = state.equity_curve.iter().copied().collect();
            let benchmark: Vec<f64> = state.benchmark_curve.iter().copied().collect();
            let metrics = compute_metrics(&equity, &benchmark, snapshot, &self.config);
            let stress_results = stress::run_all(
                snapshot,
                &self.config.stress,
                metrics.volatility,
                self.config.periods_per_year,
            );
            let raised = alerts::evaluate(&metrics, &stress_results, &self.config.thresholds, now);
            let recommendations = recommendations(&raised, &stress_results);

            for alert in raised {
                state.alerts.record(alert);
            }
            let pruned = state.alerts.prune(now);
            if pruned > 0 {
                debug!(pruned, "expired risk alerts dropped");
            }

            Arc::new(RiskReport {
                report_id: Uuid::now_v7(),
                generated_at: now,
                metrics,
                alerts: state.alerts.alerts(),
                stress_results,
                recommendations,
            })
        };

        info!(
            equity = %report.metrics.equity,
            var = report.metrics.value_at_risk,
            leverage = report.metrics.leverage,
            alerts = report.alerts.len(),
            "risk cycle complete"
        );
        self.reports.send_replace(Some(Arc::clone(&report)));
        report
    }

    /// Most recent report
    pub fn latest(&self) -> Option<Arc<RiskReport>> {
        self.reports.borrow().clone()
    }

    /// Watch for each new report
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RiskReport>>> {
        self.reports.subscribe()
    }

    /// Alerts inside the retention window
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.alerts()
    }
}

fn push_bounded(curve: &mut VecDeque<f64>, value: f64, cap: usize) {
    curve.push_back(value);
    while curve.len() > cap.max(2) {
        curve.pop_front();
    }
}

/// Periodic driver for `RiskEngine::run_cycle`
pub struct RiskTask {
    engine: Arc<RiskEngine>,
}

impl RiskTask {
    pub fn new(engine: Arc<RiskEngine>) -> Self {
        Self { engine }
    }
}

impl scheduler::PeriodicTask for RiskTask {
    fn name(&self) -> &str {
        "risk"
    }

    fn tick(&mut self, now: i64) -> scheduler::TickOutcome {
        self.engine.run_cycle(now);
        scheduler::TickOutcome::Continue
    }
}
