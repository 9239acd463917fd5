//! Risk reporting types
//!
//! A `RiskReport` is produced once per risk cycle and replaced whole by the
//! next one; nothing in it is mutated after publication.

use crate::ids::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// What breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    ValueAtRisk,
    Drawdown,
    Leverage,
    Concentration,
    Volatility,
    StressLoss,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::ValueAtRisk => "value-at-risk",
            AlertKind::Drawdown => "drawdown",
            AlertKind::Leverage => "leverage",
            AlertKind::Concentration => "concentration",
            AlertKind::Volatility => "volatility",
            AlertKind::StressLoss => "stress-loss",
        };
        f.write_str(name)
    }
}

/// Threshold breach raised by the risk engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub raised_at: i64,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        raised_at: i64,
    ) -> Self {
        Self {
            alert_id: Uuid::now_v7(),
            kind,
            severity,
            message: format!("{kind} at {value:.4} breached threshold {threshold:.4}"),
            value,
            threshold,
            raised_at,
        }
    }
}

/// Portfolio metrics for one cycle
///
/// Ratios and statistics are `f64`; balances stay `Decimal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Annualized standard deviation of period returns
    pub volatility: f64,
    /// Historical VaR as a positive loss fraction
    pub value_at_risk: f64,
    /// Mean loss beyond VaR as a positive loss fraction
    pub conditional_var: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub beta: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Gross exposure / equity
    pub leverage: f64,
    /// Largest single position weight of gross exposure
    pub concentration: f64,
    pub equity: Decimal,
    pub gross_exposure: Decimal,
    pub observations: usize,
}

/// Named stress scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressScenario {
    MarketCrash,
    LiquidityCrisis,
    CorrelationBreakdown,
    VolatilitySpike,
}

impl StressScenario {
    pub const ALL: [StressScenario; 4] = [
        StressScenario::MarketCrash,
        StressScenario::LiquidityCrisis,
        StressScenario::CorrelationBreakdown,
        StressScenario::VolatilitySpike,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StressScenario::MarketCrash => "market crash",
            StressScenario::LiquidityCrisis => "liquidity crisis",
            StressScenario::CorrelationBreakdown => "correlation breakdown",
            StressScenario::VolatilitySpike => "volatility spike",
        }
    }
}

/// Outcome of one stress scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario: StressScenario,
    /// Estimated loss in cash, positive
    pub potential_loss: Decimal,
    /// Loss as a fraction of equity
    pub loss_fraction: f64,
    pub impacted_positions: Vec<InstrumentId>,
}

/// Immutable output of a risk cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub report_id: Uuid,
    pub generated_at: i64,
    pub metrics: RiskMetrics,
    /// Alerts still inside the retention window, oldest first
    pub alerts: Vec<Alert>,
    pub stress_results: Vec<StressTestResult>,
    pub recommendations: Vec<String>,
}

impl RiskReport {
    /// Highest severity among the report's alerts
    pub fn worst_severity(&self) -> Option<AlertSeverity> {
        self.alerts.iter().map(|a| a.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }

    #[test]
    fn test_alert_message() {
        let alert = Alert::new(AlertKind::Leverage, AlertSeverity::High, 4.5, 3.0, 0);
        assert_eq!(alert.message, "leverage at 4.5000 breached threshold 3.0000");
    }

    #[test]
    fn test_worst_severity() {
        let report = RiskReport {
            report_id: Uuid::now_v7(),
            generated_at: 0,
            metrics: RiskMetrics::default(),
            alerts: vec![
                Alert::new(AlertKind::Drawdown, AlertSeverity::Medium, 0.2, 0.1, 0),
                Alert::new(AlertKind::ValueAtRisk, AlertSeverity::Critical, 0.2, 0.05, 0),
            ],
            stress_results: Vec::new(),
            recommendations: Vec::new(),
        };
        assert_eq!(report.worst_severity(), Some(AlertSeverity::Critical));
    }
}
