//! Threshold alerts with a rolling retention window

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;
use types::risk::{Alert, AlertKind, AlertSeverity, RiskMetrics, StressTestResult};

/// Default alert retention: 24 hours in nanos
pub const DEFAULT_RETENTION_NANOS: i64 = 24 * 60 * 60 * 1_000_000_000;

/// Breach levels; a metric strictly above its threshold raises an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub value_at_risk: f64,
    pub drawdown: f64,
    pub leverage: f64,
    pub concentration: f64,
    pub volatility: f64,
    /// Worst stress-scenario loss as a fraction of equity
    pub stress_loss: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            value_at_risk: 0.05,
            drawdown: 0.20,
            leverage: 3.0,
            concentration: 0.40,
            volatility: 0.60,
            stress_loss: 0.25,
        }
    }
}

/// Severity by how far past the threshold a value is
///
/// | value / threshold | severity |
/// |-------------------|----------|
/// | < 1.2             | Low      |
/// | 1.2 – 1.5         | Medium   |
/// | 1.5 – 2.0         | High     |
/// | ≥ 2.0             | Critical |
pub fn severity_for(value: f64, threshold: f64) -> AlertSeverity {
    let ratio = if threshold > 0.0 { value / threshold } else { f64::INFINITY };
    if ratio >= 2.0 {
        AlertSeverity::Critical
    } else if ratio >= 1.5 {
        AlertSeverity::High
    } else if ratio >= 1.2 {
        AlertSeverity::Medium
    } else {
        AlertSeverity::Low
    }
}

/// Alerts for every metric above its threshold, in a fixed kind order
pub fn evaluate(
    metrics: &RiskMetrics,
    stress: &[StressTestResult],
    thresholds: &AlertThresholds,
    now: i64,
) -> Vec<Alert> {
    let worst_stress = stress.iter().map(|s| s.loss_fraction).fold(0.0, f64::max);
    let checks = [
        (AlertKind::ValueAtRisk, metrics.value_at_risk, thresholds.value_at_risk),
        (AlertKind::Drawdown, metrics.current_drawdown, thresholds.drawdown),
        (AlertKind::Leverage, metrics.leverage, thresholds.leverage),
        (AlertKind::Concentration, metrics.concentration, thresholds.concentration),
        (AlertKind::Volatility, metrics.volatility, thresholds.volatility),
        (AlertKind::StressLoss, worst_stress, thresholds.stress_loss),
    ];
    checks
        .into_iter()
        .filter(|(_, value, threshold)| value > threshold)
        .map(|(kind, value, threshold)| Alert::new(kind, severity_for(value, threshold), value, threshold, now))
        .collect()
}

/// Append-only alert history, pruned to a rolling window
#[derive(Debug, Clone)]
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    retention_nanos: i64,
}

impl AlertLog {
    pub fn new(retention_nanos: i64) -> Self {
        Self {
            alerts: VecDeque::new(),
            retention_nanos,
        }
    }

    pub fn record(&mut self, alert: Alert) {
        warn!(kind = %alert.kind, severity = ?alert.severity, value = alert.value, "risk alert raised");
        self.alerts.push_back(alert);
    }

    /// Drop alerts older than the window; returns how many were dropped
    pub fn prune(&mut self, now: i64) -> usize {
        let cutoff = now.saturating_sub(self.retention_nanos);
        let before = self.alerts.len();
        while self.alerts.front().is_some_and(|a| a.raised_at < cutoff) {
            self.alerts.pop_front();
        }
        before - self.alerts.len()
    }

    /// Retained alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_NANOS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 60 * 60 * 1_000_000_000;

    #[test]
    fn test_severity_bands() {
        assert_eq!(severity_for(1.1, 1.0), AlertSeverity::Low);
        assert_eq!(severity_for(1.3, 1.0), AlertSeverity::Medium);
        assert_eq!(severity_for(1.6, 1.0), AlertSeverity::High);
        assert_eq!(severity_for(2.0, 1.0), AlertSeverity::Critical);
    }

    #[test]
    fn test_only_breaches_raise() {
        let metrics = RiskMetrics {
            leverage: 6.5,
            concentration: 0.3,
            ..RiskMetrics::default()
        };
        let alerts = evaluate(&metrics, &[], &AlertThresholds::default(), 0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Leverage);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_log_keeps_rolling_day() {
        let mut log = AlertLog::default();
        log.record(Alert::new(AlertKind::Drawdown, AlertSeverity::Low, 0.21, 0.2, 0));
        log.record(Alert::new(AlertKind::Drawdown, AlertSeverity::Low, 0.22, 0.2, 20 * HOUR));

        assert_eq!(log.prune(24 * HOUR), 0);
        assert_eq!(log.prune(25 * HOUR), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.alerts()[0].raised_at, 20 * HOUR);
    }
}
