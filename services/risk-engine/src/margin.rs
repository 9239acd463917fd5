//! Margin classification and margin calls
//!
//! Deterministic margin computations over leveraged positions. All cash
//! amounts are fixed-point `Decimal`.
//!
//! `margin_ratio = equity / value = (value − debt) / value`

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AccountId, MarginCallId, PositionId};
use types::position::LeveragedPosition;

// ── Thresholds ───────────────────────────────────────────────────────────

/// Descending margin-ratio thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginThresholds {
    pub warning: Decimal,
    pub call: Decimal,
    pub liquidation: Decimal,
}

impl MarginThresholds {
    /// warning > call > liquidation > 0
    pub fn is_valid(&self) -> bool {
        self.warning > self.call && self.call > self.liquidation && self.liquidation > Decimal::ZERO
    }
}

impl Default for MarginThresholds {
    /// | ratio          | status      |
    /// |----------------|-------------|
    /// | > 30%          | Healthy     |
    /// | 25% – 30%      | Warning     |
    /// | 15% – 25%      | Call        |
    /// | ≤ 15%          | Liquidation |
    fn default() -> Self {
        Self {
            warning: Decimal::new(30, 2),
            call: Decimal::new(25, 2),
            liquidation: Decimal::new(15, 2),
        }
    }
}

// ── Classification ───────────────────────────────────────────────────────

/// Position health, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginStatus {
    Healthy,
    Warning,
    Call,
    Liquidation,
}

/// Classify a margin ratio; each threshold is inclusive
pub fn classify(margin_ratio: Decimal, thresholds: &MarginThresholds) -> MarginStatus {
    if margin_ratio <= thresholds.liquidation {
        MarginStatus::Liquidation
    } else if margin_ratio <= thresholds.call {
        MarginStatus::Call
    } else if margin_ratio <= thresholds.warning {
        MarginStatus::Warning
    } else {
        MarginStatus::Healthy
    }
}

/// Cash paydown of debt that restores the warning ratio
///
/// Paying `x` off the debt raises equity by `x` at unchanged value, so
/// `x = warning × value − equity`, floored at zero.
pub fn required_top_up(position: &LeveragedPosition, thresholds: &MarginThresholds) -> Decimal {
    (thresholds.warning * position.value() - position.equity()).max(Decimal::ZERO)
}

// ── Margin calls ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginCallStatus {
    Open,
    Resolved,
    /// Deadline passed without resolution; the position is liquidated
    Expired,
}

/// Demand for collateral on an under-margined position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginCall {
    pub call_id: MarginCallId,
    pub position_id: PositionId,
    pub owner_id: AccountId,
    pub issued_at: i64,
    pub deadline: i64,
    pub required_top_up: Decimal,
    /// Ratio at issue time
    pub margin_ratio: Decimal,
    pub status: MarginCallStatus,
}

impl MarginCall {
    pub fn issue(
        position: &LeveragedPosition,
        thresholds: &MarginThresholds,
        issued_at: i64,
        deadline_nanos: i64,
    ) -> Self {
        Self {
            call_id: MarginCallId::new(),
            position_id: position.position_id,
            owner_id: position.owner_id,
            issued_at,
            deadline: issued_at.saturating_add(deadline_nanos),
            required_top_up: required_top_up(position, thresholds),
            margin_ratio: position.margin_ratio(),
            status: MarginCallStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MarginCallStatus::Open
    }

    pub fn is_overdue(&self, now: i64) -> bool {
        self.is_open() && now >= self.deadline
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
