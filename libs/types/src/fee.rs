//! Fee calculation types
//!
//! Maker/taker schedule: the resting side always pays a lower rate than
//! the aggressing side.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee precision (8 dp, rounded away from zero so fees are never undercharged)
pub const FEE_DP: u32 = 8;

/// Maker/taker fee schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Rate charged to the resting order's owner, may be negative (rebate)
    pub maker_rate: Decimal,
    /// Rate charged to the aggressing order's owner
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }

    /// Asymmetry check: maker strictly cheaper than taker, taker non-negative
    pub fn is_valid(&self) -> bool {
        self.maker_rate < self.taker_rate && self.taker_rate >= Decimal::ZERO
    }

    /// Calculate maker fee for a trade value
    pub fn calculate_maker_fee(&self, trade_value: Decimal) -> Decimal {
        round_fee(trade_value * self.maker_rate)
    }

    /// Calculate taker fee for a trade value
    pub fn calculate_taker_fee(&self, trade_value: Decimal) -> Decimal {
        round_fee(trade_value * self.taker_rate)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_rate: Decimal::new(2, 4), // 0.02%
            taker_rate: Decimal::new(5, 4), // 0.05%
        }
    }
}

fn round_fee(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(FEE_DP, RoundingStrategy::AwayFromZero)
}
