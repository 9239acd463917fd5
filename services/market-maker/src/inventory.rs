//! Market maker inventory per instrument
//!
//! Average-cost accounting: adding to a position blends the cost, reducing
//! it realizes PnL against the average, and crossing through zero opens the
//! remainder at the fill price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::InstrumentId;
use types::numeric::{Price, Quantity};
use types::order::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerPosition {
    pub symbol: InstrumentId,
    /// Signed; positive when long
    pub net_size: Decimal,
    pub average_cost: Decimal,
    pub mark_price: Decimal,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    /// Fraction of net exposure currently offset by hedges
    pub hedge_ratio: f64,
    pub fills: u64,
}

impl MarketMakerPosition {
    pub fn new(symbol: InstrumentId) -> Self {
        Self {
            symbol,
            net_size: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            hedge_ratio: 0.0,
            fills: 0,
        }
    }

    /// netSize × (markPrice − averageCost)
    pub fn unrealized_pnl(&self) -> Decimal {
        self.net_size * (self.mark_price - self.average_cost)
    }

    pub fn mark(&mut self, price: Price) {
        self.mark_price = price.as_decimal();
    }

    /// Apply one of our own fills
    ///
    /// Returns the PnL realized by this fill.
    pub fn apply_fill(&mut self, side: Side, quantity: Quantity, price: Price, fee: Decimal) -> Decimal {
        let qty = quantity.as_decimal();
        let px = price.as_decimal();
        let signed = side.sign() * qty;
        self.fees_paid += fee;
        self.fills += 1;

        let same_direction = self.net_size.is_zero() || (self.net_size > Decimal::ZERO) == (signed > Decimal::ZERO);
        if same_direction {
            let held = self.net_size.abs();
            self.average_cost = (held * self.average_cost + qty * px) / (held + qty);
            self.net_size += signed;
            return Decimal::ZERO;
        }

        let closed = qty.min(self.net_size.abs());
        let direction = if self.net_size > Decimal::ZERO { Decimal::ONE } else { Decimal::NEGATIVE_ONE };
        let realized = closed * (px - self.average_cost) * direction;
        self.realized_pnl += realized;
        self.net_size += signed;

        if self.net_size.is_zero() {
            self.average_cost = Decimal::ZERO;
        } else if qty > closed {
            // flipped through zero
            self.average_cost = px;
        }
        realized
    }

    /// IOC order that closes the gap to `target` when it exceeds `threshold`
    pub fn rebalance_order(&self, target: Decimal, threshold: Decimal) -> Option<(Side, Quantity)> {
        let gap = self.net_size - target;
        if gap.abs() <= threshold {
            return None;
        }
        let side = if gap > Decimal::ZERO { Side::Sell } else { Side::Buy };
        Some((side, Quantity::try_new(gap.abs())?))
    }
}
