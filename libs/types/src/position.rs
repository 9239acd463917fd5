//! Leveraged position types
//!
//! A leveraged position is a long holding financed partly by debt. The
//! margin manager watches its ratio of equity to market value.

use crate::ids::{AccountId, InstrumentId, PositionId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Leveraged long position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeveragedPosition {
    pub position_id: PositionId,
    pub owner_id: AccountId,
    pub symbol: InstrumentId,
    pub quantity: Quantity,
    pub mark_price: Price,
    /// Borrowed cash still owed
    pub debt: Decimal,
    pub opened_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl LeveragedPosition {
    /// Open a position of `quantity` at `price`, financed with `debt`
    pub fn new(
        owner_id: AccountId,
        symbol: InstrumentId,
        quantity: Quantity,
        price: Price,
        debt: Decimal,
        timestamp: i64,
    ) -> Self {
        Self {
            position_id: PositionId::new(),
            owner_id,
            symbol,
            quantity,
            mark_price: price,
            debt: debt.max(Decimal::ZERO),
            opened_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Market value: quantity × mark
    pub fn value(&self) -> Decimal {
        self.quantity.as_decimal() * self.mark_price.as_decimal()
    }

    /// Equity: value − debt (negative once underwater)
    pub fn equity(&self) -> Decimal {
        self.value() - self.debt
    }

    /// Equity / value; `Decimal::MAX` for an empty position
    pub fn margin_ratio(&self) -> Decimal {
        let value = self.value();
        if value.is_zero() {
            Decimal::MAX
        } else {
            self.equity() / value
        }
    }

    pub fn is_closed(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn update_mark_price(&mut self, mark_price: Price, timestamp: i64) {
        self.mark_price = mark_price;
        self.touch(timestamp);
    }

    /// Sell part of the position; proceeds pay down debt first
    ///
    /// Returns the surplus cash left over after the debt is cleared.
    pub fn reduce(&mut self, quantity: Quantity, price: Price, timestamp: i64) -> Decimal {
        let sold = quantity.min(self.quantity);
        self.quantity = self.quantity.saturating_sub(sold);
        let proceeds = sold.as_decimal() * price.as_decimal();
        let paydown = proceeds.min(self.debt);
        self.debt -= paydown;
        self.touch(timestamp);
        proceeds - paydown
    }

    /// Pay down debt with fresh cash; returns the amount actually applied
    pub fn add_collateral(&mut self, amount: Decimal, timestamp: i64) -> Decimal {
        let applied = amount.max(Decimal::ZERO).min(self.debt);
        self.debt -= applied;
        self.touch(timestamp);
        applied
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const TS: i64 = 1708123456789000000;

    fn position(mark: u64, debt: i64) -> LeveragedPosition {
        LeveragedPosition::new(
            AccountId::new(),
            InstrumentId::new("ACME"),
            Quantity::from_u64(10),
            Price::from_u64(mark),
            Decimal::from(debt),
            TS,
        )
    }

    #[test]
    fn test_margin_ratio() {
        // value 1000, debt 700, equity 300
        let p = position(100, 700);
        assert_eq!(p.value(), Decimal::from(1000));
        assert_eq!(p.equity(), Decimal::from(300));
        assert_eq!(p.margin_ratio(), Decimal::from_str("0.3").unwrap());
    }

    #[test]
    fn test_mark_update_moves_ratio() {
        let mut p = position(100, 700);
        p.update_mark_price(Price::from_u64(80), TS + 1);
        // value 800, equity 100
        assert_eq!(p.margin_ratio(), Decimal::from_str("0.125").unwrap());
        assert_eq!(p.version, 1);
    }

    #[test]
    fn test_reduce_pays_debt_first() {
        let mut p = position(100, 250);
        let surplus = p.reduce(Quantity::from_u64(3), Price::from_u64(100), TS);
        assert_eq!(surplus, Decimal::from(50));
        assert_eq!(p.debt, Decimal::ZERO);
        assert_eq!(p.quantity, Quantity::from_u64(7));
    }

    #[test]
    fn test_reduce_clamps_to_held_quantity() {
        let mut p = position(100, 0);
        p.reduce(Quantity::from_u64(50), Price::from_u64(100), TS);
        assert!(p.is_closed());
        assert_eq!(p.margin_ratio(), Decimal::MAX);
    }

    #[test]
    fn test_add_collateral_caps_at_debt() {
        let mut p = position(100, 100);
        assert_eq!(p.add_collateral(Decimal::from(150), TS), Decimal::from(100));
        assert_eq!(p.debt, Decimal::ZERO);
    }
}
