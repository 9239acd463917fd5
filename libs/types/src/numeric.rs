//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Tick/lot normalization rounds HALF_UP (midpoint away from zero).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when constructing numeric types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("Invalid decimal literal: {0}")]
    Parse(String),

    #[error("Price must be strictly positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Quantity must be non-negative, got {0}")]
    NegativeQuantity(Decimal),

    #[error("Arithmetic overflow on {0}")]
    Overflow(Decimal),
}

/// A strictly positive price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price
    ///
    /// # Panics
    /// Panics if the value is not strictly positive
    pub fn new(value: Decimal) -> Self {
        assert!(value > Decimal::ZERO, "Price must be strictly positive");
        Self(value)
    }

    /// Create a price, returning None if the value is not strictly positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then_some(Self(value))
    }

    /// Create a price from a whole number
    ///
    /// # Panics
    /// Panics on zero
    pub fn from_u64(value: u64) -> Self {
        Self::new(Decimal::from(value))
    }

    /// Get the inner decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion for statistical routines
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Round to the nearest multiple of `tick` (HALF_UP)
    ///
    /// Fails when the rounded price would be zero or the division leaves the
    /// decimal range.
    pub fn round_to_tick(&self, tick: Decimal) -> Result<Self, NumericError> {
        if tick <= Decimal::ZERO {
            return Ok(*self);
        }
        let ticks = self
            .0
            .checked_div(tick)
            .ok_or(NumericError::Overflow(self.0))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let rounded = ticks.checked_mul(tick).ok_or(NumericError::Overflow(self.0))?;
        Self::try_from(rounded)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or(NumericError::NonPositivePrice(value))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a quantity
    ///
    /// # Panics
    /// Panics if the value is negative
    pub fn new(value: Decimal) -> Self {
        assert!(value >= Decimal::ZERO, "Quantity must be non-negative");
        Self(value)
    }

    /// Create a quantity, returning None if the value is negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        (value >= Decimal::ZERO).then_some(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Get the inner decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion for statistical routines
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Subtract, returning None if the result would be negative
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        Self::try_new(self.0 - other.0)
    }

    /// Subtract, clamping at zero
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        self.checked_sub(other).unwrap_or_else(Quantity::zero)
    }

    /// Round down to the lot precision (decimal places)
    pub fn round_to_lot(&self, decimal_places: u32) -> Self {
        Self(self.0.round_dp_with_strategy(decimal_places, RoundingStrategy::ToZero))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.0 += rhs.0;
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or(NumericError::NegativeQuantity(value))
    }
}

impl From<Quantity> for Decimal {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl FromStr for Quantity {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_rejects_non_positive() {
        assert!(Price::try_new(Decimal::ZERO).is_none());
        assert!(Price::try_new(Decimal::from(-1)).is_none());
        assert_eq!(
            Price::from_str("0"),
            Err(NumericError::NonPositivePrice(Decimal::ZERO))
        );
    }

    #[test]
    fn test_price_ordering_ignores_scale() {
        let a = Price::from_str("100.0").unwrap();
        let b = Price::from_str("100.00").unwrap();
        assert_eq!(a, b);
        assert!(Price::from_u64(99) < a);
    }

    #[test]
    fn test_round_to_tick() {
        let tick = Decimal::from_str("0.05").unwrap();
        let p = Price::from_str("10.024").unwrap();
        assert_eq!(p.round_to_tick(tick), Ok(Price::from_str("10.00").unwrap()));

        let p = Price::from_str("10.025").unwrap();
        assert_eq!(p.round_to_tick(tick), Ok(Price::from_str("10.05").unwrap()));

        let tiny = Price::from_str("0.01").unwrap();
        assert!(matches!(tiny.round_to_tick(tick), Err(NumericError::NonPositivePrice(_))));
    }

    #[test]
    fn test_round_to_tick_near_decimal_max_fails() {
        let huge = Price::new(Decimal::MAX);
        assert_eq!(
            huge.round_to_tick(Decimal::new(1, 2)),
            Err(NumericError::Overflow(Decimal::MAX))
        );
    }

    #[test]
    fn test_quantity_arithmetic() {
        let a = Quantity::from_u64(5);
        let b = Quantity::from_u64(3);
        assert_eq!(a + b, Quantity::from_u64(8));
        assert_eq!(a.checked_sub(b), Some(Quantity::from_u64(2)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), Quantity::zero());
    }

    #[test]
    fn test_quantity_round_to_lot_truncates() {
        let q = Quantity::from_str("1.23456").unwrap();
        assert_eq!(q.round_to_lot(2), Quantity::from_str("1.23").unwrap());
    }

    #[test]
    fn test_serde_rejects_invalid_values() {
        let json = "\"-1\"";
        assert!(serde_json::from_str::<Quantity>(json).is_err());
        let price: Price = serde_json::from_str("\"42.5\"").unwrap();
        assert_eq!(price, Price::from_str("42.5").unwrap());
    }
}
