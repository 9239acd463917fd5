//! Normalized market data samples
//!
//! The engine never collects data itself; an upstream collaborator pushes
//! time-ordered samples per instrument.

use crate::ids::InstrumentId;
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price/volume observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSample {
    pub symbol: InstrumentId,
    pub timestamp: i64, // Unix nanos
    pub price: Price,
    pub volume: Quantity,
    /// Side that initiated the print, when known
    pub aggressor: Option<Side>,
}

impl MarketSample {
    pub fn new(symbol: InstrumentId, timestamp: i64, price: Price, volume: Quantity) -> Self {
        Self {
            symbol,
            timestamp,
            price,
            volume,
            aggressor: None,
        }
    }

    pub fn with_aggressor(mut self, side: Side) -> Self {
        self.aggressor = Some(side);
        self
    }

    pub fn notional(&self) -> Decimal {
        self.price.as_decimal() * self.volume.as_decimal()
    }
}
