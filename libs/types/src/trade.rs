//! Trade execution records
//!
//! A trade is immutable once created: no setters, settlement state lives in
//! `settlement::Settlement`.

use crate::ids::{AccountId, InstrumentId, OrderId, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An atomic exchange between a resting maker order and an aggressing taker order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    trade_id: TradeId,
    sequence: u64,
    symbol: InstrumentId,

    maker_order_id: OrderId,
    taker_order_id: OrderId,
    maker_owner_id: AccountId,
    taker_owner_id: AccountId,

    // From the taker's perspective
    side: Side,
    price: Price,
    quantity: Quantity,

    maker_fee: Decimal,
    taker_fee: Decimal,

    executed_at: i64, // Unix nanos
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: InstrumentId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_owner_id: AccountId,
        taker_owner_id: AccountId,
        side: Side,
        price: Price,
        quantity: Quantity,
        maker_fee: Decimal,
        taker_fee: Decimal,
        executed_at: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            sequence,
            symbol,
            maker_order_id,
            taker_order_id,
            maker_owner_id,
            taker_owner_id,
            side,
            price,
            quantity,
            maker_fee,
            taker_fee,
            executed_at,
        }
    }

    pub fn trade_id(&self) -> TradeId {
        self.trade_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn symbol(&self) -> &InstrumentId {
        &self.symbol
    }

    pub fn maker_order_id(&self) -> OrderId {
        self.maker_order_id
    }

    pub fn taker_order_id(&self) -> OrderId {
        self.taker_order_id
    }

    pub fn maker_owner_id(&self) -> AccountId {
        self.maker_owner_id
    }

    pub fn taker_owner_id(&self) -> AccountId {
        self.taker_owner_id
    }

    /// Taker's side
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn maker_fee(&self) -> Decimal {
        self.maker_fee
    }

    pub fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    pub fn executed_at(&self) -> i64 {
        self.executed_at
    }

    /// Owner on the buying side
    pub fn buyer(&self) -> AccountId {
        match self.side {
            Side::Buy => self.taker_owner_id,
            Side::Sell => self.maker_owner_id,
        }
    }

    /// Owner on the selling side
    pub fn seller(&self) -> AccountId {
        match self.side {
            Side::Buy => self.maker_owner_id,
            Side::Sell => self.taker_owner_id,
        }
    }

    /// Fee paid by `owner` on this trade (zero if not a party)
    pub fn fee_for(&self, owner: AccountId) -> Decimal {
        let mut fee = Decimal::ZERO;
        if owner == self.maker_owner_id {
            fee += self.maker_fee;
        }
        if owner == self.taker_owner_id {
            fee += self.taker_fee;
        }
        fee
    }

    /// Calculate trade value (price × quantity)
    pub fn trade_value(&self) -> Decimal {
        self.quantity.as_decimal() * self.price.as_decimal()
    }

    pub fn validate_no_self_trade(&self) -> bool {
        self.maker_owner_id != self.taker_owner_id
    }
}
