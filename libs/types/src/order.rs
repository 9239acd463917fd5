//! Order lifecycle types
//!
//! Status moves forward only:
//! `Pending → Open → {Filled | Cancelled | Rejected}`, with `Pending` also
//! allowed to go straight to a terminal state.

use crate::errors::OrderError;
use crate::ids::{AccountId, InstrumentId, OrderId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute immediately at the best available prices
    Market,
    /// Execute at the limit price or better, rest the remainder
    Limit,
    /// Becomes a market order once the stop price trades
    Stop,
    /// Becomes a limit order once the stop price trades
    StopLimit,
}

impl OrderType {
    pub fn requires_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }

    /// Order type after a stop trigger
    pub fn triggered(&self) -> Self {
        match self {
            OrderType::Stop => OrderType::Market,
            OrderType::StopLimit => OrderType::Limit,
            other => *other,
        }
    }
}

/// Time-in-force policy for orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until filled or explicitly cancelled
    GTC,
    /// Immediate-Or-Cancel: match immediately, cancel remainder
    IOC,
    /// Fill-Or-Kill: full match or cancel entirely
    FOK,
    /// Good-Till-Date: expire at specified Unix nanos timestamp
    GTD(i64),
}

impl TimeInForce {
    /// Whether an unfilled remainder may rest on the book
    pub fn allows_resting(&self) -> bool {
        matches!(self, TimeInForce::GTC | TimeInForce::GTD(_))
    }

    /// Whether the order has passed its deadline at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self, TimeInForce::GTD(deadline) if now >= *deadline)
    }
}

/// Order status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    /// Accepted by validation, not yet processed by the book
    #[serde(rename = "PENDING")]
    Pending,

    /// Resting on the book (possibly partially filled) or waiting for a stop trigger
    #[serde(rename = "OPEN")]
    Open,

    /// Completely matched (terminal)
    #[serde(rename = "FILLED")]
    Filled,

    /// Cancelled by user or system (terminal)
    #[serde(rename = "CANCELLED")]
    Cancelled(CancelReason),

    /// Refused (terminal)
    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled(_) | OrderStatus::Rejected(_)
        )
    }

    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Pending, _) => !matches!(next, OrderStatus::Pending),
            (OrderStatus::Open, next) => next.is_terminal(),
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Open => "OPEN",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled(_) => "CANCELLED",
            OrderStatus::Rejected(_) => "REJECTED",
        }
    }
}

/// Cancel reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    UserRequested,
    /// Market order remainder with no opposite liquidity left
    NoLiquidity,
    /// IOC remainder
    ImmediateOrCancel,
    /// FOK order could not be filled in full
    FillOrKill,
    /// GTD deadline reached
    Expired,
    /// Resting order would have traded against its own owner
    SelfTrade,
    /// Market maker replaced its quote
    QuoteRefresh,
}

/// Reject reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InvalidQuantity,
    InvalidPrice,
    UnknownInstrument,
    InsufficientFunds,
    AccountInactive,
    /// Matching engine detected an internal-consistency failure
    InternalError,
}

/// Inbound order request, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
    pub owner_id: AccountId,
}

impl OrderRequest {
    /// Good-till-cancel limit order
    pub fn limit(
        owner_id: AccountId,
        symbol: InstrumentId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::GTC,
            owner_id,
        }
    }

    /// Immediate-or-cancel market order
    pub fn market(owner_id: AccountId, symbol: InstrumentId, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::IOC,
            owner_id,
        }
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }
}

/// Complete order structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub owner_id: AccountId,
    pub symbol: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    /// Fees charged across all fills
    pub fees: Decimal,
    /// Sum of price × quantity across fills
    pub filled_notional: Decimal,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
    pub version: u64,    // Bumped on every mutation
}

impl Order {
    /// Create a new pending order from a validated request
    pub fn from_request(request: OrderRequest, timestamp: i64) -> Self {
        Self {
            order_id: OrderId::new(),
            owner_id: request.owner_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            filled_quantity: Quantity::zero(),
            remaining_quantity: request.quantity,
            fees: Decimal::ZERO,
            filled_notional: Decimal::ZERO,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity + self.remaining_quantity == self.quantity
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Volume-weighted fill price
    pub fn average_fill_price(&self) -> Option<Price> {
        if self.filled_quantity.is_zero() {
            return None;
        }
        Price::try_new(self.filled_notional / self.filled_quantity.as_decimal())
    }

    /// Record a fill and move to `Filled` once nothing remains
    pub fn add_fill(
        &mut self,
        fill_quantity: Quantity,
        price: Price,
        fee: Decimal,
        timestamp: i64,
    ) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                status: self.status.label().to_string(),
            });
        }
        let remaining = self
            .remaining_quantity
            .checked_sub(fill_quantity)
            .ok_or_else(|| OrderError::Overfill {
                order_id: self.order_id.to_string(),
                remaining: self.remaining_quantity.to_string(),
                fill: fill_quantity.to_string(),
            })?;

        self.filled_quantity += fill_quantity;
        self.remaining_quantity = remaining;
        self.filled_notional += fill_quantity.as_decimal() * price.as_decimal();
        self.fees += fee;
        if self.is_filled() {
            self.status = OrderStatus::Filled;
        }
        self.touch(timestamp);

        if !self.check_invariant() {
            return Err(OrderError::InvariantViolated {
                order_id: self.order_id.to_string(),
            });
        }
        Ok(())
    }

    /// Move a pending order onto the book
    pub fn open(&mut self, timestamp: i64) -> Result<(), OrderError> {
        self.transition(OrderStatus::Open, timestamp)
    }

    /// Cancel the order
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled(reason), timestamp)
    }

    /// Reject the order
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected(reason), timestamp)
    }

    fn transition(&mut self, next: OrderStatus, timestamp: i64) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                status: self.status.label().to_string(),
            });
        }
        if !self.status.can_transition_to(&next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        self.status = next;
        self.touch(timestamp);
        Ok(())
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
    }
}
