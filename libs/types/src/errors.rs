//! Error types shared across the engine
//!
//! Error taxonomy using thiserror. Amounts are carried as strings so the
//! errors stay `Eq` and print exactly what was compared.

use thiserror::Error;

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Order already in terminal state: {status}")]
    AlreadyTerminal { status: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Fill of {fill} exceeds remaining {remaining} on order {order_id}")]
    Overfill {
        order_id: String,
        remaining: String,
        fill: String,
    },

    #[error("Quantity invariant violated on order {order_id}")]
    InvariantViolated { order_id: String },
}

/// Reasons an order request is refused before it reaches a book
///
/// The validator collects every applicable variant instead of stopping at
/// the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Quantity must be positive")]
    NonPositiveQuantity,

    #[error("Quantity {quantity} below minimum {min}")]
    QuantityBelowMinimum { quantity: String, min: String },

    #[error("Quantity {quantity} above maximum {max}")]
    QuantityAboveMaximum { quantity: String, max: String },

    #[error("Quantity rounds to zero at lot precision {decimals}")]
    QuantityRoundsToZero { decimals: u32 },

    #[error("Limit price required for {order_type} orders")]
    MissingLimitPrice { order_type: String },

    #[error("Stop price required for {order_type} orders")]
    MissingStopPrice { order_type: String },

    #[error("Limit price not allowed for {order_type} orders")]
    UnexpectedLimitPrice { order_type: String },

    #[error("Stop price not allowed for {order_type} orders")]
    UnexpectedStopPrice { order_type: String },

    #[error("Price rounds to zero at tick size {tick}")]
    PriceRoundsToZero { tick: String },

    #[error("Price {price} outside representable range")]
    PriceOutOfRange { price: String },

    #[error("Price {price} outside band [{low}, {high}]")]
    PriceOutsideBand {
        price: String,
        low: String,
        high: String,
    },

    #[error("No market data for instrument {symbol}")]
    NoMarketData { symbol: String },

    #[error("Account error: {0}")]
    Account(#[from] AccountError),
}

/// Account-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Account not found: {account_id}")]
    NotFound { account_id: String },

    #[error("Account inactive: {account_id}")]
    Inactive { account_id: String },

    #[error("Amount must be non-negative, got {amount}")]
    NegativeAmount { amount: String },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Insufficient shares of {symbol}: required {required}, available {available}")]
    InsufficientShares {
        symbol: String,
        required: String,
        available: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::Overfill {
            order_id: "o-1".to_string(),
            remaining: "1".to_string(),
            fill: "2".to_string(),
        };
        assert_eq!(err.to_string(), "Fill of 2 exceeds remaining 1 on order o-1");
    }

    #[test]
    fn test_account_error_insufficient_shares() {
        let err = AccountError::InsufficientShares {
            symbol: "ACME".to_string(),
            required: "1.5".to_string(),
            available: "1.0".to_string(),
        };
        assert!(err.to_string().contains("ACME"));
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_validation_error_from_account_error() {
        let err: ValidationError = AccountError::Inactive {
            account_id: "a".to_string(),
        }
        .into();
        assert!(matches!(err, ValidationError::Account(_)));
    }
}
