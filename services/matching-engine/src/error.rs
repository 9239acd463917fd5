//! Matching engine errors

use thiserror::Error;
use types::errors::{OrderError, ValidationError};
use types::ids::InstrumentId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// Only pending (validated, unprocessed) orders may be submitted
    #[error("Order {order_id} is not pending")]
    NotPending { order_id: String },

    /// Internal-consistency failure; the book for `symbol` is suspect
    #[error("Invariant violation on {symbol}: {detail}")]
    InvariantViolation { symbol: String, detail: String },

    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}

impl MatchingError {
    pub fn invariant(symbol: &InstrumentId, detail: impl Into<String>) -> Self {
        MatchingError::InvariantViolation {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}

/// Why an order request did not reach or survive the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Order rejected: {}", join_errors(.0))]
    Rejected(Vec<ValidationError>),

    #[error(transparent)]
    Matching(#[from] MatchingError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
