//! Crossing detection logic
//!
//! Decides whether an incoming order can trade against a resting price.

use types::numeric::Price;
use types::order::Side;

/// Whether a bid and an ask at these prices can trade
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Whether an incoming order crosses a resting price
///
/// Market orders (no limit) cross any resting price.
pub fn incoming_can_match(incoming_side: Side, limit_price: Option<Price>, resting_price: Price) -> bool {
    match (incoming_side, limit_price) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => can_match(limit, resting_price),
        (Side::Sell, Some(limit)) => can_match(resting_price, limit),
    }
}
