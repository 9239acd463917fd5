//! Trade execution
//!
//! Stamps trades with an engine-wide sequence number and applies the
//! maker/taker fee schedule. Execution price is always the maker's price.

use std::sync::atomic::{AtomicU64, Ordering};
use types::fee::FeeSchedule;
use types::ids::{AccountId, InstrumentId, OrderId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// Builds trades; shared by every book, so the sequence is atomic
#[derive(Debug)]
pub struct MatchExecutor {
    sequence_counter: AtomicU64,
    fees: FeeSchedule,
}

/// The resting side of a match
#[derive(Debug, Clone, Copy)]
pub struct Maker {
    pub order_id: OrderId,
    pub owner_id: AccountId,
    pub price: Price,
}

/// The aggressing side of a match
#[derive(Debug, Clone, Copy)]
pub struct Taker {
    pub order_id: OrderId,
    pub owner_id: AccountId,
    pub side: Side,
}

impl MatchExecutor {
    pub fn new(starting_sequence: u64, fees: FeeSchedule) -> Self {
        Self {
            sequence_counter: AtomicU64::new(starting_sequence),
            fees,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Next sequence number (monotonically increasing)
    fn next_sequence(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Execute `quantity` between maker and taker at the maker's price
    pub fn execute_trade(
        &self,
        symbol: &InstrumentId,
        maker: Maker,
        taker: Taker,
        quantity: Quantity,
        timestamp: i64,
    ) -> Trade {
        let trade_value = quantity.as_decimal() * maker.price.as_decimal();
        let maker_fee = self.fees.calculate_maker_fee(trade_value);
        let taker_fee = self.fees.calculate_taker_fee(trade_value);

        Trade::new(
            self.next_sequence(),
            symbol.clone(),
            maker.order_id,
            taker.order_id,
            maker.owner_id,
            taker.owner_id,
            taker.side,
            maker.price,
            quantity,
            maker_fee,
            taker_fee,
            timestamp,
        )
    }
}
