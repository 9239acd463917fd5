//! Order entry seam
//!
//! `OrderGateway` is how components outside the engine (market maker,
//! margin liquidation, the exchange front door) place and cancel orders.
//! `ValidatingGateway` runs every request through the validator before it
//! can reach a book.

use crate::engine::{MatchingEngine, SubmitResult};
use crate::error::SubmitError;
use crate::validator::OrderValidator;
use scheduler::SharedClock;
use std::sync::Arc;
use tracing::debug;
use types::ids::OrderId;
use types::order::{CancelReason, OrderRequest};

pub trait OrderGateway: Send + Sync {
    /// Validate and match a request
    fn submit(&self, request: OrderRequest) -> Result<SubmitResult, SubmitError>;

    /// Cancel a live order; false if it is unknown or already terminal
    fn cancel(&self, order_id: OrderId, reason: CancelReason) -> bool;
}

pub struct ValidatingGateway {
    validator: OrderValidator,
    engine: Arc<MatchingEngine>,
    clock: SharedClock,
}

impl ValidatingGateway {
    pub fn new(validator: OrderValidator, engine: Arc<MatchingEngine>, clock: SharedClock) -> Self {
        Self {
            validator,
            engine,
            clock,
        }
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }
}

impl OrderGateway for ValidatingGateway {
    fn submit(&self, request: OrderRequest) -> Result<SubmitResult, SubmitError> {
        let order = self
            .validator
            .validate(request, self.clock.now_nanos())
            .map_err(SubmitError::Rejected)?;
        let order_id = order.order_id;
        debug!(%order_id, symbol = %order.symbol, side = ?order.side, "order admitted");
        self.engine.submit(order).map_err(|e| {
            self.validator.release(order_id);
            SubmitError::from(e)
        })
    }

    fn cancel(&self, order_id: OrderId, reason: CancelReason) -> bool {
        self.engine.cancel_with_reason(order_id, reason).is_some()
    }
}
