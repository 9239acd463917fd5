//! Liquidation planning
//!
//! A position that reaches the liquidation band is sold off in chunks no
//! larger than a configured size, one chunk per interval, so a single
//! forced sale never sweeps the whole book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AccountId, InstrumentId, PositionId};
use types::numeric::Quantity;
use types::position::LeveragedPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    /// Waiting for its due time, or partly filled and to be retried
    Pending,
    Executed,
    /// Dropped because the plan was stopped
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationChunk {
    /// Quantity still to sell in this chunk
    pub quantity: Quantity,
    pub due_at: i64,
    pub status: ChunkStatus,
    pub attempts: u32,
}

/// Chunked sell-down of one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationPlan {
    pub position_id: PositionId,
    pub owner_id: AccountId,
    pub symbol: InstrumentId,
    pub chunks: Vec<LiquidationChunk>,
    pub executed_quantity: Quantity,
    pub created_at: i64,
}

impl LiquidationPlan {
    /// Split the whole position into chunks of at most `max_chunk`
    ///
    /// Chunk `i` is due at `now + i × interval_nanos`. A zero `max_chunk`
    /// sells everything in one chunk.
    pub fn build(position: &LeveragedPosition, max_chunk: Quantity, interval_nanos: i64, now: i64) -> Self {
        let mut chunks = Vec::new();
        let mut left = position.quantity;
        let mut due_at = now;
        while !left.is_zero() {
            let size = if max_chunk.is_zero() { left } else { left.min(max_chunk) };
            chunks.push(LiquidationChunk {
                quantity: size,
                due_at,
                status: ChunkStatus::Pending,
                attempts: 0,
            });
            left = left.saturating_sub(size);
            due_at = due_at.saturating_add(interval_nanos);
        }
        Self {
            position_id: position.position_id,
            owner_id: position.owner_id,
            symbol: position.symbol.clone(),
            chunks,
            executed_quantity: Quantity::zero(),
            created_at: now,
        }
    }

    /// Indices of pending chunks due at `now`
    pub fn due_chunks(&self, now: i64) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status == ChunkStatus::Pending && c.due_at <= now)
            .map(|(i, _)| i)
            .collect()
    }

    /// Record a fill against chunk `index`; the chunk completes once empty
    pub fn record_fill(&mut self, index: usize, filled: Quantity) {
        let Some(chunk) = self.chunks.get_mut(index) else {
            return;
        };
        chunk.attempts += 1;
        let filled = filled.min(chunk.quantity);
        chunk.quantity = chunk.quantity.saturating_sub(filled);
        if chunk.quantity.is_zero() {
            chunk.status = ChunkStatus::Executed;
        }
        self.executed_quantity += filled;
    }

    /// Cancel every chunk not yet executed
    pub fn cancel(&mut self) -> usize {
        let mut cancelled = 0;
        for chunk in self.chunks.iter_mut().filter(|c| c.status == ChunkStatus::Pending) {
            chunk.status = ChunkStatus::Cancelled;
            cancelled += 1;
        }
        cancelled
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Pending)
            .fold(Quantity::zero(), |acc, c| acc + c.quantity)
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(|c| c.status != ChunkStatus::Pending)
    }

    pub fn planned_quantity(&self) -> Decimal {
        self.executed_quantity.as_decimal() + self.remaining_quantity().as_decimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::Price;

    fn position(qty: u64) -> LeveragedPosition {
        LeveragedPosition::new(
            AccountId::new(),
            InstrumentId::new("ACME"),
            Quantity::from_u64(qty),
            Price::from_u64(10),
            Decimal::from(80),
            0,
        )
    }

    #[test]
    fn test_chunks_cover_position() {
        let plan = LiquidationPlan::build(&position(25), Quantity::from_u64(10), 1_000, 5_000);
        let sizes: Vec<_> = plan.chunks.iter().map(|c| c.quantity).collect();
        assert_eq!(sizes, vec![Quantity::from_u64(10), Quantity::from_u64(10), Quantity::from_u64(5)]);
        let due: Vec<_> = plan.chunks.iter().map(|c| c.due_at).collect();
        assert_eq!(due, vec![5_000, 6_000, 7_000]);
        assert_eq!(plan.planned_quantity(), Decimal::from(25));
    }

    #[test]
    fn test_zero_chunk_size_sells_at_once() {
        let plan = LiquidationPlan::build(&position(25), Quantity::zero(), 1_000, 0);
        assert_eq!(plan.chunks.len(), 1);
    }

    #[test]
    fn test_due_and_partial_fills() {
        let mut plan = LiquidationPlan::build(&position(20), Quantity::from_u64(10), 1_000, 0);
        assert_eq!(plan.due_chunks(0), vec![0]);
        assert_eq!(plan.due_chunks(1_000), vec![0, 1]);

        plan.record_fill(0, Quantity::from_u64(4));
        assert_eq!(plan.chunks[0].status, ChunkStatus::Pending);
        assert_eq!(plan.chunks[0].quantity, Quantity::from_u64(6));
        plan.record_fill(0, Quantity::from_u64(6));
        assert_eq!(plan.chunks[0].status, ChunkStatus::Executed);
        assert_eq!(plan.executed_quantity, Quantity::from_u64(10));
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_cancel_stops_remaining_chunks() {
        let mut plan = LiquidationPlan::build(&position(30), Quantity::from_u64(10), 1_000, 0);
        plan.record_fill(0, Quantity::from_u64(10));
        assert_eq!(plan.cancel(), 2);
        assert!(plan.is_complete());
        assert!(plan.due_chunks(i64::MAX).is_empty());
    }
}
