//! Margin event definitions
//!
//! Emitted by the margin manager to notification collaborators. Margin
//! breaches are business events, never errors.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use types::ids::{AccountId, MarginCallId, PositionId};
use types::numeric::{Price, Quantity};
use uuid::Uuid;

use crate::margin::{MarginCall, MarginStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginEvent {
    pub event_id: Uuid,
    pub position_id: PositionId,
    pub owner_id: AccountId,
    pub kind: MarginEventKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarginEventKind {
    /// Classification moved between bands
    StatusChanged { from: MarginStatus, to: MarginStatus, margin_ratio: Decimal },
    CallIssued { call: MarginCall },
    CallResolved { call_id: MarginCallId, payment: Decimal },
    /// Deadline passed unresolved; liquidation follows
    CallExpired { call_id: MarginCallId },
    LiquidationStarted { chunks: usize, quantity: Quantity },
    LiquidationChunkExecuted { quantity: Quantity, average_price: Price, surplus: Decimal },
    /// Chunk could not be sold this cycle; retried next check
    LiquidationChunkFailed { reason: String },
    LiquidationStopped { cancelled_chunks: usize },
    PositionClosed { remaining_debt: Decimal },
}

impl MarginEvent {
    pub fn new(position_id: PositionId, owner_id: AccountId, kind: MarginEventKind, timestamp: i64) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            position_id,
            owner_id,
            kind,
            timestamp,
        }
    }
}

/// Fan-out of margin events
#[derive(Debug, Default)]
pub struct MarginEventBus {
    subscribers: parking_lot::Mutex<Vec<UnboundedSender<MarginEvent>>>,
}

impl MarginEventBus {
    pub fn subscribe(&self) -> UnboundedReceiver<MarginEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, events: &[MarginEvent]) {
        if events.is_empty() {
            return;
        }
        self.subscribers
            .lock()
            .retain(|tx| events.iter().all(|e| tx.send(e.clone()).is_ok()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MarginEvent::new(
            PositionId::new(),
            AccountId::new(),
            MarginEventKind::CallExpired {
                call_id: MarginCallId::new(),
            },
            7,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"CallExpired\""));
    }

    #[test]
    fn test_bus_delivers_to_live_subscribers() {
        let bus = MarginEventBus::default();
        let mut rx = bus.subscribe();
        let event = MarginEvent::new(
            PositionId::new(),
            AccountId::new(),
            MarginEventKind::LiquidationStopped { cancelled_chunks: 2 },
            1,
        );
        bus.publish(std::slice::from_ref(&event));
        assert_eq!(rx.try_recv().unwrap(), event);
    }
}
