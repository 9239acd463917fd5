//! Events emitted by the matching engine
//!
//! Published to subscribers after the book lock is released. Trades carry
//! their engine sequence number for ordering across instruments.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use types::order::Order;
use types::trade::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// A trade between a resting maker and an aggressing taker
    TradeExecuted(Trade),
    /// New state of an order (opened, filled, partially filled, cancelled)
    OrderUpdated(Order),
}

/// Fan-out of engine events to any number of subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: parking_lot::Mutex<Vec<UnboundedSender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; dropped receivers are pruned
    pub fn publish(&self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
