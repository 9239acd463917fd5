//! Settlement Service
//!
//! Turns executed trades into T+n settlements and clears them in periodic
//! batches: multilateral netting against the central counterparty, transfer
//! execution through a `TransferAgent`, a failure policy, and a clearing
//! report per batch.
//!
//! **Key Invariants:**
//! - A settlement leaves `Pending` exactly once and never returns
//! - Netted transfers sum to zero across parties
//! - A failed transfer fails only its own settlement

pub mod calendar;
pub mod engine;
pub mod netting;
pub mod transfer;

pub use calendar::{business_date, BusinessCalendar};
pub use engine::{SettlementConfig, SettlementEngine, SettlementError, SettlementTask};
pub use netting::{net_settlements, NettingResult};
pub use transfer::{FailurePolicy, TransferAgent, TransferError, TransferInstruction, TransferJournal};
