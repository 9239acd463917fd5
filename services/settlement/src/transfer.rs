//! Transfer execution seam and failure policy

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use types::ids::{AccountId, InstrumentId, SettlementId};
use types::numeric::Quantity;
use types::settlement::{Settlement, SettlementRef};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer agent unavailable: {0}")]
    Unavailable(String),

    #[error("Insufficient funds in account {account}")]
    InsufficientFunds { account: AccountId },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// One movement of cash, and for bilateral trades the matching delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub settlement_id: SettlementId,
    pub reference: SettlementRef,
    pub payer: AccountId,
    pub payee: AccountId,
    /// Non-negative cash amount
    pub amount: Decimal,
    /// Delivered from payee to payer; absent for netted cash transfers
    pub delivery: Option<(InstrumentId, Quantity)>,
}

impl TransferInstruction {
    /// Cash direction follows the sign of a netted record's amount
    pub fn for_settlement(settlement: &Settlement) -> Self {
        let (payer, payee) = if settlement.net_amount.is_sign_negative() {
            (settlement.counterparty_a, settlement.counterparty_b)
        } else {
            (settlement.counterparty_b, settlement.counterparty_a)
        };
        Self {
            settlement_id: settlement.settlement_id,
            reference: settlement.reference,
            payer,
            payee,
            amount: settlement.net_amount.abs(),
            delivery: settlement.symbol.clone().map(|s| (s, settlement.quantity)),
        }
    }
}

/// Moves cash and instruments between accounts
pub trait TransferAgent: Send + Sync {
    fn execute(&self, instruction: &TransferInstruction) -> Result<(), TransferError>;
}

/// What happens to a settlement whose transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// New pending attempt for the next batch, up to `max_attempts` in total
    Retry { max_attempts: u32 },
    /// Park for manual review
    ManualQueue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Retry { max_attempts: 3 }
    }
}

impl FailurePolicy {
    /// Whether a failure on attempt number `attempt` gets another try
    pub fn retries(&self, attempt: u32) -> bool {
        match self {
            FailurePolicy::Retry { max_attempts } => attempt < *max_attempts,
            FailurePolicy::ManualQueue => false,
        }
    }
}

/// In-memory agent that records every instruction
///
/// Accounts in the blocked set fail as payers.
#[derive(Debug, Default)]
pub struct TransferJournal {
    executed: Mutex<Vec<TransferInstruction>>,
    blocked: Mutex<BTreeSet<AccountId>>,
}

impl TransferJournal {
    pub fn block(&self, account: AccountId) {
        self.blocked.lock().insert(account);
    }

    pub fn unblock(&self, account: AccountId) {
        self.blocked.lock().remove(&account);
    }

    pub fn executed(&self) -> Vec<TransferInstruction> {
        self.executed.lock().clone()
    }
}

impl TransferAgent for TransferJournal {
    fn execute(&self, instruction: &TransferInstruction) -> Result<(), TransferError> {
        if self.blocked.lock().contains(&instruction.payer) {
            return Err(TransferError::InsufficientFunds {
                account: instruction.payer,
            });
        }
        self.executed.lock().push(instruction.clone());
        Ok(())
    }
}
