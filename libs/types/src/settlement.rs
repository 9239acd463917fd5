//! Settlement and clearing types
//!
//! Status moves `Pending → {Completed | Failed}` and never back. A retry is
//! a fresh settlement pointing at the failed one through `retry_of`.

use crate::ids::{AccountId, InstrumentId, SettlementId, TradeId};
use crate::numeric::{Price, Quantity};
use crate::trade::Trade;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }
}

/// What a settlement settles: one trade, or a party's netted position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "trade_id")]
pub enum SettlementRef {
    #[serde(rename = "TRADE")]
    Trade(TradeId),
    #[serde(rename = "NETTED")]
    Netted,
}

impl fmt::Display for SettlementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementRef::Trade(id) => write!(f, "{id}"),
            SettlementRef::Netted => f.write_str("NETTED"),
        }
    }
}

/// Per-settlement exposure figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementRiskMetrics {
    /// Cash at risk if the counterparty defaults
    pub exposure: Decimal,
    /// Business days between trade and settlement date
    pub days_to_settle: u32,
}

/// Settlement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub settlement_id: SettlementId,
    pub reference: SettlementRef,
    pub status: SettlementStatus,
    /// Seller; receives cash. For netted records, the netted party.
    pub counterparty_a: AccountId,
    /// Buyer; pays cash. For netted records, the central counterparty.
    pub counterparty_b: AccountId,
    /// None for netted records, which span instruments
    pub symbol: Option<InstrumentId>,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trade_date: NaiveDate,
    pub settlement_date: NaiveDate,
    /// Cash owed to counterparty A; for netted records, signed (negative = A pays)
    pub net_amount: Decimal,
    pub fees: Decimal,
    pub risk: SettlementRiskMetrics,
    pub attempt: u32,
    pub retry_of: Option<SettlementId>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Settlement {
    /// Pending settlement for a trade
    pub fn for_trade(
        trade: &Trade,
        trade_date: NaiveDate,
        settlement_date: NaiveDate,
        days_to_settle: u32,
        timestamp: i64,
    ) -> Self {
        let net_amount = trade.trade_value();
        Self {
            settlement_id: SettlementId::new(),
            reference: SettlementRef::Trade(trade.trade_id()),
            status: SettlementStatus::Pending,
            counterparty_a: trade.seller(),
            counterparty_b: trade.buyer(),
            symbol: Some(trade.symbol().clone()),
            quantity: trade.quantity(),
            price: Some(trade.price()),
            trade_date,
            settlement_date,
            net_amount,
            fees: trade.maker_fee() + trade.taker_fee(),
            risk: SettlementRiskMetrics {
                exposure: net_amount,
                days_to_settle,
            },
            attempt: 1,
            retry_of: None,
            failure_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Netted transfer between `party` and `clearing_house`
    pub fn netted(
        party: AccountId,
        clearing_house: AccountId,
        net_amount: Decimal,
        settlement_date: NaiveDate,
        timestamp: i64,
    ) -> Self {
        Self {
            settlement_id: SettlementId::new(),
            reference: SettlementRef::Netted,
            status: SettlementStatus::Pending,
            counterparty_a: party,
            counterparty_b: clearing_house,
            symbol: None,
            quantity: Quantity::zero(),
            price: None,
            trade_date: settlement_date,
            settlement_date,
            net_amount,
            fees: Decimal::ZERO,
            risk: SettlementRiskMetrics {
                exposure: net_amount.abs(),
                days_to_settle: 0,
            },
            attempt: 1,
            retry_of: None,
            failure_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// New pending attempt cloned from a failed one
    pub fn retry(&self, settlement_date: NaiveDate, timestamp: i64) -> Self {
        Self {
            settlement_id: SettlementId::new(),
            status: SettlementStatus::Pending,
            settlement_date,
            attempt: self.attempt + 1,
            retry_of: Some(self.settlement_id),
            failure_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
            ..self.clone()
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == SettlementStatus::Pending && self.settlement_date <= today
    }

    /// Mark completed; false if already terminal
    pub fn complete(&mut self, timestamp: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SettlementStatus::Completed;
        self.updated_at = timestamp;
        true
    }

    /// Mark failed; false if already terminal
    pub fn fail(&mut self, reason: impl Into<String>, timestamp: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SettlementStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = timestamp;
        true
    }
}

/// A settlement that failed within a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSettlement {
    pub settlement_id: SettlementId,
    pub reference: SettlementRef,
    pub reason: String,
    /// Pending retry created by the failure policy, if any
    pub retry: Option<SettlementId>,
    pub queued_for_review: bool,
}

/// Per-batch clearing summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearingReport {
    pub batch_id: Uuid,
    pub generated_at: i64,
    pub business_date: NaiveDate,
    /// Due settlements collected for this batch
    pub total_settlements: usize,
    /// Of those, settled through netting
    pub netted_settlements: usize,
    /// Transfers executed (netted + bilateral)
    pub transfers: usize,
    pub completed: usize,
    pub failed: usize,
    /// Gross cash value of the due settlements
    pub total_value: Decimal,
    /// Cash actually moved by netted transfers
    pub netted_value: Decimal,
    /// 1 − moved / gross over the netted subset, 0 when nothing was netted
    pub netting_efficiency: f64,
    pub success_rate: f64,
    pub failed_settlements: Vec<FailedSettlement>,
    pub systemic_risk: f64,
    pub liquidity_risk: f64,
    pub operational_risk: f64,
}
