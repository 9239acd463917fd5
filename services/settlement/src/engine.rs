//! Settlement engine
//!
//! Trades become pending settlements at execution time. Each batch collects
//! the due ones, nets them multilaterally, executes the resulting transfers
//! and publishes a clearing report. Transfers run outside the state lock;
//! new trades recorded meanwhile simply wait for the next batch.
//!
//! Pending records are indexed by settlement date, so a batch only touches
//! what is due. Finished records are kept for lookup up to
//! `retained_settlements`, oldest evicted first; records awaiting manual
//! review are never evicted.

use crate::calendar::{business_date, BusinessCalendar};
use crate::netting::net_settlements;
use crate::transfer::{FailurePolicy, TransferAgent, TransferInstruction};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use scheduler::{PeriodicTask, TickOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use types::ids::{AccountId, SettlementId, TradeId, CENTRAL_COUNTERPARTY};
use types::settlement::{ClearingReport, FailedSettlement, Settlement, SettlementRef, SettlementStatus};
use types::trade::Trade;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Settlement not found: {settlement_id}")]
    UnknownSettlement { settlement_id: String },

    #[error("Settlement {settlement_id} is not awaiting manual review")]
    NotQueued { settlement_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Business days from trade date to settlement date
    pub settlement_days: u32,
    pub batch_interval_secs: u64,
    /// Parties whose |net| exceeds this are settled through netting
    pub netting_threshold: Decimal,
    pub failure_policy: FailurePolicy,
    /// Clearing reports kept for inspection
    pub report_history: usize,
    /// Completed or failed records kept for lookup
    pub retained_settlements: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            settlement_days: 2,
            batch_interval_secs: 60,
            netting_threshold: Decimal::from(1_000),
            failure_policy: FailurePolicy::default(),
            report_history: 32,
            retained_settlements: 10_000,
        }
    }
}

impl SettlementConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }
}

#[derive(Debug, Default)]
struct SettlementState {
    settlements: BTreeMap<SettlementId, Settlement>,
    by_trade: HashMap<TradeId, SettlementId>,
    /// Pending records by settlement date
    due_index: BTreeMap<NaiveDate, BTreeSet<SettlementId>>,
    /// Finished records in the order they finished
    finished: VecDeque<SettlementId>,
    manual_queue: BTreeSet<SettlementId>,
    reports: VecDeque<Arc<ClearingReport>>,
}

impl SettlementState {
    fn insert_pending(&mut self, settlement: Settlement) {
        self.due_index
            .entry(settlement.settlement_date)
            .or_default()
            .insert(settlement.settlement_id);
        self.settlements.insert(settlement.settlement_id, settlement);
    }

    /// Pull every pending record due on or before `today` out of the index
    fn take_due(&mut self, today: NaiveDate) -> Vec<Settlement> {
        let later = today.succ_opt().map(|next| self.due_index.split_off(&next)).unwrap_or_default();
        let due = std::mem::replace(&mut self.due_index, later);
        due.into_values()
            .flatten()
            .filter_map(|id| self.settlements.get(&id))
            .filter(|s| s.is_due(today))
            .cloned()
            .collect()
    }

    fn finish(&mut self, settlement_id: SettlementId) {
        self.finished.push_back(settlement_id);
    }

    fn evict_finished(&mut self, retain: usize) {
        while self.finished.len() > retain {
            let Some(id) = self.finished.pop_front() else {
                break;
            };
            if let Some(SettlementRef::Trade(trade_id)) = self.settlements.remove(&id).map(|s| s.reference) {
                if self.by_trade.get(&trade_id) == Some(&id) {
                    self.by_trade.remove(&trade_id);
                }
            }
        }
    }
}

pub struct SettlementEngine {
    config: SettlementConfig,
    calendar: BusinessCalendar,
    agent: Arc<dyn TransferAgent>,
    state: Mutex<SettlementState>,
    subscribers: Mutex<Vec<UnboundedSender<Arc<ClearingReport>>>>,
}

impl SettlementEngine {
    pub fn new(config: SettlementConfig, agent: Arc<dyn TransferAgent>) -> Self {
        Self {
            config,
            calendar: BusinessCalendar,
            agent,
            state: Mutex::new(SettlementState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Clearing report of every subsequent batch
    pub fn subscribe(&self) -> UnboundedReceiver<Arc<ClearingReport>> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Pending settlement for `trade`, due T+`settlement_days`
    ///
    /// Recording the same trade twice returns the existing settlement.
    pub fn record_trade(&self, trade: &Trade) -> SettlementId {
        let mut state = self.state.lock();
        if let Some(existing) = state.by_trade.get(&trade.trade_id()) {
            return *existing;
        }
        let trade_date = business_date(trade.executed_at());
        let settlement_date = self.calendar.add_business_days(trade_date, self.config.settlement_days);
        let settlement = Settlement::for_trade(
            trade,
            trade_date,
            settlement_date,
            self.config.settlement_days,
            trade.executed_at(),
        );
        let id = settlement.settlement_id;
        debug!(settlement_id = %id, trade_id = %trade.trade_id(), %settlement_date, "settlement created");
        state.by_trade.insert(trade.trade_id(), id);
        state.insert_pending(settlement);
        id
    }

    pub fn settlement(&self, settlement_id: SettlementId) -> Option<Settlement> {
        self.state.lock().settlements.get(&settlement_id).cloned()
    }

    pub fn settlement_for_trade(&self, trade_id: TradeId) -> Option<Settlement> {
        let state = self.state.lock();
        let id = state.by_trade.get(&trade_id)?;
        state.settlements.get(id).cloned()
    }

    pub fn settlements_with_status(&self, status: SettlementStatus) -> Vec<Settlement> {
        self.state
            .lock()
            .settlements
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect()
    }

    /// Failed settlements parked for manual review
    pub fn manual_queue(&self) -> Vec<Settlement> {
        let state = self.state.lock();
        state
            .manual_queue
            .iter()
            .filter_map(|id| state.settlements.get(id).cloned())
            .collect()
    }

    /// Release a reviewed settlement back into the next batch
    pub fn requeue(&self, settlement_id: SettlementId, now: i64) -> Result<SettlementId, SettlementError> {
        let mut state = self.state.lock();
        if !state.manual_queue.remove(&settlement_id) {
            return Err(match state.settlements.contains_key(&settlement_id) {
                true => SettlementError::NotQueued {
                    settlement_id: settlement_id.to_string(),
                },
                false => SettlementError::UnknownSettlement {
                    settlement_id: settlement_id.to_string(),
                },
            });
        }
        let failed = state
            .settlements
            .get(&settlement_id)
            .ok_or_else(|| SettlementError::UnknownSettlement {
                settlement_id: settlement_id.to_string(),
            })?;
        let retry = failed.retry(business_date(now), now);
        let retry_id = retry.settlement_id;
        info!(settlement_id = %settlement_id, retry_id = %retry_id, "settlement released from manual review");
        state.insert_pending(retry);
        state.finish(settlement_id);
        state.evict_finished(self.config.retained_settlements);
        Ok(retry_id)
    }

    /// Records currently held, pending and finished
    pub fn retained(&self) -> usize {
        self.state.lock().settlements.len()
    }

    pub fn latest_report(&self) -> Option<Arc<ClearingReport>> {
        self.state.lock().reports.back().cloned()
    }

    pub fn reports(&self) -> Vec<Arc<ClearingReport>> {
        self.state.lock().reports.iter().cloned().collect()
    }

    /// Settle everything due on the business date of `now`
    pub fn run_batch(&self, now: i64) -> Arc<ClearingReport> {
        let today = business_date(now);

        // Plan under the lock
        let (due, netting, instructions) = {
            let mut state = self.state.lock();
            let due = state.take_due(today);
            let trades: Vec<&Settlement> = due
                .iter()
                .filter(|s| matches!(s.reference, SettlementRef::Trade(_)))
                .collect();
            let netting = net_settlements(&trades, self.config.netting_threshold);

            for id in &netting.covered {
                if let Some(s) = state.settlements.get_mut(id) {
                    s.complete(now);
                }
            }

            let mut instructions = Vec::new();
            for (party, amount) in &netting.transfers {
                let record = Settlement::netted(*party, CENTRAL_COUNTERPARTY, *amount, today, now);
                instructions.push(TransferInstruction::for_settlement(&record));
                state.settlements.insert(record.settlement_id, record);
            }
            for s in &due {
                let bilateral = netting.bilateral.contains(&s.settlement_id);
                let netted_retry = s.reference == SettlementRef::Netted;
                if bilateral || netted_retry {
                    instructions.push(TransferInstruction::for_settlement(s));
                }
            }
            (due, netting, instructions)
        };

        // Execute without the lock
        let outcomes: Vec<_> = instructions
            .iter()
            .map(|instruction| (instruction, self.agent.execute(instruction)))
            .collect();

        // Apply outcomes
        let mut completed = netting.covered.len();
        let mut failed_settlements = Vec::new();
        let mut funding = Decimal::ZERO;
        let report = {
            let mut state = self.state.lock();
            for (instruction, outcome) in &outcomes {
                let id = instruction.settlement_id;
                match outcome {
                    Ok(()) => {
                        if let Some(s) = state.settlements.get_mut(&id) {
                            s.complete(now);
                        }
                        completed += 1;
                        if instruction.payer != CENTRAL_COUNTERPARTY {
                            funding += instruction.amount;
                        }
                    }
                    Err(e) => {
                        error!(settlement_id = %id, reference = %instruction.reference, error = %e, "settlement transfer failed");
                        failed_settlements.push(self.apply_failure(&mut state, id, &e.to_string(), today, now));
                    }
                }
            }

            let touched: BTreeSet<SettlementId> = due
                .iter()
                .map(|s| s.settlement_id)
                .chain(instructions.iter().map(|i| i.settlement_id))
                .collect();
            for id in touched {
                let finished = state.settlements.get(&id).is_some_and(|s| s.status.is_terminal());
                if finished && !state.manual_queue.contains(&id) {
                    state.finish(id);
                }
            }
            state.evict_finished(self.config.retained_settlements);

            let report = Arc::new(build_report(
                today,
                now,
                &due,
                netting.covered.len(),
                netting.netted_value(),
                netting.efficiency(),
                outcomes.len(),
                completed,
                failed_settlements,
                funding,
            ));
            state.reports.push_back(report.clone());
            while state.reports.len() > self.config.report_history.max(1) {
                state.reports.pop_front();
            }
            report
        };

        if report.total_settlements > 0 {
            info!(
                batch_id = %report.batch_id,
                due = report.total_settlements,
                netted = report.netted_settlements,
                transfers = report.transfers,
                failed = report.failed,
                efficiency = report.netting_efficiency,
                "settlement batch complete"
            );
        } else {
            debug!(%today, "settlement batch with nothing due");
        }
        self.subscribers.lock().retain(|tx| tx.send(report.clone()).is_ok());
        report
    }

    fn apply_failure(
        &self,
        state: &mut SettlementState,
        settlement_id: SettlementId,
        reason: &str,
        today: NaiveDate,
        now: i64,
    ) -> FailedSettlement {
        let Some(settlement) = state.settlements.get_mut(&settlement_id) else {
            return FailedSettlement {
                settlement_id,
                reference: SettlementRef::Netted,
                reason: reason.to_string(),
                retry: None,
                queued_for_review: false,
            };
        };
        settlement.fail(reason, now);
        let reference = settlement.reference;

        if self.config.failure_policy.retries(settlement.attempt) {
            let retry = settlement.retry(today, now);
            let retry_id = retry.settlement_id;
            warn!(settlement_id = %settlement_id, retry_id = %retry_id, attempt = retry.attempt, "settlement will be retried");
            state.insert_pending(retry);
            FailedSettlement {
                settlement_id,
                reference,
                reason: reason.to_string(),
                retry: Some(retry_id),
                queued_for_review: false,
            }
        } else {
            warn!(settlement_id = %settlement_id, "settlement queued for manual review");
            state.manual_queue.insert(settlement_id);
            FailedSettlement {
                settlement_id,
                reference,
                reason: reason.to_string(),
                retry: None,
                queued_for_review: true,
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    business_date: NaiveDate,
    now: i64,
    due: &[Settlement],
    netted_settlements: usize,
    netted_value: Decimal,
    netting_efficiency: f64,
    transfers: usize,
    completed: usize,
    failed_settlements: Vec<FailedSettlement>,
    funding: Decimal,
) -> ClearingReport {
    let failed = failed_settlements.len();
    let total_value: Decimal = due.iter().map(|s| s.net_amount.abs()).sum();
    let ratio = |num: Decimal, den: Decimal| -> f64 {
        if den.is_zero() {
            0.0
        } else {
            (num / den).to_f64().unwrap_or(0.0)
        }
    };

    // Largest single party's share of gross obligations
    let mut gross: BTreeMap<AccountId, Decimal> = BTreeMap::new();
    for s in due {
        let amount = s.net_amount.abs();
        *gross.entry(s.counterparty_a).or_default() += amount;
        *gross.entry(s.counterparty_b).or_default() += amount;
    }
    let largest = gross
        .iter()
        .filter(|(party, _)| **party != CENTRAL_COUNTERPARTY)
        .map(|(_, v)| *v)
        .max()
        .unwrap_or(Decimal::ZERO);

    ClearingReport {
        batch_id: Uuid::now_v7(),
        generated_at: now,
        business_date,
        total_settlements: due.len(),
        netted_settlements,
        transfers,
        completed,
        failed,
        total_value,
        netted_value,
        netting_efficiency,
        success_rate: if completed + failed == 0 {
            1.0
        } else {
            completed as f64 / (completed + failed) as f64
        },
        failed_settlements,
        systemic_risk: ratio(largest, total_value * Decimal::TWO),
        liquidity_risk: ratio(funding, total_value).min(1.0),
        operational_risk: if transfers == 0 { 0.0 } else { failed as f64 / transfers as f64 },
    }
}

/// Runs a settlement batch every period
pub struct SettlementTask {
    engine: Arc<SettlementEngine>,
}

impl SettlementTask {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self { engine }
    }
}

impl PeriodicTask for SettlementTask {
    fn name(&self) -> &str {
        "settlement"
    }

    fn tick(&mut self, now: i64) -> TickOutcome {
        self.engine.run_batch(now);
        TickOutcome::Continue
    }
}
