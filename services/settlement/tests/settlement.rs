//! Batch settlement against an in-memory transfer journal

use chrono::NaiveDate;
use rust_decimal::Decimal;
use scheduler::{PeriodicTask, TickOutcome};
use settlement::{
    FailurePolicy, SettlementConfig, SettlementEngine, SettlementError, SettlementTask, TransferJournal,
};
use std::sync::Arc;
use types::ids::{AccountId, InstrumentId, OrderId, SettlementId, CENTRAL_COUNTERPARTY};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::settlement::{SettlementRef, SettlementStatus};
use types::trade::Trade;

fn noon(m: u32, d: u32) -> i64 {
    NaiveDate::from_ymd_opt(2024, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_nanos_opt()
        .unwrap()
}

// Thursday, settles Monday at T+2
fn thursday() -> i64 {
    noon(3, 7)
}

fn monday() -> i64 {
    noon(3, 11)
}

fn trade(seller: AccountId, buyer: AccountId, value: u64) -> Trade {
    Trade::new(
        1,
        InstrumentId::new("ACME"),
        OrderId::new(),
        OrderId::new(),
        seller,
        buyer,
        Side::Buy,
        Price::from_u64(value),
        Quantity::from_u64(1),
        Decimal::ZERO,
        Decimal::ZERO,
        thursday(),
    )
}

fn setup(config: SettlementConfig) -> (SettlementEngine, Arc<TransferJournal>) {
    let journal = Arc::new(TransferJournal::default());
    (SettlementEngine::new(config, journal.clone()), journal)
}

fn status(engine: &SettlementEngine, id: SettlementId) -> SettlementStatus {
    engine.settlement(id).unwrap().status
}

#[test]
fn test_settles_t_plus_two_over_weekend() {
    let (engine, _) = setup(SettlementConfig::default());
    let (a, b) = (AccountId::new(), AccountId::new());
    let id = engine.record_trade(&trade(a, b, 300));

    let s = engine.settlement(id).unwrap();
    assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    assert_eq!(s.risk.days_to_settle, 2);

    let friday = engine.run_batch(noon(3, 8));
    assert_eq!(friday.total_settlements, 0);
    assert_eq!(friday.success_rate, 1.0);
    assert_eq!(status(&engine, id), SettlementStatus::Pending);

    let report = engine.run_batch(monday());
    assert_eq!(report.total_settlements, 1);
    assert_eq!(status(&engine, id), SettlementStatus::Completed);
}

#[test]
fn test_duplicate_trade_recorded_once() {
    let (engine, _) = setup(SettlementConfig::default());
    let t = trade(AccountId::new(), AccountId::new(), 10);
    assert_eq!(engine.record_trade(&t), engine.record_trade(&t));
    assert_eq!(engine.settlements_with_status(SettlementStatus::Pending).len(), 1);
}

#[test]
fn test_three_party_cycle_needs_no_transfers() {
    let (engine, journal) = setup(SettlementConfig::default());
    let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
    let ids = [
        engine.record_trade(&trade(a, b, 100)),
        engine.record_trade(&trade(b, c, 100)),
        engine.record_trade(&trade(c, a, 100)),
    ];

    let report = engine.run_batch(monday());
    assert_eq!(report.total_settlements, 3);
    assert_eq!(report.netted_settlements, 3);
    assert_eq!(report.transfers, 0);
    assert_eq!(report.completed, 3);
    assert_eq!(report.netting_efficiency, 1.0);
    assert_eq!(report.liquidity_risk, 0.0);
    assert!(journal.executed().is_empty());
    for id in ids {
        assert_eq!(status(&engine, id), SettlementStatus::Completed);
    }
}

#[test]
fn test_offsetting_pair_settles_through_clearing_house() {
    let config = SettlementConfig {
        netting_threshold: Decimal::from(50),
        ..SettlementConfig::default()
    };
    let (engine, journal) = setup(config);
    let (a, b) = (AccountId::new(), AccountId::new());
    engine.record_trade(&trade(a, b, 300));
    engine.record_trade(&trade(b, a, 200));

    let report = engine.run_batch(monday());
    assert_eq!(report.transfers, 2);
    assert_eq!(report.netted_value, Decimal::from(200));
    assert_eq!(report.netting_efficiency, 0.8);

    let executed = journal.executed();
    let b_pays = executed.iter().find(|t| t.payer == b).unwrap();
    assert_eq!((b_pays.payee, b_pays.amount), (CENTRAL_COUNTERPARTY, Decimal::from(100)));
    let a_receives = executed.iter().find(|t| t.payee == a).unwrap();
    assert_eq!(a_receives.payer, CENTRAL_COUNTERPARTY);
}

#[test]
fn test_failed_transfer_retries_then_queues() {
    let (engine, journal) = setup(SettlementConfig::default());
    let (a, b, c, d) = (AccountId::new(), AccountId::new(), AccountId::new(), AccountId::new());
    let failing = engine.record_trade(&trade(a, b, 300));
    let healthy = engine.record_trade(&trade(c, d, 400));
    journal.block(b);

    let first = engine.run_batch(monday());
    assert_eq!((first.completed, first.failed), (1, 1));
    assert_eq!(first.operational_risk, 0.5);
    assert_eq!(status(&engine, healthy), SettlementStatus::Completed);
    assert_eq!(status(&engine, failing), SettlementStatus::Failed);
    let retry = first.failed_settlements[0].retry.unwrap();
    assert_eq!(engine.settlement(retry).unwrap().attempt, 2);

    // retries are dated today and go out with the next batch
    let second = engine.run_batch(monday() + 1);
    let third_attempt = second.failed_settlements[0].retry.unwrap();
    let third = engine.run_batch(monday() + 2);
    assert_eq!(third.failed_settlements[0].settlement_id, third_attempt);
    assert!(third.failed_settlements[0].retry.is_none());
    assert!(third.failed_settlements[0].queued_for_review);
    assert_eq!(engine.manual_queue().len(), 1);

    assert_eq!(engine.run_batch(monday() + 3).total_settlements, 0);

    journal.unblock(b);
    let released = engine.requeue(third_attempt, monday() + 4).unwrap();
    assert!(engine.manual_queue().is_empty());
    let last = engine.run_batch(monday() + 5);
    assert_eq!(last.completed, 1);
    let done = engine.settlement(released).unwrap();
    assert_eq!(done.status, SettlementStatus::Completed);
    assert_eq!(done.attempt, 4);
}

#[test]
fn test_manual_queue_policy_skips_retries() {
    let config = SettlementConfig {
        failure_policy: FailurePolicy::ManualQueue,
        ..SettlementConfig::default()
    };
    let (engine, journal) = setup(config);
    let (a, b) = (AccountId::new(), AccountId::new());
    let id = engine.record_trade(&trade(a, b, 300));
    journal.block(b);

    let report = engine.run_batch(monday());
    assert!(report.failed_settlements[0].queued_for_review);
    assert_eq!(engine.manual_queue()[0].settlement_id, id);
    assert_eq!(engine.manual_queue()[0].failure_reason.as_deref().map(|r| r.contains("Insufficient")), Some(true));
}

#[test]
fn test_finished_records_are_evicted_beyond_retention() {
    let config = SettlementConfig {
        failure_policy: FailurePolicy::ManualQueue,
        retained_settlements: 3,
        ..SettlementConfig::default()
    };
    let (engine, journal) = setup(config);
    let blocked = AccountId::new();
    journal.block(blocked);
    let queued = engine.record_trade(&trade(AccountId::new(), blocked, 50));
    engine.run_batch(monday());
    assert_eq!(engine.manual_queue().len(), 1);

    let mut trades = Vec::new();
    for _ in 0..20 {
        let t = trade(AccountId::new(), AccountId::new(), 10);
        engine.record_trade(&t);
        let report = engine.run_batch(monday());
        assert_eq!(report.total_settlements, 1);
        assert!(engine.retained() <= 4, "retained {}", engine.retained());
        trades.push(t);
    }

    // newest still visible, oldest gone, review queue untouched
    let newest = trades.last().unwrap().trade_id();
    assert_eq!(
        engine.settlement_for_trade(newest).unwrap().status,
        SettlementStatus::Completed
    );
    assert!(engine.settlement_for_trade(trades[0].trade_id()).is_none());
    assert_eq!(status(&engine, queued), SettlementStatus::Failed);
    assert_eq!(engine.manual_queue()[0].settlement_id, queued);
}

#[test]
fn test_requeue_rejects_unknown_and_unqueued() {
    let (engine, _) = setup(SettlementConfig::default());
    let id = engine.record_trade(&trade(AccountId::new(), AccountId::new(), 10));
    assert!(matches!(
        engine.requeue(SettlementId::new(), monday()),
        Err(SettlementError::UnknownSettlement { .. })
    ));
    assert!(matches!(engine.requeue(id, monday()), Err(SettlementError::NotQueued { .. })));
}

#[test]
fn test_failed_netted_transfer_retries_without_renetting() {
    let config = SettlementConfig {
        netting_threshold: Decimal::from(50),
        ..SettlementConfig::default()
    };
    let (engine, journal) = setup(config);
    let (a, b) = (AccountId::new(), AccountId::new());
    let first_trade = engine.record_trade(&trade(a, b, 300));
    engine.record_trade(&trade(b, a, 200));
    journal.block(b);

    let report = engine.run_batch(monday());
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_settlements[0].reference, SettlementRef::Netted);
    // the trades themselves were novated
    assert_eq!(status(&engine, first_trade), SettlementStatus::Completed);

    journal.unblock(b);
    let retry = engine.run_batch(monday() + 1);
    assert_eq!(retry.total_settlements, 1);
    assert_eq!(retry.netted_settlements, 0);
    assert_eq!(retry.completed, 1);
    let paid = journal.executed().into_iter().find(|t| t.payer == b).unwrap();
    assert_eq!(paid.amount, Decimal::from(100));
}

#[test]
fn test_risk_scores_for_single_bilateral_trade() {
    let (engine, _) = setup(SettlementConfig::default());
    engine.record_trade(&trade(AccountId::new(), AccountId::new(), 300));
    let report = engine.run_batch(monday());
    assert_eq!(report.netted_settlements, 0);
    assert_eq!(report.systemic_risk, 0.5);
    assert_eq!(report.liquidity_risk, 1.0);
    assert_eq!(report.operational_risk, 0.0);
}

#[tokio::test]
async fn test_reports_are_published_and_bounded() {
    let config = SettlementConfig {
        report_history: 2,
        ..SettlementConfig::default()
    };
    let (engine, _) = setup(config);
    let engine = Arc::new(engine);
    let mut reports = engine.subscribe();
    engine.record_trade(&trade(AccountId::new(), AccountId::new(), 10));

    let mut task = SettlementTask::new(engine.clone());
    assert_eq!(task.name(), "settlement");
    for offset in 0..3 {
        assert_eq!(task.tick(monday() + offset), TickOutcome::Continue);
    }

    assert_eq!(engine.reports().len(), 2);
    let first = reports.recv().await.unwrap();
    assert_eq!(first.total_settlements, 1);
    assert_eq!(reports.recv().await.unwrap().total_settlements, 0);
    assert_eq!(engine.latest_report().unwrap().batch_id, reports.recv().await.unwrap().batch_id);
}
