use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use settlement::{SettlementConfig, SettlementEngine, TransferJournal};
use std::collections::BTreeMap;
use std::sync::Arc;
use types::ids::{AccountId, InstrumentId, OrderId, CENTRAL_COUNTERPARTY};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::settlement::SettlementStatus;
use types::trade::Trade;

fn noon(d: u32) -> i64 {
    NaiveDate::from_ymd_opt(2024, 3, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_nanos_opt()
        .unwrap()
}

proptest! {
    /// Every party ends with exactly its gross position in cash, whatever
    /// mix of netted and bilateral settlement the threshold produces.
    #[test]
    fn batch_moves_each_party_its_net_position(
        flows in prop::collection::vec((0usize..4, 1usize..4, 1u64..5_000), 1..20),
        threshold in 0u64..3_000,
    ) {
        let parties: Vec<AccountId> = (0..4).map(|_| AccountId::new()).collect();
        let journal = Arc::new(TransferJournal::default());
        let config = SettlementConfig {
            netting_threshold: Decimal::from(threshold),
            ..SettlementConfig::default()
        };
        let engine = SettlementEngine::new(config, journal.clone());

        let mut expected: BTreeMap<AccountId, Decimal> = BTreeMap::new();
        for (i, (seller, offset, value)) in flows.iter().enumerate() {
            let seller = parties[*seller];
            let buyer = parties[(parties.iter().position(|p| *p == seller).unwrap() + offset) % 4];
            let trade = Trade::new(
                i as u64,
                InstrumentId::new("ACME"),
                OrderId::new(),
                OrderId::new(),
                seller,
                buyer,
                Side::Buy,
                Price::from_u64(*value),
                Quantity::from_u64(1),
                Decimal::ZERO,
                Decimal::ZERO,
                noon(7),
            );
            engine.record_trade(&trade);
            *expected.entry(seller).or_default() += Decimal::from(*value);
            *expected.entry(buyer).or_default() -= Decimal::from(*value);
        }

        let report = engine.run_batch(noon(11));
        prop_assert_eq!(report.total_settlements, flows.len());
        prop_assert_eq!(report.failed, 0);
        prop_assert!(engine.settlements_with_status(SettlementStatus::Pending).is_empty());

        let mut moved: BTreeMap<AccountId, Decimal> = BTreeMap::new();
        let mut clearing_house = Decimal::ZERO;
        for t in journal.executed() {
            for (party, delta) in [(t.payee, t.amount), (t.payer, -t.amount)] {
                if party == CENTRAL_COUNTERPARTY {
                    clearing_house += delta;
                } else {
                    *moved.entry(party).or_default() += delta;
                }
            }
        }
        prop_assert_eq!(clearing_house, Decimal::ZERO);
        for (party, net) in expected {
            prop_assert_eq!(moved.get(&party).copied().unwrap_or_default(), net);
        }
        prop_assert!((0.0..=1.0).contains(&report.netting_efficiency));
    }
}
