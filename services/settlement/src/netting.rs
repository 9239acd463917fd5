//! Multilateral netting
//!
//! Every due trade settlement moves `net_amount` of cash from its buyer
//! (counterparty B) to its seller (counterparty A). Summing those flows per
//! party gives a signed net position, positive when the party receives.
//!
//! A party is netted when its |net| exceeds the threshold or its net is
//! exactly zero. A settlement is covered by netting only when both of its
//! parties are netted; each netted party then makes or receives one transfer
//! against the central counterparty for its net over the covered
//! settlements. Zero nets move nothing. Everything else settles bilaterally.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use types::ids::{AccountId, SettlementId};
use types::settlement::Settlement;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NettingResult {
    /// Net per party over every due settlement
    pub positions: BTreeMap<AccountId, Decimal>,
    pub netted_parties: BTreeSet<AccountId>,
    /// Settlements discharged by the netted transfers
    pub covered: Vec<SettlementId>,
    pub bilateral: Vec<SettlementId>,
    /// Non-zero net per netted party over the covered settlements
    pub transfers: BTreeMap<AccountId, Decimal>,
    /// Cash value of the covered settlements
    pub covered_value: Decimal,
}

impl NettingResult {
    /// Cash moved by the netted transfers
    pub fn netted_value(&self) -> Decimal {
        self.transfers.values().map(|v| v.abs()).sum()
    }

    /// Share of the covered obligations eliminated by netting
    ///
    /// Each covered settlement is one payment and one receipt, so the gross
    /// is twice its value. Zero when nothing was covered.
    pub fn efficiency(&self) -> f64 {
        if self.covered_value.is_zero() {
            return 0.0;
        }
        let gross = self.covered_value * Decimal::TWO;
        (Decimal::ONE - self.netted_value() / gross).to_f64().unwrap_or(0.0)
    }
}

fn add_flow(positions: &mut BTreeMap<AccountId, Decimal>, s: &Settlement) {
    *positions.entry(s.counterparty_a).or_default() += s.net_amount;
    *positions.entry(s.counterparty_b).or_default() -= s.net_amount;
}

pub fn net_settlements(settlements: &[&Settlement], threshold: Decimal) -> NettingResult {
    let mut positions = BTreeMap::new();
    for s in settlements {
        add_flow(&mut positions, s);
    }

    let netted_parties: BTreeSet<AccountId> = positions
        .iter()
        .filter(|(_, net)| net.is_zero() || net.abs() > threshold)
        .map(|(party, _)| *party)
        .collect();

    let mut covered = Vec::new();
    let mut bilateral = Vec::new();
    let mut covered_positions = BTreeMap::new();
    let mut covered_value = Decimal::ZERO;
    for s in settlements {
        if netted_parties.contains(&s.counterparty_a) && netted_parties.contains(&s.counterparty_b) {
            add_flow(&mut covered_positions, s);
            covered_value += s.net_amount;
            covered.push(s.settlement_id);
        } else {
            bilateral.push(s.settlement_id);
        }
    }

    let transfers = covered_positions
        .into_iter()
        .filter(|(_, net)| !net.is_zero())
        .collect();

    NettingResult {
        positions,
        netted_parties,
        covered,
        bilateral,
        transfers,
        covered_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use types::ids::{InstrumentId, OrderId};
    use types::numeric::{Price, Quantity};
    use types::order::Side;
    use types::trade::Trade;

    fn settle(seller: AccountId, buyer: AccountId, value: u64) -> Settlement {
        let trade = Trade::new(
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
            0,
        );
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        Settlement::for_trade(&trade, date, date, 0, 0)
    }

    #[test]
    fn test_three_party_cycle_nets_to_nothing() {
        let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
        let all = [settle(a, b, 100), settle(b, c, 100), settle(c, a, 100)];
        let refs: Vec<_> = all.iter().collect();
        let result = net_settlements(&refs, Decimal::from(1_000));

        assert_eq!(result.covered.len(), 3);
        assert!(result.bilateral.is_empty());
        assert!(result.transfers.is_empty());
        assert_eq!(result.efficiency(), 1.0);
    }

    #[test]
    fn test_small_nets_settle_bilaterally() {
        let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
        let all = [settle(a, b, 500), settle(b, c, 50), settle(a, c, 100)];
        let refs: Vec<_> = all.iter().collect();
        let result = net_settlements(&refs, Decimal::from(100));

        assert_eq!(result.positions[&a], Decimal::from(600));
        assert_eq!(result.positions[&b], Decimal::from(-450));
        assert_eq!(result.positions[&c], Decimal::from(-150));
        // all above threshold
        assert_eq!(result.covered.len(), 3);

        let result = net_settlements(&refs, Decimal::from(200));
        // c (150) falls under the threshold
        assert!(!result.netted_parties.contains(&c));
        assert_eq!(result.covered, vec![all[0].settlement_id]);
        assert_eq!(result.bilateral.len(), 2);
        assert_eq!(result.transfers[&a], Decimal::from(500));
        assert_eq!(result.transfers[&b], Decimal::from(-500));
    }

    #[test]
    fn test_bilateral_pair_has_no_efficiency_gain() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let all = [settle(a, b, 300)];
        let refs: Vec<_> = all.iter().collect();
        let result = net_settlements(&refs, Decimal::ZERO);
        assert_eq!(result.netted_value(), Decimal::from(600));
        assert_eq!(result.efficiency(), 0.0);
    }

    #[test]
    fn test_offsetting_pair_settles_net() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let all = [settle(a, b, 300), settle(b, a, 200)];
        let refs: Vec<_> = all.iter().collect();
        let result = net_settlements(&refs, Decimal::from(50));
        assert_eq!(result.transfers[&a], Decimal::from(100));
        assert_eq!(result.transfers[&b], Decimal::from(-100));
        // 200 moved instead of 1000 gross
        assert_eq!(result.efficiency(), 0.8);
    }
}
