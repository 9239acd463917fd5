//! Account and balance types
//!
//! An account holds a cash balance and share holdings per instrument.
//! Trade-date bookkeeping applies fills here; settlement moves the
//! obligations separately.

use crate::errors::AccountError;
use crate::ids::{AccountId, InstrumentId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    /// Active and can trade
    Active,
    /// Temporarily suspended
    Suspended,
    /// Permanently closed
    Closed,
}

/// Account structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub status: AccountStatus,
    pub cash: Decimal,
    /// Signed share holdings; negative only when short selling is allowed
    pub holdings: BTreeMap<InstrumentId, Decimal>,
    /// Cost basis per instrument (signed, cash paid for current holding)
    pub cost_basis: BTreeMap<InstrumentId, Decimal>,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl Account {
    /// Create a new active account with an opening cash balance
    pub fn new(account_id: AccountId, cash: Decimal, timestamp: i64) -> Self {
        Self {
            account_id,
            status: AccountStatus::Active,
            cash,
            holdings: BTreeMap::new(),
            cost_basis: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Check if account is active
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Shares held for an instrument
    pub fn holding(&self, symbol: &InstrumentId) -> Decimal {
        self.holdings.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Credit cash (deposit, sale proceeds)
    pub fn credit_cash(&mut self, amount: Decimal, timestamp: i64) -> Result<(), AccountError> {
        if amount < Decimal::ZERO {
            return Err(AccountError::NegativeAmount {
                amount: amount.to_string(),
            });
        }
        self.cash += amount;
        self.touch(timestamp);
        Ok(())
    }

    /// Deposit shares of an instrument at a given cost
    pub fn credit_shares(
        &mut self,
        symbol: InstrumentId,
        quantity: Quantity,
        cost: Decimal,
        timestamp: i64,
    ) {
        *self.holdings.entry(symbol.clone()).or_insert(Decimal::ZERO) += quantity.as_decimal();
        *self.cost_basis.entry(symbol).or_insert(Decimal::ZERO) += cost;
        self.touch(timestamp);
    }

    /// Apply a fill at trade date: moves cash and shares, realizes PnL on reductions
    ///
    /// Cash may go negative only if the caller allowed it at submission.
    pub fn apply_fill(
        &mut self,
        symbol: &InstrumentId,
        signed_quantity: Decimal,
        price: Price,
        fee: Decimal,
        timestamp: i64,
    ) {
        let px = price.as_decimal();
        let held = self.holding(symbol);
        let basis = self.cost_basis.get(symbol).copied().unwrap_or(Decimal::ZERO);

        let reducing = !held.is_zero() && held.is_sign_positive() != signed_quantity.is_sign_positive();
        let (new_held, new_basis) = if reducing {
            let closed = signed_quantity.abs().min(held.abs());
            let avg_cost = basis / held;
            let closed_signed = if held.is_sign_positive() { closed } else { -closed };
            self.realized_pnl += closed_signed * (px - avg_cost);
            let remainder = signed_quantity + closed_signed;
            let held_after = held - closed_signed;
            let basis_after = avg_cost * held_after + remainder * px;
            (held_after + remainder, basis_after)
        } else {
            (held + signed_quantity, basis + signed_quantity * px)
        };

        self.holdings.insert(symbol.clone(), new_held);
        self.cost_basis.insert(symbol.clone(), new_basis);
        self.cash -= signed_quantity * px + fee;
        self.fees_paid += fee;
        self.touch(timestamp);
    }

    /// Market value of holdings at the supplied marks
    pub fn holdings_value(&self, mark: impl Fn(&InstrumentId) -> Option<Price>) -> Decimal {
        self.holdings
            .iter()
            .map(|(symbol, qty)| mark(symbol).map(|p| *qty * p.as_decimal()).unwrap_or(Decimal::ZERO))
            .sum()
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1708123456789000000;

    fn acme() -> InstrumentId {
        InstrumentId::new("ACME")
    }

    #[test]
    fn test_account_creation() {
        let account = Account::new(AccountId::new(), Decimal::from(1_000), TS);
        assert!(account.is_active());
        assert_eq!(account.cash, Decimal::from(1_000));
        assert_eq!(account.holding(&acme()), Decimal::ZERO);
    }

    #[test]
    fn test_credit_negative_rejected() {
        let mut account = Account::new(AccountId::new(), Decimal::ZERO, TS);
        assert!(account.credit_cash(Decimal::from(-1), TS).is_err());
        account.credit_cash(Decimal::from(5), TS).unwrap();
        assert_eq!(account.cash, Decimal::from(5));
    }

    #[test]
    fn test_buy_then_sell_realizes_pnl() {
        let mut account = Account::new(AccountId::new(), Decimal::from(10_000), TS);
        account.apply_fill(&acme(), Decimal::from(10), Price::from_u64(100), Decimal::ONE, TS);
        assert_eq!(account.holding(&acme()), Decimal::from(10));
        assert_eq!(account.cash, Decimal::from(10_000 - 1_000 - 1));

        account.apply_fill(&acme(), Decimal::from(-4), Price::from_u64(110), Decimal::ONE, TS);
        assert_eq!(account.holding(&acme()), Decimal::from(6));
        assert_eq!(account.realized_pnl, Decimal::from(40));
        assert_eq!(account.cost_basis[&acme()], Decimal::from(600));
        assert_eq!(account.fees_paid, Decimal::from(2));
    }

    #[test]
    fn test_fill_through_zero_flips_position() {
        let mut account = Account::new(AccountId::new(), Decimal::from(10_000), TS);
        account.apply_fill(&acme(), Decimal::from(5), Price::from_u64(100), Decimal::ZERO, TS);
        account.apply_fill(&acme(), Decimal::from(-8), Price::from_u64(90), Decimal::ZERO, TS);

        assert_eq!(account.holding(&acme()), Decimal::from(-3));
        assert_eq!(account.realized_pnl, Decimal::from(-50));
        assert_eq!(account.cost_basis[&acme()], Decimal::from(-270));
    }

    #[test]
    fn test_holdings_value() {
        let mut account = Account::new(AccountId::new(), Decimal::ZERO, TS);
        account.credit_shares(acme(), Quantity::from_u64(3), Decimal::from(300), TS);
        let value = account.holdings_value(|_| Some(Price::from_u64(120)));
        assert_eq!(value, Decimal::from(360));
    }
}
