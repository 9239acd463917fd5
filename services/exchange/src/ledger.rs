//! Portfolio ledger
//!
//! Trade-date balances for every account. Fills move cash and holdings as
//! soon as the trade is routed; settlement later confirms that each payer
//! could fund what it bought. The ledger is also the funds check consulted
//! at order entry and the portfolio view the risk engine reads.
//!
//! Admitted orders reserve the cash (buys) or shares (sells) they may use.
//! A trade consumes its orders' reservations in the same account update
//! that books it, and an order that ends without trading releases what is
//! left, so `cash - reserved` never promises the same balance twice.

use crate::config::AccountSeed;
use dashmap::DashMap;
use matching_engine::{FundsCheck, FundsRequirement, MarketDataStore};
use market_maker::Signals;
use risk_engine::{PortfolioSnapshot, PortfolioSource, PositionExposure};
use rust_decimal::Decimal;
use settlement::{TransferAgent, TransferError, TransferInstruction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use types::account::Account;
use types::errors::AccountError;
use types::ids::{AccountId, InstrumentId, OrderId, CENTRAL_COUNTERPARTY};
use types::numeric::Quantity;
use types::order::{Order, Side};
use types::trade::Trade;

#[derive(Debug, Clone)]
struct LedgerAccount {
    name: String,
    account: Account,
    allow_short: bool,
    /// Cash confirmed by settlement, positive when net received
    settled_cash: Decimal,
    reserved_cash: Decimal,
    reserved_shares: BTreeMap<InstrumentId, Decimal>,
}

impl LedgerAccount {
    fn available_cash(&self) -> Decimal {
        self.account.cash - self.reserved_cash
    }

    fn available_shares(&self, symbol: &InstrumentId) -> Decimal {
        self.account.holding(symbol) - self.reserved_shares.get(symbol).copied().unwrap_or_default()
    }

    fn shortfall(&self, requirement: &FundsRequirement) -> Result<(), AccountError> {
        if !self.account.is_active() {
            return Err(AccountError::Inactive {
                account_id: requirement.owner_id.to_string(),
            });
        }
        match requirement.side {
            Side::Buy if self.available_cash() < requirement.cash => Err(AccountError::InsufficientFunds {
                required: requirement.cash.to_string(),
                available: self.available_cash().to_string(),
            }),
            Side::Sell if !self.allow_short => {
                let available = self.available_shares(&requirement.symbol);
                if available < requirement.quantity.as_decimal() {
                    return Err(AccountError::InsufficientShares {
                        symbol: requirement.symbol.to_string(),
                        required: requirement.quantity.to_string(),
                        available: available.to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Give back `reservation`'s hold for `quantity`, or all of it when `None`
    fn unreserve(&mut self, reservation: &mut Reservation, quantity: Option<Decimal>) {
        let quantity = quantity.map_or(reservation.quantity, |q| q.min(reservation.quantity));
        let cash = if quantity == reservation.quantity {
            reservation.cash
        } else {
            reservation
                .cash
                .checked_mul(quantity)
                .and_then(|c| c.checked_div(reservation.quantity))
                .map_or(reservation.cash, |c| c.min(reservation.cash))
        };
        reservation.quantity -= quantity;
        reservation.cash -= cash;
        self.reserved_cash -= cash;
        if reservation.side == Side::Sell && !self.allow_short {
            if let Some(held) = self.reserved_shares.get_mut(&reservation.symbol) {
                *held -= quantity;
                if held.is_zero() {
                    self.reserved_shares.remove(&reservation.symbol);
                }
            }
        }
    }
}

/// What an admitted order still holds
#[derive(Debug, Clone, PartialEq)]
struct Reservation {
    owner_id: AccountId,
    symbol: InstrumentId,
    side: Side,
    quantity: Decimal,
    cash: Decimal,
}

#[derive(Debug, Default)]
pub struct Ledger {
    accounts: DashMap<AccountId, LedgerAccount>,
    names: DashMap<String, AccountId>,
    reservations: DashMap<OrderId, Reservation>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account from its seed; reopening a name returns the existing id
    ///
    /// Seeded holdings carry a zero cost basis.
    pub fn open(&self, seed: &AccountSeed, now: i64) -> AccountId {
        if let Some(id) = self.names.get(&seed.name) {
            return *id;
        }
        let id = AccountId::new();
        let mut account = Account::new(id, seed.cash.max(Decimal::ZERO), now);
        for (symbol, quantity) in &seed.holdings {
            if let Some(qty) = Quantity::try_new(*quantity) {
                account.credit_shares(symbol.clone(), qty, Decimal::ZERO, now);
            }
        }
        info!(account = %seed.name, account_id = %id, cash = %seed.cash, "account opened");
        self.accounts.insert(
            id,
            LedgerAccount {
                name: seed.name.clone(),
                account,
                allow_short: seed.allow_short,
                settled_cash: Decimal::ZERO,
                reserved_cash: Decimal::ZERO,
                reserved_shares: BTreeMap::new(),
            },
        );
        self.names.insert(seed.name.clone(), id);
        id
    }

    pub fn account_id(&self, name: &str) -> Option<AccountId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn name(&self, account_id: AccountId) -> Option<String> {
        self.accounts.get(&account_id).map(|a| a.name.clone())
    }

    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        self.accounts.get(&account_id).map(|a| a.account.clone())
    }

    pub fn settled_cash(&self, account_id: AccountId) -> Decimal {
        self.accounts.get(&account_id).map(|a| a.settled_cash).unwrap_or_default()
    }

    /// Cash held for open orders
    pub fn reserved_cash(&self, account_id: AccountId) -> Decimal {
        self.accounts.get(&account_id).map(|a| a.reserved_cash).unwrap_or_default()
    }

    /// Shares held for open sell orders
    pub fn reserved_shares(&self, account_id: AccountId, symbol: &InstrumentId) -> Decimal {
        self.accounts
            .get(&account_id)
            .and_then(|a| a.reserved_shares.get(symbol).copied())
            .unwrap_or_default()
    }

    pub fn open_reservations(&self) -> usize {
        self.reservations.len()
    }

    /// Book both sides of a trade at trade date
    ///
    /// Each side's order reservation shrinks by the traded quantity.
    pub fn apply_trade(&self, trade: &Trade) {
        let qty = trade.quantity().as_decimal();
        let (buy_order, sell_order) = match trade.side() {
            Side::Buy => (trade.taker_order_id(), trade.maker_order_id()),
            Side::Sell => (trade.maker_order_id(), trade.taker_order_id()),
        };
        for (owner, order_id, signed) in [(trade.buyer(), buy_order, qty), (trade.seller(), sell_order, -qty)] {
            let Some(mut entry) = self.accounts.get_mut(&owner) else {
                debug!(account_id = %owner, trade_id = %trade.trade_id(), "trade for unbooked account");
                continue;
            };
            let fee = trade.fee_for(owner);
            entry
                .account
                .apply_fill(trade.symbol(), signed, trade.price(), fee, trade.executed_at());

            if let Some(mut reservation) = self.reservations.get_mut(&order_id) {
                entry.unreserve(&mut reservation, Some(qty));
                let done = reservation.quantity.is_zero();
                drop(reservation);
                if done {
                    self.reservations.remove(&order_id);
                }
            }
        }
    }

    /// Follow an order update; a terminal order gives back what it still holds
    pub fn apply_order_update(&self, order: &Order) {
        if order.status.is_terminal() {
            self.release(order.order_id);
        }
    }
}

impl FundsCheck for Ledger {
    /// Compares against balances net of open reservations
    fn check_funds(&self, requirement: &FundsRequirement) -> Result<(), AccountError> {
        let entry = self.accounts.get(&requirement.owner_id).ok_or_else(|| AccountError::NotFound {
            account_id: requirement.owner_id.to_string(),
        })?;
        entry.shortfall(requirement)
    }

    fn reserve(&self, order_id: OrderId, requirement: &FundsRequirement) -> Result<(), AccountError> {
        let mut entry = self.accounts.get_mut(&requirement.owner_id).ok_or_else(|| AccountError::NotFound {
            account_id: requirement.owner_id.to_string(),
        })?;
        entry.shortfall(requirement)?;

        let quantity = requirement.quantity.as_decimal();
        entry.reserved_cash += requirement.cash;
        if requirement.side == Side::Sell && !entry.allow_short {
            *entry.reserved_shares.entry(requirement.symbol.clone()).or_default() += quantity;
        }
        self.reservations.insert(
            order_id,
            Reservation {
                owner_id: requirement.owner_id,
                symbol: requirement.symbol.clone(),
                side: requirement.side,
                quantity,
                cash: requirement.cash,
            },
        );
        Ok(())
    }

    fn release(&self, order_id: OrderId) {
        let Some((_, mut reservation)) = self.reservations.remove(&order_id) else {
            return;
        };
        if let Some(mut entry) = self.accounts.get_mut(&reservation.owner_id) {
            entry.unreserve(&mut reservation, None);
        }
    }
}

impl TransferAgent for Ledger {
    /// Confirms a settlement transfer against trade-date balances
    ///
    /// A payer whose cash went negative after booking its trades cannot fund
    /// the transfer.
    fn execute(&self, instruction: &TransferInstruction) -> Result<(), TransferError> {
        for party in [instruction.payer, instruction.payee] {
            if party == CENTRAL_COUNTERPARTY {
                continue;
            }
            let entry = self
                .accounts
                .get(&party)
                .ok_or_else(|| TransferError::Rejected(format!("unknown account {party}")))?;
            if !entry.account.is_active() {
                return Err(TransferError::Rejected(format!("inactive account {party}")));
            }
        }
        if instruction.payer != CENTRAL_COUNTERPARTY {
            let funded = self
                .accounts
                .get(&instruction.payer)
                .map(|e| e.account.cash >= Decimal::ZERO)
                .unwrap_or(false);
            if !funded {
                return Err(TransferError::InsufficientFunds {
                    account: instruction.payer,
                });
            }
        }

        if let Some(mut payer) = self.accounts.get_mut(&instruction.payer) {
            payer.settled_cash -= instruction.amount;
        }
        if let Some(mut payee) = self.accounts.get_mut(&instruction.payee) {
            payee.settled_cash += instruction.amount;
        }
        Ok(())
    }
}

/// One account's holdings marked at the latest market prices
pub struct AccountPortfolio {
    ledger: Arc<Ledger>,
    account_id: AccountId,
    market_data: Arc<MarketDataStore>,
    window: usize,
    reference_volume: Decimal,
}

impl AccountPortfolio {
    pub fn new(
        ledger: Arc<Ledger>,
        account_id: AccountId,
        market_data: Arc<MarketDataStore>,
        window: usize,
        reference_volume: Decimal,
    ) -> Self {
        Self {
            ledger,
            account_id,
            market_data,
            window,
            reference_volume,
        }
    }
}

impl PortfolioSource for AccountPortfolio {
    /// Holdings without any market price yet are left out
    fn portfolio(&self) -> PortfolioSnapshot {
        let Some(account) = self.ledger.account(self.account_id) else {
            return PortfolioSnapshot::new(0, Decimal::ZERO, Vec::new());
        };
        let positions = account
            .holdings
            .iter()
            .filter(|(_, qty)| !qty.is_zero())
            .filter_map(|(symbol, qty)| {
                let mark = self.market_data.last_price(symbol)?;
                let recent = self.market_data.recent(symbol, self.window);
                let mut exposure = PositionExposure::new(symbol.clone(), *qty, mark);
                exposure.liquidity_score = Signals::compute(&recent, self.reference_volume).liquidity;
                Some(exposure)
            })
            .collect();
        PortfolioSnapshot::new(account.updated_at, account.cash, positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::SettlementId;
    use types::market_data::MarketSample;
    use types::numeric::Price;
    use types::settlement::SettlementRef;

    fn acme() -> InstrumentId {
        InstrumentId::new("ACME")
    }

    fn seed(name: &str, cash: i64, shares: i64, allow_short: bool) -> AccountSeed {
        let mut holdings = BTreeMap::new();
        if shares > 0 {
            holdings.insert(acme(), Decimal::from(shares));
        }
        AccountSeed {
            name: name.to_string(),
            cash: Decimal::from(cash),
            holdings,
            allow_short,
        }
    }

    fn requirement(owner_id: AccountId, side: Side, qty: u64, cash: i64) -> FundsRequirement {
        FundsRequirement {
            owner_id,
            symbol: acme(),
            side,
            quantity: Quantity::from_u64(qty),
            cash: Decimal::from(cash),
        }
    }

    #[test]
    fn test_funds_check_uses_available_balances() {
        let ledger = Ledger::new();
        let alice = ledger.open(&seed("alice", 1_000, 5, false), 0);

        assert!(ledger.check_funds(&requirement(alice, Side::Buy, 1, 1_000)).is_ok());
        assert!(matches!(
            ledger.check_funds(&requirement(alice, Side::Buy, 1, 1_001)),
            Err(AccountError::InsufficientFunds { .. })
        ));
        assert!(ledger.check_funds(&requirement(alice, Side::Sell, 5, 0)).is_ok());
        assert!(matches!(
            ledger.check_funds(&requirement(alice, Side::Sell, 6, 0)),
            Err(AccountError::InsufficientShares { .. })
        ));
        assert!(matches!(
            ledger.check_funds(&requirement(AccountId::new(), Side::Buy, 1, 1)),
            Err(AccountError::NotFound { .. })
        ));
    }

    #[test]
    fn test_reservations_commit_balances_until_traded_or_released() {
        let ledger = Ledger::new();
        let alice = ledger.open(&seed("alice", 1_000, 5, false), 0);
        let bid = OrderId::new();
        let ask = OrderId::new();

        ledger.reserve(bid, &requirement(alice, Side::Buy, 6, 600)).unwrap();
        ledger.reserve(ask, &requirement(alice, Side::Sell, 4, 0)).unwrap();
        assert!(matches!(
            ledger.reserve(OrderId::new(), &requirement(alice, Side::Buy, 5, 500)),
            Err(AccountError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            ledger.check_funds(&requirement(alice, Side::Sell, 2, 0)),
            Err(AccountError::InsufficientShares { .. })
        ));
        assert_eq!(ledger.reserved_cash(alice), Decimal::from(600));
        assert_eq!(ledger.reserved_shares(alice, &acme()), Decimal::from(4));

        // a partial fill of the bid consumes its share of the hold
        let seller = ledger.open(&seed("seller", 0, 10, false), 0);
        let trade = Trade::new(
            1,
            acme(),
            bid,
            OrderId::new(),
            alice,
            seller,
            Side::Sell,
            Price::from_u64(100),
            Quantity::from_u64(2),
            Decimal::ZERO,
            Decimal::ZERO,
            1,
        );
        ledger.apply_trade(&trade);
        assert_eq!(ledger.reserved_cash(alice), Decimal::from(400));

        ledger.release(bid);
        ledger.release(ask);
        assert_eq!(ledger.reserved_cash(alice), Decimal::ZERO);
        assert_eq!(ledger.reserved_shares(alice, &acme()), Decimal::ZERO);
        assert_eq!(ledger.open_reservations(), 0);
    }

    #[test]
    fn test_short_seller_may_sell_without_holdings() {
        let ledger = Ledger::new();
        let mm = ledger.open(&seed("mm", 0, 0, true), 0);
        assert!(ledger.check_funds(&requirement(mm, Side::Sell, 50, 0)).is_ok());
    }

    #[test]
    fn test_reopening_name_keeps_account() {
        let ledger = Ledger::new();
        let first = ledger.open(&seed("alice", 10, 0, false), 0);
        assert_eq!(ledger.open(&seed("alice", 99, 0, false), 1), first);
        assert_eq!(ledger.account(first).unwrap().cash, Decimal::from(10));
        assert_eq!(ledger.account_id("alice"), Some(first));
    }

    #[test]
    fn test_trade_moves_cash_and_shares() {
        let ledger = Ledger::new();
        let seller = ledger.open(&seed("seller", 0, 10, false), 0);
        let buyer = ledger.open(&seed("buyer", 1_000, 0, false), 0);
        let trade = Trade::new(
            1,
            acme(),
            OrderId::new(),
            OrderId::new(),
            seller,
            buyer,
            Side::Buy,
            Price::from_u64(50),
            Quantity::from_u64(4),
            Decimal::ONE,
            Decimal::TWO,
            5,
        );
        ledger.apply_trade(&trade);

        let b = ledger.account(buyer).unwrap();
        assert_eq!(b.cash, Decimal::from(1_000 - 200 - 2));
        assert_eq!(b.holding(&acme()), Decimal::from(4));
        let s = ledger.account(seller).unwrap();
        assert_eq!(s.cash, Decimal::from(200 - 1));
        assert_eq!(s.holding(&acme()), Decimal::from(6));
    }

    #[test]
    fn test_transfer_requires_funded_payer() {
        let ledger = Ledger::new();
        let payer = ledger.open(&seed("payer", 100, 0, false), 0);
        let payee = ledger.open(&seed("payee", 0, 0, false), 0);
        let mut instruction = TransferInstruction {
            settlement_id: SettlementId::new(),
            reference: SettlementRef::Netted,
            payer,
            payee: CENTRAL_COUNTERPARTY,
            amount: Decimal::from(40),
            delivery: None,
        };
        ledger.execute(&instruction).unwrap();
        assert_eq!(ledger.settled_cash(payer), Decimal::from(-40));

        instruction.payer = CENTRAL_COUNTERPARTY;
        instruction.payee = payee;
        ledger.execute(&instruction).unwrap();
        assert_eq!(ledger.settled_cash(payee), Decimal::from(40));

        instruction.payee = AccountId::new();
        assert!(matches!(ledger.execute(&instruction), Err(TransferError::Rejected(_))));
    }

    #[test]
    fn test_portfolio_marks_known_prices_only() {
        let ledger = Arc::new(Ledger::new());
        let id = ledger.open(&seed("alice", 500, 5, false), 0);
        let store = Arc::new(MarketDataStore::default());
        let portfolio = AccountPortfolio::new(ledger.clone(), id, store.clone(), 10, Decimal::from(100));
        assert!(portfolio.portfolio().positions.is_empty());

        store.push(MarketSample::new(acme(), 1, Price::from_u64(20), Quantity::from_u64(100)));
        let snapshot = portfolio.portfolio();
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.equity(), Decimal::from(600));
        assert_eq!(snapshot.positions[0].liquidity_score, 1.0);
    }
}
