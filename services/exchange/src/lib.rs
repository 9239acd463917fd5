//! Exchange
//!
//! Composition root for the trading engine: configuration, the account
//! ledger, trade routing and the scheduled components.
//!
//! - `config`: TOML `ExchangeConfig` with one section per component
//! - `ledger`: trade-date balances; funds check, transfer agent and
//!   risk portfolio source
//! - `exchange`: wiring, trade routing and task scheduling
//! - `feed`: seeded synthetic market data and retail flow

pub mod config;
pub mod exchange;
pub mod feed;
pub mod ledger;

pub use config::{AccountSeed, ConfigError, ExchangeConfig, FeedConfig, CONFIG_ENV};
pub use exchange::{Exchange, TradeRouter};
pub use feed::{FeedStep, SyntheticFeed};
pub use ledger::{AccountPortfolio, Ledger};
