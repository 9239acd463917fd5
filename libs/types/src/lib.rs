//! Types library for the trading and market-simulation engine
//!
//! Core type definitions shared by the matching engine, market maker,
//! risk engine, margin manager and settlement engine.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, TradeId, AccountId, InstrumentId, ...)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Order requests and order lifecycle
//! - `trade`: Immutable trade records
//! - `account`: Cash and share balances
//! - `position`: Leveraged positions monitored for margin
//! - `fee`: Maker/taker fee schedule
//! - `market_data`: Normalized market data samples
//! - `risk`: Risk reports, metrics, alerts and stress results
//! - `settlement`: Settlement records and clearing reports
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod account;
pub mod position;
pub mod fee;
pub mod market_data;
pub mod risk;
pub mod settlement;
pub mod errors;
