//! Market Maker Service
//!
//! Continuous two-sided quoting into the matching engine, driven by
//! volatility, liquidity, momentum and order-flow signals, with inventory
//! skew, explicit rebalancing and external hedging.
//!
//! **Key Invariants:**
//! - At most one live bid and one live ask per instrument after a refresh
//! - No quote on a side whose inventory limit is reached
//! - Every own fill is booked exactly once: resting fills from engine
//!   events, aggressing fills from the submit result

pub mod config;
pub mod hedging;
pub mod inventory;
pub mod maker;
pub mod quoting;
pub mod signals;

pub use config::MarketMakerConfig;
pub use hedging::{HedgeBook, HedgeError, HedgeFill, HedgeMetrics, HedgePosition, HedgeVenue, PaperHedgeVenue};
pub use inventory::MarketMakerPosition;
pub use maker::{MarketMaker, MarketMakerTask, RefreshSummary};
pub use quoting::{build_quote, Quote, QuoteLevel};
pub use signals::Signals;
