//! Matching Engine Service
//!
//! Price-time priority matching over per-instrument order books.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced; trades execute at the maker's price
//! - Every resting entry has positive quantity; empty levels are removed
//! - filled + remaining = quantity for every order
//! - No self-trades: the resting order is cancelled instead
//! - One writer per book; instruments are independent

pub mod book;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod market_data;
pub mod matching;
pub mod validator;

pub use book::{BookSnapshot, LevelSnapshot};
pub use engine::{MatchingEngine, SubmitResult};
pub use error::{MatchingError, SubmitError};
pub use events::EngineEvent;
pub use gateway::{OrderGateway, ValidatingGateway};
pub use market_data::MarketDataStore;
pub use validator::{FundsCheck, FundsRequirement, NoFundsCheck, OrderValidator, ValidatorConfig};
