//! Risk Engine Service
//!
//! Portfolio risk analysis and margin monitoring:
//! - `metrics`, `exposure`, `stress`, `alerts`, `engine`: per-cycle
//!   VaR / CVaR / drawdown / Sharpe statistics, stress scenarios and
//!   threshold alerts, published as one immutable `RiskReport`
//! - `margin`, `liquidation`, `manager`, `events`: leveraged-position
//!   classification, margin calls and chunked forced liquidation

pub mod alerts;
pub mod engine;
pub mod events;
pub mod exposure;
pub mod liquidation;
pub mod manager;
pub mod margin;
pub mod metrics;
pub mod stress;

pub use alerts::{AlertLog, AlertThresholds};
pub use engine::{RiskConfig, RiskEngine, RiskTask};
pub use events::{MarginEvent, MarginEventKind};
pub use exposure::{PortfolioSnapshot, PortfolioSource, PositionExposure};
pub use liquidation::LiquidationPlan;
pub use manager::{MarginConfig, MarginError, MarginManager, MarginTask, MarkPriceSource};
pub use margin::{MarginCall, MarginCallStatus, MarginStatus, MarginThresholds};
pub use stress::StressConfig;
