//! Startup configuration
//!
//! One TOML document, read once. Every section has defaults, so an empty
//! file is a valid (if quiet) exchange.

use market_maker::MarketMakerConfig;
use matching_engine::ValidatorConfig;
use risk_engine::{MarginConfig, RiskConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::SettlementConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use types::fee::FeeSchedule;
use types::ids::InstrumentId;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "EXCHANGE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    pub fees: FeeSchedule,
    pub validator: ValidatorConfig,
    /// Market samples kept per instrument
    pub history_capacity: usize,
    /// How often good-till-date orders are swept
    pub expiry_interval_ms: u64,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            validator: ValidatorConfig::default(),
            history_capacity: 1_024,
            expiry_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketMakerSection {
    pub enabled: bool,
    /// Name of the account the maker trades from
    pub account: String,
    pub quoting: MarketMakerConfig,
}

impl Default for MarketMakerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            account: "market-maker".to_string(),
            quoting: MarketMakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// Account whose portfolio the risk engine watches
    pub account: String,
    pub interval_ms: u64,
    pub engine: RiskConfig,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            account: "market-maker".to_string(),
            interval_ms: 5_000,
            engine: RiskConfig::default(),
        }
    }
}

/// Opening state of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub name: String,
    #[serde(default)]
    pub cash: Decimal,
    #[serde(default)]
    pub holdings: BTreeMap<InstrumentId, Decimal>,
    /// May sell more than it holds
    #[serde(default)]
    pub allow_short: bool,
}

/// Seeded synthetic order flow for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub seed: u64,
    pub tick_ms: u64,
    /// Per-tick standard deviation of the log price
    pub volatility: f64,
    /// Starting reference price per instrument
    pub instruments: BTreeMap<InstrumentId, Decimal>,
    /// Account the synthetic traders submit from
    pub trader: String,
    /// Chance per tick and instrument of a trader order
    pub order_probability: f64,
    pub max_order_size: Decimal,
    /// Stop after this long; runs until interrupted when absent
    pub run_for_secs: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_ms: 250,
            volatility: 0.002,
            instruments: BTreeMap::new(),
            trader: "retail".to_string(),
            order_probability: 0.3,
            max_order_size: Decimal::from(2),
            run_for_secs: None,
        }
    }
}

impl FeedConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub matching: MatchingSection,
    pub market_maker: MarketMakerSection,
    pub risk: RiskSection,
    pub settlement: SettlementConfig,
    pub margin: MarginConfig,
    pub accounts: Vec<AccountSeed>,
    pub feed: FeedConfig,
}

impl ExchangeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ExchangeConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Config path from `EXCHANGE_CONFIG`, else the first argument
    pub fn locate(env: Option<String>, mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
        env.filter(|p| !p.is_empty()).or_else(|| args.next()).map(PathBuf::from)
    }

    pub fn account(&self, name: &str) -> Option<&AccountSeed> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !self.matching.fees.is_valid() {
            return invalid("maker rate must be below a non-negative taker rate".into());
        }
        if self.matching.history_capacity < 2 || self.matching.expiry_interval_ms == 0 {
            return invalid("matching history and expiry interval must be positive".into());
        }

        let mut names = BTreeSet::new();
        for seed in &self.accounts {
            if !names.insert(seed.name.as_str()) {
                return invalid(format!("duplicate account '{}'", seed.name));
            }
            if seed.cash < Decimal::ZERO {
                return invalid(format!("account '{}' has negative cash", seed.name));
            }
        }

        if self.market_maker.enabled {
            if !self.market_maker.quoting.is_valid() {
                return invalid("market maker quoting parameters are inconsistent".into());
            }
            if !names.contains(self.market_maker.account.as_str()) {
                return invalid(format!("unknown market maker account '{}'", self.market_maker.account));
            }
        }

        if !names.contains(self.risk.account.as_str()) && !self.accounts.is_empty() {
            return invalid(format!("unknown risk account '{}'", self.risk.account));
        }
        let confidence = self.risk.engine.confidence;
        if !(confidence > 0.0 && confidence < 1.0) || self.risk.interval_ms == 0 {
            return invalid("risk confidence must be in (0, 1) with a positive interval".into());
        }

        if !self.margin.thresholds.is_valid() || self.margin.max_chunk <= Decimal::ZERO {
            return invalid("margin thresholds must descend and chunks must be positive".into());
        }

        if self.settlement.netting_threshold < Decimal::ZERO || self.settlement.batch_interval_secs == 0 {
            return invalid("settlement threshold and batch interval must be positive".into());
        }

        if !self.feed.instruments.is_empty() {
            if !names.contains(self.feed.trader.as_str()) {
                return invalid(format!("unknown feed trader '{}'", self.feed.trader));
            }
            if self.feed.tick_ms == 0 || self.feed.instruments.values().any(|p| *p <= Decimal::ZERO) {
                return invalid("feed needs a positive tick and positive starting prices".into());
            }
        }
        Ok(())
    }
}
