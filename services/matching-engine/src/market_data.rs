//! Market data store
//!
//! Holds the most recent normalized samples per instrument. Samples must
//! arrive in time order per instrument; a sample older than the latest one
//! is dropped.

use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::warn;
use types::ids::InstrumentId;
use types::market_data::MarketSample;
use types::numeric::Price;

/// Samples kept per instrument when no capacity is given
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct MarketDataStore {
    series: DashMap<InstrumentId, VecDeque<MarketSample>>,
    capacity: usize,
}

impl Default for MarketDataStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MarketDataStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            series: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample; returns false if it was out of order
    pub fn push(&self, sample: MarketSample) -> bool {
        let mut series = self.series.entry(sample.symbol.clone()).or_default();
        if let Some(last) = series.back() {
            if sample.timestamp < last.timestamp {
                warn!(
                    symbol = %sample.symbol,
                    timestamp = sample.timestamp,
                    last = last.timestamp,
                    "dropping out-of-order market sample"
                );
                return false;
            }
        }
        if series.len() == self.capacity {
            series.pop_front();
        }
        series.push_back(sample);
        true
    }

    pub fn last_price(&self, symbol: &InstrumentId) -> Option<Price> {
        self.series.get(symbol)?.back().map(|s| s.price)
    }

    pub fn last_sample(&self, symbol: &InstrumentId) -> Option<MarketSample> {
        self.series.get(symbol)?.back().cloned()
    }

    /// Up to `n` most recent samples, oldest first
    pub fn recent(&self, symbol: &InstrumentId, n: usize) -> Vec<MarketSample> {
        match self.series.get(symbol) {
            Some(series) => {
                let skip = series.len().saturating_sub(n);
                series.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Known instruments, sorted
    pub fn symbols(&self) -> Vec<InstrumentId> {
        let mut symbols: Vec<_> = self.series.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }
}
