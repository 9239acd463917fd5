//! Injectable wall clock
//!
//! Components read time through `Clock` so tests can pin or advance it.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of Unix-nanosecond timestamps
pub trait Clock: Send + Sync + 'static {
    fn now_nanos(&self) -> i64;

    /// Calendar date (UTC) of the current instant
    fn today(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_nanos(self.now_nanos()).date_naive()
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Reads the operating system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start_nanos),
        }
    }

    /// Start at midnight UTC of the given date
    pub fn at_date(date: NaiveDate) -> Self {
        let nanos = date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
            .unwrap_or_default();
        Self::new(nanos)
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// Nanoseconds in a duration, saturating at `i64::MAX`
pub fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
