//! Business-day calendar
//!
//! Saturdays and Sundays are the only non-business days.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};

/// UTC calendar date of a Unix-nanosecond timestamp
pub fn business_date(nanos: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_nanos(nanos).date_naive()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusinessCalendar;

impl BusinessCalendar {
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// First business day strictly after `date`
    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut next = date;
        loop {
            next = match next.checked_add_days(Days::new(1)) {
                Some(d) => d,
                None => return next,
            };
            if self.is_business_day(next) {
                return next;
            }
        }
    }

    /// `date` moved forward by `n` business days (T+n)
    ///
    /// T+0 is `date` itself, even on a weekend.
    pub fn add_business_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        (0..n).fold(date, |d, _| self.next_business_day(d))
    }

    /// Business days in `(from, to]`
    pub fn business_days_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        from.iter_days()
            .skip(1)
            .take_while(|d| *d <= to)
            .filter(|d| self.is_business_day(*d))
            .count() as u32
    }
}
