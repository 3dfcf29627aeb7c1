//! Day-granularity windows, coverage, and the per-day sync ledger entry

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::SyncUnit;

/// Calendar day (UTC) an instant belongs to
///
/// Every day key in the crate is derived here, so the same nominal day maps
/// to the same key no matter the local wall-clock time of the run.
pub fn day_key(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Error for a window whose start is after its end
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid window: start {start} is after end {end}")]
pub struct WindowError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Contiguous inclusive `[start, end]` range of UTC calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window covering a single day
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Number of days in the window (always >= 1)
    pub fn len_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Daily granules in ascending order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Half-open UTC instant bounds `[start 00:00, end+1 00:00)`
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = self
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(self.end)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();
        (start, end)
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Ledger entry: one day of one unit fully synchronized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySyncRecord {
    pub unit: SyncUnit,
    pub day: NaiveDate,
    pub synced_at: DateTime<Utc>,
    pub items_synced: u32,
}

impl DaySyncRecord {
    pub fn new(unit: SyncUnit, day: NaiveDate, items_synced: u32) -> Self {
        Self {
            unit,
            day,
            synced_at: Utc::now(),
            items_synced,
        }
    }
}

/// Summary of the days recorded for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub min_day: NaiveDate,
    pub max_day: NaiveDate,
    pub day_count: u64,
}

impl Coverage {
    /// Days between min and max inclusive
    pub fn span_days(&self) -> u64 {
        (self.max_day - self.min_day).num_days() as u64 + 1
    }

    /// True when there are no holes between `min_day` and `max_day`
    pub fn is_contiguous(&self) -> bool {
        self.day_count == self.span_days()
    }

    /// True when every day of `window` is covered
    pub fn contains(&self, window: &FetchWindow) -> bool {
        self.is_contiguous() && self.min_day <= window.start && window.end <= self.max_day
    }
}
