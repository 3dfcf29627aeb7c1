//! Aggregate outcome of a sync run

use chrono::NaiveDate;
use std::time::Duration;

use super::{UnitReport, UnitState};
use crate::models::{ItemId, SyncUnit};
use crate::remote::ApiError;

/// One recorded failure, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub unit: SyncUnit,
    /// Day being processed, when known
    pub day: Option<NaiveDate>,
    /// Item that failed, for item-level failures
    pub item: Option<ItemId>,
    pub error: ApiError,
}

impl SyncFailure {
    pub fn new(unit: &SyncUnit, error: ApiError) -> Self {
        Self {
            unit: unit.clone(),
            day: None,
            item: None,
            error,
        }
    }

    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.day = Some(day);
        self
    }

    pub fn for_item(mut self, item: ItemId) -> Self {
        self.item = Some(item);
        self
    }
}

/// Statistics from a sync run
///
/// Always produced, including for runs that were aborted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    /// Items stored by this run
    pub items_fetched: usize,
    /// Items that failed and were skipped
    pub items_failed: usize,
    pub units_completed: usize,
    pub units_skipped_cached: usize,
    pub units_skipped_quota: usize,
    /// Units ending `Failed` or `PartiallyFailed`
    pub units_failed: usize,
    /// Units left `Aborted` or `NotAttempted` by a halted run
    pub units_not_finished: usize,
    /// Days recorded by this run
    pub days_synced: usize,
    /// Requested days that were already covered
    pub days_cached: usize,
    /// Outbound calls, retries included
    pub requests_made: u64,
    pub elapsed: Duration,
    /// Per-unit outcomes in processing order
    pub units: Vec<UnitReport>,
    /// Failures in the order they happened
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    /// Fold a finished unit into the totals
    pub fn record(&mut self, report: UnitReport) {
        match report.state {
            UnitState::Completed => self.units_completed += 1,
            UnitState::SkippedCached => self.units_skipped_cached += 1,
            UnitState::SkippedQuota => self.units_skipped_quota += 1,
            UnitState::Failed | UnitState::PartiallyFailed => self.units_failed += 1,
            UnitState::Aborted | UnitState::NotAttempted => self.units_not_finished += 1,
            UnitState::Pending
            | UnitState::CacheCheck
            | UnitState::QuotaCheck
            | UnitState::Fetching => {
                log::warn!("[SYNC] {} recorded in non-terminal state {}", report.unit, report.state);
            }
        }

        self.items_fetched += report.items_fetched;
        self.items_failed += report.items_failed;
        self.days_synced += report.days_synced;
        self.days_cached += report.days_cached;
        self.units.push(report);
    }

    /// Report for a unit, if it was part of the run
    pub fn unit(&self, unit: &SyncUnit) -> Option<&UnitReport> {
        self.units.iter().find(|r| &r.unit == unit)
    }

    /// True when nothing failed and every unit finished
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.units_failed == 0 && self.units_not_finished == 0
    }

    /// Process exit status: 0 for a clean run, 1 when anything failed
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() { 0 } else { 1 }
    }
}
