//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{ActivityRecord, Coverage, DaySyncRecord, FetchWindow, ItemId, SyncUnit};

/// Durable ledger of which `(unit, day)` pairs are fully synchronized
///
/// Day keys are UTC calendar dates (see [`crate::models::day_key`]).
pub trait CoverageStore: Send + Sync {
    /// Insert or overwrite the record for one day (last write wins)
    fn upsert_day(
        &self,
        unit: &SyncUnit,
        day: NaiveDate,
        synced_at: DateTime<Utc>,
        items_synced: u32,
    ) -> Result<()>;

    /// Upsert many records in one atomic transaction
    fn upsert_batch(&self, records: &[DaySyncRecord]) -> Result<()>;

    /// Covered days within `window`, ascending and duplicate-free
    fn get_synced_days(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<Vec<NaiveDate>>;

    /// Day records within `window`, ascending by day
    fn get_day_records(&self, unit: &SyncUnit, window: &FetchWindow)
    -> Result<Vec<DaySyncRecord>>;

    /// Extent of everything recorded for a unit, `None` when nothing is
    fn get_coverage(&self, unit: &SyncUnit) -> Result<Option<Coverage>>;

    /// Remove day records within `window`, returning how many were removed
    fn delete_range(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize>;

    /// Every unit with at least one day record
    fn list_units(&self) -> Result<Vec<SyncUnit>>;
}

/// Storage for the normalized activity records themselves
pub trait ActivityStore: Send + Sync {
    /// Insert or update a record, keyed by `(unit, id)`
    fn upsert_record(&self, record: &ActivityRecord) -> Result<()>;

    /// Get a record by unit and item id
    fn get_record(&self, unit: &SyncUnit, id: &ItemId) -> Result<Option<ActivityRecord>>;

    /// Count records whose day falls within `window`
    fn count_records(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize>;

    /// Records of one day, ordered by `occurred_at` ascending
    fn list_records_for_day(&self, unit: &SyncUnit, day: NaiveDate)
    -> Result<Vec<ActivityRecord>>;
}

/// Everything a sync run writes to
pub trait SyncStore: CoverageStore + ActivityStore {}

impl<T: CoverageStore + ActivityStore + ?Sized> SyncStore for T {}
