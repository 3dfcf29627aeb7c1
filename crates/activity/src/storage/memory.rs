//! In-memory storage implementation
//!
//! Used by tests and dry runs. Same semantics as the SQLite store.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ActivityStore, CoverageStore};
use crate::models::{ActivityRecord, Coverage, DaySyncRecord, FetchWindow, ItemId, SyncUnit};

type DayLedger = BTreeMap<SyncUnit, BTreeMap<NaiveDate, DaySyncRecord>>;
type RecordMap = BTreeMap<SyncUnit, BTreeMap<ItemId, ActivityRecord>>;

/// In-memory implementation of the sync stores
///
/// Ordered maps protected by RwLocks; iteration order gives ascending days.
#[derive(Default)]
pub struct InMemoryStore {
    days: RwLock<DayLedger>,
    records: RwLock<RecordMap>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn days(&self) -> RwLockReadGuard<'_, DayLedger> {
        self.days.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn days_mut(&self) -> RwLockWriteGuard<'_, DayLedger> {
        self.days.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn records(&self) -> RwLockReadGuard<'_, RecordMap> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn records_mut(&self) -> RwLockWriteGuard<'_, RecordMap> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CoverageStore for InMemoryStore {
    fn upsert_day(
        &self,
        unit: &SyncUnit,
        day: NaiveDate,
        synced_at: DateTime<Utc>,
        items_synced: u32,
    ) -> Result<()> {
        self.days_mut().entry(unit.clone()).or_default().insert(
            day,
            DaySyncRecord {
                unit: unit.clone(),
                day,
                synced_at,
                items_synced,
            },
        );
        Ok(())
    }

    fn upsert_batch(&self, records: &[DaySyncRecord]) -> Result<()> {
        // One write guard for the whole batch keeps it atomic for readers
        let mut days = self.days_mut();
        for record in records {
            days.entry(record.unit.clone())
                .or_default()
                .insert(record.day, record.clone());
        }
        Ok(())
    }

    fn get_synced_days(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<Vec<NaiveDate>> {
        Ok(self
            .days()
            .get(unit)
            .map(|days| days.range(window.start..=window.end).map(|(d, _)| *d).collect())
            .unwrap_or_default())
    }

    fn get_day_records(
        &self,
        unit: &SyncUnit,
        window: &FetchWindow,
    ) -> Result<Vec<DaySyncRecord>> {
        Ok(self
            .days()
            .get(unit)
            .map(|days| {
                days.range(window.start..=window.end)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_coverage(&self, unit: &SyncUnit) -> Result<Option<Coverage>> {
        let days = self.days();
        let Some(unit_days) = days.get(unit) else {
            return Ok(None);
        };

        let (Some((min_day, _)), Some((max_day, _))) =
            (unit_days.first_key_value(), unit_days.last_key_value())
        else {
            return Ok(None);
        };

        Ok(Some(Coverage {
            min_day: *min_day,
            max_day: *max_day,
            day_count: unit_days.len() as u64,
        }))
    }

    fn delete_range(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize> {
        let mut days = self.days_mut();
        let Some(unit_days) = days.get_mut(unit) else {
            return Ok(0);
        };

        let doomed: Vec<NaiveDate> = unit_days
            .range(window.start..=window.end)
            .map(|(d, _)| *d)
            .collect();
        for day in &doomed {
            unit_days.remove(day);
        }
        if unit_days.is_empty() {
            days.remove(unit);
        }

        Ok(doomed.len())
    }

    fn list_units(&self) -> Result<Vec<SyncUnit>> {
        Ok(self.days().keys().cloned().collect())
    }
}

impl ActivityStore for InMemoryStore {
    fn upsert_record(&self, record: &ActivityRecord) -> Result<()> {
        self.records_mut()
            .entry(record.unit.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_record(&self, unit: &SyncUnit, id: &ItemId) -> Result<Option<ActivityRecord>> {
        Ok(self
            .records()
            .get(unit)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn count_records(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize> {
        Ok(self
            .records()
            .get(unit)
            .map(|records| records.values().filter(|r| window.contains(r.day)).count())
            .unwrap_or(0))
    }

    fn list_records_for_day(
        &self,
        unit: &SyncUnit,
        day: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        let mut records: Vec<ActivityRecord> = self
            .records()
            .get(unit)
            .map(|records| records.values().filter(|r| r.day == day).cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.occurred_at);
        Ok(records)
    }
}
