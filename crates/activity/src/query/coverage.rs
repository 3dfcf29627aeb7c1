//! Coverage query functions

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Coverage, FetchWindow, SyncUnit};
use crate::storage::SyncStore;
use crate::sync::gap::missing_days;

/// What the local cache holds for one unit within a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// The unit described
    pub unit: SyncUnit,
    /// Window the report was built for
    pub window: FetchWindow,
    /// Overall extent of recorded days, `None` when nothing was ever synced
    pub coverage: Option<Coverage>,
    /// Recorded days inside the window, ascending
    pub synced_days: Vec<NaiveDate>,
    /// Days inside the window still to fetch, ascending
    pub missing_days: Vec<NaiveDate>,
    /// Items recorded across the synced days of the window
    pub items_synced: u64,
}

impl CoverageReport {
    /// True when every day of the window is recorded
    pub fn is_complete(&self) -> bool {
        self.missing_days.is_empty()
    }
}

/// Build one coverage report per unit
///
/// Feeds the "check coverage" report; no remote calls are made.
pub fn check_coverage(
    store: &dyn SyncStore,
    units: &[SyncUnit],
    window: &FetchWindow,
) -> Result<Vec<CoverageReport>> {
    units
        .iter()
        .map(|unit| {
            let records = store.get_day_records(unit, window)?;
            let synced_days: Vec<NaiveDate> = records.iter().map(|r| r.day).collect();

            Ok(CoverageReport {
                unit: unit.clone(),
                window: *window,
                coverage: store.get_coverage(unit)?,
                missing_days: missing_days(window, &synced_days),
                items_synced: records.iter().map(|r| u64::from(r.items_synced)).sum(),
                synced_days,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DaySyncRecord;
    use crate::storage::{CoverageStore, InMemoryStore};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_check_coverage() {
        let store = InMemoryStore::new();
        let synced = SyncUnit::new("commits", "orgX", "repoY");
        let fresh = SyncUnit::new("reviews", "orgX", "repoY");
        store
            .upsert_batch(&[
                DaySyncRecord::new(synced.clone(), d("2025-01-01"), 4),
                DaySyncRecord::new(synced.clone(), d("2025-01-03"), 6),
            ])
            .unwrap();

        let window = FetchWindow::new(d("2025-01-01"), d("2025-01-03")).unwrap();
        let reports = check_coverage(&store, &[synced, fresh], &window).unwrap();

        assert_eq!(reports[0].synced_days, vec![d("2025-01-01"), d("2025-01-03")]);
        assert_eq!(reports[0].missing_days, vec![d("2025-01-02")]);
        assert_eq!(reports[0].items_synced, 10);
        assert!(!reports[0].is_complete());

        assert!(reports[1].coverage.is_none());
        assert_eq!(reports[1].missing_days.len(), 3);
    }
}
