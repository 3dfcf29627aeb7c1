//! SQLite-based sync storage with zstd-compressed activity payloads

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::{ActivityStore, CoverageStore};
use crate::models::{ActivityRecord, Coverage, DaySyncRecord, FetchWindow, ItemId, SyncUnit};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per fully synchronized (unit, day)
            CREATE TABLE day_sync (
                resource_type TEXT NOT NULL,
                organization TEXT NOT NULL,
                repository TEXT NOT NULL,
                day TEXT NOT NULL,           -- YYYY-MM-DD, UTC
                synced_at TEXT NOT NULL,
                items_synced INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (resource_type, organization, repository, day)
            );

            -- Normalized activity items with zstd-compressed JSON payloads
            CREATE TABLE activity_records (
                resource_type TEXT NOT NULL,
                organization TEXT NOT NULL,
                repository TEXT NOT NULL,
                item_id TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                day TEXT NOT NULL,
                author TEXT,
                fetched_at TEXT NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (resource_type, organization, repository, item_id)
            );

            CREATE INDEX idx_activity_records_day
                ON activity_records(resource_type, organization, repository, day);
            "#,
        ),
    ])
}

/// Day keys are stored as ISO dates, which sort lexicographically
fn day_to_sql(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn day_from_sql(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid day key in database: {value}"))
}

fn timestamp_from_sql(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {value}"))
}

fn items_from_sql(value: i64) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("Invalid item count in database: {value}"))
}

/// Raw `day_sync` row before date parsing
struct DayRow {
    day: String,
    synced_at: String,
    items_synced: i64,
}

/// Raw `activity_records` row before decoding
struct RecordRow {
    item_id: String,
    occurred_at: String,
    author: Option<String>,
    fetched_at: String,
    payload: Vec<u8>,
}

impl RecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            occurred_at: row.get(1)?,
            author: row.get(2)?,
            fetched_at: row.get(3)?,
            payload: row.get(4)?,
        })
    }

    fn into_record(self, unit: &SyncUnit) -> Result<ActivityRecord> {
        let json = zstd::decode_all(self.payload.as_slice())
            .context("Failed to decompress activity payload")?;
        let payload: serde_json::Value =
            serde_json::from_slice(&json).context("Failed to parse activity payload")?;

        let mut record = ActivityRecord::new(
            unit.clone(),
            ItemId::new(self.item_id),
            timestamp_from_sql(&self.occurred_at)?,
            self.author,
            payload,
        );
        record.fetched_at = timestamp_from_sql(&self.fetched_at)?;
        Ok(record)
    }
}

/// SQLite-based sync storage
///
/// Holds the day-level coverage ledger and the fetched activity records in
/// one database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets reports read while a sync writes; NORMAL is safe under WAL
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    fn upsert_day_row(
        conn: &Connection,
        unit: &SyncUnit,
        day: NaiveDate,
        synced_at: DateTime<Utc>,
        items_synced: u32,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO day_sync
             (resource_type, organization, repository, day, synced_at, items_synced)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(resource_type, organization, repository, day) DO UPDATE SET
                synced_at = excluded.synced_at,
                items_synced = excluded.items_synced",
            params![
                unit.resource_type.as_str(),
                unit.organization,
                unit.repository,
                day_to_sql(day),
                synced_at.to_rfc3339(),
                items_synced,
            ],
        )?;
        Ok(())
    }

    fn load_day_rows(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<Vec<DayRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, synced_at, items_synced FROM day_sync
             WHERE resource_type = ? AND organization = ? AND repository = ?
               AND day >= ? AND day <= ?
             ORDER BY day ASC",
        )?;

        let rows = stmt
            .query_map(
                params![
                    unit.resource_type.as_str(),
                    unit.organization,
                    unit.repository,
                    day_to_sql(window.start),
                    day_to_sql(window.end),
                ],
                |row| {
                    Ok(DayRow {
                        day: row.get(0)?,
                        synced_at: row.get(1)?,
                        items_synced: row.get(2)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    fn load_day_record_rows(&self, unit: &SyncUnit, day: NaiveDate) -> Result<Vec<RecordRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, occurred_at, author, fetched_at, payload FROM activity_records
             WHERE resource_type = ? AND organization = ? AND repository = ? AND day = ?
             ORDER BY occurred_at ASC",
        )?;

        let rows = stmt
            .query_map(
                params![
                    unit.resource_type.as_str(),
                    unit.organization,
                    unit.repository,
                    day_to_sql(day),
                ],
                RecordRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}

impl CoverageStore for SqliteStore {
    fn upsert_day(
        &self,
        unit: &SyncUnit,
        day: NaiveDate,
        synced_at: DateTime<Utc>,
        items_synced: u32,
    ) -> Result<()> {
        let conn = self.conn()?;
        Self::upsert_day_row(&conn, unit, day, synced_at, items_synced)
    }

    fn upsert_batch(&self, records: &[DaySyncRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for record in records {
            Self::upsert_day_row(
                &tx,
                &record.unit,
                record.day,
                record.synced_at,
                record.items_synced,
            )?;
        }

        tx.commit().context("Failed to commit day batch")?;
        log::debug!("[STORE] Upserted {} day records", records.len());
        Ok(())
    }

    fn get_synced_days(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<Vec<NaiveDate>> {
        self.load_day_rows(unit, window)?
            .iter()
            .map(|row| day_from_sql(&row.day))
            .collect()
    }

    fn get_day_records(
        &self,
        unit: &SyncUnit,
        window: &FetchWindow,
    ) -> Result<Vec<DaySyncRecord>> {
        self.load_day_rows(unit, window)?
            .into_iter()
            .map(|row| {
                Ok(DaySyncRecord {
                    unit: unit.clone(),
                    day: day_from_sql(&row.day)?,
                    synced_at: timestamp_from_sql(&row.synced_at)?,
                    items_synced: items_from_sql(row.items_synced)?,
                })
            })
            .collect()
    }

    fn get_coverage(&self, unit: &SyncUnit) -> Result<Option<Coverage>> {
        let conn = self.conn()?;
        let (min_day, max_day, day_count): (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(day), MAX(day), COUNT(*) FROM day_sync
                 WHERE resource_type = ? AND organization = ? AND repository = ?",
                params![
                    unit.resource_type.as_str(),
                    unit.organization,
                    unit.repository
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        match (min_day, max_day) {
            (Some(min_day), Some(max_day)) if day_count > 0 => Ok(Some(Coverage {
                min_day: day_from_sql(&min_day)?,
                max_day: day_from_sql(&max_day)?,
                day_count: day_count as u64,
            })),
            _ => Ok(None),
        }
    }

    fn delete_range(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM day_sync
             WHERE resource_type = ? AND organization = ? AND repository = ?
               AND day >= ? AND day <= ?",
            params![
                unit.resource_type.as_str(),
                unit.organization,
                unit.repository,
                day_to_sql(window.start),
                day_to_sql(window.end),
            ],
        )?;

        log::debug!("[STORE] Deleted {} day records for {} in {}", removed, unit, window);
        Ok(removed)
    }

    fn list_units(&self) -> Result<Vec<SyncUnit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT resource_type, organization, repository FROM day_sync
             ORDER BY resource_type, organization, repository",
        )?;

        let units = stmt
            .query_map([], |row| {
                Ok(SyncUnit::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(units)
    }
}

impl ActivityStore for SqliteStore {
    fn upsert_record(&self, record: &ActivityRecord) -> Result<()> {
        // Compress payloads with zstd (level 3 = good balance of speed vs compression)
        let json = serde_json::to_vec(&record.payload).context("Failed to encode payload")?;
        let payload = zstd::encode_all(json.as_slice(), 3).context("Failed to compress payload")?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activity_records
             (resource_type, organization, repository, item_id, occurred_at, day,
              author, fetched_at, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(resource_type, organization, repository, item_id) DO UPDATE SET
                occurred_at = excluded.occurred_at,
                day = excluded.day,
                author = excluded.author,
                fetched_at = excluded.fetched_at,
                payload = excluded.payload",
            params![
                record.unit.resource_type.as_str(),
                record.unit.organization,
                record.unit.repository,
                record.id.as_str(),
                record.occurred_at.to_rfc3339(),
                day_to_sql(record.day),
                record.author,
                record.fetched_at.to_rfc3339(),
                payload,
            ],
        )?;

        Ok(())
    }

    fn get_record(&self, unit: &SyncUnit, id: &ItemId) -> Result<Option<ActivityRecord>> {
        let row = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT item_id, occurred_at, author, fetched_at, payload FROM activity_records
                 WHERE resource_type = ? AND organization = ? AND repository = ? AND item_id = ?",
                params![
                    unit.resource_type.as_str(),
                    unit.organization,
                    unit.repository,
                    id.as_str()
                ],
                RecordRow::from_row,
            )
            .optional()?
        };

        row.map(|row| row.into_record(unit)).transpose()
    }

    fn count_records(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activity_records
             WHERE resource_type = ? AND organization = ? AND repository = ?
               AND day >= ? AND day <= ?",
            params![
                unit.resource_type.as_str(),
                unit.organization,
                unit.repository,
                day_to_sql(window.start),
                day_to_sql(window.end),
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn list_records_for_day(
        &self,
        unit: &SyncUnit,
        day: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        self.load_day_record_rows(unit, day)?
            .into_iter()
            .map(|row| row.into_record(unit))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("activity.test.sqlite");
        let store = SqliteStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn unit() -> SyncUnit {
        SyncUnit::new("pull_requests", "orgX", "repoY")
    }

    fn window(start: &str, end: &str) -> FetchWindow {
        FetchWindow::new(d(start), d(end)).unwrap()
    }

    #[test]
    fn test_upsert_day_overwrites() {
        let (store, _dir) = create_test_store();
        store.upsert_day(&unit(), d("2025-01-01"), Utc::now(), 2).unwrap();
        store.upsert_day(&unit(), d("2025-01-01"), Utc::now(), 9).unwrap();

        let records = store
            .get_day_records(&unit(), &window("2025-01-01", "2025-01-31"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].items_synced, 9);
        assert_eq!(records[0].unit, unit());
    }

    #[test]
    fn test_batch_and_coverage() {
        let (store, _dir) = create_test_store();
        let batch: Vec<_> = ["2025-01-03", "2025-01-01", "2025-01-02"]
            .iter()
            .map(|day| DaySyncRecord::new(unit(), d(day), 4))
            .collect();
        store.upsert_batch(&batch).unwrap();

        assert_eq!(
            store
                .get_synced_days(&unit(), &window("2025-01-01", "2025-01-10"))
                .unwrap(),
            vec![d("2025-01-01"), d("2025-01-02"), d("2025-01-03")]
        );

        let coverage = store.get_coverage(&unit()).unwrap().unwrap();
        assert_eq!(coverage.min_day, d("2025-01-01"));
        assert_eq!(coverage.max_day, d("2025-01-03"));
        assert_eq!(coverage.day_count, 3);

        let other = SyncUnit::new("reviews", "orgX", "repoY");
        assert!(store.get_coverage(&other).unwrap().is_none());
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let (store, _dir) = create_test_store();
        store.upsert_day(&unit(), d("2025-01-01"), Utc::now(), 1).unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_day BEFORE INSERT ON day_sync
                 WHEN NEW.day = '2025-01-02'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let batch: Vec<_> = ["2025-01-01", "2025-01-02", "2025-01-03"]
            .iter()
            .map(|day| DaySyncRecord::new(unit(), d(day), 4))
            .collect();
        assert!(store.upsert_batch(&batch).is_err());

        // Neither the update before the failure nor anything after it landed
        let records = store
            .get_day_records(&unit(), &window("2025-01-01", "2025-01-31"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].day, d("2025-01-01"));
        assert_eq!(records[0].items_synced, 1);
    }

    #[test]
    fn test_corrupt_item_count_is_an_error() {
        let (store, _dir) = create_test_store();
        store.upsert_day(&unit(), d("2025-01-01"), Utc::now(), 1).unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute("UPDATE day_sync SET items_synced = -1", [])
                .unwrap();
        }

        let err = store
            .get_day_records(&unit(), &window("2025-01-01", "2025-01-31"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid item count in database: -1"));
    }

    #[test]
    fn test_delete_range_scoped_to_unit() {
        let (store, _dir) = create_test_store();
        let other = SyncUnit::new("reviews", "orgX", "repoY");
        for day in ["2025-01-01", "2025-01-02"] {
            store.upsert_day(&unit(), d(day), Utc::now(), 1).unwrap();
            store.upsert_day(&other, d(day), Utc::now(), 1).unwrap();
        }

        let removed = store
            .delete_range(&unit(), &window("2025-01-01", "2025-01-05"))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_coverage(&unit()).unwrap().is_none());
        assert_eq!(store.list_units().unwrap(), vec![other]);
    }

    #[test]
    fn test_record_roundtrip_is_compressed_and_idempotent() {
        let (store, _dir) = create_test_store();
        let record = ActivityRecord::new(
            unit(),
            ItemId::new("42"),
            "2025-01-02T10:00:00Z".parse().unwrap(),
            Some("octocat".to_string()),
            json!({ "id": 42, "title": "Fix the thing", "labels": ["bug"] }),
        );
        store.upsert_record(&record).unwrap();
        store.upsert_record(&record).unwrap();

        let loaded = store.get_record(&unit(), &ItemId::new("42")).unwrap().unwrap();
        assert_eq!(loaded.payload, record.payload);
        assert_eq!(loaded.day, d("2025-01-02"));
        assert_eq!(loaded.author.as_deref(), Some("octocat"));

        assert_eq!(
            store
                .count_records(&unit(), &window("2025-01-01", "2025-01-02"))
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .list_records_for_day(&unit(), d("2025-01-02"))
                .unwrap()
                .len(),
            1
        );
        assert!(store.get_record(&unit(), &ItemId::new("43")).unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("activity.test.sqlite");
        {
            let store = SqliteStore::new(&db_path).unwrap();
            store.upsert_day(&unit(), d("2025-01-01"), Utc::now(), 5).unwrap();
        }

        let store = SqliteStore::new(&db_path).unwrap();
        assert_eq!(store.get_coverage(&unit()).unwrap().unwrap().day_count, 1);
    }
}
