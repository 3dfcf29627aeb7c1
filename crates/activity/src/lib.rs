//! Activity crate - incremental, rate-limited activity sync
//!
//! This crate ingests activity records (pull requests, reviews, comments,
//! commits) from a paginated, rate-limited API and keeps a local cache:
//! - Domain models (SyncUnit, FetchWindow, Quota, ActivityRecord)
//! - Activity API transport with a closed error taxonomy
//! - Rate-limited client with retries and lazy pagination
//! - Day-granularity coverage ledger (SQLite and in-memory)
//! - Quota estimator and the sync orchestrator
//! - Coverage queries for reports
//!
//! Everything is synchronous; a run is a single thread of control.

pub mod config;
pub mod models;
pub mod query;
pub mod ratelimit;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::{ApiCredentials, SyncJob, SyncSettings};
pub use models::{
    ActivityRecord, Coverage, DaySyncRecord, FetchWindow, ItemId, Quota, ResourceType, SyncUnit,
    day_key,
};
pub use query::{CoverageReport, check_coverage};
pub use ratelimit::{Pages, RateLimitedClient, RetryPolicy};
pub use remote::{ActivityApi, ApiError, HttpRemote, InMemoryApi};
pub use storage::{ActivityStore, CoverageStore, InMemoryStore, SqliteStore, SyncStore};
pub use sync::{
    QuotaEstimator, RunAborted, SyncError, SyncFailure, SyncOrchestrator, SyncStrategy,
    SyncSummary, UnitReport, UnitState,
};
