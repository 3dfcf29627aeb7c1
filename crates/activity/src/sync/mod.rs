//! Sync engine for incremental, quota-aware fetching
//!
//! Provides idempotent sync runs that can be safely repeated: days already
//! recorded in the coverage ledger are never fetched again unless forced.

mod error;
mod estimator;
pub mod gap;
mod orchestrator;
mod state;
mod summary;

pub use error::{RunAborted, SyncError};
pub use estimator::{ItemCounter, QuotaEstimator, SyncStrategy, should_skip};
pub use orchestrator::SyncOrchestrator;
pub use state::{UnitReport, UnitState};
pub use summary::{SyncFailure, SyncSummary};
