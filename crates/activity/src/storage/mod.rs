//! Storage traits and implementations
//!
//! This module defines the storage abstraction for the sync ledger and the
//! fetched activity records. The trait-based design allows swapping between
//! in-memory and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ActivityStore, CoverageStore, SyncStore};
