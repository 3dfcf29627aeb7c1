//! Domain models for activity sync

mod quota;
mod record;
mod unit;
mod window;

pub use quota::Quota;
pub use record::{ActivityRecord, ItemId};
pub use unit::{ResourceType, SyncUnit, resources};
pub use window::{Coverage, DaySyncRecord, FetchWindow, WindowError, day_key};
