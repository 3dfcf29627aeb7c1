//! Normalized activity record (pull request, review, comment, commit)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{SyncUnit, day_key};

/// Unique identifier for an item within its unit (remote id or sha)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One activity item stored for downstream reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Stream this item belongs to
    pub unit: SyncUnit,
    /// Remote identifier
    pub id: ItemId,
    /// When the activity happened (the instant used for day bucketing)
    pub occurred_at: DateTime<Utc>,
    /// UTC day key derived from `occurred_at`
    pub day: NaiveDate,
    /// Login of the acting user, when the payload names one
    pub author: Option<String>,
    /// When this copy was fetched
    pub fetched_at: DateTime<Utc>,
    /// Full remote payload
    pub payload: serde_json::Value,
}

impl ActivityRecord {
    pub fn new(
        unit: SyncUnit,
        id: ItemId,
        occurred_at: DateTime<Utc>,
        author: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            unit,
            id,
            occurred_at,
            day: day_key(occurred_at),
            author,
            fetched_at: Utc::now(),
            payload,
        }
    }
}
