//! Activity API payload normalization
//!
//! Converts raw API items to `ActivityRecord`s. Different resource kinds
//! name their identifier and timestamp differently, so each field is looked
//! up through an ordered list of candidate paths.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::ApiError;
use super::api::RawItem;
use crate::models::{ActivityRecord, ItemId, SyncUnit};

/// Candidate identifier fields, in priority order
const ID_PATHS: &[&str] = &["/id", "/number", "/sha", "/node_id"];

/// Candidate activity timestamps, in priority order
const TIMESTAMP_PATHS: &[&str] = &[
    "/occurred_at",
    "/updated_at",
    "/submitted_at",
    "/created_at",
    "/commit/author/date",
];

/// Candidate author logins, in priority order
const AUTHOR_PATHS: &[&str] = &["/user/login", "/author/login", "/commit/author/name"];

/// Extract the item identifier
pub fn item_id(raw: &RawItem) -> Result<ItemId, ApiError> {
    ID_PATHS
        .iter()
        .find_map(|path| raw.0.pointer(path).and_then(scalar_to_string))
        .map(ItemId::new)
        .ok_or_else(|| ApiError::validation("item has no id"))
}

/// Extract the instant the activity happened
pub fn item_occurred_at(raw: &RawItem) -> Result<DateTime<Utc>, ApiError> {
    let (path, value) = TIMESTAMP_PATHS
        .iter()
        .find_map(|path| {
            raw.0
                .pointer(path)
                .and_then(Value::as_str)
                .map(|s| (*path, s))
        })
        .ok_or_else(|| ApiError::validation("item has no timestamp"))?;

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiError::validation(format!("bad timestamp at {path}: {value:?} ({e})")))
}

/// Extract the acting user's login, if any
pub fn item_author(raw: &RawItem) -> Option<String> {
    AUTHOR_PATHS
        .iter()
        .find_map(|path| raw.0.pointer(path).and_then(Value::as_str))
        .map(str::to_string)
}

/// Normalize a raw item into an `ActivityRecord`
pub fn normalize_item(unit: &SyncUnit, raw: RawItem) -> Result<ActivityRecord, ApiError> {
    if !raw.0.is_object() {
        return Err(ApiError::validation("item is not a JSON object"));
    }

    let id = item_id(&raw)?;
    let occurred_at = item_occurred_at(&raw)?;
    let author = item_author(&raw);

    Ok(ActivityRecord::new(
        unit.clone(),
        id,
        occurred_at,
        author,
        raw.0,
    ))
}

/// Render ids that may arrive as numbers or strings
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
