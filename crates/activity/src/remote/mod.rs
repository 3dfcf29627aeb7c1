//! Activity API integration
//!
//! This module provides:
//! - The `ActivityApi` transport trait and its HTTP implementation
//! - An in-memory implementation for tests and offline runs
//! - The closed `ApiError` taxonomy
//! - Normalization of raw payloads into `ActivityRecord`s

mod error;
mod http;
mod memory;
mod normalize;

pub use error::ApiError;
pub use http::HttpRemote;
pub use memory::{ApiCall, InMemoryApi};
pub use normalize::{item_author, item_id, item_occurred_at, normalize_item};

use crate::models::{FetchWindow, ItemId, Quota, ResourceType, SyncUnit};

/// A decoded response body together with the quota it reported
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub body: T,
    pub quota: Option<Quota>,
}

impl<T> Response<T> {
    pub fn new(body: T) -> Self {
        Self { body, quota: None }
    }

    pub fn with_quota(mut self, quota: Option<Quota>) -> Self {
        self.quota = quota;
        self
    }
}

/// Result of a single remote call
pub type ApiResult<T> = Result<Response<T>, ApiError>;

/// Transport for the activity API
///
/// Implementations perform exactly one remote call per method and classify
/// failures into [`ApiError`]. Retries, quota tracking and pagination live
/// in [`crate::ratelimit::RateLimitedClient`].
pub trait ActivityApi {
    /// Fetch one page (1-based) of abbreviated items for a unit, newest first
    fn list_page(
        &self,
        unit: &SyncUnit,
        window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Vec<api::RawItem>>;

    /// Fetch the full record of a single item
    fn get_item(&self, unit: &SyncUnit, id: &ItemId) -> ApiResult<api::RawItem>;

    /// Exact number of items a unit has in a window
    fn count_items(&self, unit: &SyncUnit, window: &FetchWindow) -> ApiResult<u64>;

    /// Current quota status
    fn quota_status(&self) -> ApiResult<Quota>;

    /// Whether list records of this kind need a detail call
    fn requires_detail(&self, resource: &ResourceType) -> bool {
        resource.requires_detail()
    }
}

/// Activity API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// An item exactly as the remote returned it
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct RawItem(pub serde_json::Value);

    /// Response from the exact-count endpoint
    #[derive(Debug, Deserialize)]
    pub struct CountResponse {
        pub total_count: u64,
    }

    /// Response from the quota-status endpoint
    #[derive(Debug, Deserialize)]
    pub struct RateLimitResponse {
        pub resources: RateLimitResources,
    }

    #[derive(Debug, Deserialize)]
    pub struct RateLimitResources {
        pub core: RateLimitResource,
    }

    /// One quota bucket, reset in epoch seconds
    #[derive(Debug, Deserialize)]
    pub struct RateLimitResource {
        pub limit: u32,
        pub remaining: u32,
        pub reset: i64,
    }
}
