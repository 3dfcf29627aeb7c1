//! In-memory activity API
//!
//! Serves seeded items with the same paging and quota conventions as the
//! real API. Used by tests and for offline dry runs. Failures can be
//! scripted per call kind, and every call is recorded for inspection.

use chrono::{Duration, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::api::RawItem;
use super::normalize::{item_id, item_occurred_at};
use super::{ActivityApi, ApiError, ApiResult, Response};
use crate::models::{FetchWindow, ItemId, Quota, SyncUnit};

/// A call received by [`InMemoryApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    List {
        unit: SyncUnit,
        window: FetchWindow,
        page: u32,
    },
    Detail {
        unit: SyncUnit,
        id: ItemId,
    },
    Count {
        unit: SyncUnit,
        window: FetchWindow,
    },
    QuotaStatus,
}

/// Which calls a scripted failure applies to
#[derive(Debug, Clone, PartialEq)]
enum Target {
    AnyCall,
    List(SyncUnit),
    Item(SyncUnit, ItemId),
    Count(SyncUnit),
}

impl Target {
    fn matches(&self, call: &ApiCall) -> bool {
        match (self, call) {
            (Target::AnyCall, ApiCall::QuotaStatus) => false,
            (Target::AnyCall, _) => true,
            (Target::List(u), ApiCall::List { unit, .. }) => u == unit,
            (Target::Item(u, i), ApiCall::Detail { unit, id }) => u == unit && i == id,
            (Target::Count(u), ApiCall::Count { unit, .. }) => u == unit,
            _ => false,
        }
    }
}

struct ScriptedFailure {
    target: Target,
    error: ApiError,
    /// Remaining times to fire; `None` fires forever
    times: Option<u32>,
}

/// A seeded item: the abbreviated listing and the full detail record
struct StoredItem {
    listing: RawItem,
    detail: RawItem,
}

#[derive(Default)]
struct State {
    items: BTreeMap<SyncUnit, Vec<StoredItem>>,
    failures: Vec<ScriptedFailure>,
    calls: Vec<ApiCall>,
    quota: Option<Quota>,
    ignore_window: bool,
}

/// In-memory implementation of [`ActivityApi`]
#[derive(Default)]
pub struct InMemoryApi {
    state: Mutex<State>,
}

impl InMemoryApi {
    /// Create an empty API with unlimited quota
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Emulate a quota window: every call but quota status consumes one unit
    pub fn with_quota(self, remaining: u32, limit: u32) -> Self {
        self.state().quota = Some(Quota::new(remaining, limit, Utc::now() + Duration::hours(1)));
        self
    }

    /// Replace the emulated quota window, as a remote reset would
    pub fn set_quota(&self, quota: Quota) {
        self.state().quota = Some(quota);
    }

    /// Return every item of the unit regardless of `since`/`until`
    pub fn ignoring_window(self) -> Self {
        self.state().ignore_window = true;
        self
    }

    /// Seed an item whose listing and detail payloads are identical
    pub fn insert_item(&self, unit: &SyncUnit, item: serde_json::Value) {
        self.insert_item_with_detail(unit, item.clone(), item);
    }

    /// Seed an item with a distinct detail payload
    pub fn insert_item_with_detail(
        &self,
        unit: &SyncUnit,
        listing: serde_json::Value,
        detail: serde_json::Value,
    ) {
        self.state()
            .items
            .entry(unit.clone())
            .or_default()
            .push(StoredItem {
                listing: RawItem(listing),
                detail: RawItem(detail),
            });
    }

    /// Every list call for `unit` fails with `error`
    pub fn fail_list(&self, unit: &SyncUnit, error: ApiError) {
        self.script(Target::List(unit.clone()), error, None);
    }

    /// Every count call for `unit` fails with `error`
    pub fn fail_count(&self, unit: &SyncUnit, error: ApiError) {
        self.script(Target::Count(unit.clone()), error, None);
    }

    /// Detail calls for one item fail with `error` (`times = None` means always)
    pub fn fail_item(&self, unit: &SyncUnit, id: &str, error: ApiError, times: Option<u32>) {
        self.script(Target::Item(unit.clone(), ItemId::new(id)), error, times);
    }

    /// The next `times` calls of any kind fail with `error`
    pub fn fail_next(&self, error: ApiError, times: u32) {
        self.script(Target::AnyCall, error, Some(times));
    }

    fn script(&self, target: Target, error: ApiError, times: Option<u32>) {
        self.state().failures.push(ScriptedFailure {
            target,
            error,
            times,
        });
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn list_calls(&self) -> usize {
        self.count_matching(|c| matches!(c, ApiCall::List { .. }))
    }

    pub fn detail_calls(&self) -> usize {
        self.count_matching(|c| matches!(c, ApiCall::Detail { .. }))
    }

    pub fn count_calls(&self) -> usize {
        self.count_matching(|c| matches!(c, ApiCall::Count { .. }))
    }

    fn count_matching(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    /// Forget recorded calls (seeded items and scripts are kept)
    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Record a call, charge quota, and fire any scripted failure
    fn begin(&self, call: ApiCall) -> Result<Option<Quota>, ApiError> {
        let mut state = self.state();
        state.calls.push(call.clone());

        let charge = !matches!(call, ApiCall::QuotaStatus);
        let current = state.quota;
        let quota = match current {
            Some(q) if charge && q.remaining == 0 => {
                return Err(ApiError::RateLimited {
                    reset_at: q.reset_at,
                });
            }
            Some(q) if charge => {
                let next = Quota {
                    remaining: q.remaining - 1,
                    ..q
                };
                state.quota = Some(next);
                Some(next)
            }
            other => other,
        };

        let fired = state
            .failures
            .iter_mut()
            .find(|f| f.target.matches(&call) && f.times != Some(0));
        if let Some(failure) = fired {
            if let Some(times) = failure.times.as_mut() {
                *times -= 1;
            }
            return Err(failure.error.clone());
        }

        Ok(quota)
    }

    /// Listing payloads of a unit inside `window`, newest first
    fn listing(&self, unit: &SyncUnit, window: &FetchWindow) -> Vec<RawItem> {
        let state = self.state();
        let (since, until) = window.utc_bounds();
        let ignore_window = state.ignore_window;

        let mut items: Vec<_> = state
            .items
            .get(unit)
            .map(|items| {
                items
                    .iter()
                    .map(|item| (item_occurred_at(&item.listing).ok(), item.listing.clone()))
                    .filter(|(ts, _)| {
                        ignore_window || ts.is_none_or(|ts| since <= ts && ts < until)
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Newest first; items without a readable timestamp lead
        items.sort_by_key(|(ts, _)| Reverse(ts.map_or(i64::MAX, |t| t.timestamp_millis())));
        items.into_iter().map(|(_, raw)| raw).collect()
    }
}

impl ActivityApi for InMemoryApi {
    fn list_page(
        &self,
        unit: &SyncUnit,
        window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Vec<RawItem>> {
        let quota = self.begin(ApiCall::List {
            unit: unit.clone(),
            window: *window,
            page,
        })?;

        let skip = page.saturating_sub(1) as usize * per_page as usize;
        let items = self
            .listing(unit, window)
            .into_iter()
            .skip(skip)
            .take(per_page as usize)
            .collect();

        Ok(Response::new(items).with_quota(quota))
    }

    fn get_item(&self, unit: &SyncUnit, id: &ItemId) -> ApiResult<RawItem> {
        let quota = self.begin(ApiCall::Detail {
            unit: unit.clone(),
            id: id.clone(),
        })?;

        let state = self.state();
        let detail = state
            .items
            .get(unit)
            .and_then(|items| {
                items
                    .iter()
                    .find(|item| item_id(&item.listing).is_ok_and(|found| &found == id))
            })
            .map(|item| item.detail.clone())
            .ok_or_else(|| ApiError::not_found(format!("{unit}#{id}")))?;

        Ok(Response::new(detail).with_quota(quota))
    }

    fn count_items(&self, unit: &SyncUnit, window: &FetchWindow) -> ApiResult<u64> {
        let quota = self.begin(ApiCall::Count {
            unit: unit.clone(),
            window: *window,
        })?;
        let count = self.listing(unit, window).len() as u64;
        Ok(Response::new(count).with_quota(quota))
    }

    fn quota_status(&self) -> ApiResult<Quota> {
        self.begin(ApiCall::QuotaStatus)?;
        let quota = self
            .state()
            .quota
            .unwrap_or_else(|| Quota::new(u32::MAX, u32::MAX, Utc::now() + Duration::hours(1)));
        Ok(Response::new(quota).with_quota(Some(quota)))
    }
}
