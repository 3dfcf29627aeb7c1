//! Rate-limited client: retries, backoff and quota bookkeeping

use chrono::Utc;
use std::time::Duration;

use super::{Pages, RetryPolicy};
use crate::models::{FetchWindow, Quota, ResourceType, SyncUnit};
use crate::remote::{ActivityApi, ApiError, ApiResult};
use crate::sync::ItemCounter;

/// Blocking sleep used for backoff and quota waits
pub type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Executes remote calls under the run's quota
///
/// The client owns the quota snapshot and is only mutated through
/// `&mut self`, so a run has exactly one writer for it.
pub struct RateLimitedClient<A> {
    api: A,
    policy: RetryPolicy,
    quota: Option<Quota>,
    sleeper: Sleeper,
    requests_made: u64,
}

impl<A: ActivityApi> RateLimitedClient<A> {
    pub fn new(api: A, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            quota: None,
            sleeper: Box::new(std::thread::sleep),
            requests_made: 0,
        }
    }

    /// Replace the blocking sleep (tests record delays instead of waiting)
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Last known quota, `None` until a response reported one
    pub fn quota(&self) -> Option<Quota> {
        self.quota
    }

    /// Outbound calls made so far, retries included
    pub fn requests_made(&self) -> u64 {
        self.requests_made
    }

    /// Run one remote operation with throttling and retries
    ///
    /// Transient failures are retried with exponential backoff until the
    /// policy's attempt budget is spent, then surface as
    /// [`ApiError::RetriesExhausted`]. `RateLimited` is never retried: the
    /// quota is marked exhausted and the error is returned as is. Every other
    /// error fails immediately.
    pub fn execute<T>(&mut self, mut op: impl FnMut(&A) -> ApiResult<T>) -> Result<T, ApiError> {
        let mut attempt = 0;

        loop {
            self.wait_for_quota();
            self.requests_made += 1;
            attempt += 1;

            match op(&self.api) {
                Ok(response) => {
                    if let Some(quota) = response.quota {
                        self.observe(quota);
                    }
                    return Ok(response.body);
                }
                Err(ApiError::RateLimited { reset_at }) => {
                    log::warn!("[CLIENT] Rate limit exceeded, resets at {}", reset_at);
                    self.quota = Some(match self.quota {
                        Some(q) if q.reset_at >= reset_at => q.exhausted(),
                        Some(q) => Quota::new(0, q.limit, reset_at),
                        None => Quota::new(0, 0, reset_at),
                    });
                    return Err(ApiError::RateLimited { reset_at });
                }
                Err(ApiError::Transient {
                    message,
                    retry_after,
                }) => {
                    let last = ApiError::Transient {
                        message,
                        retry_after,
                    };
                    if attempt >= self.policy.max_attempts {
                        log::warn!("[CLIENT] Giving up after {} attempts: {}", attempt, last);
                        return Err(ApiError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(last),
                        });
                    }

                    let backoff = self.policy.backoff(attempt - 1);
                    let delay = retry_after.map_or(backoff, |server| server.max(backoff));
                    log::warn!(
                        "[CLIENT] Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.policy.max_attempts,
                        last,
                        delay
                    );
                    (self.sleeper)(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Ask the remote for the current quota
    pub fn refresh_quota(&mut self) -> Result<Quota, ApiError> {
        let reported = self.execute(|api| api.quota_status())?;
        Ok(self.quota.unwrap_or(reported))
    }

    /// Lazily page through a listing
    ///
    /// `fetch_page(api, page, per_page)` is called with 1-based page numbers,
    /// one page per `next()`. See [`Pages`] for termination rules.
    pub fn paginate<T, F>(&mut self, fetch_page: F, per_page: u32) -> Pages<'_, A, T, F>
    where
        F: FnMut(&A, u32, u32) -> ApiResult<Vec<T>>,
    {
        Pages::new(self, fetch_page, per_page)
    }

    /// Fold a reported snapshot into the known quota
    fn observe(&mut self, next: Quota) {
        self.quota = Some(match self.quota {
            Some(current) => current.observe(next),
            None => next,
        });
    }

    /// Sleep until the quota resets when it is running low
    fn wait_for_quota(&self) {
        let Some(quota) = self.quota else {
            return;
        };
        if quota.remaining >= self.policy.safety_threshold {
            return;
        }

        let wait = quota.until_reset(Utc::now());
        if !wait.is_zero() {
            log::info!(
                "[CLIENT] Quota low ({} remaining), waiting {:?} for reset",
                quota.remaining,
                wait
            );
            (self.sleeper)(wait);
        }
    }
}

impl<A: ActivityApi> ItemCounter for RateLimitedClient<A> {
    fn count_items(&mut self, unit: &SyncUnit, window: &FetchWindow) -> Result<u64, ApiError> {
        self.execute(|api| api.count_items(unit, window))
    }

    fn requires_detail(&self, resource: &ResourceType) -> bool {
        self.api.requires_detail(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryApi;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn unit() -> SyncUnit {
        SyncUnit::new("pull_requests", "orgX", "repoY")
    }

    fn window() -> FetchWindow {
        FetchWindow::single("2025-01-01".parse().unwrap())
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            safety_threshold: 0,
        }
    }

    /// Client whose sleeps are recorded instead of performed
    fn recording_client(
        api: InMemoryApi,
        policy: RetryPolicy,
    ) -> (RateLimitedClient<InMemoryApi>, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&sleeps);
        let client = RateLimitedClient::new(api, policy)
            .with_sleeper(move |d| recorded.lock().unwrap().push(d));
        (client, sleeps)
    }

    #[test]
    fn test_transient_errors_retry_with_backoff() {
        let api = InMemoryApi::new();
        api.fail_next(ApiError::transient("502"), 2);
        let (mut client, sleeps) = recording_client(api, policy());

        let count = client.count_items(&unit(), &window()).unwrap();
        assert_eq!(count, 0);
        assert_eq!(client.requests_made(), 3);
        assert_eq!(
            *sleeps.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_retry_after_extends_backoff() {
        let api = InMemoryApi::new();
        api.fail_next(
            ApiError::Transient {
                message: "throttled".to_string(),
                retry_after: Some(Duration::from_secs(3)),
            },
            1,
        );
        let (mut client, sleeps) = recording_client(api, policy());

        client.count_items(&unit(), &window()).unwrap();
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_retries_exhausted() {
        let api = InMemoryApi::new();
        api.fail_next(ApiError::transient("timeout"), 10);
        let (mut client, sleeps) = recording_client(api, policy());

        let err = client.count_items(&unit(), &window()).unwrap_err();
        match err {
            ApiError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(last.is_transient());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.requests_made(), 4);
        assert_eq!(sleeps.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_permanent_errors_fail_immediately() {
        let api = InMemoryApi::new();
        api.fail_count(&unit(), ApiError::auth("bad token"));
        let (mut client, sleeps) = recording_client(api, policy());

        let err = client.count_items(&unit(), &window()).unwrap_err();
        assert!(matches!(err, ApiError::Auth { .. }));
        assert_eq!(client.requests_made(), 1);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rate_limited_is_not_retried() {
        let reset_at = Utc::now() + ChronoDuration::minutes(10);
        let api = InMemoryApi::new();
        api.fail_next(ApiError::RateLimited { reset_at }, 1);
        let (mut client, sleeps) = recording_client(api, policy());

        let err = client.count_items(&unit(), &window()).unwrap_err();
        assert_eq!(err, ApiError::RateLimited { reset_at });
        assert_eq!(client.requests_made(), 1);
        assert!(sleeps.lock().unwrap().is_empty());

        let quota = client.quota().unwrap();
        assert_eq!(quota.remaining, 0);
        assert_eq!(quota.reset_at, reset_at);
    }

    #[test]
    fn test_quota_tracked_from_responses() {
        let api = InMemoryApi::new().with_quota(100, 5000);
        let (mut client, _) = recording_client(api, policy());
        assert!(client.quota().is_none());

        client.count_items(&unit(), &window()).unwrap();
        client.count_items(&unit(), &window()).unwrap();
        assert_eq!(client.quota().unwrap().remaining, 98);

        // Quota status is free and agrees with the tracked value
        assert_eq!(client.refresh_quota().unwrap().remaining, 98);
    }

    #[test]
    fn test_waits_for_reset_below_safety_threshold() {
        let api = InMemoryApi::new().with_quota(10, 5000);
        let (mut client, sleeps) = recording_client(
            api,
            RetryPolicy {
                safety_threshold: 20,
                ..policy()
            },
        );

        // Nothing known yet: no wait before the first call
        client.count_items(&unit(), &window()).unwrap();
        assert!(sleeps.lock().unwrap().is_empty());

        client.count_items(&unit(), &window()).unwrap();
        let sleeps = sleeps.lock().unwrap();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] > Duration::from_secs(3000));
    }

    #[test]
    fn test_paginate_stops_on_short_page() {
        let api = InMemoryApi::new();
        for i in 0..5 {
            api.insert_item(
                &unit(),
                json!({ "id": i, "created_at": format!("2025-01-01T0{i}:00:00Z") }),
            );
        }
        let (mut client, _) = recording_client(api, policy());

        let w = window();
        let u = unit();
        let pages: Vec<_> = client
            .paginate(|api, page, per_page| api.list_page(&u, &w, page, per_page), 2)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(client.api().list_calls(), 3);
    }

    #[test]
    fn test_paginate_is_lazy() {
        let api = InMemoryApi::new();
        for i in 0..10 {
            api.insert_item(&unit(), json!({ "id": i, "created_at": "2025-01-01T12:00:00Z" }));
        }
        let (mut client, _) = recording_client(api, policy());

        let w = window();
        let u = unit();
        let mut pages = client.paginate(|api, page, per_page| api.list_page(&u, &w, page, per_page), 3);
        assert_eq!(pages.next().unwrap().unwrap().len(), 3);
        drop(pages);

        // Only the pulled page was fetched
        assert_eq!(client.api().list_calls(), 1);
    }

    #[test]
    fn test_paginate_ends_after_error() {
        let api = InMemoryApi::new();
        api.fail_list(&unit(), ApiError::not_found("orgX/repoY"));
        let (mut client, _) = recording_client(api, policy());

        let w = window();
        let u = unit();
        let mut pages = client.paginate(|api, page, per_page| api.list_page(&u, &w, page, per_page), 3);
        assert!(matches!(pages.next(), Some(Err(ApiError::NotFound { .. }))));
        assert!(pages.next().is_none());
        assert!(pages.next().is_none());
    }
}
