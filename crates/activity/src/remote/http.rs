//! Activity API HTTP client
//!
//! Performs single remote calls against the activity API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use std::time::Duration;
use ureq::http::HeaderMap;
use url::Url;

use super::api::{CountResponse, RateLimitResponse, RawItem};
use super::{ActivityApi, ApiError, ApiResult, Response};
use crate::config::ApiCredentials;
use crate::models::{FetchWindow, ItemId, Quota, SyncUnit};

/// HTTP implementation of [`ActivityApi`]
pub struct HttpRemote {
    agent: ureq::Agent,
    base_url: Url,
    token: String,
}

impl HttpRemote {
    /// Create a new client for the API described by `credentials`
    ///
    /// # Arguments
    /// * `credentials` - API base URL and bearer token
    /// * `timeout` - Overall timeout for a single request
    pub fn new(credentials: &ApiCredentials, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&credentials.base_url)
            .with_context(|| format!("Invalid API base URL: {}", credentials.base_url))?;

        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", credentials.base_url);
        }

        // Non-2xx responses are classified here, so ureq must hand them back
        // with their headers instead of turning them into errors
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base_url,
            token: credentials.token.clone(),
        })
    }

    /// Build an endpoint URL from path segments (each segment is escaped)
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL for a unit's collection, optionally followed by extra segments
    fn unit_endpoint(&self, unit: &SyncUnit, extra: &[&str]) -> Url {
        let mut segments = vec![
            "repos",
            unit.organization.as_str(),
            unit.repository.as_str(),
            unit.resource_type.as_str(),
        ];
        segments.extend_from_slice(extra);
        self.endpoint(&segments)
    }

    /// Send a GET and decode the JSON body
    fn get_json<T: DeserializeOwned>(&self, url: &Url, resource: &str) -> ApiResult<T> {
        log::debug!("[CLIENT] GET {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .call()
            .map_err(|e| ApiError::transient(format!("request to {resource} failed: {e}")))?;

        let status = response.status().as_u16();
        let quota = quota_from_headers(response.headers());

        if !(200..300).contains(&status) {
            let retry_after = retry_after_from_headers(response.headers());
            return Err(ApiError::from_status(status, resource, retry_after, quota));
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::transient(format!("reading {resource} response: {e}")))?;

        let parsed: T = serde_json::from_str(&body)
            .map_err(|e| ApiError::validation(format!("decoding {resource} response: {e}")))?;

        Ok(Response::new(parsed).with_quota(quota))
    }
}

impl ActivityApi for HttpRemote {
    fn list_page(
        &self,
        unit: &SyncUnit,
        window: &FetchWindow,
        page: u32,
        per_page: u32,
    ) -> ApiResult<Vec<RawItem>> {
        let mut url = self.unit_endpoint(unit, &[]);
        append_window(&mut url, window);
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());

        self.get_json(&url, &unit.to_string())
    }

    fn get_item(&self, unit: &SyncUnit, id: &ItemId) -> ApiResult<RawItem> {
        let url = self.unit_endpoint(unit, &[id.as_str()]);
        self.get_json(&url, &format!("{unit}#{id}"))
    }

    fn count_items(&self, unit: &SyncUnit, window: &FetchWindow) -> ApiResult<u64> {
        let mut url = self.unit_endpoint(unit, &["count"]);
        append_window(&mut url, window);

        let response: Response<CountResponse> = self.get_json(&url, &unit.to_string())?;
        Ok(Response::new(response.body.total_count).with_quota(response.quota))
    }

    fn quota_status(&self) -> ApiResult<Quota> {
        let url = self.endpoint(&["rate_limit"]);
        let response: Response<RateLimitResponse> = self.get_json(&url, "rate_limit")?;

        let core = response.body.resources.core;
        let quota = Quota::from_epoch(core.remaining, core.limit, core.reset)
            .ok_or_else(|| ApiError::validation(format!("bad reset epoch {}", core.reset)))?;

        Ok(Response::new(quota).with_quota(Some(quota)))
    }
}

/// Add `since`/`until` bounds for a window
fn append_window(url: &mut Url, window: &FetchWindow) {
    let (since, until) = window.utc_bounds();
    url.query_pairs_mut()
        .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true))
        .append_pair("until", &until.to_rfc3339_opts(SecondsFormat::Secs, true));
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse `x-ratelimit-*` headers into a quota snapshot
fn quota_from_headers(headers: &HeaderMap) -> Option<Quota> {
    let remaining = header_value(headers, "x-ratelimit-remaining")?.parse().ok()?;
    let limit = header_value(headers, "x-ratelimit-limit")?.parse().ok()?;
    let reset = header_value(headers, "x-ratelimit-reset")?.parse().ok()?;
    Quota::from_epoch(remaining, limit, reset)
}

/// Parse a `retry-after` header given in seconds
fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    header_value(headers, "retry-after")?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
