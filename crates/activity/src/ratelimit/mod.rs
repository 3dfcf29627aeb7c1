//! Quota-aware execution of remote calls
//!
//! [`RateLimitedClient`] wraps an [`ActivityApi`](crate::remote::ActivityApi)
//! and is the only place that retries, sleeps, or updates the run's quota.
//! Paginated reads are exposed as lazy [`Pages`] iterators.

mod client;
mod pagination;

pub use client::{RateLimitedClient, Sleeper};
pub use pagination::Pages;

use std::time::Duration;

/// Retry and throttling parameters for [`RateLimitedClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for a call failing with transient errors (>= 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
    /// Below this many remaining calls, wait for the quota reset first
    pub safety_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            safety_threshold: 50,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}
