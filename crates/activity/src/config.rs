//! Configuration loading for activity sync
//!
//! API credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for packaged builds)
//! 2. JSON file in the Cadence config directory
//! 3. Runtime environment variables (fallback)
//!
//! Sync tuning lives in `sync-settings.json`; every field has a default.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::{FetchWindow, SyncUnit};
use crate::ratelimit::RetryPolicy;
use crate::sync::QuotaEstimator;

/// Credentials filename in the Cadence config directory
const CREDENTIALS_FILE: &str = "api-credentials.json";

/// Sync settings filename in the Cadence config directory
pub const SETTINGS_FILE: &str = "sync-settings.json";

/// Sync job filename in the Cadence config directory
pub const JOB_FILE: &str = "sync-job.json";

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Credentials for the activity API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl ApiCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials
    /// 2. JSON file (~/.config/cadence/api-credentials.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            return config::load_json(CREDENTIALS_FILE);
        }

        Self::from_env()
    }

    /// Load credentials embedded at compile time via environment variables.
    /// Build with: CADENCE_API_TOKEN=xxx cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let token = option_env!("CADENCE_API_TOKEN")?;
        if token.is_empty() {
            return None;
        }

        Some(Self {
            token: token.to_string(),
            base_url: option_env!("CADENCE_API_URL")
                .filter(|url| !url.is_empty())
                .map_or_else(default_base_url, str::to_string),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("CADENCE_API_TOKEN")
            .context("CADENCE_API_TOKEN environment variable not set")?;
        let base_url = std::env::var("CADENCE_API_URL").unwrap_or_else(|_| default_base_url());

        Ok(Self { token, base_url })
    }

    /// Check if credentials are available (compile-time, file, or env vars)
    pub fn is_available() -> bool {
        Self::from_compile_time().is_some()
            || config::config_exists(CREDENTIALS_FILE)
            || std::env::var("CADENCE_API_TOKEN").is_ok()
    }
}

/// Tuning knobs for a sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Items requested per list page
    pub page_size: u32,
    /// Total attempts for a call failing with transient errors
    pub max_attempts: u32,
    /// Backoff base; attempt `n` waits `base * 2^n`
    pub base_backoff_ms: u64,
    /// Below this many remaining calls the client waits for the quota reset
    pub safety_threshold: u32,
    /// Calls kept in reserve when deciding whether a unit is affordable
    pub safety_margin: u32,
    /// Estimated calls per day for a trailing extension
    pub extension_cost_per_day: u64,
    /// Longest gap still treated as an extension
    pub max_extension_days: u64,
    /// Overall timeout for a single HTTP request
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_attempts: 4,
            base_backoff_ms: 500,
            safety_threshold: 50,
            safety_margin: 100,
            extension_cost_per_day: 5,
            max_extension_days: 7,
            request_timeout_secs: 30,
        }
    }
}

impl SyncSettings {
    /// Load settings from the config directory, defaulting when absent
    pub fn load() -> Result<Self> {
        config::load_json_or_default(SETTINGS_FILE)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_backoff_ms),
            safety_threshold: self.safety_threshold,
        }
    }

    pub fn estimator(&self) -> QuotaEstimator {
        QuotaEstimator {
            page_size: self.page_size.max(1),
            safety_margin: self.safety_margin,
            extension_cost_per_day: self.extension_cost_per_day,
            max_extension_days: self.max_extension_days,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// A sync job description: which units over which days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub units: Vec<SyncUnit>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub force: bool,
}

impl SyncJob {
    /// Load the job file from the config directory
    pub fn load() -> Result<Self> {
        config::load_json(JOB_FILE)
    }

    /// Parse a job from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse sync job JSON")
    }

    /// The requested window, validated
    pub fn window(&self) -> Result<FetchWindow> {
        FetchWindow::new(self.start, self.end).context("Invalid sync job window")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let creds = ApiCredentials::from_json(
            r#"{ "token": "ghp_test", "base_url": "https://ghe.example.com/api/v3" }"#,
        )
        .unwrap();
        assert_eq!(creds.token, "ghp_test");
        assert_eq!(creds.base_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_credentials_default_base_url() {
        let creds = ApiCredentials::from_json(r#"{ "token": "ghp_test" }"#).unwrap();
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_credentials_json() {
        assert!(ApiCredentials::from_json(r#"{ "other": {} }"#).is_err());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: SyncSettings =
            serde_json::from_str(r#"{ "page_size": 50, "safety_margin": 10 }"#).unwrap();
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.safety_margin, 10);
        assert_eq!(settings.max_attempts, 4);

        let policy = settings.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(settings.estimator().page_size, 50);
    }

    #[test]
    fn test_parse_job() {
        let job = SyncJob::from_json(
            r#"{
                "units": [
                    { "resource_type": "pull_requests", "organization": "orgX", "repository": "repoY" }
                ],
                "start": "2025-01-03",
                "end": "2025-01-07"
            }"#,
        )
        .unwrap();
        assert!(!job.force);
        assert_eq!(job.units[0].to_string(), "pull_requests:orgX/repoY");
        assert_eq!(job.window().unwrap().len_days(), 5);
    }

    #[test]
    fn test_job_rejects_reversed_window() {
        let job = SyncJob::from_json(
            r#"{ "units": [], "start": "2025-01-07", "end": "2025-01-03" }"#,
        )
        .unwrap();
        assert!(job.window().is_err());
    }
}
