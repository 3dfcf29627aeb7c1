//! Error taxonomy for remote API calls
//!
//! The kind of a failure is decided once, where the HTTP response is
//! inspected. Everything downstream matches on the variant.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::models::Quota;

/// Errors that can occur when calling the activity API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Network failure, server error, or an explicit throttling signal.
    /// Retried with backoff by the rate-limited client.
    #[error("Transient failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// A transient failure persisted through every allowed attempt.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },

    /// Credentials missing, expired or lacking permission.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Organization, repository or item does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The quota window is fully consumed. Never retried automatically.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The request or the returned payload was malformed.
    #[error("Invalid payload: {message}")]
    Validation { message: String },
}

impl ApiError {
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether the client should retry this error
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error must stop the whole run
    #[inline]
    pub fn halts_run(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Auth { .. })
    }

    /// Classify a non-success HTTP status
    ///
    /// * `resource` - what was being requested, for not-found messages
    /// * `retry_after` - parsed `retry-after` header, if any
    /// * `quota` - quota snapshot parsed from the response headers, if any
    pub fn from_status(
        status: u16,
        resource: &str,
        retry_after: Option<Duration>,
        quota: Option<Quota>,
    ) -> Self {
        match status {
            401 => Self::auth("credentials rejected (401)"),
            403 | 429 => match quota {
                Some(q) if q.remaining == 0 => Self::RateLimited {
                    reset_at: q.reset_at,
                },
                _ if retry_after.is_some() || status == 429 => Self::Transient {
                    message: format!("throttled ({status})"),
                    retry_after,
                },
                _ => Self::auth("access forbidden (403)"),
            },
            404 => Self::not_found(resource),
            500..=599 => Self::transient(format!("server error ({status})")),
            _ => Self::validation(format!("request rejected ({status}) for {resource}")),
        }
    }
}
