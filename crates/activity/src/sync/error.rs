//! Errors that escape a sync run

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::SyncSummary;
use crate::remote::ApiError;

/// Why a run halted before processing every unit
#[derive(Debug, Error)]
pub enum SyncError {
    /// The quota window is exhausted
    #[error("Rate limit exceeded. Resume at {resume_at} with identical parameters")]
    RateLimited { resume_at: DateTime<Utc> },

    /// Credentials were rejected; operator action is needed
    #[error("Authentication failed: {0}")]
    Auth(ApiError),

    /// The coverage ledger could not be read or written
    #[error("Storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl SyncError {
    /// The run-halting error for an API failure, `None` if it does not halt
    pub fn from_api(error: &ApiError) -> Option<Self> {
        if !error.halts_run() {
            return None;
        }

        Some(match error {
            ApiError::RateLimited { reset_at } => Self::RateLimited {
                resume_at: *reset_at,
            },
            _ => Self::Auth(error.clone()),
        })
    }
}

/// A halted run together with everything it completed before halting
#[derive(Debug, Error)]
#[error("Sync run aborted: {error}")]
pub struct RunAborted {
    pub error: SyncError,
    pub summary: SyncSummary,
}

impl RunAborted {
    /// When the caller can resume, for rate-limit halts
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self.error {
            SyncError::RateLimited { resume_at } => Some(resume_at),
            _ => None,
        }
    }

    /// Process exit status for a halted run
    pub fn exit_code(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api() {
        let reset_at = Utc::now();
        assert!(matches!(
            SyncError::from_api(&ApiError::RateLimited { reset_at }),
            Some(SyncError::RateLimited { resume_at }) if resume_at == reset_at
        ));
        assert!(matches!(
            SyncError::from_api(&ApiError::auth("expired")),
            Some(SyncError::Auth(_))
        ));
        assert!(SyncError::from_api(&ApiError::not_found("orgX/repoY")).is_none());
        assert!(SyncError::from_api(&ApiError::transient("502")).is_none());
    }

    #[test]
    fn test_from_api_agrees_with_halts_run() {
        let errors = [
            ApiError::RateLimited {
                reset_at: Utc::now(),
            },
            ApiError::auth("expired"),
            ApiError::not_found("orgX/repoY"),
            ApiError::validation("bad payload"),
            ApiError::transient("502"),
        ];
        for error in &errors {
            assert_eq!(SyncError::from_api(error).is_some(), error.halts_run(), "{error}");
        }
    }

    #[test]
    fn test_aborted_message_carries_resume_instruction() {
        let reset_at = Utc::now();
        let aborted = RunAborted {
            error: SyncError::RateLimited {
                resume_at: reset_at,
            },
            summary: SyncSummary::default(),
        };
        let message = aborted.to_string();
        assert!(message.contains("identical parameters"));
        assert!(message.contains(&reset_at.to_string()));
        assert_eq!(aborted.resume_at(), Some(reset_at));
        assert_ne!(aborted.exit_code(), 0);
    }

    #[test]
    fn test_storage_error_shows_context_chain() {
        let err = anyhow::anyhow!("disk full").context("Failed to write day record");
        let message = SyncError::Storage(err).to_string();
        assert!(message.contains("Failed to write day record"));
        assert!(message.contains("disk full"));
    }
}
