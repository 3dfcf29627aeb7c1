//! Remote call quota snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consumable, time-windowed budget of remote calls
///
/// Within one window `remaining` only goes down. A reset is never predicted
/// locally: it is observed when the remote reports a later `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl Quota {
    pub fn new(remaining: u32, limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining,
            limit,
            reset_at,
        }
    }

    /// Build a snapshot from an epoch-seconds reset time
    pub fn from_epoch(remaining: u32, limit: u32, reset_epoch_secs: i64) -> Option<Self> {
        let reset_at = DateTime::from_timestamp(reset_epoch_secs, 0)?;
        Some(Self::new(remaining, limit, reset_at))
    }

    /// Fold a newer snapshot from the remote into this one
    ///
    /// A later `reset_at` means a new window and replaces the snapshot.
    /// Within the same window the lower `remaining` wins, so responses that
    /// arrive out of order cannot raise the budget.
    pub fn observe(self, next: Quota) -> Quota {
        if next.reset_at > self.reset_at {
            next
        } else {
            Quota {
                remaining: self.remaining.min(next.remaining),
                limit: next.limit,
                reset_at: self.reset_at,
            }
        }
    }

    /// Mark the window as fully consumed
    pub fn exhausted(self) -> Quota {
        Quota {
            remaining: 0,
            ..self
        }
    }

    /// How long until the window resets, zero if already passed
    pub fn until_reset(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.reset_at - now).to_std().unwrap_or_default()
    }
}
