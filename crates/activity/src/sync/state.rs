//! Per-unit state machine and report

use std::fmt;

use super::SyncStrategy;
use crate::models::SyncUnit;

/// Where a unit is in its sync lifecycle
///
/// ```text
/// Pending -> CacheCheck -> SkippedCached
///                       -> QuotaCheck -> SkippedQuota
///                                     -> Fetching -> Completed | PartiallyFailed | Failed
/// ```
///
/// `Aborted` marks the unit in flight when the run halted and
/// `NotAttempted` the units after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    Pending,
    CacheCheck,
    SkippedCached,
    QuotaCheck,
    SkippedQuota,
    Fetching,
    Completed,
    PartiallyFailed,
    Failed,
    Aborted,
    NotAttempted,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SkippedCached
                | Self::SkippedQuota
                | Self::Completed
                | Self::PartiallyFailed
                | Self::Failed
                | Self::Aborted
                | Self::NotAttempted
        )
    }

    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::*;
        match (self, next) {
            (Pending, CacheCheck | NotAttempted) => true,
            (CacheCheck, SkippedCached | QuotaCheck) => true,
            (QuotaCheck, SkippedQuota | Fetching | Failed) => true,
            (Fetching, Completed | PartiallyFailed | Failed) => true,
            (CacheCheck | QuotaCheck | Fetching, Aborted) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CacheCheck => "cache_check",
            Self::SkippedCached => "skipped_cached",
            Self::QuotaCheck => "quota_check",
            Self::SkippedQuota => "skipped_quota",
            Self::Fetching => "fetching",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one unit within a run
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub unit: SyncUnit,
    pub state: UnitState,
    /// Strategy chosen at the quota check, if reached
    pub strategy: Option<SyncStrategy>,
    /// Estimated cost and remaining quota when the unit was skipped for quota
    pub estimated_cost: Option<u64>,
    pub remaining_at_check: Option<u32>,
    /// Requested days already covered before this run
    pub days_cached: usize,
    /// Days recorded by this run
    pub days_synced: usize,
    pub items_fetched: usize,
    pub items_failed: usize,
}

impl UnitReport {
    pub fn new(unit: SyncUnit) -> Self {
        Self {
            unit,
            state: UnitState::Pending,
            strategy: None,
            estimated_cost: None,
            remaining_at_check: None,
            days_cached: 0,
            days_synced: 0,
            items_fetched: 0,
            items_failed: 0,
        }
    }

    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: UnitState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid unit transition {} -> {}",
            self.state,
            next
        );
        log::debug!("[SYNC] {}: {} -> {}", self.unit, self.state, next);
        self.state = next;
    }
}
