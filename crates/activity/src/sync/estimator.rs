//! Pre-flight affordability check for a unit of work

use chrono::Days;

use crate::models::{Coverage, FetchWindow, ResourceType, SyncUnit};
use crate::remote::ApiError;

/// Source of exact item counts, used only for full syncs
///
/// Implemented by [`crate::ratelimit::RateLimitedClient`], where every count
/// is a real remote call that consumes quota.
pub trait ItemCounter {
    fn count_items(&mut self, unit: &SyncUnit, window: &FetchWindow) -> Result<u64, ApiError>;

    /// Whether each listed item costs one more detail call
    fn requires_detail(&self, resource: &ResourceType) -> bool {
        resource.requires_detail()
    }
}

/// How a pending unit of work will be fetched and what it is expected to cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Prior coverage already contains the request
    CacheHit,
    /// Short trailing extension of contiguous coverage; cost from a per-day constant
    Extension { gap_days: u64, estimated_cost: u64 },
    /// Anything else; cost from an exact remote count
    Full { item_count: u64, estimated_cost: u64 },
}

impl SyncStrategy {
    pub fn estimated_cost(&self) -> u64 {
        match self {
            Self::CacheHit => 0,
            Self::Extension { estimated_cost, .. } | Self::Full { estimated_cost, .. } => {
                *estimated_cost
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Extension { .. } => "extension",
            Self::Full { .. } => "full",
        }
    }
}

/// `remaining < estimated_cost + safety_margin`
pub fn should_skip(estimated_cost: u64, remaining: u32, safety_margin: u32) -> bool {
    u64::from(remaining) < estimated_cost + u64::from(safety_margin)
}

/// Decides whether a unit is affordable and by which strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaEstimator {
    /// Page size the fetch will use
    pub page_size: u32,
    /// Calls kept in reserve on top of the estimate
    pub safety_margin: u32,
    /// Heuristic calls per day for an extension
    pub extension_cost_per_day: u64,
    /// Longest trailing gap still classified as an extension
    pub max_extension_days: u64,
}

impl Default for QuotaEstimator {
    fn default() -> Self {
        Self {
            page_size: 100,
            safety_margin: 100,
            extension_cost_per_day: 5,
            max_extension_days: 7,
        }
    }
}

impl QuotaEstimator {
    /// Classify a request against the unit's prior coverage
    ///
    /// `pending` bounds the days that still have to be fetched; a full sync
    /// is costed over it rather than over the whole request. Pass
    /// `coverage = None` to force a full classification. The counter is
    /// called only for [`SyncStrategy::Full`].
    pub fn classify(
        &self,
        unit: &SyncUnit,
        requested: &FetchWindow,
        pending: &FetchWindow,
        coverage: Option<&Coverage>,
        counter: &mut dyn ItemCounter,
    ) -> Result<SyncStrategy, ApiError> {
        if let Some(coverage) = coverage {
            if coverage.contains(requested) {
                return Ok(SyncStrategy::CacheHit);
            }
            if let Some(gap_days) = self.extension_gap(requested, coverage) {
                return Ok(SyncStrategy::Extension {
                    gap_days,
                    estimated_cost: gap_days * self.extension_cost_per_day,
                });
            }
        }

        let item_count = counter.count_items(unit, pending)?;
        // A listing always ends with one short (possibly empty) page
        let pages = item_count / u64::from(self.page_size.max(1)) + 1;
        let detail_calls = if counter.requires_detail(&unit.resource_type) {
            item_count
        } else {
            0
        };

        Ok(SyncStrategy::Full {
            item_count,
            estimated_cost: pages + detail_calls,
        })
    }

    /// Whether `estimated_cost` would eat into the safety margin
    pub fn should_skip(&self, estimated_cost: u64, remaining: u32) -> bool {
        should_skip(estimated_cost, remaining, self.safety_margin)
    }

    /// Trailing days beyond coverage when the request is a short extension
    ///
    /// The request must start inside contiguous coverage (or on the day right
    /// after it) and end later than it. A request that also starts before
    /// coverage is not an extension.
    fn extension_gap(&self, requested: &FetchWindow, coverage: &Coverage) -> Option<u64> {
        if !coverage.is_contiguous() {
            return None;
        }

        let first_uncovered = coverage.max_day.checked_add_days(Days::new(1))?;
        let starts_inside = coverage.min_day <= requested.start && requested.start <= first_uncovered;
        if !starts_inside || requested.end <= coverage.max_day {
            return None;
        }

        let gap_days = (requested.end - coverage.max_day).num_days() as u64;
        (gap_days <= self.max_extension_days).then_some(gap_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Counter that reports a fixed total and records how often it was asked
    struct FixedCounter {
        total: u64,
        calls: usize,
        counted: Vec<FetchWindow>,
    }

    impl FixedCounter {
        fn new(total: u64) -> Self {
            Self {
                total,
                calls: 0,
                counted: Vec::new(),
            }
        }
    }

    impl ItemCounter for FixedCounter {
        fn count_items(&mut self, _unit: &SyncUnit, window: &FetchWindow) -> Result<u64, ApiError> {
            self.calls += 1;
            self.counted.push(*window);
            Ok(self.total)
        }
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn window(start: &str, end: &str) -> FetchWindow {
        FetchWindow::new(d(start), d(end)).unwrap()
    }

    fn coverage(min: &str, max: &str) -> Coverage {
        let min_day = d(min);
        let max_day = d(max);
        Coverage {
            min_day,
            max_day,
            day_count: (max_day - min_day).num_days() as u64 + 1,
        }
    }

    fn pull_requests() -> SyncUnit {
        SyncUnit::new("pull_requests", "orgX", "repoY")
    }

    #[test]
    fn test_cache_hit_needs_no_count() {
        let mut counter = FixedCounter::new(10);
        let strategy = QuotaEstimator::default()
            .classify(
                &pull_requests(),
                &window("2025-01-02", "2025-01-04"),
                &window("2025-01-02", "2025-01-04"),
                Some(&coverage("2025-01-01", "2025-01-05")),
                &mut counter,
            )
            .unwrap();
        assert_eq!(strategy, SyncStrategy::CacheHit);
        assert_eq!(counter.calls, 0);
    }

    #[test]
    fn test_trailing_extension_uses_heuristic() {
        let mut counter = FixedCounter::new(10);
        let strategy = QuotaEstimator::default()
            .classify(
                &pull_requests(),
                &window("2025-01-01", "2025-01-06"),
                &window("2025-01-01", "2025-01-06"),
                Some(&coverage("2025-01-01", "2025-01-05")),
                &mut counter,
            )
            .unwrap();
        assert_eq!(
            strategy,
            SyncStrategy::Extension {
                gap_days: 1,
                estimated_cost: 5
            }
        );
        assert_eq!(counter.calls, 0);
    }

    #[test]
    fn test_extension_starting_right_after_coverage() {
        let mut counter = FixedCounter::new(10);
        let strategy = QuotaEstimator::default()
            .classify(
                &pull_requests(),
                &window("2025-01-06", "2025-01-07"),
                &window("2025-01-06", "2025-01-07"),
                Some(&coverage("2025-01-01", "2025-01-05")),
                &mut counter,
            )
            .unwrap();
        assert_eq!(strategy.name(), "extension");
        assert_eq!(strategy.estimated_cost(), 10);
    }

    #[test]
    fn test_earlier_start_and_later_end_is_full() {
        let mut counter = FixedCounter::new(250);
        let strategy = QuotaEstimator::default()
            .classify(
                &pull_requests(),
                &window("2024-12-31", "2025-01-06"),
                &window("2024-12-31", "2025-01-06"),
                Some(&coverage("2025-01-01", "2025-01-05")),
                &mut counter,
            )
            .unwrap();
        // 3 list pages + 250 detail calls
        assert_eq!(
            strategy,
            SyncStrategy::Full {
                item_count: 250,
                estimated_cost: 253
            }
        );
        assert_eq!(counter.calls, 1);
    }

    #[test]
    fn test_long_gap_and_holes_are_full() {
        let estimator = QuotaEstimator::default();
        let mut counter = FixedCounter::new(0);

        let long_gap = estimator
            .classify(
                &pull_requests(),
                &window("2025-01-01", "2025-01-20"),
                &window("2025-01-01", "2025-01-20"),
                Some(&coverage("2025-01-01", "2025-01-05")),
                &mut counter,
            )
            .unwrap();
        assert_eq!(long_gap.name(), "full");

        let holey = Coverage {
            day_count: 3,
            ..coverage("2025-01-01", "2025-01-05")
        };
        let strategy = estimator
            .classify(
                &pull_requests(),
                &window("2025-01-01", "2025-01-06"),
                &window("2025-01-01", "2025-01-06"),
                Some(&holey),
                &mut counter,
            )
            .unwrap();
        assert_eq!(strategy.name(), "full");
        assert_eq!(counter.calls, 2);
    }

    #[test]
    fn test_full_sync_counts_only_pending_days() {
        // 19 of 20 days recorded, 2025-01-10 missing
        let holey = Coverage {
            day_count: 19,
            ..coverage("2025-01-01", "2025-01-20")
        };
        let mut counter = FixedCounter::new(10);
        let strategy = QuotaEstimator::default()
            .classify(
                &pull_requests(),
                &window("2025-01-01", "2025-01-20"),
                &window("2025-01-10", "2025-01-10"),
                Some(&holey),
                &mut counter,
            )
            .unwrap();

        assert_eq!(
            strategy,
            SyncStrategy::Full {
                item_count: 10,
                estimated_cost: 11
            }
        );
        assert_eq!(counter.counted, vec![window("2025-01-10", "2025-01-10")]);
    }

    #[test]
    fn test_full_cost_without_detail_calls() {
        let mut counter = FixedCounter::new(100);
        let reviews = SyncUnit::new("reviews", "orgX", "repoY");
        let strategy = QuotaEstimator::default()
            .classify(
                &reviews,
                &window("2025-01-01", "2025-01-02"),
                &window("2025-01-01", "2025-01-02"),
                None,
                &mut counter,
            )
            .unwrap();
        // A full page of 100 is followed by one empty page
        assert_eq!(strategy.estimated_cost(), 2);
    }

    #[test]
    fn test_should_skip() {
        assert!(should_skip(50, 149, 100));
        assert!(!should_skip(50, 150, 100));
        assert!(should_skip(0, 0, 1));
        assert!(!QuotaEstimator::default().should_skip(0, 100));
    }
}
