//! Sync orchestrator: cache check, quota check, gap fetch, day recording

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::time::Instant;

use super::gap::{contiguous_runs, missing_days};
use super::{
    QuotaEstimator, RunAborted, SyncError, SyncFailure, SyncSummary, UnitReport, UnitState,
};
use crate::models::{Coverage, FetchWindow, ItemId, SyncUnit, day_key};
use crate::ratelimit::RateLimitedClient;
use crate::remote::api::RawItem;
use crate::remote::{ActivityApi, ApiError, item_id, item_occurred_at, normalize_item};
use crate::storage::{ActivityStore, CoverageStore, SyncStore};

/// How fetching a contiguous run of gap days ended
enum RunOutcome {
    /// Every day of the run was recorded
    Recorded,
    /// A fatal error stopped the unit; later days were not attempted
    Stopped,
}

/// Drives sync units through cache check, quota check and fetching
///
/// Units are processed one after another. The orchestrator owns the
/// rate-limited client for the duration of a run, so the quota has a single
/// writer; the store is shared by reference.
pub struct SyncOrchestrator<'s, A> {
    client: RateLimitedClient<A>,
    store: &'s dyn SyncStore,
    estimator: QuotaEstimator,
}

impl<'s, A: ActivityApi> SyncOrchestrator<'s, A> {
    pub fn new(
        client: RateLimitedClient<A>,
        store: &'s dyn SyncStore,
        estimator: QuotaEstimator,
    ) -> Self {
        Self {
            client,
            store,
            estimator,
        }
    }

    pub fn client(&self) -> &RateLimitedClient<A> {
        &self.client
    }

    pub fn into_client(self) -> RateLimitedClient<A> {
        self.client
    }

    /// Coverage of a unit, for reports
    pub fn coverage(&self, unit: &SyncUnit) -> Result<Option<Coverage>> {
        self.store.get_coverage(unit)
    }

    /// Days of `window` already synchronized for a unit
    pub fn synced_days(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<Vec<NaiveDate>> {
        self.store.get_synced_days(unit, window)
    }

    /// Forget the recorded days of `window` so the next run fetches them again
    pub fn reset_range(&self, unit: &SyncUnit, window: &FetchWindow) -> Result<usize> {
        let removed = self.store.delete_range(unit, window)?;
        log::info!("[SYNC] Reset {} day records for {} in {}", removed, unit, window);
        Ok(removed)
    }

    /// Synchronize `units` over `window`
    ///
    /// With `force`, every requested day is fetched and re-recorded even when
    /// already covered. `on_progress` receives human-readable unit and day
    /// notifications.
    ///
    /// Item and unit failures are collected in the summary. Rate limiting,
    /// authentication and storage failures halt the run: the current unit is
    /// marked `Aborted`, the rest `NotAttempted`, and the summary so far is
    /// returned inside [`RunAborted`].
    pub fn sync(
        &mut self,
        units: &[SyncUnit],
        window: &FetchWindow,
        force: bool,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<SyncSummary, RunAborted> {
        let started = Instant::now();
        let requests_before = self.client.requests_made();
        let mut summary = SyncSummary::default();

        log::info!(
            "[SYNC] Starting sync of {} units over {}{}",
            units.len(),
            window,
            if force { " (forced)" } else { "" }
        );

        for (index, unit) in units.iter().enumerate() {
            let mut report = UnitReport::new(unit.clone());

            let halted = self.sync_unit(
                unit,
                window,
                force,
                &mut report,
                &mut summary.failures,
                on_progress,
            );

            if let Err(error) = halted {
                log::error!("[SYNC] Run halted at {}: {}", unit, error);
                on_progress(&format!("{unit}: aborted ({error})"));

                report.advance(UnitState::Aborted);
                summary.record(report);
                for rest in &units[index + 1..] {
                    let mut skipped = UnitReport::new(rest.clone());
                    skipped.advance(UnitState::NotAttempted);
                    summary.record(skipped);
                }

                summary.requests_made = self.client.requests_made() - requests_before;
                summary.elapsed = started.elapsed();
                return Err(RunAborted { error, summary });
            }

            summary.record(report);
        }

        summary.requests_made = self.client.requests_made() - requests_before;
        summary.elapsed = started.elapsed();

        log::info!(
            "[SYNC] Done: {} items fetched, {} failed, {} days synced, {} requests in {:?}",
            summary.items_fetched,
            summary.items_failed,
            summary.days_synced,
            summary.requests_made,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Run one unit to a terminal state, or return the error that halts the run
    fn sync_unit(
        &mut self,
        unit: &SyncUnit,
        window: &FetchWindow,
        force: bool,
        report: &mut UnitReport,
        failures: &mut Vec<SyncFailure>,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<(), SyncError> {
        // 1. Cache check
        report.advance(UnitState::CacheCheck);
        let gap = if force {
            window.days().collect()
        } else {
            let synced = self
                .store
                .get_synced_days(unit, window)
                .map_err(SyncError::Storage)?;
            report.days_cached = synced.len();
            missing_days(window, &synced)
        };

        let (Some(&first), Some(&last)) = (gap.first(), gap.last()) else {
            report.advance(UnitState::SkippedCached);
            log::info!("[SYNC] {}: {} already cached", unit, window);
            on_progress(&format!("{unit}: cached, nothing to fetch"));
            return Ok(());
        };
        // Gap days are ascending; this spans every day still to fetch
        let pending = FetchWindow {
            start: first,
            end: last,
        };

        // 2. Quota check
        report.advance(UnitState::QuotaCheck);
        let coverage = if force {
            None
        } else {
            self.store.get_coverage(unit).map_err(SyncError::Storage)?
        };

        let strategy =
            match self
                .estimator
                .classify(unit, window, &pending, coverage.as_ref(), &mut self.client)
            {
                Ok(strategy) => strategy,
                Err(e) => return fail_unit(unit, report, failures, e),
            };
        report.strategy = Some(strategy);

        // A snapshot from a window that has already reset says nothing about
        // the current budget; only the remote can report the new one
        let remaining = match self.client.quota() {
            Some(quota) if quota.reset_at > Utc::now() => quota.remaining,
            _ => match self.client.refresh_quota() {
                Ok(quota) => quota.remaining,
                Err(e) => return fail_unit(unit, report, failures, e),
            },
        };

        let estimated_cost = strategy.estimated_cost();
        if self.estimator.should_skip(estimated_cost, remaining) {
            report.estimated_cost = Some(estimated_cost);
            report.remaining_at_check = Some(remaining);
            report.advance(UnitState::SkippedQuota);
            log::warn!(
                "[SYNC] {}: skipped, {} strategy needs ~{} calls but only {} remain",
                unit,
                strategy.name(),
                estimated_cost,
                remaining
            );
            on_progress(&format!(
                "{unit}: skipped for quota (needs ~{estimated_cost}, {remaining} remaining)"
            ));
            return Ok(());
        }

        // 3. Fetch each contiguous run of the gap, oldest first
        report.advance(UnitState::Fetching);
        log::info!(
            "[SYNC] {}: fetching {} days ({} strategy)",
            unit,
            gap.len(),
            strategy.name()
        );

        let mut stopped = false;
        for run in contiguous_runs(&gap) {
            match self.fetch_run(unit, &run, report, failures, on_progress)? {
                RunOutcome::Recorded => {}
                RunOutcome::Stopped => {
                    stopped = true;
                    break;
                }
            }
        }

        let outcome = if stopped && report.days_synced == 0 {
            UnitState::Failed
        } else if stopped || report.items_failed > 0 {
            UnitState::PartiallyFailed
        } else {
            UnitState::Completed
        };
        report.advance(outcome);
        log::info!(
            "[SYNC] {}: {} ({} days, {} items, {} failed)",
            unit,
            outcome,
            report.days_synced,
            report.items_fetched,
            report.items_failed
        );
        on_progress(&format!("{unit}: {outcome}"));
        Ok(())
    }

    /// Fetch one contiguous run of days and record each completed day
    fn fetch_run(
        &mut self,
        unit: &SyncUnit,
        run: &FetchWindow,
        report: &mut UnitReport,
        failures: &mut Vec<SyncFailure>,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<RunOutcome, SyncError> {
        on_progress(&format!("{unit}: fetching {run}"));

        let mut buckets: BTreeMap<NaiveDate, Vec<RawItem>> =
            run.days().map(|day| (day, Vec::new())).collect();

        // Listing is newest first: stop pulling once items predate the run
        let (since, _) = run.utc_bounds();
        let page_size = self.estimator.page_size;
        let mut listing_error = None;
        let pages = self.client.paginate(
            |api, page, per_page| api.list_page(unit, run, page, per_page),
            page_size,
        );

        for page in pages {
            let items = match page {
                Ok(items) => items,
                Err(e) => {
                    listing_error = Some(e);
                    break;
                }
            };

            let mut reached_older = false;
            for raw in items {
                match item_occurred_at(&raw) {
                    Ok(ts) if ts < since => reached_older = true,
                    Ok(ts) => {
                        if let Some(bucket) = buckets.get_mut(&day_key(ts)) {
                            bucket.push(raw);
                        }
                    }
                    Err(e) => {
                        log::warn!("[SYNC] {}: skipping listed item: {}", unit, e);
                        report.items_failed += 1;
                        let failure = SyncFailure::new(unit, e);
                        failures.push(match item_id(&raw) {
                            Ok(id) => failure.for_item(id),
                            Err(_) => failure,
                        });
                    }
                }
            }

            if reached_older {
                break;
            }
        }

        if let Some(e) = listing_error {
            if let Some(halt) = SyncError::from_api(&e) {
                return Err(halt);
            }
            log::warn!("[SYNC] {}: listing {} failed: {}", unit, run, e);
            on_progress(&format!("{unit}: listing {run} failed ({e})"));
            failures.push(SyncFailure::new(unit, e));
            return Ok(RunOutcome::Stopped);
        }

        let requires_detail = self.client.api().requires_detail(&unit.resource_type);

        for (day, items) in buckets {
            let mut stored: u32 = 0;

            for raw in items {
                let raw = if requires_detail {
                    let id = match item_id(&raw) {
                        Ok(id) => id,
                        Err(e) => {
                            record_item_failure(unit, day, None, e, report, failures);
                            continue;
                        }
                    };

                    match self.client.execute(|api| api.get_item(unit, &id)) {
                        Ok(detail) => detail,
                        Err(e) => {
                            if let Some(halt) = SyncError::from_api(&e) {
                                return Err(halt);
                            }
                            if matches!(e, ApiError::NotFound { .. } | ApiError::Validation { .. }) {
                                record_item_failure(unit, day, Some(id), e, report, failures);
                                continue;
                            }

                            // Retries exhausted: the day stays unrecorded
                            log::warn!("[SYNC] {}: {} aborted at item {}: {}", unit, day, id, e);
                            on_progress(&format!("{unit}: {day} incomplete ({e})"));
                            failures.push(SyncFailure::new(unit, e).on_day(day).for_item(id));
                            return Ok(RunOutcome::Stopped);
                        }
                    }
                } else {
                    raw
                };

                match normalize_item(unit, raw) {
                    Ok(record) => {
                        self.store
                            .upsert_record(&record)
                            .map_err(SyncError::Storage)?;
                        stored += 1;
                        report.items_fetched += 1;
                    }
                    Err(e) => record_item_failure(unit, day, None, e, report, failures),
                }
            }

            self.store
                .upsert_day(unit, day, Utc::now(), stored)
                .map_err(SyncError::Storage)?;
            report.days_synced += 1;
            log::debug!("[SYNC] {}: recorded {} with {} items", unit, day, stored);
            on_progress(&format!("{unit}: {day} synced ({stored} items)"));
        }

        Ok(RunOutcome::Recorded)
    }
}

/// End a unit on a unit-level API failure, or halt the run
fn fail_unit(
    unit: &SyncUnit,
    report: &mut UnitReport,
    failures: &mut Vec<SyncFailure>,
    error: ApiError,
) -> Result<(), SyncError> {
    if let Some(halt) = SyncError::from_api(&error) {
        return Err(halt);
    }

    log::warn!("[SYNC] {}: failed: {}", unit, error);
    failures.push(SyncFailure::new(unit, error));
    report.advance(UnitState::Failed);
    Ok(())
}

/// Record an item-level failure; the day carries on
fn record_item_failure(
    unit: &SyncUnit,
    day: NaiveDate,
    item: Option<ItemId>,
    error: ApiError,
    report: &mut UnitReport,
    failures: &mut Vec<SyncFailure>,
) {
    log::warn!("[SYNC] {}: skipping item on {}: {}", unit, day, error);
    report.items_failed += 1;

    let failure = SyncFailure::new(unit, error).on_day(day);
    failures.push(match item {
        Some(id) => failure.for_item(id),
        None => failure,
    });
}
