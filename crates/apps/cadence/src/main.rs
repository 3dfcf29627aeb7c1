//! Cadence - incremental activity sync
//!
//! Runs the sync job described in ~/.config/cadence/sync-job.json against
//! the configured activity API and caches the results locally.

use activity::{
    ApiCredentials, HttpRemote, RateLimitedClient, SqliteStore, SyncJob, SyncOrchestrator,
    SyncSettings, SyncSummary,
};
use anyhow::Context;
use log::{error, info};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    // Bootstrap config directory
    config::init()?;

    let credentials = ApiCredentials::load().context("Failed to load API credentials")?;
    let settings = SyncSettings::load()?;
    let job = SyncJob::load()?;
    let window = job.window()?;

    let db_path = config::config_path("activity.sqlite")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    let store = SqliteStore::new(&db_path)?;

    let remote = HttpRemote::new(&credentials, settings.request_timeout())?;
    let client = RateLimitedClient::new(remote, settings.retry_policy());
    let mut orchestrator = SyncOrchestrator::new(client, &store, settings.estimator());

    info!(
        "Syncing {} units over {} into {}",
        job.units.len(),
        window,
        db_path.display()
    );

    match orchestrator.sync(&job.units, &window, job.force, &mut |msg| info!("{}", msg)) {
        Ok(summary) => {
            print_summary(&summary);
            Ok(summary.exit_code())
        }
        Err(aborted) => {
            print_summary(&aborted.summary);
            error!("{}", aborted);
            Ok(aborted.exit_code())
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    for report in &summary.units {
        println!(
            "{:<48} {:<16} days: {:>3} synced, {:>3} cached  items: {:>5} ok, {:>3} failed",
            report.unit.to_string(),
            report.state.as_str(),
            report.days_synced,
            report.days_cached,
            report.items_fetched,
            report.items_failed
        );
    }

    for failure in &summary.failures {
        let day = failure.day.map(|d| d.to_string()).unwrap_or_default();
        println!("  ! {} {} {}", failure.unit, day, failure.error);
    }

    println!(
        "{} items fetched, {} failed, {} days synced, {} requests in {:.1?}",
        summary.items_fetched,
        summary.items_failed,
        summary.days_synced,
        summary.requests_made,
        summary.elapsed
    );
}
