//! Port of `scheduler/base_schedule.py::AbstractSchedule.run`: sequences one
//! end-to-end reallocation cycle (spec.md §4.6).

use std::collections::HashMap;

use chrono::{FixedOffset, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::ClusterManagerClient;
use crate::config::{validate, Paths, SchedulerConfig};
use crate::error::{Error, Result};
use crate::pool::{build_pools_info, tree::ScheduledAllocations};
use crate::query::aggregator::fetch_queries_in_window;
use crate::report;
use crate::schedule::{resolve_strategy, validate_targets, AllocationOptions};

/// What one cycle actually did, for logging and for the report generator.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No pool needed a change.
    NoChange,
    /// Engine configuration was mutated and pools refreshed.
    Applied { moves: HashMap<String, f64> },
    /// The cycle was skipped for a non-fatal reason (health check).
    Skipped { reason: String },
}

const IMPALAD: &str = "IMPALAD";
const STATESTORE: &str = "STATESTORE";
const HEALTH_GOOD: &str = "GOOD";

/// Run a single scheduling cycle against a live cluster manager. On any
/// fatal error, logs and (if configured) attempts a monitor-report email,
/// then returns the error — the caller (daemon loop) does not propagate it
/// further than logging; the process itself must stay up.
pub async fn run_cycle(
    client: &ClusterManagerClient,
    config: &SchedulerConfig,
    paths: &Paths,
) -> Result<CycleOutcome> {
    match run_cycle_inner(client, config, paths).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            warn!(error = %err, "cycle failed");
            if config.report.enable_monitor_report {
                if let Err(send_err) = report::send_monitor_report(config, &err).await {
                    warn!(error = %send_err, "failed to deliver monitor report");
                }
            }
            Err(err)
        }
    }
}

async fn run_cycle_inner(
    client: &ClusterManagerClient,
    config: &SchedulerConfig,
    paths: &Paths,
) -> Result<CycleOutcome> {
    // Steps 3/7 need the live pool tree up front for config validation too,
    // but validation of the scheduler's own options doesn't. Fetch config
    // first so step 1 can check pool bounds against the live tree, matching
    // `check_required_options(config, allocations)`'s signature.
    let engine_config = client.get_config("full").await?;
    let allocations = ScheduledAllocations::from_engine_config(&engine_config).map_err(Error::Parse)?;

    // 1. Validate.
    validate::check_required_options(config, &allocations)?;

    // 2. Health check.
    match unhealthy_reason(client, config).await {
        Ok(()) => {}
        Err(Error::HealthSkip(reason)) => {
            info!(reason = %reason, "skipping cycle");
            return Ok(CycleOutcome::Skipped { reason });
        }
        Err(err) => return Err(err),
    }

    // 4. Fetch queries over the trailing window.
    let now_ms = Utc::now().timestamp_millis();
    let window_start_ms = now_ms - config.schedule.fetch_queries_timedelta_minutes * 60_000;
    let timezone_offset = parse_timezone_offset(config.schedule.source_timezone_offset.as_deref())?;

    let strategy = resolve_strategy(&config.schedule.schedule_class_name)?;

    let records = fetch_queries_in_window(
        client,
        window_start_ms,
        now_ms,
        &config.schedule.fetch_queries_filter,
        timezone_offset,
    )
    .await?;

    if config.schedule.enable_fetch_queries_file {
        if let Err(err) = crate::query::aggregator::write_queries_csv(&records, &paths.log_dir(), now_ms) {
            warn!(error = %err, "failed to write query-info dump");
        }
    }

    // 5. Compute per-pool stats. `records` carry `start_time_ms` already
    // shifted by `timezone_offset` (see `query::aggregator::fetch_one`), so
    // the window bounds fed to the cursor math need the same shift to stay
    // on the same footing — the HTTP `from`/`to` params above must stay
    // true UTC, this pair must not.
    let (stats_window_start_ms, stats_now_ms) = match timezone_offset {
        Some(offset) => {
            let shift_ms = offset.local_minus_utc() as i64 * 1000;
            (window_start_ms + shift_ms, now_ms + shift_ms)
        }
        None => (window_start_ms, now_ms),
    };
    let pools_stat = strategy.compute_stats(&records, stats_window_start_ms, stats_now_ms);

    // 6. Build PoolInfo for scheduler-managed pools.
    let pools_info = build_pools_info(&allocations, config, &pools_stat);

    // 7. Compute target allocations.
    let opts = AllocationOptions {
        busy_threshold_secs: config.schedule.busy_pool_threshold_seconds as f64,
        free_ratio: config.schedule.free_memory_schedule_ratio,
        memory_unit_mb: config.schedule.schedule_memory_unit as f64,
    };
    let targets = strategy.compute_allocations(&opts, &pools_info);

    // 8. Validate targets; stop if nothing to do.
    if targets.is_empty() {
        return Ok(CycleOutcome::NoChange);
    }
    validate_targets(&targets, &pools_info)?;

    // 9. Apply: mutate, serialise, PUT, refresh.
    let mut allocations = allocations;
    for (pool, &mb) in &targets {
        allocations.update_pool_memory(pool, mb);
    }
    let document = allocations.serialise();
    client.update_config(&document).await?;
    client.refresh_pools().await?;

    info!(moves = ?targets, "applied reallocation");

    // 10. Optional schedule report.
    if config.report.enable_schedule_report {
        if let Err(err) = report::send_schedule_report(config, paths, &targets, &pools_info).await {
            warn!(error = %err, "failed to deliver schedule report");
        }
    }

    Ok(CycleOutcome::Applied { moves: targets })
}

/// Returns `Err(Error::HealthSkip(reason))` when the cluster isn't healthy
/// enough to schedule against this cycle; any other error is a genuine
/// transport failure and propagates as-is.
async fn unhealthy_reason(client: &ClusterManagerClient, config: &SchedulerConfig) -> Result<()> {
    let roles = client.get_roles().await?;
    let empty = Vec::new();
    let items = roles.get("items").and_then(Value::as_array).unwrap_or(&empty);

    let healthy_impalad = items
        .iter()
        .filter(|r| role_type(r) == Some(IMPALAD) && health_summary(r) == Some(HEALTH_GOOD))
        .count();
    let healthy_statestore = items
        .iter()
        .any(|r| role_type(r) == Some(STATESTORE) && health_summary(r) == Some(HEALTH_GOOD));

    if healthy_impalad as i64 <= config.schedule.schedule_available_impalad_threshold {
        return Err(Error::HealthSkip(format!(
            "only {healthy_impalad} healthy impalad roles, threshold is {}",
            config.schedule.schedule_available_impalad_threshold
        )));
    }
    if !healthy_statestore {
        return Err(Error::HealthSkip("no healthy statestore role".to_string()));
    }
    Ok(())
}

fn role_type(role: &Value) -> Option<&str> {
    role.get("type").and_then(Value::as_str)
}

fn health_summary(role: &Value) -> Option<&str> {
    role.get("healthSummary").and_then(Value::as_str)
}

fn parse_timezone_offset(raw: Option<&str>) -> Result<Option<FixedOffset>> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    // Accepts "+08:00" / "-05:00" style offsets.
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits = raw.trim_start_matches(['+', '-']);
    let mut parts = digits.split(':');
    let hours: i32 = parts
        .next()
        .and_then(|h| h.parse().ok())
        .ok_or_else(|| Error::Parse(format!("invalid source_timezone_offset: {raw}")))?;
    let minutes: i32 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    let total_secs = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_secs)
        .map(Some)
        .ok_or_else(|| Error::Parse(format!("invalid source_timezone_offset: {raw}")))
}
