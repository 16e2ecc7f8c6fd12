//! Port of `scheduler/daemon.py` + the `start|stop|restart|check|backup|
//! rollback` CLI surface (spec.md §6, §9 "Daemonisation").
//!
//! The source forks, calls `setsid`, and detaches from the controlling
//! terminal. Rust's async runtime doesn't tolerate fork-after-threads-
//! spawned, so `start` runs in the foreground under whatever process
//! supervisor the deployment uses (systemd, a container runtime). The
//! PID-file contention check is preserved so existing tooling that polls
//! for the file still works.

use std::io::Write as _;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::client::ClusterManagerClient;
use crate::config::{Paths, SchedulerConfig};
use crate::config::validate;
use crate::error::{Error, Result};
use crate::orchestrator::{self, CycleOutcome};
use crate::pool::tree::ScheduledAllocations;

const EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
const DATA_FILE_PREFIX: &str = "data-";

fn read_pid_file(path: &str) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Mirrors the original's "refuse to start if the PID file exists and is
/// non-empty" contention guard.
fn pid_file_contended(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn write_pid_file(path: &str) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .map_err(|e| Error::Parse(format!("failed to create pid file {path}: {e}")))?;
    write!(file, "{}", std::process::id())
        .map_err(|e| Error::Parse(format!("failed to write pid file {path}: {e}")))?;
    Ok(())
}

/// Run the periodic reallocation loop in the foreground. Cycles never
/// overlap: the interval tick is skipped (not queued) if a cycle is still
/// running, and a cycle failure never terminates the loop (spec.md §7's
/// "stay up" resolution of the open failure-policy question).
pub async fn start(client: ClusterManagerClient, config: SchedulerConfig, paths: Paths) -> Result<()> {
    let pid_path = paths.pid_file_path();
    if pid_file_contended(&pid_path) {
        return Err(Error::Parse(format!(
            "refusing to start: pid file {pid_path} already exists and is non-empty"
        )));
    }
    write_pid_file(&pid_path)?;

    let mut interval = tokio::time::interval(Duration::from_secs(config.schedule.schedule_interval_minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut shutdown = shutdown_signal();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match orchestrator::run_cycle(&client, &config, &paths).await {
                    Ok(CycleOutcome::NoChange) => info!("cycle completed: no change needed"),
                    Ok(CycleOutcome::Applied { moves }) => info!(?moves, "cycle completed: reallocation applied"),
                    Ok(CycleOutcome::Skipped { reason }) => info!(%reason, "cycle skipped"),
                    Err(err) => warn!(error = %err, "cycle aborted, daemon remains up"),
                }
                if let Err(err) = clean_expired_files(&paths.log_dir()) {
                    warn!(error = %err, "failed to clean expired data files");
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&pid_path);
    Ok(())
}

#[cfg(unix)]
fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

/// Read the PID file, send `SIGTERM`, and remove the file. Errors if no PID
/// file is present.
pub fn stop(paths: &Paths) -> Result<()> {
    let pid_path = paths.pid_file_path();
    let pid = read_pid_file(&pid_path)
        .ok_or_else(|| Error::Parse(format!("no pid file at {pid_path}")))?;
    signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|e| Error::Parse(format!("failed to signal pid {pid}: {e}")))?;
    std::fs::remove_file(&pid_path).ok();
    Ok(())
}

pub async fn restart(client: ClusterManagerClient, config: SchedulerConfig, paths: Paths) -> Result<()> {
    if let Err(err) = stop(&paths) {
        warn!(error = %err, "stop before restart reported an error, continuing");
    }
    start(client, config, paths).await
}

/// Full config validation against the engine's live pool tree.
pub async fn check(client: &ClusterManagerClient, config: &SchedulerConfig) -> Result<()> {
    let engine_config = client.get_config("full").await?;
    let allocations = ScheduledAllocations::from_engine_config(&engine_config).map_err(Error::Parse)?;
    validate::check_required_options(config, &allocations)?;
    info!("configuration is valid");
    Ok(())
}

/// Write the current engine config (`view=full`) to the backup path.
pub async fn backup(client: &ClusterManagerClient, paths: &Paths) -> Result<()> {
    let engine_config = client.get_config("full").await?;
    let json = serde_json::to_string_pretty(&engine_config)
        .map_err(|e| Error::Parse(format!("failed to serialise backup: {e}")))?;
    std::fs::write(paths.impala_config_backup_path(), json)
        .map_err(|e| Error::Parse(format!("failed to write backup: {e}")))?;
    info!(path = %paths.impala_config_backup_path(), "engine config backed up");
    Ok(())
}

/// Read the backup file, PUT it back to the engine, and refresh pools.
pub async fn rollback(client: &ClusterManagerClient, paths: &Paths) -> Result<()> {
    let raw = std::fs::read_to_string(paths.impala_config_backup_path())
        .map_err(|e| Error::Parse(format!("failed to read backup: {e}")))?;
    let document: Value =
        serde_json::from_str(&raw).map_err(|e| Error::Parse(format!("malformed backup json: {e}")))?;

    // Parse-validate: the backup must resolve to a scheduled-allocations
    // document before we're willing to push it back.
    ScheduledAllocations::from_engine_config(&document).map_err(Error::Parse)?;

    client.update_config(&document).await?;
    client.refresh_pools().await?;
    info!("rollback applied");
    Ok(())
}

/// Remove `data-*` dumps older than one day from `log_dir`.
fn clean_expired_files(log_dir: &str) -> Result<()> {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(DATA_FILE_PREFIX) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        if modified.elapsed().map(|age| age > EXPIRY).unwrap_or(false) {
            let _ = std::fs::remove_file(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn pid_file_contention_is_false_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        assert!(!pid_file_contended(path.to_str().unwrap()));
    }

    #[test]
    fn pid_file_contention_is_true_when_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "12345").unwrap();
        assert!(pid_file_contended(path.to_str().unwrap()));
    }

    #[test]
    fn pid_file_contention_is_false_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "").unwrap();
        assert!(!pid_file_contended(path.to_str().unwrap()));
    }

    #[test]
    fn write_then_read_pid_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        write_pid_file(path.to_str().unwrap()).unwrap();
        let pid = read_pid_file(path.to_str().unwrap()).unwrap();
        assert_eq!(pid as u32, std::process::id());
    }

    #[test]
    fn clean_expired_files_removes_only_old_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("data-fresh.csv");
        let unrelated = dir.path().join("scheduler.yml");
        std::fs::write(&fresh, "x").unwrap();
        std::fs::write(&unrelated, "x").unwrap();

        clean_expired_files(dir.path().to_str().unwrap()).unwrap();

        assert!(fresh.exists());
        assert!(unrelated.exists());
        let _ = SystemTime::now();
    }
}
