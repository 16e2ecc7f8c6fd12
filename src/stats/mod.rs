//! Port of `scheduler/base_schedule.py::AbstractSchedule.get_pools_stat`:
//! turns a window of `QueryRecord`s into per-pool time-weighted metrics.

use std::collections::HashMap;

use crate::query::QueryRecord;

/// Per-pool, per-window metrics. `used_mem_avg_mb`/`wait_mem_avg_mb` are
/// truncated to integers, matching the original's `int(...)` averages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStat {
    pub query_total: u64,
    pub wait_query_total: u64,
    pub run_secs: f64,
    pub wait_secs: f64,
    pub used_mem_avg_mb: i64,
    pub wait_mem_avg_mb: i64,
}

/// Compute per-pool statistics over `[window_start_ms, window_end_ms]`.
/// Records are grouped by pool, sorted ascending by `start_time_ms`
/// (stable — ties keep their relative order), then walked with a
/// high-water-mark cursor so overlapping intervals contribute only their
/// non-overlapping wall-clock portion.
pub fn compute_pool_stats(
    records: &[QueryRecord],
    window_start_ms: i64,
    window_end_ms: i64,
) -> HashMap<String, PoolStat> {
    let mut by_pool: HashMap<&str, Vec<&QueryRecord>> = HashMap::new();
    for record in records {
        by_pool.entry(record.pool.as_str()).or_default().push(record);
    }

    let mut result = HashMap::with_capacity(by_pool.len());

    for (pool, mut group) in by_pool {
        group.sort_by_key(|r| r.start_time_ms);

        let mut query_total: u64 = 0;
        let mut wait_query_total: u64 = 0;
        let mut wait_mem_total: f64 = 0.0;
        let mut used_mem_total: f64 = 0.0;
        let mut wait_ms: i64 = 0;
        let mut run_ms: i64 = 0;
        let mut wait_cursor: i64 = 0;
        let mut run_cursor: i64 = 0;

        for record in group {
            let s = record.start_time_ms;
            let w = record.admission_wait_ms;
            let d = record.duration_ms;
            let mem = record.mem_limit_mb * record.max_hosts as f64;

            query_total += 1;
            if w > 0 {
                wait_query_total += 1;
            }

            let wait_start = s.max(window_start_ms);
            let wait_end = (s + w).min(window_end_ms);
            if wait_end > wait_start {
                wait_mem_total += mem * (wait_end - wait_start) as f64;

                let delta = wait_end - wait_start.max(wait_cursor);
                if delta > 0 {
                    wait_ms += delta;
                    wait_cursor = wait_end;
                }
            }

            let run_start = (s + w).max(window_start_ms);
            let run_end = (s + w + d).min(window_end_ms);
            // The original accumulates `mem * (run_end - run_start)` even
            // when negative (run_end < run_start). That's a bug, not a
            // signal — clamp each contribution at zero (SPEC_FULL.md §9).
            let run_overlap_ms = (run_end - run_start).max(0);
            used_mem_total += mem * run_overlap_ms as f64;

            let delta = run_end - run_start.max(run_cursor);
            if delta > 0 {
                run_ms += delta;
                run_cursor = run_end;
            }
        }

        let wait_mem_avg_mb = if wait_ms == 0 { 0 } else { (wait_mem_total / wait_ms as f64) as i64 };
        let used_mem_avg_mb = if run_ms == 0 { 0 } else { (used_mem_total / run_ms as f64) as i64 };

        result.insert(
            pool.to_string(),
            PoolStat {
                query_total,
                wait_query_total,
                run_secs: run_ms as f64 / 1000.0,
                wait_secs: wait_ms as f64 / 1000.0,
                used_mem_avg_mb,
                wait_mem_avg_mb,
            },
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pool: &str, start: i64, wait: i64, duration: i64, mem_mb: f64, hosts: u32) -> QueryRecord {
        QueryRecord {
            query_id: format!("q-{start}"),
            pool: pool.to_string(),
            start_time_ms: start,
            admission_wait_ms: wait,
            duration_ms: duration,
            mem_limit_mb: mem_mb,
            max_hosts: hosts,
        }
    }

    #[test]
    fn empty_input_yields_empty_map() {
        let stats = compute_pool_stats(&[], 0, 1000);
        assert!(stats.is_empty());
    }

    #[test]
    fn query_entirely_outside_window_contributes_nothing() {
        let records = vec![record("root.p1", -10_000, 0, 100, 10.0, 1)];
        let stats = compute_pool_stats(&records, 0, 1000);
        let stat = &stats["root.p1"];
        assert_eq!(stat.run_secs, 0.0);
        assert_eq!(stat.wait_secs, 0.0);
        assert_eq!(stat.query_total, 1);
    }

    #[test]
    fn query_straddling_one_boundary_is_clipped() {
        // start=-5000ms, wait=0, duration=10000ms -> runs from -5000..5000,
        // window is [0, 1000], so only 0..1000 (1s) counts.
        let records = vec![record("root.p1", -5_000, 0, 10_000, 100.0, 1)];
        let stats = compute_pool_stats(&records, 0, 1_000);
        let stat = &stats["root.p1"];
        assert_eq!(stat.run_secs, 1.0);
        assert_eq!(stat.used_mem_avg_mb, 100);
    }

    #[test]
    fn avg_zero_iff_secs_zero() {
        let records = vec![record("root.p1", 0, 0, 0, 100.0, 1)];
        let stats = compute_pool_stats(&records, 0, 1_000);
        let stat = &stats["root.p1"];
        assert_eq!(stat.run_secs, 0.0);
        assert_eq!(stat.used_mem_avg_mb, 0);
        assert_eq!(stat.wait_secs, 0.0);
        assert_eq!(stat.wait_mem_avg_mb, 0);
    }

    #[test]
    fn deterministic_across_repeated_runs() {
        let records = vec![
            record("root.p1", 100, 50, 200, 10.0, 2),
            record("root.p1", 0, 10, 100, 5.0, 1),
            record("root.p2", 20, 0, 300, 20.0, 1),
        ];
        let a = compute_pool_stats(&records, 0, 1000);
        let b = compute_pool_stats(&records, 0, 1000);
        assert_eq!(a["root.p1"], b["root.p1"]);
        assert_eq!(a["root.p2"], b["root.p2"]);
    }

    #[test]
    fn scenario_busy_pool_matches_scenario_one_stats() {
        // Scenario 1 from spec.md §8: p1 run=10s wait=10s used=100 wait_mem=100.
        // One record: wait 10_000ms, run 10_000ms, mem*hosts = 100.
        let records = vec![record("p1", 0, 10_000, 10_000, 100.0, 1)];
        let stats = compute_pool_stats(&records, 0, 20_000);
        let stat = &stats["p1"];
        assert_eq!(stat.wait_secs, 10.0);
        assert_eq!(stat.run_secs, 10.0);
        assert_eq!(stat.wait_mem_avg_mb, 100);
        assert_eq!(stat.used_mem_avg_mb, 100);
    }
}
