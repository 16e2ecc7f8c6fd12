//! Pluggable reallocation strategies (spec.md §9 "pluggable scheduling
//! strategy"). Selection is by string key against a static registry — no
//! runtime code loading, unlike the source's dynamic module import.

pub mod priority;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{ConfigError, Result};
use crate::pool::PoolInfo;
use crate::query::QueryRecord;
use crate::stats::{compute_pool_stats, PoolStat};

/// Tunables for Step A of the priority algorithm (spec.md §4.5); also used
/// as the generic knob set any strategy may consult.
#[derive(Debug, Clone, Copy)]
pub struct AllocationOptions {
    pub busy_threshold_secs: f64,
    pub free_ratio: f64,
    pub memory_unit_mb: f64,
}

pub trait ScheduleStrategy: Send + Sync {
    /// Default: the shared time-weighted statistics engine (spec.md §4.4).
    /// Strategies that don't need real stats (tests, the no-op strategies)
    /// may override this.
    fn compute_stats(
        &self,
        records: &[QueryRecord],
        window_start_ms: i64,
        window_end_ms: i64,
    ) -> HashMap<String, PoolStat> {
        compute_pool_stats(records, window_start_ms, window_end_ms)
    }

    fn compute_allocations(
        &self,
        opts: &AllocationOptions,
        pools_info: &HashMap<String, PoolInfo>,
    ) -> HashMap<String, f64>;
}

/// Never computes stats or allocations; used to exercise the orchestrator's
/// sequencing without the priority algorithm in the loop.
pub struct NoopStrategy;

impl ScheduleStrategy for NoopStrategy {
    fn compute_stats(&self, _: &[QueryRecord], _: i64, _: i64) -> HashMap<String, PoolStat> {
        HashMap::new()
    }

    fn compute_allocations(&self, _: &AllocationOptions, _: &HashMap<String, PoolInfo>) -> HashMap<String, f64> {
        HashMap::new()
    }
}

/// Uses the real statistics engine but never proposes a move; useful for
/// dry-run deployments that only want stats/reporting.
pub struct StatsOnlyStrategy;

impl ScheduleStrategy for StatsOnlyStrategy {
    fn compute_allocations(&self, _: &AllocationOptions, _: &HashMap<String, PoolInfo>) -> HashMap<String, f64> {
        HashMap::new()
    }
}

static REGISTRY: Lazy<HashMap<&'static str, fn() -> Box<dyn ScheduleStrategy>>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, fn() -> Box<dyn ScheduleStrategy>> = HashMap::new();
    m.insert("priority", || Box::new(priority::PriorityStrategy));
    m.insert("noop", || Box::new(NoopStrategy));
    m.insert("stats_only", || Box::new(StatsOnlyStrategy));
    m
});

/// Resolve a configured `schedule_class_name` against the static registry.
pub fn resolve_strategy(name: &str) -> Result<Box<dyn ScheduleStrategy>> {
    REGISTRY
        .get(name)
        .map(|ctor| ctor())
        .ok_or_else(|| ConfigError::EmptyOption {
            section: "schedule",
            option: "schedule_class_name",
            value: name.to_string(),
        }.into())
}

/// Post-condition check from spec.md §4.5: every proposed target must
/// bracket `[min_mem, max_mem]` and name a pool that actually exists.
/// Violations are `AllocationBug` — a fatal, abort-the-cycle condition.
pub fn validate_targets(
    targets: &HashMap<String, f64>,
    pools_info: &HashMap<String, PoolInfo>,
) -> Result<()> {
    for (pool, &target) in targets {
        let info = pools_info.get(pool).ok_or_else(|| {
            crate::error::Error::AllocationBug(format!("target references unknown pool {pool}"))
        })?;
        if target < info.bounds.min_mem_mb || target > info.bounds.max_mem_mb {
            return Err(crate::error::Error::AllocationBug(format!(
                "target {target} for pool {pool} violates bounds [{}, {}]",
                info.bounds.min_mem_mb, info.bounds.max_mem_mb
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_strategy_name_is_rejected() {
        assert!(resolve_strategy("does-not-exist").is_err());
    }

    #[test]
    fn priority_and_noop_are_registered() {
        assert!(resolve_strategy("priority").is_ok());
        assert!(resolve_strategy("noop").is_ok());
        assert!(resolve_strategy("stats_only").is_ok());
    }
}
