pub mod tree;

use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::stats::PoolStat;
use tree::ScheduledAllocations;

/// Min/max memory bounds configured for one pool under the scheduler's
/// `pool` section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolBounds {
    pub min_mem_mb: f64,
    pub max_mem_mb: f64,
}

/// Aggregate of engine configuration, scheduler-configured bounds, and
/// observed statistics for one pool in one cycle.
#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub name: String,
    pub current_mem_mb: f64,
    pub weight: f64,
    pub bounds: PoolBounds,
    pub stat: PoolStat,
}

/// Build `PoolInfo` for every pool named under the scheduler's `pool`
/// section, skipping pools the scheduler doesn't manage. Pools present in
/// `pools_stat` but absent from the scheduler config are not surfaced here.
pub fn build_pools_info(
    allocations: &ScheduledAllocations,
    scheduler_config: &SchedulerConfig,
    pools_stat: &HashMap<String, PoolStat>,
) -> HashMap<String, PoolInfo> {
    let mut pools_info = HashMap::with_capacity(scheduler_config.pool.len());

    for (pool_name, bounds) in &scheduler_config.pool {
        let Some(config) = allocations.get_pool(pool_name) else {
            continue;
        };
        let stat = pools_stat.get(pool_name).cloned().unwrap_or_default();
        pools_info.insert(
            pool_name.clone(),
            PoolInfo {
                name: pool_name.clone(),
                current_mem_mb: config.max_memory_mb(),
                weight: config.weight(),
                bounds: PoolBounds {
                    min_mem_mb: bounds.min_mem,
                    max_mem_mb: bounds.max_mem,
                },
                stat,
            },
        );
    }

    pools_info
}
