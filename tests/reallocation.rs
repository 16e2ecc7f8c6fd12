//! Cross-module invariants from spec.md §8, driven through the public
//! pool/stats/schedule pipeline rather than any single module's unit tests.

use std::collections::HashMap;

use impala_pool_scheduler::pool::tree::ScheduledAllocations;
use impala_pool_scheduler::pool::{build_pools_info, PoolInfo};
use impala_pool_scheduler::query::QueryRecord;
use impala_pool_scheduler::schedule::priority::PriorityStrategy;
use impala_pool_scheduler::schedule::{validate_targets, AllocationOptions, ScheduleStrategy};
use impala_pool_scheduler::stats::compute_pool_stats;
use serde_json::json;

fn engine_config() -> serde_json::Value {
    json!({
        "items": [{
            "name": "impala_scheduled_allocations",
            "value": serde_json::to_string(&json!({
                "queues": [{
                    "name": "root",
                    "queues": [
                        { "name": "p1", "queues": [], "schedulablePropertiesList": [
                            { "impalaMaxMemory": 1000.0, "weight": 1.0 }
                        ]},
                        { "name": "p2", "queues": [], "schedulablePropertiesList": [
                            { "impalaMaxMemory": 1000.0, "weight": 1.0 }
                        ]},
                    ],
                }]
            })).unwrap(),
        }]
    })
}

fn record(pool: &str, start: i64, wait: i64, duration: i64, mem_mb: f64, hosts: u32) -> QueryRecord {
    QueryRecord {
        query_id: format!("{pool}-{start}"),
        pool: pool.to_string(),
        start_time_ms: start,
        admission_wait_ms: wait,
        duration_ms: duration,
        mem_limit_mb: mem_mb,
        max_hosts: hosts,
    }
}

#[test]
fn full_cycle_produces_a_valid_conservative_reallocation() {
    let allocations = ScheduledAllocations::from_engine_config(&engine_config()).unwrap();

    let records = vec![
        // root.p1 is busy: 10s wait, 100MB*1 host effective memory.
        record("root.p1", 0, 10_000, 10_000, 100.0, 1),
        // root.p2 is idle: no wait, some running usage.
        record("root.p2", 0, 0, 10_000, 100.0, 1),
    ];

    let pools_stat = compute_pool_stats(&records, 0, 20_000);

    let mut pool_bounds = HashMap::new();
    pool_bounds.insert(
        "root.p1".to_string(),
        impala_pool_scheduler::config::schema::PoolBoundsConfig { min_mem: 100.0, max_mem: 2000.0 },
    );
    pool_bounds.insert(
        "root.p2".to_string(),
        impala_pool_scheduler::config::schema::PoolBoundsConfig { min_mem: 100.0, max_mem: 2000.0 },
    );

    let scheduler_config = test_scheduler_config(pool_bounds);
    let pools_info: HashMap<String, PoolInfo> = build_pools_info(&allocations, &scheduler_config, &pools_stat);
    assert_eq!(pools_info.len(), 2);

    let opts = AllocationOptions { busy_threshold_secs: 10.0, free_ratio: 1.0, memory_unit_mb: 100.0 };
    let targets = PriorityStrategy.compute_allocations(&opts, &pools_info);

    assert!(!targets.is_empty());
    validate_targets(&targets, &pools_info).expect("targets must satisfy pool bounds");

    // Invariant: sum of changes is zero.
    let mut sum = 0.0;
    let mut givers = 0;
    let mut takers = 0;
    for (pool, &target) in &targets {
        let current = pools_info[pool].current_mem_mb;
        let delta = target - current;
        assert_eq!(delta % 100.0, 0.0, "every change must be a multiple of the memory unit");
        sum += delta;
        if delta > 0.0 {
            takers += 1;
        } else if delta < 0.0 {
            givers += 1;
        }
    }
    assert!(sum.abs() < 1e-9, "transfers must be conservative");
    assert_eq!(givers, 1);
    assert_eq!(takers, 1);

    // Invariant: no pool both gives and receives within one cycle — each
    // pool appears in `targets` with exactly one direction of change.
    assert_eq!(targets.get("root.p1"), Some(&1100.0));
    assert_eq!(targets.get("root.p2"), Some(&900.0));
}

#[test]
fn pool_tree_round_trip_then_reallocate_is_stable() {
    let mut allocations = ScheduledAllocations::from_engine_config(&engine_config()).unwrap();
    allocations.update_pool_memory("root.p1", 1100.0);
    allocations.update_pool_memory("root.p2", 900.0);

    let reserialised = allocations.serialise();
    let reparsed = ScheduledAllocations::from_engine_config(&reserialised).unwrap();

    assert_eq!(reparsed.get_pool("root.p1").unwrap().max_memory_mb(), 1100.0);
    assert_eq!(reparsed.get_pool("root.p2").unwrap().max_memory_mb(), 900.0);
}

fn test_scheduler_config(
    pool: HashMap<String, impala_pool_scheduler::config::schema::PoolBoundsConfig>,
) -> impala_pool_scheduler::config::SchedulerConfig {
    use impala_pool_scheduler::config::schema::{
        ClouderaManagerSection, ReportSection, ScheduleSection,
    };

    impala_pool_scheduler::config::SchedulerConfig {
        cloudera_manager: ClouderaManagerSection {
            cluster_name: "cluster".into(),
            server_url: "http://cm.example".into(),
            api_version: "v41".into(),
            username: "admin".into(),
            password: "secret".into(),
        },
        schedule: ScheduleSection {
            schedule_available_impalad_threshold: 1,
            schedule_interval_minutes: 10,
            schedule_memory_unit: 100,
            free_memory_schedule_ratio: 1.0,
            busy_pool_threshold_seconds: 10,
            fetch_queries_timedelta_minutes: 10,
            schedule_class_name: "priority".into(),
            fetch_queries_filter: String::new(),
            enable_fetch_queries_file: false,
            source_timezone_offset: None,
        },
        pool,
        email: None,
        report: ReportSection { enable_schedule_report: false, enable_monitor_report: false },
    }
}
