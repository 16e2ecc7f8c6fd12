//! Port of `scheduler/base_schedule.py::AbstractSchedule.get_queries_info`:
//! paged retrieval of completed/running queries plus per-query detail
//! lookups to recover `MEM_LIMIT` and `hosts` from free-form profile text.

pub mod aggregator;

/// One admission-controlled query observed in a fetch window.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub query_id: String,
    pub pool: String,
    pub start_time_ms: i64,
    pub admission_wait_ms: i64,
    pub duration_ms: i64,
    pub mem_limit_mb: f64,
    pub max_hosts: u32,
}
