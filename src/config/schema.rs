use std::collections::HashMap;

use serde::Deserialize;

/// Typed view of `conf/scheduler.yml`. Unlike the engine's pool tree (which
/// stays a dynamic `serde_json::Value` because its shape is recursive and
/// partially opaque), the scheduler's own configuration is small and fully
/// enumerated by spec, so a typed struct catches malformed config at parse
/// time instead of at first field access.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub cloudera_manager: ClouderaManagerSection,
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub pool: HashMap<String, PoolBoundsConfig>,
    pub email: Option<EmailSection>,
    pub report: ReportSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClouderaManagerSection {
    pub cluster_name: String,
    pub server_url: String,
    pub api_version: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default)]
    pub schedule_available_impalad_threshold: i64,
    pub schedule_interval_minutes: u64,
    pub schedule_memory_unit: i64,
    pub free_memory_schedule_ratio: f64,
    pub busy_pool_threshold_seconds: i64,
    pub fetch_queries_timedelta_minutes: i64,
    #[serde(default = "default_schedule_class_name")]
    pub schedule_class_name: String,
    #[serde(default)]
    pub fetch_queries_filter: String,
    #[serde(default)]
    pub enable_fetch_queries_file: bool,
    /// Fixed offset (e.g. "+08:00") applied to the manager's UTC timestamps
    /// before they reach the statistics engine. Empty/absent means no
    /// offset — the deployment-specific +8h the original hard-coded must
    /// now be requested explicitly. See SPEC_FULL.md §4.3.
    #[serde(default)]
    pub source_timezone_offset: Option<String>,
}

fn default_schedule_class_name() -> String {
    "priority".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoolBoundsConfig {
    pub min_mem: f64,
    pub max_mem: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSection {
    pub server: String,
    pub username: String,
    pub password: String,
    pub receivers: String,
}

impl EmailSection {
    pub fn receiver_list(&self) -> Vec<&str> {
        self.receivers.split(',').map(str::trim).collect()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReportSection {
    #[serde(default)]
    pub enable_schedule_report: bool,
    #[serde(default)]
    pub enable_monitor_report: bool,
}

impl ReportSection {
    pub fn depends_on_email(&self) -> bool {
        self.enable_schedule_report || self.enable_monitor_report
    }
}
