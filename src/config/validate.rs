//! Port of `scheduler/check.py`: required-section/option checks, pool bound
//! checks, and the email-required-iff-report-enabled rule.

use crate::config::SchedulerConfig;
use crate::error::ConfigError;
use crate::pool::tree::ScheduledAllocations;

/// Sections/options a `scheduler.yml` must carry. `cloudera_manager`,
/// `pool`, and `report` are structurally required by `SchedulerConfig`'s
/// deserialisation (a malformed or absent section fails to parse at all);
/// the checks below cover the value-level rules serde's `#[derive]` can't
/// express: non-empty strings and numeric ranges.
pub fn check_cloudera_manager_options(config: &SchedulerConfig) -> Result<(), ConfigError> {
    let section = &config.cloudera_manager;
    let checks: [(&'static str, &str); 5] = [
        ("cluster_name", &section.cluster_name),
        ("server_url", &section.server_url),
        ("api_version", &section.api_version),
        ("username", &section.username),
        ("password", &section.password),
    ];
    for (option, value) in checks {
        if value.is_empty() {
            return Err(ConfigError::EmptyOption {
                section: "cloudera_manager",
                option,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

pub fn check_schedule_options(config: &SchedulerConfig) -> Result<(), ConfigError> {
    let schedule = &config.schedule;

    if schedule.schedule_interval_minutes == 0 {
        return Err(ConfigError::EmptyOption {
            section: "schedule",
            option: "schedule_interval_minutes",
            value: "0".to_string(),
        });
    }
    if schedule.schedule_memory_unit <= 0 {
        return Err(ConfigError::EmptyOption {
            section: "schedule",
            option: "schedule_memory_unit",
            value: schedule.schedule_memory_unit.to_string(),
        });
    }
    if schedule.fetch_queries_timedelta_minutes <= 0 {
        return Err(ConfigError::EmptyOption {
            section: "schedule",
            option: "fetch_queries_timedelta_minutes",
            value: schedule.fetch_queries_timedelta_minutes.to_string(),
        });
    }
    if schedule.busy_pool_threshold_seconds <= 0 {
        return Err(ConfigError::EmptyOption {
            section: "schedule",
            option: "busy_pool_threshold_seconds",
            value: schedule.busy_pool_threshold_seconds.to_string(),
        });
    }
    if !(0.0 < schedule.free_memory_schedule_ratio && schedule.free_memory_schedule_ratio <= 1.0) {
        return Err(ConfigError::OutOfRange {
            section: "schedule",
            option: "free_memory_schedule_ratio",
            value: schedule.free_memory_schedule_ratio,
        });
    }
    Ok(())
}

pub fn check_pool_options(
    allocations: &ScheduledAllocations,
    config: &SchedulerConfig,
) -> Result<(), ConfigError> {
    let pool_names = allocations.pool_names();

    for (pool_name, bounds) in &config.pool {
        if !pool_names.iter().any(|n| n == pool_name) {
            return Err(ConfigError::UnknownPool(pool_name.clone()));
        }

        let current = allocations
            .get_pool(pool_name)
            .map(|p| p.max_memory_mb())
            .unwrap_or(0.0);

        if !(0.0 < bounds.min_mem && bounds.min_mem <= current && current <= bounds.max_mem) {
            return Err(ConfigError::PoolBounds {
                pool: pool_name.clone(),
                min_mem: bounds.min_mem,
                current,
                max_mem: bounds.max_mem,
            });
        }
    }
    Ok(())
}

pub fn check_email_options(config: &SchedulerConfig) -> Result<(), ConfigError> {
    let Some(email) = &config.email else {
        return Err(ConfigError::MissingSection("email"));
    };
    let checks: [(&'static str, &str); 4] = [
        ("server", &email.server),
        ("username", &email.username),
        ("password", &email.password),
        ("receivers", &email.receivers),
    ];
    for (option, value) in checks {
        if value.is_empty() {
            return Err(ConfigError::EmptyOption {
                section: "email",
                option,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Email options are required iff any report option is truthy.
pub fn check_report_options(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.report.depends_on_email() {
        check_email_options(config)?;
    }
    Ok(())
}

/// Full validation pass: cloudera_manager/schedule value checks, pool
/// membership + bound checks against the engine's live pool tree, and the
/// email-iff-report rule. Mirrors `check.check_required_options`.
pub fn check_required_options(
    config: &SchedulerConfig,
    allocations: &ScheduledAllocations,
) -> Result<(), ConfigError> {
    check_cloudera_manager_options(config)?;
    check_schedule_options(config)?;
    check_pool_options(allocations, config)?;
    check_report_options(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        ClouderaManagerSection, EmailSection, PoolBoundsConfig, ReportSection, ScheduleSection,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn base_config() -> SchedulerConfig {
        SchedulerConfig {
            cloudera_manager: ClouderaManagerSection {
                cluster_name: "cluster".into(),
                server_url: "http://cm.example".into(),
                api_version: "v41".into(),
                username: "admin".into(),
                password: "secret".into(),
            },
            schedule: ScheduleSection {
                schedule_available_impalad_threshold: 1,
                schedule_interval_minutes: 30,
                schedule_memory_unit: 1024,
                free_memory_schedule_ratio: 0.8,
                busy_pool_threshold_seconds: 10,
                fetch_queries_timedelta_minutes: 30,
                schedule_class_name: "priority".into(),
                fetch_queries_filter: String::new(),
                enable_fetch_queries_file: false,
                source_timezone_offset: None,
            },
            pool: HashMap::from([(
                "root.default".to_string(),
                PoolBoundsConfig { min_mem: 100.0, max_mem: 2000.0 },
            )]),
            email: None,
            report: ReportSection { enable_schedule_report: false, enable_monitor_report: false },
        }
    }

    fn sample_allocations() -> ScheduledAllocations {
        let engine_config = json!({
            "items": [{
                "name": "impala_scheduled_allocations",
                "value": serde_json::to_string(&json!({
                    "queues": [{
                        "name": "root",
                        "queues": [{
                            "name": "default",
                            "queues": [],
                            "schedulablePropertiesList": [
                                { "impalaMaxMemory": 1000.0, "weight": 1.0 }
                            ],
                        }],
                    }]
                })).unwrap(),
            }]
        });
        ScheduledAllocations::from_engine_config(&engine_config).unwrap()
    }

    #[test]
    fn zero_busy_pool_threshold_is_rejected() {
        let mut config = base_config();
        config.schedule.busy_pool_threshold_seconds = 0;
        assert!(matches!(
            check_schedule_options(&config),
            Err(ConfigError::EmptyOption { option: "busy_pool_threshold_seconds", .. })
        ));
    }

    #[test]
    fn free_memory_ratio_out_of_range_is_rejected() {
        let mut config = base_config();
        config.schedule.free_memory_schedule_ratio = 1.5;
        assert!(matches!(
            check_schedule_options(&config),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_pool_is_rejected() {
        let mut config = base_config();
        config.pool.insert(
            "root.ghost".to_string(),
            PoolBoundsConfig { min_mem: 1.0, max_mem: 2.0 },
        );
        let allocations = sample_allocations();
        assert!(matches!(
            check_pool_options(&allocations, &config),
            Err(ConfigError::UnknownPool(_))
        ));
    }

    #[test]
    fn pool_bounds_must_bracket_current_memory() {
        let config = base_config();
        let allocations = sample_allocations();
        assert!(check_pool_options(&allocations, &config).is_ok());
    }

    #[test]
    fn report_enabled_requires_email_section() {
        let mut config = base_config();
        config.report.enable_schedule_report = true;
        assert!(matches!(
            check_report_options(&config),
            Err(ConfigError::MissingSection("email"))
        ));
    }

    #[test]
    fn report_disabled_does_not_require_email() {
        let config = base_config();
        assert!(check_report_options(&config).is_ok());
    }

    #[test]
    fn email_required_fields_must_be_non_empty() {
        let mut config = base_config();
        config.email = Some(EmailSection {
            server: "smtp.example".into(),
            username: String::new(),
            password: "pw".into(),
            receivers: "a@example.com".into(),
        });
        assert!(matches!(
            check_email_options(&config),
            Err(ConfigError::EmptyOption { option: "username", .. })
        ));
    }
}
