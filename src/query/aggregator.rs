//! Paged retrieval + detail enrichment (spec.md §4.3).

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::client::ClusterManagerClient;
use crate::error::Result;
use crate::query::QueryRecord;

static MEM_LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"MEM_LIMIT=(\d+)").unwrap());
static HOSTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"hosts=(\d+)").unwrap());

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Walk pages backwards from `window_end_ms` until the window is exhausted
/// or a page comes back empty, enrich each query with its details, then
/// drop duplicate `query_id`s (first occurrence wins).
pub async fn fetch_queries_in_window(
    client: &ClusterManagerClient,
    window_start_ms: i64,
    window_end_ms: i64,
    filter_str: &str,
    timezone_offset: Option<FixedOffset>,
) -> Result<Vec<QueryRecord>> {
    let mut accumulator: Vec<QueryRecord> = Vec::new();
    let mut cursor = window_end_ms;

    loop {
        if window_start_ms >= cursor {
            break;
        }

        let from = millis_to_datetime(window_start_ms);
        let to = millis_to_datetime(cursor);
        let page = client.get_queries(from, to, filter_str).await?;

        let entries = page
            .get("queries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if entries.is_empty() {
            break;
        }

        let raw: Vec<RawQuery> = entries.iter().filter_map(parse_raw_query).collect();
        if raw.is_empty() {
            break;
        }

        let min_start = raw.iter().map(|q| q.start_time_ms).min().unwrap();

        let detailed = join_all(raw.into_iter().map(|q| fetch_one(client, q, timezone_offset))).await;
        accumulator.extend(detailed);

        cursor = min_start - 1;
    }

    accumulator.sort_by(|a, b| a.query_id.cmp(&b.query_id));
    accumulator.dedup_by(|a, b| a.query_id == b.query_id);
    Ok(accumulator)
}

struct RawQuery {
    query_id: String,
    pool: String,
    start_time_ms: i64,
    admission_wait_ms: i64,
    duration_ms: i64,
}

fn parse_raw_query(entry: &Value) -> Option<RawQuery> {
    let query_id = entry.get("queryId")?.as_str()?.to_string();
    let start_time_ms = parse_manager_timestamp(entry.get("startTime")?.as_str()?)?;
    let duration_ms = entry.get("durationMillis").and_then(Value::as_i64).unwrap_or(0);
    let attributes = entry.get("attributes")?;
    let pool = attributes
        .get("pool")
        .and_then(Value::as_str)
        .unwrap_or("root.default")
        .to_string();
    let admission_wait_ms = attributes
        .get("admission_wait")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    Some(RawQuery { query_id, pool, start_time_ms, admission_wait_ms, duration_ms })
}

async fn fetch_one(
    client: &ClusterManagerClient,
    raw: RawQuery,
    timezone_offset: Option<FixedOffset>,
) -> QueryRecord {
    let (mem_limit_mb, max_hosts) = match client.get_query_details(&raw.query_id).await {
        Ok(details) => extract_details(&details),
        Err(err) => {
            warn!(query_id = %raw.query_id, error = %err, "query details fetch failed, using zeroed fallback");
            (0.0, 0)
        }
    };

    let start_time_ms = match timezone_offset {
        Some(offset) => raw.start_time_ms + offset.local_minus_utc() as i64 * 1000,
        None => raw.start_time_ms,
    };

    QueryRecord {
        query_id: raw.query_id,
        pool: raw.pool,
        start_time_ms,
        admission_wait_ms: raw.admission_wait_ms,
        duration_ms: raw.duration_ms,
        mem_limit_mb,
        max_hosts,
    }
}

/// Extracts `MEM_LIMIT=<bytes>` (converted to MB) and the *maximum*
/// `hosts=<n>` occurrence from the `"details"` string field of the query
/// details response. Falls back to `(0.0, 0)` when that field is absent or
/// isn't a string.
fn extract_details(details: &Value) -> (f64, u32) {
    let Some(text) = details.get("details").and_then(Value::as_str) else {
        return (0.0, 0);
    };

    let mem_limit_mb = MEM_LIMIT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|bytes| bytes / BYTES_PER_MB)
        .unwrap_or(0.0);

    let max_hosts = HOSTS_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    (mem_limit_mb, max_hosts)
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
}

fn parse_manager_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// Optional dump of the fetched window to `data-<timestamp>.csv`, gated on
/// `schedule.enable_fetch_queries_file`.
pub fn write_queries_csv(records: &[QueryRecord], dir: &str, timestamp_ms: i64) -> Result<()> {
    let path = Path::new(dir).join(format!("data-{timestamp_ms}.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .map_err(|e| crate::error::Error::Parse(format!("failed to open {}: {e}", path.display())))?;

    writer
        .write_record(["query_id", "pool", "start_time_ms", "admission_wait_ms", "duration_ms", "mem_limit_mb", "max_hosts"])
        .map_err(|e| crate::error::Error::Parse(e.to_string()))?;

    for record in records {
        writer
            .write_record([
                record.query_id.as_str(),
                record.pool.as_str(),
                &record.start_time_ms.to_string(),
                &record.admission_wait_ms.to_string(),
                &record.duration_ms.to_string(),
                &record.mem_limit_mb.to_string(),
                &record.max_hosts.to_string(),
            ])
            .map_err(|e| crate::error::Error::Parse(e.to_string()))?;
    }

    writer.flush().map_err(|e| crate::error::Error::Parse(e.to_string()))?;
    Ok(())
}
