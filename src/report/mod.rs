//! Port of `scheduler/global_utils.py`'s email helpers: HTML report
//! rendering (handlebars replaces the original's Tornado `Template`) and
//! SMTP delivery for schedule/monitor reports.

use std::collections::HashMap;

use chrono::Utc;
use handlebars::Handlebars;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use tracing::info;

use crate::config::{Paths, SchedulerConfig};
use crate::error::{Error, Result};
use crate::pool::PoolInfo;

const DEFAULT_SCHEDULE_TEMPLATE: &str = r#"<html><body>
<h2>Pool reallocation — {{generated_at}}</h2>
<table border="1" cellpadding="4">
<tr><th>Pool</th><th>Previous (MB)</th><th>New (MB)</th><th>Delta (MB)</th></tr>
{{#each moves}}
<tr><td>{{pool}}</td><td>{{previous}}</td><td>{{target}}</td><td>{{delta}}</td></tr>
{{/each}}
</table>
</body></html>"#;

#[derive(Serialize)]
struct MoveRow {
    pool: String,
    previous: f64,
    target: f64,
    delta: f64,
}

#[derive(Serialize)]
struct ScheduleReportData {
    generated_at: String,
    moves: Vec<MoveRow>,
}

fn build_transport(config: &SchedulerConfig) -> Result<SmtpTransport> {
    let email = config
        .email
        .as_ref()
        .ok_or_else(|| Error::Delivery("report enabled but [email] section missing".to_string()))?;

    let creds = Credentials::new(email.username.clone(), email.password.clone());
    let transport = SmtpTransport::relay(&email.server)
        .map_err(|e| Error::Delivery(format!("failed to build SMTP relay to {}: {e}", email.server)))?
        .credentials(creds)
        .build();

    Ok(transport)
}

fn send(config: &SchedulerConfig, subject: &str, html_body: String) -> Result<()> {
    let email = config
        .email
        .as_ref()
        .ok_or_else(|| Error::Delivery("report enabled but [email] section missing".to_string()))?;
    let transport = build_transport(config)?;

    let mut builder = Message::builder()
        .from(email.username.parse().map_err(|e| Error::Delivery(format!("invalid from address: {e}")))?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);

    for receiver in email.receiver_list() {
        let mailbox = receiver
            .parse()
            .map_err(|e| Error::Delivery(format!("invalid receiver address {receiver}: {e}")))?;
        builder = builder.to(mailbox);
    }

    let message = builder
        .body(html_body)
        .map_err(|e| Error::Delivery(format!("failed to build message: {e}")))?;

    transport
        .send(&message)
        .map_err(|e| Error::Delivery(format!("SMTP send failed: {e}")))?;

    info!(subject, "report email sent");
    Ok(())
}

/// Render and email the per-cycle reallocation summary, when
/// `report.enable_schedule_report` is set.
pub async fn send_schedule_report(
    config: &SchedulerConfig,
    paths: &Paths,
    targets: &HashMap<String, f64>,
    pools_info: &HashMap<String, PoolInfo>,
) -> Result<()> {
    let template = std::fs::read_to_string(paths.report_template_path())
        .unwrap_or_else(|_| DEFAULT_SCHEDULE_TEMPLATE.to_string());

    let mut moves: Vec<MoveRow> = targets
        .iter()
        .map(|(pool, &target)| {
            let previous = pools_info.get(pool).map(|p| p.current_mem_mb).unwrap_or(0.0);
            MoveRow { pool: pool.clone(), previous, target, delta: target - previous }
        })
        .collect();
    moves.sort_by(|a, b| a.pool.cmp(&b.pool));

    let data = ScheduleReportData { generated_at: Utc::now().to_rfc3339(), moves };

    let handlebars = Handlebars::new();
    let html = handlebars
        .render_template(&template, &data)
        .map_err(|e| Error::Delivery(format!("failed to render schedule report: {e}")))?;

    let config = config.clone();
    tokio::task::spawn_blocking(move || send(&config, "Impala pool reallocation report", html))
        .await
        .map_err(|e| Error::Delivery(format!("report send task panicked: {e}")))??;

    Ok(())
}

/// Email a failure/monitor report for a fatal cycle error, when
/// `report.enable_monitor_report` is set.
pub async fn send_monitor_report(config: &SchedulerConfig, error: &crate::error::Error) -> Result<()> {
    let html = format!("<html><body><h2>Scheduler cycle failed</h2><pre>{error}</pre></body></html>");
    let config = config.clone();
    tokio::task::spawn_blocking(move || send(&config, "Impala pool scheduler failure", html))
        .await
        .map_err(|e| Error::Delivery(format!("monitor report send task panicked: {e}")))??;
    Ok(())
}
