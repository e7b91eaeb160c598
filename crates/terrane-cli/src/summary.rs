//! Deployment summary reporter
//!
//! Pure formatting of engine reports. Anything unresolved renders as
//! `unknown`; nothing here talks to a backend.

use chrono::{DateTime, NaiveDateTime, Utc};

use terrane_backup::{BackupArtifact, BackupStatus, RestoreResult};
use terrane_common::pipeline::{Outcome, StepStatus};
use terrane_lifecycle::{ApplyReport, DestroyReport};

pub const UNKNOWN: &str = "unknown";

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN)
}

/// Format a timestamp as a human-readable age (e.g., "2d", "5h", "30m", "15s")
pub fn format_age(timestamp: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(*timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }

    let days = duration.num_days();
    if days > 0 {
        return format!("{}d", days);
    }

    let hours = duration.num_hours();
    if hours > 0 {
        return format!("{}h", hours);
    }

    let minutes = duration.num_minutes();
    if minutes > 0 {
        return format!("{}m", minutes);
    }

    format!("{}s", total_secs)
}

/// Binary-prefixed size, e.g. "1.5 MiB"
pub fn format_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    let Some(bytes) = bytes else {
        return UNKNOWN.to_string();
    };
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Creation time of an artifact, falling back to the timestamp in its name
pub fn artifact_time(artifact: &BackupArtifact) -> Option<DateTime<Utc>> {
    artifact.created_at.or_else(|| {
        let stem = artifact.name.strip_suffix(".sql.gz")?;
        let stamp = stem.get(stem.len().checked_sub(15)?..)?;
        NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
            .ok()
            .map(|t| t.and_utc())
    })
}

/// Render rows as a column-aligned table with headers.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < num_cols {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let format_line = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_line(headers.iter().map(|h| h.to_string()).collect())];
    lines.extend(rows.iter().map(|row| format_line(row.clone())));
    lines.join("\n")
}

fn key_values(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    pairs
        .iter()
        .map(|(k, v)| format!("  {:<width$}  {}", k, v, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "succeeded",
        Outcome::Partial => "completed with warnings",
        Outcome::Failed => "failed",
        Outcome::Aborted => "cancelled",
    }
}

fn step_notes<'a>(steps: impl Iterator<Item = &'a terrane_common::pipeline::StepRecord>) -> Vec<String> {
    steps
        .filter_map(|s| match &s.status {
            StepStatus::Degraded(reason) => Some(format!("  ! {}: {}", s.name, reason)),
            StepStatus::Recovered(reason) => Some(format!("  ~ {}: {}", s.name, reason)),
            _ => None,
        })
        .collect()
}

pub fn render_apply(report: &ApplyReport) -> String {
    let mut out = Vec::new();

    if !report.applied {
        out.push(format!("Plan: {}", report.plan));
        match report.operation.outcome {
            Outcome::Aborted => out.push("Deployment cancelled, nothing was changed.".to_string()),
            _ => out.push("Plan only, nothing was applied.".to_string()),
        }
        return out.join("\n");
    }

    out.push(format!(
        "Deployment {} ({} resources changed)",
        outcome_label(report.operation.outcome),
        report.resources_changed
    ));
    let outputs = &report.outputs;
    let workload = match report.workload_ready {
        Some(true) => "running".to_string(),
        Some(false) => "not ready".to_string(),
        None => UNKNOWN.to_string(),
    };
    out.push(key_values(&[
        ("Resource group", or_unknown(outputs.resource_group.as_deref()).to_string()),
        ("Cluster", or_unknown(outputs.cluster_name.as_deref()).to_string()),
        ("Database", or_unknown(outputs.database_fqdn.as_deref()).to_string()),
        ("Storage account", or_unknown(outputs.storage_account.as_deref()).to_string()),
        ("Application", workload),
        ("External IP", or_unknown(report.external_ip.as_deref()).to_string()),
        ("URL", or_unknown(outputs.app_url.as_deref()).to_string()),
    ]));
    out.extend(step_notes(report.operation.steps.iter()));
    out.join("\n")
}

pub fn render_destroy(report: &DestroyReport) -> String {
    let mut out = Vec::new();
    match report.operation.outcome {
        _ if report.planned.is_empty() => {
            out.push("No managed resources found, nothing to destroy.".to_string());
            return out.join("\n");
        }
        Outcome::Aborted => {
            out.push("Destroy cancelled, nothing was changed.".to_string());
            return out.join("\n");
        }
        outcome => out.push(format!(
            "Destroy {} ({} resources tracked before)",
            outcome_label(outcome),
            report.planned.len()
        )),
    }
    if !report.detached.is_empty() {
        out.push("Detached from state (delete these manually if they still exist):".to_string());
        out.extend(report.detached.iter().map(|a| format!("  - {}", a)));
    }
    if !report.remaining_resources.is_empty() {
        out.push("Still tracked:".to_string());
        out.extend(report.remaining_resources.iter().map(|a| format!("  - {}", a)));
    }
    out.extend(step_notes(report.operation.steps.iter()));
    out.join("\n")
}

pub fn render_backup_status(status: &BackupStatus, now: DateTime<Utc>) -> String {
    let retention = status.retention.as_ref();
    let latest = status.latest_artifact.as_ref().map(|a| {
        let age = artifact_time(a)
            .map(|t| format!(" ({} ago)", format_age(&t, now)))
            .unwrap_or_default();
        format!("{}{}", a.name, age)
    });
    let pairs = [
        ("Database server", or_unknown(status.database_server.as_deref()).to_string()),
        (
            "Retention",
            retention
                .map(|r| format!("{} days", r.retention_days))
                .unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        (
            "Geo-redundant",
            retention
                .map(|r| if r.geo_redundant { "yes" } else { "no" }.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        (
            "Earliest restore",
            retention
                .and_then(|r| r.earliest_restore)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        (
            "Storage",
            format!(
                "{}/{}",
                or_unknown(status.storage_account.as_deref()),
                status.container
            ),
        ),
        (
            "Exports",
            status
                .artifact_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        ("Latest export", latest.unwrap_or_else(|| "none".to_string())),
    ];
    format!("Backup status\n{}", key_values(&pairs))
}

pub fn render_artifacts(artifacts: &[BackupArtifact], now: DateTime<Utc>) -> String {
    if artifacts.is_empty() {
        return "No backups found.".to_string();
    }
    let rows: Vec<Vec<String>> = artifacts
        .iter()
        .map(|a| {
            vec![
                a.name.clone(),
                format_size(a.size_bytes),
                artifact_time(a)
                    .map(|t| format_age(&t, now))
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            ]
        })
        .collect();
    render_table(&["NAME", "SIZE", "AGE"], &rows)
}

pub fn render_exported(artifact: &BackupArtifact) -> String {
    format!(
        "Exported {} ({})\n  {}",
        artifact.name,
        format_size(artifact.size_bytes),
        artifact.location
    )
}

pub fn render_restore(result: &RestoreResult) -> String {
    match result {
        RestoreResult::Restored {
            source,
            target,
            instant,
        } => format!(
            "Restored {} as of {} into new server {}.\nThe source server was not modified; point the application at {} to use it.",
            source,
            instant.format("%Y-%m-%d %H:%M:%S UTC"),
            target,
            target
        ),
        RestoreResult::Instructions { artifact, commands } => {
            let mut out = vec![format!("To restore {}, run:", artifact)];
            out.extend(commands.iter().map(|c| format!("  {}", c)));
            out.join("\n")
        }
    }
}
