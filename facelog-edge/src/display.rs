//! Terminal formatting.

use crate::health::{DeviceHealth, Usage};
use chrono::{DateTime, Local, TimeZone, Utc};
use facelog_pipeline::{CycleOutcome, DrainReport, PipelineEvent, PipelineStatus};
use facelog_recognition::wire::{AttendanceRecord, WorkHours, WorkHoursDay};
use facelog_types::{CachedUser, LogEntry, NetworkInfo};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn unix_time(secs: f64) -> String {
    Utc.timestamp_millis_opt((secs * 1000.0) as i64)
        .single()
        .map(local_time)
        .unwrap_or_else(|| format!("{secs}"))
}

/// What the person at the checkpoint sees after a cycle.
pub fn outcome_message(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Recognized { name } => format!("Welcome, {name}"),
        CycleOutcome::NotRecognized => "Not recognized, please try again".to_string(),
        CycleOutcome::CameraFault { reason } => format!("Camera error: {reason}"),
    }
}

pub fn event_line(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::CycleRecorded(record) => format!(
            "[{}] {}: {}",
            local_time(record.recorded_at),
            record.event_type,
            outcome_message(&record.outcome)
        ),
        PipelineEvent::OperationalFault { reason } => format!("ERROR: {reason}"),
        PipelineEvent::SyncCompleted(report) => format!("sync: {}", report_line(report)),
        PipelineEvent::UsersRefreshed { count } => format!("users refreshed: {count}"),
    }
}

pub fn report_line(report: &DrainReport) -> String {
    let mut line = format!(
        "{} synced, {} waiting, {} pruned",
        report.synced, report.remaining, report.pruned
    );
    if report.duplicates > 0 {
        line.push_str(&format!(" ({} already known)", report.duplicates));
    }
    if let Some(failure) = &report.failure {
        line.push_str(&format!("; stopped: {failure}"));
    }
    line
}

pub fn entry_line(entry: &LogEntry) -> String {
    let who = match &entry.subject_id {
        Some(id) => format!("{} ({id})", entry.subject_name),
        None => entry.subject_name.clone(),
    };
    let mut line = format!(
        "{}  {:<9}  {:<7}  {}",
        local_time(entry.created_at),
        entry.event_type.as_str(),
        entry.status.as_str(),
        who
    );
    if let Some(reason) = &entry.failure_reason {
        line.push_str(&format!("  [{reason}]"));
    }
    if !entry.synced {
        line.push_str("  (unsynced)");
    }
    line
}

pub fn record_line(record: &AttendanceRecord) -> String {
    let who = record.name.as_deref().unwrap_or(facelog_types::UNKNOWN_SUBJECT);
    let status = if record.matched { "success" } else { "failed" };
    format!(
        "{}  {:<7}  {}  {}",
        unix_time(record.ts),
        status,
        who,
        record.device_id.as_deref().unwrap_or("-")
    )
}

pub fn network_line(network: &NetworkInfo) -> String {
    format!(
        "{} {:<32} {:>3}%  {}",
        if network.is_current { "*" } else { " " },
        network.ssid,
        network.signal_strength,
        if network.secured { "secured" } else { "open" }
    )
}

pub fn user_line(user: &CachedUser) -> String {
    let role = if user.role.is_empty() { "-" } else { &user.role };
    format!("{:<8} {:<24} {}", user.id, user.display_name, role)
}

pub fn hours_line(hours: &WorkHours) -> String {
    let mut line = format!(
        "{:<24} {:>6.2}h  {} - {}  ({} scans)",
        hours.name,
        hours.work_hours,
        unix_time(hours.first_check_in),
        unix_time(hours.last_check_out),
        hours.check_ins
    );
    if hours.cross_day {
        line.push_str("  crosses midnight");
    }
    line
}

pub fn hours_day_line(day: &WorkHoursDay) -> String {
    format!("{}  {}", day.date, hours_line(&day.hours))
}

pub fn status_text(status: &PipelineStatus) -> String {
    let refreshed = status
        .users_refreshed_at
        .map(local_time)
        .unwrap_or_else(|| "never".to_string());
    format!(
        "camera:   {}\nservice:  {}\nunsynced: {}\nusers:    refreshed {}",
        status.capture,
        if status.online { "online" } else { "offline" },
        status.unsynced,
        refreshed
    )
}

const MIB: u64 = 1024 * 1024;

fn usage(usage: Usage) -> String {
    format!(
        "{:.0}% ({} / {} MiB)",
        usage.percent(),
        usage.used / MIB,
        usage.total / MIB
    )
}

fn uptime(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

pub fn health_text(health: &DeviceHealth) -> String {
    let [one, five, fifteen] = health.load_average;
    let mut lines = vec![
        format!(
            "host:     {} (up {})",
            health.hostname.as_deref().unwrap_or("unknown"),
            uptime(health.uptime)
        ),
        format!("cpu:      {:.0}%  load {one:.2} {five:.2} {fifteen:.2}", health.cpu_percent),
        format!("memory:   {}", usage(health.memory)),
    ];
    lines.push(match health.storage {
        Some(storage) => format!("storage:  {}", usage(storage)),
        None => "storage:  unknown".to_string(),
    });
    lines.push(match health.temperature_c {
        Some(temp) => format!("temp:     {temp:.1}°C"),
        None => "temp:     n/a".to_string(),
    });
    lines.join("\n")
}
