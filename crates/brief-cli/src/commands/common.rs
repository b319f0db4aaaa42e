use brief_core::events::{SyncEvent, SyncOutcome};
use brief_core::{Record, RecordId};
use chrono::Utc;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct HistoryListItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub summary_length: String,
    pub timestamp: i64,
    pub relative_time: String,
    pub pending_sync: bool,
    pub tags: Vec<String>,
}

pub fn record_to_list_item(record: &Record) -> HistoryListItem {
    let now_ms = Utc::now().timestamp_millis();
    HistoryListItem {
        id: record.id.to_string(),
        title: record.display_title().to_string(),
        url: record.url.clone(),
        summary_length: record.summary_length.to_string(),
        timestamp: record.timestamp,
        relative_time: format_relative_time(record.timestamp, now_ms),
        pending_sync: record.pending_sync,
        tags: record.metadata.tags.clone(),
    }
}

pub fn format_history_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let short_id = short_id(&record.id);
            let title = preview(record.display_title(), 40);
            let relative_time = format_relative_time(record.timestamp, now_ms);
            let marker = if record.pending_sync { "*" } else { " " };
            format!("{short_id:<13} {marker} {title:<40}  {relative_time}")
        })
        .collect()
}

pub fn format_record_details(record: &Record) -> String {
    let mut lines = vec![
        format!("id:        {}", record.id),
        format!("title:     {}", record.display_title()),
        format!("url:       {}", record.url),
        format!("length:    {}", record.summary_length),
        format!("saved:     {}", format_timestamp(record.timestamp)),
        format!(
            "status:    {}",
            if record.pending_sync { "pending upload" } else { "synced" }
        ),
    ];
    if let Some(domain) = &record.metadata.domain {
        lines.push(format!("domain:    {domain}"));
    }
    if !record.metadata.tags.is_empty() {
        lines.push(format!("tags:      {}", record.metadata.tags.join(", ")));
    }
    lines.push(String::new());
    lines.push(record.summary.clone());
    for entry in &record.qa_history {
        lines.push(String::new());
        lines.push(format!("Q: {}", entry.question));
        lines.push(format!("A: {}", entry.answer));
    }
    lines.join("\n")
}

pub fn format_outcome(outcome: &SyncOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "{} synced, {} failed",
        outcome.synced, outcome.failed
    )];
    lines.extend(
        outcome
            .errors
            .iter()
            .map(|error| format!("  {}  {}", short_id(&error.id), error.error)),
    );
    lines
}

/// One-line rendering of a sync event for interactive output.
pub fn format_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::Progress {
            current,
            total,
            item,
        } => Some(format!("[{current}/{total}] {}", short_id(item))),
        SyncEvent::Conflict {
            id,
            resolution,
            local,
            remote,
        } => Some(format!(
            "conflict {}: {resolution:?} (local={} remote={})",
            short_id(id),
            format_timestamp(*local),
            remote.map_or_else(|| "unknown".to_string(), format_timestamp)
        )),
        SyncEvent::Failed {
            reauthenticate: true,
            ..
        } => Some("Session expired. Run `brief auth login` to sign in again.".to_string()),
        _ => None,
    }
}

pub fn short_id(id: &RecordId) -> String {
    id.as_str().chars().take(13).collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by exact id or unique id prefix.
pub fn resolve_record<'a>(query: &str, records: &'a [Record]) -> Result<&'a Record, CliError> {
    let query = normalize_record_identifier(query)?;
    if let Some(record) = records.iter().find(|record| record.id.as_str() == query) {
        return Ok(record);
    }

    let matches: Vec<&Record> = records
        .iter()
        .filter(|record| record.id.as_str().starts_with(&query))
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::RecordNotFound(query)),
        [record] => Ok(*record),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|record| short_id(&record.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}
