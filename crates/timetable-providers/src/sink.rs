//! Where reconstructed events end up.
//!
//! [`CalendarSink`] is the seam for remote calendars; the free functions
//! write and read the local `*_events.json` / `*_events.csv` files.

use std::fs;
use std::path::Path;

use serde::Serialize;
use timetable_core::{BoxFuture, Event};
use tracing::{info, warn};

use crate::error::{ProviderError, ProviderResult};

/// Outcome of one calendar synchronisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deleted: usize,
    pub created: usize,
    /// Events that could not be mapped or were rejected by the calendar.
    pub failed: usize,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// A calendar that can be replaced wholesale with a list of events.
pub trait CalendarSink: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces the sink's current window with `events`.
    fn sync<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, ProviderResult<SyncReport>>;
}

fn ensure_parent(path: &Path) -> ProviderResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

/// Writes events as a pretty-printed JSON array.
pub fn write_events_json(events: &[Event], path: &Path) -> ProviderResult<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(events)
        .map_err(|e| ProviderError::internal(format!("failed to serialize events: {e}")))?;
    fs::write(path, json)?;
    info!(path = %path.display(), count = events.len(), "wrote events JSON");
    Ok(())
}

pub fn read_events_json(path: &Path) -> ProviderResult<Vec<Event>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ProviderError::io(format!("failed to read {}: {e}", path.display())).with_source(e)
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ProviderError::invalid_response(format!("{} is not an events file: {e}", path.display()))
    })
}

/// Writes events as CSV with a header row. Lecturers are joined by `", "`.
pub fn write_events_csv(events: &[Event], path: &Path) -> ProviderResult<()> {
    if events.is_empty() {
        warn!(path = %path.display(), "no events to save");
        return Ok(());
    }
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "date",
        "start_time",
        "end_time",
        "course",
        "lecturer",
        "location",
        "details",
    ])?;
    for event in events {
        let time = |t: Option<chrono::NaiveTime>| {
            t.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
        };
        writer.write_record([
            event.date.to_string(),
            time(event.start_time),
            time(event.end_time),
            event.course.clone(),
            event.lecturers(),
            event.location.clone(),
            event.details.clone(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), count = events.len(), "wrote events CSV");
    Ok(())
}
