//! `timetable push`: sync an events file to Google Calendar.

use std::path::Path;

use timetable_providers::google::GoogleCalendarSink;
use timetable_providers::{CalendarSink, ProviderErrorCode, SyncReport, read_events_json};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

pub async fn push(config: &AppConfig, events: &Path, calendar_id: Option<&str>) -> ClientResult<()> {
    let report = push_file(config, events, calendar_id).await?;
    println!(
        "{} deleted, {} created, {} failed{}",
        report.deleted,
        report.created,
        report.failed,
        if report.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}

/// Replaces the calendar's window with the events in `path`.
pub async fn push_file(
    config: &AppConfig,
    path: &Path,
    calendar_id: Option<&str>,
) -> ClientResult<SyncReport> {
    let settings = config
        .google_calendar
        .as_ref()
        .ok_or_else(|| ClientError::config("[google_calendar] section is missing"))?;
    let provider_config = settings
        .to_provider_config(calendar_id)
        .map_err(ClientError::Config)?;

    let events = read_events_json(path)?;
    info!(path = %path.display(), count = events.len(), calendar = %provider_config.calendar_id, "pushing events");

    let mut sink = GoogleCalendarSink::new(provider_config)?;
    if config.general.dry_run {
        sink = sink.with_dry_run(config.paths.output_dir.join("dry_run_output.csv"));
    }
    sink.sync(&events).await.map_err(|e| match e.code() {
        ProviderErrorCode::AuthenticationFailed => ClientError::AuthRequired(e.to_string()),
        _ => e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleCalendarSettings;
    use chrono::{NaiveDate, NaiveTime};
    use timetable_core::Event;
    use timetable_providers::write_events_json;

    fn config(dir: &Path, dry_run: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.general.dry_run = dry_run;
        config.paths.output_dir = dir.join("output");
        config.google_calendar = Some(GoogleCalendarSettings {
            enabled: true,
            calendar_id: Some("main@group.calendar.google.com".into()),
            client_id: Some("id.apps.googleusercontent.com".into()),
            client_secret: Some("cs".into()),
            token_path: Some(dir.join("token.json")),
            ..Default::default()
        });
        config
    }

    fn events_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("plan_events.json");
        let event = Event {
            date: NaiveDate::from_ymd_opt(2024, 10, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            end_time: NaiveTime::from_hms_opt(9, 30, 0),
            course: "Algorithms".into(),
            lecturer: vec!["Dr. X".into()],
            location: "A101".into(),
            details: "Lecture".into(),
        };
        write_events_json(&[event], &path).unwrap();
        path
    }

    #[tokio::test]
    async fn dry_run_push_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let report = push_file(&config(dir.path(), true), &events_file(dir.path()), None)
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.created, 1);
        assert!(dir.path().join("output/dry_run_output.csv").exists());
    }

    #[tokio::test]
    async fn push_without_token_requires_auth() {
        let dir = tempfile::tempdir().unwrap();
        let err = push_file(&config(dir.path(), false), &events_file(dir.path()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn missing_section_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = push_file(&AppConfig::default(), &events_file(dir.path()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
