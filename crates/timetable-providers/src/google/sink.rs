//! [`CalendarSink`] that replaces a Google calendar's events.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use timetable_core::{BoxFuture, Event};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::sink::{CalendarSink, SyncReport};

use super::client::{EventPayload, GoogleCalendarClient};
use super::config::GoogleCalendarConfig;
use super::oauth::OAuthClient;
use super::tokens::{TokenInfo, TokenStore};

/// Google Calendar sink.
///
/// A sync deletes every event within `now ± sync_window_days` and then
/// inserts the new list. In dry-run mode nothing is authenticated or sent;
/// the prepared payloads are logged and written to a CSV instead.
pub struct GoogleCalendarSink {
    config: GoogleCalendarConfig,
    oauth: OAuthClient,
    store: TokenStore,
    token: Mutex<Option<TokenInfo>>,
    dry_run_output: Option<PathBuf>,
}

impl GoogleCalendarSink {
    pub fn new(config: GoogleCalendarConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::configuration(e).with_provider("google"))?;
        let oauth = OAuthClient::new(config.credentials.clone(), config.timeout)?;
        let store = TokenStore::new(&config.token_path);
        Ok(Self {
            config,
            oauth,
            store,
            token: Mutex::new(None),
            dry_run_output: None,
        })
    }

    /// Switches to dry-run mode, writing prepared payloads to `output`.
    pub fn with_dry_run(mut self, output: impl Into<PathBuf>) -> Self {
        self.dry_run_output = Some(output.into());
        self
    }

    pub fn config(&self) -> &GoogleCalendarConfig {
        &self.config
    }

    /// Runs the consent flow unless a token with the right scopes is stored.
    ///
    /// Returns `true` when a new token was obtained.
    pub async fn authenticate(&self, force: bool) -> ProviderResult<bool> {
        if !force
            && let Some(token) = self.store.load()?
            && token.has_scopes(&self.config.scopes)
        {
            info!(path = %self.store.path().display(), "Google token already present");
            *self.token.lock().await = Some(token);
            return Ok(false);
        }

        let token = self
            .oauth
            .authorize(&self.config.scopes, self.config.loopback_port_range)
            .await?;
        self.store.save(&token)?;
        *self.token.lock().await = Some(token);
        Ok(true)
    }

    /// Returns a usable access token, refreshing and persisting it if needed.
    async fn access_token(&self) -> ProviderResult<String> {
        let mut guard = self.token.lock().await;
        let token = match guard.take() {
            Some(token) => token,
            None => self.store.load()?.ok_or_else(|| {
                ProviderError::authentication("not authenticated, run `timetable auth google`")
                    .with_provider("google")
            })?,
        };

        let token = if token.is_expired() {
            debug!("access token expired, refreshing");
            let refreshed = self.oauth.refresh(token).await?;
            self.store.save(&refreshed)?;
            refreshed
        } else {
            token
        };

        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    fn prepare(&self, events: &[Event]) -> (Vec<EventPayload>, usize) {
        let mut failed = 0;
        let payloads = events
            .iter()
            .filter_map(|event| {
                let payload = EventPayload::from_event(event, &self.config.time_zone);
                if payload.is_none() {
                    warn!(date = %event.date, course = %event.course, "event has no start or end time, skipped");
                    failed += 1;
                }
                payload
            })
            .collect();
        (payloads, failed)
    }

    async fn run_sync(&self, events: &[Event]) -> ProviderResult<SyncReport> {
        let (payloads, failed) = self.prepare(events);

        if let Some(output) = &self.dry_run_output {
            for payload in &payloads {
                info!(summary = %payload.summary, start = %payload.start.date_time, "dry run: prepared event");
            }
            write_payloads_csv(&payloads, output)?;
            return Ok(SyncReport {
                deleted: 0,
                created: payloads.len(),
                failed,
                dry_run: true,
            });
        }

        let client = GoogleCalendarClient::new(self.access_token().await?, self.config.timeout)?;
        let calendar_id = &self.config.calendar_id;
        let window = Duration::days(self.config.sync_window_days);
        let now = Utc::now();

        let existing = client
            .list_events(calendar_id, now - window, now + window, self.config.max_results)
            .await?;
        info!(count = existing.len(), calendar = %calendar_id, "deleting existing events");

        let mut report = SyncReport {
            failed,
            ..SyncReport::default()
        };
        for remote in &existing {
            match client.delete_event(calendar_id, &remote.id).await {
                Ok(()) => {
                    debug!(id = %remote.id, summary = ?remote.summary, "deleted event");
                    report.deleted += 1;
                }
                Err(e) => warn!(id = %remote.id, error = %e, "failed to delete event"),
            }
        }

        for payload in &payloads {
            match client.insert_event(calendar_id, payload).await {
                Ok(id) => {
                    debug!(%id, summary = %payload.summary, "created event");
                    report.created += 1;
                }
                Err(e) => {
                    warn!(summary = %payload.summary, error = %e, "failed to create event");
                    report.failed += 1;
                }
            }
        }

        info!(
            deleted = report.deleted,
            created = report.created,
            failed = report.failed,
            "calendar sync finished"
        );
        Ok(report)
    }
}

impl CalendarSink for GoogleCalendarSink {
    fn name(&self) -> &str {
        "google"
    }

    fn sync<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, ProviderResult<SyncReport>> {
        Box::pin(self.run_sync(events))
    }
}

fn write_payloads_csv(payloads: &[EventPayload], path: &std::path::Path) -> ProviderResult<()> {
    if payloads.is_empty() {
        warn!("no events to save");
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["summary", "location", "description", "start", "end", "time_zone"])?;
    for p in payloads {
        writer.write_record([
            p.summary.as_str(),
            p.location.as_str(),
            p.description.as_str(),
            p.start.date_time.as_str(),
            p.end.date_time.as_str(),
            p.start.time_zone.as_str(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), count = payloads.len(), "dry run output written");
    Ok(())
}
