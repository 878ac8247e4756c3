//! Google Calendar API v3 client: list, insert, delete.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use timetable_core::Event;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Naive local date-time; the zone travels in `timeZone`.
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Start or end of an event as the API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    pub time_zone: String,
}

/// Body of an `events.insert` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

impl EventPayload {
    /// Maps an event; `None` when its start or end time is unknown.
    pub fn from_event(event: &Event, time_zone: &str) -> Option<Self> {
        let start = event.date.and_time(event.start_time?);
        let end = event.date.and_time(event.end_time?);
        let at = |dt: chrono::NaiveDateTime| EventDateTime {
            date_time: dt.format(LOCAL_DATETIME_FORMAT).to_string(),
            time_zone: time_zone.to_string(),
        };
        Some(Self {
            summary: event.summary(),
            location: event.location.clone(),
            description: event.lecturers(),
            start: at(start),
            end: at(end),
        })
    }
}

/// An event already in the calendar; only what deletion needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<RemoteEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("timetable-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {}", e))
                    .with_provider("google")
            })?;
        Ok(Self {
            http_client,
            access_token: access_token.into(),
        })
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
    }

    /// Lists every event starting in `[time_min, time_max)`, following pages.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_size: u32,
    ) -> ProviderResult<Vec<RemoteEvent>> {
        let url = events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http_client.get(&url).query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("maxResults", page_size.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let body = self.send(request).await?.text().await.map_err(|e| {
                ProviderError::network(format!("failed to read response: {}", e))
                    .with_provider("google")
            })?;
            let page: EventListResponse = serde_json::from_str(&body).map_err(|e| {
                ProviderError::invalid_response(format!("failed to parse event list: {}", e))
                    .with_provider("google")
            })?;

            events.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar = calendar_id, count = events.len(), "listed events");
        Ok(events)
    }

    /// Creates an event and returns its id.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> ProviderResult<String> {
        let request = self.http_client.post(events_url(calendar_id)).json(payload);
        let created: RemoteEvent = self.send(request).await?.json().await.map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse created event: {}", e))
                .with_provider("google")
        })?;
        Ok(created.id)
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> ProviderResult<()> {
        let url = format!("{}/{}", events_url(calendar_id), urlencoding::encode(event_id));
        self.send(self.http_client.delete(url)).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> ProviderResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "request timeout".to_string()
                } else {
                    format!("request failed: {}", e)
                };
                ProviderError::network(message).with_provider("google")
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), &body).with_provider("google"))
    }
}

fn events_url(calendar_id: &str) -> String {
    format!(
        "{}/calendars/{}/events",
        CALENDAR_API_BASE,
        urlencoding::encode(calendar_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn event() -> Event {
        Event {
            date: NaiveDate::from_ymd_opt(2024, 10, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            end_time: NaiveTime::from_hms_opt(9, 30, 0),
            course: "Algorithms".into(),
            lecturer: vec!["Dr. X".into(), "Prof. Y".into()],
            location: "A101".into(),
            details: "Übung".into(),
        }
    }

    #[test]
    fn payload_mapping() {
        let payload = EventPayload::from_event(&event(), "Europe/Berlin").unwrap();
        insta::assert_json_snapshot!(payload, @r###"
        {
          "summary": "Algorithms, Übung",
          "location": "A101",
          "description": "Dr. X, Prof. Y",
          "start": {
            "dateTime": "2024-10-14T08:00:00",
            "timeZone": "Europe/Berlin"
          },
          "end": {
            "dateTime": "2024-10-14T09:30:00",
            "timeZone": "Europe/Berlin"
          }
        }
        "###);
    }

    #[test]
    fn events_without_times_are_not_mapped() {
        let mut e = event();
        e.end_time = None;
        assert!(EventPayload::from_event(&e, "UTC").is_none());
        let mut e = event();
        e.start_time = None;
        assert!(EventPayload::from_event(&e, "UTC").is_none());
    }

    #[test]
    fn calendar_id_is_escaped() {
        assert_eq!(
            events_url("abc@group.calendar.google.com"),
            "https://www.googleapis.com/calendar/v3/calendars/abc%40group.calendar.google.com/events"
        );
    }

    #[test]
    fn list_page_parsing() {
        let page: EventListResponse = serde_json::from_str(
            r#"{"kind":"calendar#events","items":[{"id":"e1","summary":"A"},{"id":"e2"}],
                "nextPageToken":"p2"}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].summary, None);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }
}
