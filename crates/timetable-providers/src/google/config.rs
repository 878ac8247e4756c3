//! Google Calendar sink configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// OAuth client registered in the Google Cloud Console.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Layout of the `client_secret_*.json` file the console hands out.
///
/// Both the nested (`installed` / `web`) and the flat layout are accepted.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read credentials file {}: {}", path.display(), e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        match (file.client_id, file.client_secret) {
            (Some(id), Some(secret)) => Ok(Self::new(id, secret)),
            _ => Err(
                "credentials file needs an 'installed'/'web' section or top-level 'client_id'/'client_secret'"
                    .to_string(),
            ),
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Settings for [`GoogleCalendarSink`](super::GoogleCalendarSink).
#[derive(Debug, Clone)]
pub struct GoogleCalendarConfig {
    pub credentials: OAuthCredentials,
    /// Target calendar, usually a `...@group.calendar.google.com` id.
    pub calendar_id: String,
    /// IANA zone the naive event times are interpreted in.
    pub time_zone: String,
    pub token_path: PathBuf,
    pub scopes: Vec<String>,
    pub timeout: Duration,
    /// Page size when listing events for deletion.
    pub max_results: u32,
    /// Events within `now ± sync_window_days` are replaced on every sync.
    pub sync_window_days: i64,
    pub loopback_port_range: (u16, u16),
}

impl GoogleCalendarConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";
    pub const DEFAULT_TIME_ZONE: &'static str = "Europe/Berlin";
    pub const DEFAULT_MAX_RESULTS: u32 = 2500;
    pub const DEFAULT_SYNC_WINDOW_DAYS: i64 = 300;

    pub fn new(credentials: OAuthCredentials, calendar_id: impl Into<String>) -> Self {
        Self {
            credentials,
            calendar_id: calendar_id.into(),
            time_zone: Self::DEFAULT_TIME_ZONE.to_string(),
            token_path: Self::default_token_path(),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            max_results: Self::DEFAULT_MAX_RESULTS,
            sync_window_days: Self::DEFAULT_SYNC_WINDOW_DAYS,
            loopback_port_range: (8080, 8090),
        }
    }

    /// `<data dir>/timetable/google-token.json`.
    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("timetable")
            .join("google-token.json")
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_sync_window_days(mut self, days: i64) -> Self {
        self.sync_window_days = days;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;
        if self.calendar_id.trim().is_empty() {
            return Err("calendar_id is required".to_string());
        }
        if self.time_zone.trim().is_empty() {
            return Err("time_zone is required".to_string());
        }
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if !(1..=2500).contains(&self.max_results) {
            return Err("max_results must be between 1 and 2500".to_string());
        }
        if self.sync_window_days <= 0 {
            return Err("sync_window_days must be positive".to_string());
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "s").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "s").validate().is_err());
        assert!(
            OAuthCredentials::new("x.apps.googleusercontent.com", "")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn credentials_from_console_file() {
        let json = r#"{"installed": {"client_id": "id.apps.googleusercontent.com",
            "client_secret": "s", "project_id": "timetable"}}"#;
        let creds = OAuthCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "s");
    }

    #[test]
    fn credentials_flat_and_invalid() {
        let flat = r#"{"client_id": "f.apps.googleusercontent.com", "client_secret": "fs"}"#;
        assert_eq!(OAuthCredentials::from_json(flat).unwrap().client_secret, "fs");
        assert!(OAuthCredentials::from_json(r#"{"other": {}}"#)
            .unwrap_err()
            .contains("client_id"));
        assert!(OAuthCredentials::from_json("nope").unwrap_err().contains("parse"));
    }

    #[test]
    fn defaults_follow_calendar_api_limits() {
        let config = GoogleCalendarConfig::new(credentials(), "cal@group.calendar.google.com");
        assert_eq!(config.max_results, 2500);
        assert_eq!(config.sync_window_days, 300);
        assert_eq!(config.time_zone, "Europe/Berlin");
        assert!(config.token_path.ends_with("timetable/google-token.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = GoogleCalendarConfig::new(credentials(), "cal");
        assert!(GoogleCalendarConfig::new(credentials(), " ").validate().is_err());
        assert!(base.clone().with_max_results(0).validate().is_err());
        assert!(base.clone().with_sync_window_days(0).validate().is_err());
        assert!(base.with_loopback_port_range(9000, 8000).validate().is_err());
    }
}
