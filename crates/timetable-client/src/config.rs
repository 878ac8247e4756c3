//! Client configuration.
//!
//! Everything lives in one `config.toml`, by default at
//! `~/.config/timetable/config.toml`:
//!
//! ```toml
//! [general]
//! dry_run = false
//! log_format = "pretty"
//!
//! [paths]
//! download_dir = "downloads"
//! output_dir = "output"
//!
//! [webdav]
//! url = "https://files.example.org/public.php/webdav/"
//! username = "env::TIMETABLE_WEBDAV_USER"
//! password = "pass::uni/webdav"
//!
//! [timetables.elm3]
//! keywords = ["stundenplan", "elm 3"]
//!
//! [openai]
//! api_key = "env::OPENAI_API_KEY"
//!
//! [google_calendar]
//! enabled = true
//! calendar_id = "abc123@group.calendar.google.com"
//! credentials_file = "~/.config/timetable/client_secret.json"
//! ```
//!
//! Credential values accept `env::` and `pass::` references, see
//! [`crate::secret`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use timetable_core::{
    DEFAULT_MULTI_EVENT_THRESHOLD, FieldSpec, GridOptions, PipelineConfig, RetryPolicy,
    SlotSchema, TracingOutputFormat,
};
use timetable_providers::openai::OpenAiConfig;
use timetable_providers::pdf::CommandTableExtractor;
use timetable_providers::webdav::WebDavConfig;

use crate::secret;

/// Root of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralSettings,
    pub paths: PathSettings,
    pub webdav: Option<WebDavSettings>,
    /// Logical timetables, keyed by the directory name used for their versions.
    pub timetables: BTreeMap<String, TimetableSettings>,
    pub tables: TableSettings,
    pub openai: Option<OpenAiSettings>,
    pub parser: ParserSettings,
    pub google_calendar: Option<GoogleCalendarSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log what would happen without downloading, writing or pushing.
    pub dry_run: bool,
    /// `pretty`, `compact` or `json`.
    pub log_format: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    pub save_raw_tables: bool,
    pub save_csv: bool,
    pub save_json: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("output"),
            save_raw_tables: false,
            save_csv: false,
            save_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDavSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_webdav_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_webdav_timeout() -> u64 {
    WebDavConfig::DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableSettings {
    /// Every keyword must appear in the file name (case-insensitive).
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Overrides `[google_calendar] calendar_id` for this timetable.
    pub calendar_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// External table extractor. `{input}` and `{output}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for TableSettings {
    fn default() -> Self {
        let extractor = CommandTableExtractor::default();
        Self {
            command: extractor.program,
            args: extractor.args,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub base_url: Option<String>,
    /// Appended to the structuring instruction to anchor name spelling.
    #[serde(default)]
    pub known_lecturers: Vec<String>,
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    OpenAiConfig::DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    OpenAiConfig::DEFAULT_MAX_TOKENS
}

fn default_openai_timeout() -> u64 {
    OpenAiConfig::DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub multi_event_threshold: usize,
    /// Leading index columns written by the extractor before the date column.
    pub skip_columns: usize,
    /// Inclusive `[first, last]` year window.
    pub valid_years: Option<[i32; 2]>,
    pub retry_attempts: u32,
    pub retry_initial_backoff_secs: u64,
    pub retry_max_backoff_secs: u64,
    /// Line layout of a single-event cell; defaults to course, lecturer,
    /// location, details.
    pub schema: Option<Vec<FieldSpec>>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            multi_event_threshold: DEFAULT_MULTI_EVENT_THRESHOLD,
            skip_columns: 0,
            valid_years: None,
            retry_attempts: retry.max_attempts,
            retry_initial_backoff_secs: retry.initial_backoff.as_secs(),
            retry_max_backoff_secs: retry.max_backoff.as_secs(),
            schema: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleCalendarSettings {
    #[serde(default)]
    pub enabled: bool,
    pub calendar_id: Option<String>,
    pub time_zone: Option<String>,
    /// Supports `pass::` and `env::` references.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Console JSON, used when `client_id`/`client_secret` are not set.
    pub credentials_file: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub max_results: Option<u32>,
    pub sync_window_days: Option<i64>,
}

impl AppConfig {
    /// Loads `path`, or the default file if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("timetable")
    }

    pub fn log_format(&self) -> Result<TracingOutputFormat, String> {
        self.general
            .log_format
            .parse()
            .map_err(|e: timetable_core::TracingError| e.to_string())
    }

    /// Enabled timetables in key order.
    pub fn enabled_timetables(&self) -> impl Iterator<Item = (&String, &TimetableSettings)> {
        self.timetables.iter().filter(|(_, t)| t.enabled)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let parser = &self.parser;
        PipelineConfig {
            grid: GridOptions::default().with_skip_columns(parser.skip_columns),
            schema: parser
                .schema
                .clone()
                .map(|fields| SlotSchema { fields })
                .unwrap_or_default(),
            multi_event_threshold: parser.multi_event_threshold,
            retry: RetryPolicy::new(parser.retry_attempts).with_backoff(
                Duration::from_secs(parser.retry_initial_backoff_secs),
                Duration::from_secs(parser.retry_max_backoff_secs),
                2.0,
            ),
            valid_years: parser.valid_years.map(|[first, last]| (first, last)),
            known_lecturers: self
                .openai
                .as_ref()
                .map(|o| o.known_lecturers.clone())
                .unwrap_or_default(),
        }
    }

    pub fn webdav_config(&self) -> Result<WebDavConfig, String> {
        let settings = self
            .webdav
            .as_ref()
            .ok_or_else(|| "[webdav] section is missing".to_string())?;

        let mut config = WebDavConfig::new(&settings.url)
            .map_err(|e| format!("invalid [webdav] url '{}': {}", settings.url, e))?
            .with_timeout(Duration::from_secs(settings.timeout_secs));

        let username = secret::resolve_opt(settings.username.as_deref())
            .map_err(|e| format!("failed to resolve [webdav] username: {}", e))?;
        let password = secret::resolve_opt(settings.password.as_deref())
            .map_err(|e| format!("failed to resolve [webdav] password: {}", e))?;
        match (username, password) {
            (Some(user), Some(pass)) => config = config.with_credentials(user, pass),
            (None, None) => {}
            _ => return Err("[webdav] needs both username and password, or neither".to_string()),
        }
        if !settings.verify_tls {
            config = config.with_insecure_tls();
        }
        Ok(config)
    }

    /// `None` when no API key is configured.
    pub fn openai_config(&self) -> Result<Option<OpenAiConfig>, String> {
        let Some(settings) = &self.openai else {
            return Ok(None);
        };
        let Some(api_key) = secret::resolve_opt(settings.api_key.as_deref())
            .map_err(|e| format!("failed to resolve [openai] api_key: {}", e))?
        else {
            return Ok(None);
        };

        let mut config = OpenAiConfig::new(api_key)
            .with_model(&settings.model)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens)
            .with_timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(base_url) = &settings.base_url {
            config = config.with_base_url(base_url);
        }
        Ok(Some(config))
    }

    pub fn table_extractor(&self) -> CommandTableExtractor {
        CommandTableExtractor::new(&self.tables.command, self.tables.args.clone())
    }

    /// Checks everything that can be checked without network access.
    pub fn validate(&self) -> Result<(), String> {
        self.log_format()?;
        if self.parser.multi_event_threshold == 0 {
            return Err("[parser] multi_event_threshold must be at least 1".to_string());
        }
        if let Some([first, last]) = self.parser.valid_years
            && first > last
        {
            return Err(format!("[parser] valid_years [{first}, {last}] is empty"));
        }
        if let Some(schema) = &self.parser.schema
            && schema.is_empty()
        {
            return Err("[parser] schema must list at least one field".to_string());
        }
        if self.tables.command.trim().is_empty() {
            return Err("[tables] command must not be empty".to_string());
        }
        for (key, timetable) in &self.timetables {
            if key.is_empty() || key == "temp" || key.contains(['/', '\\']) {
                return Err(format!("timetable key '{key}' cannot be used as a directory name"));
            }
            if timetable.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(format!("[timetables.{key}] has a blank keyword"));
            }
        }
        if self.webdav.is_some() {
            self.webdav_config()?;
        }
        self.openai_config()?;
        #[cfg(feature = "google")]
        if let Some(google) = &self.google_calendar
            && google.enabled
        {
            google.to_provider_config(None)?;
        }
        Ok(())
    }
}

#[cfg(feature = "google")]
impl GoogleCalendarSettings {
    /// Builds the sink configuration, resolving credentials.
    ///
    /// `calendar_override` wins over the configured `calendar_id`.
    pub fn to_provider_config(
        &self,
        calendar_override: Option<&str>,
    ) -> Result<timetable_providers::google::GoogleCalendarConfig, String> {
        use timetable_providers::google::GoogleCalendarConfig;

        let credentials = self.resolve_credentials()?;
        let calendar_id = calendar_override
            .or(self.calendar_id.as_deref())
            .ok_or_else(|| "[google_calendar] calendar_id is required".to_string())?;

        let mut config = GoogleCalendarConfig::new(credentials, calendar_id);
        if let Some(tz) = &self.time_zone {
            config = config.with_time_zone(tz);
        }
        if let Some(path) = &self.token_path {
            config = config.with_token_path(path);
        }
        if let Some(max) = self.max_results {
            config = config.with_max_results(max);
        }
        if let Some(days) = self.sync_window_days {
            config = config.with_sync_window_days(days);
        }
        config.validate()?;
        Ok(config)
    }

    /// Inline `client_id`/`client_secret` first, then `credentials_file`.
    pub(crate) fn resolve_credentials(
        &self,
    ) -> Result<timetable_providers::google::OAuthCredentials, String> {
        use timetable_providers::google::OAuthCredentials;

        let id = secret::resolve_opt(self.client_id.as_deref())
            .map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let secret = secret::resolve_opt(self.client_secret.as_deref())
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?;

        match (id, secret, &self.credentials_file) {
            (Some(id), Some(secret), _) => Ok(OAuthCredentials::new(id, secret)),
            (None, None, Some(path)) => OAuthCredentials::from_file(path),
            (Some(_), None, _) => {
                Err("client_secret is missing from [google_calendar]".to_string())
            }
            (None, Some(_), _) => Err("client_id is missing from [google_calendar]".to_string()),
            (None, None, None) => Err(format!(
                "Google credentials not found. Add to {}:\n  \
                 [google_calendar]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 or point credentials_file at the JSON from the Cloud Console",
                AppConfig::default_path().display()
            )),
        }
    }
}
