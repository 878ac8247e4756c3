//! Google Calendar sink.
//!
//! Authentication uses the installed-app OAuth flow with PKCE and a loopback
//! redirect; tokens are kept in a JSON file and refreshed on demand.
//!
//! ```ignore
//! use timetable_providers::google::{GoogleCalendarConfig, GoogleCalendarSink, OAuthCredentials};
//! use timetable_providers::CalendarSink;
//!
//! let credentials = OAuthCredentials::from_file("client_secret.json")?;
//! let sink = GoogleCalendarSink::new(GoogleCalendarConfig::new(credentials, "primary"))?;
//! sink.authenticate(false).await?;
//! let report = sink.sync(&events).await?;
//! ```

mod client;
mod config;
mod oauth;
mod sink;
mod tokens;

pub use client::{EventDateTime, EventPayload, GoogleCalendarClient, RemoteEvent};
pub use config::{GoogleCalendarConfig, OAuthCredentials};
pub use oauth::{OAuthClient, PkceFlow};
pub use sink::GoogleCalendarSink;
pub use tokens::{TokenInfo, TokenStore};
