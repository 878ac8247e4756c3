//! Authentication commands.

use timetable_providers::google::GoogleCalendarSink;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

/// Run the Google authentication flow.
///
/// Uses the credentials from `[google_calendar]` and stores the token at the
/// configured `token_path`. Without `force` an existing token with the
/// calendar scope is kept.
pub async fn google(config: &AppConfig, force: bool) -> ClientResult<()> {
    let settings = config
        .google_calendar
        .as_ref()
        .ok_or_else(|| ClientError::config("[google_calendar] section is missing"))?;
    // The token is per account, any calendar id will do.
    let calendar = settings.calendar_id.as_deref().unwrap_or("primary");
    let provider_config = settings
        .to_provider_config(Some(calendar))
        .map_err(ClientError::Config)?;
    let token_path = provider_config.token_path.clone();
    let sink = GoogleCalendarSink::new(provider_config)?;

    println!("Starting Google Calendar authentication...");
    println!("If a browser window opens, authorize access there.");
    println!();

    if sink.authenticate(force).await? {
        info!(path = %token_path.display(), "Google authentication successful");
        println!("Authentication successful!");
        println!("Token saved to {}.", token_path.display());
    } else {
        println!("Already authenticated with Google Calendar.");
        println!("Use --force to re-authenticate.");
    }
    Ok(())
}
