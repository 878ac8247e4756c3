//! WebDAV source configuration.

use std::time::Duration;
use url::Url;

/// Login for a share that is not public.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where the published timetables live.
#[derive(Debug, Clone)]
pub struct WebDavConfig {
    /// The collection; always ends in `/` so hrefs resolve inside it.
    pub url: Url,
    pub credentials: Option<Credentials>,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub user_agent: String,
}

impl WebDavConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let raw = url.as_ref().trim();
        let url = if raw.ends_with('/') {
            Url::parse(raw)?
        } else {
            Url::parse(&format!("{raw}/"))?
        };
        Ok(Self {
            url,
            credentials: None,
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("timetable-sync/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Accepts self-signed certificates.
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Resolves an href from a PROPFIND answer against the collection.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.url.join(href).ok()
    }
}
