//! Error type shared by the adapters.
//!
//! A [`ProviderError`] carries a [`ProviderErrorCode`] so the batch runner can
//! tell a transient failure (retry the download) from one that needs the
//! user (re-authenticate) without matching on messages.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials missing, invalid or expired.
    AuthenticationFailed,
    /// Authenticated, but not allowed to touch the resource.
    AuthorizationFailed,
    /// Connection failed, timed out, DNS, TLS.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// 5xx from the server.
    ServerError,
    /// Response could not be parsed or had an unexpected shape.
    InvalidResponse,
    /// 404.
    NotFound,
    /// 400 or a request we refused to send.
    BadRequest,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// Local filesystem or subprocess failure.
    IoError,
    /// Unexpected state.
    InternalError,
}

impl ProviderErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::RateLimited | Self::ServerError)
    }

    /// Snake-case name used in messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::IoError => "io_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by one of the adapters.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// Adapter that raised it ("webdav", "openai", "google", ...).
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::IoError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Maps an unsuccessful HTTP status onto an error.
    ///
    /// `detail` is usually the response body and is appended when not blank.
    pub fn from_status(status: u16, detail: &str) -> Self {
        let code = match status {
            400 => ProviderErrorCode::BadRequest,
            401 => ProviderErrorCode::AuthenticationFailed,
            403 => ProviderErrorCode::AuthorizationFailed,
            404 | 410 => ProviderErrorCode::NotFound,
            429 => ProviderErrorCode::RateLimited,
            500..=599 => ProviderErrorCode::ServerError,
            _ => ProviderErrorCode::InvalidResponse,
        };
        let detail = detail.trim();
        if detail.is_empty() {
            Self::new(code, format!("HTTP {status}"))
        } else {
            Self::new(code, format!("HTTP {status}: {detail}"))
        }
    }

    /// Tags the error with the adapter that raised it.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Whether another attempt at the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string()).with_source(err)
    }
}

impl From<csv::Error> for ProviderError {
    fn from(err: csv::Error) -> Self {
        Self::io(format!("CSV error: {err}")).with_source(err)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::AuthenticationFailed.is_retryable());
        assert!(!ProviderErrorCode::IoError.is_retryable());
    }

    #[test]
    fn display_includes_provider_and_code() {
        let err = ProviderError::not_found("ET_3.pdf").with_provider("webdav");
        assert_eq!(err.to_string(), "[webdav] not_found: ET_3.pdf");
    }

    #[test]
    fn http_statuses() {
        let cases = [
            (400, ProviderErrorCode::BadRequest),
            (401, ProviderErrorCode::AuthenticationFailed),
            (403, ProviderErrorCode::AuthorizationFailed),
            (404, ProviderErrorCode::NotFound),
            (410, ProviderErrorCode::NotFound),
            (429, ProviderErrorCode::RateLimited),
            (502, ProviderErrorCode::ServerError),
            (302, ProviderErrorCode::InvalidResponse),
        ];
        for (status, code) in cases {
            assert_eq!(ProviderError::from_status(status, "").code(), code, "{status}");
        }
        assert_eq!(
            ProviderError::from_status(503, " maintenance\n").message(),
            "HTTP 503: maintenance"
        );
        assert!(ProviderError::from_status(503, "").is_retryable());
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error;
        let err: ProviderError = std::io::Error::other("disk full").into();
        assert_eq!(err.code(), ProviderErrorCode::IoError);
        assert!(err.source().is_some());
        assert!(err.provider().is_none());
    }
}
