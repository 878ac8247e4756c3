//! Error types for the reconstruction pipeline.

use thiserror::Error;

/// Errors that stop processing of a single document.
///
/// Per-cell problems (bad time labels, unparseable dates) never surface here:
/// they are logged and the affected field is left empty.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The extracted tables flattened to zero cells.
    #[error("table is empty after flattening")]
    EmptyTable,

    /// No `Version: ...` stamp on the first page.
    #[error("no version stamp found in document text")]
    MissingVersion,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure of one call to the text-structuring oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The service could not be reached or answered with an error status.
    #[error("oracle transport error: {0}")]
    Transport(String),

    /// The service refused the request itself (bad key, unknown model,
    /// oversized prompt). Sending it again cannot help.
    #[error("oracle rejected the request: {0}")]
    Rejected(String),

    /// The service answered without any content.
    #[error("oracle returned no content")]
    EmptyResponse,
}

impl OracleError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Transport failures are retried after a backoff delay, empty answers
    /// immediately.
    pub fn needs_backoff(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Rejected requests end the attempt loop at once.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}
