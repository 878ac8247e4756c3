//! Client error types.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that abort a command.
///
/// Per-document and per-event failures inside a batch are logged and counted
/// instead; only these end the process with a non-zero status.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(#[from] timetable_providers::ProviderError),

    #[error("processing error: {0}")]
    Core(#[from] timetable_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("none of the {0} documents could be processed")]
    NothingUsable(usize),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
