//! Logging setup shared by the `timetable` binary and tests.
//!
//! Components never hold a logger of their own: they emit `tracing` events and
//! whichever subscriber the binary installs receives them. Installing one is the
//! job of [`init_tracing`]:
//!
//! ```ignore
//! use timetable_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::default())?;
//!
//! // Unattended (cron) runs, one JSON object per line:
//! init_tracing(TracingConfig::batch())?;
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Why the subscriber could not be installed.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format '{0}' (expected pretty, compact or json)")]
    UnknownFormat(String),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for a terminal.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, for log collectors.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// What [`init_tracing`] installs.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Used when neither `RUST_LOG` nor `directive` is set.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Print file and line of the call site.
    pub source_location: bool,
    /// Only honoured by [`TracingOutputFormat::Compact`].
    pub timestamps: bool,
    /// Log when a per-timetable or per-document span opens and closes.
    pub span_lifecycle: bool,
    /// Filter directive that overrides both `level` and `RUST_LOG`.
    pub directive: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            source_location: false,
            timestamps: true,
            span_lifecycle: false,
            directive: None,
        }
    }
}

impl TracingConfig {
    /// Verbose single-line output for `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            source_location: true,
            timestamps: false,
            ..Self::default()
        }
    }

    /// JSON output for scheduled runs whose logs are collected by a supervisor.
    #[must_use]
    pub fn batch() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            source_location: true,
            span_lifecycle: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.directive {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            // "timetable" prefixes the targets of all three workspace crates.
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("timetable={}", self.level)))),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_lifecycle {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_span_events(self.span_events());
        match self.format {
            TracingOutputFormat::Pretty => base.pretty().boxed(),
            TracingOutputFormat::Json => base.json().boxed(),
            TracingOutputFormat::Compact if self.timestamps => base.compact().boxed(),
            TracingOutputFormat::Compact => base.compact().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Call once, at the start of `main`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or if the
/// filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(config.layer())
            .with(filter),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let plain = TracingConfig::default();
        assert_eq!(plain.level, Level::INFO);
        assert_eq!(plain.format, TracingOutputFormat::Pretty);
        assert_eq!(plain.span_events(), FmtSpan::NONE);

        let debug = TracingConfig::cli_debug();
        assert_eq!(debug.level, Level::DEBUG);
        assert!(!debug.timestamps);

        let batch = TracingConfig::batch();
        assert_eq!(batch.format, TracingOutputFormat::Json);
        assert_eq!(batch.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn format_names() {
        assert_eq!(
            "JSON".parse::<TracingOutputFormat>().unwrap(),
            TracingOutputFormat::Json
        );
        assert_eq!(
            " compact ".parse::<TracingOutputFormat>().unwrap(),
            TracingOutputFormat::Compact
        );
        assert!(matches!(
            "xml".parse::<TracingOutputFormat>(),
            Err(TracingError::UnknownFormat(name)) if name == "xml"
        ));
    }

    #[test]
    fn directive_overrides_level() {
        let config = TracingConfig::default()
            .with_level(Level::WARN)
            .with_directive("timetable_core=trace");
        assert_eq!(config.directive.as_deref(), Some("timetable_core=trace"));
        assert!(config.filter().is_ok());
        assert!(
            TracingConfig::default()
                .with_directive("timetable=loud")
                .filter()
                .is_err()
        );
    }
}
