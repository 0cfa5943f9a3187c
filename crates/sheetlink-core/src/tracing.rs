//! Tracing setup shared by the sheetlink binaries.
//!
//! The HTTP service logs JSON lines, the CLI logs compact text to stderr.
//! `RUST_LOG` always wins over the configured level.
//!
//! ```ignore
//! use sheetlink_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::server())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Crate targets that receive the default level when `RUST_LOG` is unset.
const SHEETLINK_TARGETS: &[&str] = &[
    "sheetlink",
    "sheetlink_core",
    "sheetlink_google",
    "sheetlink_server",
    "sheetlink_client",
];

/// Errors raised by [`init_tracing`].
#[derive(Debug, Error)]
pub enum TracingError {
    /// Another subscriber is already installed.
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive does not parse.
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading in a terminal.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level of the sheetlink crates when `RUST_LOG` is unset.
    pub level: Level,
    /// Event layout.
    pub format: TracingOutputFormat,
    /// Source file and line on each event.
    pub file_and_line: bool,
    /// Module path on each event.
    pub show_target: bool,
    /// Wall-clock time on each event; the CLI preset turns it off.
    pub timestamps: bool,
    /// Span open/close events, used to time requests.
    pub span_events: bool,
    /// Directive used instead of `RUST_LOG` and `level`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            file_and_line: false,
            show_target: true,
            timestamps: true,
            span_events: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// CLI preset: compact lines without time, warnings unless `debug`.
    #[must_use]
    pub fn cli(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::WARN },
            format: TracingOutputFormat::Compact,
            file_and_line: debug,
            show_target: debug,
            timestamps: false,
            ..Self::default()
        }
    }

    /// HTTP service preset: JSON lines with request spans.
    #[must_use]
    pub fn server() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            span_events: true,
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

    /// Pins the filter, ignoring `RUST_LOG`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Returns the filter directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        SHEETLINK_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref directive) = self.filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }

    fn fmt_layer(&self) -> BoxedLayer {
        let span_events = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_file(self.file_and_line)
            .with_line_number(self.file_and_line)
            .with_target(self.show_target)
            .with_span_events(span_events);

        match (self.format, self.timestamps) {
            (TracingOutputFormat::Json, _) => base.json().boxed(),
            (TracingOutputFormat::Pretty, _) => base.pretty().with_writer(std::io::stderr).boxed(),
            (TracingOutputFormat::Compact, true) => {
                base.compact().with_writer(std::io::stderr).boxed()
            }
            (TracingOutputFormat::Compact, false) => base
                .compact()
                .without_time()
                .with_writer(std::io::stderr)
                .boxed(),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. Call once at process start.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let subscriber = tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(config.env_filter()?);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_preset_levels() {
        assert_eq!(TracingConfig::cli(false).level, Level::WARN);
        let debug = TracingConfig::cli(true);
        assert_eq!(debug.level, Level::DEBUG);
        assert!(debug.file_and_line);
        assert!(!debug.timestamps);
        assert_eq!(debug.format, TracingOutputFormat::Compact);
    }

    #[test]
    fn server_preset_is_json() {
        let config = TracingConfig::server();
        assert_eq!(config.format, TracingOutputFormat::Json);
        assert_eq!(config.level, Level::INFO);
        assert!(config.span_events);
    }

    #[test]
    fn default_directive_covers_every_crate() {
        let directive = TracingConfig::default()
            .with_level(Level::DEBUG)
            .default_directive();
        assert!(directive.contains("sheetlink_google=debug"));
        assert!(directive.contains("sheetlink_server=debug"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = TracingConfig::default()
            .with_level(Level::WARN)
            .with_format(TracingOutputFormat::Json)
            .with_env_filter("sheetlink_google=trace");

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, TracingOutputFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("sheetlink_google=trace"));
        assert!(config.env_filter().is_ok());
    }
}
