//! Logging setup for the publishing daemon and embedders
//!
//! All output goes to stderr. `RUST_LOG`, when set, overrides the level
//! chosen here.
//!
//! ```no_run
//! use libcrosspost::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const FORMAT_VAR: &str = "CROSSPOST_LOG_FORMAT";
const LEVEL_VAR: &str = "CROSSPOST_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line records
    Text,
    /// One JSON object per record, for log shippers
    Json,
    /// Multi-line colored output for local runs
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [LogFormat::Text, LogFormat::Json, LogFormat::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown log format '{}': expected text, json or pretty", s))
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces debug level unless `RUST_LOG` says otherwise
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Filter directive used when `RUST_LOG` is absent
    pub fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Install the global subscriber
    ///
    /// Only the first call in a process takes effect.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.directive()));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        // A subscriber installed earlier (tests, embedders) wins
        let _ = match self.format {
            LogFormat::Text => builder.with_target(false).try_init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .try_init(),
            LogFormat::Pretty => builder.pretty().with_line_number(true).try_init(),
        };
    }
}

/// Read `CROSSPOST_LOG_FORMAT` and `CROSSPOST_LOG_LEVEL`
///
/// Missing or unparseable values fall back to text at info level.
pub fn config_from_env(verbose: bool) -> LoggingConfig {
    let format = std::env::var(FORMAT_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LogFormat::Text);
    let level = std::env::var(LEVEL_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

    LoggingConfig::new(format, level, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);

        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Unknown log format 'xml'"));
    }

    #[test]
    fn test_log_format_display_matches_parse() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_verbose_forces_debug_directive() {
        let quiet = LoggingConfig::new(LogFormat::Text, "warn".to_string(), false);
        assert_eq!(quiet.directive(), "warn");

        let verbose = LoggingConfig::new(LogFormat::Text, "warn".to_string(), true);
        assert_eq!(verbose.directive(), "debug");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env() {
        std::env::set_var(FORMAT_VAR, "json");
        std::env::set_var(LEVEL_VAR, "warn");
        let config = config_from_env(false);
        std::env::remove_var(FORMAT_VAR);
        std::env::remove_var(LEVEL_VAR);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env_falls_back() {
        std::env::set_var(FORMAT_VAR, "xml");
        std::env::set_var(LEVEL_VAR, "  ");
        let config = config_from_env(true);
        std::env::remove_var(FORMAT_VAR);
        std::env::remove_var(LEVEL_VAR);

        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, DEFAULT_LEVEL);
        assert!(config.verbose);
    }
}
