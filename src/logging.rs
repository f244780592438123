//! Logging initialization
//!
//! Structured logging via `tracing` to stderr, human-readable or JSON.
//! `GEOKIT_LOG` takes precedence over the configured level and `-v` flags.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

impl LogFormat {
    /// Parse the `logging.format` configuration value
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Raise `base` by `verbosity` steps, saturating at `trace`.
#[must_use]
pub fn effective_level(base: &str, verbosity: u8) -> &'static str {
    let start = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(base))
        .unwrap_or(2);
    LEVELS[(start + usize::from(verbosity)).min(LEVELS.len() - 1)]
}

/// Filter directive: dependencies stay at `warn`, this crate at `level`
#[must_use]
pub fn directive(level: &str) -> String {
    format!("warn,geokit={level}")
}

/// Initializes the global tracing subscriber.
///
/// Uses `try_init()` so calling this more than once (e.g. in tests) is safe.
pub fn init_logging(format: LogFormat, level: &str, verbosity: u8) {
    let level = effective_level(level, verbosity);
    let filter =
        EnvFilter::try_from_env("GEOKIT_LOG").unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let show_target = verbosity >= 2;

    match format {
        LogFormat::Pretty => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("info", 0, "info")]
    #[case("info", 1, "debug")]
    #[case("info", 2, "trace")]
    #[case("warn", 1, "info")]
    #[case("error", 255, "trace")]
    #[case("bogus", 0, "info")]
    fn test_effective_level(#[case] base: &str, #[case] verbosity: u8, #[case] expected: &str) {
        assert_eq!(effective_level(base, verbosity), expected);
    }

    #[test]
    fn test_directive() {
        assert_eq!(directive("debug"), "warn,geokit=debug");
    }

    #[test]
    fn test_log_format_from_config() {
        assert_eq!(LogFormat::from_config("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_config("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn init_logging_does_not_panic() {
        init_logging(LogFormat::Pretty, "info", 0);
        init_logging(LogFormat::Json, "warn", 3);
    }
}
