//! Logging configuration and initialization.
//!
//! The filter is taken from `RUST_LOG` when set, otherwise from the
//! `[logging]` section of config.toml. Output is pretty, compact or json.

use crate::config::LoggingConfig;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Resolved logging settings.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format.clone(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the `[logging]` level applies, and
/// with no settings at all the engine logs at info in pretty format. A
/// subscriber that is already installed stays in place.
pub fn init_logging(config: Option<&LogConfig>) {
    let env = std::env::var("RUST_LOG").ok();
    let env_filter = EnvFilter::new(filter_directive(env.as_deref(), config));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.map(|c| c.format.as_str()) {
        Some("json") => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
        Some("compact") => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().compact()),
        ),
        _ => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer()),
        ),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Filter directive for the subscriber: `RUST_LOG` first, then the
/// configured level.
fn filter_directive(env: Option<&str>, config: Option<&LogConfig>) -> String {
    match (env, config) {
        (Some(directive), _) => directive.to_string(),
        (None, Some(cfg)) => parse_level(&cfg.level).as_str().to_lowercase(),
        (None, None) => "info".to_string(),
    }
}

/// Unknown names fall back to info.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("unknown"), Level::INFO);
    }

    #[test]
    fn test_filter_directive_precedence() {
        let config = LogConfig {
            level: "debug".into(),
            format: "compact".into(),
        };
        assert_eq!(filter_directive(Some("fci=trace"), Some(&config)), "fci=trace");
        assert_eq!(filter_directive(None, Some(&config)), "debug");
        assert_eq!(filter_directive(None, None), "info");

        let bogus = LogConfig {
            level: "loud".into(),
            format: "json".into(),
        };
        assert_eq!(filter_directive(None, Some(&bogus)), "info");
    }

    #[test]
    fn test_from_logging_section() {
        let section = LoggingConfig {
            level: "debug".into(),
            format: "json".into(),
        };
        let config = LogConfig::from(&section);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "json");
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::new();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }
}
