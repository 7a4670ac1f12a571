//! Logging and tracing initialization for printlog.
//!
//! Structured logging through the `tracing` ecosystem, either as pretty
//! console output or as JSON for log aggregation.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

/// Configuration for the logging system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

impl From<&AppConfig> for LogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            json: config.json_logs,
            verbose: config.verbose,
        }
    }
}

impl LogConfig {
    fn default_directive(&self) -> String {
        let level = if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        format!("printlog={}", level.as_str().to_lowercase())
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Call once, early in `main()` and after config is loaded. `RUST_LOG`
/// overrides the default level.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_lowers_default_level() {
        let quiet = LogConfig::default();
        let verbose = LogConfig {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(quiet.default_directive(), "printlog=info");
        assert_eq!(verbose.default_directive(), "printlog=debug");
    }

    #[test]
    fn derives_from_app_config() {
        let config = AppConfig {
            json_logs: true,
            ..Default::default()
        };
        let log = LogConfig::from(&config);
        assert!(log.json);
        assert!(!log.verbose);
    }
}
