//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the level comes from the step's
//! logger configuration. Logs go to stderr so command output on stdout
//! stays machine readable.

use stampede_core::{LogMode, LoggerConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber for `config`.
pub fn init(config: &LoggerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.mode {
        LogMode::Development => builder.pretty().with_ansi(true).try_init(),
        LogMode::Production => builder.compact().with_ansi(false).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &LoggerConfig) -> String {
    config.level.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::LogLevel;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(&LoggerConfig::default()), "info");

        let config = LoggerConfig {
            level: LogLevel::Trace,
            mode: LogMode::Production,
        };
        assert_eq!(default_directive(&config), "trace");
    }
}
