//! Process-wide logging: console on stderr plus an append-only log file.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::{PipelineError, Result};

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// `verbose` raises the configured level to debug.
///
/// Should be called once at startup, before any phase runs.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(config, verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .map_err(|e| PipelineError::Config(format!("Failed to install logger: {}", e)))?;

    tracing::debug!("Logging to {}", config.log_file.display());
    Ok(())
}

fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.log_level.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        let config = LoggingConfig {
            log_level: " WARN ".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directive(&config, false), "warn");
        assert_eq!(filter_directive(&config, true), "debug");
    }

    #[test]
    fn test_unwritable_log_file_is_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            log_file: temp_dir.path().join("missing-dir").join("pipeline.log"),
            ..LoggingConfig::default()
        };
        assert!(matches!(init_logging(&config, false), Err(PipelineError::Io(_))));
    }
}
