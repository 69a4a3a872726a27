//! Logging initialization for hosts embedding the form.
//!
//! File logging writes to `<logging.directory>/stepform-{datetime}.log`,
//! otherwise logs go to stderr.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set when file logging is enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Log level directive: `RUST_LOG` wins, then `--debug`, then config
fn filter_directive(config: &Config, debug_override: bool) -> String {
    let log_level = if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    std::env::var("RUST_LOG").unwrap_or(log_level)
}

fn log_file_name(now: DateTime<Utc>) -> String {
    format!("stepform-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed. The returned handle must be
/// kept alive for buffered file output to be flushed.
pub fn init_logging(config: &Config, debug_override: bool) -> Result<LoggingHandle> {
    let filter = EnvFilter::new(filter_directive(config, debug_override));

    if config.logging.to_file {
        let logs_dir = config.logs_path();
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;

        let log_filename = log_file_name(Utc::now());
        let log_file_path = logs_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&logs_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false) // No ANSI codes in log files
                    .with_writer(non_blocking),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.logging.directory = temp_dir.path().join("logs").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_logs_path_follows_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let logs_dir = config.logs_path();
        assert!(logs_dir.ends_with("logs"));
        assert!(logs_dir.starts_with(temp_dir.path()));
    }

    #[test]
    fn test_log_file_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(log_file_name(now), "stepform-20240309T140507Z.log");
    }

    #[test]
    fn test_debug_override_beats_config_level() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.logging.level = "warn".to_string();

        // RUST_LOG may be set by the environment running the tests
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(filter_directive(&config, true), "debug");
            assert_eq!(filter_directive(&config, false), "warn");
        }
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.logging.to_file = true;

        // Another test may already own the global subscriber; the directory
        // is created before installation either way.
        let result = init_logging(&config, false);
        assert!(config.logs_path().is_dir());
        if let Ok(handle) = result {
            let path = handle.log_file_path.unwrap();
            assert!(path.starts_with(config.logs_path()));
            assert!(path.to_string_lossy().ends_with(".log"));
        }
    }
}
