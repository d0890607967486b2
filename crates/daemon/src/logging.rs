//! Tracing subscriber setup.
//!
//! Terminal output owns stdout, so logs go to stderr, or to a daily rolling
//! file when `log.directory` is configured.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// File name prefix for rolling log files.
const LOG_FILE_PREFIX: &str = "deckshell.log";

/// Returns the filter directive for the given settings.
///
/// `--verbose` raises the configured level to at least `debug`.
pub fn filter_directive(config: &LogConfig, verbose: bool) -> String {
    let level = config.level.to_lowercase();
    if verbose && matches!(level.as_str(), "info" | "warn" | "error") {
        "debug".to_string()
    } else {
        level
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the log file when dropped and must be held until exit.
pub fn init(config: &LogConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)));

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).with_context(|| {
                format!("Failed to create log directory: {}", directory.display())
            })?;

            let file_appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install tracing subscriber")?;

            Ok(None)
        }
    }
}
