//! Logging setup
//!
//! Provides dual-output logging:
//! - File: the run's own log inside its generation directory
//! - Console: stderr, same level
//!
//! The file is written synchronously so it is complete whenever it is read
//! back (merged into `last.log` or attached to the metrics report).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log file of the current run
    pub log_file: PathBuf,
    pub log_level: Level,
}

impl LoggingConfig {
    /// Create from config values; `debug` forces the debug level
    pub fn from_config(log_file: &Path, log_level: &str, debug: bool) -> Self {
        let level = if debug {
            Level::DEBUG
        } else {
            parse_level(log_level)
        };

        Self {
            log_file: log_file.to_path_buf(),
            log_level: level,
        }
    }
}

/// Map a configured level name to a tracing level (unknown names mean info)
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with file and console outputs
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let directory = config
        .log_file
        .parent()
        .context("Log file has no parent directory")?;
    let file_name = config
        .log_file
        .file_name()
        .context("Log file has no file name")?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);

    // File layer: detailed format, no colors
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(config.log_level));

    // Console layer: concise format
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(config.log_level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Initialize simple console-only logging (for when there is no run directory)
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

/// Level filter for one layer; `RUST_LOG` takes precedence when set
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}
