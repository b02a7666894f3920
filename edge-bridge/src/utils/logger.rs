//! Logging Infrastructure
//!
//! Structured logging through `tracing`; optionally JSON and optionally
//! written to a daily rolling file.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Rolling file prefix
const LOG_FILE_PREFIX: &str = "edge-bridge";

/// Initialize the logger with defaults (info, text, stdout)
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON output and file output.
///
/// `RUST_LOG` takes precedence over `log_level` when set. Calling this more
/// than once is harmless; only the first subscriber is installed.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = json.unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // File output only when the directory already exists
    let file_dir = log_dir
        .map(Path::new)
        .filter(|p| p.is_dir())
        .and_then(Path::to_str);

    let result = match (file_dir, json) {
        (Some(dir), true) => builder
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            .try_init(),
        (Some(dir), false) => builder
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
            .try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
