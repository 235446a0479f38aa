//! Structured logging setup for Image Stash
//!
//! Builds a `tracing` subscriber from the host's logging preferences: an env
//! filter, terminal output in plain or JSON format, and an optional
//! daily-rolling log file with a non-blocking writer.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Error types for logging setup
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging error: {0}")]
    Init(String),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Directory for the rolling log file; `None` logs to the terminal only.
    pub file_directory: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_directory: None,
        }
    }
}

/// Initialize the global subscriber. Returns the appender guard, which must be
/// kept alive for file logging to flush; `None` when no file is configured.
pub fn init_logging(options: &LogOptions) -> LoggingResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    let terminal_layer = if options.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let (file_layer, guard) = match &options.file_directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, directory, "image_stash.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(terminal_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    info!(level = %options.level, json = options.json, "logging initialized");
    Ok(guard)
}
