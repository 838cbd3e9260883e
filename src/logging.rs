//! Logging setup for the service.
//!
//! Installs a global tracing subscriber with three sinks: the console, a
//! daily-rotating `app.log` under the log directory (at most a year of
//! files is kept), and an `error.log` that only receives ERROR events.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, prelude::*, EnvFilter, Registry};

const APP_LOG_FILE: &str = "app.log";
const ERROR_LOG_FILE: &str = "error.log";
/// Daily `app.log` files retained before the oldest is deleted
pub const MAX_LOG_FILES: usize = 365;

static LOG_GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to open rotating log file: {0}")]
    Appender(#[from] rolling::InitError),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Where and how verbosely to log
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            level: std::env::var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Initialize tracing. Subsequent calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    if LOG_GUARDS.get().is_some() {
        return Ok(());
    }

    fs::create_dir_all(&config.log_dir).map_err(|source| LoggingError::CreateDir {
        path: config.log_dir.clone(),
        source,
    })?;

    let (app_writer, app_guard) = tracing_appender::non_blocking(app_log_appender(&config.log_dir)?);
    let (error_writer, error_guard) =
        tracing_appender::non_blocking(rolling::never(&config.log_dir, ERROR_LOG_FILE));

    let subscriber = Registry::default()
        .with(build_env_filter(&config.level))
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(app_writer))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_writer.with_max_level(Level::ERROR)),
        );
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = LOG_GUARDS.set([app_guard, error_guard]);

    tracing::info!(log_dir = %config.log_dir.display(), level = %config.level, "Logging initialized");
    Ok(())
}

fn app_log_appender(log_dir: &Path) -> Result<RollingFileAppender, LoggingError> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(APP_LOG_FILE)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)?)
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
