//! Logging infrastructure for TradeDash.
//!
//! Structured logging using the `tracing` ecosystem: JSON lines to a daily
//! rolling file under `~/.tradedash/logs/`, and a compact human-readable layer
//! on stderr.
//!
//! ## Example
//!
//! ```no_run
//! use tradedash_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("dashboard started");
//! tracing::debug!(region = "holdings", seq = 3, "dispatching fetch");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{DashError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the TradeDash logging system.
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.tradedash/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// `RUST_LOG` overrides the computed filter when set.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| DashError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tradedash.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tradedash={default_level},tradedash_core={default_level},tradedash_refresh={default_level}"
        ))
    });

    // JSON layer for file output
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    // Human-readable layer for console output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| DashError::internal(format!("logging already initialized: {e}")))?;

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the TradeDash home directory (`~/.tradedash/`).
pub fn home_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| DashError::Internal {
        message: "could not determine home directory".into(),
    })?;

    Ok(home.join(".tradedash"))
}

/// Get the default log directory path (`~/.tradedash/logs/`).
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join("logs"))
}

/// Convenience macro for logging region lifecycle events.
///
/// ```ignore
/// log_region_event!("holdings", "settled");
/// log_region_event!("holdings", "discarded", seq = 4);
/// ```
#[macro_export]
macro_rules! log_region_event {
    ($region:expr, $event:expr) => {
        tracing::debug!(
            target: "tradedash::region",
            region = $region,
            event = $event,
            "region event"
        )
    };
    ($region:expr, $event:expr, $($field:tt)*) => {
        tracing::debug!(
            target: "tradedash::region",
            region = $region,
            event = $event,
            $($field)*,
            "region event"
        )
    };
}
