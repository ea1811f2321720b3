//! Pipeline telemetry and logging setup.
//!
//! Metrics are lock-free atomic counters updated from the render thread
//! and the worker pool; [`TelemetrySnapshot`] is a point-in-time copy for
//! display.
//!
//! ```text
//! Pipeline stages ────► PipelineMetrics ────► TelemetrySnapshot ────► Views
//!                       (atomic counters)    (point-in-time copy)     (CLI, logs)
//! ```

mod metrics;

pub use metrics::{PipelineMetrics, TelemetrySnapshot};

use std::path::Path;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::EnvFilter;

/// Errors from logging initialization.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// Log directory could not be created.
    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Initializes the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set, falling back to `default_filter`
/// (e.g. `"terratile=info"`). When `log_dir` is given, output goes to a
/// daily-rolled file in that directory instead of stderr; keep the
/// returned guard alive for the life of the process or buffered lines are
/// lost.
pub fn init_logging(
    default_filter: &str,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Local timestamps when the offset is knowable, UTC otherwise
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "terratile.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(timer)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;
            Ok(None)
        }
    }
}
