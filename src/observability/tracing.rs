//! Structured logging setup.
//!
//! Configures:
//! - Console logging to stderr
//! - An optional append-only log file stamped with epoch seconds

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::clock::now_seconds;

/// Timestamps as fractional seconds since the Unix epoch (`%.6f`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochSeconds;

impl FormatTime for EpochSeconds {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{:.6}", now_seconds())
    }
}

/// Initialize logging.
///
/// This sets up:
/// - Environment-based filter (via RUST_LOG), falling back to `level`
/// - Console logging to stderr
/// - File logging when `log_file` is given, opened in append mode
///
/// # Arguments
///
/// * `level` - Default filter directive when RUST_LOG is unset
/// * `log_file` - Optional path of the append-only log file
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_timer(EpochSeconds),
            )
        }
        None => None,
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::debug!(log_file = ?log_file, "Tracing initialized");
    Ok(())
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
