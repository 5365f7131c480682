//! Logging and metrics setup.
//!
//! Provides:
//! - Structured logging to stderr and an optional append-only log file
//! - OpenTelemetry counters and histograms for driver traffic

pub mod metrics;
pub mod tracing;
