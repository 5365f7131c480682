//! amqp-driver: throttled AMQP 1.0 test traffic with flight-time capture.
//!
//! # Usage
//!
//! ```bash
//! amqp-driver --operation send --address q1 --messages 1000 --throttle 0.01
//! amqp-driver --operation receive --address q1 --messages 1000 --flight_times_file_name /tmp
//! ```
//!
//! Environment variables can also be used:
//! - `AMQP_DRIVER_HOST`, `AMQP_DRIVER_PORT`: peer address
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: metrics export
//!
//! Exit codes: 0 on success, 1 on configuration or runtime errors, 2 when a
//! received message cannot be decoded.

use std::process::ExitCode;

use amqp_driver::config::Config;
use amqp_driver::driver::Driver;
use amqp_driver::engine::amqp::AmqpEngine;
use amqp_driver::engine::Runner;
use amqp_driver::observability::metrics::init_metrics_with_endpoint;
use amqp_driver::observability::tracing::init_tracing;
use amqp_driver::DriverError;
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    // Parse configuration from CLI arguments and environment
    let config = match Config::try_parse_args() {
        Ok(config) => config,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                // --help and --version
                ExitCode::SUCCESS
            };
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Driver failed");
            eprintln!("amqp-driver: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(config: Config) -> Result<(), DriverError> {
    // Initialize tracing/logging
    init_tracing(&config.log_level, config.log.as_deref())?;
    config.log_context();

    let url = config.url();
    let otel_endpoint = config.otel_endpoint.clone();
    let session = config.into_session()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // Initialize metrics (with optional OTLP export)
        init_metrics_with_endpoint(otel_endpoint.as_deref());

        let shutdown = CancellationToken::new();
        tokio::spawn(watch_signals(shutdown.clone()));

        let runner = Runner::new(Driver::new(session), AmqpEngine::new(url));
        runner.run(shutdown).await?;
        Ok::<(), DriverError>(())
    })
}

/// Cancel `shutdown` on SIGINT (Ctrl+C) or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                if ctrl_c.await.is_err() {
                    return;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if ctrl_c.await.is_err() {
            tracing::warn!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }

    shutdown.cancel();
}
