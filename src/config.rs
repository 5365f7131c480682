//! Configuration parsing for the driver.
//!
//! Supports:
//! - CLI arguments via clap, with underscore flag spellings
//! - Environment variable overrides for the peer and observability
//! - Validation and conversion into a [`TestSession`]

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::clock::now_seconds;
use crate::driver::MAX_RECEIVE_SIZE;
use crate::error::{DriverError, Result};
use crate::flow::pacer::PacingMode;
use crate::payload::FillerMode;
use crate::session::{Address, Role, TestSession};

/// Largest `--max_message_length`; bodies must stay under the receive limit.
pub const MAX_MESSAGE_LENGTH: usize = MAX_RECEIVE_SIZE - 1;

/// Client name that is replaced by `client_<pid>`.
const PID_NAME: &str = "PID";

/// Which side of the traffic to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    Send,
    Receive,
}

impl From<Operation> for Role {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Send => Role::Sender,
            Operation::Receive => Role::Receiver,
        }
    }
}

/// amqp-driver: throttled AMQP 1.0 test traffic with flight-time capture.
#[derive(Parser, Debug, Clone)]
#[command(name = "amqp-driver")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Send or receive
    #[arg(long, value_enum, default_value_t = Operation::Receive)]
    pub operation: Operation,

    /// Target address (repeat for several)
    #[arg(long = "address", required = true)]
    pub addresses: Vec<String>,

    /// Client name; `PID` expands to `client_<pid>`
    #[arg(long, default_value = "default_name")]
    pub name: String,

    /// AMQP container id (default `<pid>_<epoch seconds>`)
    #[arg(long)]
    pub id: Option<String>,

    /// Peer host
    #[arg(long, env = "AMQP_DRIVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Peer port
    #[arg(long, env = "AMQP_DRIVER_PORT", default_value_t = 5672)]
    pub port: u16,

    /// Append-only log file
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Messages per address
    #[arg(long, default_value_t = 0)]
    pub messages: u64,

    /// Payload length in bytes
    #[arg(long = "max_message_length", default_value_t = 100)]
    pub max_message_length: usize,

    /// Random payload length and content
    #[arg(long = "random_payload")]
    pub random_payload: bool,

    /// Seconds between send batches; 0 sends as fast as credit allows
    #[arg(long, default_value_t = 0.0)]
    pub throttle: f64,

    /// Epoch time (seconds) before which nothing is sent; 0 disables
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Directory for the flight-times file
    #[arg(long = "flight_times_file_name")]
    pub flight_times_dir: Option<PathBuf>,

    /// Events file path (recorded in the startup log)
    #[arg(long = "events_path")]
    pub events_path: Option<PathBuf>,

    /// Run forever, flushing flight times after every quota
    #[arg(long)]
    pub soak: bool,

    /// Receiver credit window
    #[arg(long = "credit_window", default_value_t = 1000)]
    pub credit_window: u32,

    /// Seconds to wait before the final flight-time flush
    #[arg(long = "flush_delay", default_value_t = 200.0)]
    pub flush_delay: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the clap error for unknown or malformed flags, and for
    /// `--help`/`--version` (which the caller prints and exits 0 on).
    pub fn try_parse_args() -> std::result::Result<Self, clap::Error> {
        Self::try_parse()
    }

    /// Check value ranges clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_message_length == 0 || self.max_message_length > MAX_MESSAGE_LENGTH {
            return Err(DriverError::config(format!(
                "max_message_length must be between 1 and {MAX_MESSAGE_LENGTH}, got {}",
                self.max_message_length
            )));
        }
        if self.messages == 0 {
            return Err(DriverError::config("messages must be at least 1"));
        }
        if self.credit_window == 0 {
            return Err(DriverError::config("credit_window must be at least 1"));
        }
        for (flag, value) in [
            ("throttle", self.throttle),
            ("delay", self.delay),
            ("flush_delay", self.flush_delay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DriverError::config(format!(
                    "{flag} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if self.addresses.iter().any(|a| a.is_empty()) {
            return Err(DriverError::config("address must not be empty"));
        }
        Ok(())
    }

    /// Peer URL with SASL ANONYMOUS.
    pub fn url(&self) -> String {
        format!("amqp://{}:{}", self.host, self.port)
    }

    /// Log every configured value.
    pub fn log_context(&self) {
        tracing::info!(
            operation = ?self.operation,
            addresses = ?self.addresses,
            name = %self.name,
            id = ?self.id,
            url = %self.url(),
            log = ?self.log,
            messages = self.messages,
            max_message_length = self.max_message_length,
            random_payload = self.random_payload,
            throttle = self.throttle,
            delay = self.delay,
            flight_times_dir = ?self.flight_times_dir,
            events_path = ?self.events_path,
            soak = self.soak,
            credit_window = self.credit_window,
            flush_delay = self.flush_delay,
            "Client context"
        );
    }

    /// Validate and build the session for this process.
    pub fn into_session(self) -> Result<TestSession> {
        self.validate()?;
        let pid = std::process::id();

        let name = if self.name == PID_NAME {
            format!("client_{pid}")
        } else {
            self.name
        };
        let flight_times_path = match self.flight_times_dir {
            Some(dir) => dir.join(format!("{name}_flight_times")),
            None => PathBuf::from(format!("/tmp/flight_times_{pid}")),
        };
        let container_id = self
            .id
            .unwrap_or_else(|| format!("{pid}_{}", now_seconds() as u64));
        let filler = if self.random_payload {
            FillerMode::Random
        } else {
            FillerMode::Fixed
        };

        Ok(TestSession {
            role: self.operation.into(),
            name,
            container_id,
            link_prefix: pid.to_string(),
            addresses: self.addresses.into_iter().map(Address::new).collect(),
            messages_per_address: self.messages,
            pacing: PacingMode::from_throttle_secs(self.throttle),
            start_at: self.delay,
            credit_window: self.credit_window,
            soak: self.soak,
            filler,
            max_message_length: self.max_message_length,
            flight_times_path,
            flush_delay: self.flush_delay,
        })
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config(operation: Operation, addresses: &[&str]) -> Self {
        Self {
            operation,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            name: "default_name".into(),
            id: None,
            host: "127.0.0.1".into(),
            port: 5672,
            log: None,
            messages: 10,
            max_message_length: 100,
            random_payload: false,
            throttle: 0.0,
            delay: 0.0,
            flight_times_dir: None,
            events_path: None,
            soak: false,
            credit_window: 1000,
            flush_delay: 200.0,
            log_level: "debug".into(),
            otel_endpoint: None,
        }
    }
}
