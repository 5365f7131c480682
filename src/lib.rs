//! amqp-driver: a throttled AMQP 1.0 test-traffic driver.
//!
//! A single process acts either as a sender or as a receiver on one or more
//! AMQP addresses and reports throughput, flight times and delivery outcomes.
//! Runs are usually orchestrated in fleets, so the driver cooperates with its
//! peers: a shared start gate, append-only reports, and a delayed final flush.
//!
//! # Architecture
//!
//! - **Pure core**: [`driver::Driver`] maps each engine [`driver::Event`] to a
//!   list of [`driver::Command`]s and never touches the network
//! - **Pluggable engine**: [`engine::Engine`] executes commands and produces
//!   events; [`engine::amqp`] implements it on top of `fe2o3-amqp`
//! - **Single-threaded**: [`engine::Runner`] owns the driver and the engine on
//!   one current-thread runtime
//!
//! # Modules
//!
//! - [`clock`]: wall-clock timestamps and random helpers
//! - [`config`]: CLI and environment configuration
//! - [`driver`]: state machine, events, commands, outcome classification
//! - [`engine`]: runner loop and engine adapters
//! - [`error`]: error taxonomy and exit codes
//! - [`flow`]: credit accounting and the message pacer
//! - [`observability`]: tracing and metrics setup
//! - [`payload`]: timestamp-carrying message bodies
//! - [`session`]: the test session aggregate
//! - [`stats`]: counters and the flight-time collector

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // stats::StatsCollector is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::cast_precision_loss,     // Counters are converted to f64 for rates
    clippy::struct_excessive_bools,  // Config structs may have flags
    clippy::too_many_lines           // Some functions are inherently long
)]

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod flow;
pub mod observability;
pub mod payload;
pub mod session;
pub mod stats;

pub use error::{DriverError, Result};
