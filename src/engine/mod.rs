//! Engines and the runner loop.
//!
//! An [`Engine`] turns driver [`Command`]s into protocol actions and reports
//! what happened as [`Event`]s. The [`Runner`] owns one engine and one
//! [`Driver`](crate::driver::Driver) and carries out the timer commands
//! itself.

pub mod amqp;
pub mod deferred;
pub mod runner;

pub use deferred::DeferredFlush;
pub use runner::Runner;

use crate::driver::{Command, Event};
use crate::error::Result;

/// A protocol engine driven by the runner.
///
/// Engines never see the timer commands ([`Command::is_timer`]).
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Next event, or `None` once the engine has shut down and has nothing
    /// more to report.
    async fn next_event(&mut self) -> Option<Event>;

    /// Carry out a non-timer command.
    async fn execute(&mut self, command: Command) -> Result<()>;
}
