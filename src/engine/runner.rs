//! The single-threaded event loop.
//!
//! Waits on the interrupt token, the wake and resume timers, the deferred
//! flush and the engine, feeds each wakeup into the driver, and carries out
//! the returned commands. Runs until the engine is inactive and no deferred
//! flush is pending.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use super::{DeferredFlush, Engine};
use crate::clock::now_seconds;
use crate::driver::{Command, Driver, Event};
use crate::error::Result;
use crate::stats::RunSummary;

type Timer = Option<Pin<Box<Sleep>>>;

/// Source of epoch-seconds timestamps.
pub type Clock = Box<dyn Fn() -> f64 + Send>;

/// Owns a driver and an engine and runs them to completion.
pub struct Runner<E: Engine> {
    driver: Driver,
    engine: E,
    clock: Clock,
    wake: Timer,
    resume: Timer,
    deferred: Option<DeferredFlush>,
}

impl<E: Engine> Runner<E> {
    /// Create a runner on the wall clock.
    pub fn new(driver: Driver, engine: E) -> Self {
        Self::with_clock(driver, engine, Box::new(now_seconds))
    }

    /// Create a runner with a custom clock.
    pub fn with_clock(driver: Driver, engine: E, clock: Clock) -> Self {
        Self {
            driver,
            engine,
            clock,
            wake: None,
            resume: None,
            deferred: None,
        }
    }

    /// Run until the engine is inactive and any deferred flush has run.
    ///
    /// Cancelling `shutdown` delivers [`Event::Interrupt`] to the driver once.
    ///
    /// # Errors
    ///
    /// Returns the first fatal driver or engine error. The engine is asked to
    /// halt before the error is returned.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<RunSummary> {
        let mut engine_done = false;
        let mut interrupted = false;

        while !(engine_done && self.deferred.is_none()) {
            let event = tokio::select! {
                () = shutdown.cancelled(), if !interrupted => {
                    interrupted = true;
                    Event::Interrupt
                }
                () = wait_timer(&mut self.wake) => {
                    self.wake = None;
                    Event::Wake
                }
                () = wait_timer(&mut self.resume) => {
                    self.resume = None;
                    Event::Resume
                }
                fired = wait_deferred(&mut self.deferred) => {
                    self.deferred = None;
                    if !fired {
                        continue;
                    }
                    Event::FlushDue
                }
                event = self.engine.next_event(), if !engine_done => match event {
                    Some(Event::Inactive) | None => {
                        engine_done = true;
                        Event::Inactive
                    }
                    Some(event) => event,
                },
            };

            if let Err(e) = self.dispatch(event).await {
                tracing::error!(error = %e, "Fatal error, halting");
                if !engine_done {
                    if let Err(halt_error) = self.engine.execute(Command::Halt).await {
                        tracing::warn!(error = %halt_error, "Halt after error failed");
                    }
                }
                return Err(e);
            }
        }

        let summary = self.driver.summary();
        match serde_json::to_string(&summary) {
            Ok(json) => tracing::info!(summary = %json, "Run summary"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize run summary"),
        }
        tracing::info!("client exiting");
        Ok(summary)
    }

    async fn dispatch(&mut self, event: Event) -> Result<()> {
        let now = (self.clock)();
        let commands = self.driver.handle(event, now)?;
        for command in commands {
            self.apply(command).await?;
        }
        Ok(())
    }

    async fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ScheduleWake(after) => self.wake = Some(timer(after)),
            Command::Defer(after) => self.resume = Some(timer(after)),
            Command::ScheduleFlush(after) => {
                if let Some(previous) = self.deferred.take() {
                    previous.cancel();
                }
                tracing::debug!(delay_secs = after.as_secs_f64(), "Deferred flush scheduled");
                self.deferred = Some(DeferredFlush::schedule(after));
            }
            Command::CancelFlush => {
                if let Some(deferred) = self.deferred.take() {
                    deferred.cancel();
                    tracing::debug!("Deferred flush cancelled");
                }
            }
            Command::Halt => {
                self.wake = None;
                self.resume = None;
                self.engine.execute(Command::Halt).await?;
            }
            command => self.engine.execute(command).await?,
        }
        Ok(())
    }
}

fn timer(after: Duration) -> Pin<Box<Sleep>> {
    Box::pin(tokio::time::sleep(after))
}

async fn wait_timer(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn wait_deferred(deferred: &mut Option<DeferredFlush>) -> bool {
    match deferred {
        Some(flush) => flush.fired().await,
        None => pending().await,
    }
}
