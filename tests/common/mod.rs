//! Test utilities for driver integration tests.
//!
//! Provides:
//! - An in-memory scripted engine standing in for an AMQP peer
//! - A paused-time clock for the runner
//! - Temporary flight-times fixtures

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use amqp_driver::config::Config;
use clap::Parser;
use amqp_driver::driver::{Command, Event, IncomingDelivery};
use amqp_driver::engine::runner::Clock;
use amqp_driver::engine::Engine;
use amqp_driver::observability::tracing::init_test_tracing;
use amqp_driver::payload::encode;
use amqp_driver::session::{LinkId, TestSession};
use amqp_driver::stats::DeliveryOutcome;
use amqp_driver::Result;
use tempfile::TempDir;
use tokio::time::Instant;

/// Epoch time the test clock starts at.
pub const CLOCK_BASE: f64 = 1_000.0;

/// Runner clock that follows tokio's (possibly paused) time.
pub fn test_clock() -> Clock {
    let start = Instant::now();
    Box::new(move || CLOCK_BASE + start.elapsed().as_secs_f64())
}

/// Test fixture that manages a temporary flight-times directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for flight-time reports
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a temporary directory.
    pub fn new() -> Self {
        init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    /// Build a session from CLI-style arguments, reporting into the fixture.
    pub fn session(&self, args: &[&str]) -> TestSession {
        let dir = self.temp_dir.path().to_str().expect("invalid path");
        let mut argv = vec!["amqp-driver", "--name", "it", "--flight_times_file_name", dir];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv)
            .expect("invalid arguments")
            .into_session()
            .expect("invalid configuration")
    }

    /// Path the sessions built by [`TestFixture::session`] report to.
    pub fn flight_times_path(&self) -> PathBuf {
        self.temp_dir.path().join("it_flight_times")
    }

    /// Lines in the flight-times report, or none if it does not exist.
    pub fn flight_time_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.flight_times_path())
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A command as seen by the engine, with the tokio time it arrived.
#[derive(Debug, Clone)]
pub struct Executed {
    pub at: Instant,
    pub command: Command,
}

/// Shared log of executed commands.
pub type CommandLog = Arc<Mutex<Vec<Executed>>>;

/// In-memory peer.
///
/// Sender links get `sender_credit` on attach and every send settles
/// immediately with `outcome`. Receiver links deliver queued bodies as credit
/// allows. Halt closes every link and then ends the event stream.
pub struct ScriptedEngine {
    queue: VecDeque<Event>,
    log: CommandLog,
    sender_credit: u32,
    outcome: DeliveryOutcome,
    inbox: HashMap<LinkId, VecDeque<Vec<u8>>>,
    links: Vec<LinkId>,
    next_tag: u64,
    halted: bool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::from([Event::ConnectionInit]),
            log: Arc::new(Mutex::new(Vec::new())),
            sender_credit: 100,
            outcome: DeliveryOutcome::Accepted,
            inbox: HashMap::new(),
            links: Vec::new(),
            next_tag: 0,
            halted: false,
        }
    }

    pub fn with_sender_credit(mut self, credit: u32) -> Self {
        self.sender_credit = credit;
        self
    }

    pub fn with_outcome(mut self, outcome: DeliveryOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Queue a raw body for delivery on `link`.
    pub fn with_body(mut self, link: usize, body: Vec<u8>) -> Self {
        self.inbox.entry(LinkId(link)).or_default().push_back(body);
        self
    }

    /// Queue `count` well-formed messages stamped at the test clock base.
    pub fn with_messages(mut self, link: usize, count: usize) -> Self {
        for _ in 0..count {
            self = self.with_body(link, encode(CLOCK_BASE, "xxxx").into_bytes());
        }
        self
    }

    /// Handle on the command log that outlives the engine.
    pub fn log(&self) -> CommandLog {
        Arc::clone(&self.log)
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScriptedEngine {
    async fn next_event(&mut self) -> Option<Event> {
        match self.queue.pop_front() {
            Some(event) => Some(event),
            None if self.halted => None,
            None => std::future::pending().await,
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        self.log.lock().unwrap().push(Executed {
            at: Instant::now(),
            command: command.clone(),
        });
        match command {
            Command::OpenLinks { links, .. } => {
                for spec in links {
                    self.links.push(spec.id);
                    self.queue.push_back(Event::LinkOpened { link: spec.id });
                    if spec.role == amqp_driver::session::Role::Sender {
                        self.queue.push_back(Event::LinkFlow {
                            link: spec.id,
                            credit: self.sender_credit,
                        });
                    }
                }
            }
            Command::Send { link, message } => {
                self.queue.push_back(Event::Outcome {
                    link,
                    tag: message.id,
                    outcome: self.outcome,
                });
                self.queue.push_back(Event::LinkFlow { link, credit: 1 });
            }
            Command::Flow { link, credit } => {
                let inbox = self.inbox.entry(link).or_default();
                for _ in 0..credit {
                    let Some(body) = inbox.pop_front() else {
                        break;
                    };
                    let tag = self.next_tag;
                    self.next_tag += 1;
                    self.queue.push_back(Event::Delivery {
                        link,
                        delivery: IncomingDelivery::complete(tag, body),
                    });
                }
            }
            Command::Halt => {
                if !self.halted {
                    self.halted = true;
                    for link in &self.links {
                        self.queue.push_back(Event::LinkClosed { link: *link });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Commands of one kind from the log.
pub fn executed<F>(log: &CommandLog, filter: F) -> Vec<Executed>
where
    F: Fn(&Command) -> bool,
{
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| filter(&e.command))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.flight_time_lines().is_empty());
    }
}
