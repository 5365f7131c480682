//! The event-driven test driver.
//!
//! [`Driver::handle`] maps one [`Event`] to the [`Command`]s the runner and
//! engine must carry out. It never touches the network; the only I/O it
//! performs is appending flight times on flush.
//!
//! Lifecycle: `Connecting → Negotiating → Active → Draining → Terminated`.

pub mod event;
pub mod outcome;

pub use event::{Command, Event, IncomingDelivery};
pub use outcome::{ReceiverVerdict, SenderVerdict};

use outcome::{classify_sender, receiver_verdict};

use std::collections::HashMap;
use std::time::Duration;

use crate::clock::duration_from_secs;
use crate::error::{DriverError, Result};
use crate::flow::credit::LinkCredit;
use crate::flow::pacer::{Pacer, PacingMode};
use crate::observability::metrics;
use crate::payload::{decode_timestamp, PayloadFactory, MAX_OUTGOING_SIZE};
use crate::session::{LinkId, Role, TestSession};
use crate::stats::flight::LatencySample;
use crate::stats::{DeliveryOutcome, RunSummary, StatsCollector};

/// Largest incoming delivery accepted, in bytes.
pub const MAX_RECEIVE_SIZE: usize = 2_000_000;

/// Receives between progress log lines.
const PROGRESS_EVERY: u64 = 10;

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Connecting,
    Negotiating,
    Active,
    Draining,
    Terminated,
}

#[derive(Debug, Default, Clone, Copy)]
struct LinkState {
    opened: bool,
    closed: bool,
    credit: LinkCredit,
}

/// Owns the session and reacts to events.
#[derive(Debug)]
pub struct Driver {
    session: TestSession,
    stats: StatsCollector,
    pacer: Pacer,
    payloads: PayloadFactory,
    links: Vec<LinkState>,
    /// Sent tags awaiting a terminal outcome.
    in_flight: HashMap<u64, LinkId>,
    state: DriverState,
    first_send_at: Option<f64>,
    wake_scheduled: bool,
    resume_scheduled: bool,
    halt_requested: bool,
    flush_pending: bool,
}

impl Driver {
    /// Create a driver with an entropy-seeded payload factory.
    pub fn new(session: TestSession) -> Self {
        let payloads = PayloadFactory::new(session.filler, session.max_message_length);
        Self::with_payloads(session, payloads)
    }

    /// Create a driver with a caller-supplied payload factory.
    pub fn with_payloads(session: TestSession, payloads: PayloadFactory) -> Self {
        let capacity = match session.role {
            Role::Receiver => usize::try_from(session.total_expected()).unwrap_or(usize::MAX),
            Role::Sender => 0,
        };
        Self {
            stats: StatsCollector::new(capacity),
            pacer: Pacer::new(session.pacing, session.start_at),
            links: vec![LinkState::default(); session.addresses.len()],
            in_flight: HashMap::new(),
            state: DriverState::Connecting,
            first_send_at: None,
            wake_scheduled: false,
            resume_scheduled: false,
            halt_requested: false,
            flush_pending: false,
            payloads,
            session,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn session(&self) -> &TestSession {
        &self.session
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Whether a deferred flush is scheduled and not yet run.
    pub fn flush_pending(&self) -> bool {
        self.flush_pending
    }

    /// Epoch time of the first send, if any.
    pub fn first_send_at(&self) -> Option<f64> {
        self.first_send_at
    }

    /// Number of sent deliveries not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn summary(&self) -> RunSummary {
        self.stats.summary()
    }

    /// Handle one event at epoch time `now`.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal conditions: an oversized or undecodable
    /// delivery, an oversized outgoing message, an event for a link that was
    /// never requested, or a failed flush.
    pub fn handle(&mut self, event: Event, now: f64) -> Result<Vec<Command>> {
        let mut out = Vec::new();
        // A deferred flush (and an interrupt cutting it short) outlives the engine.
        let late_ok = matches!(event, Event::FlushDue | Event::Interrupt);
        if self.state == DriverState::Terminated && !late_ok {
            tracing::debug!(event = event.kind(), "Event after termination ignored");
            return Ok(out);
        }
        tracing::trace!(event = event.kind(), state = ?self.state, "Handling event");

        match event {
            Event::ConnectionInit => self.on_connection_init(&mut out),
            Event::LinkOpened { link } => self.on_link_opened(link, &mut out)?,
            Event::LinkFlow { link, credit } => self.on_link_flow(link, credit, now, &mut out)?,
            Event::LinkClosed { link } => self.on_link_closed(link, &mut out)?,
            Event::Wake => {
                self.wake_scheduled = false;
                self.throttle_batch(now, &mut out)?;
            }
            Event::Resume => self.on_resume(now, &mut out)?,
            Event::Outcome { link, tag, outcome } => {
                self.on_outcome(link, tag, outcome, now, &mut out)?
            }
            Event::Delivery { link, delivery } => {
                self.on_delivery(link, delivery, now, &mut out)?
            }
            Event::FlushDue => {
                self.flush_pending = false;
                self.flush_now()?;
            }
            Event::Interrupt => self.on_interrupt(&mut out)?,
            Event::Inactive => {
                tracing::info!("Engine inactive");
                self.state = DriverState::Terminated;
            }
        }
        Ok(out)
    }

    fn on_connection_init(&mut self, out: &mut Vec<Command>) {
        self.state = DriverState::Negotiating;
        let links = self.session.link_specs();
        tracing::info!(
            container_id = %self.session.container_id,
            links = links.len(),
            role = %self.session.role,
            "Connection initialized, opening links"
        );
        out.push(Command::OpenLinks {
            container_id: self.session.container_id.clone(),
            links,
        });
    }

    fn on_link_opened(&mut self, link: LinkId, out: &mut Vec<Command>) -> Result<()> {
        let window = self.session.credit_window;
        let role = self.session.role;

        let state = self.link_mut(link)?;
        state.opened = true;
        if role == Role::Receiver {
            state.credit.replenish_to(window);
            out.push(Command::Flow {
                link,
                credit: window,
            });
        }
        tracing::info!(link = %link, address = %self.address_path(link), "Link opened");

        if self.links.iter().all(|l| l.opened) && self.state == DriverState::Negotiating {
            self.state = DriverState::Active;
            tracing::info!(links = self.links.len(), "All links attached");
        }

        if role == Role::Sender
            && self.pacer.mode().is_throttled()
            && !self.wake_scheduled
            && self.pacer.last_batch().is_none()
        {
            self.schedule_wake(Duration::ZERO, out);
        }
        Ok(())
    }

    fn on_link_flow(
        &mut self,
        link: LinkId,
        credit: u32,
        now: f64,
        out: &mut Vec<Command>,
    ) -> Result<()> {
        let total = self.link_mut(link)?.credit.grant(credit);
        tracing::trace!(link = %link, granted = credit, total, "Credit granted");
        if self.session.role == Role::Sender && self.pacer.mode() == PacingMode::CreditDriven {
            self.send_burst(link, now, out)?;
        }
        Ok(())
    }

    fn on_link_closed(&mut self, link: LinkId, out: &mut Vec<Command>) -> Result<()> {
        self.link_mut(link)?.closed = true;
        if self.halt_requested {
            tracing::debug!(link = %link, "Link closed");
            return Ok(());
        }
        tracing::warn!(link = %link, address = %self.address_path(link), "Link closed by peer");
        if self.links.iter().all(|l| l.closed) {
            tracing::warn!("All links closed, halting");
            self.request_halt(out);
        }
        Ok(())
    }

    fn on_resume(&mut self, now: f64, out: &mut Vec<Command>) -> Result<()> {
        self.resume_scheduled = false;
        if self.session.role != Role::Sender {
            return Ok(());
        }
        match self.pacer.mode() {
            PacingMode::Throttled { .. } => self.throttle_batch(now, out),
            PacingMode::CreditDriven => {
                for i in 0..self.links.len() {
                    let link = LinkId(i);
                    if self.links[i].credit.available() > 0 {
                        self.send_burst(link, now, out)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn on_outcome(
        &mut self,
        link: LinkId,
        tag: u64,
        outcome: DeliveryOutcome,
        now: f64,
        out: &mut Vec<Command>,
    ) -> Result<()> {
        if outcome == DeliveryOutcome::Received {
            tracing::trace!(link = %link, tag, "Delivery received by peer, not yet settled");
            return Ok(());
        }
        if self.in_flight.remove(&tag).is_none() {
            tracing::warn!(link = %link, tag, outcome = %outcome, "Outcome for unknown or settled delivery ignored");
            return Ok(());
        }
        out.push(Command::Settle { link, tag });
        metrics::record_outcome(self.address_path(link), outcome);

        let verdict = classify_sender(
            &mut self.stats,
            outcome,
            self.session.total_expected(),
            self.session.soak,
            self.first_send_at,
            now,
        );
        if let SenderVerdict::QuotaMet {
            accepted,
            elapsed,
            throughput,
        } = verdict
        {
            tracing::info!(accepted, elapsed, throughput, "All messages accepted");
            self.request_halt(out);
        }
        Ok(())
    }

    fn on_delivery(
        &mut self,
        link: LinkId,
        delivery: IncomingDelivery,
        now: f64,
        out: &mut Vec<Command>,
    ) -> Result<()> {
        self.link_mut(link)?;
        if !delivery.is_complete() {
            tracing::trace!(
                link = %link,
                tag = delivery.tag,
                pending = delivery.pending,
                "Incomplete delivery, waiting"
            );
            return Ok(());
        }
        if delivery.pending >= MAX_RECEIVE_SIZE {
            return Err(DriverError::MessageTooLarge {
                size: delivery.pending,
                limit: MAX_RECEIVE_SIZE,
            });
        }
        let sent_at = decode_timestamp(&delivery.body)?;
        out.push(Command::Accept {
            link,
            tag: delivery.tag,
        });

        self.stats.record(DeliveryOutcome::Received);
        if let Some(address) = self.session.address_mut(link) {
            address.received += 1;
        }
        let received = self.stats.lifetime().received;
        if received % PROGRESS_EVERY == 0 {
            tracing::info!(received, "Receive progress");
        }

        let sample = LatencySample::between(sent_at, now);
        if !self.stats.record_latency(sample) {
            tracing::trace!(link = %link, "Flight-time buffer full, sample dropped");
        }
        metrics::record_receive(self.address_path(link), sample.flight_time);
        self.links[link.0].credit.consume_saturating();

        let verdict = receiver_verdict(
            &self.stats,
            self.session.total_expected(),
            self.session.soak,
        );
        match verdict {
            ReceiverVerdict::Continue => self.replenish(link, out),
            ReceiverVerdict::FlushAndContinue => {
                tracing::info!(
                    received = self.stats.period().received,
                    "Soak period complete, flushing"
                );
                self.flush_now()?;
                self.replenish(link, out);
            }
            ReceiverVerdict::FlushLaterAndHalt => {
                if !self.flush_pending {
                    let delay = duration_from_secs(self.session.flush_delay);
                    tracing::info!(
                        received = self.stats.period().received,
                        delay_secs = delay.as_secs_f64(),
                        "All messages received, scheduling flush"
                    );
                    out.push(Command::ScheduleFlush(delay));
                    self.flush_pending = true;
                }
                self.request_halt(out);
            }
        }
        Ok(())
    }

    fn on_interrupt(&mut self, out: &mut Vec<Command>) -> Result<()> {
        tracing::info!("Interrupted, shutting down");
        if self.flush_pending {
            out.push(Command::CancelFlush);
            self.flush_pending = false;
        }
        if self.session.role == Role::Receiver {
            self.flush_now()?;
        }
        self.request_halt(out);
        Ok(())
    }

    /// Credit-driven burst on one sender link.
    fn send_burst(&mut self, link: LinkId, now: f64, out: &mut Vec<Command>) -> Result<()> {
        if self.halt_requested {
            return Ok(());
        }
        if let Some(wait) = self.pacer.gate(now) {
            self.defer(wait, out);
            return Ok(());
        }
        let state = self.links[link.0];
        if !state.opened || state.closed {
            tracing::trace!(link = %link, "No link yet, send abandoned");
            return Ok(());
        }
        let burst = self
            .pacer
            .burst(state.credit.available(), self.session.remaining_on(link));
        for _ in 0..burst {
            self.send_one(link, now, out)?;
        }
        Ok(())
    }

    /// One throttled fan-out batch, then the next wake.
    fn throttle_batch(&mut self, now: f64, out: &mut Vec<Command>) -> Result<()> {
        if self.halt_requested || self.session.role != Role::Sender {
            return Ok(());
        }
        if let Some(wait) = self.pacer.gate(now) {
            self.defer(wait, out);
            return Ok(());
        }
        if let Err(wait) = self.pacer.batch_due(now) {
            tracing::trace!(wait_secs = wait.as_secs_f64(), "Early wake, rescheduling");
            self.schedule_wake(wait, out);
            return Ok(());
        }

        let mut sent = 0;
        for i in 0..self.links.len() {
            let link = LinkId(i);
            let state = self.links[i];
            if !state.opened || state.closed {
                tracing::trace!(link = %link, "No link yet, send abandoned");
                continue;
            }
            if self.session.remaining_on(link) == Some(0) {
                continue;
            }
            self.send_one(link, now, out)?;
            sent += 1;
        }
        if sent > 0 {
            self.pacer.mark_batch(now);
        }

        let unbounded = self.session.soak;
        if unbounded || self.stats.lifetime().sent < self.session.total_expected() {
            if let Some(interval) = self.pacer.interval() {
                self.schedule_wake(interval, out);
            }
        } else {
            tracing::info!(sent = self.stats.lifetime().sent, "All messages sent");
        }
        Ok(())
    }

    fn send_one(&mut self, link: LinkId, now: f64, out: &mut Vec<Command>) -> Result<()> {
        let message = self.payloads.make(now);
        if message.body.len() > MAX_OUTGOING_SIZE {
            return Err(DriverError::EncodeOverflow {
                size: message.body.len(),
                limit: MAX_OUTGOING_SIZE,
            });
        }
        if self.first_send_at.is_none() {
            self.first_send_at = Some(now);
            tracing::info!(link = %link, at = now, "first send");
        }

        self.links[link.0].credit.consume_saturating();
        self.in_flight.insert(message.id, link);
        self.stats.record_sent();
        if let Some(address) = self.session.address_mut(link) {
            address.sent += 1;
        }
        metrics::record_sent(self.address_path(link));

        let total = self.session.total_expected();
        if self.session.soak && total > 0 && self.stats.period().sent >= total {
            tracing::info!(sent = total, "Soak period complete");
            self.stats.reset_period();
        }

        out.push(Command::Send { link, message });
        Ok(())
    }

    fn replenish(&mut self, link: LinkId, out: &mut Vec<Command>) {
        if self.halt_requested {
            return;
        }
        let window = self.session.credit_window;
        if self.links[link.0].credit.replenish_to(window) > 0 {
            out.push(Command::Flow {
                link,
                credit: window,
            });
        }
    }

    fn schedule_wake(&mut self, after: Duration, out: &mut Vec<Command>) {
        out.push(Command::ScheduleWake(after));
        self.wake_scheduled = true;
    }

    fn defer(&mut self, wait: Duration, out: &mut Vec<Command>) {
        if self.resume_scheduled {
            return;
        }
        tracing::debug!(wait_secs = wait.as_secs_f64(), "Start gate closed, deferring");
        out.push(Command::Defer(wait));
        self.resume_scheduled = true;
    }

    fn request_halt(&mut self, out: &mut Vec<Command>) {
        if self.halt_requested {
            return;
        }
        self.halt_requested = true;
        if self.state != DriverState::Terminated {
            self.state = DriverState::Draining;
        }
        out.push(Command::Halt);
    }

    fn flush_now(&mut self) -> Result<()> {
        let path = self.session.flight_times_path.clone();
        self.stats.flush(&path)?;
        Ok(())
    }

    fn link_mut(&mut self, link: LinkId) -> Result<&mut LinkState> {
        self.links
            .get_mut(link.0)
            .ok_or(DriverError::UnknownLink(link.0))
    }

    fn address_path(&self, link: LinkId) -> &str {
        self.session.address(link).map_or("", |a| a.path.as_str())
    }
}
