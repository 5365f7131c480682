//! AMQP 1.0 engine on top of `fe2o3-amqp`.
//!
//! One connection, one session, and one task per link. Link tasks own their
//! `fe2o3` link, take [`LinkCommand`]s over an mpsc channel and report back
//! through the shared event queue. They never see driver state.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::link::receiver::CreditMode;
use fe2o3_amqp::link::RecvError;
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::definitions::{ReceiverSettleMode, SenderSettleMode};
use fe2o3_amqp::types::messaging::{AmqpValue, Body, Outcome};
use fe2o3_amqp::types::primitives::Value;
use fe2o3_amqp::{Connection, Receiver, Sender, Session};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Engine;
use crate::driver::{Command, Event, IncomingDelivery};
use crate::error::{DriverError, Result};
use crate::payload::OutgoingMessage;
use crate::session::{LinkId, LinkSpec, Role};
use crate::stats::DeliveryOutcome;

/// Credit reported for a freshly attached sender link.
///
/// `fe2o3` keeps sender credit to itself and parks `send` until the peer
/// grants more, so the driver is handed a fixed pipeline depth and one
/// credit back per settled delivery.
pub const SEND_PIPELINE_DEPTH: u32 = 1000;

/// How long a link task may take to detach on halt.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Work for a link task.
#[derive(Debug)]
enum LinkCommand {
    Send(OutgoingMessage),
    Accept(u64),
    Flow(u32),
    Close,
}

struct LinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

/// `fe2o3-amqp` backed engine.
pub struct AmqpEngine {
    url: String,
    events_tx: Option<mpsc::UnboundedSender<Event>>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    links: HashMap<LinkId, LinkHandle>,
    session: Option<SessionHandle<()>>,
    connection: Option<ConnectionHandle<()>>,
}

impl AmqpEngine {
    /// Create an engine for `url` (`amqp://host:port`).
    ///
    /// [`Event::ConnectionInit`] is queued immediately; the connection is
    /// opened when the driver asks for links.
    pub fn new<S: Into<String>>(url: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(Event::ConnectionInit);
        Self {
            url: url.into(),
            events_tx: Some(events_tx),
            events_rx,
            links: HashMap::new(),
            session: None,
            connection: None,
        }
    }

    async fn open_links(&mut self, container_id: String, links: Vec<LinkSpec>) -> anyhow::Result<()> {
        let Some(events) = self.events_tx.clone() else {
            anyhow::bail!("engine already halted");
        };

        let mut connection = Connection::builder()
            .container_id(container_id.clone())
            .sasl_profile(SaslProfile::Anonymous)
            .open(self.url.as_str())
            .await
            .with_context(|| format!("failed to open connection to {}", self.url))?;
        tracing::info!(url = %self.url, container_id = %container_id, "Connection open");

        let mut session = Session::begin(&mut connection)
            .await
            .context("failed to begin session")?;

        for spec in links {
            let (commands, commands_rx) = mpsc::unbounded_channel();
            let task = match spec.role {
                Role::Sender => {
                    let sender = Sender::builder()
                        .name(spec.name.clone())
                        .target(spec.address.clone())
                        .sender_settle_mode(SenderSettleMode::Unsettled)
                        .receiver_settle_mode(ReceiverSettleMode::First)
                        .attach(&mut session)
                        .await
                        .with_context(|| format!("failed to attach sender {}", spec.name))?;
                    let _ = events.send(Event::LinkOpened { link: spec.id });
                    let _ = events.send(Event::LinkFlow {
                        link: spec.id,
                        credit: SEND_PIPELINE_DEPTH,
                    });
                    tokio::spawn(run_sender(spec.id, sender, commands_rx, events.clone()))
                }
                Role::Receiver => {
                    let receiver = Receiver::builder()
                        .name(spec.name.clone())
                        .source(spec.address.clone())
                        .credit_mode(CreditMode::Manual)
                        .attach(&mut session)
                        .await
                        .with_context(|| format!("failed to attach receiver {}", spec.name))?;
                    let _ = events.send(Event::LinkOpened { link: spec.id });
                    tokio::spawn(run_receiver(spec.id, receiver, commands_rx, events.clone()))
                }
            };
            tracing::debug!(link = %spec.id, name = %spec.name, address = %spec.address, "Link attached");
            self.links.insert(spec.id, LinkHandle { commands, task });
        }

        self.session = Some(session);
        self.connection = Some(connection);
        Ok(())
    }

    fn route(&self, link: LinkId, command: LinkCommand) -> Result<()> {
        let handle = self
            .links
            .get(&link)
            .ok_or(DriverError::UnknownLink(link.0))?;
        if handle.commands.send(command).is_err() {
            tracing::warn!(link = %link, "Link task gone, command dropped");
        }
        Ok(())
    }

    async fn halt(&mut self) {
        for (link, handle) in self.links.drain() {
            let _ = handle.commands.send(LinkCommand::Close);
            let mut task = handle.task;
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!(link = %link, "Link did not detach in time, aborting");
                task.abort();
            }
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.end().await {
                tracing::warn!(error = %e, "Failed to end session");
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "Failed to close connection");
            }
        }
        // Once the link tasks are gone this closes the event queue.
        self.events_tx = None;
        tracing::info!("Connection closed");
    }
}

impl Engine for AmqpEngine {
    async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::OpenLinks { container_id, links } => {
                self.open_links(container_id, links).await?;
            }
            Command::Send { link, message } => self.route(link, LinkCommand::Send(message))?,
            Command::Accept { link, tag } => self.route(link, LinkCommand::Accept(tag))?,
            Command::Flow { link, credit } => self.route(link, LinkCommand::Flow(credit))?,
            Command::Settle { link, tag } => {
                // Sender links settle on the peer's disposition.
                tracing::trace!(link = %link, tag, "Settled");
            }
            Command::Halt => self.halt().await,
            other => {
                debug_assert!(other.is_timer());
                tracing::warn!(command = ?other, "Timer command reached the engine, ignored");
            }
        }
        Ok(())
    }
}

fn classify(outcome: &Outcome) -> DeliveryOutcome {
    match outcome {
        Outcome::Accepted(_) => DeliveryOutcome::Accepted,
        Outcome::Rejected(_) => DeliveryOutcome::Rejected,
        Outcome::Released(_) => DeliveryOutcome::Released,
        Outcome::Modified(_) => DeliveryOutcome::Modified,
    }
}

/// Bytes of a received body as the driver decodes them.
///
/// String and binary values pass through, data sections are joined. Any other
/// body yields no bytes, which the driver rejects as undecodable.
fn body_bytes(body: &Body<Value>) -> Vec<u8> {
    match body {
        Body::Value(AmqpValue(Value::String(text))) => text.as_bytes().to_vec(),
        Body::Value(AmqpValue(Value::Binary(bytes))) => bytes.to_vec(),
        Body::Data(sections) => sections.iter().flat_map(|data| data.0.iter().copied()).collect(),
        other => {
            tracing::warn!(body = ?other, "Body is neither a string nor binary");
            Vec::new()
        }
    }
}

/// Whether a receive error means the message itself could not be decoded.
fn is_undecodable(error: &RecvError) -> bool {
    matches!(error, RecvError::MessageDecode(_))
}

async fn run_sender(
    link: LinkId,
    mut sender: Sender,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut outcomes = FuturesUnordered::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(message)) => {
                    let tag = message.id;
                    match sender.send_batchable(message.body).await {
                        Ok(fut) => outcomes.push(async move { (tag, fut.await) }),
                        Err(e) => {
                            tracing::warn!(link = %link, error = %e, "Send failed");
                            break;
                        }
                    }
                }
                Some(LinkCommand::Close) | None => break,
                Some(other) => {
                    tracing::debug!(link = %link, command = ?other, "Ignored on sender link");
                }
            },
            Some((tag, result)) = outcomes.next(), if !outcomes.is_empty() => {
                let outcome = match result {
                    Ok(outcome) => classify(&outcome),
                    Err(e) => {
                        tracing::warn!(link = %link, tag, error = %e, "Delivery failed");
                        DeliveryOutcome::Unknown
                    }
                };
                let _ = events.send(Event::Outcome { link, tag, outcome });
                let _ = events.send(Event::LinkFlow { link, credit: 1 });
            }
        }
    }

    if let Err(e) = sender.close().await {
        tracing::debug!(link = %link, error = %e, "Sender close failed");
    }
    let _ = events.send(Event::LinkClosed { link });
}

async fn run_receiver(
    link: LinkId,
    mut receiver: Receiver,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut unsettled = HashMap::new();
    let mut next_tag = 0u64;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Flow(credit)) => {
                    if let Err(e) = receiver.set_credit(credit).await {
                        tracing::warn!(link = %link, error = %e, "Failed to set credit");
                        break;
                    }
                }
                Some(LinkCommand::Accept(tag)) => {
                    let Some(delivery) = unsettled.remove(&tag) else {
                        tracing::warn!(link = %link, tag, "Accept for unknown delivery");
                        continue;
                    };
                    if let Err(e) = receiver.accept(&delivery).await {
                        tracing::warn!(link = %link, tag, error = %e, "Accept failed");
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => break,
                Some(other) => {
                    tracing::debug!(link = %link, command = ?other, "Ignored on receiver link");
                }
            },
            received = receiver.recv::<Body<Value>>() => match received {
                Ok(delivery) => {
                    let tag = next_tag;
                    next_tag += 1;
                    let body = body_bytes(delivery.body());
                    unsettled.insert(tag, delivery);
                    let _ = events.send(Event::Delivery {
                        link,
                        delivery: IncomingDelivery::complete(tag, body),
                    });
                }
                Err(e) if is_undecodable(&e) => {
                    // An empty body fails the driver's decode and ends the run.
                    tracing::error!(link = %link, error = %e, "Received message cannot be decoded");
                    let tag = next_tag;
                    next_tag += 1;
                    let _ = events.send(Event::Delivery {
                        link,
                        delivery: IncomingDelivery::complete(tag, Vec::new()),
                    });
                }
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "Receive failed");
                    break;
                }
            },
        }
    }

    if let Err(e) = receiver.close().await {
        tracing::debug!(link = %link, error = %e, "Receiver close failed");
    }
    let _ = events.send(Event::LinkClosed { link });
}
