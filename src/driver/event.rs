//! Events fed into the driver and the commands it hands back.

use std::time::Duration;

use crate::payload::OutgoingMessage;
use crate::session::{LinkId, LinkSpec};
use crate::stats::DeliveryOutcome;

/// A delivery arriving on a receiver link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingDelivery {
    /// Engine-assigned tag, echoed back in [`Command::Accept`].
    pub tag: u64,
    /// Whether any bytes can be read yet.
    pub readable: bool,
    /// Whether more transfer frames are still expected.
    pub partial: bool,
    /// Total size of the delivery in bytes as announced by the engine.
    pub pending: usize,
    /// Bytes available so far.
    pub body: Vec<u8>,
}

impl IncomingDelivery {
    /// A fully received delivery.
    pub fn complete(tag: u64, body: Vec<u8>) -> Self {
        Self {
            tag,
            readable: true,
            partial: false,
            pending: body.len(),
            body,
        }
    }

    /// A delivery with only `body.len()` of `pending` bytes received so far.
    pub fn partial(tag: u64, pending: usize, body: Vec<u8>) -> Self {
        Self {
            tag,
            readable: !body.is_empty(),
            partial: true,
            pending,
            body,
        }
    }

    /// Whether the driver may decode this delivery now.
    pub fn is_complete(&self) -> bool {
        self.readable && !self.partial
    }
}

/// Something that happened, either in the engine or on a driver timer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The connection object exists; links can be requested.
    ConnectionInit,
    /// The peer attached a link.
    LinkOpened { link: LinkId },
    /// The peer granted `credit` more credit on a sender link.
    LinkFlow { link: LinkId, credit: u32 },
    /// The link was detached (by the peer or after a halt).
    LinkClosed { link: LinkId },
    /// Throttle timer fired.
    Wake,
    /// Start-gate backoff elapsed.
    Resume,
    /// A sent delivery reached a remote state.
    Outcome {
        link: LinkId,
        tag: u64,
        outcome: DeliveryOutcome,
    },
    /// A delivery arrived on a receiver link.
    Delivery {
        link: LinkId,
        delivery: IncomingDelivery,
    },
    /// The deferred flight-time flush is due.
    FlushDue,
    /// The process was asked to stop (Ctrl+C, SIGTERM).
    Interrupt,
    /// The engine has no more pending work.
    Inactive,
}

impl Event {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::LinkOpened { .. } => "link_opened",
            Self::LinkFlow { .. } => "link_flow",
            Self::LinkClosed { .. } => "link_closed",
            Self::Wake => "wake",
            Self::Resume => "resume",
            Self::Outcome { .. } => "outcome",
            Self::Delivery { .. } => "delivery",
            Self::FlushDue => "flush_due",
            Self::Interrupt => "interrupt",
            Self::Inactive => "inactive",
        }
    }
}

/// A side effect requested by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Attach one link per [`LinkSpec`] under the given container id.
    OpenLinks {
        container_id: String,
        links: Vec<LinkSpec>,
    },
    /// Transfer a message; `message.id` is the delivery tag.
    Send {
        link: LinkId,
        message: OutgoingMessage,
    },
    /// Settle a sent delivery.
    Settle { link: LinkId, tag: u64 },
    /// Accept and settle a received delivery.
    Accept { link: LinkId, tag: u64 },
    /// Set the receiver link's credit to `credit`.
    Flow { link: LinkId, credit: u32 },
    /// Deliver [`Event::Wake`] after the duration (replaces any pending wake).
    ScheduleWake(Duration),
    /// Deliver [`Event::Resume`] after the duration.
    Defer(Duration),
    /// Deliver [`Event::FlushDue`] after the duration.
    ScheduleFlush(Duration),
    /// Drop a pending deferred flush.
    CancelFlush,
    /// Close all links, the session and the connection.
    Halt,
}

impl Command {
    /// Whether the runner handles this command itself instead of the engine.
    pub fn is_timer(&self) -> bool {
        matches!(
            self,
            Self::ScheduleWake(_) | Self::Defer(_) | Self::ScheduleFlush(_) | Self::CancelFlush
        )
    }
}
