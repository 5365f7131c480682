//! The test session aggregate.
//!
//! Built once from configuration, owned by the driver, and mutated only from
//! the driver's event handler.

use std::fmt;
use std::path::PathBuf;

use crate::flow::pacer::PacingMode;
use crate::payload::FillerMode;

/// Which side of the traffic this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a link; links map one-to-one onto configured addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One target address and its traffic counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub path: String,
    pub sent: u64,
    pub received: u64,
}

impl Address {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            sent: 0,
            received: 0,
        }
    }
}

/// What the engine should attach for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub id: LinkId,
    pub name: String,
    pub address: String,
    pub role: Role,
}

/// Root aggregate of a test run.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub role: Role,
    /// Client name used for the flight-times file.
    pub name: String,
    /// AMQP container id.
    pub container_id: String,
    /// Prefix for link names (the process id by default).
    pub link_prefix: String,
    pub addresses: Vec<Address>,
    /// Expected messages per address.
    pub messages_per_address: u64,
    pub pacing: PacingMode,
    /// Epoch time before which nothing is sent; 0 disables the gate.
    pub start_at: f64,
    pub credit_window: u32,
    pub soak: bool,
    pub filler: FillerMode,
    pub max_message_length: usize,
    pub flight_times_path: PathBuf,
    /// Delay before the final (non-soak) flight-time flush, in seconds.
    pub flush_delay: f64,
}

impl TestSession {
    /// Expected messages across all addresses.
    pub fn total_expected(&self) -> u64 {
        self.messages_per_address
            .saturating_mul(self.addresses.len() as u64)
    }

    /// Link specs in address order.
    pub fn link_specs(&self) -> Vec<LinkSpec> {
        let kind = match self.role {
            Role::Sender => "send",
            Role::Receiver => "recv",
        };
        self.addresses
            .iter()
            .enumerate()
            .map(|(i, address)| LinkSpec {
                id: LinkId(i),
                name: format!("{}_{}_{:05}", self.link_prefix, kind, i),
                address: address.path.clone(),
                role: self.role,
            })
            .collect()
    }

    pub fn address(&self, link: LinkId) -> Option<&Address> {
        self.addresses.get(link.0)
    }

    pub fn address_mut(&mut self, link: LinkId) -> Option<&mut Address> {
        self.addresses.get_mut(link.0)
    }

    /// Messages still owed on `link`, or `None` when unbounded (soak).
    pub fn remaining_on(&self, link: LinkId) -> Option<u64> {
        if self.soak {
            return None;
        }
        let sent = self.address(link).map_or(0, |a| a.sent);
        Some(self.messages_per_address.saturating_sub(sent))
    }
}

#[cfg(test)]
pub(crate) fn test_session(role: Role, addresses: &[&str], messages: u64) -> TestSession {
    TestSession {
        role,
        name: "test_client".into(),
        container_id: "test_container".into(),
        link_prefix: "42".into(),
        addresses: addresses.iter().map(|a| Address::new(*a)).collect(),
        messages_per_address: messages,
        pacing: PacingMode::CreditDriven,
        start_at: 0.0,
        credit_window: 10,
        soak: false,
        filler: FillerMode::Fixed,
        max_message_length: 100,
        flight_times_path: PathBuf::from("/tmp/test_flight_times"),
        flush_delay: 200.0,
    }
}
