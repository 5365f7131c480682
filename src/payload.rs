//! Timestamp-carrying message bodies.
//!
//! Every body starts with a fixed-width header holding the send time, so the
//! receiver never has to scan filler bytes to find where the timestamp ends:
//!
//! ```text
//! T 0123456789abcdef ; filler...
//! ^ 16 hex digits,   ^ terminator at a fixed offset
//! ```
//!
//! The configured length bounds the whole body. The filler is either `x`
//! padding up to that length or a random alphanumeric string of random length.

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::clock::{micros_to_seconds, random_filler, random_len, seconds_to_micros};

/// Length of the fixed header (`T` + 16 hex digits + `;`).
pub const HEADER_LEN: usize = 18;

/// Largest encoded body the driver will hand to the engine.
pub const MAX_OUTGOING_SIZE: usize = 2_000_000;

const MARKER: u8 = b'T';
const TERMINATOR: u8 = b';';

/// Error type for payload decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload too short: {0} bytes")]
    TooShort(usize),

    #[error("payload header is malformed")]
    BadHeader,

    #[error("payload timestamp is not hexadecimal")]
    BadTimestamp,
}

/// A message ready to be handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Monotonic sequence id, also used as the delivery tag.
    pub id: u64,
    /// Encoded body.
    pub body: String,
}

/// Encode a body carrying `sent_at` (epoch seconds) followed by `filler`.
#[must_use]
pub fn encode(sent_at: f64, filler: &str) -> String {
    let mut body = String::with_capacity(HEADER_LEN + filler.len());
    body.push(char::from(MARKER));
    body.push_str(&format!("{:016x}", seconds_to_micros(sent_at)));
    body.push(char::from(TERMINATOR));
    body.push_str(filler);
    body
}

/// Extract the embedded send time (epoch seconds) from a body.
pub fn decode_timestamp(body: &[u8]) -> Result<f64, PayloadError> {
    if body.len() < HEADER_LEN {
        return Err(PayloadError::TooShort(body.len()));
    }
    if body[0] != MARKER || body[HEADER_LEN - 1] != TERMINATOR {
        return Err(PayloadError::BadHeader);
    }
    let digits =
        std::str::from_utf8(&body[1..HEADER_LEN - 1]).map_err(|_| PayloadError::BadTimestamp)?;
    let micros = u64::from_str_radix(digits, 16).map_err(|_| PayloadError::BadTimestamp)?;
    Ok(micros_to_seconds(micros))
}

/// How message filler is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerMode {
    /// Pad with `x` to exactly `max_len` bytes (or just the header when shorter).
    Fixed,
    /// Random alphanumeric filler; the body length is uniform in
    /// `[HEADER_LEN, max_len)` (just the header when `max_len` is shorter).
    Random,
}

/// Builds outgoing messages with increasing sequence ids.
#[derive(Debug)]
pub struct PayloadFactory {
    mode: FillerMode,
    max_len: usize,
    next_id: u64,
    rng: StdRng,
}

impl PayloadFactory {
    /// Create a factory seeded from the OS.
    pub fn new(mode: FillerMode, max_len: usize) -> Self {
        Self::with_rng(mode, max_len, StdRng::from_entropy())
    }

    /// Create a factory with a caller-supplied generator.
    pub fn with_rng(mode: FillerMode, max_len: usize, rng: StdRng) -> Self {
        Self {
            mode,
            max_len,
            next_id: 0,
            rng,
        }
    }

    /// Id the next message will carry.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Build the next message stamped with `sent_at`.
    pub fn make(&mut self, sent_at: f64) -> OutgoingMessage {
        let filler = match self.mode {
            FillerMode::Fixed => "x".repeat(self.max_len.saturating_sub(HEADER_LEN)),
            FillerMode::Random => {
                let len = random_len(&mut self.rng, self.max_len.saturating_sub(HEADER_LEN));
                random_filler(&mut self.rng, len)
            }
        };
        let id = self.next_id;
        self.next_id += 1;
        OutgoingMessage {
            id,
            body: encode(sent_at, &filler),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_survives_encoding() {
        let body = encode(1_700_000_000.123_456, "xxxx");
        let ts = decode_timestamp(body.as_bytes()).unwrap();
        assert!((ts - 1_700_000_000.123_456).abs() < 1e-6);
    }

    #[test]
    fn test_filler_cannot_confuse_header() {
        // Filler full of terminators and digits is still ignored.
        let body = encode(12.5, ";;;;T0000000000000000;9999");
        assert!((decode_timestamp(body.as_bytes()).unwrap() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_timestamp(b"short"), Err(PayloadError::TooShort(5)));
        assert_eq!(
            decode_timestamp(b"X0000000000000000;"),
            Err(PayloadError::BadHeader)
        );
        assert_eq!(
            decode_timestamp(b"T00000000000000zz;"),
            Err(PayloadError::BadTimestamp)
        );
    }

    #[test]
    fn test_fixed_mode_pads_to_length() {
        let mut factory = PayloadFactory::with_rng(FillerMode::Fixed, 100, StdRng::seed_from_u64(1));
        let msg = factory.make(1.0);
        assert_eq!(msg.id, 0);
        assert_eq!(msg.body.len(), 100);
        assert!(msg.body[HEADER_LEN..].chars().all(|c| c == 'x'));

        // Shorter than the header: header only.
        let mut tiny = PayloadFactory::with_rng(FillerMode::Fixed, 4, StdRng::seed_from_u64(1));
        assert_eq!(tiny.make(1.0).body.len(), HEADER_LEN);
    }

    #[test]
    fn test_random_mode_respects_bound_and_ids_increase() {
        let mut factory = PayloadFactory::with_rng(FillerMode::Random, 50, StdRng::seed_from_u64(3));
        for expected_id in 0..200 {
            let msg = factory.make(2.0);
            assert_eq!(msg.id, expected_id);
            assert!(msg.body.len() < 50);
            assert!((decode_timestamp(msg.body.as_bytes()).unwrap() - 2.0).abs() < 1e-9);
        }
        assert_eq!(factory.next_id(), 200);
    }

    #[test]
    fn test_random_mode_at_largest_length_stays_under_limit() {
        let max_len = MAX_OUTGOING_SIZE - 1;
        let mut factory =
            PayloadFactory::with_rng(FillerMode::Random, max_len, StdRng::seed_from_u64(8604));
        for _ in 0..5 {
            let len = factory.make(3.0).body.len();
            assert!((HEADER_LEN..max_len).contains(&len), "body of {len} bytes");
        }

        let mut tiny = PayloadFactory::with_rng(FillerMode::Random, 4, StdRng::seed_from_u64(1));
        assert_eq!(tiny.make(3.0).body.len(), HEADER_LEN);
    }
}
