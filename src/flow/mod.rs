//! Flow control and pacing.
//!
//! Provides:
//! - Per-link credit accounting for senders and receivers
//! - The message pacer (start gate, credit bursts, throttle interval)

pub mod credit;
pub mod pacer;
