//! Message pacer.
//!
//! Decides when and how much to send. Two mutually exclusive policies:
//!
//! - **Credit-driven**: every credit grant releases a burst bounded by the
//!   link's credit and the remaining quota
//! - **Throttled**: a recurring wake releases one fan-out batch (one message
//!   per address), never sooner than `interval` after the previous batch
//!
//! Both share a start gate: nothing is sent before an absolute epoch time, so
//! a fleet of senders started together does not race late attachers.

use std::time::Duration;

use crate::clock::duration_from_secs;

/// Longest single backoff while waiting for the start gate.
pub const MAX_GATE_BACKOFF: Duration = Duration::from_secs(1);

/// Added to every computed wait so the wake lands at or after the deadline.
const WAKE_PADDING: Duration = Duration::from_micros(1);

/// Pacing policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingMode {
    /// Send as fast as link credit allows.
    CreditDriven,
    /// One fan-out batch per interval.
    Throttled { interval: Duration },
}

impl PacingMode {
    /// Build from the `--throttle` value: 0 (or less) means credit-driven.
    pub fn from_throttle_secs(seconds: f64) -> Self {
        let interval = duration_from_secs(seconds);
        if interval.is_zero() {
            Self::CreditDriven
        } else {
            Self::Throttled { interval }
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Stateful pacing decisions.
#[derive(Debug, Clone)]
pub struct Pacer {
    mode: PacingMode,
    start_at: f64,
    last_batch: Option<f64>,
}

impl Pacer {
    /// Create a pacer. `start_at` is an epoch time; 0 disables the gate.
    pub fn new(mode: PacingMode, start_at: f64) -> Self {
        Self {
            mode,
            start_at,
            last_batch: None,
        }
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    /// Throttle interval, if throttled.
    pub fn interval(&self) -> Option<Duration> {
        match self.mode {
            PacingMode::Throttled { interval } => Some(interval),
            PacingMode::CreditDriven => None,
        }
    }

    /// Backoff to wait before sending is allowed, or `None` if the gate is open.
    pub fn gate(&self, now: f64) -> Option<Duration> {
        if now >= self.start_at {
            return None;
        }
        let remaining = duration_from_secs(self.start_at - now) + WAKE_PADDING;
        Some(remaining.min(MAX_GATE_BACKOFF))
    }

    /// Size of a credit-driven burst.
    pub fn burst(&self, credit: u32, remaining_quota: Option<u64>) -> u64 {
        let credit = u64::from(credit);
        match remaining_quota {
            Some(remaining) => credit.min(remaining),
            None => credit,
        }
    }

    /// Whether a throttled batch may go out at `now`.
    ///
    /// Returns `Err(wait)` with the time left until the interval has elapsed
    /// since the previous batch.
    pub fn batch_due(&self, now: f64) -> Result<(), Duration> {
        let (Some(interval), Some(last)) = (self.interval(), self.last_batch) else {
            return Ok(());
        };
        let elapsed = now - last;
        let interval_secs = interval.as_secs_f64();
        if elapsed >= interval_secs {
            Ok(())
        } else {
            Err(duration_from_secs(interval_secs - elapsed) + WAKE_PADDING)
        }
    }

    /// Record that a batch went out at `now`.
    pub fn mark_batch(&mut self, now: f64) {
        self.last_batch = Some(now);
    }

    /// Time of the previous batch, if any.
    pub fn last_batch(&self) -> Option<f64> {
        self.last_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_throttle() {
        assert_eq!(PacingMode::from_throttle_secs(0.0), PacingMode::CreditDriven);
        assert_eq!(PacingMode::from_throttle_secs(-2.0), PacingMode::CreditDriven);
        assert_eq!(
            PacingMode::from_throttle_secs(0.5),
            PacingMode::Throttled {
                interval: Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn test_gate_backoff_is_capped() {
        let pacer = Pacer::new(PacingMode::CreditDriven, 100.0);
        assert_eq!(pacer.gate(90.0), Some(MAX_GATE_BACKOFF));
        assert_eq!(pacer.gate(99.75), Some(Duration::from_micros(250_001)));
        assert_eq!(pacer.gate(100.0), None);
        assert_eq!(Pacer::new(PacingMode::CreditDriven, 0.0).gate(5.0), None);
    }

    #[test]
    fn test_burst_bounded_by_credit_and_quota() {
        let pacer = Pacer::new(PacingMode::CreditDriven, 0.0);
        assert_eq!(pacer.burst(100, Some(10)), 10);
        assert_eq!(pacer.burst(3, Some(10)), 3);
        assert_eq!(pacer.burst(7, None), 7);
    }

    #[test]
    fn test_batches_never_closer_than_interval() {
        let mut pacer = Pacer::new(PacingMode::from_throttle_secs(2.0), 0.0);
        assert_eq!(pacer.batch_due(10.0), Ok(()));
        pacer.mark_batch(10.0);

        let wait = pacer.batch_due(11.5).unwrap_err();
        assert_eq!(wait, Duration::from_micros(500_001));
        assert_eq!(pacer.batch_due(12.0), Ok(()));
    }

    #[test]
    fn test_sub_microsecond_early_is_still_early() {
        let mut pacer = Pacer::new(PacingMode::from_throttle_secs(1.0), 1000.5);
        let gate_wait = pacer.gate(1000.499_999_5).unwrap();
        assert!(gate_wait > Duration::from_micros(1));

        pacer.mark_batch(10.0);
        let wait = pacer.batch_due(10.999_999_5).unwrap_err();
        assert!(wait > Duration::from_micros(1));
        assert!(wait < Duration::from_micros(2));
        assert_eq!(pacer.batch_due(10.999_999_5 + wait.as_secs_f64()), Ok(()));
    }

    #[test]
    fn test_credit_mode_never_waits_between_batches() {
        let mut pacer = Pacer::new(PacingMode::CreditDriven, 0.0);
        pacer.mark_batch(1.0);
        assert_eq!(pacer.batch_due(1.0), Ok(()));
    }
}
