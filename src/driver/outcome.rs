//! Outcome classification and the completion policy.
//!
//! Senders finish when the lifetime accepted count reaches the quota.
//! Receivers finish a period when the periodic received count reaches it;
//! what happens next depends on soak mode.

use crate::stats::{throughput, DeliveryOutcome, StatsCollector};

/// Decision after a sender-side outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SenderVerdict {
    Continue,
    /// Quota accepted; the run should halt.
    QuotaMet {
        accepted: u64,
        elapsed: f64,
        throughput: f64,
    },
}

/// Decision after a completed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverVerdict {
    Continue,
    /// Soak period complete: flush now and keep receiving.
    FlushAndContinue,
    /// Run complete: schedule the final flush and halt.
    FlushLaterAndHalt,
}

/// Count a sender-side outcome and decide whether the run is complete.
///
/// `Received` is an intermediate state and is not counted. `Unknown` is
/// counted and logged as an anomaly.
pub fn classify_sender(
    stats: &mut StatsCollector,
    outcome: DeliveryOutcome,
    total_expected: u64,
    soak: bool,
    first_send_at: Option<f64>,
    now: f64,
) -> SenderVerdict {
    match outcome {
        DeliveryOutcome::Received => return SenderVerdict::Continue,
        DeliveryOutcome::Unknown => {
            tracing::warn!("Delivery settled in an unknown remote state");
        }
        _ => {}
    }
    stats.record(outcome);

    if outcome != DeliveryOutcome::Accepted || soak {
        return SenderVerdict::Continue;
    }
    let accepted = stats.lifetime().accepted;
    if accepted < total_expected {
        return SenderVerdict::Continue;
    }
    let elapsed = first_send_at.map_or(0.0, |start| now - start);
    SenderVerdict::QuotaMet {
        accepted,
        elapsed,
        throughput: throughput(accepted, elapsed),
    }
}

/// Decide what a receiver does after counting a delivery.
pub fn receiver_verdict(stats: &StatsCollector, total_expected: u64, soak: bool) -> ReceiverVerdict {
    if stats.period().received < total_expected {
        ReceiverVerdict::Continue
    } else if soak {
        ReceiverVerdict::FlushAndContinue
    } else {
        ReceiverVerdict::FlushLaterAndHalt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_halts_exactly_at_quota() {
        let mut stats = StatsCollector::new(0);
        for _ in 0..2 {
            assert_eq!(
                classify_sender(&mut stats, DeliveryOutcome::Accepted, 3, false, Some(10.0), 11.0),
                SenderVerdict::Continue
            );
        }
        let verdict =
            classify_sender(&mut stats, DeliveryOutcome::Accepted, 3, false, Some(10.0), 12.0);
        assert_eq!(
            verdict,
            SenderVerdict::QuotaMet {
                accepted: 3,
                elapsed: 2.0,
                throughput: 1.5
            }
        );
    }

    #[test]
    fn test_non_accepted_outcomes_never_complete() {
        let mut stats = StatsCollector::new(0);
        for outcome in [
            DeliveryOutcome::Rejected,
            DeliveryOutcome::Released,
            DeliveryOutcome::Modified,
            DeliveryOutcome::Unknown,
        ] {
            assert_eq!(
                classify_sender(&mut stats, outcome, 1, false, Some(0.0), 1.0),
                SenderVerdict::Continue
            );
        }
        assert_eq!(stats.lifetime().settled(), 4);
        assert_eq!(stats.lifetime().unknown, 1);
    }

    #[test]
    fn test_received_state_is_not_counted() {
        let mut stats = StatsCollector::new(0);
        classify_sender(&mut stats, DeliveryOutcome::Received, 1, false, None, 0.0);
        assert_eq!(stats.lifetime().settled(), 0);
        assert_eq!(stats.lifetime().received, 0);
    }

    #[test]
    fn test_soak_sender_never_completes() {
        let mut stats = StatsCollector::new(0);
        for _ in 0..5 {
            assert_eq!(
                classify_sender(&mut stats, DeliveryOutcome::Accepted, 1, true, Some(0.0), 1.0),
                SenderVerdict::Continue
            );
        }
    }

    #[test]
    fn test_zero_elapsed_gives_zero_throughput() {
        let mut stats = StatsCollector::new(0);
        let verdict = classify_sender(&mut stats, DeliveryOutcome::Accepted, 1, false, Some(5.0), 5.0);
        assert_eq!(
            verdict,
            SenderVerdict::QuotaMet {
                accepted: 1,
                elapsed: 0.0,
                throughput: 0.0
            }
        );
    }

    #[test]
    fn test_receiver_verdicts() {
        let mut stats = StatsCollector::new(2);
        assert_eq!(receiver_verdict(&stats, 2, false), ReceiverVerdict::Continue);
        stats.record(DeliveryOutcome::Received);
        stats.record(DeliveryOutcome::Received);
        assert_eq!(
            receiver_verdict(&stats, 2, false),
            ReceiverVerdict::FlushLaterAndHalt
        );
        assert_eq!(
            receiver_verdict(&stats, 2, true),
            ReceiverVerdict::FlushAndContinue
        );
    }
}
