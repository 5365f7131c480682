//! Delivery counters and the flight-time collector.
//!
//! Counters come in two sets: periodic counters, reset whenever a report is
//! flushed (or a soak period completes), and lifetime totals that only grow.

pub mod flight;

use serde::Serialize;
use std::fmt;
use std::path::Path;

use flight::{append_report, FlightTimes, LatencySample};

/// Terminal (or intermediate) state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Received,
    Accepted,
    Rejected,
    Released,
    Modified,
    Unknown,
}

impl DeliveryOutcome {
    /// Lowercase label used in logs and metric attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Released => "released",
            Self::Modified => "modified",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One set of delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub sent: u64,
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub released: u64,
    pub modified: u64,
    pub unknown: u64,
}

impl Counters {
    fn bump(&mut self, outcome: DeliveryOutcome) {
        let slot = match outcome {
            DeliveryOutcome::Received => &mut self.received,
            DeliveryOutcome::Accepted => &mut self.accepted,
            DeliveryOutcome::Rejected => &mut self.rejected,
            DeliveryOutcome::Released => &mut self.released,
            DeliveryOutcome::Modified => &mut self.modified,
            DeliveryOutcome::Unknown => &mut self.unknown,
        };
        *slot += 1;
    }

    /// Number of sender-side settlements counted.
    pub fn settled(&self) -> u64 {
        self.accepted + self.rejected + self.released + self.modified + self.unknown
    }
}

/// Snapshot logged at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub period: Counters,
    pub lifetime: Counters,
    pub buffered_flight_times: usize,
}

/// Counters plus the bounded flight-time buffer.
#[derive(Debug)]
pub struct StatsCollector {
    period: Counters,
    lifetime: Counters,
    flight_times: FlightTimes,
}

impl StatsCollector {
    /// Create a collector with room for `capacity` flight-time samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            period: Counters::default(),
            lifetime: Counters::default(),
            flight_times: FlightTimes::new(capacity),
        }
    }

    /// Count an outcome in both the periodic and lifetime counters.
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        self.period.bump(outcome);
        self.lifetime.bump(outcome);
    }

    /// Count one sent message.
    pub fn record_sent(&mut self) {
        self.period.sent += 1;
        self.lifetime.sent += 1;
    }

    /// Store a latency sample if there is room.
    ///
    /// Returns false when the buffer is full and the sample was dropped.
    pub fn record_latency(&mut self, sample: LatencySample) -> bool {
        self.flight_times.push(sample)
    }

    /// Whether the flight-time buffer holds one sample per expected message.
    pub fn is_full(&self) -> bool {
        self.flight_times.is_full()
    }

    /// Append buffered samples to `destination`, then reset the period.
    ///
    /// Returns the number of lines written. An empty buffer writes nothing and
    /// leaves the periodic counters alone.
    pub fn flush(&mut self, destination: &Path) -> std::io::Result<usize> {
        if self.flight_times.is_empty() {
            tracing::warn!(path = %destination.display(), "No flight times to flush");
            return Ok(0);
        }
        // Write before draining so a failed write keeps the samples.
        let written = append_report(destination, self.flight_times.samples())?;
        tracing::info!(
            count = written,
            path = %destination.display(),
            "Flushed flight times"
        );
        self.reset_period();
        Ok(written)
    }

    /// Reset periodic counters and drop buffered samples.
    pub fn reset_period(&mut self) {
        self.period = Counters::default();
        self.flight_times.drain();
    }

    /// Counters since the last reset.
    pub fn period(&self) -> &Counters {
        &self.period
    }

    /// Counters since the process started.
    pub fn lifetime(&self) -> &Counters {
        &self.lifetime
    }

    /// Buffered flight-time samples.
    pub fn flight_times(&self) -> &[LatencySample] {
        self.flight_times.samples()
    }

    /// Snapshot for the end-of-run log line.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            period: self.period,
            lifetime: self.lifetime,
            buffered_flight_times: self.flight_times.len(),
        }
    }
}

/// Messages per second, or 0 when the elapsed time is not usable.
#[must_use]
pub fn throughput(count: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
        count as f64 / elapsed_seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_updates_both_sets() {
        let mut stats = StatsCollector::new(4);
        stats.record(DeliveryOutcome::Accepted);
        stats.record(DeliveryOutcome::Rejected);
        stats.record_sent();

        assert_eq!(stats.period().accepted, 1);
        assert_eq!(stats.lifetime().accepted, 1);
        assert_eq!(stats.period().rejected, 1);
        assert_eq!(stats.lifetime().sent, 1);
        assert_eq!(stats.lifetime().settled(), 2);
    }

    #[test]
    fn test_latency_buffer_bounded() {
        let mut stats = StatsCollector::new(2);
        assert!(stats.record_latency(LatencySample::between(1.0, 1.5)));
        assert!(stats.record_latency(LatencySample::between(2.0, 2.5)));
        assert!(stats.is_full());
        assert!(!stats.record_latency(LatencySample::between(3.0, 3.5)));
        assert_eq!(stats.flight_times().len(), 2);
    }

    #[test]
    fn test_flush_resets_period_not_lifetime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ft");
        let mut stats = StatsCollector::new(2);

        stats.record(DeliveryOutcome::Received);
        stats.record(DeliveryOutcome::Received);
        stats.record_latency(LatencySample::between(1.0, 1.25));
        stats.record_latency(LatencySample::between(2.0, 2.25));

        assert_eq!(stats.flush(&path).unwrap(), 2);
        assert_eq!(stats.period().received, 0);
        assert_eq!(stats.lifetime().received, 2);
        assert!(stats.flight_times().is_empty());
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ft");
        let mut stats = StatsCollector::new(2);
        stats.record(DeliveryOutcome::Received);

        assert_eq!(stats.flush(&path).unwrap(), 0);
        assert!(!path.exists());
        assert_eq!(stats.period().received, 1);
    }

    #[test]
    fn test_throughput_never_negative_or_infinite() {
        assert!((throughput(10, 2.0) - 5.0).abs() < 1e-9);
        assert_eq!(throughput(10, 0.0), 0.0);
        assert_eq!(throughput(10, -1.0), 0.0);
        assert_eq!(throughput(10, f64::NAN), 0.0);
    }

    #[test]
    fn test_summary_serializes() {
        let mut stats = StatsCollector::new(1);
        stats.record(DeliveryOutcome::Modified);
        let json = serde_json::to_string(&stats.summary()).unwrap();
        assert!(json.contains("\"modified\":1"));
        assert!(json.contains("\"buffered_flight_times\":0"));
    }
}
