//! Bounded flight-time buffer and its append-only report file.
//!
//! Samples accumulate until the buffer holds one slot per expected message.
//! Once full, further samples are dropped until the buffer is drained by a
//! flush. Reports are appended so that repeated flushes (soak tests) and
//! restarted processes never overwrite earlier lines.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One receive-side latency measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    /// Receive time minus the send time embedded in the message, in seconds.
    pub flight_time: f64,
    /// Receive time in epoch seconds.
    pub received_at: f64,
}

impl LatencySample {
    /// Build a sample from the embedded send time and the receive time.
    pub fn between(sent_at: f64, received_at: f64) -> Self {
        Self {
            flight_time: received_at - sent_at,
            received_at,
        }
    }

    /// Report line: `<receive timestamp> <flight time in ms>`.
    pub fn report_line(&self) -> String {
        format!("{:.6} {:.7}", self.received_at, self.flight_time * 1000.0)
    }
}

/// Capacity-bounded sample buffer.
#[derive(Debug)]
pub struct FlightTimes {
    capacity: usize,
    samples: Vec<LatencySample>,
}

impl FlightTimes {
    /// Create a buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Add a sample.
    ///
    /// Returns false (and drops the sample) when the buffer is already full.
    pub fn push(&mut self, sample: LatencySample) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// Check whether the buffer has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Drain the buffer, returning all accumulated samples.
    pub fn drain(&mut self) -> Vec<LatencySample> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity))
    }

    /// Buffered samples, oldest first.
    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Append `samples` to `destination`, one report line each.
///
/// The file is created if missing and synced before returning so that the
/// report survives an abrupt kill right after the flush.
pub fn append_report(destination: &Path, samples: &[LatencySample]) -> std::io::Result<usize> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)?;
    let mut writer = BufWriter::new(file);
    for sample in samples {
        writeln!(writer, "{}", sample.report_line())?;
    }
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(samples.len())
}
