//! Wall-clock timestamps and random helpers.
//!
//! All driver timestamps are `f64` seconds since the Unix epoch, matching the
//! format of the log and flight-time files consumed by the test orchestrator.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Current wall-clock time in seconds since the Unix epoch.
#[must_use]
pub fn now_seconds() -> f64 {
    since_epoch().as_secs_f64()
}

/// Convert epoch seconds to whole microseconds, clamping negatives to zero.
#[must_use]
pub fn seconds_to_micros(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1_000_000.0).round() as u64
    } else {
        0
    }
}

/// Convert whole microseconds to epoch seconds.
#[must_use]
pub fn micros_to_seconds(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Uniform random length in `[0, one_past_max)`. Returns 0 when the range is empty.
pub fn random_len<R: Rng>(rng: &mut R, one_past_max: usize) -> usize {
    if one_past_max == 0 {
        0
    } else {
        rng.gen_range(0..one_past_max)
    }
}

/// Random alphanumeric filler of exactly `len` characters.
pub fn random_filler<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Convert a duration in (possibly fractional) seconds, rejecting negatives and NaN.
#[must_use]
pub fn duration_from_secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
