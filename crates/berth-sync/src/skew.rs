//! Poll interval constants and skew generation.

use std::time::Duration;

use rand::Rng;

/// Interval used when the server doesn't suggest one, or the suggestion is
/// malformed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Floor for server-suggested intervals, protecting against a server
/// accidentally sending a tiny value.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound (exclusive) for the random skew added to every scheduled
/// interval.
pub const SKEW_UPPER_BOUND: Duration = Duration::from_secs(30);

/// A random skew in `[0, SKEW_UPPER_BOUND)`.
///
/// Independent clients polling on the same fixed interval would
/// synchronize and spike shared infrastructure; a bounded per-fetcher
/// random offset breaks that up without any coordination. Pseudo-random is
/// plenty here.
pub fn skew_interval() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..SKEW_UPPER_BOUND.as_millis() as u64))
}

/// Clamp a server-suggested interval to the allowed floor, falling back to
/// the default when absent.
pub fn clamp_interval(suggested: Option<Duration>) -> Duration {
    match suggested {
        Some(interval) => interval.max(MIN_POLL_INTERVAL),
        None => DEFAULT_POLL_INTERVAL,
    }
}
