use std::time::{SystemTime, UNIX_EPOCH};

/// Type alias for standard timestamps (seconds since UNIX epoch)
pub type Timestamp = u64;

/// Seconds in one day
pub const SECONDS_PER_DAY: Timestamp = 24 * 60 * 60;

/// Returns the current time as a `Timestamp`.
/// A clock set before the epoch reads as 0, which makes every bucket look live.
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
