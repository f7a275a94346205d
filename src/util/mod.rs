//! Utility module
//!
//! This module provides logging setup and the unit conversions used when
//! building payloads.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::level_filters::LevelFilter;

/// Installs a stderr fmt subscriber at the given level
///
/// Intended for binaries; does nothing if a subscriber is already set.
pub fn init_tracing(level: LevelFilter) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Converts a transition duration to the wire's whole milliseconds, saturating
pub fn duration_to_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Converts a nanosecond count from the wire to a duration
pub fn nanos_to_duration(nanos: u64) -> Duration {
    Duration::from_nanos(nanos)
}

/// Converts nanoseconds since the Unix epoch to a UTC timestamp, saturating
pub fn nanos_to_datetime(nanos: u64) -> DateTime<Utc> {
    Utc.timestamp_nanos(i64::try_from(nanos).unwrap_or(i64::MAX))
}
