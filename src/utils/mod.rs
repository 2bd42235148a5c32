//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Wall-clock format used in config files and saved queues
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time-of-day format used for manual meridian times
pub const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Format a UTC timestamp as local wall-clock time (`YYYY-MM-DD HH:MM:SS`)
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a local wall-clock timestamp (`YYYY-MM-DD HH:MM:SS`) into UTC
///
/// Returns `None` if the string is malformed or names a local time that
/// does not exist (DST gap). Ambiguous local times resolve to the earlier
/// instant.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a clock time for log lines (`HH:MM:SS`, local)
pub fn format_clock(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format(CLOCK_FORMAT).to_string()
}

/// Format a duration as a short human-readable string
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 0 {
        return String::from("expired");
    }

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
