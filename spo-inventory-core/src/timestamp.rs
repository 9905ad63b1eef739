//! Timestamp rendering for execution log lines and failure records.

use chrono::{DateTime, Local, TimeZone};

/// Renders `[MM/DD/YY HH:MM:SS] -`, the prefix of every execution log line.
pub fn format_stamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] -", at.format("%m/%d/%y %H:%M:%S"))
}

/// Log line prefix for the current local time.
pub fn now_stamp() -> String {
    format_stamp(&Local::now())
}

/// Failure record time, same clock and layout as the log prefix without the brackets.
pub fn now_plain() -> String {
    Local::now().format("%m/%d/%y %H:%M:%S").to_string()
}
