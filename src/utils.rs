/// Time helpers shared by the decoder and the daemon
use std::sync::atomic::{AtomicI64, Ordering};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const LOG_FORMAT: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] - [hour]:[minute]:[second]");

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(LOG_FORMAT).unwrap_or_else(|_| dt.to_string())
}

/// Format epoch seconds for logging, falling back to the raw number when out of range
pub fn format_epoch(seconds: i64) -> String {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map(|dt| format_datetime(&dt))
        .unwrap_or_else(|_| seconds.to_string())
}

/// Wall-clock source for receive timestamps
///
/// Never hands out a value lower than one it handed out before, so receive
/// timestamps stay monotonic within the process even if the host clock steps back.
#[derive(Debug, Default)]
pub struct ReceiveClock {
    last: AtomicI64,
}

impl ReceiveClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch seconds, clamped to be non-decreasing
    pub fn stamp(&self) -> i64 {
        self.stamp_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    fn stamp_at(&self, now: i64) -> i64 {
        let previous = self.last.fetch_max(now, Ordering::AcqRel);
        previous.max(now)
    }
}
