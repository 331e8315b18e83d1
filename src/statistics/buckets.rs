//! Bucket labels: local wall-clock time rounded to the bucket period.

use chrono::{Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

use super::AggregationSettings;

/// Epoch seconds shifted to wall-clock seconds in `tz`
///
/// Instants chrono cannot represent are taken as already being wall time.
pub fn wall_clock_seconds(timestamp: i64, tz: Tz) -> i64 {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(utc) => {
            let offset = tz.offset_from_utc_datetime(&utc.naive_utc()).fix();
            timestamp.saturating_add(i64::from(offset.local_minus_utc()))
        }
        None => timestamp,
    }
}

/// Round to the nearest multiple of `period`, ties to the even multiple
///
/// Widened to `i128` so device-reported timestamps at the ends of the `i64`
/// range still round instead of overflowing.
pub fn round_to_period(seconds: i64, period: i64) -> i128 {
    let (seconds, period) = (i128::from(seconds), i128::from(period.max(1)));
    let quotient = seconds.div_euclid(period);
    let floor = quotient * period;
    let twice_remainder = (seconds - floor) * 2;

    let round_up = match twice_remainder.cmp(&period) {
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => quotient.rem_euclid(2) == 1,
    };

    if round_up {
        floor + period
    } else {
        floor
    }
}

/// `"HH:MM"` of a wall-clock instant
pub fn format_label(wall_seconds: i128) -> String {
    let of_day = wall_seconds.rem_euclid(86_400);
    format!("{:02}:{:02}", of_day / 3600, (of_day % 3600) / 60)
}

/// Bucket label of one origin timestamp
pub fn bucket_label(timestamp: i64, settings: &AggregationSettings) -> String {
    let wall = wall_clock_seconds(timestamp, settings.timezone);
    format_label(round_to_period(wall, settings.period_secs()))
}

/// Sorted distinct bucket labels and the bucket position of each reading
#[derive(Debug, Clone, PartialEq)]
pub struct BucketIndex {
    pub labels: Vec<String>,
    pub assignment: Vec<usize>,
}

impl BucketIndex {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Map per-reading labels onto ascending lexical bucket order
pub fn assign_buckets(labels: &[String]) -> BucketIndex {
    let mut positions: BTreeMap<&str, usize> = labels.iter().map(|l| (l.as_str(), 0)).collect();
    for (i, position) in positions.values_mut().enumerate() {
        *position = i;
    }

    let assignment = labels.iter().map(|l| positions[l.as_str()]).collect();
    let labels = positions.into_keys().map(str::to_string).collect();

    BucketIndex { labels, assignment }
}
