//! Hour-of-day statistics over stored readings.
//!
//! Readings are bucketed by local wall-clock time in a fixed zone, and each
//! bucket's share of a channel's total signed variation is reported together
//! with an upper/lower display band. The numbers are descriptive; the bands are
//! not confidence intervals.

pub mod aggregate;
pub mod buckets;
pub mod summary;

pub use aggregate::{aggregate, Aggregation, Channel, ChannelSummary, HourBucket, HourlySummary};
pub use summary::{hourly_summary, TimeWindow};

use chrono_tz::Tz;

use crate::error::ConfigError;

/// Default bucket width: whole hours
pub const DEFAULT_PERIOD_SECS: i64 = 3600;

const SECONDS_PER_DAY: i64 = 86_400;

/// Zone and bucket width used to label readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSettings {
    pub timezone: Tz,
    period_secs: i64,
}

impl AggregationSettings {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            period_secs: DEFAULT_PERIOD_SECS,
        }
    }

    /// Change the bucket width. Must be between one second and one day.
    pub fn with_period(mut self, period_secs: i64) -> Result<Self, ConfigError> {
        if !(1..=SECONDS_PER_DAY).contains(&period_secs) {
            return Err(ConfigError::Invalid {
                key: "STATS_PERIOD_SECS",
                reason: format!(
                    "bucket period must be between 1 and {} seconds, got {}",
                    SECONDS_PER_DAY, period_secs
                ),
            });
        }
        self.period_secs = period_secs;
        Ok(self)
    }

    pub fn period_secs(&self) -> i64 {
        self.period_secs
    }
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self::new(chrono_tz::America::Sao_Paulo)
    }
}
