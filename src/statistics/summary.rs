//! Store-backed hourly summary for one device
use log::debug;

use super::aggregate::{aggregate, Aggregation};
use super::AggregationSettings;
use crate::database::store::{RecordQuery, RecordStore};
use crate::error::StoreError;
use crate::models::{RecordKind, Transmission};

/// Optional inclusive bounds on `timestamp_origin`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(since: i64, until: i64) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }
}

/// Aggregate the stored readings of one device
///
/// Reads a snapshot through the store's `filter` and never writes, so it can
/// run alongside ingestion.
///
/// # Arguments
/// * `store` - Record store holding the readings
/// * `device_id` - Device to summarise
/// * `window` - Optional time bounds
/// * `settings` - Zone and bucket period
pub async fn hourly_summary(
    store: &dyn RecordStore,
    device_id: &str,
    window: TimeWindow,
    settings: &AggregationSettings,
) -> Result<Aggregation, StoreError> {
    let mut query = RecordQuery::new(RecordKind::Reading).device(device_id);
    query.since = window.since;
    query.until = window.until;

    let readings: Vec<_> = store
        .filter(&query)
        .await?
        .into_iter()
        .filter_map(|record| match record.transmission {
            Transmission::Reading(reading) => Some(reading),
            Transmission::Distance(_) => None,
        })
        .collect();

    debug!("Aggregating {} readings for {}", readings.len(), device_id);
    Ok(aggregate(&readings, settings))
}
