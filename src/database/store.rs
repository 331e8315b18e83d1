//! Record store interface and an in-process implementation
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{Record, RecordId, RecordKind, Transmission};

pub type StoreResult<T> = Result<T, StoreError>;

/// Predicate over stored records
///
/// `since`/`until` bound `timestamp_origin` inclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub kind: RecordKind,
    pub device: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl RecordQuery {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            device: None,
            since: None,
            until: None,
        }
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn since(mut self, timestamp: i64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: i64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn matches(&self, transmission: &Transmission) -> bool {
        let ts = transmission.timestamp_origin();
        transmission.kind() == self.kind
            && self.device.as_deref().map_or(true, |d| d == transmission.device())
            && self.since.map_or(true, |since| ts >= since)
            && self.until.map_or(true, |until| ts <= until)
    }
}

/// Narrow record-store contract used by ingestion and statistics
///
/// `create` is idempotent on `(kind, device, timestamp_origin)`: creating a
/// transmission that is already stored returns the existing id. `filter` and
/// `last` use arrival (id) order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, transmission: &Transmission) -> StoreResult<RecordId>;

    async fn filter(&self, query: &RecordQuery) -> StoreResult<Vec<Record>>;

    async fn count(&self, query: &RecordQuery) -> StoreResult<u64>;

    async fn last(&self, query: &RecordQuery) -> StoreResult<Option<Record>>;
}

/// Record store kept in memory; used for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_key(a: &Transmission, b: &Transmission) -> bool {
    a.kind() == b.kind()
        && a.device() == b.device()
        && a.timestamp_origin() == b.timestamp_origin()
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, transmission: &Transmission) -> StoreResult<RecordId> {
        let mut records = self.records.write().await;

        if let Some(existing) = records
            .iter()
            .find(|r| same_key(&r.transmission, transmission))
        {
            return Ok(existing.id);
        }

        let id = records.last().map_or(1, |r| r.id + 1);
        records.push(Record {
            id,
            transmission: transmission.clone(),
        });
        Ok(id)
    }

    async fn filter(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| query.matches(&r.transmission))
            .cloned()
            .collect())
    }

    async fn count(&self, query: &RecordQuery) -> StoreResult<u64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| query.matches(&r.transmission))
            .count() as u64)
    }

    async fn last(&self, query: &RecordQuery) -> StoreResult<Option<Record>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .find(|r| query.matches(&r.transmission))
            .cloned())
    }
}
