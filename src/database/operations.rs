/// Persisting decoded transmissions and announcing new readings
use log::{debug, warn};
use std::sync::Arc;

use crate::database::store::RecordStore;
use crate::error::{NotifyError, PersistError};
use crate::models::{RecordId, Transmission};

/// Fire-and-forget publisher for secondary notifications
///
/// Implementations must not block: the call either queues the message or fails.
pub trait Notifier: Send + Sync {
    fn notify(&self, topic: &str, payload: String) -> Result<(), NotifyError>;
}

/// Writes one transmission per call into the record store
pub struct Persister {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    notify_topic: String,
}

impl Persister {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        notify_topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            notify_topic: notify_topic.into(),
        }
    }

    /// Store one transmission
    ///
    /// A single create call, no retry. After a greenhouse reading is stored the
    /// decoded tuple is published on the notification topic; that publish can
    /// fail without affecting the stored record.
    ///
    /// # Arguments
    /// * `transmission` - Decoded reading to store
    ///
    /// # Returns
    /// Record id of the stored (or already stored) transmission
    pub async fn persist(&self, transmission: &Transmission) -> Result<RecordId, PersistError> {
        let id = self
            .store
            .create(transmission)
            .await
            .map_err(|source| PersistError::Store {
                device: transmission.device().to_string(),
                source,
            })?;

        if let Transmission::Reading(reading) = transmission {
            let payload = reading.to_tuple_literal();
            match self.notifier.notify(&self.notify_topic, payload) {
                Ok(()) => debug!("Published update for {} on {}", reading.device_id, self.notify_topic),
                Err(e) => warn!("{}", e),
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::{MemoryStore, RecordQuery, StoreResult};
    use crate::error::StoreError;
    use crate::models::{DistanceReading, Reading, Record, RecordKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, topic: &str, payload: String) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError {
                    topic: topic.to_string(),
                    reason: "queue full".to_string(),
                });
            }
            self.sent.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn create(&self, _: &Transmission) -> StoreResult<RecordId> {
            Err(StoreError::Unavailable("connection closed".to_string()))
        }
        async fn filter(&self, _: &RecordQuery) -> StoreResult<Vec<Record>> {
            Ok(Vec::new())
        }
        async fn count(&self, _: &RecordQuery) -> StoreResult<u64> {
            Ok(0)
        }
        async fn last(&self, _: &RecordQuery) -> StoreResult<Option<Record>> {
            Ok(None)
        }
    }

    fn reading() -> Transmission {
        Transmission::Reading(Reading {
            device_id: "dev-1".to_string(),
            timestamp_origin: 1_600_000_000,
            timestamp_receive: 1_600_000_001,
            illumination: 700.5,
            temperature: 22.25,
            pressure: 1009.0,
            moisture: 35.5,
        })
    }

    #[tokio::test]
    async fn stores_reading_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let persister = Persister::new(store.clone(), notifier.clone(), "map/icon_update");

        let id = persister.persist(&reading()).await.unwrap();

        let stored = store.last(&RecordQuery::new(RecordKind::Reading)).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.transmission, reading());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(
            *sent,
            [(
                "map/icon_update".to_string(),
                "('dev-1', 1600000000, 700.5, 22.25, 1009.0, 35.5)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn distance_readings_do_not_notify() {
        let notifier = Arc::new(RecordingNotifier::default());
        let persister = Persister::new(Arc::new(MemoryStore::new()), notifier.clone(), "map/icon_update");

        let distance = Transmission::Distance(DistanceReading {
            mac: "mac".to_string(),
            timestamp_origin: 1,
            timestamp_receive: 2,
            distance: 3.0,
        });
        persister.persist(&distance).await.unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_failure_keeps_record() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let persister = Persister::new(store.clone(), notifier, "map/icon_update");

        assert!(persister.persist(&reading()).await.is_ok());
        assert_eq!(store.count(&RecordQuery::new(RecordKind::Reading)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_failure_is_reported_without_notify() {
        let notifier = Arc::new(RecordingNotifier::default());
        let persister = Persister::new(Arc::new(BrokenStore), notifier.clone(), "map/icon_update");

        let err = persister.persist(&reading()).await.unwrap_err();
        assert_eq!(
            err,
            PersistError::Store {
                device: "dev-1".to_string(),
                source: StoreError::Unavailable("connection closed".to_string()),
            }
        );
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
