use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenhouse_ingest::config::IngestConfig;
use greenhouse_ingest::database::{
    MemoryStore, Notifier, Persister, RecordQuery, RecordStore, StoreResult,
};
use greenhouse_ingest::decoder::Router;
use greenhouse_ingest::error::{
    ConnectionError, DecodeError, NotifyError, PersistError, StoreError,
};
use greenhouse_ingest::ingest::{Ingestor, MessageOutcome};
use greenhouse_ingest::models::{Record, RecordId, RecordKind, Transmission};
use greenhouse_ingest::mqtt::{Broker, BrokerEvent, ConnectionManager, Step, Supervisor};
use greenhouse_ingest::statistics::{hourly_summary, Channel, TimeWindow};

struct FakeBroker {
    script: VecDeque<Result<BrokerEvent, ConnectionError>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Broker for FakeBroker {
    async fn poll(&mut self) -> Result<BrokerEvent, ConnectionError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(ConnectionError::Unreachable("end of script".to_string())))
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl Notifier for CapturingNotifier {
    fn notify(&self, topic: &str, payload: String) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Refuses the first `failures` writes, then behaves like a memory store
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create(&self, transmission: &Transmission) -> StoreResult<RecordId> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.create(transmission).await
    }

    async fn filter(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        self.inner.filter(query).await
    }

    async fn count(&self, query: &RecordQuery) -> StoreResult<u64> {
        self.inner.count(query).await
    }

    async fn last(&self, query: &RecordQuery) -> StoreResult<Option<Record>> {
        self.inner.last(query).await
    }
}

fn message(topic: &str, payload: &str) -> Result<BrokerEvent, ConnectionError> {
    Ok(BrokerEvent::Publish {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
    })
}

fn config() -> IngestConfig {
    let vars: HashMap<&str, &str> = [
        ("MQTT_HOST", "broker.local"),
        ("MQTT_TOPIC", "['greenhouse/tx', 'parking/distance']"),
        ("DATABASE_URL", "postgres://ingest@db/greenhouse"),
        ("STATS_TIMEZONE", "UTC"),
    ]
    .into_iter()
    .collect();
    IngestConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

struct Harness {
    supervisor: Supervisor<FakeBroker>,
    store: Arc<MemoryStore>,
    notifier: Arc<CapturingNotifier>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

fn harness(config: &IngestConfig, script: Vec<Result<BrokerEvent, ConnectionError>>) -> Harness {
    let subscriptions = Arc::new(Mutex::new(Vec::new()));
    let broker = FakeBroker {
        script: script.into(),
        subscriptions: subscriptions.clone(),
    };
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(CapturingNotifier::default());

    let persister = Persister::new(store.clone(), notifier.clone(), config.notify_topic.clone());
    let ingestor = Ingestor::new(Router::new(&config.mqtt.topics), persister);
    let manager = ConnectionManager::new(broker, config.mqtt.topics.all().to_vec());
    let supervisor = Supervisor::new(manager, ingestor).with_reconnect_delay(Duration::ZERO);

    Harness {
        supervisor,
        store,
        notifier,
        subscriptions,
    }
}

#[tokio::test]
async fn ingests_and_summarises() {
    let config = config();
    let mut h = harness(
        &config,
        vec![
            Ok(BrokerEvent::ConnAck),
            message("greenhouse/tx", "('GH-01', 0, 10.0, 20.5, 1013.0, 40.0)"),
            message("greenhouse/tx", "('GH-01', 60, 15.0, 21.0, 1013.0, 39.0)"),
            message("greenhouse/tx", "('GH-01', 3600, 5.0, 19.5, 1013.0, 45.0)"),
            message("parking/distance", "('B8:27:EB:00:11:22', 90, 123.4)"),
        ],
    );

    h.supervisor.connect().await.unwrap();
    assert_eq!(
        *h.subscriptions.lock().unwrap(),
        ["greenhouse/tx", "parking/distance"]
    );

    for expected in 1..=4 {
        assert_eq!(
            h.supervisor.step().await,
            Step::Handled(MessageOutcome::Stored(expected))
        );
    }

    // values land in the store exactly as sent
    let readings = h
        .store
        .filter(&RecordQuery::new(RecordKind::Reading).device("GH-01"))
        .await
        .unwrap();
    match &readings[0].transmission {
        Transmission::Reading(r) => {
            assert_eq!(
                (r.illumination, r.temperature, r.pressure, r.moisture),
                (10.0, 20.5, 1013.0, 40.0)
            );
            assert!(r.timestamp_receive >= r.timestamp_origin);
        }
        other => panic!("unexpected {:?}", other),
    }

    // one notification per greenhouse reading, none for distance
    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[0],
        (
            "map/icon_update".to_string(),
            "('GH-01', 0, 10.0, 20.5, 1013.0, 40.0)".to_string()
        )
    );
    drop(sent);

    let result = hourly_summary(h.store.as_ref(), "GH-01", TimeWindow::all(), &config.stats)
        .await
        .unwrap();
    let summary = result.summary().unwrap();
    assert_eq!(summary.labels, ["00:00", "01:00"]);
    assert_eq!(summary.illumination.relative_frequency, [0.0, 200.0]);
    // pressure never changes: no variation to distribute
    assert_eq!(summary.channel(Channel::Pressure).relative_frequency, [0.0, 0.0]);
}

#[tokio::test]
async fn bad_messages_are_dropped_and_ingestion_continues() {
    let config = config();
    let mut h = harness(
        &config,
        vec![
            Ok(BrokerEvent::ConnAck),
            message("greenhouse/tx", "('GH-01', 0, 1.0, 2.0, 3.0)"),
            message("greenhouse/tx", "('GH-01', 0, 1.0, 'x', 3.0, 4.0)"),
            message("weather/raw", "anything"),
            message("greenhouse/tx", "('GH-01', 0, 1.0, 2.0, 3.0, 4.0)"),
        ],
    );
    h.supervisor.connect().await.unwrap();

    assert!(matches!(
        h.supervisor.step().await,
        Step::Handled(MessageOutcome::Rejected(DecodeError::ShapeMismatch(_)))
    ));
    assert!(matches!(
        h.supervisor.step().await,
        Step::Handled(MessageOutcome::Rejected(DecodeError::TypeMismatch { .. }))
    ));
    assert_eq!(
        h.supervisor.step().await,
        Step::Handled(MessageOutcome::Unrecognized)
    );
    assert_eq!(
        h.supervisor.step().await,
        Step::Handled(MessageOutcome::Stored(1))
    );

    assert_eq!(
        h.store.count(&RecordQuery::new(RecordKind::Reading)).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn redelivery_does_not_duplicate() {
    let config = config();
    let payload = "('GH-02', 500, 1.0, 2.0, 3.0, 4.0)";
    let mut h = harness(
        &config,
        vec![
            Ok(BrokerEvent::ConnAck),
            message("greenhouse/tx", payload),
            Err(ConnectionError::Unreachable("reset".to_string())),
            Ok(BrokerEvent::ConnAck),
            message("greenhouse/tx", payload),
        ],
    );
    h.supervisor.connect().await.unwrap();

    assert_eq!(h.supervisor.step().await, Step::Handled(MessageOutcome::Stored(1)));
    assert_eq!(h.supervisor.step().await, Step::Disconnected);
    assert_eq!(h.supervisor.step().await, Step::Connected);
    assert_eq!(h.supervisor.step().await, Step::Handled(MessageOutcome::Stored(1)));

    // subscribed once per session
    assert_eq!(h.subscriptions.lock().unwrap().len(), 4);
    assert_eq!(
        h.store.count(&RecordQuery::new(RecordKind::Reading)).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn summary_serializes_empty_as_no_data() {
    let config = config();
    let store = MemoryStore::new();
    let result = hourly_summary(&store, "nobody", TimeWindow::all(), &config.stats)
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "empty" }));
}

#[tokio::test]
async fn store_failure_drops_one_message_and_ingestion_continues() {
    let config = config();
    let broker = FakeBroker {
        script: vec![
            Ok(BrokerEvent::ConnAck),
            message("greenhouse/tx", "('GH-03', 100, 1.0, 2.0, 3.0, 4.0)"),
            message("greenhouse/tx", "('GH-03', 160, 1.5, 2.0, 3.0, 4.0)"),
        ]
        .into(),
        subscriptions: Arc::new(Mutex::new(Vec::new())),
    };
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(1),
    });
    let notifier = Arc::new(CapturingNotifier::default());

    let persister = Persister::new(store.clone(), notifier.clone(), config.notify_topic.clone());
    let ingestor = Ingestor::new(Router::new(&config.mqtt.topics), persister);
    let manager = ConnectionManager::new(broker, config.mqtt.topics.all().to_vec());
    let mut supervisor = Supervisor::new(manager, ingestor).with_reconnect_delay(Duration::ZERO);

    supervisor.connect().await.unwrap();

    assert_eq!(
        supervisor.step().await,
        Step::Handled(MessageOutcome::Failed(PersistError::Store {
            device: "GH-03".to_string(),
            source: StoreError::Unavailable("connection reset".to_string()),
        }))
    );
    assert_eq!(supervisor.step().await, Step::Handled(MessageOutcome::Stored(1)));
    assert!(supervisor.manager().is_connected());

    // the failed reading is gone; only the second one was stored and announced
    let stored = store
        .filter(&RecordQuery::new(RecordKind::Reading))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].transmission.timestamp_origin(), 160);
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}
