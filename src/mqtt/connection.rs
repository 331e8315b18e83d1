//! Broker connection lifecycle.
//!
//! [`ConnectionManager`] owns the connection state and the subscription list.
//! It talks to the wire through the [`Broker`] trait; [`MqttBroker`] is the
//! `rumqttc` implementation.

use async_trait::async_trait;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};

use crate::config::MqttSettings;
use crate::database::operations::Notifier;
use crate::error::{ConnectionError, NotifyError};

// Outgoing request queue between client handles and the event loop
const REQUEST_CAPACITY: usize = 32;

/// What the transport reported
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Broker accepted the connect request
    ConnAck,
    Publish { topic: String, payload: Vec<u8> },
    /// Anything the manager does not act on (acks, pings, outgoing packets)
    Other,
}

/// Transport seam under the connection manager
#[async_trait]
pub trait Broker: Send {
    /// Drive the connection until the next event. After an error the next call
    /// starts a new connection attempt.
    async fn poll(&mut self) -> Result<BrokerEvent, ConnectionError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session established yet
    Connecting,
    Connected,
    /// A session existed and was lost; waiting for a new ConnAck
    Disconnected,
}

/// Session-level events handed to the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session established and every topic re-subscribed
    Connected,
    Disconnected(ConnectionError),
    Message { topic: String, payload: Vec<u8> },
}

pub struct ConnectionManager<B> {
    broker: B,
    topics: Vec<String>,
    state: ConnectionState,
    sessions: u64,
}

impl<B: Broker> ConnectionManager<B> {
    pub fn new(broker: B, topics: Vec<String>) -> Self {
        Self {
            broker,
            topics,
            state: ConnectionState::Connecting,
            sessions: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True once any session has been established
    pub fn has_connected(&self) -> bool {
        self.sessions > 0
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Wait for the next session event
    ///
    /// Subscriptions are issued inside this call, before `Connected` is
    /// returned, so no message of a new session is delivered ahead of them.
    /// Errors are returned as-is; retrying is up to the caller.
    pub async fn next_event(&mut self) -> Result<SessionEvent, ConnectionError> {
        loop {
            match self.broker.poll().await {
                Ok(BrokerEvent::ConnAck) => {
                    self.subscribe_all().await?;
                    self.state = ConnectionState::Connected;
                    self.sessions += 1;
                    info!(
                        "Connected to broker (session {}), subscribed to {:?}",
                        self.sessions, self.topics
                    );
                    return Ok(SessionEvent::Connected);
                }
                Ok(BrokerEvent::Publish { topic, payload }) => {
                    if self.is_connected() {
                        return Ok(SessionEvent::Message { topic, payload });
                    }
                    debug!("Dropping message on {} received outside a session", topic);
                }
                Ok(BrokerEvent::Other) => {}
                Err(e) => {
                    if self.is_connected() {
                        self.state = ConnectionState::Disconnected;
                        warn!("Disconnected from broker: {}", e);
                        return Ok(SessionEvent::Disconnected(e));
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn subscribe_all(&mut self) -> Result<(), ConnectionError> {
        for topic in &self.topics {
            self.broker.subscribe(topic).await?;
            debug!("Subscribed to {}", topic);
        }
        Ok(())
    }
}

/// `rumqttc` transport
pub struct MqttBroker {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttBroker {
    /// Build the client; the connection is opened by the first `poll`
    ///
    /// Also returns a notifier sharing the client's request queue.
    pub fn new(settings: &MqttSettings) -> (Self, MqttNotifier) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        // The broker keeps no subscriptions for us; every ConnAck re-subscribes
        options.set_clean_session(true);
        if let Some((user, pass)) = &settings.credentials {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let notifier = MqttNotifier {
            client: client.clone(),
        };
        (Self { client, eventloop }, notifier)
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn poll(&mut self) -> Result<BrokerEvent, ConnectionError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => Ok(BrokerEvent::ConnAck),
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(BrokerEvent::Publish {
                topic: publish.topic.to_string(),
                payload: publish.payload.to_vec(),
            }),
            Ok(_) => Ok(BrokerEvent::Other),
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                Err(ConnectionError::Rejected {
                    reason: format!("{:?}", code),
                })
            }
            Err(e) => Err(ConnectionError::Unreachable(e.to_string())),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
        // Queue without waiting: the event loop is not being polled while we are here
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| ConnectionError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Non-blocking publisher over the shared MQTT client
#[derive(Clone)]
pub struct MqttNotifier {
    client: AsyncClient,
}

impl Notifier for MqttNotifier {
    fn notify(&self, topic: &str, payload: String) -> Result<(), NotifyError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| NotifyError {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Broker replaying a fixed script and logging what the manager did
    pub struct ScriptedBroker {
        pub script: VecDeque<Result<BrokerEvent, ConnectionError>>,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedBroker {
        pub fn new(
            script: impl IntoIterator<Item = Result<BrokerEvent, ConnectionError>>,
        ) -> (Self, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let broker = Self {
                script: script.into_iter().collect(),
                log: log.clone(),
            };
            (broker, log)
        }
    }

    #[async_trait]
    impl Broker for ScriptedBroker {
        async fn poll(&mut self) -> Result<BrokerEvent, ConnectionError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(ConnectionError::Unreachable("script exhausted".to_string())))
        }

        async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
            self.log.lock().unwrap().push(format!("subscribe {}", topic));
            Ok(())
        }
    }

    pub fn publish(topic: &str, payload: &str) -> Result<BrokerEvent, ConnectionError> {
        Ok(BrokerEvent::Publish {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        })
    }

    pub fn dropped() -> Result<BrokerEvent, ConnectionError> {
        Err(ConnectionError::Unreachable("connection reset".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn topics() -> Vec<String> {
        vec!["greenhouse/tx".to_string(), "parking/distance".to_string()]
    }

    #[tokio::test]
    async fn subscribes_to_every_topic_on_connack() {
        let (broker, log) = ScriptedBroker::new([Ok(BrokerEvent::ConnAck)]);
        let mut manager = ConnectionManager::new(broker, topics());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert_eq!(manager.next_event().await, Ok(SessionEvent::Connected));
        assert!(manager.is_connected());
        assert_eq!(
            *log.lock().unwrap(),
            ["subscribe greenhouse/tx", "subscribe parking/distance"]
        );
    }

    #[tokio::test]
    async fn refused_connect_is_an_error() {
        let rejected = ConnectionError::Rejected {
            reason: "BadUserNamePassword".to_string(),
        };
        let (broker, log) = ScriptedBroker::new([Err(rejected.clone())]);
        let mut manager = ConnectionManager::new(broker, topics());

        assert_eq!(manager.next_event().await, Err(rejected));
        assert!(!manager.has_connected());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_resubscribes_before_messages() {
        let (broker, log) = ScriptedBroker::new([
            Ok(BrokerEvent::ConnAck),
            publish("greenhouse/tx", "first"),
            dropped(),
            // stale message surfacing between sessions is not delivered
            publish("greenhouse/tx", "stale"),
            Ok(BrokerEvent::ConnAck),
            publish("greenhouse/tx", "second"),
        ]);
        let mut manager = ConnectionManager::new(broker, vec!["greenhouse/tx".to_string()]);

        let mut seen = Vec::new();
        for _ in 0..5 {
            match manager.next_event().await.unwrap() {
                SessionEvent::Message { payload, .. } => {
                    let text = String::from_utf8(payload).unwrap();
                    log.lock().unwrap().push(format!("route {}", text));
                    seen.push(text);
                }
                SessionEvent::Disconnected(_) => {
                    assert_eq!(manager.state(), ConnectionState::Disconnected);
                    log.lock().unwrap().push("disconnected".to_string());
                }
                SessionEvent::Connected => {}
            }
        }

        assert_eq!(seen, ["first", "second"]);
        assert_eq!(
            *log.lock().unwrap(),
            [
                "subscribe greenhouse/tx",
                "route first",
                "disconnected",
                "subscribe greenhouse/tx",
                "route second",
            ]
        );
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn errors_after_disconnect_are_returned_to_caller() {
        let (broker, _log) = ScriptedBroker::new([Ok(BrokerEvent::ConnAck), dropped(), dropped()]);
        let mut manager = ConnectionManager::new(broker, topics());

        manager.next_event().await.unwrap();
        assert!(matches!(
            manager.next_event().await,
            Ok(SessionEvent::Disconnected(_))
        ));
        assert!(manager.next_event().await.is_err());
        assert!(manager.has_connected());
    }

    #[tokio::test]
    async fn notifier_does_not_need_a_connection() {
        let settings = MqttSettings::new(
            "localhost",
            crate::config::TopicSet::parse("greenhouse/tx").unwrap(),
        );
        let (_broker, notifier) = MqttBroker::new(&settings);
        // Queued locally; nothing is sent until the event loop is polled
        assert!(notifier.notify("map/icon_update", "('x', 1)".to_string()).is_ok());
    }
}
