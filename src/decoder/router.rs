//! Topic routing for incoming messages
use log::debug;

use super::{decode_distance, decode_reading};
use crate::config::TopicSet;
use crate::error::DecodeError;
use crate::models::Transmission;
use crate::utils::ReceiveClock;

/// Which decoder a topic maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Reading,
    Distance,
}

/// Outcome of routing one message
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Decoded(Transmission),
    Rejected(DecodeError),
    /// Topic matches neither configured topic; the message is dropped
    Unrecognized,
}

/// Dispatches messages by exact topic match and stamps receive time
#[derive(Debug)]
pub struct Router {
    reading_topic: String,
    distance_topic: Option<String>,
    clock: ReceiveClock,
}

impl Router {
    pub fn new(topics: &TopicSet) -> Self {
        Self {
            reading_topic: topics.primary().to_string(),
            distance_topic: topics.secondary().map(str::to_string),
            clock: ReceiveClock::new(),
        }
    }

    pub fn kind_of(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.reading_topic {
            Some(TopicKind::Reading)
        } else if self.distance_topic.as_deref() == Some(topic) {
            Some(TopicKind::Distance)
        } else {
            None
        }
    }

    /// Route and decode one message. Never fails; decode errors are returned as a value.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Routed {
        let kind = match self.kind_of(topic) {
            Some(kind) => kind,
            None => {
                debug!("Ignoring message on unrecognized topic {}", topic);
                return Routed::Unrecognized;
            }
        };

        // Receive time is stamped only once the payload decoded cleanly
        let decoded = match kind {
            TopicKind::Reading => decode_reading(payload, 0).map(|mut reading| {
                reading.timestamp_receive = self.clock.stamp();
                Transmission::Reading(reading)
            }),
            TopicKind::Distance => decode_distance(payload, 0).map(|mut reading| {
                reading.timestamp_receive = self.clock.stamp();
                Transmission::Distance(reading)
            }),
        };

        match decoded {
            Ok(transmission) => Routed::Decoded(transmission),
            Err(e) => Routed::Rejected(e),
        }
    }
}
