//! Decode-and-persist handling of one incoming message
use log::{debug, error, warn};

use crate::database::operations::Persister;
use crate::decoder::{Routed, Router};
use crate::error::{DecodeError, PersistError};
use crate::models::RecordId;
use crate::utils::format_epoch;

/// What happened to one message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Stored(RecordId),
    /// Topic not configured; dropped silently
    Unrecognized,
    /// Payload malformed; dropped
    Rejected(DecodeError),
    /// Record store refused the write; dropped
    Failed(PersistError),
}

pub struct Ingestor {
    router: Router,
    persister: Persister,
}

impl Ingestor {
    pub fn new(router: Router, persister: Persister) -> Self {
        Self { router, persister }
    }

    /// Route, decode and store one message
    ///
    /// Never fails: every problem is logged and reported in the outcome so the
    /// caller can move on to the next message.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> MessageOutcome {
        let transmission = match self.router.route(topic, payload) {
            Routed::Decoded(transmission) => transmission,
            Routed::Unrecognized => return MessageOutcome::Unrecognized,
            Routed::Rejected(e) => {
                warn!(
                    "Dropping message on {}: {} (payload {:?})",
                    topic,
                    e,
                    String::from_utf8_lossy(payload)
                );
                return MessageOutcome::Rejected(e);
            }
        };

        match self.persister.persist(&transmission).await {
            Ok(id) => {
                debug!(
                    "Stored record {} from {} on {} (sent {})",
                    id,
                    transmission.device(),
                    topic,
                    format_epoch(transmission.timestamp_origin())
                );
                MessageOutcome::Stored(id)
            }
            Err(e) => {
                error!("{}", e);
                MessageOutcome::Failed(e)
            }
        }
    }
}
