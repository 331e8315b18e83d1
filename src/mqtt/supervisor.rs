//! Supervisory loop: owns the ingestion worker for the life of the process
use log::{info, warn};
use std::convert::Infallible;
use tokio::time::{Duration, Instant};

use super::connection::{Broker, ConnectionManager, SessionEvent};
use crate::error::{ConnectionError, FatalError};
use crate::ingest::{Ingestor, MessageOutcome};

/// How often the "still waiting" notice is logged during the first connect
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Pause before polling again after a lost session or failed reconnect
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Result of one supervised step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Connected,
    Disconnected,
    Handled(MessageOutcome),
    ReconnectFailed(ConnectionError),
}

pub struct Supervisor<B> {
    manager: ConnectionManager<B>,
    ingestor: Ingestor,
    reconnect_delay: Duration,
}

impl<B: Broker> Supervisor<B> {
    pub fn new(manager: ConnectionManager<B>, ingestor: Ingestor) -> Self {
        Self {
            manager,
            ingestor,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn manager(&self) -> &ConnectionManager<B> {
        &self.manager
    }

    /// Connect, then process messages until the process ends
    ///
    /// Returns only if the first connection cannot be established.
    pub async fn run(mut self) -> Result<Infallible, FatalError> {
        self.connect().await?;
        loop {
            self.step().await;
        }
    }

    /// Drive the manager until the first session is up
    ///
    /// Any connection error before that point is fatal.
    pub async fn connect(&mut self) -> Result<(), FatalError> {
        let started = Instant::now();
        let mut next_notice = started + CONNECT_POLL_INTERVAL;

        while !self.manager.is_connected() {
            match self.manager.next_event().await {
                Ok(SessionEvent::Message { topic, .. }) => {
                    warn!("Ignoring message on {} before the session is up", topic);
                }
                Ok(_) => {}
                Err(e) => return Err(FatalError::InitialConnect(e)),
            }

            if !self.manager.is_connected() && Instant::now() >= next_notice {
                info!(
                    "Waiting for broker connection ({} ms)",
                    started.elapsed().as_millis()
                );
                next_notice = Instant::now() + CONNECT_POLL_INTERVAL;
            }
        }

        Ok(())
    }

    /// Handle exactly one session event
    ///
    /// A message is fully decoded and persisted before this returns.
    pub async fn step(&mut self) -> Step {
        match self.manager.next_event().await {
            Ok(SessionEvent::Message { topic, payload }) => {
                Step::Handled(self.ingestor.handle(&topic, &payload).await)
            }
            Ok(SessionEvent::Connected) => {
                info!("Session re-established");
                Step::Connected
            }
            Ok(SessionEvent::Disconnected(e)) => {
                warn!(
                    "Broker session lost ({}), reconnecting in {:?}",
                    e, self.reconnect_delay
                );
                tokio::time::sleep(self.reconnect_delay).await;
                Step::Disconnected
            }
            Err(e) => {
                warn!(
                    "Reconnect failed ({}), retrying in {:?}",
                    e, self.reconnect_delay
                );
                tokio::time::sleep(self.reconnect_delay).await;
                Step::ReconnectFailed(e)
            }
        }
    }
}
