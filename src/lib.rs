//! Greenhouse telemetry ingestion and hourly statistics.
//!
//! Write path: MQTT broker → [`mqtt::ConnectionManager`] → [`decoder::Router`]
//! → [`database::Persister`] → [`database::RecordStore`].
//!
//! Read path: [`database::RecordStore`] → [`statistics::hourly_summary`] →
//! [`statistics::Aggregation`], consumed by a query layer.

pub mod config;
pub mod database;
pub mod decoder;
pub mod error;
pub mod ingest;
pub mod models;
pub mod mqtt;
pub mod statistics;
pub mod utils;

pub use config::{IngestConfig, MqttSettings, TopicSet};
pub use error::{ConfigError, ConnectionError, DecodeError, FatalError, PersistError, StoreError};
pub use models::{DistanceReading, Reading, Transmission};
