//! Error types for ingestion, persistence and configuration.

use thiserror::Error;

/// Broker connection failures.
///
/// Fatal only before the first successful session; afterwards the supervisor
/// treats them as recoverable and keeps polling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    /// The broker answered the connect request with a refusal code
    #[error("broker rejected connection: {reason}")]
    Rejected { reason: String },

    /// Network or protocol failure talking to the broker
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// The subscribe request could not be queued
    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Payload decoding failures. Always recovered by dropping the message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Encoding,

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("type mismatch in field `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// Record store failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        // SQLSTATE class 23 is integrity constraint violation
        let constraint = e
            .code()
            .map(|state| state.code().starts_with("23"))
            .unwrap_or(false);

        if constraint {
            StoreError::Constraint(e.to_string())
        } else if e.is_closed() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Query(e.to_string())
        }
    }
}

/// Failure to persist one transmission. The reading is discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistError {
    #[error("failed to store transmission from {device}: {source}")]
    Store {
        device: String,
        #[source]
        source: StoreError,
    },
}

/// Secondary publish failure. Logged and swallowed by the persister.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("notification on {topic} not sent: {reason}")]
pub struct NotifyError {
    pub topic: String,
    pub reason: String,
}

/// Errors that stop the supervisory loop.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("initial broker connection failed: {0}")]
    InitialConnect(#[source] ConnectionError),
}

/// Configuration loading failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
